//! Conversion reports

use std::path::Path;

use serde::Serialize;

use crate::convert::ConversionResult;
use crate::dialect::DatabaseDialect;
use crate::error::ProjectError;

/// Outcome of one project query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReport {
    pub name: String,
    /// Query text or method name as written in the project
    pub source: String,
    pub dialect: DatabaseDialect,
    pub result: ConversionResult,
}

/// Success/failure counts over a batch of reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub converted: usize,
    pub failed: usize,
}

impl ReportSummary {
    pub fn of(reports: &[QueryReport]) -> Self {
        let converted = reports
            .iter()
            .filter(|report| report.result.is_successful())
            .count();
        Self {
            converted,
            failed: reports.len() - converted,
        }
    }
}

/// Write `reports` as pretty-printed JSON.
pub fn write_report(path: &Path, reports: &[QueryReport]) -> Result<(), ProjectError> {
    let write_error = |source: std::io::Error| ProjectError::ReportWriteError {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    let json = serde_json::to_string_pretty(reports)
        .map_err(|e| write_error(std::io::Error::from(e)))?;
    std::fs::write(path, json).map_err(write_error)
}
