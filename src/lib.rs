//! rust-queryconv: converts JPA repository queries into native SQL
//!
//! JPQL/HQL `@Query` strings and Spring-Data derived method names are
//! converted into dialect-correct SQL with ordered parameter mappings,
//! ready to be written as test fixtures.

pub mod convert;
pub mod dialect;
pub mod error;
pub mod model;
pub mod parser;
pub mod project;
pub mod util;

use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{info, warn};

pub use convert::{
    ConversionFailureReason, ConversionResult, HibernateQueryConverter, JpaQueryConverter,
    MethodToSqlConverter, ParameterMapping,
};
pub use dialect::DatabaseDialect;
pub use error::QueryConversionError;
pub use model::EntityMetadata;

use project::{QueryReport, QuerySource, ReportSummary};

/// Options for converting a query project
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Path to the project JSON file
    pub project_path: PathBuf,
    /// Overrides the dialect declared by the project
    pub dialect: Option<DatabaseDialect>,
    /// Where to write the JSON report, if anywhere
    pub output_path: Option<PathBuf>,
}

/// Convert every query of a project
pub fn convert_project(options: &ConvertOptions) -> Result<Vec<QueryReport>> {
    // Step 1: Parse the project file
    let project = project::parse_project(&options.project_path)?;
    let dialect = match options.dialect {
        Some(dialect) => dialect,
        None => project.target_dialect()?,
    };
    info!(
        project = %project.name,
        %dialect,
        entities = project.entities.len(),
        queries = project.queries.len(),
        "loaded project"
    );

    // Step 2: Resolve entity metadata once, shared read-only by all conversions
    let metadata = model::resolve_entities(project.entities.iter().cloned())
        .with_context(|| format!("resolving entities of {}", options.project_path.display()))?;

    // Step 3: Convert queries in parallel
    let reports: Vec<QueryReport> = project
        .queries
        .par_iter()
        .map(|source| convert_query_source(source, &metadata, dialect))
        .collect();

    let summary = ReportSummary::of(&reports);
    info!(
        converted = summary.converted,
        failed = summary.failed,
        "converted project queries"
    );

    // Step 4: Write the report
    if let Some(output_path) = &options.output_path {
        project::write_report(output_path, &reports)?;
        info!(path = %output_path.display(), "wrote report");
    }

    Ok(reports)
}

/// Convert one project query against resolved metadata.
///
/// Grammar failures are folded into a failed result with reason
/// `PARSER_ERROR` so a batch never aborts on a single query.
pub fn convert_query_source(
    source: &QuerySource,
    metadata: &EntityMetadata,
    dialect: DatabaseDialect,
) -> QueryReport {
    let result = match source {
        QuerySource::Jpql { query, .. } => {
            let converter = HibernateQueryConverter::new();
            converter
                .convert_to_native_sql(query, metadata, dialect)
                .unwrap_or_else(|err| {
                    warn!(query = source.name(), "{}", err);
                    ConversionResult::failure(err.reason, err.to_string())
                })
        }
        QuerySource::Method {
            method,
            entity,
            parameters,
            ..
        } => {
            let parameters: Vec<&str> = parameters.iter().map(String::as_str).collect();
            MethodToSqlConverter::new()
                .convert_entity_method(method, &parameters, entity, metadata, dialect)
        }
    };

    QueryReport {
        name: source.name().to_string(),
        source: source.text().to_string(),
        dialect,
        result,
    }
}
