//! Error types for rust-queryconv

use std::path::PathBuf;
use thiserror::Error;

use crate::convert::ConversionFailureReason;
use crate::parser::ParseError;

/// A query whose text does not parse as any supported statement shape.
///
/// Semantic gaps (unknown entity, missing column, ...) never surface here;
/// they are reported as a failed `ConversionResult` instead.
#[derive(Error, Debug)]
#[error("Failed to convert query ({reason}): {message}")]
pub struct QueryConversionError {
    /// The original query text
    pub query: String,
    pub reason: ConversionFailureReason,
    pub message: String,
    #[source]
    pub source: Option<ParseError>,
}

impl QueryConversionError {
    pub fn parser_error(query: &str, source: ParseError) -> Self {
        Self {
            query: query.to_string(),
            reason: ConversionFailureReason::ParserError,
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// A semantic gap found while rewriting a parsed query.
///
/// Reported to callers as a failed `ConversionResult`, never raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ConversionFailure {
    pub reason: ConversionFailureReason,
    pub message: String,
}

impl ConversionFailure {
    pub fn new(reason: ConversionFailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn missing_metadata(message: impl Into<String>) -> Self {
        Self::new(ConversionFailureReason::MissingEntityMetadata, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ConversionFailureReason::UnsupportedConstruct, message)
    }
}

/// Errors raised while resolving entity declarations into metadata
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Duplicate entity declaration: {name}")]
    DuplicateEntity { name: String },

    #[error("Circular inheritance detected at {entity} (chain: {chain})")]
    InheritanceCycle { entity: String, chain: String },
}

/// Errors that can occur while loading a project or writing its report
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Failed to read project file: {path}")]
    ProjectReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse project file: {path}")]
    ProjectParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid project file format: {message}")]
    InvalidProjectFormat { message: String },

    #[error("Unknown database dialect: {name}")]
    UnknownDialect { name: String },

    #[error("Failed to write report to {path}")]
    ReportWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
