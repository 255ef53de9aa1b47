//! Query conversion: JPQL/HQL and derived method names to native SQL

mod context;
mod hibernate;
mod method_sql;
mod render;
mod rewrite;

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::dialect::DatabaseDialect;
use crate::error::QueryConversionError;
use crate::model::EntityMetadata;

pub use context::{AliasBinding, SqlConversionContext, MAX_SUBQUERY_DEPTH};
pub use hibernate::HibernateQueryConverter;
pub use method_sql::{DerivedQuery, DerivedSubject, MethodToSqlConverter};
pub use render::{render_statement, RenderedSql};
pub use rewrite::rewrite_statement;

/// Why a conversion did not produce SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionFailureReason {
    UnsupportedConstruct,
    ParserError,
    MissingEntityMetadata,
    UnresolvedJoin,
    UnresolvedDiscriminator,
    UnknownAlias,
    NestingTooDeep,
}

impl ConversionFailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversionFailureReason::UnsupportedConstruct => "UNSUPPORTED_CONSTRUCT",
            ConversionFailureReason::ParserError => "PARSER_ERROR",
            ConversionFailureReason::MissingEntityMetadata => "MISSING_ENTITY_METADATA",
            ConversionFailureReason::UnresolvedJoin => "UNRESOLVED_JOIN",
            ConversionFailureReason::UnresolvedDiscriminator => "UNRESOLVED_DISCRIMINATOR",
            ConversionFailureReason::UnknownAlias => "UNKNOWN_ALIAS",
            ConversionFailureReason::NestingTooDeep => "NESTING_TOO_DEEP",
        }
    }
}

impl fmt::Display for ConversionFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `?` placeholder in the native SQL.
///
/// Equality and hashing are structural over all four fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMapping {
    /// Name the parameter had in the source query (`breed` for `:breed`,
    /// `1` for `?1`) or the method parameter name
    pub original_name: String,
    /// 1-based rank of the placeholder in the final SQL text
    pub position: usize,
    pub declared_type: Option<String>,
    /// Column the parameter is compared against, when there is one
    pub column_name: Option<String>,
}

impl ParameterMapping {
    pub fn new(
        original_name: impl Into<String>,
        position: usize,
        declared_type: Option<String>,
        column_name: Option<String>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            position,
            declared_type,
            column_name,
        }
    }
}

/// Outcome of converting one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConversionResult {
    #[serde(rename_all = "camelCase")]
    Success {
        native_sql: String,
        parameter_mappings: Vec<ParameterMapping>,
        referenced_tables: BTreeSet<String>,
    },
    #[serde(rename_all = "camelCase")]
    Failure {
        error_message: String,
        reason: ConversionFailureReason,
    },
}

impl ConversionResult {
    pub fn failure(reason: ConversionFailureReason, message: impl Into<String>) -> Self {
        ConversionResult::Failure {
            error_message: message.into(),
            reason,
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, ConversionResult::Success { .. })
    }

    pub fn native_sql(&self) -> Option<&str> {
        match self {
            ConversionResult::Success { native_sql, .. } => Some(native_sql),
            ConversionResult::Failure { .. } => None,
        }
    }

    /// Parameter mappings in placeholder order; empty for failures.
    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        match self {
            ConversionResult::Success {
                parameter_mappings, ..
            } => parameter_mappings,
            ConversionResult::Failure { .. } => &[],
        }
    }

    pub fn referenced_tables(&self) -> Option<&BTreeSet<String>> {
        match self {
            ConversionResult::Success {
                referenced_tables, ..
            } => Some(referenced_tables),
            ConversionResult::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ConversionResult::Failure { error_message, .. } => Some(error_message),
            ConversionResult::Success { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<ConversionFailureReason> {
        match self {
            ConversionResult::Failure { reason, .. } => Some(*reason),
            ConversionResult::Success { .. } => None,
        }
    }
}

/// A converter from some JPA query representation to native SQL
pub trait JpaQueryConverter {
    /// Cheap syntactic pre-check; `true` does not guarantee success.
    fn can_convert(&self, query: &str) -> bool;

    fn supports_dialect(&self, dialect: DatabaseDialect) -> bool;

    /// Convert `query`. Semantic gaps come back as a failed result, only
    /// grammar-level failures are errors.
    fn convert_to_native_sql(
        &self,
        query: &str,
        metadata: &EntityMetadata,
        dialect: DatabaseDialect,
    ) -> Result<ConversionResult, QueryConversionError>;
}
