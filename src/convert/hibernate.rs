//! JPQL/HQL to native SQL: parse, rewrite, render, dialect transform.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::context::SqlConversionContext;
use super::render::render_statement;
use super::rewrite::rewrite_statement;
use super::{ConversionFailureReason, ConversionResult, JpaQueryConverter};
use crate::dialect::DatabaseDialect;
use crate::error::QueryConversionError;
use crate::model::EntityMetadata;
use crate::parser::parse_hql;

/// A statement keyword somewhere in the text
static STATEMENT_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(select|from|update|delete)\b").expect("valid statement shape regex")
});

/// Converter for `@Query` strings written in JPQL/HQL
#[derive(Debug, Clone, Copy, Default)]
pub struct HibernateQueryConverter;

impl HibernateQueryConverter {
    pub fn new() -> Self {
        Self
    }
}

impl JpaQueryConverter for HibernateQueryConverter {
    fn can_convert(&self, query: &str) -> bool {
        !query.trim().is_empty() && STATEMENT_SHAPE.is_match(query)
    }

    fn supports_dialect(&self, _dialect: DatabaseDialect) -> bool {
        true
    }

    fn convert_to_native_sql(
        &self,
        query: &str,
        metadata: &EntityMetadata,
        dialect: DatabaseDialect,
    ) -> Result<ConversionResult, QueryConversionError> {
        if query.trim().is_empty() {
            return Ok(ConversionResult::failure(
                ConversionFailureReason::UnsupportedConstruct,
                "Query text is empty",
            ));
        }

        let mut tree =
            parse_hql(query).map_err(|err| QueryConversionError::parser_error(query, err))?;

        let mut ctx = SqlConversionContext::new(metadata, dialect);
        if let Err(failure) = rewrite_statement(&mut tree, &mut ctx) {
            debug!(%query, reason = %failure.reason, "conversion failed: {}", failure.message);
            return Ok(ConversionResult::failure(failure.reason, failure.message));
        }

        let rendered = render_statement(&tree);
        let native_sql = ctx.dialect().transform_sql(&rendered.sql).into_owned();
        debug!(
            %query,
            sql = %native_sql,
            parameters = rendered.parameters.len(),
            "converted query"
        );

        Ok(ConversionResult::Success {
            native_sql,
            parameter_mappings: rendered.parameters,
            referenced_tables: ctx.into_referenced_tables(),
        })
    }
}
