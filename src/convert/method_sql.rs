//! Derived-query conversion: Spring-Data method names to SQL.
//!
//! The converter is a token-driven state machine over the output of
//! `split_method_name`. Column names are the snake_case of the property
//! tokens and every fragment keeps the spacing the generated fixtures
//! were recorded with, e.g.
//!
//! ```text
//! ["findBy", "Age", "GreaterThan", "And", "Name", "In"], "users"
//!   => SELECT * FROM users WHERE age  > ?  AND name  IN (?)
//! ```

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::{ConversionFailureReason, ConversionResult, ParameterMapping};
use crate::dialect::DatabaseDialect;
use crate::model::EntityMetadata;
use crate::parser::{split_method_name, split_method_name_with_properties};
use crate::util::snake_case;

/// Subject token: verb, optional modifiers (`Distinct`, `First`, `Top3`), `By`.
static SUBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(find|read|get|query|search|stream|count|exists|delete|remove)(\w*?)By$")
        .expect("valid subject regex")
});

static LIMIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:First|Top)(\d*)").expect("valid limit regex"));

/// What a derived query selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedSubject {
    Select,
    SelectDistinct,
    Count,
    /// `SELECT EXISTS (SELECT 1 FROM t ...`, left open by the skeleton
    Exists,
    Delete,
}

/// SQL skeleton of one derived query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedQuery {
    pub subject: DerivedSubject,
    pub sql: String,
    /// Row limit from `First<n>`/`Top<n>`
    pub limit: Option<u64>,
    /// Column compared against each `?`, in placeholder order
    pub parameter_columns: Vec<String>,
}

impl DerivedQuery {
    pub fn limit_to_one(&self) -> bool {
        self.limit == Some(1)
    }
}

/// Stateless converter for derived repository queries
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodToSqlConverter;

impl MethodToSqlConverter {
    pub fn new() -> Self {
        Self
    }

    /// Build the SQL skeleton for already-split `tokens` against `table`.
    ///
    /// Returns `None` when the first token is not a recognised subject.
    pub fn build_select_and_where_clauses<S: AsRef<str>>(
        &self,
        tokens: &[S],
        table: &str,
    ) -> Option<DerivedQuery> {
        self.build_with_columns(tokens, table, &snake_case)
    }

    fn build_with_columns<S: AsRef<str>>(
        &self,
        tokens: &[S],
        table: &str,
        column_of: &dyn Fn(&str) -> String,
    ) -> Option<DerivedQuery> {
        let (head, rest) = tokens.split_first()?;
        let head = head.as_ref();

        if head == "findAllById" {
            return Some(DerivedQuery {
                subject: DerivedSubject::Select,
                sql: format!("SELECT * FROM {} WHERE id IN (?)", table),
                limit: None,
                parameter_columns: vec!["id".to_string()],
            });
        }

        let mut limit = None;
        let subject = if head == "findAll" {
            DerivedSubject::Select
        } else {
            let caps = SUBJECT.captures(head)?;
            let modifiers = caps.get(2).map_or("", |m| m.as_str());
            if let Some(limit_caps) = LIMIT.captures(modifiers) {
                limit = Some(limit_caps[1].parse().unwrap_or(1));
            }
            match &caps[1] {
                "count" => DerivedSubject::Count,
                "exists" => DerivedSubject::Exists,
                "delete" | "remove" => DerivedSubject::Delete,
                _ if modifiers.contains("Distinct") => DerivedSubject::SelectDistinct,
                _ => DerivedSubject::Select,
            }
        };

        let sql = match subject {
            DerivedSubject::Select => format!("SELECT * FROM {}", table),
            DerivedSubject::SelectDistinct => format!("SELECT DISTINCT * FROM {}", table),
            DerivedSubject::Count => format!("SELECT COUNT(*) FROM {}", table),
            DerivedSubject::Exists => format!("SELECT EXISTS (SELECT 1 FROM {}", table),
            DerivedSubject::Delete => format!("DELETE FROM {}", table),
        };
        let mut derived = DerivedQuery {
            subject,
            sql,
            limit,
            parameter_columns: Vec::new(),
        };

        let split = rest
            .iter()
            .position(|token| token.as_ref() == "OrderBy")
            .unwrap_or(rest.len());
        let (criteria, ordering) = rest.split_at(split);

        if !criteria.is_empty() {
            derived.sql.push_str(" WHERE ");
            append_criteria(criteria, &mut derived, column_of);
        }
        if let Some((_, order_tokens)) = ordering.split_first() {
            append_order_by(order_tokens, &mut derived.sql, column_of);
        }

        Some(derived)
    }

    /// Convert a repository method name into a finished result.
    ///
    /// `parameter_names` are the Java parameter names in declaration order;
    /// missing names become `param<N>`.
    pub fn convert_method(
        &self,
        method_name: &str,
        parameter_names: &[&str],
        table: &str,
        dialect: DatabaseDialect,
    ) -> ConversionResult {
        let tokens = split_method_name(method_name);
        let derived = self.build_select_and_where_clauses(&tokens, table);
        self.finish(method_name, derived, parameter_names, table, dialect)
    }

    /// Like `convert_method`, resolving the table and property names of
    /// `entity` from `metadata`.
    pub fn convert_entity_method(
        &self,
        method_name: &str,
        parameter_names: &[&str],
        entity: &str,
        metadata: &EntityMetadata,
        dialect: DatabaseDialect,
    ) -> ConversionResult {
        let Some(mapping) = metadata.mapping_for_entity(entity) else {
            return ConversionResult::failure(
                ConversionFailureReason::MissingEntityMetadata,
                format!("No mapping for entity {}", entity),
            );
        };

        let properties: Vec<&str> = metadata
            .lineage(mapping)
            .into_iter()
            .flat_map(|m| m.columns.keys().map(String::as_str))
            .collect();
        let tokens = split_method_name_with_properties(method_name, &properties);
        let column_of = |token: &str| {
            let property = decapitalize(token);
            metadata
                .column_for_property(entity, &property)
                .map(|column| column.column_name.clone())
                .unwrap_or_else(|| snake_case(token))
        };
        let derived = self.build_with_columns(&tokens, &mapping.table_name, &column_of);
        self.finish(
            method_name,
            derived,
            parameter_names,
            &mapping.table_name,
            dialect,
        )
    }

    fn finish(
        &self,
        method_name: &str,
        derived: Option<DerivedQuery>,
        parameter_names: &[&str],
        table: &str,
        dialect: DatabaseDialect,
    ) -> ConversionResult {
        let Some(derived) = derived else {
            return ConversionResult::failure(
                ConversionFailureReason::UnsupportedConstruct,
                format!("Unsupported repository method name: {}", method_name),
            );
        };

        let mut sql = derived.sql.clone();
        if derived.subject == DerivedSubject::Exists {
            warn!(
                method = method_name,
                "closing unterminated EXISTS sub-select of derived query"
            );
            sql = format!("{})", sql.trim_end());
        }
        if let Some(limit) = derived.limit {
            sql = dialect.apply_limit_clause(&sql, limit);
        }
        let native_sql = dialect.transform_sql(&sql).into_owned();

        let parameter_mappings = derived
            .parameter_columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let name = parameter_names
                    .get(index)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("param{}", index + 1));
                ParameterMapping::new(name, index + 1, None, Some(column.clone()))
            })
            .collect();

        debug!(method = method_name, sql = %native_sql, "converted derived query");
        ConversionResult::Success {
            native_sql,
            parameter_mappings,
            referenced_tables: BTreeSet::from([table.to_string()]),
        }
    }
}

/// Append `<column> <op>` fragments and `AND`/`OR` connectors.
fn append_criteria<S: AsRef<str>>(
    tokens: &[S],
    derived: &mut DerivedQuery,
    column_of: &dyn Fn(&str) -> String,
) {
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_ref();
        i += 1;
        match token {
            "And" => {
                derived.sql.push_str(" AND ");
                continue;
            }
            "Or" => {
                derived.sql.push_str(" OR ");
                continue;
            }
            _ => {}
        }

        let column = column_of(token);
        match operator_fragment(&tokens[i..]) {
            Some((fragment, consumed, placeholders)) => {
                derived.sql.push_str(&column);
                derived.sql.push(' ');
                derived.sql.push_str(fragment);
                derived.sql.push(' ');
                for _ in 0..placeholders {
                    derived.parameter_columns.push(column.clone());
                }
                i += consumed;
            }
            None => {
                derived.sql.push_str(&column);
                derived.sql.push_str(" = ? ");
                derived.parameter_columns.push(column);
            }
        }
    }
}

/// SQL for the operator keyword(s) at the start of `tokens`:
/// (fragment, tokens consumed, placeholders emitted).
fn operator_fragment<S: AsRef<str>>(tokens: &[S]) -> Option<(&'static str, usize, usize)> {
    let first = tokens.first()?.as_ref();
    let second = tokens.get(1).map(|token| token.as_ref());

    let fragment = match first {
        "Not" => match second {
            Some("Like") => (" NOT LIKE ?", 2, 1),
            Some("In") => (" NOT IN (?)", 2, 1),
            _ => (" != ?", 1, 1),
        },
        "NotIn" => (" NOT IN (?)", 1, 1),
        "NotLike" => (" NOT LIKE ?", 1, 1),
        "GreaterThan" | "After" => (" > ?", 1, 1),
        "GreaterThanEqual" => (" >= ?", 1, 1),
        "LessThan" | "Before" => (" < ?", 1, 1),
        "LessThanEqual" => (" <= ?", 1, 1),
        "In" => (" IN (?)", 1, 1),
        "Like" | "StartingWith" | "StartsWith" | "EndingWith" | "EndsWith" | "Containing"
        | "Contains" => (" LIKE ?", 1, 1),
        "True" => (" = true", 1, 0),
        "False" => (" = false", 1, 0),
        "IsNull" | "Null" => (" IS NULL", 1, 0),
        "IsNotNull" | "NotNull" => (" IS NOT NULL", 1, 0),
        "Between" => (" BETWEEN ? AND ?", 1, 2),
        "Equals" => (" = ?", 1, 1),
        // `IsGreaterThan`, `IsIn`, ...; plain `Is` means equality
        "Is" => match operator_fragment(&tokens[1..]) {
            Some((fragment, consumed, placeholders)) => (fragment, consumed + 1, placeholders),
            None => (" = ?", 1, 1),
        },
        _ => return None,
    };
    Some(fragment)
}

/// Append `ORDER BY col DIR[, col DIR]`; direction defaults to ASC.
fn append_order_by<S: AsRef<str>>(
    tokens: &[S],
    sql: &mut String,
    column_of: &dyn Fn(&str) -> String,
) {
    if !sql.ends_with(' ') {
        sql.push(' ');
    }
    sql.push_str("ORDER BY ");

    let mut first = true;
    let mut i = 0;
    while i < tokens.len() {
        let property = tokens[i].as_ref();
        i += 1;
        if property == "And" {
            continue;
        }
        let direction = match tokens.get(i).map(|token| token.as_ref()) {
            Some("Asc") => {
                i += 1;
                "ASC"
            }
            Some("Desc") => {
                i += 1;
                "DESC"
            }
            _ => "ASC",
        };

        if !first {
            let trimmed = sql.trim_end().len();
            sql.truncate(trimmed);
            sql.push_str(", ");
        }
        first = false;

        sql.push_str(&column_of(property));
        sql.push(' ');
        sql.push_str(direction);
        sql.push(' ');
    }
}

/// `LoggedIn` -> `loggedIn`
fn decapitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
