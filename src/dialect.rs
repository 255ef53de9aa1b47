//! Target SQL dialects.
//!
//! A dialect is a stateless policy value: it knows how its database spells
//! boolean literals, row limits, sequence access and string concatenation,
//! and how to recognise itself from a JDBC URL or a short name.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::ProjectError;
use crate::util::{contains_ci, find_top_level_ci};

/// Boolean literal on the right-hand side of a comparison (`= true`, `<> false`).
static BOOLEAN_COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(=|<>|!=)(\s*)\b(true|false)\b").expect("valid boolean comparison regex")
});

/// Supported target dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDialect {
    Oracle,
    Postgresql,
}

impl DatabaseDialect {
    /// Every dialect the converters can target
    pub const ALL: [DatabaseDialect; 2] = [DatabaseDialect::Oracle, DatabaseDialect::Postgresql];

    /// Canonical lower-case name
    pub fn name(self) -> &'static str {
        match self {
            DatabaseDialect::Oracle => "oracle",
            DatabaseDialect::Postgresql => "postgresql",
        }
    }

    /// Detect the dialect from a JDBC URL such as `jdbc:postgresql://db:5432/app`.
    ///
    /// Unrecognised URLs yield `None`.
    pub fn from_jdbc_url(url: &str) -> Option<Self> {
        if contains_ci(url, "jdbc:oracle:") {
            Some(DatabaseDialect::Oracle)
        } else if contains_ci(url, "jdbc:postgresql:") || contains_ci(url, "jdbc:postgres:") {
            Some(DatabaseDialect::Postgresql)
        } else {
            None
        }
    }

    /// Look a dialect up by canonical name or short alias (`pg`), ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("oracle") {
            Some(DatabaseDialect::Oracle)
        } else if ["postgresql", "postgres", "pg"]
            .iter()
            .any(|alias| name.eq_ignore_ascii_case(alias))
        {
            Some(DatabaseDialect::Postgresql)
        } else {
            None
        }
    }

    /// Whether the database has a native boolean type usable in comparisons.
    pub fn supports_boolean(self) -> bool {
        match self {
            DatabaseDialect::Oracle => false,
            DatabaseDialect::Postgresql => true,
        }
    }

    /// Map a boolean literal to this dialect's spelling.
    ///
    /// Anything that is not `true`/`false` passes through unchanged.
    pub fn transform_boolean_value(self, literal: &str) -> String {
        if self.supports_boolean() {
            return literal.to_string();
        }
        if literal.eq_ignore_ascii_case("true") {
            "1".to_string()
        } else if literal.eq_ignore_ascii_case("false") {
            "0".to_string()
        } else {
            literal.to_string()
        }
    }

    /// Restrict `sql` to at most `limit` rows.
    ///
    /// Oracle gets a `ROWNUM` conjunct, PostgreSQL a trailing `LIMIT`.
    /// The text of `sql` is kept, except that an Oracle WHERE predicate with
    /// a top-level `OR` is parenthesized so the conjunct covers every branch.
    pub fn apply_limit_clause(self, sql: &str, limit: u64) -> String {
        match self {
            DatabaseDialect::Oracle => {
                // ROWNUM belongs to the WHERE clause, ahead of any ORDER BY
                let (head, tail) = match find_top_level_ci(sql, " ORDER BY ") {
                    Some(idx) => sql.split_at(idx),
                    None => (sql, ""),
                };
                let conjunct = format!("ROWNUM <= {}", limit);
                let head = match find_top_level_ci(head, " WHERE ") {
                    Some(idx) => {
                        let (select, predicate) = head.split_at(idx + " WHERE ".len());
                        if find_top_level_ci(predicate, " OR ").is_some() {
                            format!("{}({}) AND {}", select, predicate, conjunct)
                        } else {
                            format!("{}{}AND {}", head, separator(head), conjunct)
                        }
                    }
                    None => format!("{}{}WHERE {}", head, separator(head), conjunct),
                };
                format!("{}{}", head, tail)
            }
            DatabaseDialect::Postgresql => format!("{}{}LIMIT {}", sql, separator(sql), limit),
        }
    }

    /// Expression yielding the next value of sequence `sequence_name`
    pub fn sequence_next_value_syntax(self, sequence_name: &str) -> String {
        match self {
            DatabaseDialect::Oracle => format!("{}.NEXTVAL", sequence_name),
            DatabaseDialect::Postgresql => format!("nextval('{}')", sequence_name),
        }
    }

    pub fn concatenation_operator(self) -> &'static str {
        "||"
    }

    /// Rewrite boolean literal comparisons for dialects without a boolean type.
    ///
    /// Only text outside single-quoted string literals is touched.
    pub fn transform_sql(self, sql: &str) -> Cow<'_, str> {
        if self.supports_boolean() || !BOOLEAN_COMPARISON.is_match(sql) {
            return Cow::Borrowed(sql);
        }

        // Splitting on quotes alternates between code and literal segments;
        // an escaped '' yields an empty code segment, which is harmless.
        let mut out = String::with_capacity(sql.len());
        for (i, segment) in sql.split('\'').enumerate() {
            if i > 0 {
                out.push('\'');
            }
            if i % 2 == 0 {
                let replaced = BOOLEAN_COMPARISON.replace_all(segment, |caps: &Captures| {
                    format!(
                        "{}{}{}",
                        &caps[1],
                        &caps[2],
                        self.transform_boolean_value(&caps[3])
                    )
                });
                out.push_str(&replaced);
            } else {
                out.push_str(segment);
            }
        }
        Cow::Owned(out)
    }
}

/// Space needed before appending a clause to `sql`.
fn separator(sql: &str) -> &'static str {
    if sql.ends_with(char::is_whitespace) {
        ""
    } else {
        " "
    }
}

impl fmt::Display for DatabaseDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatabaseDialect {
    type Err = ProjectError;

    /// Accepts a short name or a JDBC URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatabaseDialect::from_name(s)
            .or_else(|| DatabaseDialect::from_jdbc_url(s))
            .ok_or_else(|| ProjectError::UnknownDialect {
                name: s.to_string(),
            })
    }
}
