//! Identifier and token formatting helpers for query text.
//!
//! # Examples
//!
//! ```ignore
//! use crate::parser::identifier_utils::*;
//!
//! assert_eq!(quote_string_literal("O'Reilly"), "'O''Reilly'");
//! assert!(is_clause_keyword("where"));
//! ```

use sqlparser::tokenizer::{Token, Word};

/// Words that end a FROM/JOIN item and therefore can never be read as an alias.
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "OUTER", "CROSS", "FULL", "ON", "WITH", "ORDER",
    "GROUP", "HAVING", "SET", "UNION", "FETCH", "AND", "OR", "FROM", "SELECT",
];

/// Converts a sqlparser-rs Word token to its source spelling.
///
/// - `Some('"')` -> `"identifier"`
/// - `Some('`')` -> `` `identifier` ``
/// - `None` -> `identifier` (unquoted)
pub fn format_word(word: &Word) -> String {
    match word.quote_style {
        Some('"') => format!("\"{}\"", word.value),
        Some('`') => format!("`{}`", word.value),
        Some('[') => format!("[{}]", word.value),
        _ => word.value.clone(),
    }
}

/// Converts a sqlparser-rs Token to a string for diagnostics.
///
/// Punctuation maps to its literal spelling, anything exotic falls back to
/// sqlparser's own `Display`.
pub fn format_token(token: &Token) -> String {
    match token {
        Token::Word(w) => format_word(w),
        Token::Number(n, _) => n.clone(),
        Token::SingleQuotedString(s) => quote_string_literal(s),
        Token::LParen => "(".to_string(),
        Token::RParen => ")".to_string(),
        Token::Comma => ",".to_string(),
        Token::Period => ".".to_string(),
        Token::Colon => ":".to_string(),
        Token::Eq => "=".to_string(),
        Token::Neq => "<>".to_string(),
        Token::EOF => "end of input".to_string(),
        _ => format!("{}", token),
    }
}

/// Quote a string value as an SQL literal, doubling embedded quotes.
pub fn quote_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Whether `word` starts a clause or join and so terminates a range variable.
pub fn is_clause_keyword(word: &str) -> bool {
    CLAUSE_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(word))
}
