//! JPQL/HQL and derived-method-name parsing

pub mod ast;
mod hql_parser;
pub mod identifier_utils;
mod method_name;
mod token_parser_base;

pub use ast::{QueryKind, StatementTree};
pub use hql_parser::{parse_hql, HqlParser, ParseError, MAX_EXPRESSION_DEPTH};
pub use method_name::{split_method_name, split_method_name_with_properties};
