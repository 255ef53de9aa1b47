//! Derived-query (repository method name) conversion tests

use pretty_assertions::assert_eq;

use rust_queryconv::convert::{
    ConversionFailureReason, DerivedSubject, MethodToSqlConverter, ParameterMapping,
};
use rust_queryconv::parser::split_method_name;
use rust_queryconv::DatabaseDialect;

use crate::common;

fn skeleton(tokens: &[&str]) -> String {
    MethodToSqlConverter::new()
        .build_select_and_where_clauses(tokens, "users")
        .expect("recognised subject")
        .sql
}

fn method_sql(name: &str, dialect: DatabaseDialect) -> String {
    let result = MethodToSqlConverter::new().convert_method(name, &[], "users", dialect);
    result
        .native_sql()
        .unwrap_or_else(|| panic!("{} failed: {:?}", name, result.error_message()))
        .to_string()
}

// ============================================================================
// Skeleton construction
// ============================================================================

#[test]
fn test_find_all() {
    assert_eq!(skeleton(&["findAll"]), "SELECT * FROM users");
}

#[test]
fn test_find_all_by_id() {
    assert_eq!(skeleton(&["findAllById"]), "SELECT * FROM users WHERE id IN (?)");
}

#[test]
fn test_find_by_single_property() {
    assert_eq!(skeleton(&["findBy", "Name"]), "SELECT * FROM users WHERE name = ? ");
}

#[test]
fn test_find_by_operators_and_connector() {
    assert_eq!(
        skeleton(&["findBy", "Age", "GreaterThan", "And", "Name", "In"]),
        "SELECT * FROM users WHERE age  > ?  AND name  IN (?) "
    );
}

#[test]
fn test_find_all_order_by() {
    assert_eq!(
        skeleton(&["findAll", "OrderBy", "Name", "Desc"]),
        "SELECT * FROM users ORDER BY name DESC "
    );
}

#[test]
fn test_order_by_defaults_to_asc() {
    assert_eq!(
        skeleton(&["findBy", "Status", "OrderBy", "CreatedAt"]),
        "SELECT * FROM users WHERE status = ? ORDER BY created_at ASC "
    );
}

#[test]
fn test_order_by_several_properties() {
    assert_eq!(
        skeleton(&["findAllBy", "OrderBy", "Name", "Asc", "Age", "Desc"]),
        "SELECT * FROM users ORDER BY name ASC, age DESC "
    );
}

#[test]
fn test_multi_word_property_is_snake_cased() {
    assert_eq!(
        skeleton(&["findBy", "NumberOfDoors", "LessThan"]),
        "SELECT * FROM users WHERE number_of_doors  < ? "
    );
}

#[test]
fn test_subjects() {
    assert_eq!(
        skeleton(&["countBy", "Active", "True"]),
        "SELECT COUNT(*) FROM users WHERE active  = true "
    );
    assert_eq!(
        skeleton(&["deleteBy", "Status"]),
        "DELETE FROM users WHERE status = ? "
    );
    assert_eq!(
        skeleton(&["removeBy", "Status"]),
        "DELETE FROM users WHERE status = ? "
    );
    assert_eq!(
        skeleton(&["findDistinctBy", "Name"]),
        "SELECT DISTINCT * FROM users WHERE name = ? "
    );
    assert_eq!(
        skeleton(&["readBy", "Name"]),
        "SELECT * FROM users WHERE name = ? "
    );
}

#[test]
fn test_exists_skeleton_keeps_open_parenthesis() {
    let derived = MethodToSqlConverter::new()
        .build_select_and_where_clauses(&["existsBy", "Email"], "users")
        .unwrap();
    assert_eq!(derived.subject, DerivedSubject::Exists);
    assert_eq!(derived.sql, "SELECT EXISTS (SELECT 1 FROM users WHERE email = ? ");
}

#[test]
fn test_first_and_top_limits() {
    let converter = MethodToSqlConverter::new();
    let first = converter
        .build_select_and_where_clauses(&["findFirstBy", "Name"], "users")
        .unwrap();
    assert!(first.limit_to_one());
    assert_eq!(first.sql, "SELECT * FROM users WHERE name = ? ");

    let top = converter
        .build_select_and_where_clauses(&["findTop10By", "Age", "GreaterThan"], "users")
        .unwrap();
    assert_eq!(top.limit, Some(10));
    assert!(!top.limit_to_one());
}

#[test]
fn test_extended_operators() {
    assert_eq!(
        skeleton(&["findBy", "Age", "GreaterThanEqual"]),
        "SELECT * FROM users WHERE age  >= ? "
    );
    assert_eq!(
        skeleton(&["findBy", "Age", "LessThanEqual"]),
        "SELECT * FROM users WHERE age  <= ? "
    );
    assert_eq!(
        skeleton(&["findBy", "Name", "Not"]),
        "SELECT * FROM users WHERE name  != ? "
    );
    assert_eq!(
        skeleton(&["findBy", "Name", "Not", "Like"]),
        "SELECT * FROM users WHERE name  NOT LIKE ? "
    );
    assert_eq!(
        skeleton(&["findBy", "Id", "Not", "In"]),
        "SELECT * FROM users WHERE id  NOT IN (?) "
    );
    assert_eq!(
        skeleton(&["findBy", "Name", "StartingWith"]),
        "SELECT * FROM users WHERE name  LIKE ? "
    );
    assert_eq!(
        skeleton(&["findBy", "Email", "IsNull"]),
        "SELECT * FROM users WHERE email  IS NULL "
    );
    assert_eq!(
        skeleton(&["findBy", "Email", "IsNotNull"]),
        "SELECT * FROM users WHERE email  IS NOT NULL "
    );
    assert_eq!(
        skeleton(&["findBy", "Active", "False"]),
        "SELECT * FROM users WHERE active  = false "
    );
    assert_eq!(
        skeleton(&["findBy", "Created", "Before"]),
        "SELECT * FROM users WHERE created  < ? "
    );
    assert_eq!(
        skeleton(&["findBy", "Created", "After"]),
        "SELECT * FROM users WHERE created  > ? "
    );
    assert_eq!(
        skeleton(&["findBy", "Name", "Is"]),
        "SELECT * FROM users WHERE name  = ? "
    );
}

#[test]
fn test_between_uses_two_placeholders() {
    let derived = MethodToSqlConverter::new()
        .build_select_and_where_clauses(&["findBy", "Age", "Between"], "users")
        .unwrap();
    assert_eq!(derived.sql, "SELECT * FROM users WHERE age  BETWEEN ? AND ? ");
    assert_eq!(derived.parameter_columns, vec!["age", "age"]);
}

// ============================================================================
// Full conversion
// ============================================================================

#[test]
fn test_convert_method_parameters() {
    let result = MethodToSqlConverter::new().convert_method(
        "findByAgeGreaterThanAndNameIn",
        &["minAge", "names"],
        "users",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.native_sql(),
        Some("SELECT * FROM users WHERE age  > ?  AND name  IN (?) ")
    );
    assert_eq!(
        result.parameter_mappings(),
        &[
            ParameterMapping::new("minAge", 1, None, Some("age".to_string())),
            ParameterMapping::new("names", 2, None, Some("name".to_string())),
        ]
    );
    assert!(result.referenced_tables().unwrap().contains("users"));
}

#[test]
fn test_missing_parameter_names_are_numbered() {
    let result = MethodToSqlConverter::new().convert_method(
        "findByAgeBetween",
        &[],
        "users",
        DatabaseDialect::Postgresql,
    );
    let names: Vec<&str> = result
        .parameter_mappings()
        .iter()
        .map(|p| p.original_name.as_str())
        .collect();
    assert_eq!(names, vec!["param1", "param2"]);
}

#[test]
fn test_limit_per_dialect() {
    assert_eq!(
        method_sql("findFirstByName", DatabaseDialect::Postgresql),
        "SELECT * FROM users WHERE name = ? LIMIT 1"
    );
    assert_eq!(
        method_sql("findFirstByName", DatabaseDialect::Oracle),
        "SELECT * FROM users WHERE name = ? AND ROWNUM <= 1"
    );
    assert_eq!(
        method_sql("findTop3ByOrderByAgeDesc", DatabaseDialect::Oracle),
        "SELECT * FROM users WHERE ROWNUM <= 3 ORDER BY age DESC "
    );
}

#[test]
fn test_limit_covers_every_or_branch() {
    assert_eq!(
        method_sql("findFirstByNameOrEmail", DatabaseDialect::Oracle),
        "SELECT * FROM users WHERE (name = ?  OR email = ? ) AND ROWNUM <= 1"
    );
    assert_eq!(
        method_sql("findFirstByNameOrEmail", DatabaseDialect::Postgresql),
        "SELECT * FROM users WHERE name = ?  OR email = ? LIMIT 1"
    );
    assert_eq!(
        method_sql("findTop2ByNameOrEmailOrderByNameAsc", DatabaseDialect::Oracle),
        "SELECT * FROM users WHERE (name = ?  OR email = ?) AND ROWNUM <= 2 ORDER BY name ASC "
    );
}

#[test]
fn test_boolean_literals_per_dialect() {
    assert_eq!(
        method_sql("countByActiveTrue", DatabaseDialect::Postgresql),
        "SELECT COUNT(*) FROM users WHERE active  = true "
    );
    assert_eq!(
        method_sql("countByActiveTrue", DatabaseDialect::Oracle),
        "SELECT COUNT(*) FROM users WHERE active  = 1 "
    );
}

#[test]
fn test_exists_is_closed_on_conversion() {
    assert_eq!(
        method_sql("existsByEmail", DatabaseDialect::Postgresql),
        "SELECT EXISTS (SELECT 1 FROM users WHERE email = ?)"
    );
}

#[test]
fn test_unknown_subject_fails() {
    let result = MethodToSqlConverter::new().convert_method(
        "save",
        &[],
        "users",
        DatabaseDialect::Postgresql,
    );
    assert!(!result.is_successful());
    assert_eq!(
        result.failure_reason(),
        Some(ConversionFailureReason::UnsupportedConstruct)
    );
}

#[test]
fn test_split_then_build() {
    let tokens = split_method_name("findByNameOrderByAgeDesc");
    assert_eq!(tokens, vec!["findBy", "Name", "OrderBy", "Age", "Desc"]);
    let derived = MethodToSqlConverter::new()
        .build_select_and_where_clauses(&tokens, "users")
        .unwrap();
    assert_eq!(derived.sql, "SELECT * FROM users WHERE name = ? ORDER BY age DESC ");
}

// ============================================================================
// Entity-aware conversion
// ============================================================================

#[test]
fn test_entity_method_uses_mapped_table() {
    let metadata = common::metadata();
    let result = MethodToSqlConverter::new().convert_entity_method(
        "findByNameAndActiveTrue",
        &["name"],
        "Customer",
        &metadata,
        DatabaseDialect::Oracle,
    );
    assert_eq!(
        result.native_sql(),
        Some("SELECT * FROM customers WHERE name = ?  AND active  = 1 ")
    );
    assert_eq!(result.parameter_mappings().len(), 1);
}

#[test]
fn test_entity_method_order_by() {
    let metadata = common::metadata();
    let result = MethodToSqlConverter::new().convert_entity_method(
        "findByActiveTrueOrderByNameDesc",
        &[],
        "Customer",
        &metadata,
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.native_sql(),
        Some("SELECT * FROM customers WHERE active  = true ORDER BY name DESC ")
    );
    assert!(result.parameter_mappings().is_empty());
}

#[test]
fn test_entity_method_unknown_entity() {
    let metadata = common::metadata();
    let result = MethodToSqlConverter::new().convert_entity_method(
        "findByName",
        &[],
        "Ghost",
        &metadata,
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.failure_reason(),
        Some(ConversionFailureReason::MissingEntityMetadata)
    );
}
