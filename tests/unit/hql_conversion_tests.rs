//! JPQL/HQL conversion tests: joins, projections, parameters, statements

use pretty_assertions::assert_eq;

use rust_queryconv::convert::{
    ConversionFailureReason, HibernateQueryConverter, JpaQueryConverter, ParameterMapping,
};
use rust_queryconv::DatabaseDialect;

use crate::common::{self, convert, convert_sql};

fn failure_reason(query: &str) -> Option<ConversionFailureReason> {
    convert(query, DatabaseDialect::Postgresql).failure_reason()
}

// ============================================================================
// Basic SELECT
// ============================================================================

#[test]
fn test_select_entity_alias_becomes_star() {
    assert_eq!(
        convert_sql("SELECT c FROM Customer c WHERE c.name = :name"),
        "SELECT * FROM customers c WHERE c.name = ?"
    );
}

#[test]
fn test_from_without_select() {
    assert_eq!(
        convert_sql("FROM Customer WHERE name = :name"),
        "SELECT * FROM customers WHERE customers.name = ?"
    );
}

#[test]
fn test_constructor_projection_is_flattened() {
    assert_eq!(
        convert_sql("SELECT NEW com.example.Summary(c.name, c.email) FROM Customer c"),
        "SELECT c.name, c.email FROM customers c"
    );
}

#[test]
fn test_order_by_with_nulls() {
    assert_eq!(
        convert_sql("SELECT c FROM Customer c ORDER BY c.name DESC NULLS LAST"),
        "SELECT * FROM customers c ORDER BY c.name DESC NULLS LAST"
    );
}

#[test]
fn test_like_parameter() {
    let result = convert(
        "SELECT c FROM Customer c WHERE c.email LIKE :pattern",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.native_sql(),
        Some("SELECT * FROM customers c WHERE c.email LIKE ?")
    );
    assert_eq!(
        result.parameter_mappings(),
        &[ParameterMapping::new(
            "pattern",
            1,
            None,
            Some("email".to_string())
        )]
    );
}

// ============================================================================
// Relationship joins
// ============================================================================

#[test]
fn test_many_to_one_join() {
    let result = convert(
        "SELECT o FROM Order o JOIN o.customer c WHERE c.name = :name",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.native_sql(),
        Some("SELECT * FROM orders o INNER JOIN customers c ON o.customer_id = c.id WHERE c.name = ?")
    );
    let tables: Vec<&str> = result
        .referenced_tables()
        .unwrap()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(tables, vec!["customers", "orders"]);
}

#[test]
fn test_one_to_many_join() {
    assert_eq!(
        convert_sql("SELECT c FROM Customer c JOIN c.orders o WHERE o.status = 'OPEN'"),
        "SELECT * FROM customers c INNER JOIN orders o ON o.customer_id = c.id WHERE o.status = 'OPEN'"
    );
}

#[test]
fn test_left_join_fetch() {
    assert_eq!(
        convert_sql("SELECT c FROM Customer c LEFT JOIN FETCH c.orders o"),
        "SELECT * FROM customers c LEFT JOIN orders o ON o.customer_id = c.id"
    );
}

#[test]
fn test_many_to_many_join_uses_link_table() {
    assert_eq!(
        convert_sql("SELECT p FROM Order o JOIN o.products p WHERE o.id = :id"),
        "SELECT * FROM orders o \
         INNER JOIN orders_product p_orders_product ON p_orders_product.order_id = o.id \
         INNER JOIN product p ON p.id = p_orders_product.products_id \
         WHERE o.id = ?"
    );
}

#[test]
fn test_foreign_key_id_needs_no_join() {
    let result = convert(
        "SELECT o FROM Order o WHERE o.customer.id = :customerId",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.native_sql(),
        Some("SELECT * FROM orders o WHERE o.customer_id = ?")
    );
    assert_eq!(
        result.parameter_mappings()[0].column_name.as_deref(),
        Some("customer_id")
    );
}

#[test]
fn test_implicit_join_for_navigation() {
    assert_eq!(
        convert_sql("SELECT o FROM Order o WHERE o.customer.name = :name"),
        "SELECT * FROM orders o INNER JOIN customers o_customer ON o.customer_id = o_customer.id WHERE o_customer.name = ?"
    );
}

#[test]
fn test_implicit_join_is_created_once() {
    let sql = convert_sql(
        "SELECT o FROM Order o WHERE o.customer.name = :name OR o.customer.email = :email",
    );
    assert_eq!(sql.matches("INNER JOIN customers").count(), 1);
    assert!(sql.ends_with("WHERE o_customer.name = ? OR o_customer.email = ?"));
}

#[test]
fn test_aggregate_with_group_by_and_having() {
    assert_eq!(
        convert_sql(
            "SELECT c.name, COUNT(o) FROM Customer c JOIN c.orders o GROUP BY c.name HAVING COUNT(o) > 1"
        ),
        "SELECT c.name, COUNT(o.id) FROM customers c INNER JOIN orders o ON o.customer_id = c.id GROUP BY c.name HAVING COUNT(o.id) > 1"
    );
}

// ============================================================================
// Sub-selects
// ============================================================================

#[test]
fn test_correlated_exists() {
    assert_eq!(
        convert_sql(
            "SELECT c FROM Customer c WHERE EXISTS (SELECT o FROM Order o WHERE o.customer = c)"
        ),
        "SELECT * FROM customers c WHERE EXISTS (SELECT o.id FROM orders o WHERE o.customer_id = c.id)"
    );
}

#[test]
fn test_in_subquery() {
    assert_eq!(
        convert_sql(
            "SELECT c FROM Customer c WHERE c.id IN (SELECT o.customer.id FROM Order o WHERE o.status = :status)"
        ),
        "SELECT * FROM customers c WHERE c.id IN (SELECT o.customer_id FROM orders o WHERE o.status = ?)"
    );
}

// ============================================================================
// Parameters and dialects
// ============================================================================

#[test]
fn test_positional_parameters_keep_their_ordinals() {
    let result = convert(
        "SELECT c FROM Customer c WHERE c.email = ?2 AND c.name = ?1",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.native_sql(),
        Some("SELECT * FROM customers c WHERE c.email = ? AND c.name = ?")
    );
    assert_eq!(
        result.parameter_mappings(),
        &[
            ParameterMapping::new("2", 1, None, Some("email".to_string())),
            ParameterMapping::new("1", 2, None, Some("name".to_string())),
        ]
    );
}

#[test]
fn test_repeated_named_parameter_gets_each_position() {
    let result = convert(
        "SELECT c FROM Customer c WHERE c.name = :term OR c.email = :term",
        DatabaseDialect::Postgresql,
    );
    let positions: Vec<(String, usize)> = result
        .parameter_mappings()
        .iter()
        .map(|p| (p.original_name.clone(), p.position))
        .collect();
    assert_eq!(
        positions,
        vec![("term".to_string(), 1), ("term".to_string(), 2)]
    );
}

#[test]
fn test_boolean_literal_per_dialect() {
    let query = "SELECT c FROM Customer c WHERE c.active = true";
    assert_eq!(
        convert(query, DatabaseDialect::Postgresql).native_sql(),
        Some("SELECT * FROM customers c WHERE c.active = true")
    );
    assert_eq!(
        convert(query, DatabaseDialect::Oracle).native_sql(),
        Some("SELECT * FROM customers c WHERE c.active = 1")
    );
}

// ============================================================================
// UPDATE / DELETE
// ============================================================================

#[test]
fn test_update_statement() {
    let result = convert(
        "UPDATE Customer c SET c.email = :email WHERE c.id = :id",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.native_sql(),
        Some("UPDATE customers c SET email = ? WHERE c.id = ?")
    );
    assert_eq!(
        result.parameter_mappings(),
        &[
            ParameterMapping::new("email", 1, None, Some("email".to_string())),
            ParameterMapping::new("id", 2, None, Some("id".to_string())),
        ]
    );
}

#[test]
fn test_delete_statement() {
    assert_eq!(
        convert_sql("DELETE FROM Order o WHERE o.status = :status"),
        "DELETE FROM orders o WHERE o.status = ?"
    );
}

#[test]
fn test_update_with_navigation_is_unsupported() {
    assert_eq!(
        failure_reason("UPDATE Order o SET o.status = 'X' WHERE o.customer.name = :name"),
        Some(ConversionFailureReason::UnsupportedConstruct)
    );
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_empty_query_fails() {
    for query in ["", "   "] {
        let result = convert(query, DatabaseDialect::Oracle);
        assert!(!result.is_successful());
        assert!(result.error_message().is_some());
    }
}

#[test]
fn test_unknown_entity() {
    assert_eq!(
        failure_reason("SELECT g FROM Ghost g"),
        Some(ConversionFailureReason::MissingEntityMetadata)
    );
}

#[test]
fn test_unknown_property() {
    assert_eq!(
        failure_reason("SELECT c FROM Customer c WHERE c.nickname = 'x'"),
        Some(ConversionFailureReason::MissingEntityMetadata)
    );
}

#[test]
fn test_unknown_alias() {
    assert_eq!(
        failure_reason("SELECT c FROM Customer c WHERE x.name = 'a'"),
        Some(ConversionFailureReason::UnknownAlias)
    );
}

#[test]
fn test_unknown_relationship() {
    assert_eq!(
        failure_reason("SELECT c FROM Customer c JOIN c.friends f"),
        Some(ConversionFailureReason::UnresolvedJoin)
    );
}

#[test]
fn test_deeply_nested_subqueries_fail() {
    let mut query = String::from("SELECT c0 FROM Customer c0 WHERE c0.id = 1");
    for level in 1..=9 {
        let inner = format!("SELECT c{0}.id FROM Customer c{0} WHERE c{0}.id", level);
        query = query.replacen(
            &format!("c{}.id = 1", level - 1),
            &format!("c{}.id IN ({} = 1)", level - 1, inner),
            1,
        );
    }
    assert_eq!(query.matches("IN (SELECT").count(), 9);
    assert_eq!(
        failure_reason(&query),
        Some(ConversionFailureReason::NestingTooDeep)
    );
}

#[test]
fn test_grammar_failure_is_an_error() {
    let err = HibernateQueryConverter::new()
        .convert_to_native_sql("SELECT c FROM", &common::metadata(), DatabaseDialect::Oracle)
        .unwrap_err();
    assert_eq!(err.reason, ConversionFailureReason::ParserError);
    assert_eq!(err.query, "SELECT c FROM");
}

#[test]
fn test_converter_contract() {
    let converter = HibernateQueryConverter::new();
    assert!(converter.can_convert("select c from Customer c"));
    assert!(!converter.can_convert(""));
    for dialect in DatabaseDialect::ALL {
        assert!(converter.supports_dialect(dialect));
    }
}
