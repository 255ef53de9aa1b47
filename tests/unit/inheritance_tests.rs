//! Inheritance mapping tests: SINGLE_TABLE discriminators, JOINED parent joins, TYPE()

use pretty_assertions::assert_eq;

use rust_queryconv::convert::ConversionFailureReason;
use rust_queryconv::DatabaseDialect;

use crate::common::{convert, convert_sql};

// ============================================================================
// SINGLE_TABLE
// ============================================================================

#[test]
fn test_subclass_query_gets_implicit_discriminator() {
    let sql = convert_sql("FROM Dog d WHERE d.breed = 'Labrador'");
    assert!(sql.contains("dtype = 'DOG'"), "{}", sql);
    assert!(sql.contains("breed = 'Labrador'"), "{}", sql);
    assert_eq!(
        sql,
        "SELECT * FROM animal d WHERE d.breed = 'Labrador' AND d.dtype = 'DOG'"
    );
}

#[test]
fn test_discriminator_keeps_or_grouping() {
    assert_eq!(
        convert_sql("SELECT d FROM Dog d WHERE d.breed = :breed OR d.age > 3"),
        "SELECT * FROM animal d WHERE (d.breed = ? OR d.age > 3) AND d.dtype = 'DOG'"
    );
}

#[test]
fn test_root_query_has_no_discriminator() {
    assert_eq!(
        convert_sql("SELECT a FROM Animal a WHERE a.name = :name"),
        "SELECT * FROM animal a WHERE a.name = ?"
    );
}

#[test]
fn test_default_discriminator_value_is_entity_name() {
    assert_eq!(
        convert_sql("SELECT c FROM Cat c WHERE c.indoor = true"),
        "SELECT * FROM animal c WHERE c.indoor = true AND c.dtype = 'Cat'"
    );
}

#[test]
fn test_type_equality() {
    let sql = convert_sql("SELECT a FROM Animal a WHERE TYPE(a) = Dog");
    assert!(!sql.contains("TYPE("), "{}", sql);
    assert!(sql.contains("'DOG'"), "{}", sql);
    assert_eq!(sql, "SELECT * FROM animal a WHERE a.dtype = 'DOG'");
}

#[test]
fn test_type_inequality_and_in() {
    assert_eq!(
        convert_sql("SELECT a FROM Animal a WHERE TYPE(a) <> Dog"),
        "SELECT * FROM animal a WHERE a.dtype <> 'DOG'"
    );
    assert_eq!(
        convert_sql("SELECT a FROM Animal a WHERE TYPE(a) IN (Dog, Cat)"),
        "SELECT * FROM animal a WHERE a.dtype IN ('DOG', 'Cat')"
    );
}

#[test]
fn test_type_of_unknown_entity() {
    let result = convert(
        "SELECT a FROM Animal a WHERE TYPE(a) = Unicorn",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.failure_reason(),
        Some(ConversionFailureReason::MissingEntityMetadata)
    );
}

#[test]
fn test_type_outside_inheritance() {
    let result = convert(
        "SELECT c FROM Customer c WHERE TYPE(c) = Customer",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.failure_reason(),
        Some(ConversionFailureReason::UnresolvedDiscriminator)
    );
}

// ============================================================================
// JOINED
// ============================================================================

#[test]
fn test_joined_child_joins_parent_table() {
    let result = convert(
        "FROM Car c WHERE c.transmission = 'automatic'",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.native_sql(),
        Some("SELECT * FROM car c INNER JOIN vehicle c_vehicle ON c.id = c_vehicle.id WHERE c.transmission = 'automatic'")
    );
    let tables = result.referenced_tables().unwrap();
    assert!(tables.contains("car"));
    assert!(tables.contains("vehicle"));
}

#[test]
fn test_joined_inherited_property_reads_parent_table() {
    assert_eq!(
        convert_sql("SELECT c.make, c.numberOfDoors FROM Car c WHERE c.make = :make"),
        "SELECT c_vehicle.make, c.number_of_doors FROM car c INNER JOIN vehicle c_vehicle ON c.id = c_vehicle.id WHERE c_vehicle.make = ?"
    );
}

#[test]
fn test_joined_type_uses_membership_test() {
    let sql = convert_sql("SELECT v FROM Vehicle v WHERE TYPE(v) = Car");
    assert!(!sql.contains("TYPE("), "{}", sql);
    assert_eq!(
        sql,
        "SELECT * FROM vehicle v WHERE v.id IN (SELECT id FROM car)"
    );
}

#[test]
fn test_joined_type_negated() {
    assert_eq!(
        convert_sql("SELECT v FROM Vehicle v WHERE TYPE(v) <> Car"),
        "SELECT * FROM vehicle v WHERE v.id NOT IN (SELECT id FROM car)"
    );
}

#[test]
fn test_joined_type_of_root_excludes_subclass_rows() {
    assert_eq!(
        convert_sql("SELECT v FROM Vehicle v WHERE TYPE(v) = Vehicle"),
        "SELECT * FROM vehicle v WHERE v.id NOT IN (SELECT id FROM car)"
    );
    assert_eq!(
        convert_sql("SELECT v FROM Vehicle v WHERE TYPE(v) <> Vehicle"),
        "SELECT * FROM vehicle v WHERE v.id IN (SELECT id FROM car)"
    );
}

#[test]
fn test_delete_of_inherited_column_is_unsupported() {
    let result = convert(
        "DELETE FROM Car c WHERE c.make = 'Volvo'",
        DatabaseDialect::Postgresql,
    );
    assert_eq!(
        result.failure_reason(),
        Some(ConversionFailureReason::UnsupportedConstruct)
    );
}
