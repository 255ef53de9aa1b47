//! Entity metadata resolution tests

use rust_queryconv::error::MetadataError;
use rust_queryconv::model::{
    resolve_entities, EntityDeclaration, EntityMappingResolver, ForeignKeyOwner,
    InheritanceStrategy,
};

use crate::common;

#[test]
fn test_table_name_fallback_for_unknown_entity() {
    let metadata = common::metadata();
    assert_eq!(metadata.table_name_for_entity("Customer"), "customers");
    assert_eq!(metadata.table_name_for_entity("LineItem"), "line_item");
}

#[test]
fn test_single_table_children_share_root_table() {
    let metadata = common::metadata();
    let dog = metadata.mapping_for_entity("Dog").unwrap();
    let cat = metadata.mapping_for_entity("Cat").unwrap();
    assert_eq!(dog.table_name, "animal");
    assert_eq!(cat.table_name, "animal");
    assert_eq!(metadata.discriminator_column_for(dog), Some("dtype"));

    let animal = metadata.mapping_for_entity("Animal").unwrap();
    assert_eq!(
        metadata.subtree_discriminator_values(animal),
        vec!["DOG".to_string(), "Cat".to_string()]
    );
}

#[test]
fn test_joined_children_keep_their_tables() {
    let metadata = common::metadata();
    let car = metadata.mapping_for_entity("Car").unwrap();
    assert_eq!(car.table_name, "car");
    assert_eq!(car.strategy, InheritanceStrategy::Joined);
    assert_eq!(car.parent.as_deref(), Some("Vehicle"));
    assert_eq!(metadata.column_name_for_property("Car", "make"), "make");
    assert_eq!(
        metadata.column_name_for_property("Car", "numberOfDoors"),
        "number_of_doors"
    );
}

#[test]
fn test_relationship_defaults() {
    let metadata = common::metadata();

    let customer = metadata.relationship("Order", "customer").unwrap();
    assert_eq!(customer.foreign_key_column, "customer_id");
    assert!(customer.is_source_owned());

    let orders = metadata.relationship("Customer", "orders").unwrap();
    assert_eq!(orders.owner, ForeignKeyOwner::Target);
    assert_eq!(orders.foreign_key_column, "customer_id");

    let products = metadata.relationship("Order", "products").unwrap();
    assert_eq!(
        products.owner,
        ForeignKeyOwner::JoinTable {
            table: "orders_product".to_string(),
            source_column: "order_id".to_string(),
            target_column: "products_id".to_string(),
        }
    );
}

#[test]
fn test_duplicate_entity_is_rejected() {
    let mut resolver = EntityMappingResolver::new();
    resolver.add(EntityDeclaration::new("User")).unwrap();
    let err = resolver.add(EntityDeclaration::new("User")).unwrap_err();
    assert!(matches!(err, MetadataError::DuplicateEntity { .. }));
}

#[test]
fn test_inheritance_cycle_is_rejected() {
    let err = resolve_entities(vec![
        EntityDeclaration::new("A").extends("B"),
        EntityDeclaration::new("B").extends("A"),
    ])
    .unwrap_err();
    assert!(matches!(err, MetadataError::InheritanceCycle { .. }));
}

#[test]
fn test_build_does_not_touch_previous_snapshot() {
    let mut resolver = EntityMappingResolver::new();
    resolver.extend(common::zoo_entities()).unwrap();
    let first = resolver.build().unwrap();

    resolver.reset();
    resolver.extend(common::shop_entities()).unwrap();
    let second = resolver.build().unwrap();

    assert!(first.mapping_for_entity("Dog").is_some());
    assert!(first.mapping_for_entity("Customer").is_none());
    assert!(second.mapping_for_entity("Customer").is_some());
    assert!(second.mapping_for_entity("Dog").is_none());
}
