//! Physical mapping records: entity→table, property→column, relationship→join.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// JPA inheritance strategy of the hierarchy an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InheritanceStrategy {
    #[default]
    None,
    SingleTable,
    Joined,
}

/// Cardinality of a navigable relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

/// Which table of a relationship holds its foreign key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignKeyOwner {
    /// `source.fk = target.id`
    Source,
    /// `target.fk = source.id`
    Target,
    /// Link rows in a join table: `jt.source_column = source.id`,
    /// `jt.target_column = target.id`
    JoinTable {
        table: String,
        source_column: String,
        target_column: String,
    },
}

/// One property's physical column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub property_name: String,
    pub column_name: String,
    pub owning_table: String,
    /// Declared Java type, when the declaration carried one
    pub declared_type: Option<String>,
}

/// One navigable relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinMapping {
    pub source_entity: String,
    pub property_name: String,
    pub target_entity: String,
    /// Foreign key column; for join tables this is the column pointing at the source
    pub foreign_key_column: String,
    pub kind: RelationshipKind,
    pub owner: ForeignKeyOwner,
}

impl JoinMapping {
    /// Whether the foreign key sits on the source entity's table, so that
    /// `alias.property.id` can be read without joining.
    pub fn is_source_owned(&self) -> bool {
        matches!(self.owner, ForeignKeyOwner::Source)
    }
}

/// One entity's physical mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    pub entity_name: String,
    pub table_name: String,
    pub id_property: String,
    pub id_column: String,
    /// Properties declared on this entity itself (inherited ones live on the parent)
    pub columns: IndexMap<String, ColumnMapping>,
    pub strategy: InheritanceStrategy,
    pub discriminator_column: Option<String>,
    pub discriminator_value: Option<String>,
    /// Entity name of the direct superclass mapping
    pub parent: Option<String>,
    pub is_abstract: bool,
}

impl TableMapping {
    /// A plain mapping with no inheritance and only an id column.
    pub fn new(entity_name: &str, table_name: &str, id_column: &str) -> Self {
        let mut mapping = Self {
            entity_name: entity_name.to_string(),
            table_name: table_name.to_string(),
            id_property: "id".to_string(),
            id_column: id_column.to_string(),
            columns: IndexMap::new(),
            strategy: InheritanceStrategy::None,
            discriminator_column: None,
            discriminator_value: None,
            parent: None,
            is_abstract: false,
        };
        mapping.add_column("id", id_column, None);
        mapping
    }

    pub fn add_column(&mut self, property: &str, column: &str, declared_type: Option<&str>) {
        self.columns.insert(
            property.to_string(),
            ColumnMapping {
                property_name: property.to_string(),
                column_name: column.to_string(),
                owning_table: self.table_name.clone(),
                declared_type: declared_type.map(str::to_string),
            },
        );
    }

    pub fn column(&self, property: &str) -> Option<&ColumnMapping> {
        self.columns.get(property)
    }

    /// Whether queries against this entity need a join to an ancestor table.
    pub fn is_joined_child(&self) -> bool {
        self.strategy == InheritanceStrategy::Joined && self.parent.is_some()
    }

    /// Whether queries against this entity need an implicit discriminator filter.
    pub fn is_single_table_child(&self) -> bool {
        self.strategy == InheritanceStrategy::SingleTable && self.parent.is_some()
    }
}
