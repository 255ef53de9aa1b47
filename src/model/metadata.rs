//! Immutable snapshot of every entity mapping of one application.

use indexmap::IndexMap;

use super::{ColumnMapping, JoinMapping, TableMapping};
use crate::util::{simple_name, snake_case};

/// All entity, column and relationship mappings of one analyzed application.
///
/// Built once (usually by `EntityMappingResolver`) and then only read; it is
/// `Send + Sync` and can be shared by conversions running on several threads.
/// Entity lookups accept simple or fully-qualified names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMetadata {
    entity_to_table_mappings: IndexMap<String, TableMapping>,
    relationship_mappings: IndexMap<String, IndexMap<String, JoinMapping>>,
}

impl EntityMetadata {
    pub fn new(
        tables: impl IntoIterator<Item = TableMapping>,
        relationships: impl IntoIterator<Item = JoinMapping>,
    ) -> Self {
        let entity_to_table_mappings = tables
            .into_iter()
            .map(|mapping| (mapping.entity_name.clone(), mapping))
            .collect();

        let mut relationship_mappings: IndexMap<String, IndexMap<String, JoinMapping>> =
            IndexMap::new();
        for join in relationships {
            relationship_mappings
                .entry(join.source_entity.clone())
                .or_default()
                .insert(join.property_name.clone(), join);
        }

        Self {
            entity_to_table_mappings,
            relationship_mappings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity_to_table_mappings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entity_to_table_mappings.len()
    }

    pub fn entity_to_table_mappings(&self) -> &IndexMap<String, TableMapping> {
        &self.entity_to_table_mappings
    }

    /// Every declared property column, paired with its entity name.
    pub fn property_to_column_mappings(&self) -> impl Iterator<Item = (&str, &ColumnMapping)> {
        self.entity_to_table_mappings.values().flat_map(|mapping| {
            mapping
                .columns
                .values()
                .map(move |column| (mapping.entity_name.as_str(), column))
        })
    }

    pub fn relationship_mappings(&self) -> impl Iterator<Item = &JoinMapping> {
        self.relationship_mappings.values().flat_map(|m| m.values())
    }

    pub fn mapping_for_entity(&self, entity: &str) -> Option<&TableMapping> {
        self.entity_to_table_mappings.get(simple_name(entity))
    }

    /// Physical table of `entity`, or a snake_case guess when it is unknown.
    pub fn table_name_for_entity(&self, entity: &str) -> String {
        match self.mapping_for_entity(entity) {
            Some(mapping) => mapping.table_name.clone(),
            None => snake_case(simple_name(entity)),
        }
    }

    pub fn parent_of(&self, mapping: &TableMapping) -> Option<&TableMapping> {
        mapping
            .parent
            .as_deref()
            .and_then(|parent| self.entity_to_table_mappings.get(parent))
    }

    /// `mapping` followed by its ancestors, nearest first.
    ///
    /// Stops early on a broken or circular parent chain.
    pub fn lineage<'a>(&'a self, mapping: &'a TableMapping) -> Vec<&'a TableMapping> {
        let mut chain = vec![mapping];
        let mut current = mapping;
        while let Some(parent) = self.parent_of(current) {
            if chain.iter().any(|m| m.entity_name == parent.entity_name) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Resolve `property` on `entity` or the nearest ancestor declaring it.
    pub fn column_for_property(&self, entity: &str, property: &str) -> Option<&ColumnMapping> {
        let mapping = self.mapping_for_entity(entity)?;
        self.lineage(mapping)
            .into_iter()
            .find_map(|m| m.column(property))
    }

    /// Physical column of `entity.property`, or a snake_case guess.
    pub fn column_name_for_property(&self, entity: &str, property: &str) -> String {
        match self.column_for_property(entity, property) {
            Some(column) => column.column_name.clone(),
            None => snake_case(property),
        }
    }

    /// Resolve relationship `property` on `entity` or an ancestor.
    pub fn relationship(&self, entity: &str, property: &str) -> Option<&JoinMapping> {
        let mapping = self.mapping_for_entity(entity)?;
        self.lineage(mapping).into_iter().find_map(|m| {
            self.relationship_mappings
                .get(&m.entity_name)
                .and_then(|joins| joins.get(property))
        })
    }

    /// Direct subclasses of `entity`, in declaration order.
    pub fn children_of<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a TableMapping> {
        self.entity_to_table_mappings
            .values()
            .filter(move |m| m.parent.as_deref() == Some(entity))
    }

    /// Discriminator column of the hierarchy `mapping` belongs to.
    pub fn discriminator_column_for<'a>(&'a self, mapping: &'a TableMapping) -> Option<&'a str> {
        self.lineage(mapping)
            .into_iter()
            .find_map(|m| m.discriminator_column.as_deref())
    }

    /// Discriminator values of `mapping` and all of its concrete descendants.
    ///
    /// These are the rows a query on `mapping` must see in a shared table.
    pub fn subtree_discriminator_values(&self, mapping: &TableMapping) -> Vec<String> {
        let mut values = Vec::new();
        let mut pending = vec![mapping];
        let mut visited: Vec<&str> = Vec::new();
        while let Some(current) = pending.pop() {
            if visited.contains(&current.entity_name.as_str()) {
                continue;
            }
            visited.push(&current.entity_name);
            if !current.is_abstract {
                if let Some(value) = &current.discriminator_value {
                    values.push(value.clone());
                }
            }
            let mut children: Vec<_> = self.children_of(&current.entity_name).collect();
            children.reverse();
            pending.extend(children);
        }
        values
    }
}
