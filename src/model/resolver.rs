//! Resolve entity declarations into an `EntityMetadata` snapshot.
//!
//! Declarations come from an external Java-source analysis stage (or a
//! project file). The resolver applies the JPA defaults: snake_case table and
//! column names, `dtype` as SINGLE_TABLE discriminator column, the entity
//! name as default discriminator value, and `<property>_<id>` foreign keys.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{
    ColumnMapping, EntityMetadata, ForeignKeyOwner, InheritanceStrategy, JoinMapping,
    RelationshipKind, TableMapping,
};
use crate::error::MetadataError;
use crate::util::{simple_name, snake_case};

/// Default SINGLE_TABLE discriminator column
pub const DEFAULT_DISCRIMINATOR_COLUMN: &str = "dtype";

/// One `@Entity` class as seen by the source analyzer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityDeclaration {
    /// Simple class name (or `@Entity(name = ...)`)
    pub name: String,
    /// `@Table(name = ...)`
    pub table: Option<String>,
    /// Direct superclass, if it is itself an entity
    pub superclass: Option<String>,
    /// `@Inheritance(strategy = ...)`, normally only on the hierarchy root
    pub inheritance: Option<InheritanceStrategy>,
    /// `@DiscriminatorColumn(name = ...)`
    pub discriminator_column: Option<String>,
    /// `@DiscriminatorValue(...)`
    pub discriminator_value: Option<String>,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub properties: Vec<PropertyDeclaration>,
    pub relationships: Vec<RelationshipDeclaration>,
}

/// A basic (column-backed) property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertyDeclaration {
    pub name: String,
    /// `@Column(name = ...)`
    pub column: Option<String>,
    #[serde(rename = "type")]
    pub java_type: Option<String>,
    /// `@Id`
    pub id: bool,
}

/// `@ManyToOne`, `@OneToMany`, `@OneToOne` or `@ManyToMany` property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDeclaration {
    pub name: String,
    pub kind: RelationshipKind,
    pub target: String,
    /// `@JoinColumn(name = ...)`
    #[serde(default)]
    pub join_column: Option<String>,
    #[serde(default)]
    pub mapped_by: Option<String>,
    #[serde(default)]
    pub join_table: Option<JoinTableDeclaration>,
}

/// `@JoinTable(name = ..., joinColumns = ..., inverseJoinColumns = ...)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTableDeclaration {
    pub name: String,
    #[serde(default)]
    pub join_column: Option<String>,
    #[serde(default)]
    pub inverse_join_column: Option<String>,
}

impl EntityDeclaration {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    pub fn inheritance(mut self, strategy: InheritanceStrategy) -> Self {
        self.inheritance = Some(strategy);
        self
    }

    pub fn discriminator_column(mut self, column: &str) -> Self {
        self.discriminator_column = Some(column.to_string());
        self
    }

    pub fn discriminator_value(mut self, value: &str) -> Self {
        self.discriminator_value = Some(value.to_string());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn id(mut self, name: &str) -> Self {
        self.properties.push(PropertyDeclaration {
            name: name.to_string(),
            id: true,
            ..Default::default()
        });
        self
    }

    pub fn property(mut self, name: &str) -> Self {
        self.properties.push(PropertyDeclaration {
            name: name.to_string(),
            ..Default::default()
        });
        self
    }

    pub fn column(mut self, name: &str, column: &str) -> Self {
        self.properties.push(PropertyDeclaration {
            name: name.to_string(),
            column: Some(column.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDeclaration) -> Self {
        self.relationships.push(relationship);
        self
    }

    fn id_property(&self) -> Option<&PropertyDeclaration> {
        self.properties.iter().find(|p| p.id)
    }
}

impl RelationshipDeclaration {
    pub fn new(name: &str, kind: RelationshipKind, target: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            target: target.to_string(),
            join_column: None,
            mapped_by: None,
            join_table: None,
        }
    }

    pub fn join_column(mut self, column: &str) -> Self {
        self.join_column = Some(column.to_string());
        self
    }

    pub fn mapped_by(mut self, property: &str) -> Self {
        self.mapped_by = Some(property.to_string());
        self
    }

    pub fn join_table(mut self, table: &str, join_column: &str, inverse_join_column: &str) -> Self {
        self.join_table = Some(JoinTableDeclaration {
            name: table.to_string(),
            join_column: Some(join_column.to_string()),
            inverse_join_column: Some(inverse_join_column.to_string()),
        });
        self
    }
}

/// Collects entity declarations and builds metadata from them.
#[derive(Debug, Default)]
pub struct EntityMappingResolver {
    declarations: IndexMap<String, EntityDeclaration>,
}

impl EntityMappingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, declaration: EntityDeclaration) -> Result<&mut Self, MetadataError> {
        let name = simple_name(&declaration.name).to_string();
        if self.declarations.contains_key(&name) {
            return Err(MetadataError::DuplicateEntity { name });
        }
        self.declarations.insert(name, declaration);
        Ok(self)
    }

    pub fn extend(
        &mut self,
        declarations: impl IntoIterator<Item = EntityDeclaration>,
    ) -> Result<&mut Self, MetadataError> {
        for declaration in declarations {
            self.add(declaration)?;
        }
        Ok(self)
    }

    /// Forget every declaration, ready to analyze a different application.
    pub fn reset(&mut self) {
        self.declarations.clear();
    }

    /// Resolve the collected declarations into a new snapshot.
    ///
    /// Previously built metadata is never touched.
    pub fn build(&self) -> Result<EntityMetadata, MetadataError> {
        let mut tables: IndexMap<String, TableMapping> = IndexMap::new();
        for (name, declaration) in &self.declarations {
            let chain = self.lineage(name)?;
            let mapping = self.resolve_table(declaration, &chain);
            tables.insert(name.clone(), mapping);
        }

        let mut joins = Vec::new();
        for (name, declaration) in &self.declarations {
            for relationship in &declaration.relationships {
                joins.push(self.resolve_join(name, relationship, &tables));
            }
        }

        Ok(EntityMetadata::new(tables.into_values(), joins))
    }

    fn superclass_of(&self, declaration: &EntityDeclaration) -> Option<&EntityDeclaration> {
        declaration
            .superclass
            .as_deref()
            .and_then(|s| self.declarations.get(simple_name(s)))
    }

    /// Declared entity `name` followed by its entity ancestors, root last.
    fn lineage(&self, name: &str) -> Result<Vec<&EntityDeclaration>, MetadataError> {
        let mut chain: Vec<&EntityDeclaration> = Vec::new();
        let mut current = self.declarations.get(name);
        while let Some(declaration) = current {
            if chain.iter().any(|d| d.name == declaration.name) {
                let names: Vec<&str> = chain.iter().map(|d| d.name.as_str()).collect();
                return Err(MetadataError::InheritanceCycle {
                    entity: name.to_string(),
                    chain: names.join(" -> "),
                });
            }
            chain.push(declaration);
            current = self.superclass_of(declaration);
        }
        Ok(chain)
    }

    fn has_subclasses(&self, declaration: &EntityDeclaration) -> bool {
        self.declarations.values().any(|d| {
            d.superclass
                .as_deref()
                .is_some_and(|s| simple_name(s) == simple_name(&declaration.name))
        })
    }

    fn resolve_table(
        &self,
        declaration: &EntityDeclaration,
        chain: &[&EntityDeclaration],
    ) -> TableMapping {
        let root = chain.last().copied().unwrap_or(declaration);
        let is_root = chain.len() <= 1;
        let entity_name = simple_name(&declaration.name).to_string();

        let strategy = match root.inheritance {
            Some(strategy) => strategy,
            None if self.has_subclasses(root) || !is_root => InheritanceStrategy::SingleTable,
            None => InheritanceStrategy::None,
        };

        let root_table = root
            .table
            .clone()
            .unwrap_or_else(|| snake_case(simple_name(&root.name)));
        let table_name = match strategy {
            InheritanceStrategy::SingleTable => root_table,
            InheritanceStrategy::Joined | InheritanceStrategy::None => declaration
                .table
                .clone()
                .unwrap_or_else(|| snake_case(&entity_name)),
        };

        // The nearest declared @Id wins; hierarchies share it.
        let (id_property, id_column) = chain
            .iter()
            .find_map(|d| d.id_property())
            .map(|p| {
                (
                    p.name.clone(),
                    p.column.clone().unwrap_or_else(|| snake_case(&p.name)),
                )
            })
            .unwrap_or_else(|| ("id".to_string(), "id".to_string()));

        let discriminator_column = match strategy {
            InheritanceStrategy::SingleTable => Some(
                root.discriminator_column
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DISCRIMINATOR_COLUMN.to_string()),
            ),
            InheritanceStrategy::Joined => root.discriminator_column.clone(),
            InheritanceStrategy::None => None,
        };

        let discriminator_value = match (&declaration.discriminator_value, strategy) {
            (Some(value), _) => Some(value.clone()),
            (None, InheritanceStrategy::SingleTable) if !is_root && !declaration.is_abstract => {
                Some(entity_name.clone())
            }
            _ => None,
        };

        let parent = chain.get(1).map(|d| simple_name(&d.name).to_string());

        let mut columns = IndexMap::new();
        let needs_own_id = is_root || strategy == InheritanceStrategy::Joined;
        if needs_own_id && !declaration.properties.iter().any(|p| p.id) {
            columns.insert(
                id_property.clone(),
                ColumnMapping {
                    property_name: id_property.clone(),
                    column_name: id_column.clone(),
                    owning_table: table_name.clone(),
                    declared_type: None,
                },
            );
        }
        for property in &declaration.properties {
            let column_name = if property.id {
                id_column.clone()
            } else {
                property
                    .column
                    .clone()
                    .unwrap_or_else(|| snake_case(&property.name))
            };
            columns.insert(
                property.name.clone(),
                ColumnMapping {
                    property_name: property.name.clone(),
                    column_name,
                    owning_table: table_name.clone(),
                    declared_type: property.java_type.clone(),
                },
            );
        }

        TableMapping {
            entity_name,
            table_name,
            id_property,
            id_column,
            columns,
            strategy,
            discriminator_column,
            discriminator_value,
            parent,
            is_abstract: declaration.is_abstract,
        }
    }

    fn resolve_join(
        &self,
        source: &str,
        relationship: &RelationshipDeclaration,
        tables: &IndexMap<String, TableMapping>,
    ) -> JoinMapping {
        let target = simple_name(&relationship.target).to_string();
        let id_of = |entity: &str| {
            tables
                .get(entity)
                .map(|t| t.id_column.clone())
                .unwrap_or_else(|| "id".to_string())
        };
        // The owning side of a `mappedBy` relationship, declared on the target
        let owning_side = relationship.mapped_by.as_deref().and_then(|mapped_by| {
            self.declarations
                .get(&target)
                .and_then(|d| d.relationships.iter().find(|r| r.name == mapped_by))
        });

        let (foreign_key_column, owner) = match (relationship.kind, &relationship.mapped_by) {
            (RelationshipKind::ManyToOne, _) | (RelationshipKind::OneToOne, None) => {
                let fk = relationship.join_column.clone().unwrap_or_else(|| {
                    format!("{}_{}", snake_case(&relationship.name), id_of(&target))
                });
                (fk, ForeignKeyOwner::Source)
            }
            (RelationshipKind::OneToMany | RelationshipKind::OneToOne, Some(mapped_by)) => {
                let fk = owning_side
                    .and_then(|r| r.join_column.clone())
                    .unwrap_or_else(|| format!("{}_{}", snake_case(mapped_by), id_of(source)));
                (fk, ForeignKeyOwner::Target)
            }
            (RelationshipKind::OneToMany, None) if relationship.join_column.is_some() => {
                let fk = relationship.join_column.clone().unwrap_or_default();
                (fk, ForeignKeyOwner::Target)
            }
            (RelationshipKind::ManyToMany, Some(_)) if owning_side.is_some() => {
                // Inverse side: reuse the owner's join table with the columns swapped
                let owner_side = owning_side.map(|r| self.join_table_of(&target, r, source, tables));
                match owner_side {
                    Some(ForeignKeyOwner::JoinTable {
                        table,
                        source_column,
                        target_column,
                    }) => (
                        target_column.clone(),
                        ForeignKeyOwner::JoinTable {
                            table,
                            source_column: target_column,
                            target_column: source_column,
                        },
                    ),
                    _ => self.default_join_table(source, relationship, &target, tables),
                }
            }
            _ => {
                let join_table = self.join_table_of(source, relationship, &target, tables);
                match &join_table {
                    ForeignKeyOwner::JoinTable { source_column, .. } => {
                        (source_column.clone(), join_table.clone())
                    }
                    _ => (id_of(source), join_table),
                }
            }
        };

        JoinMapping {
            source_entity: source.to_string(),
            property_name: relationship.name.clone(),
            target_entity: target,
            foreign_key_column,
            kind: relationship.kind,
            owner,
        }
    }

    fn default_join_table(
        &self,
        source: &str,
        relationship: &RelationshipDeclaration,
        target: &str,
        tables: &IndexMap<String, TableMapping>,
    ) -> (String, ForeignKeyOwner) {
        let join_table = self.join_table_of(source, relationship, target, tables);
        let fk = match &join_table {
            ForeignKeyOwner::JoinTable { source_column, .. } => source_column.clone(),
            _ => "id".to_string(),
        };
        (fk, join_table)
    }

    /// Join table of an owning relationship, declared or defaulted to
    /// `<source_table>_<target_table>(<source>_<id>, <property>_<id>)`.
    fn join_table_of(
        &self,
        source: &str,
        relationship: &RelationshipDeclaration,
        target: &str,
        tables: &IndexMap<String, TableMapping>,
    ) -> ForeignKeyOwner {
        let mapping_of = |entity: &str| tables.get(simple_name(entity));
        let id_of = |entity: &str| {
            mapping_of(entity)
                .map(|t| t.id_column.clone())
                .unwrap_or_else(|| "id".to_string())
        };
        let table_of = |entity: &str| {
            mapping_of(entity)
                .map(|t| t.table_name.clone())
                .unwrap_or_else(|| snake_case(simple_name(entity)))
        };

        let declared = relationship.join_table.as_ref();
        let table = declared
            .map(|jt| jt.name.clone())
            .unwrap_or_else(|| format!("{}_{}", table_of(source), table_of(target)));
        let source_column = declared
            .and_then(|jt| jt.join_column.clone())
            .unwrap_or_else(|| format!("{}_{}", snake_case(simple_name(source)), id_of(source)));
        let target_column = declared
            .and_then(|jt| jt.inverse_join_column.clone())
            .unwrap_or_else(|| format!("{}_{}", snake_case(&relationship.name), id_of(target)));

        ForeignKeyOwner::JoinTable {
            table,
            source_column,
            target_column,
        }
    }
}

/// Resolve a batch of declarations in one go.
pub fn resolve_entities(
    declarations: impl IntoIterator<Item = EntityDeclaration>,
) -> Result<EntityMetadata, MetadataError> {
    let mut resolver = EntityMappingResolver::new();
    resolver.extend(declarations)?;
    resolver.build()
}
