//! Entity mapping model

mod mapping;
mod metadata;
mod resolver;

pub use mapping::{
    ColumnMapping, ForeignKeyOwner, InheritanceStrategy, JoinMapping, RelationshipKind,
    TableMapping,
};
pub use metadata::EntityMetadata;
pub use resolver::{
    resolve_entities, EntityDeclaration, EntityMappingResolver, JoinTableDeclaration,
    PropertyDeclaration, RelationshipDeclaration, DEFAULT_DISCRIMINATOR_COLUMN,
};
