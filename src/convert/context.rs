//! Scratch state for one conversion call.
//!
//! A `SqlConversionContext` is created per query, borrows the shared
//! metadata and is dropped when the conversion finishes. It owns a stack of
//! alias scopes, one per (sub-)query being rewritten.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::convert::ConversionFailureReason;
use crate::dialect::DatabaseDialect;
use crate::error::ConversionFailure;
use crate::model::{EntityMetadata, TableMapping};

/// Deepest sub-select nesting the rewrite descends into
pub const MAX_SUBQUERY_DEPTH: usize = 8;

/// What an HQL alias stands for in the SQL being produced
#[derive(Debug, Clone)]
pub struct AliasBinding<'m> {
    /// `None` for derived tables, whose columns are passed through as written
    pub mapping: Option<&'m TableMapping>,
    /// Name SQL uses for the row source: the alias, or the table when unaliased
    pub qualifier: String,
    /// FROM item the binding hangs off; synthesized joins are placed after it
    pub anchor: usize,
    /// JOINED ancestors as (entity name, qualifier), nearest first
    pub ancestors: Vec<(String, String)>,
}

impl<'m> AliasBinding<'m> {
    pub fn entity(mapping: &'m TableMapping, qualifier: &str, anchor: usize) -> Self {
        Self {
            mapping: Some(mapping),
            qualifier: qualifier.to_string(),
            anchor,
            ancestors: Vec::new(),
        }
    }

    pub fn derived(qualifier: &str, anchor: usize) -> Self {
        Self {
            mapping: None,
            qualifier: qualifier.to_string(),
            anchor,
            ancestors: Vec::new(),
        }
    }

    /// Qualifier of the table that stores columns declared on `entity`.
    pub fn qualifier_for(&self, entity: &str) -> &str {
        self.ancestors
            .iter()
            .find(|(name, _)| name == entity)
            .map(|(_, qualifier)| qualifier.as_str())
            .unwrap_or(&self.qualifier)
    }
}

#[derive(Debug, Default)]
struct Scope<'m> {
    bindings: IndexMap<String, AliasBinding<'m>>,
    /// Binding that unqualified property names resolve against
    default_binding: Option<String>,
    /// `qualifier.property` -> key of the binding its implicit join produced
    implicit_joins: IndexMap<String, String>,
    /// FROM/JOIN sub-selects cannot see the enclosing query's aliases
    isolated: bool,
}

/// Per-call conversion state: alias scopes, metadata and dialect in use
pub struct SqlConversionContext<'m> {
    metadata: &'m EntityMetadata,
    dialect: DatabaseDialect,
    scopes: Vec<Scope<'m>>,
    referenced_tables: BTreeSet<String>,
}

impl<'m> SqlConversionContext<'m> {
    pub fn new(metadata: &'m EntityMetadata, dialect: DatabaseDialect) -> Self {
        Self {
            metadata,
            dialect,
            scopes: Vec::new(),
            referenced_tables: BTreeSet::new(),
        }
    }

    pub fn metadata(&self) -> &'m EntityMetadata {
        self.metadata
    }

    pub fn dialect(&self) -> DatabaseDialect {
        self.dialect
    }

    /// Number of open scopes (1 while rewriting the top-level query)
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Open the scope of a (sub-)query.
    pub fn push_scope(&mut self, isolated: bool) -> Result<(), ConversionFailure> {
        if self.scopes.len() >= MAX_SUBQUERY_DEPTH {
            return Err(ConversionFailure::new(
                ConversionFailureReason::NestingTooDeep,
                format!("Sub-queries nested deeper than {} levels", MAX_SUBQUERY_DEPTH),
            ));
        }
        self.scopes.push(Scope {
            isolated,
            ..Scope::default()
        });
        Ok(())
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind `key` (an HQL alias) in the innermost scope.
    pub fn register(&mut self, key: &str, binding: AliasBinding<'m>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(key.to_string(), binding);
        }
    }

    /// Make `key` the binding unqualified property names resolve against,
    /// unless the scope already has one.
    pub fn set_default_binding(&mut self, key: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.default_binding.is_none() {
                scope.default_binding = Some(key.to_string());
            }
        }
    }

    /// Find `key`, innermost scope first. The flag tells whether the binding
    /// belongs to the innermost scope.
    pub fn lookup(&self, key: &str) -> Option<(&AliasBinding<'m>, bool)> {
        let innermost = self.scopes.len().checked_sub(1)?;
        for (index, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(binding) = scope.bindings.get(key) {
                return Some((binding, index == innermost));
            }
            if scope.isolated {
                break;
            }
        }
        None
    }

    pub fn is_alias(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn default_binding(&self) -> Option<&AliasBinding<'m>> {
        let scope = self.scopes.last()?;
        scope
            .default_binding
            .as_deref()
            .and_then(|key| scope.bindings.get(key))
    }

    /// Binding produced earlier for the implicit join `path_key` in this scope.
    pub fn implicit_join(&self, path_key: &str) -> Option<&AliasBinding<'m>> {
        let scope = self.scopes.last()?;
        scope
            .implicit_joins
            .get(path_key)
            .and_then(|key| scope.bindings.get(key))
    }

    pub fn remember_implicit_join(&mut self, path_key: &str, binding_key: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope
                .implicit_joins
                .insert(path_key.to_string(), binding_key.to_string());
        }
    }

    pub fn reference_table(&mut self, table: &str) {
        self.referenced_tables.insert(table.to_string());
    }

    pub fn referenced_tables(&self) -> &BTreeSet<String> {
        &self.referenced_tables
    }

    pub fn into_referenced_tables(self) -> BTreeSet<String> {
        self.referenced_tables
    }
}
