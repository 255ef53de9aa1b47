//! Rewrite passes turning a parsed HQL tree into a physical SQL tree.
//!
//! Each (sub-)query is rewritten in its own alias scope by these ordered
//! passes:
//!
//! 1. relation binding: entities become tables, navigation joins become
//!    real joins with synthesized `ON` predicates, JOINED subclasses get
//!    inner joins to every ancestor table and SINGLE_TABLE subclasses get a
//!    discriminator filter (in `WHERE` for FROM items, in `ON` for joins)
//! 2. projection fix-up: a lone entity alias becomes `*`
//! 3. `TYPE(alias)` comparisons become discriminator tests
//! 4. every remaining `alias.property` path becomes a physical column,
//!    synthesizing inner joins for multi-step navigation
//! 5. sub-selects in expressions are rewritten in a correlated scope
//!
//! Semantic gaps abort the rewrite with a `ConversionFailure`; nothing is
//! ever left half-resolved.

use tracing::debug;

use super::context::{AliasBinding, SqlConversionContext};
use super::ConversionFailureReason;
use crate::error::ConversionFailure;
use crate::model::{ForeignKeyOwner, InheritanceStrategy, TableMapping};
use crate::parser::ast::{
    BinaryOp, ColumnRef, Expr, ExprId, FromItem, Join, JoinOperator, Literal, Query, QueryId,
    QueryKind, Relation, SelectItem, StatementTree, UnaryOp,
};
use crate::util::{simple_name, snake_case};

type RewriteResult<T> = Result<T, ConversionFailure>;

/// Rewrite `tree` in place against the metadata held by `ctx`.
pub fn rewrite_statement(
    tree: &mut StatementTree,
    ctx: &mut SqlConversionContext<'_>,
) -> RewriteResult<()> {
    let root = tree.root();
    rewrite_query(tree, ctx, root, false)
}

fn rewrite_query(
    tree: &mut StatementTree,
    ctx: &mut SqlConversionContext<'_>,
    id: QueryId,
    isolated: bool,
) -> RewriteResult<()> {
    ctx.push_scope(isolated)?;
    let kind = tree.query(id).kind;
    let rewriter = QueryRewriter {
        tree: &mut *tree,
        ctx: &mut *ctx,
        id,
        kind,
        isolated,
        select_aliases: Vec::new(),
    };
    let result = rewriter.run();
    ctx.pop_scope();
    result
}

fn unresolved_discriminator(message: impl Into<String>) -> ConversionFailure {
    ConversionFailure::new(ConversionFailureReason::UnresolvedDiscriminator, message)
}

fn unresolved_join(message: impl Into<String>) -> ConversionFailure {
    ConversionFailure::new(ConversionFailureReason::UnresolvedJoin, message)
}

struct QueryRewriter<'a, 'm> {
    tree: &'a mut StatementTree,
    ctx: &'a mut SqlConversionContext<'m>,
    id: QueryId,
    kind: QueryKind,
    /// FROM/JOIN sub-select (or the top-level query when false at depth 1)
    isolated: bool,
    select_aliases: Vec<String>,
}

impl<'a, 'm> QueryRewriter<'a, 'm> {
    fn run(mut self) -> RewriteResult<()> {
        debug!(query = self.id.0, depth = self.ctx.depth(), "rewriting query");
        self.bind_relations()?;
        self.fix_projection();
        self.rewrite_type_functions()?;
        self.resolve_paths()?;
        self.rewrite_expression_subqueries()
    }

    // ========================================================================
    // Relation binding
    // ========================================================================

    fn bind_relations(&mut self) -> RewriteResult<()> {
        let mut query = self.tree.query(self.id).clone();
        let parsed_joins = std::mem::take(&mut query.joins);
        let mut joins = Vec::new();
        let mut where_filters = Vec::new();

        for index in 0..query.from.len() {
            let item = query.from[index].clone();
            match item.relation {
                Relation::Entity(name) => {
                    let mapping = self.entity_mapping(&name)?;
                    let key = item
                        .alias
                        .clone()
                        .unwrap_or_else(|| simple_name(&name).to_string());
                    let qualifier = item
                        .alias
                        .clone()
                        .unwrap_or_else(|| mapping.table_name.clone());

                    query.from[index].relation = Relation::Table(mapping.table_name.clone());
                    self.ctx.reference_table(&mapping.table_name);

                    let mut binding = AliasBinding::entity(mapping, &qualifier, index);
                    if self.kind == QueryKind::Select {
                        self.push_ancestor_joins(&mut binding, &mut joins, JoinOperator::Inner);
                    }
                    if let Some(filter) = self.discriminator_filter(&binding)? {
                        where_filters.push(filter);
                    }
                    self.ctx.register(&key, binding);
                    self.ctx.set_default_binding(&key);
                }
                Relation::Subquery(subquery) => {
                    rewrite_query(self.tree, self.ctx, subquery, true)?;
                    if let Some(alias) = &item.alias {
                        self.ctx.register(alias, AliasBinding::derived(alias, index));
                    }
                }
                Relation::Path(path) => {
                    return Err(ConversionFailure::unsupported(format!(
                        "Path '{}' cannot be used as a FROM item",
                        path.join(".")
                    )));
                }
                Relation::Table(_) => {}
            }

            for join in parsed_joins.iter().filter(|join| join.anchor == index) {
                self.bind_join(join.clone(), &mut joins)?;
            }
        }

        query.joins = joins;
        for filter in where_filters {
            query.selection = Some(self.tree.conjoin(query.selection, filter));
        }
        *self.tree.query_mut(self.id) = query;
        Ok(())
    }

    fn bind_join(&mut self, join: Join, joins: &mut Vec<Join>) -> RewriteResult<()> {
        let Join {
            operator,
            anchor,
            item,
            on,
            ..
        } = join;

        match item.relation {
            Relation::Path(path) if self.ctx.is_alias(&path[0]) => {
                let mut source = self.binding(&path[0]).ok_or_else(|| {
                    ConversionFailure::new(
                        ConversionFailureReason::UnknownAlias,
                        format!("Unknown alias '{}'", path[0]),
                    )
                })?;
                for segment in &path[1..path.len() - 1] {
                    source = self.navigate(&source, segment, joins)?;
                }
                let property = &path[path.len() - 1];
                let binding = self.join_relationship(
                    &source,
                    property,
                    operator,
                    item.alias.as_deref(),
                    anchor,
                    on,
                    joins,
                )?;
                let key = item.alias.unwrap_or_else(|| binding.qualifier.clone());
                self.ctx.register(&key, binding);
            }
            Relation::Path(path) => {
                // not navigation: a package-qualified entity name
                let name = path.join(".");
                self.bind_entity_join(&name, operator, anchor, item.alias, on, joins)?;
            }
            Relation::Entity(name) => {
                self.bind_entity_join(&name, operator, anchor, item.alias, on, joins)?;
            }
            Relation::Subquery(subquery) => {
                rewrite_query(self.tree, self.ctx, subquery, true)?;
                if let Some(alias) = &item.alias {
                    self.ctx.register(alias, AliasBinding::derived(alias, anchor));
                }
                joins.push(Join {
                    operator,
                    anchor,
                    fetch: false,
                    item,
                    on,
                });
            }
            Relation::Table(_) => joins.push(Join {
                operator,
                anchor,
                fetch: false,
                item,
                on,
            }),
        }
        Ok(())
    }

    /// Ad-hoc entity join: `JOIN Order o ON o.customerId = c.id`
    fn bind_entity_join(
        &mut self,
        name: &str,
        operator: JoinOperator,
        anchor: usize,
        alias: Option<String>,
        on: Option<ExprId>,
        joins: &mut Vec<Join>,
    ) -> RewriteResult<()> {
        let mapping = self.entity_mapping(name)?;
        let qualifier = alias
            .clone()
            .unwrap_or_else(|| mapping.table_name.clone());

        let index = joins.len();
        joins.push(Join {
            operator,
            anchor,
            fetch: false,
            item: FromItem {
                relation: Relation::Table(mapping.table_name.clone()),
                alias: alias.clone(),
            },
            on,
        });
        self.ctx.reference_table(&mapping.table_name);

        let mut binding = AliasBinding::entity(mapping, &qualifier, anchor);
        self.push_ancestor_joins(&mut binding, joins, ancestor_operator(operator));
        if let Some(filter) = self.discriminator_filter(&binding)? {
            add_join_condition(self.tree, &mut joins[index], filter);
        }

        let key = alias.unwrap_or_else(|| simple_name(name).to_string());
        self.ctx.register(&key, binding);
        Ok(())
    }

    /// Join the target of relationship `property` of `source`, returning the
    /// target's binding. Join tables produce two joins.
    #[allow(clippy::too_many_arguments)]
    fn join_relationship(
        &mut self,
        source: &AliasBinding<'m>,
        property: &str,
        operator: JoinOperator,
        alias: Option<&str>,
        anchor: usize,
        user_on: Option<ExprId>,
        joins: &mut Vec<Join>,
    ) -> RewriteResult<AliasBinding<'m>> {
        let metadata = self.ctx.metadata();
        let mapping = source.mapping.ok_or_else(|| {
            unresolved_join(format!(
                "Cannot navigate '{}' from derived table '{}'",
                property, source.qualifier
            ))
        })?;
        let relationship = metadata
            .relationship(&mapping.entity_name, property)
            .ok_or_else(|| {
                unresolved_join(format!(
                    "No relationship mapping for {}.{}",
                    mapping.entity_name, property
                ))
            })?;
        let target = self.entity_mapping(&relationship.target_entity)?;
        let declaring = metadata
            .mapping_for_entity(&relationship.source_entity)
            .unwrap_or(mapping);

        let operator = match operator {
            JoinOperator::Cross => JoinOperator::Inner,
            other => other,
        };
        let qualifier = alias
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", source.qualifier, snake_case(property)));
        let source_qualifier = source.qualifier_for(&declaring.entity_name).to_string();

        let on = match &relationship.owner {
            ForeignKeyOwner::Source => self.columns_equal(
                &source_qualifier,
                &relationship.foreign_key_column,
                &qualifier,
                &target.id_column,
            ),
            ForeignKeyOwner::Target => self.columns_equal(
                &qualifier,
                &relationship.foreign_key_column,
                &source_qualifier,
                &declaring.id_column,
            ),
            ForeignKeyOwner::JoinTable {
                table,
                source_column,
                target_column,
            } => {
                let link = format!("{}_{}", qualifier, table);
                let link_on =
                    self.columns_equal(&link, source_column, &source_qualifier, &declaring.id_column);
                joins.push(Join {
                    operator,
                    anchor,
                    fetch: false,
                    item: FromItem {
                        relation: Relation::Table(table.clone()),
                        alias: Some(link.clone()),
                    },
                    on: Some(link_on),
                });
                self.ctx.reference_table(table);
                self.columns_equal(&qualifier, &target.id_column, &link, target_column)
            }
        };
        let on = match user_on {
            Some(user_on) => self.tree.conjoin(Some(on), user_on),
            None => on,
        };

        let index = joins.len();
        joins.push(Join {
            operator,
            anchor,
            fetch: false,
            item: FromItem {
                relation: Relation::Table(target.table_name.clone()),
                alias: Some(qualifier.clone()),
            },
            on: Some(on),
        });
        self.ctx.reference_table(&target.table_name);

        let mut binding = AliasBinding::entity(target, &qualifier, anchor);
        self.push_ancestor_joins(&mut binding, joins, ancestor_operator(operator));
        if let Some(filter) = self.discriminator_filter(&binding)? {
            add_join_condition(self.tree, &mut joins[index], filter);
        }

        debug!(
            source = %source.qualifier,
            property,
            target = %target.table_name,
            "resolved relationship join"
        );
        Ok(binding)
    }

    /// Implicit inner join for `source.property`, created once per path.
    fn navigate(
        &mut self,
        source: &AliasBinding<'m>,
        property: &str,
        joins: &mut Vec<Join>,
    ) -> RewriteResult<AliasBinding<'m>> {
        let path_key = format!("{}.{}", source.qualifier, property);
        if let Some(binding) = self.ctx.implicit_join(&path_key) {
            return Ok(binding.clone());
        }

        let binding = self.join_relationship(
            source,
            property,
            JoinOperator::Inner,
            None,
            source.anchor,
            None,
            joins,
        )?;
        let key = binding.qualifier.clone();
        self.ctx.register(&key, binding.clone());
        self.ctx.remember_implicit_join(&path_key, &key);
        Ok(binding)
    }

    /// Inner-join every JOINED ancestor table of `binding`, nearest first.
    fn push_ancestor_joins(
        &mut self,
        binding: &mut AliasBinding<'m>,
        joins: &mut Vec<Join>,
        operator: JoinOperator,
    ) {
        let Some(mapping) = binding.mapping else {
            return;
        };
        if !mapping.is_joined_child() {
            return;
        }

        let metadata = self.ctx.metadata();
        let mut child_qualifier = binding.qualifier.clone();
        let mut child_id = mapping.id_column.clone();

        for ancestor in metadata.lineage(mapping).into_iter().skip(1) {
            let qualifier = format!("{}_{}", binding.qualifier, ancestor.table_name);
            let on = self.columns_equal(
                &child_qualifier,
                &child_id,
                &qualifier,
                &ancestor.id_column,
            );
            joins.push(Join {
                operator,
                anchor: binding.anchor,
                fetch: false,
                item: FromItem {
                    relation: Relation::Table(ancestor.table_name.clone()),
                    alias: Some(qualifier.clone()),
                },
                on: Some(on),
            });
            self.ctx.reference_table(&ancestor.table_name);
            binding
                .ancestors
                .push((ancestor.entity_name.clone(), qualifier.clone()));

            child_qualifier = qualifier;
            child_id = ancestor.id_column.clone();
        }
    }

    /// Implicit discriminator predicate for a SINGLE_TABLE subclass binding.
    fn discriminator_filter(&mut self, binding: &AliasBinding<'m>) -> RewriteResult<Option<ExprId>> {
        let Some(mapping) = binding.mapping else {
            return Ok(None);
        };
        if !mapping.is_single_table_child() {
            return Ok(None);
        }

        let metadata = self.ctx.metadata();
        let column = metadata.discriminator_column_for(mapping).ok_or_else(|| {
            unresolved_discriminator(format!(
                "No discriminator column for {}",
                mapping.entity_name
            ))
        })?;
        let values = metadata.subtree_discriminator_values(mapping);
        if values.is_empty() {
            return Err(unresolved_discriminator(format!(
                "No concrete discriminator value for {}",
                mapping.entity_name
            )));
        }

        let column = self.column(&binding.qualifier, column, None);
        Ok(Some(self.discriminator_test(column, &values, false)))
    }

    /// `col = 'V'` for one value, `col IN ('A', 'B')` for several.
    fn discriminator_test(&mut self, column: ExprId, values: &[String], negated: bool) -> ExprId {
        let mut literals: Vec<ExprId> = values
            .iter()
            .map(|value| {
                self.tree
                    .add_expr(Expr::Literal(Literal::String(value.clone())))
            })
            .collect();

        if literals.len() == 1 {
            let op = if negated { BinaryOp::NotEq } else { BinaryOp::Eq };
            return self.tree.add_expr(Expr::Binary {
                op,
                left: column,
                right: literals.remove(0),
            });
        }
        self.tree.add_expr(Expr::InList {
            expr: column,
            list: literals,
            negated,
        })
    }

    // ========================================================================
    // Projection
    // ========================================================================

    fn fix_projection(&mut self) {
        if self.kind != QueryKind::Select {
            return;
        }

        let projection = self.tree.query(self.id).projection.clone();
        self.select_aliases = projection
            .iter()
            .filter_map(|item| item.alias.clone())
            .collect();

        if projection.is_empty() {
            let wildcard = self.tree.add_expr(Expr::Wildcard(None));
            self.tree.query_mut(self.id).projection.push(SelectItem {
                expr: wildcard,
                alias: None,
            });
            return;
        }

        // in IN/EXISTS sub-selects a bare alias keeps meaning its id
        let star_allowed = self.isolated || self.ctx.depth() == 1;
        if !star_allowed {
            return;
        }

        let single = projection.len() == 1;
        for item in projection {
            let Expr::Path(path) = self.tree.expr(item.expr) else {
                continue;
            };
            if path.len() != 1 {
                continue;
            }
            let Some(binding) = self.binding(&path[0]) else {
                continue;
            };
            let wildcard = if single {
                Expr::Wildcard(None)
            } else {
                Expr::Wildcard(Some(binding.qualifier.clone()))
            };
            self.tree.set_expr(item.expr, wildcard);
        }
    }

    // ========================================================================
    // TYPE()
    // ========================================================================

    fn rewrite_type_functions(&mut self) -> RewriteResult<()> {
        for id in self.tree.query_exprs(self.id) {
            let replacement = match self.tree.expr(id).clone() {
                Expr::Binary { op, left, right } if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) => {
                    let (alias, target) = match (self.tree.expr(left), self.tree.expr(right)) {
                        (Expr::Type(alias), _) => (alias.clone(), right),
                        (_, Expr::Type(alias)) => (alias.clone(), left),
                        _ => continue,
                    };
                    self.type_test(&alias, &[target], op == BinaryOp::NotEq)?
                }
                Expr::InList {
                    expr,
                    list,
                    negated,
                } => match self.tree.expr(expr) {
                    Expr::Type(alias) => {
                        let alias = alias.clone();
                        self.type_test(&alias, &list, negated)?
                    }
                    _ => continue,
                },
                _ => continue,
            };
            self.tree.set_expr(id, replacement);
        }

        // TYPE(alias) outside a comparison, e.g. in the projection
        for id in self.tree.query_exprs(self.id) {
            let Expr::Type(alias) = self.tree.expr(id).clone() else {
                continue;
            };
            let binding = self.require_binding(&alias)?;
            let mapping = binding.mapping.ok_or_else(|| {
                unresolved_discriminator(format!("'{}' is not an entity alias", alias))
            })?;
            if mapping.strategy != InheritanceStrategy::SingleTable {
                return Err(unresolved_discriminator(format!(
                    "TYPE({}) needs a discriminator column",
                    alias
                )));
            }
            let column = self
                .ctx
                .metadata()
                .discriminator_column_for(mapping)
                .ok_or_else(|| {
                    unresolved_discriminator(format!(
                        "No discriminator column for {}",
                        mapping.entity_name
                    ))
                })?;
            self.tree.set_expr(
                id,
                Expr::Column(ColumnRef::new(Some(&binding.qualifier), column)),
            );
        }
        Ok(())
    }

    /// Replacement for `TYPE(alias) [NOT] IN (targets)` / `= target`.
    fn type_test(&mut self, alias: &str, targets: &[ExprId], negated: bool) -> RewriteResult<Expr> {
        let binding = self.require_binding(alias)?;
        let mapping = binding.mapping.ok_or_else(|| {
            unresolved_discriminator(format!("'{}' is not an entity alias", alias))
        })?;

        match mapping.strategy {
            InheritanceStrategy::SingleTable => {
                let column = self
                    .ctx
                    .metadata()
                    .discriminator_column_for(mapping)
                    .ok_or_else(|| {
                        unresolved_discriminator(format!(
                            "No discriminator column for {}",
                            mapping.entity_name
                        ))
                    })?;
                let values = targets
                    .iter()
                    .map(|target| self.type_target_value(*target))
                    .collect::<RewriteResult<Vec<_>>>()?;
                let column = self.column(&binding.qualifier, column, None);
                let test = self.discriminator_test(column, &values, negated);
                Ok(self.tree.expr(test).clone())
            }
            InheritanceStrategy::Joined => {
                let mut tests = Vec::new();
                for target in targets {
                    let target = self.type_target_mapping(*target)?;
                    let test = self.exact_type_test(&binding.qualifier, mapping, target);
                    tests.push(if negated { self.negate(test) } else { test });
                }

                let connector = if negated { BinaryOp::And } else { BinaryOp::Or };
                let mut tests = tests.into_iter();
                let first = tests
                    .next()
                    .ok_or_else(|| unresolved_discriminator("TYPE() needs at least one entity"))?;
                let combined = tests.fold(first, |left, right| {
                    self.tree.add_expr(Expr::Binary {
                        op: connector,
                        left,
                        right,
                    })
                });
                if combined == first {
                    return Ok(self.tree.expr(first).clone());
                }
                Ok(Expr::Nested(combined))
            }
            InheritanceStrategy::None => Err(unresolved_discriminator(format!(
                "{} is not part of an inheritance hierarchy",
                mapping.entity_name
            ))),
        }
    }

    /// Rows of `alias` whose concrete type is exactly `target`: present in the
    /// target's table and absent from every direct subclass table.
    fn exact_type_test(
        &mut self,
        qualifier: &str,
        alias_mapping: &TableMapping,
        target: &'m TableMapping,
    ) -> ExprId {
        let children: Vec<&'m TableMapping> = self
            .ctx
            .metadata()
            .children_of(&target.entity_name)
            .collect();

        // the alias's own table needs no membership test
        let include = target.entity_name != alias_mapping.entity_name || children.is_empty();
        let (mut test, excluded) = if include {
            let test = self.table_membership(qualifier, &alias_mapping.id_column, target, false);
            (test, &children[..])
        } else {
            let test = self.table_membership(qualifier, &alias_mapping.id_column, children[0], true);
            (test, &children[1..])
        };
        for child in excluded {
            let right = self.table_membership(qualifier, &alias_mapping.id_column, child, true);
            test = self.tree.add_expr(Expr::Binary {
                op: BinaryOp::And,
                left: test,
                right,
            });
        }
        test
    }

    /// `qualifier.id [NOT] IN (SELECT id FROM table)`
    fn table_membership(
        &mut self,
        qualifier: &str,
        id_column: &str,
        table: &TableMapping,
        negated: bool,
    ) -> ExprId {
        let mut subquery = Query::new(QueryKind::Select);
        let id = self
            .tree
            .add_expr(Expr::Column(ColumnRef::new(None, &table.id_column)));
        subquery.projection.push(SelectItem {
            expr: id,
            alias: None,
        });
        subquery.from.push(FromItem {
            relation: Relation::Table(table.table_name.clone()),
            alias: None,
        });
        let subquery = self.tree.add_query(subquery);
        self.ctx.reference_table(&table.table_name);

        let expr = self.column(qualifier, id_column, None);
        self.tree.add_expr(Expr::InSubquery {
            expr,
            subquery,
            negated,
        })
    }

    fn negate(&mut self, test: ExprId) -> ExprId {
        match self.tree.expr(test).clone() {
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => self.tree.add_expr(Expr::InSubquery {
                expr,
                subquery,
                negated: !negated,
            }),
            _ => {
                let nested = self.tree.add_expr(Expr::Nested(test));
                self.tree.add_expr(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: nested,
                })
            }
        }
    }

    fn type_target_mapping(&self, target: ExprId) -> RewriteResult<&'m TableMapping> {
        match self.tree.expr(target) {
            Expr::Path(path) => self.entity_mapping(&path.join(".")),
            _ => Err(unresolved_discriminator(
                "TYPE() must be compared with an entity name",
            )),
        }
    }

    fn type_target_value(&self, target: ExprId) -> RewriteResult<String> {
        if let Expr::Literal(Literal::String(value)) = self.tree.expr(target) {
            return Ok(value.clone());
        }
        let mapping = self.type_target_mapping(target)?;
        mapping.discriminator_value.clone().ok_or_else(|| {
            unresolved_discriminator(format!(
                "{} has no discriminator value",
                mapping.entity_name
            ))
        })
    }

    // ========================================================================
    // Paths
    // ========================================================================

    fn resolve_paths(&mut self) -> RewriteResult<()> {
        let mut query = self.tree.query(self.id).clone();
        let joins_before = query.joins.len();
        let mut joins = std::mem::take(&mut query.joins);

        for id in self.tree.query_exprs(self.id) {
            if let Expr::Path(path) = self.tree.expr(id).clone() {
                let column = self.resolve_path(&path, &mut joins)?;
                self.tree.set_expr(id, column);
            }
        }

        if self.kind != QueryKind::Select && joins.len() > joins_before {
            return Err(ConversionFailure::unsupported(
                "Implicit joins are not supported in UPDATE or DELETE statements",
            ));
        }

        // SET targets are plain column names
        for assignment in &query.assignments {
            if let Expr::Column(column) = self.tree.expr(assignment.target).clone() {
                self.tree.set_expr(
                    assignment.target,
                    Expr::Column(ColumnRef {
                        qualifier: None,
                        ..column
                    }),
                );
            }
        }

        query.joins = joins;
        *self.tree.query_mut(self.id) = query;
        Ok(())
    }

    fn resolve_path(&mut self, path: &[String], joins: &mut Vec<Join>) -> RewriteResult<Expr> {
        let head = &path[0];

        if let Some(binding) = self.binding(head) {
            if path.len() == 1 {
                return self.id_column(&binding);
            }
            return self.resolve_property(&binding, &path[1..], joins);
        }

        if path.len() == 1 && self.select_aliases.iter().any(|alias| alias == head) {
            return Ok(Expr::Column(ColumnRef::new(None, head)));
        }

        // unqualified property of the (single) FROM entity
        if let Some(binding) = self.ctx.default_binding().cloned() {
            let known = match binding.mapping {
                Some(mapping) => {
                    let metadata = self.ctx.metadata();
                    metadata.column_for_property(&mapping.entity_name, head).is_some()
                        || metadata.relationship(&mapping.entity_name, head).is_some()
                }
                None => false,
            };
            if known || path.len() == 1 {
                return self.resolve_property(&binding, path, joins);
            }
        }

        Err(ConversionFailure::new(
            ConversionFailureReason::UnknownAlias,
            format!("Unknown alias '{}' in '{}'", head, path.join(".")),
        ))
    }

    fn resolve_property(
        &mut self,
        binding: &AliasBinding<'m>,
        properties: &[String],
        joins: &mut Vec<Join>,
    ) -> RewriteResult<Expr> {
        let Some(mapping) = binding.mapping else {
            // derived table columns are named by its sub-select
            if properties.len() == 1 {
                return Ok(Expr::Column(ColumnRef::new(
                    Some(&binding.qualifier),
                    &properties[0],
                )));
            }
            return Err(unresolved_join(format!(
                "Cannot navigate '{}' from derived table '{}'",
                properties.join("."),
                binding.qualifier
            )));
        };
        let metadata = self.ctx.metadata();
        let property = &properties[0];

        if properties.len() == 1 {
            let owned = metadata
                .lineage(mapping)
                .into_iter()
                .find_map(|owner| owner.column(property).map(|column| (owner, column)));
            if let Some((owner, column)) = owned {
                if self.kind != QueryKind::Select && owner.table_name != mapping.table_name {
                    return Err(ConversionFailure::unsupported(format!(
                        "{}.{} lives in parent table {}; multi-table UPDATE/DELETE is not supported",
                        mapping.entity_name, property, owner.table_name
                    )));
                }
                return Ok(Expr::Column(ColumnRef {
                    qualifier: Some(binding.qualifier_for(&owner.entity_name).to_string()),
                    name: column.column_name.clone(),
                    declared_type: column.declared_type.clone(),
                }));
            }

            if let Some(relationship) = metadata.relationship(&mapping.entity_name, property) {
                if relationship.is_source_owned() {
                    let qualifier = binding.qualifier_for(&relationship.source_entity);
                    return Ok(Expr::Column(ColumnRef::new(
                        Some(qualifier),
                        &relationship.foreign_key_column,
                    )));
                }
                let target = self.navigate(binding, property, joins)?;
                return self.id_column(&target);
            }

            return Err(ConversionFailure::missing_metadata(format!(
                "No column mapping for {}.{}",
                mapping.entity_name, property
            )));
        }

        let relationship = metadata
            .relationship(&mapping.entity_name, property)
            .ok_or_else(|| {
                ConversionFailure::missing_metadata(format!(
                    "No relationship or column mapping for {}.{}",
                    mapping.entity_name, property
                ))
            })?;

        // o.customer.id reads the foreign key without joining
        if properties.len() == 2 && relationship.is_source_owned() {
            let target = self.entity_mapping(&relationship.target_entity)?;
            if properties[1] == target.id_property {
                let qualifier = binding.qualifier_for(&relationship.source_entity);
                return Ok(Expr::Column(ColumnRef::new(
                    Some(qualifier),
                    &relationship.foreign_key_column,
                )));
            }
        }

        let target = self.navigate(binding, property, joins)?;
        self.resolve_property(&target, &properties[1..], joins)
    }

    fn id_column(&self, binding: &AliasBinding<'m>) -> RewriteResult<Expr> {
        let mapping = binding.mapping.ok_or_else(|| {
            ConversionFailure::unsupported(format!(
                "Derived table '{}' has no identifier",
                binding.qualifier
            ))
        })?;
        let declared_type = mapping
            .column(&mapping.id_property)
            .and_then(|column| column.declared_type.clone());
        Ok(Expr::Column(ColumnRef {
            qualifier: Some(binding.qualifier.clone()),
            name: mapping.id_column.clone(),
            declared_type,
        }))
    }

    // ========================================================================
    // Sub-selects
    // ========================================================================

    fn rewrite_expression_subqueries(&mut self) -> RewriteResult<()> {
        let subqueries: Vec<QueryId> = self
            .tree
            .query_exprs(self.id)
            .into_iter()
            .filter_map(|id| self.tree.subquery_of(id))
            .collect();
        for subquery in subqueries {
            rewrite_query(self.tree, self.ctx, subquery, false)?;
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Binding of `key` as seen from this query. Bindings of enclosing
    /// queries are anchored at this query's first FROM item.
    fn binding(&self, key: &str) -> Option<AliasBinding<'m>> {
        self.ctx.lookup(key).map(|(binding, local)| {
            let mut binding = binding.clone();
            if !local {
                binding.anchor = 0;
            }
            binding
        })
    }

    fn require_binding(&self, alias: &str) -> RewriteResult<AliasBinding<'m>> {
        self.binding(alias).ok_or_else(|| {
            ConversionFailure::new(
                ConversionFailureReason::UnknownAlias,
                format!("Unknown alias '{}'", alias),
            )
        })
    }

    fn entity_mapping(&self, name: &str) -> RewriteResult<&'m TableMapping> {
        self.ctx
            .metadata()
            .mapping_for_entity(name)
            .ok_or_else(|| {
                ConversionFailure::missing_metadata(format!("No mapping for entity {}", name))
            })
    }

    fn column(&mut self, qualifier: &str, name: &str, declared_type: Option<String>) -> ExprId {
        self.tree.add_expr(Expr::Column(ColumnRef {
            qualifier: Some(qualifier.to_string()),
            name: name.to_string(),
            declared_type,
        }))
    }

    fn columns_equal(
        &mut self,
        left_qualifier: &str,
        left_column: &str,
        right_qualifier: &str,
        right_column: &str,
    ) -> ExprId {
        let left = self.column(left_qualifier, left_column, None);
        let right = self.column(right_qualifier, right_column, None);
        self.tree.add_expr(Expr::Binary {
            op: BinaryOp::Eq,
            left,
            right,
        })
    }
}

/// Ancestor tables of an outer-joined entity must be outer-joined as well.
fn ancestor_operator(operator: JoinOperator) -> JoinOperator {
    match operator {
        JoinOperator::Inner | JoinOperator::Cross => JoinOperator::Inner,
        JoinOperator::Left | JoinOperator::Right => JoinOperator::Left,
    }
}

fn add_join_condition(tree: &mut StatementTree, join: &mut Join, predicate: ExprId) {
    if join.operator == JoinOperator::Cross {
        join.operator = JoinOperator::Inner;
    }
    join.on = Some(tree.conjoin(join.on, predicate));
}
