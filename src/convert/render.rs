//! SQL text generation from a rewritten statement tree.
//!
//! Parameters are emitted as `?` and recorded in emission order, so a
//! `ParameterMapping`'s position is always the rank of its placeholder in
//! the final text.

use super::ParameterMapping;
use crate::parser::ast::{
    ColumnRef, Expr, ExprId, FromItem, Literal, NullsOrder, Query, QueryId, QueryKind, Relation,
    StatementTree, UnaryOp,
};
use crate::parser::identifier_utils::quote_string_literal;

/// Rendered SQL plus its parameters in placeholder order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSql {
    pub sql: String,
    pub parameters: Vec<ParameterMapping>,
}

/// Render the root query of `tree`.
pub fn render_statement(tree: &StatementTree) -> RenderedSql {
    let mut renderer = Renderer {
        tree,
        out: String::new(),
        parameters: Vec::new(),
    };
    renderer.query(tree.root());
    RenderedSql {
        sql: renderer.out,
        parameters: renderer.parameters,
    }
}

struct Renderer<'t> {
    tree: &'t StatementTree,
    out: String,
    parameters: Vec<ParameterMapping>,
}

impl<'t> Renderer<'t> {
    fn query(&mut self, id: QueryId) {
        let tree = self.tree;
        let query = tree.query(id);
        match query.kind {
            QueryKind::Select => self.select(query),
            QueryKind::Update => self.update(query),
            QueryKind::Delete => self.delete(query),
        }
    }

    fn select(&mut self, query: &'t Query) {
        self.out.push_str("SELECT ");
        if query.distinct {
            self.out.push_str("DISTINCT ");
        }
        for (i, item) in query.projection.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(item.expr, None);
            if let Some(alias) = &item.alias {
                self.out.push_str(" AS ");
                self.out.push_str(alias);
            }
        }

        self.out.push_str(" FROM ");
        for (index, item) in query.from.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            self.from_item(item);
            for join in query.joins.iter().filter(|join| join.anchor == index) {
                self.out.push(' ');
                self.out.push_str(join.operator.as_sql());
                self.out.push(' ');
                self.from_item(&join.item);
                if let Some(on) = join.on {
                    self.out.push_str(" ON ");
                    self.expr(on, None);
                }
            }
        }

        self.where_clause(query);

        if !query.group_by.is_empty() {
            self.out.push_str(" GROUP BY ");
            self.expr_list(&query.group_by);
        }
        if let Some(having) = query.having {
            self.out.push_str(" HAVING ");
            self.expr(having, None);
        }
        if !query.order_by.is_empty() {
            self.out.push_str(" ORDER BY ");
            for (i, item) in query.order_by.iter().enumerate() {
                if i > 0 {
                    self.out.push_str(", ");
                }
                self.expr(item.expr, None);
                match item.asc {
                    Some(true) => self.out.push_str(" ASC"),
                    Some(false) => self.out.push_str(" DESC"),
                    None => {}
                }
                match item.nulls {
                    Some(NullsOrder::First) => self.out.push_str(" NULLS FIRST"),
                    Some(NullsOrder::Last) => self.out.push_str(" NULLS LAST"),
                    None => {}
                }
            }
        }
    }

    fn update(&mut self, query: &'t Query) {
        self.out.push_str("UPDATE ");
        if let Some(item) = query.from.first() {
            self.from_item(item);
        }
        self.out.push_str(" SET ");
        for (i, assignment) in query.assignments.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(assignment.target, None);
            self.out.push_str(" = ");
            let hint = self.column_of(assignment.target);
            self.expr(assignment.value, hint);
        }
        self.where_clause(query);
    }

    fn delete(&mut self, query: &'t Query) {
        self.out.push_str("DELETE FROM ");
        if let Some(item) = query.from.first() {
            self.from_item(item);
        }
        self.where_clause(query);
    }

    fn where_clause(&mut self, query: &Query) {
        if let Some(selection) = query.selection {
            self.out.push_str(" WHERE ");
            self.expr(selection, None);
        }
    }

    fn from_item(&mut self, item: &FromItem) {
        match &item.relation {
            Relation::Table(name) | Relation::Entity(name) => self.out.push_str(name),
            Relation::Path(path) => self.out.push_str(&path.join(".")),
            Relation::Subquery(subquery) => {
                self.out.push('(');
                self.query(*subquery);
                self.out.push(')');
            }
        }
        if let Some(alias) = &item.alias {
            self.out.push(' ');
            self.out.push_str(alias);
        }
    }

    fn expr_list(&mut self, exprs: &[ExprId]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(*expr, None);
        }
    }

    fn column_of(&self, id: ExprId) -> Option<&'t ColumnRef> {
        let tree = self.tree;
        match tree.expr(id) {
            Expr::Column(column) => Some(column),
            Expr::Nested(inner) => self.column_of(*inner),
            _ => None,
        }
    }

    /// Render `id`; `hint` is the column a parameter at this spot is compared against.
    fn expr(&mut self, id: ExprId, hint: Option<&'t ColumnRef>) {
        let tree = self.tree;
        match tree.expr(id) {
            Expr::Column(column) => {
                if let Some(qualifier) = &column.qualifier {
                    self.out.push_str(qualifier);
                    self.out.push('.');
                }
                self.out.push_str(&column.name);
            }
            Expr::Path(path) => self.out.push_str(&path.join(".")),
            Expr::Wildcard(None) => self.out.push('*'),
            Expr::Wildcard(Some(qualifier)) => {
                self.out.push_str(qualifier);
                self.out.push_str(".*");
            }
            Expr::Literal(literal) => self.literal(literal),
            Expr::NamedParameter(name) => self.parameter(name.clone(), hint),
            Expr::PositionalParameter(ordinal) => {
                let name = match ordinal {
                    Some(ordinal) => ordinal.to_string(),
                    None => (self.parameters.len() + 1).to_string(),
                };
                self.parameter(name, hint);
            }
            Expr::Binary { op, left, right } => {
                let (left_hint, right_hint) = if op.is_comparison() {
                    (self.column_of(*right), self.column_of(*left))
                } else {
                    (hint, hint)
                };
                self.expr(*left, left_hint);
                self.out.push(' ');
                self.out.push_str(op.as_sql());
                self.out.push(' ');
                self.expr(*right, right_hint);
            }
            Expr::Unary { op, operand } => {
                match op {
                    UnaryOp::Not => self.out.push_str("NOT "),
                    UnaryOp::Minus => self.out.push('-'),
                }
                self.expr(*operand, hint);
            }
            Expr::Nested(inner) => {
                self.out.push('(');
                self.expr(*inner, hint);
                self.out.push(')');
            }
            Expr::Function {
                name,
                distinct,
                args,
            } => {
                self.out.push_str(name);
                self.out.push('(');
                if *distinct {
                    self.out.push_str("DISTINCT ");
                }
                self.expr_list(args);
                self.out.push(')');
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                self.expr(*expr, None);
                self.out.push_str(if *negated { " NOT IN (" } else { " IN (" });
                let hint = self.column_of(*expr);
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(*item, hint);
                }
                self.out.push(')');
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                self.expr(*expr, None);
                self.out.push_str(if *negated { " NOT IN (" } else { " IN (" });
                self.query(*subquery);
                self.out.push(')');
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                self.expr(*expr, None);
                self.out
                    .push_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                let hint = self.column_of(*expr);
                self.expr(*low, hint);
                self.out.push_str(" AND ");
                self.expr(*high, hint);
            }
            Expr::Like {
                expr,
                pattern,
                escape,
                negated,
            } => {
                self.expr(*expr, None);
                self.out.push_str(if *negated { " NOT LIKE " } else { " LIKE " });
                let hint = self.column_of(*expr);
                self.expr(*pattern, hint);
                if let Some(escape) = escape {
                    self.out.push_str(" ESCAPE ");
                    self.expr(*escape, None);
                }
            }
            Expr::IsNull { expr, negated } => {
                self.expr(*expr, None);
                self.out
                    .push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::Exists { subquery, negated } => {
                if *negated {
                    self.out.push_str("NOT ");
                }
                self.out.push_str("EXISTS (");
                self.query(*subquery);
                self.out.push(')');
            }
            Expr::Subquery(subquery) => {
                self.out.push('(');
                self.query(*subquery);
                self.out.push(')');
            }
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                self.out.push_str("CASE");
                if let Some(operand) = operand {
                    self.out.push(' ');
                    self.expr(*operand, None);
                }
                for (when, then) in branches {
                    self.out.push_str(" WHEN ");
                    self.expr(*when, None);
                    self.out.push_str(" THEN ");
                    self.expr(*then, None);
                }
                if let Some(else_result) = else_result {
                    self.out.push_str(" ELSE ");
                    self.expr(*else_result, None);
                }
                self.out.push_str(" END");
            }
            Expr::Type(alias) => {
                self.out.push_str("TYPE(");
                self.out.push_str(alias);
                self.out.push(')');
            }
        }
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::String(value) => self.out.push_str(&quote_string_literal(value)),
            Literal::Number(value) | Literal::Keyword(value) => self.out.push_str(value),
            Literal::Boolean(true) => self.out.push_str("true"),
            Literal::Boolean(false) => self.out.push_str("false"),
            Literal::Null => self.out.push_str("NULL"),
        }
    }

    fn parameter(&mut self, name: String, hint: Option<&ColumnRef>) {
        self.out.push('?');
        let position = self.parameters.len() + 1;
        self.parameters.push(ParameterMapping {
            original_name: name,
            position,
            declared_type: hint.and_then(|column| column.declared_type.clone()),
            column_name: hint.map(|column| column.name.clone()),
        });
    }
}
