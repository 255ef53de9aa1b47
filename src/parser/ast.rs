//! Arena-indexed statement tree for HQL/JPQL and the SQL it is rewritten into.
//!
//! Every expression and (sub-)query lives in one of two vectors owned by the
//! `StatementTree` and is addressed by index. Rewrite passes replace nodes in
//! place through `set_expr` instead of rebuilding the tree, and nodes that
//! become unreachable are simply left behind.
//!
//! The same tree holds both unresolved HQL (`Expr::Path`, `Relation::Entity`)
//! and physical SQL (`Expr::Column`, `Relation::Table`); conversion is done
//! when no unresolved node is reachable from the root.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
}

impl BinaryOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Concat => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    String(String),
    Number(String),
    Boolean(bool),
    Null,
    /// Niladic SQL functions such as `CURRENT_DATE`
    Keyword(String),
}

/// A physical column reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
    /// Java type of the property the column came from, if known
    pub declared_type: Option<String>,
}

impl ColumnRef {
    pub fn new(qualifier: Option<&str>, name: &str) -> Self {
        Self {
            qualifier: qualifier.map(str::to_string),
            name: name.to_string(),
            declared_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Unresolved HQL path: `d`, `d.breed`, `o.customer.name`, `Dog`
    Path(Vec<String>),
    /// Resolved physical column
    Column(ColumnRef),
    /// `*` or `alias.*`
    Wildcard(Option<String>),
    Literal(Literal),
    /// `:name`
    NamedParameter(String),
    /// `?1`, or `?` when no ordinal was written
    PositionalParameter(Option<u32>),
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    /// Explicit parentheses
    Nested(ExprId),
    Function {
        name: String,
        distinct: bool,
        args: Vec<ExprId>,
    },
    InList {
        expr: ExprId,
        list: Vec<ExprId>,
        negated: bool,
    },
    InSubquery {
        expr: ExprId,
        subquery: QueryId,
        negated: bool,
    },
    Between {
        expr: ExprId,
        low: ExprId,
        high: ExprId,
        negated: bool,
    },
    Like {
        expr: ExprId,
        pattern: ExprId,
        escape: Option<ExprId>,
        negated: bool,
    },
    IsNull {
        expr: ExprId,
        negated: bool,
    },
    Exists {
        subquery: QueryId,
        negated: bool,
    },
    Subquery(QueryId),
    Case {
        operand: Option<ExprId>,
        branches: Vec<(ExprId, ExprId)>,
        else_result: Option<ExprId>,
    },
    /// `TYPE(alias)` discriminator function
    Type(String),
}

/// What a FROM item or join reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// Entity name, possibly package-qualified
    Entity(String),
    /// Navigation from an alias: `c.orders`
    Path(Vec<String>),
    /// Physical table
    Table(String),
    Subquery(QueryId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromItem {
    pub relation: Relation,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOperator {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinOperator::Inner => "INNER JOIN",
            JoinOperator::Left => "LEFT JOIN",
            JoinOperator::Right => "RIGHT JOIN",
            JoinOperator::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub operator: JoinOperator,
    /// Index of the FROM item this join extends
    pub anchor: usize,
    /// `JOIN FETCH`; meaningless in native SQL and dropped on output
    pub fetch: bool,
    pub item: FromItem,
    pub on: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectItem {
    pub expr: ExprId,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByItem {
    pub expr: ExprId,
    /// `Some(true)` for ASC, `Some(false)` for DESC
    pub asc: Option<bool>,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target: ExprId,
    pub value: ExprId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Update,
    Delete,
}

/// One SELECT/UPDATE/DELETE, top-level or nested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: QueryKind,
    pub distinct: bool,
    /// Empty when the HQL omitted `SELECT` (`FROM Dog d`)
    pub projection: Vec<SelectItem>,
    pub from: Vec<FromItem>,
    pub joins: Vec<Join>,
    /// UPDATE ... SET
    pub assignments: Vec<Assignment>,
    pub selection: Option<ExprId>,
    pub group_by: Vec<ExprId>,
    pub having: Option<ExprId>,
    pub order_by: Vec<OrderByItem>,
}

impl Query {
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            distinct: false,
            projection: Vec::new(),
            from: Vec::new(),
            joins: Vec::new(),
            assignments: Vec::new(),
            selection: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
        }
    }

    /// Top-level expressions owned directly by this query, in clause order.
    pub fn expr_roots(&self) -> Vec<ExprId> {
        let mut roots: Vec<ExprId> = self.projection.iter().map(|item| item.expr).collect();
        roots.extend(self.joins.iter().filter_map(|join| join.on));
        for assignment in &self.assignments {
            roots.push(assignment.target);
            roots.push(assignment.value);
        }
        roots.extend(self.selection);
        roots.extend(self.group_by.iter().copied());
        roots.extend(self.having);
        roots.extend(self.order_by.iter().map(|item| item.expr));
        roots
    }
}

/// Owned statement tree: expression arena, query arena and the root query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTree {
    exprs: Vec<Expr>,
    queries: Vec<Query>,
    root: QueryId,
}

impl StatementTree {
    /// An empty tree whose root is a fresh query of `kind`.
    pub fn new(kind: QueryKind) -> Self {
        Self {
            exprs: Vec::new(),
            queries: vec![Query::new(kind)],
            root: QueryId(0),
        }
    }

    pub fn root(&self) -> QueryId {
        self.root
    }

    pub fn add_expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.push(expr);
        ExprId(self.exprs.len() - 1)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0]
    }

    /// Replace the node at `id`; every parent pointing at `id` sees the new node.
    pub fn set_expr(&mut self, id: ExprId, expr: Expr) {
        self.exprs[id.0] = expr;
    }

    pub fn add_query(&mut self, query: Query) -> QueryId {
        self.queries.push(query);
        QueryId(self.queries.len() - 1)
    }

    pub fn query(&self, id: QueryId) -> &Query {
        &self.queries[id.0]
    }

    pub fn query_mut(&mut self, id: QueryId) -> &mut Query {
        &mut self.queries[id.0]
    }

    /// Direct child expressions of `id` (sub-queries are not entered).
    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        match self.expr(id) {
            Expr::Path(_)
            | Expr::Column(_)
            | Expr::Wildcard(_)
            | Expr::Literal(_)
            | Expr::NamedParameter(_)
            | Expr::PositionalParameter(_)
            | Expr::Exists { .. }
            | Expr::Subquery(_)
            | Expr::Type(_) => Vec::new(),
            Expr::Binary { left, right, .. } => vec![*left, *right],
            Expr::Unary { operand, .. } => vec![*operand],
            Expr::Nested(inner) => vec![*inner],
            Expr::Function { args, .. } => args.clone(),
            Expr::InList { expr, list, .. } => {
                let mut out = vec![*expr];
                out.extend(list.iter().copied());
                out
            }
            Expr::InSubquery { expr, .. } => vec![*expr],
            Expr::Between {
                expr, low, high, ..
            } => vec![*expr, *low, *high],
            Expr::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                let mut out = vec![*expr, *pattern];
                out.extend(*escape);
                out
            }
            Expr::IsNull { expr, .. } => vec![*expr],
            Expr::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut out: Vec<ExprId> = operand.iter().copied().collect();
                for (when, then) in branches {
                    out.push(*when);
                    out.push(*then);
                }
                out.extend(*else_result);
                out
            }
        }
    }

    /// Sub-query directly referenced by expression `id`, if any.
    pub fn subquery_of(&self, id: ExprId) -> Option<QueryId> {
        match self.expr(id) {
            Expr::InSubquery { subquery, .. }
            | Expr::Exists { subquery, .. }
            | Expr::Subquery(subquery) => Some(*subquery),
            _ => None,
        }
    }

    /// Every expression reachable from `root` without entering sub-queries,
    /// in pre-order.
    pub fn descendants(&self, root: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut children = self.children(id);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Every expression owned by query `id` (not its sub-queries), in clause order.
    pub fn query_exprs(&self, id: QueryId) -> Vec<ExprId> {
        self.query(id)
            .expr_roots()
            .into_iter()
            .flat_map(|root| self.descendants(root))
            .collect()
    }

    /// AND `predicate` onto `existing`, parenthesizing an OR so precedence is kept.
    pub fn conjoin(&mut self, existing: Option<ExprId>, predicate: ExprId) -> ExprId {
        match existing {
            None => predicate,
            Some(existing) => {
                let left = self.grouped(existing);
                let right = self.grouped(predicate);
                self.add_expr(Expr::Binary {
                    op: BinaryOp::And,
                    left,
                    right,
                })
            }
        }
    }

    /// Wrap `id` in parentheses when it is an OR that would bind looser than AND.
    pub fn grouped(&mut self, id: ExprId) -> ExprId {
        match self.expr(id) {
            Expr::Binary {
                op: BinaryOp::Or, ..
            } => self.add_expr(Expr::Nested(id)),
            _ => id,
        }
    }
}
