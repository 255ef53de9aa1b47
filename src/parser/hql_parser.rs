//! Recursive-descent parser for the supported JPQL/HQL subset.
//!
//! The parser works over the sqlparser token stream (see `TokenParser`) and
//! produces an arena-indexed `StatementTree`. It understands HQL-only
//! syntax that a SQL grammar rejects: SELECT-less queries (`FROM Dog d`),
//! `SELECT NEW pkg.Dto(...)`, `JOIN FETCH`, `WITH` join conditions, the
//! `TYPE(alias)` function and `:name` / `?1` parameters.
//!
//! Expression precedence, loosest first:
//!
//! ```text
//! OR > AND > NOT > predicate (=, <>, IN, LIKE, BETWEEN, IS NULL)
//!    > additive (+, -, ||) > multiplicative (*, /, %) > unary minus
//! ```

use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, TokenizerError};
use thiserror::Error;

use super::ast::{
    Assignment, BinaryOp, Expr, ExprId, FromItem, Join, JoinOperator, Literal, NullsOrder,
    OrderByItem, Query, QueryId, QueryKind, Relation, SelectItem, StatementTree, UnaryOp,
};
use super::identifier_utils::is_clause_keyword;
use super::token_parser_base::TokenParser;

/// Maximum expression nesting depth (parentheses, sub-selects, NOT chains)
pub const MAX_EXPRESSION_DEPTH: usize = 64;

/// Niladic functions that are written without parentheses
const NILADIC_FUNCTIONS: &[&str] = &[
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "LOCALTIME",
    "LOCALTIMESTAMP",
];

/// Grammar-level failure
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to tokenize query: {0}")]
    Tokenize(#[from] TokenizerError),

    #[error("Expected {expected} but found {found} at line {line}, column {column}")]
    Unexpected {
        expected: String,
        found: String,
        line: u64,
        column: u64,
    },

    #[error("Unsupported statement starting with {found}")]
    UnsupportedStatement { found: String },

    #[error("Query nesting exceeds {limit} levels")]
    NestingTooDeep { limit: usize },
}

/// Parse one HQL/JPQL statement into a tree.
pub fn parse_hql(query: &str) -> Result<StatementTree, ParseError> {
    HqlParser::new(query)?.parse()
}

/// Parser state for one statement
pub struct HqlParser {
    base: TokenParser,
    tree: StatementTree,
    depth: usize,
}

impl HqlParser {
    pub fn new(query: &str) -> Result<Self, ParseError> {
        Ok(Self {
            base: TokenParser::new(query)?,
            tree: StatementTree::new(QueryKind::Select),
            depth: 0,
        })
    }

    /// Parse the whole input as a single statement.
    pub fn parse(mut self) -> Result<StatementTree, ParseError> {
        let query = if self.base.check_keyword(Keyword::SELECT)
            || self.base.check_keyword(Keyword::FROM)
        {
            self.parse_select()?
        } else if self.base.check_keyword(Keyword::UPDATE) {
            self.parse_update()?
        } else if self.base.check_keyword(Keyword::DELETE) {
            self.parse_delete()?
        } else {
            return Err(ParseError::UnsupportedStatement {
                found: self.base.describe_current(),
            });
        };

        let _ = self.base.expect_token(&Token::SemiColon);
        if !self.base.is_at_end() {
            return Err(self.unexpected("end of query"));
        }

        let root = self.tree.root();
        *self.tree.query_mut(root) = query;
        Ok(self.tree)
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn parse_select(&mut self) -> Result<Query, ParseError> {
        let mut query = Query::new(QueryKind::Select);

        if self.base.expect_keyword(Keyword::SELECT).is_some() {
            query.distinct = self.base.expect_keyword(Keyword::DISTINCT).is_some();
            query.projection = self.parse_projection()?;
        }

        self.require_keyword(Keyword::FROM, "FROM")?;
        self.parse_from_clause(&mut query)?;

        if self.base.expect_keyword(Keyword::WHERE).is_some() {
            query.selection = Some(self.parse_expr()?);
        }

        if self.base.check_keyword(Keyword::GROUP) {
            self.base.advance();
            self.require_keyword(Keyword::BY, "BY")?;
            query.group_by = self.parse_expr_list()?;
        }

        if self.base.expect_keyword(Keyword::HAVING).is_some() {
            query.having = Some(self.parse_expr()?);
        }

        if self.base.check_keyword(Keyword::ORDER) {
            self.base.advance();
            self.require_keyword(Keyword::BY, "BY")?;
            query.order_by = self.parse_order_by()?;
        }

        Ok(query)
    }

    fn parse_update(&mut self) -> Result<Query, ParseError> {
        self.base.advance(); // UPDATE
        let _ = self.base.expect_word_ci("VERSIONED");

        let mut query = Query::new(QueryKind::Update);
        query.from.push(self.parse_entity_item()?);

        self.require_keyword(Keyword::SET, "SET")?;
        loop {
            let target = self.parse_path_expr("assignment target")?;
            if self.base.expect_token(&Token::Eq).is_none() {
                return Err(self.unexpected("="));
            }
            let value = self.parse_expr()?;
            query.assignments.push(Assignment { target, value });

            if self.base.expect_token(&Token::Comma).is_none() {
                break;
            }
        }

        if self.base.expect_keyword(Keyword::WHERE).is_some() {
            query.selection = Some(self.parse_expr()?);
        }
        Ok(query)
    }

    fn parse_delete(&mut self) -> Result<Query, ParseError> {
        self.base.advance(); // DELETE
        let _ = self.base.expect_keyword(Keyword::FROM);

        let mut query = Query::new(QueryKind::Delete);
        query.from.push(self.parse_entity_item()?);

        if self.base.expect_keyword(Keyword::WHERE).is_some() {
            query.selection = Some(self.parse_expr()?);
        }
        Ok(query)
    }

    /// Parse a parenthesized sub-select; the opening `(` is already consumed.
    fn parse_subquery(&mut self) -> Result<QueryId, ParseError> {
        self.enter()?;
        let query = self.parse_select()?;
        if self.base.expect_token(&Token::RParen).is_none() {
            return Err(self.unexpected(")"));
        }
        self.leave();
        Ok(self.tree.add_query(query))
    }

    fn at_subquery(&self) -> bool {
        self.base.check_token(&Token::LParen)
            && matches!(
                self.base.peek(1),
                Some(Token::Word(w)) if w.quote_style.is_none()
                    && (w.keyword == Keyword::SELECT || w.keyword == Keyword::FROM)
            )
    }

    // ========================================================================
    // SELECT list
    // ========================================================================

    fn parse_projection(&mut self) -> Result<Vec<SelectItem>, ParseError> {
        // SELECT NEW com.example.Dto(a, b): the constructor is a Java concern,
        // the SQL only needs its arguments
        if self.base.check_word_ci("NEW") && matches!(self.base.peek(1), Some(Token::Word(_))) {
            self.base.advance();
            if self.base.parse_dotted_name().is_none() {
                return Err(self.unexpected("constructor name"));
            }
            if self.base.expect_token(&Token::LParen).is_none() {
                return Err(self.unexpected("("));
            }
            let items = self.parse_select_items()?;
            if self.base.expect_token(&Token::RParen).is_none() {
                return Err(self.unexpected(")"));
            }
            return Ok(items);
        }

        self.parse_select_items()
    }

    fn parse_select_items(&mut self) -> Result<Vec<SelectItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            let expr = if self.base.expect_token(&Token::Mul).is_some() {
                self.tree.add_expr(Expr::Wildcard(None))
            } else {
                self.parse_expr()?
            };
            let alias = self.parse_alias()?;
            items.push(SelectItem { expr, alias });

            if self.base.expect_token(&Token::Comma).is_none() {
                break;
            }
        }
        Ok(items)
    }

    // ========================================================================
    // FROM and JOIN
    // ========================================================================

    fn parse_from_clause(&mut self, query: &mut Query) -> Result<(), ParseError> {
        loop {
            let item = if self.base.check_token(&Token::LParen) {
                self.parse_derived_item()?
            } else {
                self.parse_entity_item()?
            };
            query.from.push(item);
            let anchor = query.from.len() - 1;

            while let Some(operator) = self.parse_join_operator()? {
                let join = self.parse_join(operator, anchor)?;
                query.joins.push(join);
            }

            if self.base.expect_token(&Token::Comma).is_none() {
                break;
            }
        }
        Ok(())
    }

    /// `com.example.Dog d` / `Dog AS d` / `Dog`
    fn parse_entity_item(&mut self) -> Result<FromItem, ParseError> {
        let name = self
            .base
            .parse_dotted_name()
            .ok_or_else(|| self.unexpected("entity name"))?;
        let alias = self.parse_alias()?;
        Ok(FromItem {
            relation: Relation::Entity(name.join(".")),
            alias,
        })
    }

    /// `(SELECT ...) alias`
    fn parse_derived_item(&mut self) -> Result<FromItem, ParseError> {
        if !self.at_subquery() {
            return Err(self.unexpected("sub-select"));
        }
        self.base.advance();
        let subquery = self.parse_subquery()?;
        let alias = self.parse_alias()?;
        Ok(FromItem {
            relation: Relation::Subquery(subquery),
            alias,
        })
    }

    fn parse_join_operator(&mut self) -> Result<Option<JoinOperator>, ParseError> {
        let operator = if self.base.check_keyword(Keyword::JOIN) {
            JoinOperator::Inner
        } else if self.base.check_keyword(Keyword::INNER) {
            self.base.advance();
            JoinOperator::Inner
        } else if self.base.check_keyword(Keyword::LEFT) {
            self.base.advance();
            let _ = self.base.expect_keyword(Keyword::OUTER);
            JoinOperator::Left
        } else if self.base.check_keyword(Keyword::RIGHT) {
            self.base.advance();
            let _ = self.base.expect_keyword(Keyword::OUTER);
            JoinOperator::Right
        } else if self.base.check_keyword(Keyword::CROSS) {
            self.base.advance();
            JoinOperator::Cross
        } else {
            return Ok(None);
        };

        self.require_keyword(Keyword::JOIN, "JOIN")?;
        Ok(Some(operator))
    }

    fn parse_join(&mut self, operator: JoinOperator, anchor: usize) -> Result<Join, ParseError> {
        let fetch = self.base.expect_keyword(Keyword::FETCH).is_some();

        let item = if self.base.check_token(&Token::LParen) {
            self.parse_derived_item()?
        } else {
            let name = self
                .base
                .parse_dotted_name()
                .ok_or_else(|| self.unexpected("join path or entity"))?;
            let alias = self.parse_alias()?;
            let relation = if name.len() > 1 {
                Relation::Path(name)
            } else {
                Relation::Entity(name.join("."))
            };
            FromItem { relation, alias }
        };

        let on = if self.base.expect_keyword(Keyword::ON).is_some()
            || self.base.expect_keyword(Keyword::WITH).is_some()
        {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Join {
            operator,
            anchor,
            fetch,
            item,
            on,
        })
    }

    /// Optional `[AS] alias`; a clause keyword is never taken as an alias.
    fn parse_alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.base.expect_keyword(Keyword::AS).is_some() {
            return self
                .base
                .parse_identifier()
                .map(Some)
                .ok_or_else(|| self.unexpected("alias"));
        }

        match self.base.peek(0) {
            Some(Token::Word(w)) if w.quote_style.is_some() || !is_clause_keyword(&w.value) => {
                Ok(self.base.parse_identifier())
            }
            _ => Ok(None),
        }
    }

    // ========================================================================
    // GROUP BY / ORDER BY
    // ========================================================================

    fn parse_expr_list(&mut self) -> Result<Vec<ExprId>, ParseError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.base.expect_token(&Token::Comma).is_some() {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_order_by(&mut self) -> Result<Vec<OrderByItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let asc = if self.base.expect_keyword(Keyword::ASC).is_some() {
                Some(true)
            } else if self.base.expect_keyword(Keyword::DESC).is_some() {
                Some(false)
            } else {
                None
            };
            let nulls = if self.base.expect_keyword(Keyword::NULLS).is_some() {
                if self.base.expect_keyword(Keyword::FIRST).is_some() {
                    Some(NullsOrder::First)
                } else if self.base.expect_keyword(Keyword::LAST).is_some() {
                    Some(NullsOrder::Last)
                } else {
                    return Err(self.unexpected("FIRST or LAST"));
                }
            } else {
                None
            };
            items.push(OrderByItem { expr, asc, nulls });

            if self.base.expect_token(&Token::Comma).is_none() {
                break;
            }
        }
        Ok(items)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub fn parse_expr(&mut self) -> Result<ExprId, ParseError> {
        self.enter()?;
        let expr = self.parse_or()?;
        self.leave();
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_and()?;
        while self.base.expect_keyword(Keyword::OR).is_some() {
            let right = self.parse_and()?;
            left = self.binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_not()?;
        while self.base.expect_keyword(Keyword::AND).is_some() {
            let right = self.parse_not()?;
            left = self.binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<ExprId, ParseError> {
        if !self.base.check_keyword(Keyword::NOT) {
            return self.parse_predicate();
        }
        self.base.advance();

        if self.base.check_keyword(Keyword::EXISTS) {
            self.base.advance();
            let subquery = self.parse_exists_body()?;
            return Ok(self.tree.add_expr(Expr::Exists {
                subquery,
                negated: true,
            }));
        }

        self.enter()?;
        let operand = self.parse_not()?;
        self.leave();
        Ok(self.tree.add_expr(Expr::Unary {
            op: UnaryOp::Not,
            operand,
        }))
    }

    fn parse_predicate(&mut self) -> Result<ExprId, ParseError> {
        let left = self.parse_additive()?;

        if let Some(op) = self.comparison_operator() {
            self.base.advance();
            let right = self.parse_additive()?;
            return Ok(self.binary(op, left, right));
        }

        if self.base.check_keyword(Keyword::IS) {
            self.base.advance();
            let negated = self.base.expect_keyword(Keyword::NOT).is_some();
            self.require_keyword(Keyword::NULL, "NULL")?;
            return Ok(self.tree.add_expr(Expr::IsNull {
                expr: left,
                negated,
            }));
        }

        let negated = if self.base.check_keyword(Keyword::NOT)
            && matches!(
                self.base.peek(1),
                Some(Token::Word(w)) if matches!(w.keyword, Keyword::IN | Keyword::LIKE | Keyword::BETWEEN)
            ) {
            self.base.advance();
            true
        } else {
            false
        };

        if self.base.expect_keyword(Keyword::IN).is_some() {
            return self.parse_in(left, negated);
        }

        if self.base.expect_keyword(Keyword::LIKE).is_some() {
            let pattern = self.parse_additive()?;
            let escape = if self.base.expect_keyword(Keyword::ESCAPE).is_some() {
                Some(self.parse_primary()?)
            } else {
                None
            };
            return Ok(self.tree.add_expr(Expr::Like {
                expr: left,
                pattern,
                escape,
                negated,
            }));
        }

        if self.base.expect_keyword(Keyword::BETWEEN).is_some() {
            let low = self.parse_additive()?;
            self.require_keyword(Keyword::AND, "AND")?;
            let high = self.parse_additive()?;
            return Ok(self.tree.add_expr(Expr::Between {
                expr: left,
                low,
                high,
                negated,
            }));
        }

        if negated {
            return Err(self.unexpected("IN, LIKE or BETWEEN"));
        }
        Ok(left)
    }

    /// `IN (a, b)`, `IN (SELECT ...)`, `IN :param`, `IN ?1`
    fn parse_in(&mut self, expr: ExprId, negated: bool) -> Result<ExprId, ParseError> {
        if self.at_subquery() {
            self.base.advance();
            let subquery = self.parse_subquery()?;
            return Ok(self.tree.add_expr(Expr::InSubquery {
                expr,
                subquery,
                negated,
            }));
        }

        let list = if self.base.expect_token(&Token::LParen).is_some() {
            let list = self.parse_expr_list()?;
            if self.base.expect_token(&Token::RParen).is_none() {
                return Err(self.unexpected(")"));
            }
            list
        } else {
            // collection-valued parameter without parentheses
            vec![self.parse_primary()?]
        };

        Ok(self.tree.add_expr(Expr::InList {
            expr,
            list,
            negated,
        }))
    }

    fn comparison_operator(&self) -> Option<BinaryOp> {
        match self.base.peek(0)? {
            Token::Eq | Token::DoubleEq => Some(BinaryOp::Eq),
            Token::Neq => Some(BinaryOp::NotEq),
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::LtEq),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        }
    }

    fn parse_additive(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.base.peek(0) {
                Some(Token::Plus) => BinaryOp::Plus,
                Some(Token::Minus) => BinaryOp::Minus,
                Some(Token::StringConcat) => BinaryOp::Concat,
                _ => break,
            };
            self.base.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.base.peek(0) {
                Some(Token::Mul) => BinaryOp::Multiply,
                Some(Token::Div) => BinaryOp::Divide,
                Some(Token::Mod) => BinaryOp::Modulo,
                _ => break,
            };
            self.base.advance();
            let right = self.parse_unary()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExprId, ParseError> {
        if self.base.expect_token(&Token::Minus).is_some() {
            self.enter()?;
            let operand = self.parse_unary()?;
            self.leave();
            return Ok(self.tree.add_expr(Expr::Unary {
                op: UnaryOp::Minus,
                operand,
            }));
        }
        if self.base.expect_token(&Token::Plus).is_some() {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<ExprId, ParseError> {
        let token = match self.base.peek(0) {
            Some(token) => token.clone(),
            None => return Err(self.unexpected("expression")),
        };

        match token {
            Token::Number(value, _) => {
                self.base.advance();
                Ok(self.tree.add_expr(Expr::Literal(Literal::Number(value))))
            }
            Token::SingleQuotedString(value) => {
                self.base.advance();
                Ok(self.tree.add_expr(Expr::Literal(Literal::String(value))))
            }
            Token::Colon => {
                self.base.advance();
                match self.base.next_token() {
                    Some(Token::Word(w)) => Ok(self.tree.add_expr(Expr::NamedParameter(w.value))),
                    Some(Token::Number(n, _)) => Ok(self.tree.add_expr(Expr::NamedParameter(n))),
                    _ => Err(self.unexpected("parameter name")),
                }
            }
            Token::Placeholder(text) => {
                self.base.advance();
                let expr = match text.strip_prefix(':') {
                    Some(name) => Expr::NamedParameter(name.to_string()),
                    None => Expr::PositionalParameter(text.trim_start_matches('?').parse().ok()),
                };
                Ok(self.tree.add_expr(expr))
            }
            Token::LParen => {
                if self.at_subquery() {
                    self.base.advance();
                    let subquery = self.parse_subquery()?;
                    return Ok(self.tree.add_expr(Expr::Subquery(subquery)));
                }
                self.base.advance();
                let inner = self.parse_expr()?;
                if self.base.expect_token(&Token::RParen).is_none() {
                    return Err(self.unexpected(")"));
                }
                Ok(self.tree.add_expr(Expr::Nested(inner)))
            }
            Token::Word(w) if w.quote_style.is_none() => self.parse_word_expr(&w.value, w.keyword),
            Token::Word(_) => self.parse_path_expr("expression"),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_word_expr(&mut self, value: &str, keyword: Keyword) -> Result<ExprId, ParseError> {
        let followed_by_paren = matches!(self.base.peek(1), Some(Token::LParen));

        if value.eq_ignore_ascii_case("TRUE") || value.eq_ignore_ascii_case("FALSE") {
            self.base.advance();
            let literal = Literal::Boolean(value.eq_ignore_ascii_case("TRUE"));
            return Ok(self.tree.add_expr(Expr::Literal(literal)));
        }
        if keyword == Keyword::NULL {
            self.base.advance();
            return Ok(self.tree.add_expr(Expr::Literal(Literal::Null)));
        }
        if NILADIC_FUNCTIONS
            .iter()
            .any(|name| name.eq_ignore_ascii_case(value))
            && !followed_by_paren
        {
            self.base.advance();
            let literal = Literal::Keyword(value.to_ascii_uppercase());
            return Ok(self.tree.add_expr(Expr::Literal(literal)));
        }
        if keyword == Keyword::EXISTS && followed_by_paren {
            self.base.advance();
            let subquery = self.parse_exists_body()?;
            return Ok(self.tree.add_expr(Expr::Exists {
                subquery,
                negated: false,
            }));
        }
        if keyword == Keyword::CASE {
            self.base.advance();
            return self.parse_case();
        }
        if value.eq_ignore_ascii_case("TYPE") && followed_by_paren {
            self.base.advance();
            self.base.advance();
            let alias = self
                .base
                .parse_identifier()
                .ok_or_else(|| self.unexpected("alias"))?;
            if self.base.expect_token(&Token::RParen).is_none() {
                return Err(self.unexpected(")"));
            }
            return Ok(self.tree.add_expr(Expr::Type(alias)));
        }
        if followed_by_paren {
            return self.parse_function(value);
        }

        self.parse_path_expr("expression")
    }

    fn parse_path_expr(&mut self, expected: &str) -> Result<ExprId, ParseError> {
        let path = self
            .base
            .parse_dotted_name()
            .ok_or_else(|| self.unexpected(expected))?;
        Ok(self.tree.add_expr(Expr::Path(path)))
    }

    /// `name(args)`, `COUNT(*)`, `COUNT(DISTINCT x)`, `FUNCTION('name', args)`
    fn parse_function(&mut self, name: &str) -> Result<ExprId, ParseError> {
        self.base.advance(); // name
        self.base.advance(); // (

        let mut name = name.to_string();
        let mut distinct = false;
        let mut args = Vec::new();

        if self.base.expect_token(&Token::Mul).is_some() {
            args.push(self.tree.add_expr(Expr::Wildcard(None)));
        } else if !self.base.check_token(&Token::RParen) {
            distinct = self.base.expect_keyword(Keyword::DISTINCT).is_some();
            args = self.parse_expr_list()?;
        }

        if self.base.expect_token(&Token::RParen).is_none() {
            return Err(self.unexpected(")"));
        }

        // JPA 2.1 FUNCTION('db_function', args...)
        if name.eq_ignore_ascii_case("FUNCTION") {
            if let Some(Expr::Literal(Literal::String(target))) =
                args.first().map(|id| self.tree.expr(*id))
            {
                name = target.clone();
                args.remove(0);
            }
        }

        Ok(self.tree.add_expr(Expr::Function {
            name,
            distinct,
            args,
        }))
    }

    /// Body of `EXISTS (SELECT ...)`; `EXISTS` is already consumed.
    fn parse_exists_body(&mut self) -> Result<QueryId, ParseError> {
        if !self.at_subquery() {
            return Err(self.unexpected("sub-select"));
        }
        self.base.advance();
        self.parse_subquery()
    }

    /// `CASE [operand] WHEN .. THEN .. [ELSE ..] END`; `CASE` is already consumed.
    fn parse_case(&mut self) -> Result<ExprId, ParseError> {
        let operand = if self.base.check_keyword(Keyword::WHEN) {
            None
        } else {
            Some(self.parse_expr()?)
        };

        let mut branches = Vec::new();
        while self.base.expect_keyword(Keyword::WHEN).is_some() {
            let when = self.parse_expr()?;
            self.require_keyword(Keyword::THEN, "THEN")?;
            let then = self.parse_expr()?;
            branches.push((when, then));
        }
        if branches.is_empty() {
            return Err(self.unexpected("WHEN"));
        }

        let else_result = if self.base.expect_keyword(Keyword::ELSE).is_some() {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.require_keyword(Keyword::END, "END")?;

        Ok(self.tree.add_expr(Expr::Case {
            operand,
            branches,
            else_result,
        }))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        self.tree.add_expr(Expr::Binary { op, left, right })
    }

    fn require_keyword(&mut self, keyword: Keyword, expected: &str) -> Result<(), ParseError> {
        self.base
            .expect_keyword(keyword)
            .ok_or_else(|| self.unexpected(expected))
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_EXPRESSION_DEPTH {
            return Err(ParseError::NestingTooDeep {
                limit: MAX_EXPRESSION_DEPTH,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let (line, column) = self.base.location();
        ParseError::Unexpected {
            expected: expected.to_string(),
            found: self.base.describe_current(),
            line,
            column,
        }
    }
}
