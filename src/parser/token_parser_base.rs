//! Base token parser providing the navigation helpers used by the HQL parser.
//!
//! Query text is lexed once with sqlparser's `Tokenizer` (generic dialect) and
//! whitespace/comments are dropped, so callers only ever see significant
//! tokens.
//!
//! ## Usage
//!
//! ```ignore
//! let mut base = TokenParser::new("SELECT d FROM Dog d")?;
//! if base.check_keyword(Keyword::SELECT) {
//!     base.advance();
//! }
//! let alias = base.parse_identifier();
//! ```

use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, TokenWithSpan, Tokenizer, TokenizerError};

use super::identifier_utils::format_token;

/// Token cursor over the significant tokens of one query string.
pub struct TokenParser {
    tokens: Vec<TokenWithSpan>,
    pos: usize,
}

impl TokenParser {
    /// Tokenize `sql` with the generic dialect.
    pub fn new(sql: &str) -> Result<Self, TokenizerError> {
        let dialect = GenericDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize_with_location()?
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
            .collect();

        Ok(Self { tokens, pos: 0 })
    }

    // ========================================================================
    // Position and state
    // ========================================================================

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    // ========================================================================
    // Token access
    // ========================================================================

    /// Get current token without consuming.
    #[inline]
    pub fn current_token(&self) -> Option<&TokenWithSpan> {
        self.tokens.get(self.pos)
    }

    /// Peek at a token at an offset from current position.
    #[inline]
    pub fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    #[inline]
    pub fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    /// Consume and return the current token.
    pub fn next_token(&mut self) -> Option<Token> {
        let token = self.current_token().map(|t| t.token.clone());
        self.advance();
        token
    }

    /// Human-readable description of the current token, for error messages.
    pub fn describe_current(&self) -> String {
        match self.current_token() {
            Some(token) => format_token(&token.token),
            None => format_token(&Token::EOF),
        }
    }

    /// 1-based (line, column) of the current token, or of the end of input.
    pub fn location(&self) -> (u64, u64) {
        self.current_token()
            .or_else(|| self.tokens.last())
            .map(|t| (t.span.start.line, t.span.start.column))
            .unwrap_or((1, 1))
    }

    // ========================================================================
    // Token type checks
    // ========================================================================

    /// Check if current token is a specific keyword.
    #[inline]
    pub fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek(0), Some(Token::Word(w)) if w.keyword == keyword && w.quote_style.is_none())
    }

    /// Check if current token is an unquoted word matching (case-insensitive).
    ///
    /// Covers HQL words that sqlparser does not know as keywords (e.g. `NEW`).
    #[inline]
    pub fn check_word_ci(&self, word: &str) -> bool {
        matches!(self.peek(0), Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(word))
    }

    /// Check if current token matches a specific token type (by discriminant).
    #[inline]
    pub fn check_token(&self, expected: &Token) -> bool {
        match self.peek(0) {
            Some(token) => std::mem::discriminant(token) == std::mem::discriminant(expected),
            None => false,
        }
    }

    // ========================================================================
    // Expect methods (check and advance)
    // ========================================================================

    /// Consume the keyword if present.
    pub fn expect_keyword(&mut self, keyword: Keyword) -> Option<()> {
        if self.check_keyword(keyword) {
            self.advance();
            Some(())
        } else {
            None
        }
    }

    /// Consume the word (case-insensitive) if present.
    pub fn expect_word_ci(&mut self, word: &str) -> Option<()> {
        if self.check_word_ci(word) {
            self.advance();
            Some(())
        } else {
            None
        }
    }

    /// Consume a token of the given type if present.
    pub fn expect_token(&mut self, expected: &Token) -> Option<()> {
        if self.check_token(expected) {
            self.advance();
            Some(())
        } else {
            None
        }
    }

    // ========================================================================
    // Identifier parsing
    // ========================================================================

    /// Parse an identifier (quoted or unquoted), returning it without quotes.
    pub fn parse_identifier(&mut self) -> Option<String> {
        match self.peek(0) {
            Some(Token::Word(w)) => {
                let name = w.value.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        }
    }

    /// Parse a dotted name such as `com.example.Dog` or `d.owner.name`.
    pub fn parse_dotted_name(&mut self) -> Option<Vec<String>> {
        let mut parts = vec![self.parse_identifier()?];
        while self.check_token(&Token::Period) {
            if !matches!(self.peek(1), Some(Token::Word(_))) {
                break;
            }
            self.advance();
            parts.push(self.parse_identifier()?);
        }
        Some(parts)
    }
}
