//! Recursive-descent parser from tokens to [`Expr`].

use shipwright_common::error::{Result, ShipwrightError};

use super::lexer::{self, TemplatePart, Token};
use super::{Expr, Segment};

/// Maximum nesting of lists, maps and interpolations in one expression.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Cursor into a token stream for recursive-descent parsing.
struct TokenCursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> TokenCursor<'a> {
    const fn new(tokens: &'a [Token], depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth,
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(parse_err(format!(
                "expression nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_token(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            other => Err(parse_err(format!("expected {expected:?}, got {other:?}"))),
        }
    }

    const fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

const fn parse_err(message: String) -> ShipwrightError {
    ShipwrightError::Config { message }
}

fn skip_optional_comma(cursor: &mut TokenCursor<'_>) {
    if cursor.peek() == Some(&Token::Comma) {
        let _ = cursor.advance();
    }
}

/// Parses expression source into a syntax tree.
///
/// # Errors
///
/// Returns an error if the source does not contain exactly one
/// well-formed expression.
pub fn parse(source: &str) -> Result<Expr> {
    parse_at(source, 0)
}

fn parse_at(source: &str, depth: usize) -> Result<Expr> {
    let tokens = lexer::tokenize(source)?;
    if tokens.is_empty() {
        return Err(parse_err("empty expression".into()));
    }
    let mut cursor = TokenCursor::new(&tokens, depth);
    let expr = parse_expr(&mut cursor)
        .map_err(|e| parse_err(format!("in expression `{source}`: {e}")))?;
    if let Some(tok) = cursor.peek() {
        return Err(parse_err(format!(
            "in expression `{source}`: unexpected trailing {tok:?}"
        )));
    }
    Ok(expr)
}

fn parse_expr(cursor: &mut TokenCursor<'_>) -> Result<Expr> {
    match cursor.advance() {
        Some(Token::Null) => Ok(Expr::Null),
        Some(Token::True) => Ok(Expr::Bool(true)),
        Some(Token::False) => Ok(Expr::Bool(false)),
        Some(Token::Integer(n)) => Ok(Expr::Integer(*n)),
        Some(Token::Float(n)) => Ok(Expr::Float(*n)),
        Some(Token::StringLiteral(s)) => Ok(Expr::text(s.clone())),
        Some(Token::Template(parts)) => cursor.nested(|c| parse_template(parts, c.depth)),
        Some(Token::BracketOpen) => cursor.nested(parse_list),
        Some(Token::BraceOpen) => cursor.nested(parse_map),
        Some(Token::Identifier(head)) => parse_path(cursor, head.clone()),
        other => Err(parse_err(format!("expected expression, got {other:?}"))),
    }
}

fn parse_template(parts: &[TemplatePart], depth: usize) -> Result<Expr> {
    let segments = parts
        .iter()
        .map(|part| match part {
            TemplatePart::Text(text) => Ok(Segment::Text(text.clone())),
            TemplatePart::Source(source) => parse_at(source, depth).map(Segment::Interpolation),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Expr::Str(segments))
}

/// A map key or path segment: identifier or non-interpolated string.
fn parse_key(cursor: &mut TokenCursor<'_>) -> Result<String> {
    match cursor.advance() {
        Some(Token::Identifier(s) | Token::StringLiteral(s)) => Ok(s.clone()),
        Some(Token::Template(parts)) => match parts.as_slice() {
            [] => Ok(String::new()),
            [TemplatePart::Text(text)] => Ok(text.clone()),
            _ => Err(parse_err("interpolation is not allowed in a key".into())),
        },
        other => Err(parse_err(format!("expected key, got {other:?}"))),
    }
}

fn parse_path(cursor: &mut TokenCursor<'_>, head: String) -> Result<Expr> {
    let mut segments = vec![head];
    while cursor.peek() == Some(&Token::Dot) {
        let _ = cursor.advance();
        segments.push(parse_key(cursor)?);
    }
    Ok(Expr::Path(segments))
}

fn parse_list(cursor: &mut TokenCursor<'_>) -> Result<Expr> {
    let mut items = Vec::new();

    while cursor.peek() != Some(&Token::BracketClose) {
        if cursor.at_end() {
            return Err(parse_err("unexpected end of input inside list".into()));
        }
        items.push(parse_expr(cursor)?);
        skip_optional_comma(cursor);
    }

    cursor.expect_token(&Token::BracketClose)?;
    Ok(Expr::List(items))
}

fn parse_map(cursor: &mut TokenCursor<'_>) -> Result<Expr> {
    let mut entries = Vec::new();

    while cursor.peek() != Some(&Token::BraceClose) {
        if cursor.at_end() {
            return Err(parse_err("unexpected end of input inside map".into()));
        }
        let key = parse_key(cursor)?;
        cursor.expect_token(&Token::Colon)?;
        entries.push((key, parse_expr(cursor)?));
        skip_optional_comma(cursor);
    }

    cursor.expect_token(&Token::BraceClose)?;
    Ok(Expr::Map(entries))
}
