//! Restricted expression language carried by deferred values.
//!
//! Expressions are literals, dotted binding paths, list and map literals,
//! and double-quoted strings with `${ ... }` interpolation. There are no
//! operators or calls; evaluation only looks names up in a [`Scope`].
//!
//! [`Scope`]: crate::scope::Scope

pub mod eval;
pub mod lexer;
pub mod parser;

use std::fmt;

pub use self::eval::{EvalError, evaluate};
pub use self::parser::parse;

/// Expression syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `null`.
    Null,
    /// `true` or `false`.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// String literal, possibly interpolated.
    Str(Vec<Segment>),
    /// Dotted binding path, head first.
    Path(Vec<String>),
    /// List literal.
    List(Vec<Expr>),
    /// Map literal in source order.
    Map(Vec<(String, Expr)>),
}

/// A piece of a string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text.
    Text(String),
    /// Interpolated expression.
    Interpolation(Expr),
}

impl Expr {
    /// Builds a path expression from its segments.
    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Path(segments.into_iter().map(Into::into).collect())
    }

    /// Builds a non-interpolated string literal.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Str(vec![Segment::Text(text.into())])
    }
}

fn write_key(f: &mut fmt::Formatter<'_>, key: &str) -> fmt::Result {
    if lexer::is_identifier(key) {
        f.write_str(key)
    } else {
        f.write_str("\"")?;
        write_escaped(f, key)?;
        f.write_str("\"")
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '$' => f.write_str("\\$")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n:?}"),
            Self::Str(segments) => {
                f.write_str("\"")?;
                for segment in segments {
                    match segment {
                        Segment::Text(text) => write_escaped(f, text)?,
                        Segment::Interpolation(e) => write!(f, "${{{e}}}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::Path(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write_key(f, segment)?;
                }
                Ok(())
            }
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(" ")?;
                    write_key(f, key)?;
                    write!(f, ": {value}")?;
                }
                if !entries.is_empty() {
                    f.write_str(" ")?;
                }
                f.write_str("}")
            }
        }
    }
}
