//! Tokenization of expression source using `nom`.
//!
//! Produces a stream of [`Token`]s for the parser to consume.
//! Whitespace is discarded between tokens. Double-quoted strings are split
//! into literal text and `${ ... }` interpolation sources here, so the
//! parser never sees raw braces from inside a string.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{opt, recognize, value},
};
use shipwright_common::error::{Result, ShipwrightError};

/// A token of the expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean literal `true`.
    True,
    /// Boolean literal `false`.
    False,
    /// `null` literal.
    Null,
    /// A binding or key name.
    Identifier(String),
    /// A single-quoted string, taken verbatim.
    StringLiteral(String),
    /// A double-quoted string, possibly interpolating expressions.
    Template(Vec<TemplatePart>),
    /// An integer literal.
    Integer(i64),
    /// A floating-point literal.
    Float(f64),
    /// `{` opening brace.
    BraceOpen,
    /// `}` closing brace.
    BraceClose,
    /// `[` opening bracket.
    BracketOpen,
    /// `]` closing bracket.
    BracketClose,
    /// `.` path separator.
    Dot,
    /// `,` separator.
    Comma,
    /// `:` key separator.
    Colon,
}

/// A piece of a double-quoted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Literal text with escapes already applied.
    Text(String),
    /// Source of an interpolated expression, without the `${` `}` delimiters.
    Source(String),
}

fn unterminated(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Char))
}

/// Length of an interpolation body up to its matching `}`.
fn interpolation_len(body: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses a double-quoted string with escapes and `${}` interpolation.
fn template_literal(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('"')(input)?;
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = input.char_indices().peekable();
    loop {
        match chars.next() {
            Some((idx, '"')) => {
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(text));
                }
                return Ok((&input[idx + 1..], Token::Template(parts)));
            }
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, '\\')) => text.push('\\'),
                Some((_, '"')) => text.push('"'),
                Some((_, '$')) => text.push('$'),
                Some((_, c)) => {
                    text.push('\\');
                    text.push(c);
                }
                None => return Err(unterminated(input)),
            },
            Some((_, '$')) if chars.peek().map(|&(_, c)| c) == Some('{') => {
                let Some((brace, _)) = chars.next() else {
                    return Err(unterminated(input));
                };
                let start = brace + 1;
                let len = interpolation_len(&input[start..]).ok_or_else(|| unterminated(input))?;
                let close = start + len;
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                parts.push(TemplatePart::Source(input[start..close].to_owned()));
                while chars.peek().is_some_and(|&(i, _)| i <= close) {
                    let _ = chars.next();
                }
            }
            Some((_, c)) => text.push(c),
            None => return Err(unterminated(input)),
        }
    }
}

/// Parses a single-quoted string. Only `\'` and `\\` are escapes.
fn verbatim_literal(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('\'')(input)?;
    let mut result = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, '\'')) => {
                return Ok((&input[idx + 1..], Token::StringLiteral(result)));
            }
            Some((_, '\\')) => match chars.next() {
                Some((_, '\'')) => result.push('\''),
                Some((_, '\\')) => result.push('\\'),
                Some((_, c)) => {
                    result.push('\\');
                    result.push(c);
                }
                None => return Err(unterminated(input)),
            },
            Some((_, c)) => result.push(c),
            None => return Err(unterminated(input)),
        }
    }
}

/// Parses an integer or float literal with an optional leading `-`.
fn number_literal(input: &str) -> IResult<&str, Token> {
    let (rest, text) =
        recognize((opt(char('-')), digit1, opt((char('.'), digit1)))).parse(input)?;
    let invalid = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit));
    let token = if text.contains('.') {
        Token::Float(text.parse().map_err(|_| invalid())?)
    } else {
        Token::Integer(text.parse().map_err(|_| invalid())?)
    };
    Ok((rest, token))
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Returns `true` if `word` lexes as a single identifier.
pub fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    chars.next().is_some_and(is_ident_start)
        && chars.all(is_ident_continue)
        && !matches!(word, "true" | "false" | "null")
}

/// Parses an identifier or keyword.
fn identifier_or_keyword(input: &str) -> IResult<&str, Token> {
    let (input, first) = take_while1(is_ident_start)(input)?;
    let (input, rest) = take_while(is_ident_continue)(input)?;
    let word = format!("{first}{rest}");
    let token = match word.as_str() {
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => Token::Identifier(word),
    };
    Ok((input, token))
}

/// Parses a symbol token.
fn symbol(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::BraceOpen, char('{')),
        value(Token::BraceClose, char('}')),
        value(Token::BracketOpen, char('[')),
        value(Token::BracketClose, char(']')),
        value(Token::Dot, char('.')),
        value(Token::Comma, char(',')),
        value(Token::Colon, char(':')),
    ))
    .parse(input)
}

/// Parses a single token (after whitespace has been skipped).
fn single_token(input: &str) -> IResult<&str, Token> {
    alt((
        template_literal,
        verbatim_literal,
        symbol,
        number_literal,
        identifier_or_keyword,
    ))
    .parse(input)
}

/// Tokenizes expression source into a vector of tokens.
///
/// # Errors
///
/// Returns an error if the input contains characters that cannot be
/// tokenized or an unterminated string.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0::<&str, nom::error::Error<&str>>(remaining).map_err(|e| {
            ShipwrightError::Config {
                message: format!("lexer error skipping whitespace: {e}"),
            }
        })?;
        remaining = rest;

        if remaining.is_empty() {
            break;
        }

        let (rest, token) = single_token(remaining).map_err(|e| ShipwrightError::Config {
            message: format!(
                "unexpected character in expression at: \"{}\" ({e})",
                remaining.chars().take(20).collect::<String>()
            ),
        })?;
        tokens.push(token);
        remaining = rest;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_keywords() {
        let tokens = tokenize("true false null").expect("should tokenize");
        assert_eq!(tokens, vec![Token::True, Token::False, Token::Null]);
    }

    #[test]
    fn tokenize_symbols() {
        let tokens = tokenize("{ } [ ] . , :").expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::BraceOpen,
                Token::BraceClose,
                Token::BracketOpen,
                Token::BracketClose,
                Token::Dot,
                Token::Comma,
                Token::Colon,
            ]
        );
    }

    #[test]
    fn tokenize_dotted_path() {
        let tokens = tokenize("context.service.name").expect("should tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("context".into()),
                Token::Dot,
                Token::Identifier("service".into()),
                Token::Dot,
                Token::Identifier("name".into()),
            ]
        );
    }

    #[test]
    fn tokenize_numbers() {
        let tokens = tokenize("2003 -7 1.5").expect("should tokenize");
        assert_eq!(
            tokens,
            vec![Token::Integer(2003), Token::Integer(-7), Token::Float(1.5)]
        );
    }

    #[test]
    fn tokenize_plain_double_quoted() {
        let tokens = tokenize(r#""hello world""#).expect("should tokenize");
        assert_eq!(
            tokens,
            vec![Token::Template(vec![TemplatePart::Text("hello world".into())])]
        );
    }

    #[test]
    fn tokenize_empty_string() {
        let tokens = tokenize(r#""""#).expect("should tokenize");
        assert_eq!(tokens, vec![Token::Template(Vec::new())]);
    }

    #[test]
    fn tokenize_interpolation() {
        let tokens = tokenize(r#""${frontend_project}:${image_tag_frontend}""#)
            .expect("should tokenize");
        assert_eq!(
            tokens,
            vec![Token::Template(vec![
                TemplatePart::Source("frontend_project".into()),
                TemplatePart::Text(":".into()),
                TemplatePart::Source("image_tag_frontend".into()),
            ])]
        );
    }

    #[test]
    fn tokenize_interpolation_with_nested_braces_and_quotes() {
        let tokens = tokenize(r#""a${ {k: "}"}.k }b""#).expect("should tokenize");
        assert_eq!(
            tokens,
            vec![Token::Template(vec![
                TemplatePart::Text("a".into()),
                TemplatePart::Source(r#" {k: "}"}.k "#.into()),
                TemplatePart::Text("b".into()),
            ])]
        );
    }

    #[test]
    fn tokenize_escaped_dollar_is_text() {
        let tokens = tokenize(r#""cost: \${x}""#).expect("should tokenize");
        assert_eq!(
            tokens,
            vec![Token::Template(vec![TemplatePart::Text("cost: ${x}".into())])]
        );
    }

    #[test]
    fn tokenize_single_quoted_is_verbatim() {
        let tokens = tokenize(r"'${x} it\'s'").expect("should tokenize");
        assert_eq!(tokens, vec![Token::StringLiteral("${x} it's".into())]);
    }

    #[test]
    fn tokenize_identifier_with_dash() {
        let tokens = tokenize("web-example").expect("should tokenize");
        assert_eq!(tokens, vec![Token::Identifier("web-example".into())]);
    }

    #[test]
    fn tokenize_unterminated_string_fails() {
        assert!(tokenize(r#""open"#).is_err());
        assert!(tokenize(r#""${open""#).is_err());
    }

    #[test]
    fn tokenize_error_on_invalid_char() {
        assert!(tokenize("a + b").is_err());
    }

    #[test]
    fn identifier_check() {
        assert!(is_identifier("app_var"));
        assert!(is_identifier("web-1"));
        assert!(!is_identifier("com.example"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("null"));
        assert!(!is_identifier(""));
    }
}
