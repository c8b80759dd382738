//! Path expression tokenizer.

use crate::error::{CoreError, CoreResult};

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare name, including `true`, `false` and `null`.
    Identifier(String),
    /// Single-quoted string.
    SingleQuoted(String),
    /// Double-quoted string.
    DoubleQuoted(String),
    /// Number text, possibly signed.
    Number(String),
    /// `.`
    Dot,
    /// `..`
    DotDot,
    /// `[`
    OpenBracket,
    /// `]`
    CloseBracket,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `*`
    Star,
    /// `$`
    Dollar,
    /// `@`
    At,
    /// Comparison operator text.
    Operator(String),
}

/// A token with its byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// Byte offset of its first character.
    pub position: usize,
}

/// Splits expression text into tokens.
///
/// # Errors
///
/// Fails on unterminated quotes, unknown operators and stray characters.
pub fn tokenize(text: &str) -> CoreResult<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '.' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '.'))) {
                    chars.next();
                    Token::DotDot
                } else {
                    Token::Dot
                }
            }
            '[' | ']' | ',' | ':' | '*' | '$' | '@' => {
                chars.next();
                match c {
                    '[' => Token::OpenBracket,
                    ']' => Token::CloseBracket,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    '*' => Token::Star,
                    '$' => Token::Dollar,
                    _ => Token::At,
                }
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(CoreError::path_syntax("unterminated quoted string", position));
                }
                if c == '\'' {
                    Token::SingleQuoted(value)
                } else {
                    Token::DoubleQuoted(value)
                }
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let mut op = c.to_string();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    op.push('=');
                }
                if op.parse::<super::ast::Operator>().is_err() {
                    return Err(CoreError::path_syntax(
                        format!("unknown operator '{op}'"),
                        position,
                    ));
                }
                Token::Operator(op)
            }
            '-' | '0'..='9' => {
                let mut number = String::new();
                chars.next();
                number.push(c);
                while let Some(&(_, ch)) = chars.peek() {
                    let exponent_sign =
                        (ch == '-' || ch == '+') && number.ends_with(['e', 'E']);
                    if ch.is_ascii_digit() || ch == 'e' || ch == 'E' || exponent_sign {
                        number.push(ch);
                        chars.next();
                    } else if ch == '.' {
                        // `1..` is an index followed by recursive descent
                        let mut ahead = chars.clone();
                        ahead.next();
                        if !matches!(ahead.peek(), Some((_, d)) if d.is_ascii_digit()) {
                            break;
                        }
                        number.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if number == "-" {
                    return Err(CoreError::path_syntax("expected digits after '-'", position));
                }
                Token::Number(number)
            }
            c if is_identifier_start(c) => {
                let mut name = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if is_identifier_char(ch) {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Identifier(name)
            }
            other => {
                return Err(CoreError::path_syntax(
                    format!("unexpected character '{other}'"),
                    position,
                ))
            }
        };
        tokens.push(Spanned { token, position });
    }

    Ok(tokens)
}

/// Returns true if `c` may start a bare attribute name.
pub fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Returns true if `c` may continue a bare attribute name.
pub fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Returns true if `name` can be written without quotes.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_identifier_start) && chars.all(is_identifier_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<Token> {
        tokenize(text)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn attribute_chain() {
        assert_eq!(
            kinds("a.b..c"),
            vec![
                Token::Identifier("a".into()),
                Token::Dot,
                Token::Identifier("b".into()),
                Token::DotDot,
                Token::Identifier("c".into()),
            ]
        );
    }

    #[test]
    fn constraint_tokens() {
        assert_eq!(
            kinds(r#"a[_key=="x"]"#),
            vec![
                Token::Identifier("a".into()),
                Token::OpenBracket,
                Token::Identifier("_key".into()),
                Token::Operator("==".into()),
                Token::DoubleQuoted("x".into()),
                Token::CloseBracket,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("[-1:2.5:1e3]"),
            vec![
                Token::OpenBracket,
                Token::Number("-1".into()),
                Token::Colon,
                Token::Number("2.5".into()),
                Token::Colon,
                Token::Number("1e3".into()),
                Token::CloseBracket,
            ]
        );
    }

    #[test]
    fn escaped_quotes() {
        assert_eq!(
            kinds(r"'it\'s'"),
            vec![Token::SingleQuoted("it's".into())]
        );
    }

    #[test]
    fn unterminated_quote() {
        let err = tokenize("a['b").unwrap_err();
        assert_eq!(err, CoreError::path_syntax("unterminated quoted string", 2));
    }

    #[test]
    fn unknown_operator() {
        assert!(matches!(
            tokenize("[a = 1]"),
            Err(CoreError::PathSyntax { position: 3, .. })
        ));
        assert!(tokenize("[a ! 1]").is_err());
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("_key"));
        assert!(is_identifier("title2"));
        assert!(!is_identifier("2title"));
        assert!(!is_identifier("with space"));
        assert!(!is_identifier(""));
    }
}
