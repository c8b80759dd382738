//! Recursive-descent parser for path expressions.
//!
//! ```text
//! path      := head ( '.' name | '..' descent | bracket )*
//! head      := name | '*' | '$' | '@' | bracket | '..' descent
//! bracket   := '[' item ( ',' item )* ']'
//! item      := index | range | operand ( operator literal )?
//! operand   := head-less path starting with name, quoted, '*', '$' or '@'
//! ```

use super::ast::{Alias, Constraint, Expr, Literal, Operator, Range};
use super::tokenizer::{tokenize, Spanned, Token};
use crate::error::{CoreError, CoreResult};

/// Parses a path expression.
///
/// # Errors
///
/// Returns [`CoreError::PathSyntax`] with the byte offset of the problem.
pub fn parse(text: &str) -> CoreResult<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: text.len(),
    };
    if parser.tokens.is_empty() {
        return Err(CoreError::path_syntax("empty expression", 0));
    }
    let expr = parser.path()?;
    if let Some(extra) = parser.peek() {
        return Err(CoreError::path_syntax(
            format!("unexpected {}", describe(&extra.token)),
            extra.position,
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.cursor)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |s| s.position)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> CoreResult<()> {
        match self.advance() {
            Some(s) if &s.token == expected => Ok(()),
            Some(s) => Err(CoreError::path_syntax(
                format!("expected {}, found {}", describe(expected), describe(&s.token)),
                s.position,
            )),
            None => Err(CoreError::path_syntax(
                format!("expected {}", describe(expected)),
                self.end,
            )),
        }
    }

    fn path(&mut self) -> CoreResult<Expr> {
        let mut steps = vec![self.head()?];
        self.continuation(&mut steps)?;
        Ok(Expr::from_steps(steps))
    }

    fn head(&mut self) -> CoreResult<Expr> {
        let position = self.position();
        match self.advance().map(|s| s.token) {
            Some(Token::Identifier(name) | Token::SingleQuoted(name) | Token::DoubleQuoted(name)) => {
                Ok(Expr::Attribute(name))
            }
            Some(Token::Star) => Ok(Expr::Wildcard),
            Some(Token::Dollar) => Ok(Expr::Alias(Alias::Root)),
            Some(Token::At) => Ok(Expr::Alias(Alias::This)),
            Some(Token::OpenBracket) => self.bracket(),
            Some(Token::DotDot) => self.descent(),
            Some(other) => Err(CoreError::path_syntax(
                format!("unexpected {}", describe(&other)),
                position,
            )),
            None => Err(CoreError::path_syntax("expected a selector", position)),
        }
    }

    fn continuation(&mut self, steps: &mut Vec<Expr>) -> CoreResult<()> {
        loop {
            match self.peek_token() {
                Some(Token::Dot) => {
                    self.advance();
                    steps.push(self.dotted_name()?);
                }
                Some(Token::DotDot) => {
                    self.advance();
                    steps.push(self.descent()?);
                }
                Some(Token::OpenBracket) => {
                    self.advance();
                    steps.push(self.bracket()?);
                }
                _ => return Ok(()),
            }
        }
    }

    fn dotted_name(&mut self) -> CoreResult<Expr> {
        let position = self.position();
        match self.advance().map(|s| s.token) {
            Some(Token::Identifier(name) | Token::SingleQuoted(name) | Token::DoubleQuoted(name)) => {
                Ok(Expr::Attribute(name))
            }
            Some(Token::Star) => Ok(Expr::Wildcard),
            Some(other) => Err(CoreError::path_syntax(
                format!("expected attribute name after '.', found {}", describe(&other)),
                position,
            )),
            None => Err(CoreError::path_syntax("dangling '.'", position)),
        }
    }

    fn descent(&mut self) -> CoreResult<Expr> {
        let position = self.position();
        let step = match self.advance().map(|s| s.token) {
            Some(Token::Identifier(name) | Token::SingleQuoted(name) | Token::DoubleQuoted(name)) => {
                Expr::Attribute(name)
            }
            Some(Token::Star) => Expr::Wildcard,
            Some(Token::OpenBracket) => self.bracket()?,
            Some(other) => {
                return Err(CoreError::path_syntax(
                    format!("unexpected {} after '..'", describe(&other)),
                    position,
                ))
            }
            None => return Err(CoreError::path_syntax("dangling '..'", position)),
        };
        Ok(Expr::Recursive(Box::new(step)))
    }

    /// Parses bracket contents; the opening bracket is already consumed.
    fn bracket(&mut self) -> CoreResult<Expr> {
        let mut items = vec![self.item()?];
        loop {
            let position = self.position();
            match self.advance().map(|s| s.token) {
                Some(Token::Comma) => items.push(self.item()?),
                Some(Token::CloseBracket) => break,
                Some(other) => {
                    return Err(CoreError::path_syntax(
                        format!("expected ',' or ']', found {}", describe(&other)),
                        position,
                    ))
                }
                None => return Err(CoreError::path_syntax("unterminated '['", position)),
            }
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Union(items)
        })
    }

    fn item(&mut self) -> CoreResult<Expr> {
        match self.peek_token() {
            Some(Token::Number(_) | Token::Colon) => self.index_or_range(),
            Some(
                Token::Identifier(_)
                | Token::SingleQuoted(_)
                | Token::DoubleQuoted(_)
                | Token::Star
                | Token::Dollar
                | Token::At,
            ) => {
                let operand = self.operand()?;
                if let Some(Token::Operator(op)) = self.peek_token() {
                    let op = op.clone();
                    let position = self.position();
                    self.advance();
                    let operator: Operator = op
                        .parse()
                        .map_err(|_| CoreError::path_syntax(format!("unknown operator '{op}'"), position))?;
                    let rhs = self.literal()?;
                    return Ok(Expr::Constraint(Constraint {
                        lhs: Box::new(operand),
                        operator,
                        rhs,
                    }));
                }
                Ok(operand)
            }
            Some(other) => Err(CoreError::path_syntax(
                format!("unexpected {} in brackets", describe(other)),
                self.position(),
            )),
            None => Err(CoreError::path_syntax("unterminated '['", self.position())),
        }
    }

    fn operand(&mut self) -> CoreResult<Expr> {
        let position = self.position();
        let head = match self.advance().map(|s| s.token) {
            Some(Token::Identifier(name) | Token::SingleQuoted(name) | Token::DoubleQuoted(name)) => {
                Expr::Attribute(name)
            }
            Some(Token::Star) => Expr::Wildcard,
            Some(Token::Dollar) => Expr::Alias(Alias::Root),
            Some(Token::At) => Expr::Alias(Alias::This),
            _ => return Err(CoreError::path_syntax("expected an operand", position)),
        };
        let mut steps = vec![head];
        self.continuation(&mut steps)?;
        Ok(Expr::from_steps(steps))
    }

    fn index_or_range(&mut self) -> CoreResult<Expr> {
        let start = self.optional_integer()?;
        if !matches!(self.peek_token(), Some(Token::Colon)) {
            return match start {
                Some(index) => Ok(Expr::Index(index)),
                None => Err(CoreError::path_syntax("expected an index", self.position())),
            };
        }
        self.advance();
        let end = self.optional_integer()?;
        let mut step = None;
        if matches!(self.peek_token(), Some(Token::Colon)) {
            self.advance();
            let position = self.position();
            step = self.optional_integer()?;
            if step.is_some_and(|s| s <= 0) {
                return Err(CoreError::path_syntax("slice step must be positive", position));
            }
        }
        Ok(Expr::Range(Range { start, end, step }))
    }

    fn optional_integer(&mut self) -> CoreResult<Option<i64>> {
        let Some(Spanned {
            token: Token::Number(text),
            position,
        }) = self.peek().cloned()
        else {
            return Ok(None);
        };
        self.advance();
        text.parse::<i64>()
            .map(Some)
            .map_err(|_| CoreError::path_syntax(format!("'{text}' is not an integer"), position))
    }

    fn literal(&mut self) -> CoreResult<Literal> {
        let position = self.position();
        match self.advance().map(|s| s.token) {
            Some(Token::SingleQuoted(s) | Token::DoubleQuoted(s)) => Ok(Literal::Text(s)),
            Some(Token::Number(text)) => {
                let literal = if text.contains(['.', 'e', 'E']) {
                    text.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(Literal::Float)
                } else {
                    text.parse::<i64>().ok().map(Literal::Integer)
                };
                literal.ok_or_else(|| {
                    CoreError::path_syntax(format!("invalid number '{text}'"), position)
                })
            }
            Some(Token::Identifier(word)) => match word.as_str() {
                "true" => Ok(Literal::Bool(true)),
                "false" => Ok(Literal::Bool(false)),
                "null" => Ok(Literal::Null),
                _ => Err(CoreError::path_syntax(
                    format!("expected a literal, found '{word}'"),
                    position,
                )),
            },
            Some(other) => Err(CoreError::path_syntax(
                format!("expected a literal, found {}", describe(&other)),
                position,
            )),
            None => Err(CoreError::path_syntax("dangling comparison", position)),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Identifier(name) => format!("'{name}'"),
        Token::SingleQuoted(s) | Token::DoubleQuoted(s) => format!("string {s:?}"),
        Token::Number(n) => format!("number {n}"),
        Token::Dot => "'.'".into(),
        Token::DotDot => "'..'".into(),
        Token::OpenBracket => "'['".into(),
        Token::CloseBracket => "']'".into(),
        Token::Comma => "','".into(),
        Token::Colon => "':'".into(),
        Token::Star => "'*'".into(),
        Token::Dollar => "'$'".into(),
        Token::At => "'@'".into(),
        Token::Operator(op) => format!("operator '{op}'"),
    }
}
