//! Path expression printer.
//!
//! Output parses back to an equal expression for everything the parser can
//! produce.

use super::ast::{Alias, Constraint, Expr, Literal, Range};
use super::tokenizer::is_identifier;
use crate::accessor::PathSegment;
use std::fmt::{self, Write};

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_head(f, self)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => write_quoted(f, s, '"'),
            Literal::Integer(n) => write!(f, "{n}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("null"),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{start}")?;
        }
        f.write_char(':')?;
        if let Some(end) = self.end {
            write!(f, "{end}")?;
        }
        if let Some(step) = self.step {
            write!(f, ":{step}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_item(f, &self.lhs)?;
        write!(f, " {} {}", self.operator, self.rhs)
    }
}

/// Prints a concrete path as a canonical expression, e.g. `a[_key=="x"].b`.
pub fn to_path_string(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return String::new();
    }
    let steps = path.iter().map(segment_to_expr).collect();
    Expr::from_steps(steps).to_string()
}

/// The expression selecting exactly one concrete segment.
pub fn segment_to_expr(segment: &PathSegment) -> Expr {
    match segment {
        PathSegment::Attribute(name) => Expr::Attribute(name.clone()),
        PathSegment::Index(i) => Expr::Index(i64::try_from(*i).unwrap_or(i64::MAX)),
        PathSegment::Key(key) => Expr::Constraint(Constraint {
            lhs: Box::new(Expr::Attribute("_key".to_string())),
            operator: super::ast::Operator::Equal,
            rhs: Literal::Text(key.clone()),
        }),
    }
}

fn write_head(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Path(steps) => {
            let mut steps = steps.iter();
            if let Some(first) = steps.next() {
                write_head(f, first)?;
            }
            steps.try_for_each(|step| write_continuation(f, step))
        }
        Expr::Attribute(name) => write_name(f, name),
        Expr::Wildcard => f.write_char('*'),
        Expr::Alias(alias) => write_alias(f, *alias),
        Expr::Recursive(step) => {
            f.write_str("..")?;
            write_descent(f, step)
        }
        other => write_bracketed(f, other),
    }
}

fn write_continuation(f: &mut fmt::Formatter<'_>, step: &Expr) -> fmt::Result {
    match step {
        Expr::Attribute(name) if is_identifier(name) => write!(f, ".{name}"),
        Expr::Recursive(inner) => {
            f.write_str("..")?;
            write_descent(f, inner)
        }
        other => write_bracketed(f, other),
    }
}

fn write_descent(f: &mut fmt::Formatter<'_>, step: &Expr) -> fmt::Result {
    match step {
        Expr::Attribute(name) => write_name(f, name),
        Expr::Wildcard => f.write_char('*'),
        other => write_bracketed(f, other),
    }
}

fn write_bracketed(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    f.write_char('[')?;
    match expr {
        Expr::Union(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_char(',')?;
                }
                write_item(f, item)?;
            }
        }
        other => write_item(f, other)?,
    }
    f.write_char(']')
}

fn write_item(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Index(i) => write!(f, "{i}"),
        Expr::Range(range) => write!(f, "{range}"),
        Expr::Constraint(constraint) => write!(f, "{constraint}"),
        Expr::Union(_) => write_bracketed(f, expr),
        other => write_head(f, other),
    }
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_identifier(name) {
        f.write_str(name)
    } else {
        write_quoted(f, name, '\'')
    }
}

fn write_alias(f: &mut fmt::Formatter<'_>, alias: Alias) -> fmt::Result {
    f.write_char(match alias {
        Alias::Root => '$',
        Alias::This => '@',
    })
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str, quote: char) -> fmt::Result {
    f.write_char(quote)?;
    for c in s.chars() {
        if c == quote || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char(quote)
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn round_trip(text: &str) -> String {
        let expr = parse(text).unwrap();
        let printed = expr.to_string();
        assert_eq!(parse(&printed).unwrap(), expr, "round trip of {text:?}");
        printed
    }

    #[test]
    fn canonical_output() {
        assert_eq!(round_trip("a.b.c"), "a.b.c");
        assert_eq!(round_trip("a['b']"), "a.b");
        assert_eq!(round_trip("a['with space']"), "a['with space']");
        assert_eq!(round_trip("a[-1]"), "a[-1]");
        assert_eq!(round_trip("a[1:3]"), "a[1:3]");
        assert_eq!(round_trip("a[::2]"), "a[::2]");
        assert_eq!(round_trip("a[:]"), "a[:]");
        assert_eq!(round_trip("a[*]"), "a[*]");
        assert_eq!(round_trip("a.*"), "a[*]");
        assert_eq!(round_trip("a[1,3]"), "a[1,3]");
        assert_eq!(round_trip("a..b"), "a..b");
        assert_eq!(round_trip("..[0]"), "..[0]");
        assert_eq!(round_trip(r#"a[_key=="x"].b"#), r#"a[_key == "x"].b"#);
        assert_eq!(round_trip("a[@>3]"), "a[@ > 3]");
        assert_eq!(round_trip("[b != null]"), "[b != null]");
        assert_eq!(round_trip("$.a"), "$.a");
        assert_eq!(round_trip("[a,b.c]"), "[a,b.c]");
        assert_eq!(round_trip("x[n >= 2.5]"), "x[n >= 2.5]");
    }

    #[test]
    fn quoted_strings_escape() {
        assert_eq!(round_trip(r"a['it\'s']"), r"a['it\'s']");
        assert_eq!(round_trip(r#"a[k == "say \"hi\""]"#), r#"a[k == "say \"hi\""]"#);
    }

    #[test]
    fn concrete_paths() {
        let path = vec![
            PathSegment::Attribute("a".into()),
            PathSegment::Key("x".into()),
            PathSegment::Attribute("b".into()),
            PathSegment::Index(3),
        ];
        assert_eq!(to_path_string(&path), r#"a[_key == "x"].b[3]"#);
        assert_eq!(to_path_string(&[]), "");
        assert!(parse(&to_path_string(&path)).is_ok());
    }
}
