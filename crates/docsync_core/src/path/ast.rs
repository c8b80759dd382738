//! Path expression syntax tree.

use crate::error::{CoreError, CoreResult};
use docsync_codec::Value;
use std::fmt;
use std::str::FromStr;

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A sequence of steps, e.g. `a.b[0]`.
    Path(Vec<Expr>),
    /// Named object attribute.
    Attribute(String),
    /// Array index. Negative values count from the end.
    Index(i64),
    /// Array slice.
    Range(Range),
    /// Every child of an array or object.
    Wildcard,
    /// `$` or `@`.
    Alias(Alias),
    /// Several alternative selectors, e.g. `[a,b]` or `[1,3]`.
    Union(Vec<Expr>),
    /// `..step`: the step at this level or at any depth below it.
    Recursive(Box<Expr>),
    /// Filter such as `[_key=="x"]` or `[@ > 3]`.
    Constraint(Constraint),
}

/// Slice bounds `[start:end:step]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    /// Inclusive start, negative counts from the end.
    pub start: Option<i64>,
    /// Exclusive end, negative counts from the end.
    pub end: Option<i64>,
    /// Positive stride.
    pub step: Option<i64>,
}

impl Range {
    /// Resolves the slice against a container length.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        let len_i = i64::try_from(len).unwrap_or(i64::MAX);
        let clamp = |bound: i64| {
            let resolved = if bound < 0 { len_i + bound } else { bound };
            resolved.clamp(0, len_i)
        };
        let start = self.start.map_or(0, clamp);
        let end = self.end.map_or(len_i, clamp);
        let step = self.step.unwrap_or(1).max(1);
        let mut out = Vec::new();
        let mut i = start;
        while i < end {
            out.push(usize::try_from(i).unwrap_or(usize::MAX));
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
        out
    }
}

/// The two reference aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alias {
    /// `$`, the document root.
    Root,
    /// `@`, the current element.
    This,
}

/// Comparison filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// Operand evaluated against each candidate element.
    pub lhs: Box<Expr>,
    /// Comparison operator.
    pub operator: Operator,
    /// Literal compared against.
    pub rhs: Literal,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
}

impl Operator {
    /// Operator text.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
        }
    }

    /// Evaluates `lhs <op> rhs`. Unordered pairs never satisfy an ordering.
    pub fn test(self, lhs: &Value, rhs: &Value) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Equal => lhs == rhs,
            Self::NotEqual => lhs != rhs,
            Self::Greater => lhs.compare(rhs) == Some(Greater),
            Self::GreaterOrEqual => matches!(lhs.compare(rhs), Some(Greater | Equal)),
            Self::Less => lhs.compare(rhs) == Some(Less),
            Self::LessOrEqual => matches!(lhs.compare(rhs), Some(Less | Equal)),
        }
    }
}

impl FromStr for Operator {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "==" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            ">" => Ok(Self::Greater),
            ">=" => Ok(Self::GreaterOrEqual),
            "<" => Ok(Self::Less),
            "<=" => Ok(Self::LessOrEqual),
            other => Err(CoreError::UnsupportedOperator {
                operator: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constant on the right-hand side of a constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Quoted string.
    Text(String),
    /// Integral number.
    Integer(i64),
    /// Number with a fraction or exponent.
    Float(f64),
    /// `true` or `false`.
    Bool(bool),
    /// `null`.
    Null,
}

impl Literal {
    /// The literal as a document value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::Text(s.clone()),
            Self::Integer(n) => Value::Integer(*n),
            Self::Float(f) => Value::Float(*f),
            Self::Bool(b) => Value::Bool(*b),
            Self::Null => Value::Null,
        }
    }
}

impl Expr {
    /// Builds a path from steps, unwrapping a single step.
    pub fn from_steps(mut steps: Vec<Expr>) -> Expr {
        if steps.len() == 1 {
            steps.remove(0)
        } else {
            Expr::Path(steps)
        }
    }

    /// The steps of this expression; a non-path is a single step.
    pub fn steps(&self) -> &[Expr] {
        match self {
            Expr::Path(steps) => steps,
            other => std::slice::from_ref(other),
        }
    }

    /// Attribute name if this is a plain attribute step.
    pub fn as_attribute(&self) -> Option<&str> {
        match self {
            Expr::Attribute(name) => Some(name),
            _ => None,
        }
    }

    /// Returns true if every step is an attribute or a non-negative index.
    ///
    /// Such an expression addresses at most one value.
    pub fn is_simple(&self) -> bool {
        self.steps()
            .iter()
            .all(|step| matches!(step, Expr::Attribute(_)) || matches!(step, Expr::Index(i) if *i >= 0))
    }
}
