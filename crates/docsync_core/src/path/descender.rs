//! Partially consumed expressions.

use super::ast::Expr;
use super::extract::extract;
use crate::accessor::{Accessor, ContainerType};
use crate::error::CoreResult;
use docsync_codec::Value;

/// The steps of an expression that remain to be matched.
///
/// A descender whose head is a structural step (path, union, alias,
/// recursive descent, or a constraint on a non-array) is expanded against
/// the current accessor before matching; after expansion every descender
/// either starts with a selector that picks children or is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct Descender {
    steps: Vec<Expr>,
}

impl Descender {
    /// Creates a descender over every step of `expr`.
    pub fn new(expr: &Expr) -> Self {
        Self {
            steps: expr.steps().to_vec(),
        }
    }

    /// The next step, if any.
    pub fn head(&self) -> Option<&Expr> {
        self.steps.first()
    }

    /// Returns true if every step has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }

    /// The descender after the head step.
    #[must_use]
    pub fn tail(&self) -> Descender {
        Self {
            steps: self.steps.iter().skip(1).cloned().collect(),
        }
    }

    /// Replaces the head step with `head` followed by the current tail.
    fn splice_head(&self, head: &[Expr]) -> Descender {
        let mut steps = head.to_vec();
        steps.extend(self.steps.iter().skip(1).cloned());
        Self { steps }
    }

    /// Expands structural head steps against `accessor`.
    pub fn expand(&self, accessor: &Accessor) -> CoreResult<Vec<Descender>> {
        let mut out = Vec::new();
        self.expand_into(accessor, &mut out)?;
        Ok(out)
    }

    fn expand_into(&self, accessor: &Accessor, out: &mut Vec<Descender>) -> CoreResult<()> {
        match self.head() {
            Some(Expr::Path(steps)) => self.splice_head(steps).expand_into(accessor, out),
            Some(Expr::Union(items)) => {
                for item in items {
                    self.splice_head(item.steps()).expand_into(accessor, out)?;
                }
                Ok(())
            }
            Some(Expr::Alias(_)) => self.tail().expand_into(accessor, out),
            Some(Expr::Recursive(inner)) => {
                // match here, or step into every child and try again
                self.splice_head(inner.steps()).expand_into(accessor, out)?;
                let mut again = vec![Expr::Wildcard];
                again.extend(self.steps.iter().cloned());
                out.push(Self { steps: again });
                Ok(())
            }
            Some(Expr::Constraint(constraint))
                if accessor.container_type() != ContainerType::Array =>
            {
                if constraint_holds(constraint, accessor.get())? {
                    self.tail().expand_into(accessor, out)?;
                }
                Ok(())
            }
            _ => {
                out.push(self.clone());
                Ok(())
            }
        }
    }
}

/// Tests a constraint against one candidate value.
///
/// An operand that selects nothing compares as `null`.
pub fn constraint_holds(constraint: &super::ast::Constraint, candidate: &Value) -> CoreResult<bool> {
    let rhs = constraint.rhs.to_value();
    let values = extract(&constraint.lhs, candidate)?;
    if values.is_empty() {
        return Ok(constraint.operator.test(&Value::Null, &rhs));
    }
    Ok(values
        .iter()
        .any(|value| constraint.operator.test(value, &rhs)))
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn heads(descenders: &[Descender]) -> Vec<Option<Expr>> {
        descenders.iter().map(|d| d.head().cloned()).collect()
    }

    #[test]
    fn union_expands_in_order() {
        let d = Descender::new(&parse("[a,b].c").unwrap());
        let expanded = d.expand(&Accessor::new(Value::empty_object())).unwrap();
        assert_eq!(
            heads(&expanded),
            vec![
                Some(Expr::Attribute("a".into())),
                Some(Expr::Attribute("b".into()))
            ]
        );
        assert_eq!(expanded[0].tail().head(), Some(&Expr::Attribute("c".into())));
    }

    #[test]
    fn recursive_expands_lazily() {
        let d = Descender::new(&parse("..a").unwrap());
        let expanded = d.expand(&Accessor::new(Value::empty_object())).unwrap();
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].head(), Some(&Expr::Attribute("a".into())));
        assert_eq!(expanded[1].head(), Some(&Expr::Wildcard));
        assert!(matches!(expanded[1].tail().head(), Some(Expr::Recursive(_))));
    }

    #[test]
    fn constraint_on_object_tests_itself() {
        let d = Descender::new(&parse(r#"[_key=="x"]"#).unwrap());
        let keyed = Value::object([("_key", Value::from("x"))]);
        let expanded = d.expand(&Accessor::new(keyed)).unwrap();
        assert_eq!(expanded.len(), 1);
        assert!(expanded[0].is_exhausted());

        let other = Value::object([("_key", Value::from("y"))]);
        assert!(d.expand(&Accessor::new(other)).unwrap().is_empty());
        assert!(d.expand(&Accessor::new(Value::Integer(1))).unwrap().is_empty());
    }

    #[test]
    fn constraint_on_array_is_a_selector() {
        let d = Descender::new(&parse("[@ > 1]").unwrap());
        let expanded = d
            .expand(&Accessor::new(Value::from(vec![1i64, 2])))
            .unwrap();
        assert!(matches!(expanded[0].head(), Some(Expr::Constraint(_))));
    }

    #[test]
    fn missing_operand_compares_as_null() {
        let Expr::Constraint(c) = parse("[b == null]").unwrap() else {
            panic!("expected a constraint");
        };
        assert!(constraint_holds(&c, &Value::empty_object()).unwrap());
        assert!(!constraint_holds(&c, &Value::object([("b", Value::Integer(1))])).unwrap());
    }
}
