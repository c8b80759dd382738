//! Expression matching against an accessor, one level at a time.

use super::ast::Expr;
use super::descender::{constraint_holds, Descender};
use crate::accessor::Accessor;
use crate::error::CoreResult;
use docsync_codec::Value;

/// A selected position relative to the accessor being matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The accessor itself.
    Current,
    /// An attribute, which may not exist yet.
    Attribute(String),
    /// An array position. Negative values count from the end and the
    /// position may be out of range; resolve with [`Target::resolve_index`].
    Index(i64),
}

impl Target {
    /// Resolves an index target against an array length.
    pub fn resolve_index(&self, len: usize) -> Option<usize> {
        match self {
            Target::Index(i) => resolve(*i, len),
            _ => None,
        }
    }
}

/// Resolves a possibly negative index into `0..len`.
pub fn resolve(index: i64, len: usize) -> Option<usize> {
    let len_i = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len_i + index } else { index };
    if (0..len_i).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

/// A child to descend into and the matcher to continue with there.
#[derive(Debug, Clone, PartialEq)]
pub struct Lead {
    /// Child position; attribute targets may be absent.
    pub target: Target,
    /// What remains to match below the child.
    pub matcher: Matcher,
}

/// Result of matching one level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    /// Children the expression continues into.
    pub leads: Vec<Lead>,
    /// Positions where the expression ends at this level.
    pub delivery: Vec<Target>,
}

impl MatchResult {
    /// Returns true if nothing matched at or below this level.
    pub fn is_empty(&self) -> bool {
        self.leads.is_empty() && self.delivery.is_empty()
    }
}

/// A set of in-progress descenders.
#[derive(Debug, Clone, PartialEq)]
pub struct Matcher {
    active: Vec<Descender>,
}

impl Matcher {
    /// Creates a matcher for a whole expression.
    pub fn from_expr(expr: &Expr) -> Self {
        Self {
            active: vec![Descender::new(expr)],
        }
    }

    /// Matches one level of `accessor`.
    ///
    /// # Errors
    ///
    /// Propagates failures from evaluating constraints.
    pub fn match_accessor(&self, accessor: &Accessor) -> CoreResult<MatchResult> {
        let mut result = MatchResult::default();

        for descender in &self.active {
            for expanded in descender.expand(accessor)? {
                let Some(head) = expanded.head() else {
                    push_unique(&mut result.delivery, Target::Current);
                    continue;
                };
                let rest = expanded.tail();
                let targets = select(head, accessor)?;
                if rest.is_exhausted() {
                    for target in targets {
                        push_unique(&mut result.delivery, target);
                    }
                    continue;
                }
                for target in targets {
                    let target = match target {
                        Target::Index(i) => match accessor.get().as_array() {
                            Some(items) => match resolve(i, items.len()) {
                                Some(resolved) => Target::Index(i64::try_from(resolved).unwrap_or(i)),
                                None => continue,
                            },
                            None => continue,
                        },
                        other => other,
                    };
                    match result.leads.iter_mut().find(|lead| lead.target == target) {
                        Some(lead) => {
                            if !lead.matcher.active.contains(&rest) {
                                lead.matcher.active.push(rest.clone());
                            }
                        }
                        None => result.leads.push(Lead {
                            target,
                            matcher: Matcher {
                                active: vec![rest.clone()],
                            },
                        }),
                    }
                }
            }
        }

        Ok(result)
    }
}

fn push_unique(targets: &mut Vec<Target>, target: Target) {
    if !targets.contains(&target) {
        targets.push(target);
    }
}

/// Resolves a selector step into targets at this level.
fn select(step: &Expr, accessor: &Accessor) -> CoreResult<Vec<Target>> {
    let value = accessor.get();
    let targets = match (step, value) {
        (Expr::Attribute(_), Value::Array(_)) => Vec::new(),
        (Expr::Attribute(name), _) => vec![Target::Attribute(name.clone())],
        (Expr::Index(i), Value::Array(_)) => vec![Target::Index(*i)],
        (Expr::Range(range), Value::Array(items)) => indices(range.indices(items.len())),
        (Expr::Wildcard, Value::Array(items)) => indices(0..items.len()),
        (Expr::Wildcard, Value::Object(object)) => object
            .keys()
            .map(|key| Target::Attribute(key.clone()))
            .collect(),
        (Expr::Constraint(constraint), Value::Array(items)) => {
            let mut selected = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if constraint_holds(constraint, item)? {
                    selected.push(i);
                }
            }
            indices(selected)
        }
        _ => Vec::new(),
    };
    Ok(targets)
}

fn indices(iter: impl IntoIterator<Item = usize>) -> Vec<Target> {
    iter.into_iter()
        .map(|i| Target::Index(i64::try_from(i).unwrap_or(i64::MAX)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use docsync_codec::from_json_str;

    fn matcher(text: &str) -> Matcher {
        Matcher::from_expr(&parse(text).unwrap())
    }

    #[test]
    fn attribute_delivery() {
        let root = Accessor::new(from_json_str(r#"{"a": 1}"#).unwrap());
        let result = matcher("a").match_accessor(&root).unwrap();
        assert!(result.leads.is_empty());
        assert_eq!(result.delivery, vec![Target::Attribute("a".into())]);
    }

    #[test]
    fn missing_attribute_still_delivered() {
        let root = Accessor::new(Value::empty_object());
        let result = matcher("b").match_accessor(&root).unwrap();
        assert_eq!(result.delivery, vec![Target::Attribute("b".into())]);
    }

    #[test]
    fn lead_then_delivery() {
        let root = Accessor::new(from_json_str(r#"{"a": {"b": 1}}"#).unwrap());
        let result = matcher("a.b").match_accessor(&root).unwrap();
        assert!(result.delivery.is_empty());
        assert_eq!(result.leads.len(), 1);
        assert_eq!(result.leads[0].target, Target::Attribute("a".into()));

        let child = root.get_attribute("a").unwrap().unwrap();
        let below = result.leads[0].matcher.match_accessor(&child).unwrap();
        assert_eq!(below.delivery, vec![Target::Attribute("b".into())]);
    }

    #[test]
    fn negative_index_delivered_raw() {
        let root = Accessor::new(Value::from(vec![1i64, 2, 3]));
        let result = matcher("[-1]").match_accessor(&root).unwrap();
        assert_eq!(result.delivery, vec![Target::Index(-1)]);
        assert_eq!(result.delivery[0].resolve_index(3), Some(2));
        assert_eq!(Target::Index(-1).resolve_index(0), None);
    }

    #[test]
    fn negative_index_lead_resolved() {
        let root = Accessor::new(from_json_str(r#"[{"a": 1}, {"a": 2}]"#).unwrap());
        let result = matcher("[-1].a").match_accessor(&root).unwrap();
        assert_eq!(result.leads[0].target, Target::Index(1));
    }

    #[test]
    fn union_leads_merge() {
        let root = Accessor::new(from_json_str(r#"{"a": {"b": 1, "c": 2}}"#).unwrap());
        let result = matcher("[a.b,a.c]").match_accessor(&root).unwrap();
        assert_eq!(result.leads.len(), 1);
        let child = root.get_attribute("a").unwrap().unwrap();
        let below = result.leads[0].matcher.match_accessor(&child).unwrap();
        assert_eq!(
            below.delivery,
            vec![Target::Attribute("b".into()), Target::Attribute("c".into())]
        );
    }

    #[test]
    fn constraint_selects_array_items() {
        let root = Accessor::new(from_json_str("[1, 5, 3, 7]").unwrap());
        let result = matcher("[@ > 3]").match_accessor(&root).unwrap();
        assert_eq!(result.delivery, vec![Target::Index(1), Target::Index(3)]);
    }

    #[test]
    fn shape_mismatch_matches_nothing() {
        let root = Accessor::new(Value::from("text"));
        assert!(matcher("[0]").match_accessor(&root).unwrap().is_empty());
        assert!(matcher("[*]").match_accessor(&root).unwrap().is_empty());
        let array = Accessor::new(Value::from(vec![1i64]));
        assert!(matcher("a").match_accessor(&array).unwrap().is_empty());
    }

    #[test]
    fn self_reference_delivers_current() {
        let root = Accessor::new(Value::Integer(1));
        let result = matcher("@").match_accessor(&root).unwrap();
        assert_eq!(result.delivery, vec![Target::Current]);
    }
}
