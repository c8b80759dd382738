//! Read-only evaluation of expressions.

use super::ast::Expr;
use super::matcher::{Matcher, Target};
use crate::accessor::{Accessor, PathSegment};
use crate::error::CoreResult;
use docsync_codec::Value;

/// A matched value and where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMatch {
    /// Path from the root. Array items carrying a string `_key` are
    /// addressed by [`PathSegment::Key`].
    pub path: Vec<PathSegment>,
    /// The matched value.
    pub value: Value,
}

/// Evaluates `expr` against `root`, returning every existing match with its path.
///
/// # Errors
///
/// Propagates failures from evaluating constraints.
pub fn extract_with_path(expr: &Expr, root: &Value) -> CoreResult<Vec<PathMatch>> {
    let mut found = Vec::new();
    collect(&Matcher::from_expr(expr), &Accessor::new(root.clone()), &mut found)?;
    Ok(found
        .into_iter()
        .map(|accessor| PathMatch {
            path: keyed_path(root, accessor.path()),
            value: accessor.into_value(),
        })
        .collect())
}

/// Evaluates `expr` against `root`, returning the matched values.
///
/// # Errors
///
/// Propagates failures from evaluating constraints.
pub fn extract(expr: &Expr, root: &Value) -> CoreResult<Vec<Value>> {
    let mut found = Vec::new();
    collect(&Matcher::from_expr(expr), &Accessor::new(root.clone()), &mut found)?;
    Ok(found.into_iter().map(Accessor::into_value).collect())
}

fn collect(matcher: &Matcher, accessor: &Accessor, found: &mut Vec<Accessor>) -> CoreResult<()> {
    let result = matcher.match_accessor(accessor)?;

    for target in &result.delivery {
        if let Some(child) = child_at(accessor, target)? {
            found.push(child);
        }
    }
    for lead in &result.leads {
        if let Some(child) = child_at(accessor, &lead.target)? {
            collect(&lead.matcher, &child, found)?;
        }
    }
    Ok(())
}

/// The existing child at a target, if any.
pub(crate) fn child_at(accessor: &Accessor, target: &Target) -> CoreResult<Option<Accessor>> {
    match target {
        Target::Current => Ok(Some(accessor.clone())),
        Target::Attribute(name) if accessor.has_attribute(name) => accessor.get_attribute(name),
        Target::Attribute(_) => Ok(None),
        Target::Index(_) => match accessor.get().as_array() {
            Some(items) => match target.resolve_index(items.len()) {
                Some(i) => accessor.get_index(i),
                None => Ok(None),
            },
            None => Ok(None),
        },
    }
}

/// Rewrites index segments that address `_key`ed objects as key segments.
pub fn keyed_path(root: &Value, path: &[PathSegment]) -> Vec<PathSegment> {
    let mut current = Some(root);
    path.iter()
        .map(|segment| {
            let parent = current;
            match segment {
                PathSegment::Index(i) => {
                    let item = parent.and_then(|value| value.get_index(*i));
                    current = item;
                    match item.and_then(Value::array_key) {
                        Some(key) => PathSegment::Key(key.to_string()),
                        None => segment.clone(),
                    }
                }
                PathSegment::Attribute(name) => {
                    current = parent.and_then(|value| value.get(name));
                    segment.clone()
                }
                PathSegment::Key(key) => {
                    current = parent.and_then(|value| {
                        value
                            .as_array()?
                            .iter()
                            .find(|item| item.array_key() == Some(key.as_str()))
                    });
                    segment.clone()
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use docsync_codec::from_json_str;

    fn values(text: &str, doc: &str) -> Vec<Value> {
        extract(&parse(text).unwrap(), &from_json_str(doc).unwrap()).unwrap()
    }

    fn ints(items: &[i64]) -> Vec<Value> {
        items.iter().map(|&n| Value::Integer(n)).collect()
    }

    #[test]
    fn slice_with_maximal_step() {
        assert_eq!(values("a[1::9223372036854775807]", r#"{"a": [1, 2, 3]}"#), ints(&[2]));
    }

    #[test]
    fn keyed_constraint_match() {
        let doc = from_json_str(r#"{"a": [{"_key": "x", "b": 1}, {"_key": "y", "b": 2}]}"#).unwrap();
        let matches = extract_with_path(&parse(r#"a[_key=="x"].b"#).unwrap(), &doc).unwrap();
        assert_eq!(
            matches,
            vec![PathMatch {
                path: vec![
                    PathSegment::Attribute("a".into()),
                    PathSegment::Key("x".into()),
                    PathSegment::Attribute("b".into()),
                ],
                value: Value::Integer(1),
            }]
        );
    }

    #[test]
    fn unkeyed_items_keep_indices() {
        let doc = from_json_str(r#"{"a": [10, 20, 30]}"#).unwrap();
        let matches = extract_with_path(&parse("a[-1]").unwrap(), &doc).unwrap();
        assert_eq!(
            matches[0].path,
            vec![PathSegment::Attribute("a".into()), PathSegment::Index(2)]
        );
    }

    #[test]
    fn slices_and_unions() {
        assert_eq!(values("a[1:3]", r#"{"a": [0, 1, 2, 3]}"#), ints(&[1, 2]));
        assert_eq!(values("a[::2]", r#"{"a": [0, 1, 2, 3]}"#), ints(&[0, 2]));
        assert_eq!(values("a[1,3]", r#"{"a": [0, 1, 2, 3]}"#), ints(&[1, 3]));
        assert_eq!(values("[x,y]", r#"{"x": 1, "y": 2, "z": 3}"#), ints(&[1, 2]));
        assert_eq!(values("a[*]", r#"{"a": [4, 5]}"#), ints(&[4, 5]));
    }

    #[test]
    fn recursive_descent_finds_every_depth() {
        let found = values("..n", r#"{"n": 1, "a": {"n": 2, "b": [{"n": 3}]}}"#);
        let mut found: Vec<i64> = found.iter().filter_map(Value::as_integer).collect();
        found.sort_unstable();
        assert_eq!(found, vec![1, 2, 3]);
    }

    #[test]
    fn comparison_constraints() {
        assert_eq!(values("a[@ > 2]", r#"{"a": [1, 2, 3, 4]}"#), ints(&[3, 4]));
        assert_eq!(values("a[@ <= 2]", r#"{"a": [1, 2, 3, 4]}"#), ints(&[1, 2]));
        assert_eq!(
            values("a[n != null].n", r#"{"a": [{"n": 1}, {"m": 2}, {"n": 3}]}"#),
            ints(&[1, 3])
        );
        assert_eq!(
            values("a[s == 'x'].v", r#"{"a": [{"s": "x", "v": 1}, {"s": "y", "v": 2}]}"#),
            ints(&[1])
        );
    }

    #[test]
    fn mismatched_shapes_yield_nothing() {
        assert!(values("a[0]", r#"{"a": {"0": 1}}"#).is_empty());
        assert!(values("a.b", r#"{"a": [1]}"#).is_empty());
        assert!(values(r#"a[_key=="x"]"#, r#"{"a": 5}"#).is_empty());
        assert!(values("missing", "{}").is_empty());
    }

    #[test]
    fn root_and_self_aliases() {
        assert_eq!(values("$.a", r#"{"a": 1}"#), ints(&[1]));
        assert_eq!(values("@", "7"), ints(&[7]));
    }
}
