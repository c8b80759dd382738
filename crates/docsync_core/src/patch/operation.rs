//! Patch operations applied to the targets delivered by a matcher.

use docsync_codec::Value;

use crate::accessor::{Accessor, ContainerType};
use crate::dmp::{apply_patches, Patch};
use crate::error::{CoreError, CoreResult};
use crate::path::{resolve, Target};

/// Where an `insert` places its items relative to the selected positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// Before the first selected item.
    Before,
    /// After the last selected item.
    After,
    /// In place of the selected items.
    Replace,
}

/// A single compiled patch operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Overwrite the target.
    Set(Value),
    /// Write the attribute only if it is absent.
    SetIfMissing(Value),
    /// Remove the target.
    Unset,
    /// Add to a numeric target.
    Inc(Value),
    /// Subtract from a numeric target.
    Dec(Value),
    /// Insert items into an array.
    Insert {
        /// Placement relative to the selected items.
        position: InsertPosition,
        /// Items to insert.
        items: Vec<Value>,
    },
    /// Apply text patches to a string target.
    DiffMatchPatch(Vec<Patch>),
}

impl Operation {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Set(_) => "set",
            Operation::SetIfMissing(_) => "setIfMissing",
            Operation::Unset => "unset",
            Operation::Inc(_) => "inc",
            Operation::Dec(_) => "dec",
            Operation::Insert { .. } => "insert",
            Operation::DiffMatchPatch(_) => "diffMatchPatch",
        }
    }

    /// Returns true if following the path creates missing attributes.
    pub fn creates_missing(&self) -> bool {
        matches!(self, Operation::Set(_) | Operation::SetIfMissing(_))
    }

    /// Applies the operation to `targets`, positions relative to `accessor`.
    ///
    /// # Errors
    ///
    /// Fails on precondition violations: `unset` on a primitive, `insert`
    /// into a non-array, `diffMatchPatch` on a non-string.
    pub fn apply(&self, targets: &[Target], accessor: Accessor) -> CoreResult<Accessor> {
        match self {
            Operation::Set(value) => set(targets, accessor, value),
            Operation::SetIfMissing(value) => set_if_missing(targets, accessor, value),
            Operation::Unset => unset(targets, accessor),
            Operation::Inc(delta) => add(targets, accessor, delta, false),
            Operation::Dec(delta) => add(targets, accessor, delta, true),
            Operation::Insert { position, items } => insert(targets, accessor, *position, items),
            Operation::DiffMatchPatch(patches) => diff_match_patch(targets, accessor, patches),
        }
    }
}

fn index_of(target: &Target, accessor: &Accessor) -> Option<usize> {
    accessor
        .get()
        .as_array()
        .and_then(|items| target.resolve_index(items.len()))
}

fn set(targets: &[Target], mut accessor: Accessor, value: &Value) -> CoreResult<Accessor> {
    for target in targets {
        accessor = match target {
            Target::Current => accessor.set(value.clone()),
            Target::Index(_) => match index_of(target, &accessor) {
                Some(i) => accessor.set_index(i, value.clone())?,
                None => accessor,
            },
            Target::Attribute(name) => match accessor.container_type() {
                ContainerType::Primitive => {
                    accessor.set(Value::object([(name.clone(), value.clone())]))
                }
                ContainerType::Object => accessor.set_attribute(name, value.clone())?,
                ContainerType::Array => accessor,
            },
        };
    }
    Ok(accessor)
}

fn set_if_missing(targets: &[Target], mut accessor: Accessor, value: &Value) -> CoreResult<Accessor> {
    for target in targets {
        // Arrays never receive placeholder items.
        let Target::Attribute(name) = target else {
            continue;
        };
        accessor = match accessor.container_type() {
            ContainerType::Primitive => accessor.set(Value::object([(name.clone(), value.clone())])),
            ContainerType::Object if !accessor.has_attribute(name) => {
                accessor.set_attribute(name, value.clone())?
            }
            _ => accessor,
        };
    }
    Ok(accessor)
}

fn unset(targets: &[Target], accessor: Accessor) -> CoreResult<Accessor> {
    match accessor.container_type() {
        ContainerType::Array => {
            let indices: Vec<usize> = targets
                .iter()
                .filter_map(|target| index_of(target, &accessor))
                .collect();
            accessor.unset_indices(&indices)
        }
        ContainerType::Object => {
            let mut accessor = accessor;
            for target in targets {
                if let Target::Attribute(name) = target {
                    accessor = accessor.unset_attribute(name)?;
                }
            }
            Ok(accessor)
        }
        ContainerType::Primitive => Err(CoreError::precondition(format!(
            "cannot unset inside {} value",
            accessor.get().type_name()
        ))),
    }
}

fn add(targets: &[Target], mut accessor: Accessor, delta: &Value, negate: bool) -> CoreResult<Accessor> {
    for target in targets {
        accessor = match target {
            Target::Current => match sum(accessor.get(), delta, negate) {
                Some(next) => accessor.set(next),
                None => accessor,
            },
            Target::Index(_) => {
                let Some(i) = index_of(target, &accessor) else {
                    continue;
                };
                let next = accessor
                    .get()
                    .get_index(i)
                    .and_then(|current| sum(current, delta, negate));
                match next {
                    Some(next) => accessor.set_index(i, next)?,
                    None => accessor,
                }
            }
            Target::Attribute(name) => {
                let next = accessor
                    .get()
                    .as_object()
                    .and_then(|object| object.get(name))
                    .and_then(|current| sum(current, delta, negate));
                match next {
                    Some(next) => accessor.set_attribute(name, next)?,
                    None => accessor,
                }
            }
        };
    }
    Ok(accessor)
}

/// Numeric sum, staying integral while both sides are integers and the
/// result fits. Non-numeric values yield `None`.
fn sum(current: &Value, delta: &Value, negate: bool) -> Option<Value> {
    if let (Value::Integer(a), Value::Integer(b)) = (current, delta) {
        let result = if negate { a.checked_sub(*b) } else { a.checked_add(*b) };
        if let Some(result) = result {
            return Some(Value::Integer(result));
        }
    }
    let a = current.as_f64()?;
    let b = delta.as_f64()?;
    Some(Value::Float(if negate { a - b } else { a + b }))
}

fn insert(
    targets: &[Target],
    accessor: Accessor,
    position: InsertPosition,
    items: &[Value],
) -> CoreResult<Accessor> {
    let len = match accessor.get().as_array() {
        Some(existing) => existing.len(),
        None => {
            return Err(CoreError::precondition(format!(
                "cannot insert into {} value",
                accessor.get().type_name()
            )))
        }
    };
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    // Negative indices count from the end but are not range checked, so
    // `after: "items[-1]"` on an empty array lands at 0.
    let raw: Vec<i64> = targets
        .iter()
        .filter_map(|target| match target {
            Target::Index(i) if *i < 0 => Some(len_i + i),
            Target::Index(i) => Some(*i),
            _ => None,
        })
        .collect();
    let clamp = |at: i64| usize::try_from(at.clamp(0, len_i)).unwrap_or(len);

    match position {
        InsertPosition::Before => {
            let at = raw.iter().copied().min().unwrap_or(0);
            accessor.insert_items_at(clamp(at), items.to_vec())
        }
        InsertPosition::After => {
            let at = raw.iter().copied().max().unwrap_or(-1).max(-1).saturating_add(1);
            accessor.insert_items_at(clamp(at), items.to_vec())
        }
        InsertPosition::Replace => {
            let doomed: Vec<usize> = targets
                .iter()
                .filter_map(|target| match target {
                    Target::Index(i) => resolve(*i, len),
                    _ => None,
                })
                .collect();
            let at = raw.iter().copied().min().unwrap_or(0);
            accessor
                .unset_indices(&doomed)?
                .insert_items_at(clamp(at), items.to_vec())
        }
    }
}

fn diff_match_patch(targets: &[Target], mut accessor: Accessor, patches: &[Patch]) -> CoreResult<Accessor> {
    for target in targets {
        let current = match target {
            Target::Current => Some(accessor.get().clone()),
            Target::Index(_) => index_of(target, &accessor)
                .and_then(|i| accessor.get().get_index(i).cloned()),
            Target::Attribute(name) => accessor
                .get()
                .as_object()
                .and_then(|object| object.get(name).cloned()),
        };
        let Some(current) = current else {
            continue;
        };
        let Some(text) = current.as_text() else {
            return Err(CoreError::precondition(format!(
                "cannot apply diffMatchPatch to {} value",
                current.type_name()
            )));
        };
        let (next, applied) = apply_patches(patches, text);
        if applied.iter().any(|ok| !ok) {
            tracing::debug!(
                hunks = applied.len(),
                rejected = applied.iter().filter(|ok| !**ok).count(),
                "diffMatchPatch applied partially"
            );
        }
        let next = Value::from(next);
        accessor = match target {
            Target::Current => accessor.set(next),
            Target::Index(_) => match index_of(target, &accessor) {
                Some(i) => accessor.set_index(i, next)?,
                None => accessor,
            },
            Target::Attribute(name) => accessor.set_attribute(name, next)?,
        };
    }
    Ok(accessor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dmp::make_patches;
    use docsync_codec::from_json_str;

    fn acc(json: &str) -> Accessor {
        Accessor::new(from_json_str(json).unwrap())
    }

    fn json(json: &str) -> Value {
        from_json_str(json).unwrap()
    }

    fn attr(name: &str) -> Target {
        Target::Attribute(name.to_string())
    }

    #[test]
    fn set_targets() {
        let result = Operation::Set(json("2"))
            .apply(&[attr("a"), attr("b")], acc(r#"{"a": 1}"#))
            .unwrap();
        assert_eq!(result.get(), &json(r#"{"a": 2, "b": 2}"#));

        let result = Operation::Set(json("9"))
            .apply(&[Target::Index(-1), Target::Index(7)], acc("[1, 2, 3]"))
            .unwrap();
        assert_eq!(result.get(), &json("[1, 2, 9]"));

        let result = Operation::Set(json("1")).apply(&[attr("x")], acc("\"text\"")).unwrap();
        assert_eq!(result.get(), &json(r#"{"x": 1}"#));

        let result = Operation::Set(json("1")).apply(&[Target::Current], acc("5")).unwrap();
        assert_eq!(result.get(), &json("1"));
    }

    #[test]
    fn set_if_missing_only_fills_absent_attributes() {
        let result = Operation::SetIfMissing(json("0"))
            .apply(&[attr("a"), attr("b")], acc(r#"{"a": 1}"#))
            .unwrap();
        assert_eq!(result.get(), &json(r#"{"a": 1, "b": 0}"#));

        let result = Operation::SetIfMissing(json("0"))
            .apply(&[Target::Index(0)], acc("[null]"))
            .unwrap();
        assert_eq!(result.get(), &json("[null]"));
    }

    #[test]
    fn unset_attributes_and_indices() {
        let result = Operation::Unset
            .apply(&[attr("a"), attr("missing")], acc(r#"{"a": 1, "b": 2}"#))
            .unwrap();
        assert_eq!(result.get(), &json(r#"{"b": 2}"#));

        let result = Operation::Unset
            .apply(&[Target::Index(0), Target::Index(-1)], acc("[1, 2, 3]"))
            .unwrap();
        assert_eq!(result.get(), &json("[2]"));

        let err = Operation::Unset.apply(&[attr("a")], acc("5")).unwrap_err();
        assert!(matches!(err, CoreError::Precondition { .. }));
    }

    #[test]
    fn inc_and_dec_skip_non_numbers() {
        let doc = r#"{"n": 1, "f": 1.5, "s": "x"}"#;
        let result = Operation::Inc(json("2"))
            .apply(&[attr("n"), attr("f"), attr("s"), attr("missing")], acc(doc))
            .unwrap();
        assert_eq!(result.get(), &json(r#"{"n": 3, "f": 3.5, "s": "x"}"#));

        let result = Operation::Dec(json("1")).apply(&[Target::Index(1)], acc("[1, 5]")).unwrap();
        assert_eq!(result.get(), &json("[1, 4]"));
    }

    #[test]
    fn inc_overflow_falls_back_to_float() {
        let result = Operation::Inc(json("1"))
            .apply(&[Target::Current], Accessor::new(Value::Integer(i64::MAX)))
            .unwrap();
        assert!(matches!(result.get(), Value::Float(_)));
    }

    #[test]
    fn insert_positions() {
        let items = vec![json("\"!\"")];
        let before = Operation::Insert { position: InsertPosition::Before, items: items.clone() };
        let after = Operation::Insert { position: InsertPosition::After, items: items.clone() };
        let replace = Operation::Insert { position: InsertPosition::Replace, items };

        let abc = r#"["a", "b", "c"]"#;
        assert_eq!(
            before.apply(&[Target::Index(1)], acc(abc)).unwrap().get(),
            &json(r#"["a", "!", "b", "c"]"#)
        );
        assert_eq!(
            after.apply(&[Target::Index(1)], acc(abc)).unwrap().get(),
            &json(r#"["a", "b", "!", "c"]"#)
        );
        assert_eq!(
            after.apply(&[Target::Index(-1)], acc(abc)).unwrap().get(),
            &json(r#"["a", "b", "c", "!"]"#)
        );
        assert_eq!(
            replace
                .apply(&[Target::Index(1), Target::Index(2)], acc(abc))
                .unwrap()
                .get(),
            &json(r#"["a", "!"]"#)
        );
        assert_eq!(
            after.apply(&[Target::Index(-1)], acc("[]")).unwrap().get(),
            &json(r#"["!"]"#)
        );
        assert!(before.apply(&[attr("a")], acc("{}")).is_err());
    }

    #[test]
    fn insert_after_maximal_index_appends() {
        let after = Operation::Insert {
            position: InsertPosition::After,
            items: vec![json("3")],
        };
        assert_eq!(
            after.apply(&[Target::Index(i64::MAX)], acc("[1, 2]")).unwrap().get(),
            &json("[1, 2, 3]")
        );
    }

    #[test]
    fn diff_match_patch_on_strings() {
        let patches = make_patches("hello world", "hello there world");
        let op = Operation::DiffMatchPatch(patches);
        let result = op.apply(&[attr("t")], acc(r#"{"t": "hello world"}"#)).unwrap();
        assert_eq!(result.get(), &json(r#"{"t": "hello there world"}"#));

        let unchanged = op.apply(&[attr("missing")], acc(r#"{"t": "x"}"#)).unwrap();
        assert_eq!(unchanged.get(), &json(r#"{"t": "x"}"#));

        let err = op.apply(&[attr("n")], acc(r#"{"n": 1}"#)).unwrap_err();
        assert!(matches!(err, CoreError::Precondition { .. }));
    }
}
