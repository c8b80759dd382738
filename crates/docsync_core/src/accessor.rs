//! Path-addressable, immutable view over a document value.
//!
//! Every mutator returns a new [`Accessor`] wrapping a structurally updated
//! copy. Untouched subtrees stay shared with the original, and writing back a
//! value that is the same value returns the accessor unchanged.

use crate::error::{CoreError, CoreResult};
use docsync_codec::Value;
use std::fmt;
use std::sync::Arc;

/// One step of a concrete path from a document root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// Object attribute.
    Attribute(String),
    /// Array position.
    Index(usize),
    /// Array item addressed by its `_key`.
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(name) => write!(f, "{name}"),
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Key(key) => write!(f, "[_key=={key:?}]"),
        }
    }
}

/// Structural kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    /// An array.
    Array,
    /// An object.
    Object,
    /// Anything else, including null.
    Primitive,
}

impl ContainerType {
    /// Classifies a value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            _ => Self::Primitive,
        }
    }
}

/// A value together with the path that reached it from the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    value: Value,
    path: Vec<PathSegment>,
}

impl Accessor {
    /// Creates a root accessor.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            path: Vec::new(),
        }
    }

    /// Creates an accessor at the given path.
    pub fn with_path(value: Value, path: Vec<PathSegment>) -> Self {
        Self { value, path }
    }

    /// Kind of the wrapped value.
    pub fn container_type(&self) -> ContainerType {
        ContainerType::of(&self.value)
    }

    /// The wrapped value.
    pub fn get(&self) -> &Value {
        &self.value
    }

    /// Consumes the accessor, returning the wrapped value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Path from the root to this accessor.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Number of array items.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an array.
    pub fn length(&self) -> CoreResult<usize> {
        self.items().map(|items| items.len())
    }

    /// Child accessor for an array item, or `None` when out of range.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an array.
    pub fn get_index(&self, index: usize) -> CoreResult<Option<Accessor>> {
        Ok(self
            .items()?
            .get(index)
            .map(|item| self.child(PathSegment::Index(index), item.clone())))
    }

    /// Returns true if the value is an object with the attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.value
            .as_object()
            .is_some_and(|object| object.contains_key(name))
    }

    /// Attribute names of an object value, sorted. Empty for other values.
    pub fn attribute_keys(&self) -> Vec<String> {
        self.value
            .as_object()
            .map(|object| object.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Child accessor for an attribute, or `None` when it is absent.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an object.
    pub fn get_attribute(&self, name: &str) -> CoreResult<Option<Accessor>> {
        Ok(self
            .attributes()?
            .get(name)
            .map(|value| self.child(PathSegment::Attribute(name.to_string()), value.clone())))
    }

    /// Replaces the whole value.
    ///
    /// Returns `self` unchanged when `value` is the same value.
    #[must_use]
    pub fn set(&self, value: Value) -> Accessor {
        if self.value.same(&value) {
            return self.clone();
        }
        Self::with_path(value, self.path.clone())
    }

    /// Replaces an array item.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an array or the index is out of range.
    pub fn set_index(&self, index: usize, value: Value) -> CoreResult<Accessor> {
        let items = self.items()?;
        let current = items.get(index).ok_or_else(|| {
            CoreError::precondition(format!(
                "index {index} out of range for array of length {}",
                items.len()
            ))
        })?;
        if current.same(&value) {
            return Ok(self.clone());
        }
        let mut items = items.to_vec();
        items[index] = value;
        Ok(self.set(Value::array(items)))
    }

    /// Writes back a child accessor obtained from [`Accessor::get_index`].
    ///
    /// # Errors
    ///
    /// Fails if the value is not an array or the index is out of range.
    pub fn set_index_accessor(&self, index: usize, child: Accessor) -> CoreResult<Accessor> {
        self.set_index(index, child.into_value())
    }

    /// Removes array items. Duplicate and out-of-range indices are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an array.
    pub fn unset_indices(&self, indices: &[usize]) -> CoreResult<Accessor> {
        let items = self.items()?;
        if !indices.iter().any(|&i| i < items.len()) {
            return Ok(self.clone());
        }
        let kept = items
            .iter()
            .enumerate()
            .filter(|(i, _)| !indices.contains(i))
            .map(|(_, item)| item.clone())
            .collect();
        Ok(self.set(Value::array(kept)))
    }

    /// Inserts items before `position`, clamped to the array length.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an array.
    pub fn insert_items_at(&self, position: usize, new_items: Vec<Value>) -> CoreResult<Accessor> {
        let items = self.items()?;
        if new_items.is_empty() {
            return Ok(self.clone());
        }
        let position = position.min(items.len());
        let mut items = items.to_vec();
        items.splice(position..position, new_items);
        Ok(self.set(Value::array(items)))
    }

    /// Sets an attribute of an object value.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an object.
    pub fn set_attribute(&self, name: &str, value: Value) -> CoreResult<Accessor> {
        let object = self.attributes()?;
        if object.get(name).is_some_and(|current| current.same(&value)) {
            return Ok(self.clone());
        }
        Ok(self.set(self.value.with_attribute(name, value)))
    }

    /// Writes back a child accessor obtained from [`Accessor::get_attribute`].
    ///
    /// # Errors
    ///
    /// Fails if the value is not an object.
    pub fn set_attribute_accessor(&self, name: &str, child: Accessor) -> CoreResult<Accessor> {
        self.set_attribute(name, child.into_value())
    }

    /// Removes an attribute of an object value.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an object.
    pub fn unset_attribute(&self, name: &str) -> CoreResult<Accessor> {
        if !self.attributes()?.contains_key(name) {
            return Ok(self.clone());
        }
        Ok(self.set(self.value.without_attribute(name)))
    }

    fn child(&self, segment: PathSegment, value: Value) -> Accessor {
        let mut path = self.path.clone();
        path.push(segment);
        Self::with_path(value, path)
    }

    fn items(&self) -> CoreResult<&Arc<Vec<Value>>> {
        match &self.value {
            Value::Array(items) => Ok(items),
            other => Err(CoreError::precondition(format!(
                "expected an array at {}, found {}",
                render_path(&self.path),
                other.type_name()
            ))),
        }
    }

    fn attributes(&self) -> CoreResult<&Arc<docsync_codec::Object>> {
        match &self.value {
            Value::Object(object) => Ok(object),
            other => Err(CoreError::precondition(format!(
                "expected an object at {}, found {}",
                render_path(&self.path),
                other.type_name()
            ))),
        }
    }
}

fn render_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        crate::path::to_path_string(path)
    }
}
