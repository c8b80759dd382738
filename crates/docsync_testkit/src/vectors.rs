//! Shared test vectors.
//!
//! Vectors are plain data so they can be exported as JSON and replayed by
//! other implementations of the same wire contract.

use serde::{Deserialize, Serialize};

/// A path expression evaluated against a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Path expression text.
    pub expression: String,
    /// Document JSON.
    pub document: String,
    /// Expected matches as canonical path and value JSON.
    pub expected: Vec<(String, String)>,
}

/// A patch applied to a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Document JSON.
    pub document: String,
    /// Patch JSON in wire form.
    pub patch: String,
    /// Expected document JSON, or `None` if the patch must fail.
    pub expected: Option<String>,
}

/// A text pair for diff-match-patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Original text.
    pub from: String,
    /// Edited text.
    pub to: String,
}

fn path_vector(id: &str, description: &str, expression: &str, document: &str, expected: &[(&str, &str)]) -> PathVector {
    PathVector {
        id: id.into(),
        description: description.into(),
        expression: expression.into(),
        document: document.into(),
        expected: expected
            .iter()
            .map(|(path, value)| ((*path).to_string(), (*value).to_string()))
            .collect(),
    }
}

/// Path matching vectors.
pub fn path_vectors() -> Vec<PathVector> {
    vec![
        path_vector(
            "path_keyed",
            "keyed array item then attribute",
            r#"a[_key=="x"].b"#,
            r#"{"a": [{"_key": "x", "b": 1}, {"_key": "y", "b": 2}]}"#,
            &[(r#"a[_key == "x"].b"#, "1")],
        ),
        path_vector(
            "path_index",
            "positive index",
            "items[1]",
            r#"{"items": [10, 20, 30]}"#,
            &[("items[1]", "20")],
        ),
        path_vector(
            "path_negative_index",
            "negative index resolves against the length",
            "items[-1]",
            r#"{"items": [10, 20, 30]}"#,
            &[("items[2]", "30")],
        ),
        path_vector(
            "path_slice",
            "half-open slice",
            "items[0:2]",
            r#"{"items": [10, 20, 30]}"#,
            &[("items[0]", "10"), ("items[1]", "20")],
        ),
        path_vector(
            "path_filter",
            "comparison filter on array elements",
            "n[@ > 1]",
            r#"{"n": [1, 2, 3]}"#,
            &[("n[1]", "2"), ("n[2]", "3")],
        ),
        path_vector(
            "path_missing",
            "missing attribute has no match",
            "a.b",
            r#"{"a": {}}"#,
            &[],
        ),
        path_vector(
            "path_shape_mismatch",
            "index into an object has no match",
            "a[0]",
            r#"{"a": {"0": 1}}"#,
            &[],
        ),
    ]
}

fn patch_vector(id: &str, description: &str, document: &str, patch: &str, expected: Option<&str>) -> PatchVector {
    PatchVector {
        id: id.into(),
        description: description.into(),
        document: document.into(),
        patch: patch.into(),
        expected: expected.map(str::to_string),
    }
}

/// Patch application vectors.
pub fn patch_vectors() -> Vec<PatchVector> {
    vec![
        patch_vector(
            "patch_set_nested",
            "set creates missing intermediate objects",
            r#"{"_id": "d"}"#,
            r#"{"id": "d", "set": {"a.b": 1}}"#,
            Some(r#"{"_id": "d", "a": {"b": 1}}"#),
        ),
        patch_vector(
            "patch_set_if_missing",
            "setIfMissing keeps present values",
            r#"{"_id": "d", "a": 1}"#,
            r#"{"id": "d", "setIfMissing": {"a": 2, "b": 3}}"#,
            Some(r#"{"_id": "d", "a": 1, "b": 3}"#),
        ),
        patch_vector(
            "patch_unset_keyed",
            "unset a keyed array item",
            r#"{"_id": "d", "l": [{"_key": "x"}, {"_key": "y"}]}"#,
            r#"{"id": "d", "unset": ["l[_key==\"x\"]"]}"#,
            Some(r#"{"_id": "d", "l": [{"_key": "y"}]}"#),
        ),
        patch_vector(
            "patch_inc_skips_text",
            "inc leaves non-numeric values alone",
            r#"{"_id": "d", "n": 1, "s": "x"}"#,
            r#"{"id": "d", "inc": {"n": 2, "s": 1}}"#,
            Some(r#"{"_id": "d", "n": 3, "s": "x"}"#),
        ),
        patch_vector(
            "patch_insert_after",
            "insert after the last item",
            r#"{"_id": "d", "l": [1, 2]}"#,
            r#"{"id": "d", "insert": {"after": "l[-1]", "items": [3]}}"#,
            Some(r#"{"_id": "d", "l": [1, 2, 3]}"#),
        ),
        patch_vector(
            "patch_insert_replace",
            "replace removes the selection and inserts at its start",
            r#"{"_id": "d", "l": [1, 2, 3]}"#,
            r#"{"id": "d", "insert": {"replace": "l[0:2]", "items": [9]}}"#,
            Some(r#"{"_id": "d", "l": [9, 3]}"#),
        ),
        patch_vector(
            "patch_unset_primitive",
            "unset below a primitive is a precondition failure",
            r#"{"_id": "d", "a": 1}"#,
            r#"{"id": "d", "unset": ["a.b"]}"#,
            None,
        ),
    ]
}

/// Text pairs for diff-match-patch.
pub fn text_vectors() -> Vec<TextVector> {
    let pairs = [
        ("text_empty_to_text", "", "hello"),
        ("text_to_empty", "hello", ""),
        ("text_insert", "The quick fox", "The quick brown fox"),
        ("text_replace", "The quick brown fox jumps over the lazy dog", "That quick brown fox jumped over a lazy dog"),
        ("text_unicode", "naïve café", "naïve café 🙂 漢字"),
        ("text_identical", "same", "same"),
        ("text_escapes", "a%b c\nd", "a%b  c\n\nd+"),
    ];
    pairs
        .iter()
        .map(|(id, from, to)| TextVector {
            id: (*id).to_string(),
            from: (*from).to_string(),
            to: (*to).to_string(),
        })
        .collect()
}

/// Generate all vectors as JSON.
pub fn all_vectors_json() -> String {
    let vectors = AllTestVectors {
        path: path_vectors(),
        patch: patch_vectors(),
        text: text_vectors(),
    };
    serde_json::to_string_pretty(&vectors).expect("Failed to serialize vectors")
}

#[derive(Debug, Serialize, Deserialize)]
struct AllTestVectors {
    path: Vec<PathVector>,
    patch: Vec<PatchVector>,
    text: Vec<TextVector>,
}
