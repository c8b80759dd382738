//! JSON decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde::de::DeserializeOwned;

/// Decode a value from JSON text.
///
/// # Errors
///
/// Returns an error with the line and column of malformed input.
pub fn from_json_str(text: &str) -> CodecResult<Value> {
    Ok(serde_json::from_str(text)?)
}

/// Decode a value from JSON bytes.
///
/// # Errors
///
/// Returns an error with the line and column of malformed input.
pub fn from_json_slice(bytes: &[u8]) -> CodecResult<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Decode every newline-separated value written by a [`crate::CanonicalEncoder`].
///
/// Blank lines are skipped.
pub fn from_json_lines(text: &str) -> CodecResult<Vec<Value>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(from_json_str)
        .collect()
}

/// Convert a [`Value`] into a typed structure.
///
/// # Errors
///
/// Returns [`CodecError::InvalidStructure`] if the value has the wrong shape.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> CodecResult<T> {
    serde_json::from_value(serde_json::Value::from(value))
        .map_err(|e| CodecError::invalid_structure(e.to_string()))
}

/// Convert a typed structure into a [`Value`].
///
/// # Errors
///
/// Returns an error if the structure cannot be represented as JSON.
pub fn to_value<T: serde::Serialize>(item: &T) -> CodecResult<Value> {
    serde_json::to_value(item)
        .map(Value::from)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{to_canonical_json, CanonicalEncoder};

    #[test]
    fn decode_document() {
        let value = from_json_str(r#"{"_id": "a", "n": 1, "tags": ["x", "y"]}"#).unwrap();
        assert_eq!(value.document_id(), Some("a"));
        assert_eq!(value.get("n"), Some(&Value::Integer(1)));
        assert_eq!(value.get("tags").and_then(Value::as_array).map(<[_]>::len), Some(2));
    }

    #[test]
    fn decode_error_has_position() {
        match from_json_str("{\n  \"a\": }") {
            Err(CodecError::DecodingFailed { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn canonical_text_decodes_to_equal_value() {
        let text = r#"{"z":{"b":[1,2.5,"s"],"a":null},"a":false}"#;
        let value = from_json_str(text).unwrap();
        let canonical = to_canonical_json(&value).unwrap();
        assert_eq!(canonical, r#"{"a":false,"z":{"a":null,"b":[1,2.5,"s"]}}"#);
        assert_eq!(from_json_str(&canonical).unwrap(), value);
    }

    #[test]
    fn json_lines() {
        let mut encoder = CanonicalEncoder::new();
        encoder.encode(&Value::Integer(1)).unwrap();
        encoder.encode(&Value::Null).unwrap();
        let text = encoder.into_string().unwrap();
        let values = from_json_lines(&format!("{text}\n\n")).unwrap();
        assert_eq!(values, vec![Value::Integer(1), Value::Null]);
    }

    #[test]
    fn typed_conversion() {
        #[derive(serde::Deserialize, serde::Serialize, Debug, PartialEq)]
        struct Pair {
            left: i64,
            right: String,
        }

        let value = from_json_str(r#"{"left": 1, "right": "r"}"#).unwrap();
        let pair: Pair = from_value(&value).unwrap();
        assert_eq!(
            pair,
            Pair {
                left: 1,
                right: "r".into()
            }
        );
        assert_eq!(to_value(&pair).unwrap(), value);
        assert!(from_value::<Pair>(&Value::Integer(1)).is_err());
    }
}
