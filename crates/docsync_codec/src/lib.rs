//! # docsync Codec
//!
//! JSON document values and their canonical encoding.
//!
//! Documents are trees of [`Value`]s. Arrays and objects keep their children
//! behind reference-counted pointers, so cloning a document is cheap and
//! successive snapshots produced by immutable edits share every untouched
//! subtree.
//!
//! ## Canonical JSON Rules
//!
//! - Object keys are sorted bytewise
//! - No insignificant whitespace
//! - Numbers that fit an `i64` are written without a fraction
//! - No NaN or infinite values
//!
//! ## Usage
//!
//! ```
//! use docsync_codec::{from_json_str, to_canonical_json, Value};
//!
//! let value = from_json_str(r#"{"b": 1, "a": [true, null]}"#).unwrap();
//! let text = to_canonical_json(&value).unwrap();
//! assert_eq!(text, r#"{"a":[true,null],"b":1}"#);
//! assert_eq!(from_json_str(&text).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_json_lines, from_json_slice, from_json_str, from_value, to_value};
pub use encoder::{to_canonical_json, to_json_pretty, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::{Object, Value};

/// Trait for types that can be encoded to canonical JSON.
pub trait Encode {
    /// Encode this value to canonical JSON text.
    fn encode(&self) -> CodecResult<String>;
}

/// Trait for types that can be decoded from JSON.
pub trait Decode: Sized {
    /// Decode this value from JSON text.
    fn decode(text: &str) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<String> {
        to_canonical_json(self)
    }
}

impl Decode for Value {
    fn decode(text: &str) -> CodecResult<Self> {
        from_json_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_nested_document() {
        let value = Value::object([
            (
                "authors",
                Value::array(vec![
                    Value::object([("_key", Value::from("a1")), ("name", Value::from("Alice"))]),
                    Value::object([("_key", Value::from("b2")), ("name", Value::from("Bob"))]),
                ]),
            ),
            ("count", Value::Integer(2)),
        ]);
        let text = value.encode().unwrap();
        assert_eq!(Value::decode(&text).unwrap(), value);
    }

    #[test]
    fn display_uses_canonical_form() {
        let value = Value::object([("x", Value::Integer(1))]);
        assert_eq!(value.to_string(), r#"{"x":1}"#);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn text_survives_encoding(s in ".*") {
                let value = Value::from(s.as_str());
                let text = value.encode().unwrap();
                prop_assert_eq!(Value::decode(&text).unwrap(), value);
            }

            #[test]
            fn integers_survive_encoding(n in any::<i64>()) {
                let text = Value::Integer(n).encode().unwrap();
                prop_assert_eq!(Value::decode(&text).unwrap(), Value::Integer(n));
            }
        }
    }
}
