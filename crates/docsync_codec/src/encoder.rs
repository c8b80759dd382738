//! Canonical JSON encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to canonical JSON text.
///
/// Canonical output has:
/// - Object keys in sorted (bytewise) order
/// - No insignificant whitespace
/// - Integers without a fractional part
///
/// # Errors
///
/// Returns an error if the value contains a NaN or infinite float.
pub fn to_canonical_json(value: &Value) -> CodecResult<String> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    encoder.into_string()
}

/// Encode a value to indented JSON text, keys still sorted.
///
/// # Errors
///
/// Returns an error if the value contains a NaN or infinite float.
pub fn to_json_pretty(value: &Value) -> CodecResult<String> {
    check_finite(value)?;
    Ok(serde_json::to_string_pretty(value)?)
}

/// A canonical JSON encoder.
///
/// Several values can be written into the same buffer, separated by newlines,
/// which is how mutation logs are written to disk.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value, appending it to the buffer.
    ///
    /// A newline separates it from any previously encoded value.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        check_finite(value)?;
        if !self.buffer.is_empty() {
            self.buffer.push(b'\n');
        }
        serde_json::to_writer(&mut self.buffer, value)?;
        Ok(())
    }

    /// Consume this encoder and return the encoded text.
    pub fn into_string(self) -> CodecResult<String> {
        String::from_utf8(self.buffer).map_err(|e| CodecError::encoding_failed(e.to_string()))
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_finite(value: &Value) -> CodecResult<()> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(CodecError::NonFiniteFloat),
        Value::Array(items) => items.iter().try_for_each(check_finite),
        Value::Object(map) => map.values().try_for_each(check_finite),
        _ => Ok(()),
    }
}
