//! Payload encoding used for inputs, results and details in history.
//!
//! Only the plain encodings are handled here. Codecs (compression,
//! encryption) sit outside the engine.

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Value};

pub const ENCODING_JSON: &str = "json/plain";
pub const ENCODING_NULL: &str = "binary/null";

/// Encode a value as a single payload object
pub fn encode_payload(value: &Value) -> Value {
    if value.is_null() {
        return json!({
            "metadata": { "encoding": STANDARD.encode(ENCODING_NULL) },
        });
    }

    json!({
        "metadata": { "encoding": STANDARD.encode(ENCODING_JSON) },
        "data": STANDARD.encode(value.to_string()),
    })
}

/// Encode values as a `{"payloads": [...]}` object
pub fn encode_payloads(values: &[Value]) -> Value {
    json!({ "payloads": values.iter().map(encode_payload).collect::<Vec<_>>() })
}

/// Decode a single payload object
pub fn decode_payload(payload: &Value) -> CoreResult<Value> {
    let encoding = payload
        .get("metadata")
        .and_then(|m| m.get("encoding"))
        .and_then(|e| e.as_str())
        .map(decode_base64_string)
        .transpose()?;

    match encoding.as_deref() {
        Some(ENCODING_NULL) => Ok(Value::Null),
        Some(ENCODING_JSON) | None => {
            let data = match payload.get("data").and_then(|d| d.as_str()) {
                Some(data) => STANDARD
                    .decode(data)
                    .map_err(|e| CoreError::InvalidHistory(format!("invalid payload data: {}", e)))?,
                None => return Ok(Value::Null),
            };
            Ok(serde_json::from_slice(&data)?)
        }
        Some(other) => Err(CoreError::InvalidHistory(format!(
            "unsupported payload encoding '{}'",
            other
        ))),
    }
}

/// Decode a `{"payloads": [...]}` object; absent payloads decode to nothing
pub fn decode_payloads(payloads: Option<&Value>) -> CoreResult<Vec<Value>> {
    payloads
        .and_then(|p| p.get("payloads"))
        .and_then(|p| p.as_array())
        .map(|items| items.iter().map(decode_payload).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

/// Collapse decoded payloads into one value: nothing is null, one payload is
/// itself, several become an array.
pub fn collapse(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

/// Decode a payload map such as marker details or search attributes
pub fn decode_payload_map(map: Option<&Value>) -> CoreResult<Map<String, Value>> {
    let mut decoded = Map::new();
    if let Some(Value::Object(entries)) = map {
        for (key, value) in entries {
            let value = if value.get("payloads").is_some() {
                collapse(decode_payloads(Some(value))?)
            } else {
                decode_payload(value)?
            };
            decoded.insert(key.clone(), value);
        }
    }
    Ok(decoded)
}

fn decode_base64_string(encoded: &str) -> CoreResult<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CoreError::InvalidHistory(format!("invalid payload metadata: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| CoreError::InvalidHistory(format!("invalid payload metadata: {}", e)))
}
