// Message Envelope Codec
// JSON encoding of stage payloads with a validating decode step

use crate::domain::{Envelope, StagePayload};
use crate::error::{AppError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize a mapping-shaped value to UTF-8 JSON
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AppError::Internal(format!("encode failed: {}", e)))
}

/// Parse bytes into a JSON object
///
/// # Errors
/// - AppError::Decode on invalid UTF-8, invalid JSON or a non-object document
pub fn decode(bytes: &[u8]) -> Result<Map<String, Value>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AppError::Decode(format!("payload is not UTF-8: {}", e)))?;
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AppError::Decode(format!(
            "payload must be a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(AppError::Decode(format!("invalid JSON: {}", e))),
    }
}

/// Decode and validate a stage payload
///
/// Missing required keys, type mismatches and semantic violations are
/// validation errors; syntactic failures are decode errors.
pub fn decode_payload<T: StagePayload>(bytes: &[u8]) -> Result<T> {
    let map = decode(bytes)?;

    let missing: Vec<&str> = T::REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| map.get(*key).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "{}: missing required keys: {}",
            T::SCHEMA,
            missing.join(", ")
        )));
    }

    let payload: T = serde_json::from_value(Value::Object(map))
        .map_err(|e| AppError::Validation(format!("{}: {}", T::SCHEMA, e)))?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(format!("{}: {}", T::SCHEMA, e)))?;
    Ok(payload)
}

/// Persistent JSON envelope for a payload, correlated by user id
pub fn envelope_for<T: StagePayload>(payload: &T) -> Result<Envelope> {
    Ok(Envelope::json(encode(payload)?, payload.correlation_id()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
