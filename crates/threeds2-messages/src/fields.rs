//! Data-element extraction shared by the message decoders.

use serde_json::{Map, Value};

use crate::error::MessageError;

/// Transaction identifiers are UUIDs, at most 36 characters.
pub(crate) const TRANSACTION_ID_MAX_LENGTH: usize = 36;

pub(crate) fn as_object(json: &Value) -> Result<&Map<String, Value>, MessageError> {
    json.as_object().ok_or(MessageError::NotAnObject)
}

/// Present, a string, and non-empty.
pub(crate) fn required_string(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<String, MessageError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(MessageError::MissingField { field }),
        Some(Value::String(s)) if s.is_empty() => Err(MessageError::MissingField { field }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(MessageError::invalid(field, "expected string")),
    }
}

/// Absent and empty are both `None`; a non-string is a format error.
pub(crate) fn optional_string(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, MessageError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(MessageError::invalid(field, "expected string")),
    }
}

pub(crate) fn required_transaction_id(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<String, MessageError> {
    let id = required_string(obj, field)?;
    if id.len() > TRANSACTION_ID_MAX_LENGTH {
        return Err(MessageError::invalid(field, "longer than 36 characters"));
    }
    Ok(id)
}

/// `Y`/`N` indicator.
pub(crate) fn yes_no(value: &str, field: &'static str) -> Result<bool, MessageError> {
    match value {
        "Y" => Ok(true),
        "N" => Ok(false),
        other => Err(MessageError::invalid(field, format!("expected Y or N, got {other}"))),
    }
}

/// Three-digit decimal counter, `000`..`255`.
pub(crate) fn parse_counter(value: &str, field: &'static str) -> Result<u8, MessageError> {
    if value.len() != 3 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MessageError::invalid(field, "expected three digits"));
    }
    value
        .parse::<u8>()
        .map_err(|_| MessageError::invalid(field, "counter out of range"))
}

pub(crate) fn format_counter(counter: u8) -> String {
    format!("{counter:03}")
}
