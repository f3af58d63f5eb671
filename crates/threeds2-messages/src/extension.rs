use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MessageError;
use crate::fields::required_string;

/// Upper bound on extensions in one message.
pub const MAX_MESSAGE_EXTENSIONS: usize = 10;

const FIELD: &str = "messageExtension";

/// A `messageExtension` entry. `data` is opaque to this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExtension {
    pub name: String,
    pub id: String,
    pub criticality_indicator: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Decode `messageExtension` from a message.
///
/// A critical extension whose `id` is not in `recognized` is rejected.
pub fn parse_extensions(
    obj: &Map<String, Value>,
    recognized: &[&str],
) -> Result<Vec<MessageExtension>, MessageError> {
    let entries = match obj.get(FIELD) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(MessageError::invalid(FIELD, "expected array")),
    };
    if entries.len() > MAX_MESSAGE_EXTENSIONS {
        return Err(MessageError::invalid(
            FIELD,
            format!("more than {MAX_MESSAGE_EXTENSIONS} extensions"),
        ));
    }

    entries
        .iter()
        .map(|entry| {
            let entry = entry
                .as_object()
                .ok_or_else(|| MessageError::invalid(FIELD, "expected object entries"))?;
            let criticality_indicator = match entry.get("criticalityIndicator") {
                Some(Value::Bool(flag)) => *flag,
                None => {
                    return Err(MessageError::MissingField {
                        field: "criticalityIndicator",
                    })
                }
                Some(_) => return Err(MessageError::invalid("criticalityIndicator", "expected boolean")),
            };
            let extension = MessageExtension {
                name: required_string(entry, "name")?,
                id: required_string(entry, "id")?,
                criticality_indicator,
                data: entry.get("data").cloned().unwrap_or(Value::Null),
            };
            if extension.criticality_indicator && !recognized.contains(&extension.id.as_str()) {
                return Err(MessageError::UnrecognizedCriticalExtension { id: extension.id });
            }
            Ok(extension)
        })
        .collect()
}
