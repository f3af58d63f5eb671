//! Challenge UI content carried in a CRes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MessageError;
use crate::fields::optional_string;

/// `acsUiType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiType {
    Text,
    SingleSelect,
    MultiSelect,
    OutOfBand,
    Html,
}

impl UiType {
    pub fn code(self) -> &'static str {
        match self {
            Self::Text => "01",
            Self::SingleSelect => "02",
            Self::MultiSelect => "03",
            Self::OutOfBand => "04",
            Self::Html => "05",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::Text),
            "02" => Some(Self::SingleSelect),
            "03" => Some(Self::MultiSelect),
            "04" => Some(Self::OutOfBand),
            "05" => Some(Self::Html),
            _ => None,
        }
    }

    /// Native screens, as opposed to ACS-supplied HTML.
    pub fn is_native(self) -> bool {
        self != Self::Html
    }
}

/// One `challengeSelectInfo` entry. On the wire each entry is a
/// single-member object `{"<key>": "<label>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub key: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut entry = Map::new();
        entry.insert(self.key.clone(), Value::String(self.label.clone()));
        Value::Object(entry)
    }
}

pub(crate) fn parse_select_info(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<SelectOption>, MessageError> {
    let entries = match obj.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(MessageError::invalid(field, "expected array")),
    };
    entries
        .iter()
        .map(|entry| match entry.as_object() {
            Some(member) if member.len() == 1 => {
                let (key, label) = member
                    .iter()
                    .next()
                    .ok_or_else(|| MessageError::invalid(field, "empty entry"))?;
                let label = label
                    .as_str()
                    .ok_or_else(|| MessageError::invalid(field, "label must be a string"))?;
                Ok(SelectOption::new(key.clone(), label))
            }
            _ => Err(MessageError::invalid(field, "expected single-member objects")),
        })
        .collect()
}

/// Issuer or payment-system logo at three densities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_high: Option<String>,
}

impl Image {
    /// Best URL for the given density, falling back to lower densities.
    pub fn url_for_density(&self, density: ImageDensity) -> Option<&str> {
        let candidates = match density {
            ImageDensity::ExtraHigh => [&self.extra_high, &self.high, &self.medium],
            ImageDensity::High => [&self.high, &self.medium, &self.extra_high],
            ImageDensity::Medium => [&self.medium, &self.high, &self.extra_high],
        };
        candidates.into_iter().find_map(|url| url.as_deref())
    }

    pub(crate) fn parse(
        obj: &Map<String, Value>,
        field: &'static str,
    ) -> Result<Option<Self>, MessageError> {
        let image = match obj.get(field) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(image)) => image,
            Some(_) => return Err(MessageError::invalid(field, "expected object")),
        };
        let parsed = Self {
            medium: optional_string(image, "medium")?,
            high: optional_string(image, "high")?,
            extra_high: optional_string(image, "extraHigh")?,
        };
        Ok(Some(parsed).filter(|image| *image != Self::default()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDensity {
    Medium,
    High,
    ExtraHigh,
}
