use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MessageError;

/// Protocol version negotiated for a transaction.
///
/// `Fallback` stands for any version string this engine does not speak. It is
/// what [`ProtocolVersion::from_wire`] yields for an unrecognized
/// `messageVersion`; a transaction can never be created with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V2_1_0,
    V2_2_0,
    Fallback,
}

impl ProtocolVersion {
    pub const SUPPORTED: [ProtocolVersion; 2] = [Self::V2_1_0, Self::V2_2_0];

    /// Strict parse: only supported versions.
    pub fn parse(value: &str) -> Result<Self, MessageError> {
        match Self::from_wire(value) {
            Self::Fallback => Err(MessageError::UnsupportedVersion(value.to_string())),
            version => Ok(version),
        }
    }

    /// Lenient parse for received messages.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "2.1.0" => Self::V2_1_0,
            "2.2.0" => Self::V2_2_0,
            _ => Self::Fallback,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V2_1_0 => "2.1.0",
            Self::V2_2_0 => "2.2.0",
            Self::Fallback => "fallback",
        }
    }

    pub fn is_supported(self) -> bool {
        self != Self::Fallback
    }

    /// `challengeNoEntry` and `whitelistingInfoText` exist from 2.2.0 on.
    pub fn supports_no_entry_indicator(self) -> bool {
        self == Self::V2_2_0
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&value))
    }
}
