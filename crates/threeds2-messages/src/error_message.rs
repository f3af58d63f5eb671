//! The `Erro` message.
//!
//! Built either from a message an ACS sent, or locally when this engine
//! detects a violation and has to report it back to the ACS.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::challenge_request::ChallengeRequestParameters;
use crate::error::MessageError;
use crate::fields::{as_object, optional_string, required_string};

pub const ERROR_MESSAGE_TYPE: &str = "Erro";

/// Protocol error codes this engine produces or interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 101: not a recognized message.
    InvalidMessage,
    /// 102: `messageVersion` not valid for the receiver.
    UnsupportedMessageVersion,
    /// 201: required data element missing.
    RequiredDataElementMissing,
    /// 202: critical message extension not recognized.
    UnrecognizedCriticalExtension,
    /// 203: data element format invalid.
    InvalidFormat,
    /// 301: transaction ID not recognized.
    UnrecognizedTransactionId,
    /// 302: data could not be decrypted.
    DecryptionFailure,
    /// 402: transaction timed out.
    TransactionTimedOut,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 8] = [
        Self::InvalidMessage,
        Self::UnsupportedMessageVersion,
        Self::RequiredDataElementMissing,
        Self::UnrecognizedCriticalExtension,
        Self::InvalidFormat,
        Self::UnrecognizedTransactionId,
        Self::DecryptionFailure,
        Self::TransactionTimedOut,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidMessage => "101",
            Self::UnsupportedMessageVersion => "102",
            Self::RequiredDataElementMissing => "201",
            Self::UnrecognizedCriticalExtension => "202",
            Self::InvalidFormat => "203",
            Self::UnrecognizedTransactionId => "301",
            Self::DecryptionFailure => "302",
            Self::TransactionTimedOut => "402",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidMessage => "Message is not recognized",
            Self::UnsupportedMessageVersion => {
                "Message Version Number received is not valid for the receiving component"
            }
            Self::RequiredDataElementMissing => {
                "A message element required by the specification is missing from the message"
            }
            Self::UnrecognizedCriticalExtension => "Critical message extension not recognised",
            Self::InvalidFormat => "Format of one or more Data Elements is invalid",
            Self::UnrecognizedTransactionId => {
                "Transaction ID received is not valid for the receiving component"
            }
            Self::DecryptionFailure => {
                "Data could not be decrypted by the receiving system due to technical or other reason"
            }
            Self::TransactionTimedOut => "Transaction timed-out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Which component detected the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorComponent {
    #[serde(rename = "C")]
    Sdk,
    #[serde(rename = "S")]
    ThreeDsServer,
    #[serde(rename = "D")]
    DirectoryServer,
    #[serde(rename = "A")]
    Acs,
}

impl ErrorComponent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sdk => "C",
            Self::ThreeDsServer => "S",
            Self::DirectoryServer => "D",
            Self::Acs => "A",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "C" => Some(Self::Sdk),
            "S" => Some(Self::ThreeDsServer),
            "D" => Some(Self::DirectoryServer),
            "A" => Some(Self::Acs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    /// Kept as received; ACSs send codes outside [`ErrorCode`].
    pub error_code: String,
    pub error_component: ErrorComponent,
    pub error_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Type of the message that triggered the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message_type: Option<String>,
    pub message_type: String,
    pub message_version: String,
    #[serde(rename = "acsTransID", skip_serializing_if = "Option::is_none")]
    pub acs_transaction_id: Option<String>,
    #[serde(rename = "sdkTransID", skip_serializing_if = "Option::is_none")]
    pub sdk_transaction_id: Option<String>,
    #[serde(rename = "threeDSServerTransID", skip_serializing_if = "Option::is_none")]
    pub three_ds_server_transaction_id: Option<String>,
}

impl ErrorMessage {
    pub fn new(
        code: ErrorCode,
        component: ErrorComponent,
        detail: Option<String>,
        message_version: &str,
    ) -> Self {
        Self {
            error_code: code.code().to_string(),
            error_component: component,
            error_description: code.description().to_string(),
            error_detail: detail,
            error_message_type: None,
            message_type: ERROR_MESSAGE_TYPE.to_string(),
            message_version: message_version.to_string(),
            acs_transaction_id: None,
            sdk_transaction_id: None,
            three_ds_server_transaction_id: None,
        }
    }

    /// A locally detected error about a CRes answering `request`.
    pub fn for_request(
        request: &ChallengeRequestParameters,
        code: ErrorCode,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            error_message_type: Some("CRes".to_string()),
            acs_transaction_id: Some(request.acs_transaction_id.clone()),
            sdk_transaction_id: Some(request.sdk_transaction_id.clone()),
            three_ds_server_transaction_id: Some(request.three_ds_server_transaction_id.clone()),
            ..Self::new(
                code,
                ErrorComponent::Sdk,
                Some(detail.into()),
                &request.message_version,
            )
        }
    }

    /// The local `Erro` for a contract violation, or `None` when the
    /// violation has no protocol code.
    pub fn for_violation(
        error: &MessageError,
        request: &ChallengeRequestParameters,
    ) -> Option<Self> {
        let code = error.error_code()?;
        let detail = error.field().map_or_else(|| error.to_string(), str::to_string);
        Some(Self::for_request(request, code, detail))
    }

    /// Decode a received `Erro`. Fails if the message is of another type.
    pub fn from_json(json: &Value) -> Result<Self, MessageError> {
        let obj = as_object(json)?;
        let message_type = required_string(obj, "messageType")?;
        if message_type != ERROR_MESSAGE_TYPE {
            return Err(MessageError::UnexpectedMessageType {
                expected: ERROR_MESSAGE_TYPE,
                actual: message_type,
            });
        }
        let component = required_string(obj, "errorComponent")?;
        Ok(Self {
            error_code: required_string(obj, "errorCode")?,
            error_component: ErrorComponent::from_wire(&component)
                .ok_or_else(|| MessageError::invalid("errorComponent", component.clone()))?,
            error_description: optional_string(obj, "errorDescription")?.unwrap_or_default(),
            error_detail: optional_string(obj, "errorDetail")?,
            error_message_type: optional_string(obj, "errorMessageType")?,
            message_type,
            message_version: optional_string(obj, "messageVersion")?.unwrap_or_default(),
            acs_transaction_id: optional_string(obj, "acsTransID")?,
            sdk_transaction_id: optional_string(obj, "sdkTransID")?,
            three_ds_server_transaction_id: optional_string(obj, "threeDSServerTransID")?,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MessageError> {
        Self::from_json(&serde_json::from_slice(bytes)?)
    }

    /// True when `json` is an object whose `messageType` is `Erro`.
    pub fn is_error_message(json: &Value) -> bool {
        json.get("messageType").and_then(Value::as_str) == Some(ERROR_MESSAGE_TYPE)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(&self.error_code)
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error {} from {}",
            self.error_message_type.as_deref().unwrap_or("protocol"),
            self.error_code,
            self.error_component.as_str()
        )?;
        if let Some(detail) = &self.error_detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorMessage {}
