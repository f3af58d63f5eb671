//! AReq parameters produced by the SDK and the ARes handed back to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MessageError;
use crate::fields::{as_object, optional_string, required_string, required_transaction_id, yes_no};
use crate::version::ProtocolVersion;

pub const AUTHENTICATION_RESPONSE_TYPE: &str = "ARes";

/// The SDK's contribution to an AReq. Built once per transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationRequestParameters {
    #[serde(rename = "sdkTransID")]
    sdk_transaction_id: String,
    #[serde(rename = "sdkAppID")]
    sdk_app_id: String,
    #[serde(rename = "sdkReferenceNumber")]
    sdk_reference_number: String,
    #[serde(rename = "sdkEphemPubKey")]
    sdk_ephemeral_public_key: Value,
    #[serde(rename = "sdkEncData", default, skip_serializing_if = "Option::is_none")]
    device_data: Option<String>,
    #[serde(rename = "messageVersion")]
    message_version: String,
}

impl AuthenticationRequestParameters {
    pub fn new(
        sdk_transaction_id: &str,
        sdk_app_id: &str,
        sdk_reference_number: &str,
        sdk_ephemeral_public_key: Value,
        device_data: Option<String>,
        message_version: ProtocolVersion,
    ) -> Self {
        Self {
            sdk_transaction_id: sdk_transaction_id.to_string(),
            sdk_app_id: sdk_app_id.to_string(),
            sdk_reference_number: sdk_reference_number.to_string(),
            sdk_ephemeral_public_key,
            device_data,
            message_version: message_version.as_str().to_string(),
        }
    }

    pub fn sdk_transaction_id(&self) -> &str {
        &self.sdk_transaction_id
    }

    pub fn sdk_app_id(&self) -> &str {
        &self.sdk_app_id
    }

    pub fn sdk_reference_number(&self) -> &str {
        &self.sdk_reference_number
    }

    /// Ephemeral public key as an EC JWK.
    pub fn sdk_ephemeral_public_key(&self) -> &Value {
        &self.sdk_ephemeral_public_key
    }

    /// Compact JWE of the device information, if any was collected.
    pub fn device_data(&self) -> Option<&str> {
        self.device_data.as_deref()
    }

    pub fn message_version(&self) -> &str {
        &self.message_version
    }

    pub fn to_json(&self) -> Result<Value, MessageError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// `transStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Y: authenticated.
    Authenticated,
    /// N: not authenticated.
    NotAuthenticated,
    /// U: could not be performed.
    Unavailable,
    /// A: attempted.
    Attempted,
    /// C: challenge required.
    ChallengeRequired,
    /// D: decoupled challenge required.
    DecoupledChallengeRequired,
    /// R: rejected.
    Rejected,
    /// I: informational only.
    InformationalOnly,
}

impl TransactionStatus {
    pub fn code(self) -> &'static str {
        match self {
            Self::Authenticated => "Y",
            Self::NotAuthenticated => "N",
            Self::Unavailable => "U",
            Self::Attempted => "A",
            Self::ChallengeRequired => "C",
            Self::DecoupledChallengeRequired => "D",
            Self::Rejected => "R",
            Self::InformationalOnly => "I",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "Y" => Some(Self::Authenticated),
            "N" => Some(Self::NotAuthenticated),
            "U" => Some(Self::Unavailable),
            "A" => Some(Self::Attempted),
            "C" => Some(Self::ChallengeRequired),
            "D" => Some(Self::DecoupledChallengeRequired),
            "R" => Some(Self::Rejected),
            "I" => Some(Self::InformationalOnly),
            _ => None,
        }
    }
}

/// A decoded ARes.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationResponse {
    pub three_ds_server_transaction_id: String,
    pub acs_transaction_id: String,
    pub sdk_transaction_id: Option<String>,
    pub ds_transaction_id: Option<String>,
    pub acs_reference_number: Option<String>,
    pub acs_url: Option<String>,
    /// Compact JWS; present whenever a challenge is required.
    pub acs_signed_content: Option<String>,
    pub acs_challenge_mandated: bool,
    pub transaction_status: TransactionStatus,
    pub message_version: ProtocolVersion,
}

impl AuthenticationResponse {
    pub fn from_json(json: &Value) -> Result<Self, MessageError> {
        let obj = as_object(json)?;
        let message_type = required_string(obj, "messageType")?;
        if message_type != AUTHENTICATION_RESPONSE_TYPE {
            return Err(MessageError::UnexpectedMessageType {
                expected: AUTHENTICATION_RESPONSE_TYPE,
                actual: message_type,
            });
        }
        let message_version = ProtocolVersion::parse(&required_string(obj, "messageVersion")?)?;
        let status = required_string(obj, "transStatus")?;
        let transaction_status = TransactionStatus::from_code(&status)
            .ok_or_else(|| MessageError::invalid("transStatus", status))?;
        let acs_challenge_mandated = optional_string(obj, "acsChallengeMandated")?
            .map(|value| yes_no(&value, "acsChallengeMandated"))
            .transpose()?
            .unwrap_or(false);

        let response = Self {
            three_ds_server_transaction_id: required_transaction_id(obj, "threeDSServerTransID")?,
            acs_transaction_id: required_transaction_id(obj, "acsTransID")?,
            sdk_transaction_id: optional_string(obj, "sdkTransID")?,
            ds_transaction_id: optional_string(obj, "dsTransID")?,
            acs_reference_number: optional_string(obj, "acsReferenceNumber")?,
            acs_url: optional_string(obj, "acsURL")?,
            acs_signed_content: optional_string(obj, "acsSignedContent")?,
            acs_challenge_mandated,
            transaction_status,
            message_version,
        };
        if response.challenge_required() && response.acs_signed_content.is_none() {
            return Err(MessageError::MissingField {
                field: "acsSignedContent",
            });
        }
        Ok(response)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MessageError> {
        Self::from_json(&serde_json::from_slice(bytes)?)
    }

    pub fn challenge_required(&self) -> bool {
        matches!(
            self.transaction_status,
            TransactionStatus::ChallengeRequired | TransactionStatus::DecoupledChallengeRequired
        )
    }
}
