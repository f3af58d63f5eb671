//! CReq.
//!
//! The identifying fields are fixed when the first request is built; every
//! later round is derived with [`ChallengeRequestParameters::next_round`],
//! which bumps `sdkCounterStoA` by one and clears the cardholder input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MessageError;
use crate::extension::MessageExtension;
use crate::fields::{
    as_object, format_counter, optional_string, parse_counter, required_string,
    required_transaction_id,
};

pub const CHALLENGE_REQUEST_TYPE: &str = "CReq";

const YES: &str = "Y";

/// `challengeCancel` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeCancel {
    /// 01
    CardholderSelectedCancel,
    /// 04
    TransactionTimedOut,
    /// 06
    TransactionError,
}

impl ChallengeCancel {
    pub fn code(self) -> &'static str {
        match self {
            Self::CardholderSelectedCancel => "01",
            Self::TransactionTimedOut => "04",
            Self::TransactionError => "06",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::CardholderSelectedCancel),
            "04" => Some(Self::TransactionTimedOut),
            "06" => Some(Self::TransactionError),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRequestParameters {
    #[serde(rename = "threeDSServerTransID")]
    pub(crate) three_ds_server_transaction_id: String,
    #[serde(rename = "acsTransID")]
    pub(crate) acs_transaction_id: String,
    #[serde(rename = "messageType")]
    message_type: String,
    #[serde(rename = "messageVersion")]
    pub(crate) message_version: String,
    #[serde(rename = "sdkTransID")]
    pub(crate) sdk_transaction_id: String,
    #[serde(rename = "sdkCounterStoA", with = "counter")]
    sdk_counter: u8,
    #[serde(
        rename = "threeDSRequestorAppURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    requestor_app_url: Option<String>,

    #[serde(rename = "challengeCancel", default, skip_serializing_if = "Option::is_none")]
    challenge_cancel: Option<String>,
    #[serde(rename = "challengeDataEntry", default, skip_serializing_if = "Option::is_none")]
    pub challenge_data_entry: Option<String>,
    #[serde(
        rename = "challengeHTMLDataEntry",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub challenge_html_data_entry: Option<String>,
    #[serde(rename = "challengeNoEntry", default, skip_serializing_if = "Option::is_none")]
    challenge_no_entry: Option<String>,
    #[serde(rename = "oobContinue", default, skip_serializing_if = "Option::is_none")]
    oob_continue: Option<bool>,
    #[serde(rename = "resendChallenge", default, skip_serializing_if = "Option::is_none")]
    resend_challenge: Option<String>,
    #[serde(rename = "messageExtension", default, skip_serializing_if = "Vec::is_empty")]
    pub message_extension: Vec<MessageExtension>,
}

impl ChallengeRequestParameters {
    /// The first request of a challenge, counter `000`.
    pub fn new(
        three_ds_server_transaction_id: &str,
        acs_transaction_id: &str,
        message_version: &str,
        sdk_transaction_id: &str,
    ) -> Self {
        Self {
            three_ds_server_transaction_id: three_ds_server_transaction_id.to_string(),
            acs_transaction_id: acs_transaction_id.to_string(),
            message_type: CHALLENGE_REQUEST_TYPE.to_string(),
            message_version: message_version.to_string(),
            sdk_transaction_id: sdk_transaction_id.to_string(),
            sdk_counter: 0,
            requestor_app_url: None,
            challenge_cancel: None,
            challenge_data_entry: None,
            challenge_html_data_entry: None,
            challenge_no_entry: None,
            oob_continue: None,
            resend_challenge: None,
            message_extension: Vec::new(),
        }
    }

    pub fn with_requestor_app_url(mut self, url: Option<String>) -> Self {
        self.requestor_app_url = url;
        self
    }

    /// Same identifiers, counter + 1, no cardholder input.
    pub fn next_round(&self) -> Result<Self, MessageError> {
        let sdk_counter = self.sdk_counter.checked_add(1).ok_or_else(|| {
            MessageError::invalid("sdkCounterStoA", "challenge round limit reached")
        })?;
        Ok(Self {
            three_ds_server_transaction_id: self.three_ds_server_transaction_id.clone(),
            acs_transaction_id: self.acs_transaction_id.clone(),
            message_type: CHALLENGE_REQUEST_TYPE.to_string(),
            message_version: self.message_version.clone(),
            sdk_transaction_id: self.sdk_transaction_id.clone(),
            sdk_counter,
            requestor_app_url: self.requestor_app_url.clone(),
            challenge_cancel: None,
            challenge_data_entry: None,
            challenge_html_data_entry: None,
            challenge_no_entry: None,
            oob_continue: None,
            resend_challenge: None,
            message_extension: self.message_extension.clone(),
        })
    }

    pub fn set_cancel(&mut self, reason: ChallengeCancel) {
        self.challenge_cancel = Some(reason.code().to_string());
    }

    pub fn set_no_entry(&mut self) {
        self.challenge_no_entry = Some(YES.to_string());
    }

    pub fn set_oob_continue(&mut self) {
        self.oob_continue = Some(true);
    }

    pub fn set_resend_challenge(&mut self) {
        self.resend_challenge = Some(YES.to_string());
    }

    pub fn three_ds_server_transaction_id(&self) -> &str {
        &self.three_ds_server_transaction_id
    }

    pub fn acs_transaction_id(&self) -> &str {
        &self.acs_transaction_id
    }

    pub fn sdk_transaction_id(&self) -> &str {
        &self.sdk_transaction_id
    }

    pub fn message_version(&self) -> &str {
        &self.message_version
    }

    pub fn sdk_counter(&self) -> u8 {
        self.sdk_counter
    }

    /// `sdkCounterStoA` as sent on the wire.
    pub fn sdk_counter_string(&self) -> String {
        format_counter(self.sdk_counter)
    }

    pub fn challenge_cancel(&self) -> Option<ChallengeCancel> {
        self.challenge_cancel.as_deref().and_then(ChallengeCancel::from_code)
    }

    pub fn challenge_no_entry(&self) -> bool {
        self.challenge_no_entry.as_deref() == Some(YES)
    }

    pub fn oob_continue(&self) -> bool {
        self.oob_continue == Some(true)
    }

    pub fn resend_challenge(&self) -> bool {
        self.resend_challenge.as_deref() == Some(YES)
    }

    pub fn requestor_app_url(&self) -> Option<&str> {
        self.requestor_app_url.as_deref()
    }

    pub fn to_json(&self) -> Result<Value, MessageError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a CReq, as an ACS would.
    pub fn from_json(json: &Value) -> Result<Self, MessageError> {
        let obj = as_object(json)?;
        let message_type = required_string(obj, "messageType")?;
        if message_type != CHALLENGE_REQUEST_TYPE {
            return Err(MessageError::UnexpectedMessageType {
                expected: CHALLENGE_REQUEST_TYPE,
                actual: message_type,
            });
        }
        required_transaction_id(obj, "threeDSServerTransID")?;
        required_transaction_id(obj, "acsTransID")?;
        required_transaction_id(obj, "sdkTransID")?;
        required_string(obj, "messageVersion")?;
        if let Some(cancel) = optional_string(obj, "challengeCancel")? {
            if ChallengeCancel::from_code(&cancel).is_none() {
                return Err(MessageError::invalid("challengeCancel", cancel));
            }
        }
        Ok(serde_json::from_value(json.clone())?)
    }
}

mod counter {
    use super::{format_counter, parse_counter};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_counter(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse_counter(&value, "sdkCounterStoA").map_err(de::Error::custom)
    }
}
