//! CRes decoding and validation.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::{Map, Value};

use crate::challenge_request::ChallengeRequestParameters;
use crate::error::MessageError;
use crate::extension::{parse_extensions, MessageExtension};
use crate::fields::{
    as_object, optional_string, parse_counter, required_string, required_transaction_id, yes_no,
};
use crate::ui::{parse_select_info, Image, SelectOption, UiType};
use crate::version::ProtocolVersion;

pub const CHALLENGE_RESPONSE_TYPE: &str = "CRes";

/// Critical extensions this engine understands. None so far.
const RECOGNIZED_CRITICAL_EXTENSIONS: &[&str] = &[];

/// A validated CRes.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeResponse {
    pub three_ds_server_transaction_id: String,
    pub acs_transaction_id: String,
    pub sdk_transaction_id: String,
    pub acs_counter: u8,
    pub message_version: ProtocolVersion,
    pub challenge_completed: bool,
    /// Final `transStatus`; always present when the challenge completed.
    pub transaction_status: Option<String>,
    pub ui_type: Option<UiType>,

    pub challenge_info_header: Option<String>,
    pub challenge_info_label: Option<String>,
    pub challenge_info_text: Option<String>,
    pub challenge_info_text_indicator: bool,
    pub challenge_add_info: Option<String>,
    pub select_options: Vec<SelectOption>,
    pub expand_info_label: Option<String>,
    pub expand_info_text: Option<String>,
    pub why_info_label: Option<String>,
    pub why_info_text: Option<String>,
    pub submit_authentication_label: Option<String>,
    pub resend_information_label: Option<String>,
    pub oob_app_url: Option<String>,
    pub oob_app_label: Option<String>,
    pub oob_continue_label: Option<String>,
    pub whitelisting_info_text: Option<String>,
    pub issuer_image: Option<Image>,
    pub payment_system_image: Option<Image>,
    /// Decoded `acsHTML`.
    pub acs_html: Option<String>,
    pub acs_html_refresh: Option<String>,
    pub message_extensions: Vec<MessageExtension>,
}

impl ChallengeResponse {
    /// Decode and validate a CRes.
    ///
    /// # Errors
    /// - `UnexpectedMessageType` if the message is not a CRes
    /// - a coded [`MessageError`] for any contract violation
    pub fn from_json(json: &Value) -> Result<Self, MessageError> {
        let obj = as_object(json)?;
        let message_type = required_string(obj, "messageType")?;
        if message_type != CHALLENGE_RESPONSE_TYPE {
            return Err(MessageError::UnexpectedMessageType {
                expected: CHALLENGE_RESPONSE_TYPE,
                actual: message_type,
            });
        }
        let message_version = ProtocolVersion::parse(&required_string(obj, "messageVersion")?)?;

        let three_ds_server_transaction_id = required_transaction_id(obj, "threeDSServerTransID")?;
        let acs_transaction_id = required_transaction_id(obj, "acsTransID")?;
        let sdk_transaction_id = required_transaction_id(obj, "sdkTransID")?;
        let acs_counter = parse_counter(&required_string(obj, "acsCounterAtoS")?, "acsCounterAtoS")?;
        let challenge_completed = yes_no(
            &required_string(obj, "challengeCompletionInd")?,
            "challengeCompletionInd",
        )?;
        let message_extensions = parse_extensions(obj, RECOGNIZED_CRITICAL_EXTENSIONS)?;

        let transaction_status = optional_string(obj, "transStatus")?;
        if challenge_completed {
            match transaction_status.as_deref() {
                Some("Y" | "N") => {}
                Some(other) => return Err(MessageError::invalid("transStatus", other)),
                None => return Err(MessageError::MissingField { field: "transStatus" }),
            }
        }

        let ui_type = match optional_string(obj, "acsUiType")? {
            Some(code) => Some(
                UiType::from_code(&code).ok_or_else(|| MessageError::invalid("acsUiType", code))?,
            ),
            None if challenge_completed => None,
            None => return Err(MessageError::MissingField { field: "acsUiType" }),
        };

        let challenge_info_text_indicator = optional_string(obj, "challengeInfoTextIndicator")?
            .map(|value| yes_no(&value, "challengeInfoTextIndicator"))
            .transpose()?
            .unwrap_or(false);

        let acs_html = optional_string(obj, "acsHTML")?
            .map(|encoded| decode_html(&encoded, "acsHTML"))
            .transpose()?;
        let acs_html_refresh = optional_string(obj, "acsHTMLRefresh")?
            .map(|encoded| decode_html(&encoded, "acsHTMLRefresh"))
            .transpose()?;

        let response = Self {
            three_ds_server_transaction_id,
            acs_transaction_id,
            sdk_transaction_id,
            acs_counter,
            message_version,
            challenge_completed,
            transaction_status,
            ui_type,
            challenge_info_header: optional_string(obj, "challengeInfoHeader")?,
            challenge_info_label: optional_string(obj, "challengeInfoLabel")?,
            challenge_info_text: optional_string(obj, "challengeInfoText")?,
            challenge_info_text_indicator,
            challenge_add_info: optional_string(obj, "challengeAddInfo")?,
            select_options: parse_select_info(obj, "challengeSelectInfo")?,
            expand_info_label: optional_string(obj, "expandInfoLabel")?,
            expand_info_text: optional_string(obj, "expandInfoText")?,
            why_info_label: optional_string(obj, "whyInfoLabel")?,
            why_info_text: optional_string(obj, "whyInfoText")?,
            submit_authentication_label: optional_string(obj, "submitAuthenticationLabel")?,
            resend_information_label: optional_string(obj, "resendInformationLabel")?,
            oob_app_url: optional_string(obj, "oobAppURL")?,
            oob_app_label: optional_string(obj, "oobAppLabel")?,
            oob_continue_label: optional_string(obj, "oobContinueLabel")?,
            whitelisting_info_text: optional_string(obj, "whitelistingInfoText")?,
            issuer_image: Image::parse(obj, "issuerImage")?,
            payment_system_image: Image::parse(obj, "psImage")?,
            acs_html,
            acs_html_refresh,
            message_extensions,
        };
        if !response.challenge_completed {
            response.check_ui_content(obj)?;
        }
        Ok(response)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MessageError> {
        Self::from_json(&serde_json::from_slice(bytes)?)
    }

    /// Check that this CRes answers `request`.
    pub fn validate_against(&self, request: &ChallengeRequestParameters) -> Result<(), MessageError> {
        let identifiers = [
            (
                "threeDSServerTransID",
                &self.three_ds_server_transaction_id,
                request.three_ds_server_transaction_id(),
            ),
            ("acsTransID", &self.acs_transaction_id, request.acs_transaction_id()),
            ("sdkTransID", &self.sdk_transaction_id, request.sdk_transaction_id()),
        ];
        for (field, received, sent) in identifiers {
            if received != sent {
                return Err(MessageError::TransactionIdMismatch { field });
            }
        }
        if self.acs_counter != request.sdk_counter() {
            return Err(MessageError::CounterMismatch {
                sent: request.sdk_counter_string(),
                received: format!("{:03}", self.acs_counter),
            });
        }
        if self.message_version.as_str() != request.message_version() {
            return Err(MessageError::UnsupportedVersion(
                self.message_version.as_str().to_string(),
            ));
        }
        Ok(())
    }

    fn check_ui_content(&self, obj: &Map<String, Value>) -> Result<(), MessageError> {
        match self.ui_type {
            Some(UiType::Text) => {
                require(&self.submit_authentication_label, "submitAuthenticationLabel")
            }
            Some(UiType::SingleSelect | UiType::MultiSelect) => {
                if self.select_options.is_empty() {
                    return Err(if obj.contains_key("challengeSelectInfo") {
                        MessageError::invalid("challengeSelectInfo", "no options")
                    } else {
                        MessageError::MissingField {
                            field: "challengeSelectInfo",
                        }
                    });
                }
                require(&self.submit_authentication_label, "submitAuthenticationLabel")
            }
            Some(UiType::OutOfBand) => require(&self.oob_continue_label, "oobContinueLabel"),
            Some(UiType::Html) => require(&self.acs_html, "acsHTML"),
            None => Ok(()),
        }
    }
}

fn require(value: &Option<String>, field: &'static str) -> Result<(), MessageError> {
    match value {
        Some(_) => Ok(()),
        None => Err(MessageError::MissingField { field }),
    }
}

fn decode_html(encoded: &str, field: &'static str) -> Result<String, MessageError> {
    let bytes = Base64UrlUnpadded::decode_vec(encoded.trim_end_matches('='))
        .map_err(|_| MessageError::invalid(field, "not base64url"))?;
    String::from_utf8(bytes).map_err(|_| MessageError::invalid(field, "not UTF-8"))
}
