use threeds2_messages::AuthenticationResponse;

use crate::error::{Result, SdkError};

/// What the SDK needs from the ARes to start a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeParameters {
    pub three_ds_server_transaction_id: String,
    pub acs_transaction_id: String,
    pub acs_reference_number: Option<String>,
    /// Compact JWS carrying the ACS ephemeral key and URL.
    pub acs_signed_content: String,
    /// Where an OOB app returns the cardholder (2.2.0).
    pub requestor_app_url: Option<String>,
}

impl ChallengeParameters {
    pub fn new(
        three_ds_server_transaction_id: impl Into<String>,
        acs_transaction_id: impl Into<String>,
        acs_signed_content: impl Into<String>,
    ) -> Self {
        Self {
            three_ds_server_transaction_id: three_ds_server_transaction_id.into(),
            acs_transaction_id: acs_transaction_id.into(),
            acs_reference_number: None,
            acs_signed_content: acs_signed_content.into(),
            requestor_app_url: None,
        }
    }

    /// Fails if the ARes does not call for a challenge.
    pub fn from_authentication_response(response: &AuthenticationResponse) -> Result<Self> {
        if !response.challenge_required() {
            return Err(SdkError::invalid_input(format!(
                "transStatus {} does not require a challenge",
                response.transaction_status.code()
            )));
        }
        let signed_content = response
            .acs_signed_content
            .clone()
            .ok_or_else(|| SdkError::invalid_input("ARes has no acsSignedContent"))?;
        Ok(Self {
            acs_reference_number: response.acs_reference_number.clone(),
            ..Self::new(
                response.three_ds_server_transaction_id.clone(),
                response.acs_transaction_id.clone(),
                signed_content,
            )
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("three_ds_server_transaction_id", &self.three_ds_server_transaction_id),
            ("acs_transaction_id", &self.acs_transaction_id),
            ("acs_signed_content", &self.acs_signed_content),
        ] {
            if value.trim().is_empty() {
                return Err(SdkError::invalid_input(format!("{name} is empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn built_from_challenge_ares() {
        let ares = AuthenticationResponse::from_json(&json!({
            "messageType": "ARes",
            "messageVersion": "2.2.0",
            "threeDSServerTransID": "server",
            "acsTransID": "acs",
            "acsReferenceNumber": "ACS-REF",
            "transStatus": "C",
            "acsSignedContent": "h.p.s"
        }))
        .unwrap();
        let params = ChallengeParameters::from_authentication_response(&ares).unwrap();
        assert_eq!(params.acs_transaction_id, "acs");
        assert_eq!(params.acs_reference_number.as_deref(), Some("ACS-REF"));
        assert_eq!(params.acs_signed_content, "h.p.s");
    }

    #[test]
    fn frictionless_ares_is_rejected() {
        let ares = AuthenticationResponse::from_json(&json!({
            "messageType": "ARes",
            "messageVersion": "2.2.0",
            "threeDSServerTransID": "server",
            "acsTransID": "acs",
            "transStatus": "Y"
        }))
        .unwrap();
        assert!(matches!(
            ChallengeParameters::from_authentication_response(&ares),
            Err(SdkError::InvalidInput(_))
        ));
    }

    #[test]
    fn empty_fields_are_invalid() {
        assert!(ChallengeParameters::new("s", "", "c").validate().is_err());
        assert!(ChallengeParameters::new("s", "a", "c").validate().is_ok());
    }
}
