use thiserror::Error;

use crate::error_message::ErrorCode;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Invalid message: expected JSON object")]
    NotAnObject,

    #[error("Unexpected message type: expected {expected}, got {actual}")]
    UnexpectedMessageType {
        expected: &'static str,
        actual: String,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Unrecognized critical extension: {id}")]
    UnrecognizedCriticalExtension { id: String },

    #[error("Unsupported message version: {0}")]
    UnsupportedVersion(String),

    #[error("Transaction identifier mismatch: {field}")]
    TransactionIdMismatch { field: &'static str },

    #[error("Counter mismatch: sent {sent}, received {received}")]
    CounterMismatch { sent: String, received: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl MessageError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// The protocol error code for a contract violation, or `None` when the
    /// problem is local (undecodable input, a message of the wrong type).
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::MissingField { .. } => Some(ErrorCode::RequiredDataElementMissing),
            Self::InvalidField { .. } => Some(ErrorCode::InvalidFormat),
            Self::UnrecognizedCriticalExtension { .. } => {
                Some(ErrorCode::UnrecognizedCriticalExtension)
            }
            Self::UnsupportedVersion(_) => Some(ErrorCode::UnsupportedMessageVersion),
            Self::TransactionIdMismatch { .. } => Some(ErrorCode::UnrecognizedTransactionId),
            Self::CounterMismatch { .. } => Some(ErrorCode::DecryptionFailure),
            Self::NotAnObject | Self::UnexpectedMessageType { .. } | Self::InvalidJson(_) => None,
        }
    }

    /// The offending data element, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field }
            | Self::InvalidField { field, .. }
            | Self::TransactionIdMismatch { field } => Some(field),
            Self::CounterMismatch { .. } => Some("acsCounterAtoS"),
            Self::UnrecognizedCriticalExtension { .. } => Some("messageExtension"),
            Self::UnsupportedVersion(_) => Some("messageVersion"),
            _ => None,
        }
    }
}
