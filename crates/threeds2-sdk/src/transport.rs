//! Collaborators the caller supplies to run a challenge.

use std::fmt;

use async_trait::async_trait;
use threeds2_messages::ChallengeResponse;

use crate::challenge::ChallengeInput;

/// Delivers encoded messages to the ACS.
///
/// `body` is a compact JWE for CReq messages and plain JSON for `Erro`
/// messages. The returned bytes are the raw ACS response.
#[async_trait]
pub trait ChallengeTransport: Send + Sync {
    async fn send(&self, acs_url: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// Renders a challenge screen and collects the cardholder's answer.
#[async_trait]
pub trait ChallengePresenter: Send + Sync {
    async fn present(&self, response: &ChallengeResponse) -> ChallengeInput;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection or I/O failure.
    Network,
    /// The request did not complete in time.
    Timeout,
    /// The ACS answered with a non-success HTTP status.
    Http(u16),
}

/// Transport-level failure.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
    pub kind: TransportErrorKind,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TransportErrorKind::Network,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: TransportErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportErrorKind::Network => write!(f, "{}", self.message),
            TransportErrorKind::Timeout => write!(f, "timed out: {}", self.message),
            TransportErrorKind::Http(status) => write!(f, "HTTP {status}: {}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}
