use thiserror::Error;
use threeds2_crypto::CryptoError;
use threeds2_messages::MessageError;

/// Errors returned synchronously by SDK entry points.
///
/// These indicate caller misuse or a failure inside the call itself.
/// Failures of a running challenge are reported through
/// [`ChallengeStatusReceiver`](crate::ChallengeStatusReceiver) instead.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("SDK is already initialized")]
    AlreadyInitialized,

    #[error("SDK is not initialized")]
    NotInitialized,

    #[error("Unknown directory server: {0}")]
    UnknownDirectoryServer(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),
}

impl SdkError {
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
