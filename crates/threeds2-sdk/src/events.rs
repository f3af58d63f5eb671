//! Challenge outcome events and the receiver that observes them.

use std::fmt;

use threeds2_messages::{ChallengeResponse, ErrorMessage};

/// The challenge finished with a final `transStatus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub sdk_transaction_id: String,
    pub transaction_status: String,
}

/// The ACS reported a protocol error, or this SDK detected a violation of
/// the protocol by the ACS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolErrorEvent {
    pub sdk_transaction_id: String,
    pub error_message: ErrorMessage,
}

impl ProtocolErrorEvent {
    pub fn error_code(&self) -> &str {
        &self.error_message.error_code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeErrorKind {
    /// A received message could not be decrypted.
    Decryption,
    /// A received message was not a decodable protocol message.
    Decoding,
    /// The ACS signed content did not verify.
    SignatureVerification,
    /// Key agreement with the ACS key failed.
    KeyAgreement,
    /// A message of an unexpected type arrived.
    UnexpectedMessage,
    /// The transport failed or timed out.
    Transport,
    /// A local encoding step failed.
    Encoding,
}

impl RuntimeErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Decryption => "decryption",
            Self::Decoding => "decoding",
            Self::SignatureVerification => "signature_verification",
            Self::KeyAgreement => "key_agreement",
            Self::UnexpectedMessage => "unexpected_message",
            Self::Transport => "transport",
            Self::Encoding => "encoding",
        }
    }
}

/// A local failure during the challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeErrorEvent {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl RuntimeErrorEvent {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for RuntimeErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

/// Terminal outcome of a challenge. Exactly one is emitted per challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Completed(CompletionEvent),
    Cancelled,
    TimedOut,
    ProtocolError(ProtocolErrorEvent),
    RuntimeError(RuntimeErrorEvent),
}

impl StatusEvent {
    pub fn dispatch(&self, receiver: &dyn ChallengeStatusReceiver) {
        match self {
            Self::Completed(event) => receiver.completed(event),
            Self::Cancelled => receiver.cancelled(),
            Self::TimedOut => receiver.timed_out(),
            Self::ProtocolError(event) => receiver.protocol_error(event),
            Self::RuntimeError(event) => receiver.runtime_error(event),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::ProtocolError(_) => "protocol_error",
            Self::RuntimeError(_) => "runtime_error",
        }
    }
}

/// Observer of a running challenge.
///
/// Called from the runtime driving the challenge, never while SDK locks are
/// held. Exactly one of the terminal callbacks fires per challenge.
pub trait ChallengeStatusReceiver: Send + Sync {
    fn completed(&self, event: &CompletionEvent);

    fn cancelled(&self);

    fn timed_out(&self);

    fn protocol_error(&self, event: &ProtocolErrorEvent);

    fn runtime_error(&self, event: &RuntimeErrorEvent);

    /// A challenge screen is about to be handed to the presenter.
    fn challenge_will_present(&self, _response: &ChallengeResponse) {}
}
