//! EMV 3-D Secure 2 SDK transaction engine.
//!
//! [`ThreeDS2Service`] is initialized once with the directory server table
//! and hands out [`Transaction`]s. A transaction builds the AReq parameters
//! and, when the ARes asks for it, drives the encrypted CReq/CRes challenge
//! through caller-supplied [`ChallengeTransport`] and [`ChallengePresenter`]
//! implementations, reporting the outcome to a [`ChallengeStatusReceiver`].

pub mod challenge;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod service;
pub mod transaction;
pub mod transport;

pub use challenge::{ChallengeInput, ChallengeParameters, ChallengeState, ChallengeStateMachine};
pub use config::{DirectoryServerEntry, SdkConfig, MINIMUM_CHALLENGE_TIMEOUT};
pub use device::{DeviceInformationProvider, StaticDeviceInformation};
pub use error::{Result, SdkError};
pub use events::{
    ChallengeStatusReceiver, CompletionEvent, ProtocolErrorEvent, RuntimeErrorEvent,
    RuntimeErrorKind, StatusEvent,
};
pub use service::ThreeDS2Service;
pub use transaction::{Transaction, TransactionState};
pub use transport::{ChallengePresenter, ChallengeTransport, TransportError, TransportErrorKind};

pub use threeds2_crypto::{DirectoryServer, DirectoryServerKeys};
pub use threeds2_messages::{
    AuthenticationRequestParameters, AuthenticationResponse, ChallengeCancel, ChallengeResponse,
    ErrorCode, ErrorMessage, ProtocolVersion,
};
