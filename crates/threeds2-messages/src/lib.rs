//! EMV 3-D Secure 2 message value objects.
//!
//! Decoders validate as they go and report violations as [`MessageError`],
//! whose [`error_code`](MessageError::error_code) tells a protocol violation
//! apart from a local decoding problem.

pub mod authentication;
pub mod challenge_request;
pub mod challenge_response;
pub mod error;
pub mod error_message;
pub mod extension;
mod fields;
pub mod ui;
pub mod version;

pub use authentication::{AuthenticationRequestParameters, AuthenticationResponse, TransactionStatus};
pub use challenge_request::{ChallengeCancel, ChallengeRequestParameters};
pub use challenge_response::ChallengeResponse;
pub use error::MessageError;
pub use error_message::{ErrorCode, ErrorComponent, ErrorMessage};
pub use extension::MessageExtension;
pub use ui::{Image, ImageDensity, SelectOption, UiType};
pub use version::ProtocolVersion;
