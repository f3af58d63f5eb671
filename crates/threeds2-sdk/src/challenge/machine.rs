//! The CReq/CRes exchange as a pure state machine.
//!
//! Every entry point performs one transition and returns what the driver has
//! to do next: at most one message to send and at most one effect. The
//! machine never touches the network, the clock or the UI, so the whole
//! transition table is testable without a transport.

use serde_json::Value;
use threeds2_crypto::{decrypt, encrypt_direct, ContentEncryptionKey, CryptoError};
use threeds2_messages::{
    ChallengeCancel, ChallengeRequestParameters, ChallengeResponse, ErrorCode, ErrorMessage,
    MessageError, ProtocolVersion,
};
use tracing::{debug, info, warn};

use super::ChallengeInput;
use crate::events::{
    CompletionEvent, ProtocolErrorEvent, RuntimeErrorEvent, RuntimeErrorKind, StatusEvent,
};
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeState {
    Idle,
    /// A CReq is in flight.
    AwaitingResponse,
    /// A challenge screen is with the cardholder.
    AwaitingInput,
    Completed,
    Cancelled,
    TimedOut,
    Errored,
}

impl ChallengeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::TimedOut | Self::Errored
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundKind {
    /// A CReq for round `counter`. The ACS answers it.
    Request { counter: u8 },
    /// The closing CReq carrying a cancel indicator. Not answered.
    FinalRequest(ChallengeCancel),
    /// A locally raised `Erro`. Not answered.
    Error(ErrorCode),
}

/// An encoded message for the ACS.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub kind: OutboundKind,
    pub body: Vec<u8>,
}

impl Outbound {
    pub fn expects_response(&self) -> bool {
        matches!(self.kind, OutboundKind::Request { .. })
    }
}

#[derive(Debug, Clone)]
pub enum Effect {
    None,
    /// Hand this screen to the presenter.
    Present(Box<ChallengeResponse>),
    /// The challenge reached a terminal state.
    Notify(StatusEvent),
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub outbound: Option<Outbound>,
    pub effect: Effect,
}

impl Transition {
    fn ignored() -> Self {
        Self {
            outbound: None,
            effect: Effect::None,
        }
    }

    fn send(outbound: Outbound) -> Self {
        Self {
            outbound: Some(outbound),
            effect: Effect::None,
        }
    }

    fn notify(event: StatusEvent) -> Self {
        Self {
            outbound: None,
            effect: Effect::Notify(event),
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.outbound.is_none() && matches!(self.effect, Effect::None)
    }

    /// The terminal event, if this transition produced one.
    pub fn status_event(&self) -> Option<&StatusEvent> {
        match &self.effect {
            Effect::Notify(event) => Some(event),
            _ => None,
        }
    }
}

/// Round-by-round challenge state for one transaction.
///
/// The CEK is dropped once a terminal state is reached.
pub struct ChallengeStateMachine {
    state: ChallengeState,
    content_encryption_key: Option<ContentEncryptionKey>,
    request: ChallengeRequestParameters,
    version: ProtocolVersion,
}

impl ChallengeStateMachine {
    /// `request` is the first CReq (counter `000`).
    pub fn new(
        content_encryption_key: ContentEncryptionKey,
        request: ChallengeRequestParameters,
        version: ProtocolVersion,
    ) -> Self {
        Self {
            state: ChallengeState::Idle,
            content_encryption_key: Some(content_encryption_key),
            request,
            version,
        }
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn current_request(&self) -> &ChallengeRequestParameters {
        &self.request
    }

    pub fn sdk_transaction_id(&self) -> &str {
        self.request.sdk_transaction_id()
    }

    pub fn holds_key_material(&self) -> bool {
        self.content_encryption_key.is_some()
    }

    /// Send the first CReq.
    pub fn start(&mut self) -> Transition {
        if self.state != ChallengeState::Idle {
            debug!(state = ?self.state, "challenge already started");
            return Transition::ignored();
        }
        self.send_current()
    }

    /// Classify and act on the raw bytes the ACS answered with.
    pub fn handle_response(&mut self, body: &[u8]) -> Transition {
        if self.state != ChallengeState::AwaitingResponse {
            debug!(
                sdk_transaction_id = %self.sdk_transaction_id(),
                state = ?self.state,
                "discarding late response"
            );
            return Transition::ignored();
        }

        if let Ok(json) = serde_json::from_slice::<Value>(body) {
            if ErrorMessage::is_error_message(&json) {
                return self.received_error_message(&json);
            }
        }

        let decrypted = std::str::from_utf8(body)
            .ok()
            .map(str::trim)
            .zip(self.content_encryption_key.as_ref())
            .ok_or(CryptoError::DecryptionFailed)
            .and_then(|(compact, key)| decrypt(compact, key.as_bytes()));
        let json = match decrypted {
            Ok(json) => json,
            Err(_) => {
                warn!(sdk_transaction_id = %self.sdk_transaction_id(), "CRes decryption failed");
                let error = ErrorMessage::for_request(
                    &self.request,
                    ErrorCode::DecryptionFailure,
                    "CRes could not be decrypted",
                );
                let outbound = self.encode_error(&error);
                return self.terminate(
                    ChallengeState::Errored,
                    outbound,
                    StatusEvent::RuntimeError(RuntimeErrorEvent::new(
                        RuntimeErrorKind::Decryption,
                        "CRes could not be decrypted",
                    )),
                );
            }
        };

        if ErrorMessage::is_error_message(&json) {
            return self.received_error_message(&json);
        }

        let response = match ChallengeResponse::from_json(&json)
            .and_then(|response| response.validate_against(&self.request).map(|()| response))
        {
            Ok(response) => response,
            Err(error) => return self.violation(&error),
        };

        if response.challenge_completed {
            let transaction_status = response.transaction_status.clone().unwrap_or_default();
            info!(
                sdk_transaction_id = %self.sdk_transaction_id(),
                round = self.request.sdk_counter(),
                %transaction_status,
                "challenge completed"
            );
            let event = StatusEvent::Completed(CompletionEvent {
                sdk_transaction_id: self.sdk_transaction_id().to_string(),
                transaction_status,
            });
            return self.terminate(ChallengeState::Completed, None, event);
        }

        debug!(
            sdk_transaction_id = %self.sdk_transaction_id(),
            round = self.request.sdk_counter(),
            ui_type = ?response.ui_type,
            "presenting challenge"
        );
        self.state = ChallengeState::AwaitingInput;
        Transition {
            outbound: None,
            effect: Effect::Present(Box::new(response)),
        }
    }

    /// Build and send the next round from the cardholder's input.
    pub fn handle_input(&mut self, input: ChallengeInput) -> Transition {
        if self.state != ChallengeState::AwaitingInput {
            debug!(state = ?self.state, "discarding challenge input");
            return Transition::ignored();
        }
        if input == ChallengeInput::Cancel {
            return self.cancel(ChallengeCancel::CardholderSelectedCancel);
        }
        let mut next = match self.request.next_round() {
            Ok(next) => next,
            Err(error) => {
                return self.terminate(
                    ChallengeState::Errored,
                    None,
                    StatusEvent::RuntimeError(RuntimeErrorEvent::new(
                        RuntimeErrorKind::Encoding,
                        error.to_string(),
                    )),
                );
            }
        };
        input.apply(&mut next, self.version);
        self.request = next;
        self.send_current()
    }

    /// Close the challenge with a final CReq carrying `reason`.
    ///
    /// `TransactionTimedOut` ends in `TimedOut`; the other reasons end in
    /// `Cancelled`.
    pub fn cancel(&mut self, reason: ChallengeCancel) -> Transition {
        if !matches!(
            self.state,
            ChallengeState::AwaitingResponse | ChallengeState::AwaitingInput
        ) {
            debug!(state = ?self.state, reason = reason.code(), "nothing to cancel");
            return Transition::ignored();
        }
        let mut last = self
            .request
            .next_round()
            .unwrap_or_else(|_| self.request.clone());
        last.set_cancel(reason);
        let outbound = match self.encode_request(&last) {
            Ok(body) => Some(Outbound {
                kind: OutboundKind::FinalRequest(reason),
                body,
            }),
            Err(message) => {
                warn!(%message, "final CReq not sent");
                None
            }
        };
        self.request = last;
        let (state, event) = match reason {
            ChallengeCancel::TransactionTimedOut => (ChallengeState::TimedOut, StatusEvent::TimedOut),
            _ => (ChallengeState::Cancelled, StatusEvent::Cancelled),
        };
        info!(
            sdk_transaction_id = %self.sdk_transaction_id(),
            reason = reason.code(),
            "challenge cancelled"
        );
        self.terminate(state, outbound, event)
    }

    /// The challenge timer fired.
    pub fn handle_timeout(&mut self) -> Transition {
        self.cancel(ChallengeCancel::TransactionTimedOut)
    }

    /// The transport failed to deliver a CReq or to return its answer.
    pub fn handle_transport_error(&mut self, error: &TransportError) -> Transition {
        if self.state != ChallengeState::AwaitingResponse {
            debug!(state = ?self.state, "discarding late transport error");
            return Transition::ignored();
        }
        warn!(sdk_transaction_id = %self.sdk_transaction_id(), %error, "challenge transport failed");
        self.terminate(
            ChallengeState::Errored,
            None,
            StatusEvent::RuntimeError(RuntimeErrorEvent::new(
                RuntimeErrorKind::Transport,
                error.to_string(),
            )),
        )
    }

    fn send_current(&mut self) -> Transition {
        match self.encode_request(&self.request) {
            Ok(body) => {
                self.state = ChallengeState::AwaitingResponse;
                debug!(
                    sdk_transaction_id = %self.sdk_transaction_id(),
                    round = self.request.sdk_counter(),
                    "sending CReq"
                );
                Transition::send(Outbound {
                    kind: OutboundKind::Request {
                        counter: self.request.sdk_counter(),
                    },
                    body,
                })
            }
            Err(message) => self.terminate(
                ChallengeState::Errored,
                None,
                StatusEvent::RuntimeError(RuntimeErrorEvent::new(RuntimeErrorKind::Encoding, message)),
            ),
        }
    }

    fn received_error_message(&mut self, json: &Value) -> Transition {
        match ErrorMessage::from_json(json) {
            Ok(error_message) => {
                warn!(
                    sdk_transaction_id = %self.sdk_transaction_id(),
                    error_code = %error_message.error_code,
                    "ACS reported an error"
                );
                let event = StatusEvent::ProtocolError(ProtocolErrorEvent {
                    sdk_transaction_id: self.sdk_transaction_id().to_string(),
                    error_message,
                });
                self.terminate(ChallengeState::Errored, None, event)
            }
            Err(error) => self.terminate(
                ChallengeState::Errored,
                None,
                StatusEvent::RuntimeError(RuntimeErrorEvent::new(
                    RuntimeErrorKind::Decoding,
                    format!("malformed Erro: {error}"),
                )),
            ),
        }
    }

    /// A CRes that could not be accepted. Coded violations are reported to
    /// the ACS and the receiver as protocol errors; the rest are local.
    fn violation(&mut self, error: &MessageError) -> Transition {
        match ErrorMessage::for_violation(error, &self.request) {
            Some(error_message) => {
                warn!(
                    sdk_transaction_id = %self.sdk_transaction_id(),
                    error_code = %error_message.error_code,
                    "CRes rejected"
                );
                let outbound = self.encode_error(&error_message);
                let event = StatusEvent::ProtocolError(ProtocolErrorEvent {
                    sdk_transaction_id: self.sdk_transaction_id().to_string(),
                    error_message,
                });
                self.terminate(ChallengeState::Errored, outbound, event)
            }
            None => {
                let kind = match error {
                    MessageError::UnexpectedMessageType { .. } => RuntimeErrorKind::UnexpectedMessage,
                    _ => RuntimeErrorKind::Decoding,
                };
                self.terminate(
                    ChallengeState::Errored,
                    None,
                    StatusEvent::RuntimeError(RuntimeErrorEvent::new(kind, error.to_string())),
                )
            }
        }
    }

    fn terminate(
        &mut self,
        state: ChallengeState,
        outbound: Option<Outbound>,
        event: StatusEvent,
    ) -> Transition {
        debug!(from = ?self.state, to = ?state, event = event.name(), "challenge finished");
        self.state = state;
        self.content_encryption_key = None;
        Transition {
            outbound,
            ..Transition::notify(event)
        }
    }

    fn encode_request(&self, request: &ChallengeRequestParameters) -> Result<Vec<u8>, String> {
        let key = self
            .content_encryption_key
            .as_ref()
            .ok_or_else(|| "content encryption key released".to_string())?;
        let json = request.to_json().map_err(|e| e.to_string())?;
        encrypt_direct(
            &json,
            key.as_bytes(),
            request.acs_transaction_id(),
        )
        .map(String::into_bytes)
        .map_err(|e| e.to_string())
    }

    fn encode_error(&self, error: &ErrorMessage) -> Option<Outbound> {
        let code = error.code()?;
        match serde_json::to_vec(&error.to_json()) {
            Ok(body) => Some(Outbound {
                kind: OutboundKind::Error(code),
                body,
            }),
            Err(e) => {
                warn!(error = %e, "Erro not sent");
                None
            }
        }
    }
}

impl std::fmt::Debug for ChallengeStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeStateMachine")
            .field("state", &self.state)
            .field("round", &self.request.sdk_counter())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
