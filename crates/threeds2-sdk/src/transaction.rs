//! One authentication attempt: AReq construction and the challenge driver.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use threeds2_crypto::{
    encrypt_with_certificate, ConcatKdfInfo, ContentEncryptionKey, DirectoryServer,
    DirectoryServerCertificate, DirectoryServerKeys, EllipticCurvePoint, EphemeralKeyPair,
    JsonWebSignature,
};
use threeds2_messages::{
    AuthenticationRequestParameters, ChallengeCancel, ChallengeRequestParameters, ProtocolVersion,
};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::challenge::{
    ChallengeParameters, ChallengeState, ChallengeStateMachine, Effect, Outbound, Transition,
};
use crate::config::MINIMUM_CHALLENGE_TIMEOUT;
use crate::error::{Result, SdkError};
use crate::events::{ChallengeStatusReceiver, RuntimeErrorEvent, RuntimeErrorKind, StatusEvent};
use crate::service::ServiceContext;
use crate::transport::{ChallengePresenter, ChallengeTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Created,
    ChallengeInProgress,
    Completed,
    Cancelled,
    TimedOut,
    Errored,
    Closed,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::TimedOut | Self::Errored | Self::Closed
        )
    }
}

impl From<ChallengeState> for TransactionState {
    fn from(state: ChallengeState) -> Self {
        match state {
            ChallengeState::Idle | ChallengeState::AwaitingResponse | ChallengeState::AwaitingInput => {
                Self::ChallengeInProgress
            }
            ChallengeState::Completed => Self::Completed,
            ChallengeState::Cancelled => Self::Cancelled,
            ChallengeState::TimedOut => Self::TimedOut,
            ChallengeState::Errored => Self::Errored,
        }
    }
}

/// A single 3DS2 authentication attempt.
///
/// Cloning yields another handle to the same transaction, e.g. for a UI
/// thread that needs to cancel. Calls must still be serialized by the caller.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    sdk_transaction_id: String,
    directory_server: DirectoryServer,
    keys: Arc<DirectoryServerKeys>,
    version: ProtocolVersion,
    context: Arc<ServiceContext>,
    ephemeral: Option<EphemeralKeyPair>,
    authentication_request_built: bool,
    /// Set when the challenge could not be set up from the ACS signed content.
    setup_failed: bool,
    closed: bool,
    session: Option<Arc<ChallengeSession>>,
}

impl Inner {
    fn state(&self) -> TransactionState {
        if self.closed {
            TransactionState::Closed
        } else if let Some(session) = &self.session {
            session.machine.lock().state().into()
        } else if self.setup_failed {
            TransactionState::Errored
        } else {
            TransactionState::Created
        }
    }

    fn ensure_created(&self, operation: &str) -> Result<()> {
        match self.state() {
            TransactionState::Created => Ok(()),
            state => Err(SdkError::invalid_state(format!(
                "cannot {operation} in state {state:?}"
            ))),
        }
    }

    /// Verify the ACS signed content and derive the challenge CEK.
    fn key_agreement(
        &self,
        parameters: &ChallengeParameters,
    ) -> std::result::Result<(String, ContentEncryptionKey), RuntimeErrorEvent> {
        let signature_error =
            |message: String| RuntimeErrorEvent::new(RuntimeErrorKind::SignatureVerification, message);

        let ephemeral = self.ephemeral.as_ref().ok_or_else(|| {
            RuntimeErrorEvent::new(RuntimeErrorKind::KeyAgreement, "key material released")
        })?;
        let jws = JsonWebSignature::parse(&parameters.acs_signed_content, false)
            .map_err(|e| signature_error(e.to_string()))?;
        let verified =
            DirectoryServerCertificate::verify_signature(&jws, &self.keys.root_certificates)
                .map_err(|e| signature_error(e.to_string()))?;
        if !verified {
            return Err(signature_error(
                "ACS signed content is not trusted by the directory server roots".to_string(),
            ));
        }

        let payload = jws
            .payload_json()
            .map_err(|e| RuntimeErrorEvent::new(RuntimeErrorKind::Decoding, e.to_string()))?;
        let acs_url = payload
            .get("acsURL")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                RuntimeErrorEvent::new(RuntimeErrorKind::Decoding, "signed content has no acsURL")
            })?
            .to_string();
        let acs_public_key = payload
            .get("acsEphemPubKey")
            .ok_or_else(|| {
                RuntimeErrorEvent::new(
                    RuntimeErrorKind::Decoding,
                    "signed content has no acsEphemPubKey",
                )
            })
            .and_then(|jwk| {
                EllipticCurvePoint::from_jwk(jwk).map_err(|e| {
                    RuntimeErrorEvent::new(RuntimeErrorKind::KeyAgreement, e.to_string())
                })
            })?;
        if let Some(echoed) = payload.get("sdkEphemPubKey") {
            let matches = EllipticCurvePoint::from_jwk(echoed)
                .map(|point| &point == ephemeral.public_key_point())
                .unwrap_or(false);
            if !matches {
                return Err(RuntimeErrorEvent::new(
                    RuntimeErrorKind::KeyAgreement,
                    "signed content echoes a different SDK key",
                ));
            }
        }

        let content_encryption_key = ephemeral
            .derive_shared_secret(&acs_public_key)
            .and_then(|secret| {
                secret.derive_content_encryption_key(&ConcatKdfInfo::for_challenge(
                    &self.sdk_transaction_id,
                    &parameters.acs_transaction_id,
                ))
            })
            .map_err(|e| RuntimeErrorEvent::new(RuntimeErrorKind::KeyAgreement, e.to_string()))?;
        Ok((acs_url, content_encryption_key))
    }
}

impl Transaction {
    pub(crate) fn new(
        context: Arc<ServiceContext>,
        directory_server: DirectoryServer,
        keys: Arc<DirectoryServerKeys>,
        version: ProtocolVersion,
    ) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate()?;
        let sdk_transaction_id = Uuid::new_v4().to_string();
        info!(
            sdk_transaction_id = %sdk_transaction_id,
            directory_server = %directory_server,
            version = %version,
            "transaction created"
        );
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                sdk_transaction_id,
                directory_server,
                keys,
                version,
                context,
                ephemeral: Some(ephemeral),
                authentication_request_built: false,
                setup_failed: false,
                closed: false,
                session: None,
            })),
        })
    }

    pub fn sdk_transaction_id(&self) -> String {
        self.inner.lock().sdk_transaction_id.clone()
    }

    pub fn directory_server(&self) -> DirectoryServer {
        self.inner.lock().directory_server.clone()
    }

    pub fn message_version(&self) -> ProtocolVersion {
        self.inner.lock().version
    }

    pub fn state(&self) -> TransactionState {
        self.inner.lock().state()
    }

    /// Public half of the ephemeral key pair, until the challenge derives
    /// its CEK or the transaction is closed.
    pub fn sdk_ephemeral_public_key(&self) -> Option<Value> {
        self.inner
            .lock()
            .ephemeral
            .as_ref()
            .map(EphemeralKeyPair::public_key_jwk)
    }

    /// Whether the ephemeral private key or a challenge CEK is still held.
    ///
    /// The ephemeral key is dropped once the CEK is derived, and the CEK
    /// once the challenge reaches a terminal state.
    pub fn holds_key_material(&self) -> bool {
        let inner = self.inner.lock();
        inner.ephemeral.is_some()
            || inner
                .session
                .as_ref()
                .is_some_and(|session| session.machine.lock().holds_key_material())
    }

    /// Build the SDK part of the AReq.
    ///
    /// Device information is encrypted for the directory server; an empty
    /// map omits `sdkEncData`. Valid once, before a challenge starts.
    pub fn build_authentication_request_parameters(&self) -> Result<AuthenticationRequestParameters> {
        let mut inner = self.inner.lock();
        inner.ensure_created("build authentication request parameters")?;
        if inner.authentication_request_built {
            return Err(SdkError::invalid_state(
                "authentication request parameters were already built",
            ));
        }
        let public_key = inner
            .ephemeral
            .as_ref()
            .map(EphemeralKeyPair::public_key_jwk)
            .ok_or_else(|| SdkError::invalid_state("key material released"))?;

        let device_information = inner.context.device_information.device_information();
        let device_data = if device_information.is_empty() {
            None
        } else {
            Some(encrypt_with_certificate(
                &Value::Object(device_information),
                &inner.keys.certificate,
                inner.directory_server.directory_server_id(),
                inner.keys.key_id.as_deref(),
            )?)
        };

        let parameters = AuthenticationRequestParameters::new(
            &inner.sdk_transaction_id,
            &inner.context.sdk_app_id,
            &inner.context.sdk_reference_number,
            public_key,
            device_data,
            inner.version,
        );
        inner.authentication_request_built = true;
        debug!(
            sdk_transaction_id = %inner.sdk_transaction_id,
            device_data = parameters.device_data().is_some(),
            "authentication request parameters built"
        );
        Ok(parameters)
    }

    /// Start the challenge described by an ARes.
    ///
    /// Must be called from within a tokio runtime; the rounds run on it in
    /// the background and end with exactly one callback on `receiver`.
    ///
    /// # Errors
    /// - `InvalidInput` if `timeout` is under five minutes or `parameters`
    ///   is incomplete, checked before anything else happens
    /// - `InvalidState` if the transaction is not in `Created` or no runtime
    ///   is available
    ///
    /// A signed content that does not verify is not an error here: it is
    /// reported to `receiver` as a runtime error and the transaction ends
    /// in `Errored`.
    pub fn begin_challenge(
        &self,
        parameters: ChallengeParameters,
        transport: Arc<dyn ChallengeTransport>,
        presenter: Arc<dyn ChallengePresenter>,
        receiver: Arc<dyn ChallengeStatusReceiver>,
        timeout: Duration,
    ) -> Result<()> {
        if timeout < MINIMUM_CHALLENGE_TIMEOUT {
            return Err(SdkError::invalid_input(format!(
                "challenge timeout must be at least {} seconds",
                MINIMUM_CHALLENGE_TIMEOUT.as_secs()
            )));
        }
        parameters.validate()?;

        let mut inner = self.inner.lock();
        inner.ensure_created("begin a challenge")?;
        let runtime = Handle::try_current()
            .map_err(|_| SdkError::invalid_state("a challenge needs a running tokio runtime"))?;

        let agreed = inner.key_agreement(&parameters);
        inner.ephemeral = None;
        let (acs_url, content_encryption_key) = match agreed {
            Ok(agreed) => agreed,
            Err(event) => {
                warn!(
                    sdk_transaction_id = %inner.sdk_transaction_id,
                    error = %event,
                    "challenge setup failed"
                );
                inner.setup_failed = true;
                drop(inner);
                receiver.runtime_error(&event);
                return Ok(());
            }
        };

        let request = ChallengeRequestParameters::new(
            &parameters.three_ds_server_transaction_id,
            &parameters.acs_transaction_id,
            inner.version.as_str(),
            &inner.sdk_transaction_id,
        )
        .with_requestor_app_url(parameters.requestor_app_url.clone());
        let mut machine = ChallengeStateMachine::new(content_encryption_key, request, inner.version);
        let first = machine.start();

        let session = Arc::new(ChallengeSession {
            machine: Mutex::new(machine),
            acs_url,
            transport,
            presenter,
            receiver,
            runtime,
            finished: Notify::new(),
            tasks: Mutex::new(Vec::new()),
        });
        inner.session = Some(Arc::clone(&session));
        info!(
            sdk_transaction_id = %inner.sdk_transaction_id,
            acs_transaction_id = %parameters.acs_transaction_id,
            timeout_secs = timeout.as_secs(),
            "challenge started"
        );
        drop(inner);

        session.start_timer(timeout);
        session.spawn(first);
        Ok(())
    }

    /// Cancel the running challenge.
    ///
    /// The final CReq is handed to the transport and the receiver is
    /// notified before this returns. A response still in flight is
    /// discarded when it arrives. If the challenge ends on its own first,
    /// this is a no-op.
    pub fn cancel(&self, reason: ChallengeCancel) -> Result<()> {
        let inner = self.inner.lock();
        let state = inner.state();
        let session = match (&inner.session, state) {
            (Some(session), TransactionState::ChallengeInProgress) => Arc::clone(session),
            _ => {
                return Err(SdkError::invalid_state(format!(
                    "cannot cancel in state {state:?}"
                )))
            }
        };
        drop(inner);

        let transition = session.machine.lock().cancel(reason);
        session.conclude(transition);
        Ok(())
    }

    /// Release key material and stop any background work.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SdkError::invalid_state("transaction is already closed"));
        }
        inner.closed = true;
        inner.ephemeral = None;
        if let Some(session) = inner.session.take() {
            session.abort();
        }
        info!(sdk_transaction_id = %inner.sdk_transaction_id, "transaction closed");
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Transaction")
            .field("sdk_transaction_id", &inner.sdk_transaction_id)
            .field("directory_server", &inner.directory_server)
            .field("version", &inner.version)
            .field("state", &inner.state())
            .finish()
    }
}

/// A running challenge and the collaborators that serve it.
struct ChallengeSession {
    machine: Mutex<ChallengeStateMachine>,
    acs_url: String,
    transport: Arc<dyn ChallengeTransport>,
    presenter: Arc<dyn ChallengePresenter>,
    receiver: Arc<dyn ChallengeStatusReceiver>,
    runtime: Handle,
    /// Signalled once the terminal callback has been dispatched.
    finished: Notify,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChallengeSession {
    fn spawn(self: &Arc<Self>, transition: Transition) {
        let task = self.runtime.spawn(drive(Arc::clone(self), transition));
        self.tasks.lock().push(task);
    }

    fn start_timer(self: &Arc<Self>, timeout: Duration) {
        let session = Arc::clone(self);
        let task = self.runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    let transition = session.machine.lock().handle_timeout();
                    if !transition.is_ignored() {
                        debug!(timeout_secs = timeout.as_secs(), "challenge timer fired");
                        drive(Arc::clone(&session), transition).await;
                    }
                }
                _ = session.finished.notified() => {}
            }
        });
        self.tasks.lock().push(task);
    }

    /// Carry out a transition that waits on nothing: the message goes to
    /// the transport and the outcome is dispatched right away.
    fn conclude(&self, transition: Transition) {
        let Transition { outbound, effect } = transition;
        if let Some(outbound) = outbound {
            self.hand_off(outbound);
        }
        if let Effect::Notify(event) = effect {
            self.notify(&event);
        }
    }

    /// Send a message the ACS does not answer without waiting for delivery.
    fn hand_off(&self, outbound: Outbound) {
        let transport = Arc::clone(&self.transport);
        let acs_url = self.acs_url.clone();
        self.runtime.spawn(async move {
            if let Err(error) = transport.send(&acs_url, outbound.body).await {
                warn!(kind = ?outbound.kind, %error, "could not notify the ACS");
            }
        });
    }

    fn notify(&self, event: &StatusEvent) {
        debug!(event = event.name(), "dispatching challenge outcome");
        event.dispatch(self.receiver.as_ref());
        self.finished.notify_one();
    }

    fn abort(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Carry out transitions until the machine has nothing more to do.
///
/// The machine lock is only taken between awaits. Only CReqs that expect a
/// CRes are awaited; final CReqs and `Erro` messages are handed off so the
/// outcome is dispatched in the same step as the transition that made it.
async fn drive(session: Arc<ChallengeSession>, mut transition: Transition) {
    loop {
        let Transition { outbound, effect } = transition;
        let mut next = None;

        if let Some(outbound) = outbound {
            if outbound.expects_response() {
                let result = session.transport.send(&session.acs_url, outbound.body).await;
                let follow_up = {
                    let mut machine = session.machine.lock();
                    match result {
                        Ok(body) => machine.handle_response(&body),
                        Err(error) => machine.handle_transport_error(&error),
                    }
                };
                next = Some(follow_up);
            } else {
                session.hand_off(outbound);
            }
        }

        match effect {
            Effect::None => {}
            Effect::Present(response) => {
                session.receiver.challenge_will_present(&response);
                let input = session.presenter.present(&response).await;
                let follow_up = session.machine.lock().handle_input(input);
                next = Some(follow_up);
            }
            Effect::Notify(event) => session.notify(&event),
        }

        match next {
            Some(follow_up) if !follow_up.is_ignored() => transition = follow_up,
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_states_map_onto_transaction_states() {
        assert_eq!(
            TransactionState::from(ChallengeState::AwaitingInput),
            TransactionState::ChallengeInProgress
        );
        assert_eq!(
            TransactionState::from(ChallengeState::TimedOut),
            TransactionState::TimedOut
        );
        assert!(TransactionState::Closed.is_terminal());
        assert!(!TransactionState::Created.is_terminal());
    }
}
