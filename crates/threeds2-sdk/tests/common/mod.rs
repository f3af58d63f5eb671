//! Shared fixtures: an initialized service, a scripted ACS, a scripted
//! cardholder and a recording status receiver.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use threeds2_crypto::testing::{self, TestAcs};
use threeds2_crypto::ContentEncryptionKey;
use threeds2_sdk::{
    ChallengeInput, ChallengeParameters, ChallengePresenter, ChallengeResponse,
    ChallengeStatusReceiver, ChallengeTransport, CompletionEvent, DirectoryServer,
    DirectoryServerEntry, ProtocolErrorEvent, ProtocolVersion, RuntimeErrorEvent, SdkConfig,
    StaticDeviceInformation, StatusEvent, ThreeDS2Service, Transaction, TransportError,
};
use tokio::sync::Notify;

pub const SERVER_ID: &str = "8a880dc0-d2d2-4067-bcb1-b08d1690b26e";
pub const ACS_ID: &str = "d7c1ee99-9478-44a6-b1f2-391e29c6b340";
pub const ACS_URL: &str = "https://acs.example.com/challenge";
pub const TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Service
// ============================================================================

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> SdkConfig {
    let roots = vec![
        testing::ROOT_CA_PEM.to_string(),
        testing::EC_ROOT_CA_PEM.to_string(),
    ];
    SdkConfig::new("3DS_LOA_SDK_TEST_020200_00001")
        .with_directory_server(DirectoryServerEntry {
            id: DirectoryServer::UlTestRsa.directory_server_id().to_string(),
            certificate: testing::DS_RSA_CERT_PEM.to_string(),
            root_certificates: roots.clone(),
            key_id: Some(testing::DS_RSA_KEY_ID.to_string()),
        })
        .with_directory_server(DirectoryServerEntry {
            id: DirectoryServer::UlTestEc.directory_server_id().to_string(),
            certificate: testing::DS_EC_CERT_PEM.to_string(),
            root_certificates: roots,
            key_id: None,
        })
}

pub fn service_with_device(device: Value) -> ThreeDS2Service {
    init_tracing();
    let service = ThreeDS2Service::new();
    service
        .initialize(config(), Arc::new(StaticDeviceInformation::from_json(device)))
        .expect("service initializes");
    service
}

pub fn service() -> ThreeDS2Service {
    service_with_device(json!({"DV": "1.0", "DD": {"C001": "Android"}}))
}

// ============================================================================
// Challenge setup
// ============================================================================

/// A transaction that has sent its AReq, and the ACS that answers it.
pub struct Challenge {
    pub transaction: Transaction,
    pub acs: Arc<ScriptedAcs>,
    pub presenter: Arc<ScriptedCardholder>,
    pub receiver: Arc<Recorder>,
    pub parameters: ChallengeParameters,
}

impl Challenge {
    /// A 2.2.0 transaction against the RSA test DS.
    pub fn new(service: &ThreeDS2Service, inputs: Vec<ChallengeInput>) -> Self {
        let transaction = service
            .create_transaction(&DirectoryServer::UlTestRsa, ProtocolVersion::V2_2_0)
            .expect("transaction");
        Self::for_transaction(transaction, inputs)
    }

    pub fn for_transaction(transaction: Transaction, inputs: Vec<ChallengeInput>) -> Self {
        let areq = transaction
            .build_authentication_request_parameters()
            .expect("AReq");
        let sdk_key = areq.sdk_ephemeral_public_key().clone();
        let test_acs = TestAcs::new(ACS_ID);
        let signed_content = test_acs.signed_content(ACS_URL, &sdk_key);
        let cek = test_acs.content_encryption_key(&sdk_key, areq.sdk_transaction_id());
        Self {
            transaction,
            acs: Arc::new(ScriptedAcs::new(test_acs, cek, areq.sdk_transaction_id())),
            presenter: Arc::new(ScriptedCardholder::new(inputs)),
            receiver: Arc::new(Recorder::default()),
            parameters: ChallengeParameters::new(SERVER_ID, ACS_ID, signed_content),
        }
    }

    pub fn begin(&self) -> threeds2_sdk::Result<()> {
        self.begin_with_timeout(TIMEOUT)
    }

    pub fn begin_with_timeout(&self, timeout: Duration) -> threeds2_sdk::Result<()> {
        self.transaction.begin_challenge(
            self.parameters.clone(),
            self.acs.clone(),
            self.presenter.clone(),
            self.receiver.clone(),
            timeout,
        )
    }

    pub fn cres(&self, counter: &str) -> Value {
        self.acs.text_cres(counter)
    }
}

// ============================================================================
// ACS
// ============================================================================

pub enum Reply {
    /// Sealed with the challenge key.
    Cres(Value),
    /// Sent unencrypted.
    Plain(Value),
    Raw(Vec<u8>),
    Fail(TransportError),
    /// Wait for the signal, then answer with the sealed message.
    Hold(Arc<Notify>, Value),
    /// Never answer.
    Silent,
}

#[derive(Debug, Clone)]
pub enum Received {
    Request(Value),
    Error(Value),
}

pub struct ScriptedAcs {
    acs: TestAcs,
    cek: ContentEncryptionKey,
    sdk_transaction_id: String,
    replies: Mutex<VecDeque<Reply>>,
    received: Mutex<Vec<Received>>,
    stalled: Mutex<bool>,
    pub request_arrived: Notify,
}

impl ScriptedAcs {
    fn new(acs: TestAcs, cek: ContentEncryptionKey, sdk_transaction_id: &str) -> Self {
        Self {
            acs,
            cek,
            sdk_transaction_id: sdk_transaction_id.to_string(),
            replies: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
            stalled: Mutex::new(false),
            request_arrived: Notify::new(),
        }
    }

    /// Queue answers to the next CReqs, in order.
    pub fn push_replies(&self, replies: Vec<Reply>) {
        self.replies.lock().extend(replies);
    }

    /// Never complete delivery of messages that get no answer (final CReqs
    /// and `Erro`), as with an ACS that has stopped responding.
    pub fn stall_unanswered(&self) {
        *self.stalled.lock() = true;
    }

    async fn unanswered(&self) -> Result<Vec<u8>, TransportError> {
        let stalled = *self.stalled.lock();
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(Vec::new())
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().clone()
    }

    pub fn requests(&self) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter_map(|message| match message {
                Received::Request(json) => Some(json),
                Received::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter_map(|message| match message {
                Received::Error(json) => Some(json),
                Received::Request(_) => None,
            })
            .collect()
    }

    pub fn seal(&self, json: &Value) -> Vec<u8> {
        self.acs.seal(json, &self.cek).into_bytes()
    }

    pub fn text_cres(&self, counter: &str) -> Value {
        json!({
            "messageType": "CRes",
            "messageVersion": "2.2.0",
            "threeDSServerTransID": SERVER_ID,
            "acsTransID": ACS_ID,
            "sdkTransID": self.sdk_transaction_id,
            "acsCounterAtoS": counter,
            "challengeCompletionInd": "N",
            "acsUiType": "01",
            "challengeInfoHeader": "Verify your purchase",
            "challengeInfoText": "Enter the code sent to ***-1234",
            "submitAuthenticationLabel": "Submit",
            "resendInformationLabel": "Send a new code"
        })
    }

    pub fn final_cres(&self, counter: &str, status: &str) -> Value {
        json!({
            "messageType": "CRes",
            "messageVersion": "2.2.0",
            "threeDSServerTransID": SERVER_ID,
            "acsTransID": ACS_ID,
            "sdkTransID": self.sdk_transaction_id,
            "acsCounterAtoS": counter,
            "challengeCompletionInd": "Y",
            "transStatus": status
        })
    }
}

#[async_trait]
impl ChallengeTransport for ScriptedAcs {
    async fn send(&self, acs_url: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        assert_eq!(acs_url, ACS_URL);
        if let Ok(json) = serde_json::from_slice::<Value>(&body) {
            self.received.lock().push(Received::Error(json));
            return self.unanswered().await;
        }
        let compact = String::from_utf8(body).expect("CReq is a compact JWE");
        let request = self.acs.open(&compact, &self.cek).expect("CReq decrypts");
        let is_final = request.get("challengeCancel").is_some();
        self.received.lock().push(Received::Request(request));
        self.request_arrived.notify_one();
        if is_final {
            return self.unanswered().await;
        }

        let reply = self.replies.lock().pop_front().unwrap_or(Reply::Silent);
        match reply {
            Reply::Cres(json) => Ok(self.seal(&json)),
            Reply::Plain(json) => Ok(serde_json::to_vec(&json).expect("plain reply")),
            Reply::Raw(bytes) => Ok(bytes),
            Reply::Fail(error) => Err(error),
            Reply::Hold(release, json) => {
                release.notified().await;
                Ok(self.seal(&json))
            }
            Reply::Silent => std::future::pending().await,
        }
    }
}

// ============================================================================
// Cardholder
// ============================================================================

pub struct ScriptedCardholder {
    inputs: Mutex<VecDeque<ChallengeInput>>,
    shown: Mutex<Vec<ChallengeResponse>>,
    pub presented: Notify,
}

impl ScriptedCardholder {
    fn new(inputs: Vec<ChallengeInput>) -> Self {
        Self {
            inputs: Mutex::new(inputs.into()),
            shown: Mutex::new(Vec::new()),
            presented: Notify::new(),
        }
    }

    pub fn shown(&self) -> Vec<ChallengeResponse> {
        self.shown.lock().clone()
    }
}

#[async_trait]
impl ChallengePresenter for ScriptedCardholder {
    async fn present(&self, response: &ChallengeResponse) -> ChallengeInput {
        self.shown.lock().push(response.clone());
        self.presented.notify_one();
        let input = self.inputs.lock().pop_front();
        match input {
            Some(input) => input,
            // Leave the screen up until the challenge is cancelled or closed.
            None => std::future::pending().await,
        }
    }
}

// ============================================================================
// Receiver
// ============================================================================

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<StatusEvent>>,
    will_present: Mutex<usize>,
    done: Notify,
}

impl Recorder {
    fn record(&self, event: StatusEvent) {
        self.events.lock().push(event);
        self.done.notify_one();
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }

    pub fn will_present_calls(&self) -> usize {
        *self.will_present.lock()
    }

    /// Wait for the first terminal callback.
    pub async fn outcome(&self) -> StatusEvent {
        loop {
            if let Some(event) = self.events.lock().first().cloned() {
                return event;
            }
            self.done.notified().await;
        }
    }
}

impl ChallengeStatusReceiver for Recorder {
    fn completed(&self, event: &CompletionEvent) {
        self.record(StatusEvent::Completed(event.clone()));
    }

    fn cancelled(&self) {
        self.record(StatusEvent::Cancelled);
    }

    fn timed_out(&self) {
        self.record(StatusEvent::TimedOut);
    }

    fn protocol_error(&self, event: &ProtocolErrorEvent) {
        self.record(StatusEvent::ProtocolError(event.clone()));
    }

    fn runtime_error(&self, event: &RuntimeErrorEvent) {
        self.record(StatusEvent::RuntimeError(event.clone()));
    }

    fn challenge_will_present(&self, _response: &ChallengeResponse) {
        *self.will_present.lock() += 1;
    }
}

/// Let spawned tasks run to quiescence.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
