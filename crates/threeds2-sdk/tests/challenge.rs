//! Challenge flows driven end to end against a scripted ACS.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use threeds2_crypto::testing;
use threeds2_sdk::{
    ChallengeCancel, ChallengeInput, CompletionEvent, DirectoryServer, DirectoryServerKeys,
    ProtocolVersion, RuntimeErrorKind, SdkError, StatusEvent, TransactionState, TransportError,
};
use tokio::sync::Notify;

use common::{settle, Challenge, Reply, ACS_ID};

fn runtime_error_kind(event: &StatusEvent) -> Option<RuntimeErrorKind> {
    match event {
        StatusEvent::RuntimeError(error) => Some(error.kind),
        _ => None,
    }
}

fn protocol_error_code(event: &StatusEvent) -> Option<String> {
    match event {
        StatusEvent::ProtocolError(error) => Some(error.error_code().to_string()),
        _ => None,
    }
}

// ============================================================================
// Completion
// ============================================================================

#[tokio::test]
async fn frictionless_after_one_text_round() {
    let service = common::service();
    let challenge = Challenge::new(&service, vec![ChallengeInput::Text("123456".into())]);
    let acs = &challenge.acs;
    challenge.acs.push_replies(vec![
        Reply::Cres(challenge.cres("000")),
        Reply::Cres(acs.final_cres("001", "Y")),
    ]);

    assert!(challenge.transaction.holds_key_material());
    challenge.begin().unwrap();
    let outcome = challenge.receiver.outcome().await;
    assert_eq!(
        outcome,
        StatusEvent::Completed(CompletionEvent {
            sdk_transaction_id: challenge.transaction.sdk_transaction_id(),
            transaction_status: "Y".into(),
        })
    );
    settle().await;

    assert_eq!(challenge.receiver.events().len(), 1);
    assert_eq!(challenge.receiver.will_present_calls(), 1);
    assert_eq!(challenge.transaction.state(), TransactionState::Completed);
    assert!(!challenge.transaction.holds_key_material());

    let requests = acs.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0]["sdkCounterStoA"], "000");
    assert_eq!(requests[0]["messageVersion"], "2.2.0");
    assert_eq!(requests[0]["sdkTransID"], challenge.transaction.sdk_transaction_id());
    assert_eq!(requests[1]["sdkCounterStoA"], "001");
    assert_eq!(requests[1]["challengeDataEntry"], "123456");
    assert!(acs.errors().is_empty());
}

#[tokio::test]
async fn multi_round_with_no_entry_and_resend() {
    let service = common::service();
    let challenge = Challenge::new(
        &service,
        vec![
            ChallengeInput::Text(String::new()),
            ChallengeInput::Resend,
            ChallengeInput::Text("654321".into()),
        ],
    );
    challenge.acs.push_replies(vec![
        Reply::Cres(challenge.cres("000")),
        Reply::Cres(challenge.cres("001")),
        Reply::Cres(challenge.cres("002")),
        Reply::Cres(challenge.acs.final_cres("003", "N")),
    ]);

    challenge.begin().unwrap();
    let outcome = challenge.receiver.outcome().await;
    assert!(matches!(
        outcome,
        StatusEvent::Completed(CompletionEvent { ref transaction_status, .. }) if transaction_status == "N"
    ));

    let requests = challenge.acs.requests();
    let counters: Vec<_> = requests.iter().map(|r| r["sdkCounterStoA"].clone()).collect();
    assert_eq!(counters, ["000", "001", "002", "003"]);
    assert_eq!(requests[1]["challengeNoEntry"], "Y");
    assert!(requests[1].get("challengeDataEntry").is_none());
    assert_eq!(requests[2]["resendChallenge"], "Y");
    assert_eq!(requests[3]["challengeDataEntry"], "654321");
    for request in &requests {
        assert_eq!(request["acsTransID"], ACS_ID);
    }
    assert_eq!(challenge.presenter.shown().len(), 3);
}

// ============================================================================
// Cancellation and timeout
// ============================================================================

#[tokio::test]
async fn cardholder_cancel_mid_challenge() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    challenge.acs.push_replies(vec![Reply::Cres(challenge.cres("000"))]);

    challenge.begin().unwrap();
    challenge.presenter.presented.notified().await;
    assert_eq!(challenge.transaction.state(), TransactionState::ChallengeInProgress);

    challenge
        .transaction
        .cancel(ChallengeCancel::CardholderSelectedCancel)
        .unwrap();
    assert_eq!(challenge.receiver.outcome().await, StatusEvent::Cancelled);
    settle().await;

    assert_eq!(challenge.receiver.events(), vec![StatusEvent::Cancelled]);
    let requests = challenge.acs.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1]["challengeCancel"], "01");
    assert_eq!(challenge.transaction.state(), TransactionState::Cancelled);

    assert!(matches!(
        challenge.transaction.cancel(ChallengeCancel::CardholderSelectedCancel),
        Err(SdkError::InvalidState(_))
    ));
    challenge.transaction.close().unwrap();
    assert_eq!(challenge.transaction.state(), TransactionState::Closed);
}

#[tokio::test]
async fn cancel_input_from_presenter() {
    let service = common::service();
    let challenge = Challenge::new(&service, vec![ChallengeInput::Cancel]);
    challenge.acs.push_replies(vec![Reply::Cres(challenge.cres("000"))]);

    challenge.begin().unwrap();
    assert_eq!(challenge.receiver.outcome().await, StatusEvent::Cancelled);
    settle().await;
    let requests = challenge.acs.requests();
    assert_eq!(requests.last().unwrap()["challengeCancel"], "01");
}

#[tokio::test]
async fn late_response_after_cancel_is_discarded() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    let release = Arc::new(Notify::new());
    challenge.acs.push_replies(vec![Reply::Hold(
        release.clone(),
        challenge.acs.final_cres("000", "Y"),
    )]);

    challenge.begin().unwrap();
    challenge.acs.request_arrived.notified().await;
    challenge
        .transaction
        .cancel(ChallengeCancel::CardholderSelectedCancel)
        .unwrap();
    assert_eq!(challenge.receiver.outcome().await, StatusEvent::Cancelled);

    release.notify_one();
    settle().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(challenge.receiver.events(), vec![StatusEvent::Cancelled]);
    assert_eq!(challenge.transaction.state(), TransactionState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn timer_cancels_with_04() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    challenge.acs.push_replies(vec![Reply::Silent]);

    challenge.begin().unwrap();
    assert_eq!(challenge.receiver.outcome().await, StatusEvent::TimedOut);
    settle().await;

    assert_eq!(challenge.receiver.events(), vec![StatusEvent::TimedOut]);
    assert_eq!(challenge.transaction.state(), TransactionState::TimedOut);
    let requests = challenge.acs.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1]["challengeCancel"], "04");
    assert_eq!(requests[1]["sdkCounterStoA"], "001");
}

#[tokio::test(start_paused = true)]
async fn timer_reports_timeout_while_acs_stalls() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    challenge.acs.stall_unanswered();
    challenge.acs.push_replies(vec![Reply::Silent]);

    challenge.begin().unwrap();
    assert_eq!(challenge.receiver.outcome().await, StatusEvent::TimedOut);
    tokio::time::sleep(Duration::from_secs(3600)).await;
    settle().await;

    assert_eq!(challenge.receiver.events(), vec![StatusEvent::TimedOut]);
    assert_eq!(challenge.transaction.state(), TransactionState::TimedOut);
    assert_eq!(challenge.acs.requests()[1]["challengeCancel"], "04");
    assert!(!challenge.transaction.holds_key_material());
}

#[tokio::test]
async fn cancel_notifies_before_returning_while_acs_stalls() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    challenge.acs.stall_unanswered();
    challenge.acs.push_replies(vec![Reply::Cres(challenge.cres("000"))]);

    challenge.begin().unwrap();
    challenge.presenter.presented.notified().await;
    challenge
        .transaction
        .cancel(ChallengeCancel::CardholderSelectedCancel)
        .unwrap();
    assert_eq!(challenge.receiver.events(), vec![StatusEvent::Cancelled]);

    challenge.transaction.close().unwrap();
    settle().await;
    assert_eq!(challenge.receiver.events(), vec![StatusEvent::Cancelled]);
    assert_eq!(challenge.acs.requests()[1]["challengeCancel"], "01");
}

#[tokio::test(start_paused = true)]
async fn timer_is_inert_after_completion() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    challenge.acs.push_replies(vec![Reply::Cres(challenge.acs.final_cres("000", "Y"))]);

    challenge.begin().unwrap();
    assert!(matches!(challenge.receiver.outcome().await, StatusEvent::Completed(_)));

    tokio::time::sleep(Duration::from_secs(600)).await;
    settle().await;
    assert_eq!(challenge.receiver.events().len(), 1);
    assert_eq!(challenge.acs.requests().len(), 1);
}

#[tokio::test]
async fn short_timeout_is_rejected_before_anything_starts() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());

    let result = challenge.begin_with_timeout(Duration::from_secs(299));
    assert!(matches!(result, Err(SdkError::InvalidInput(_))));
    settle().await;
    assert_eq!(challenge.transaction.state(), TransactionState::Created);
    assert!(challenge.acs.received().is_empty());
    assert!(challenge.receiver.events().is_empty());
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn acs_error_message_is_a_protocol_error() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    challenge.acs.push_replies(vec![Reply::Plain(json!({
        "messageType": "Erro",
        "messageVersion": "2.2.0",
        "errorCode": "302",
        "errorComponent": "A",
        "errorDescription": "Data could not be decrypted by the receiving system",
        "errorMessageType": "CReq",
        "acsTransID": ACS_ID
    }))]);

    challenge.begin().unwrap();
    let outcome = challenge.receiver.outcome().await;
    assert_eq!(protocol_error_code(&outcome).as_deref(), Some("302"));
    settle().await;
    assert_eq!(challenge.receiver.events().len(), 1);
    assert!(challenge.acs.errors().is_empty());
    assert_eq!(challenge.transaction.state(), TransactionState::Errored);
}

#[tokio::test]
async fn undecryptable_response_sends_302() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    challenge.acs.push_replies(vec![Reply::Raw(b"eyJhbGciOiJkaXIifQ..AAAA.BBBB.CCCC".to_vec())]);

    challenge.begin().unwrap();
    let outcome = challenge.receiver.outcome().await;
    assert_eq!(runtime_error_kind(&outcome), Some(RuntimeErrorKind::Decryption));
    settle().await;

    let errors = challenge.acs.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["errorCode"], "302");
    assert_eq!(errors[0]["errorComponent"], "C");
    assert_eq!(errors[0]["sdkTransID"], challenge.transaction.sdk_transaction_id());
}

#[tokio::test]
async fn decryption_failure_is_reported_while_erro_delivery_stalls() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    challenge.acs.stall_unanswered();
    challenge.acs.push_replies(vec![Reply::Raw(b"not a JWE".to_vec())]);

    challenge.begin().unwrap();
    let outcome = challenge.receiver.outcome().await;
    assert_eq!(runtime_error_kind(&outcome), Some(RuntimeErrorKind::Decryption));
    settle().await;
    assert_eq!(challenge.receiver.events().len(), 1);
    assert_eq!(challenge.acs.errors()[0]["errorCode"], "302");
}

#[tokio::test]
async fn unknown_acs_transaction_id_sends_301() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    let mut cres = challenge.cres("000");
    cres["acsTransID"] = "5d2c9a2e-8d0d-4bb2-9a43-6f2e2f5c1e11".into();
    challenge.acs.push_replies(vec![Reply::Cres(cres)]);

    challenge.begin().unwrap();
    let outcome = challenge.receiver.outcome().await;
    assert_eq!(protocol_error_code(&outcome).as_deref(), Some("301"));
    settle().await;
    assert_eq!(challenge.acs.errors()[0]["errorCode"], "301");
}

#[tokio::test]
async fn transport_failure_is_a_runtime_error() {
    let service = common::service();
    let challenge = Challenge::new(&service, Vec::new());
    challenge.acs.push_replies(vec![Reply::Fail(TransportError::new("connection reset"))]);

    challenge.begin().unwrap();
    let outcome = challenge.receiver.outcome().await;
    assert_eq!(runtime_error_kind(&outcome), Some(RuntimeErrorKind::Transport));
    assert_eq!(challenge.transaction.state(), TransactionState::Errored);
}

#[tokio::test]
async fn untrusted_signed_content_is_a_runtime_error() {
    let service = common::service();
    let keys = DirectoryServerKeys::new(
        threeds2_crypto::DirectoryServerCertificate::from_custom_string(testing::DS_RSA_CERT_PEM)
            .unwrap(),
        vec![
            threeds2_crypto::DirectoryServerCertificate::from_custom_string(
                testing::UNTRUSTED_ROOT_CA_PEM,
            )
            .unwrap(),
        ],
        None,
    );
    let transaction = service
        .create_transaction_with_keys(
            DirectoryServer::Custom("F999999999".into()),
            keys,
            ProtocolVersion::V2_2_0,
        )
        .unwrap();
    let challenge = Challenge::for_transaction(transaction, Vec::new());

    challenge.begin().unwrap();
    let outcome = challenge.receiver.outcome().await;
    assert_eq!(
        runtime_error_kind(&outcome),
        Some(RuntimeErrorKind::SignatureVerification)
    );
    assert_eq!(challenge.transaction.state(), TransactionState::Errored);
    assert!(challenge.acs.received().is_empty());
}
