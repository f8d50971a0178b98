mod common;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;

use lc_client::api::JSON_CONTENT_TYPE;
use lc_client::collaborators::StaticCaptcha;
use lc_client::{AccountService, ApiClient, ClientError, NewAccount, RegistrationOutcome, SessionCache};
use lc_crypto::admission::puzzle_hash;
use lc_crypto::{AdmissionEvent, AdmissionSearch, CancelFlag};
use lc_proto::api::{routes, AvatarUpdated, RegisterAccount, UsernameAvailability};
use lc_proto::{now_unix, verify_envelope};
use lc_store::{AccountRecord, MemoryStore, RecordStore};

use common::MockHttp;

struct Harness {
    session: SessionCache,
    http: Arc<MockHttp>,
    store: Arc<MemoryStore<AccountRecord>>,
    service: AccountService,
}

fn service_over(session: SessionCache, http: Arc<MockHttp>, store: Arc<MemoryStore<AccountRecord>>) -> AccountService {
    AccountService::new(
        session,
        ApiClient::new(http),
        store,
        Arc::new(StaticCaptcha("captcha-ok".into())),
    )
    .with_admission(AdmissionSearch::default().with_prefix(""))
}

fn harness() -> Harness {
    let session = SessionCache::new();
    let http = MockHttp::new();
    let store = Arc::new(MemoryStore::new());
    let service = service_over(session.clone(), http.clone(), store.clone());
    Harness { session, http, store, service }
}

fn alice() -> NewAccount {
    NewAccount {
        username: "alice".into(),
        first_name: Some("Alice".into()),
        last_name: None,
    }
}

async fn register(h: &Harness) -> String {
    match h.service.create_account(alice(), |_| {}, CancelFlag::new()).await.unwrap() {
        RegistrationOutcome::Registered { account_id } => account_id,
        other => panic!("registration failed: {other:?}"),
    }
}

#[tokio::test]
async fn registration_sends_signed_proof_and_loads_session() {
    let h = harness();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let outcome = h
        .service
        .create_account(alice(), move |e| sink.lock().push(e), CancelFlag::new())
        .await
        .unwrap();
    let RegistrationOutcome::Registered { account_id } = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert_eq!(account_id.len(), 88);
    assert!(events.lock().iter().any(|e| matches!(e, AdmissionEvent::Solved { .. })));

    let sent = h.http.requests_to(routes::REGISTER);
    assert_eq!(sent.len(), 1);
    let signature = STANDARD.decode(sent[0].signature.as_ref().unwrap()).unwrap();
    let stored = h.store.get(&account_id).await.unwrap().unwrap();
    let body: RegisterAccount =
        verify_envelope(&sent[0].body, &signature, &stored.signature_public_key, now_unix()).unwrap();
    assert_eq!(body.account_id, account_id);
    assert_eq!(body.captcha_token, "captcha-ok");
    assert_eq!(
        puzzle_hash(&STANDARD.encode(&body.signature_public_key), &body.proof_of_work_nonce),
        body.proof_of_work
    );

    assert_eq!(stored.username, "alice");
    assert_eq!(h.session.account_id().as_deref(), Some(account_id.as_str()));
    assert_eq!(h.session.username().as_deref(), Some("alice"));
}

#[tokio::test]
async fn cancelled_admission_registers_nothing() {
    let h = harness();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let outcome = h.service.create_account(alice(), |_| {}, cancel).await.unwrap();
    assert_eq!(outcome, RegistrationOutcome::Cancelled);
    assert_eq!(h.http.request_count(), 0);
    assert!(h.store.is_empty());
    assert!(!h.session.is_loaded());
}

#[tokio::test]
async fn exhausted_admission_reports_outcome() {
    let session = SessionCache::new();
    let http = MockHttp::new();
    let store = Arc::new(MemoryStore::new());
    let service = service_over(session.clone(), http.clone(), store.clone())
        .with_admission(AdmissionSearch::default().with_prefix("Z").with_max_attempts(50));

    let outcome = service.create_account(alice(), |_| {}, CancelFlag::new()).await.unwrap();
    assert_eq!(outcome, RegistrationOutcome::AdmissionExhausted);
    assert_eq!(http.request_count(), 0);
    assert!(!session.is_loaded());
}

#[tokio::test]
async fn rejected_registration_is_not_persisted() {
    let h = harness();
    h.http.respond(routes::REGISTER, 409, Vec::new());

    let err = h.service.create_account(alice(), |_| {}, CancelFlag::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
    assert!(h.store.is_empty());
    assert!(!h.session.is_loaded());
}

#[tokio::test]
async fn stored_account_loads_into_new_session() {
    let h = harness();
    assert!(!h.service.account_exists().await.unwrap());
    let account_id = register(&h).await;
    assert!(h.service.account_exists().await.unwrap());

    let session = SessionCache::new();
    let service = service_over(session.clone(), h.http.clone(), h.store.clone());
    assert!(service.load_session().await.unwrap());
    assert_eq!(session.account_id(), Some(account_id.clone()));
    assert_eq!(service.current_account().await.unwrap().unwrap().account_id, account_id);

    let empty = service_over(SessionCache::new(), MockHttp::new(), Arc::new(MemoryStore::new()));
    assert!(!empty.load_session().await.unwrap());
}

#[tokio::test]
async fn account_with_mismatched_id_is_refused() {
    let h = harness();
    let account_id = register(&h).await;
    let mut record = h.store.get(&account_id).await.unwrap().unwrap();
    h.store.delete(&account_id).await.unwrap();
    record.account_id = "A".repeat(88);
    h.store.save(&record).await.unwrap();

    let session = SessionCache::new();
    let service = service_over(session.clone(), h.http.clone(), h.store.clone());
    let err = service.load_session().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidState(_)));
    assert!(!session.is_loaded());
}

#[tokio::test]
async fn profile_updates_reach_server_and_store() {
    let h = harness();
    let account_id = register(&h).await;

    h.service.update_username("alice2").await.unwrap();
    h.service.update_full_name("Alice", "").await.unwrap();
    h.service.update_bio("hello").await.unwrap();
    h.http.respond_json(
        routes::UPDATE_AVATAR,
        &AvatarUpdated { avatar_url: "https://cdn.example/a.png".into(), version: 7 },
    );
    h.service.update_avatar(vec![0x89, 0x50], "png").await.unwrap();

    for route in [routes::UPDATE_USERNAME, routes::UPDATE_FULL_NAME, routes::UPDATE_BIO, routes::UPDATE_AVATAR] {
        assert_eq!(h.http.requests_to(route).len(), 1, "{route}");
    }
    let stored = h.store.get(&account_id).await.unwrap().unwrap();
    assert_eq!(stored.username, "alice2");
    assert_eq!(stored.first_name.as_deref(), Some("Alice"));
    assert_eq!(stored.last_name, None);
    assert_eq!(stored.bio.as_deref(), Some("hello"));
    assert_eq!(stored.avatar_url, "https://cdn.example/a.png");
    assert_eq!(stored.version, 7);
    assert_eq!(h.session.username().as_deref(), Some("alice2"));
}

#[tokio::test]
async fn failed_update_leaves_record_untouched() {
    let h = harness();
    let account_id = register(&h).await;
    h.http.respond(routes::UPDATE_BIO, 500, Vec::new());

    assert!(h.service.update_bio("nope").await.is_err());
    assert_eq!(h.store.get(&account_id).await.unwrap().unwrap().bio, None);
}

#[tokio::test]
async fn username_availability_uses_unsigned_json() {
    let h = harness();
    h.http.respond_json(routes::USERNAME_AVAILABLE, &UsernameAvailability { available: true });

    assert!(h.service.username_available("carol").await.unwrap());
    let sent = h.http.requests_to(routes::USERNAME_AVAILABLE);
    assert_eq!(sent[0].content_type, JSON_CONTENT_TYPE);
    assert!(sent[0].signature.is_none());
    let query: serde_json::Value = serde_json::from_slice(&sent[0].body).unwrap();
    assert_eq!(query["username"], "carol");
}

#[tokio::test]
async fn sign_out_drops_signing_capability() {
    let h = harness();
    register(&h).await;
    h.service.sign_out();

    assert!(!h.session.is_loaded());
    assert!(matches!(h.service.update_bio("x").await, Err(ClientError::NoSession)));
}
