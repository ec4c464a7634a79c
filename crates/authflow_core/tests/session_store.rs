use authflow_core::session::SESSION_STORE_KEY;
use authflow_core::storage::{MemoryCredentialStore, SecureAdapter};
use authflow_core::store::StoredEnvelope;
use authflow_core::{
    CredentialStore, FallbackReason, LoadOutcome, SessionError, SessionState, SessionStore,
    StorageAdapter, UserProfile,
};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Handle;

fn secure_adapter() -> (Arc<MemoryCredentialStore>, Arc<SecureAdapter>) {
    let credentials = Arc::new(MemoryCredentialStore::new());
    let adapter = Arc::new(SecureAdapter::new(credentials.clone()));
    (credentials, adapter)
}

fn ada() -> UserProfile {
    UserProfile {
        name: Some("Ada".to_string()),
        ..UserProfile::new("u-1", "ada@example.com")
    }
}

#[tokio::test]
async fn sign_in_then_sign_out_clears_everything() {
    let (_, adapter) = secure_adapter();
    let store = SessionStore::new(adapter, Handle::current());
    assert_eq!(store.load().await, LoadOutcome::Fresh);
    assert!(!store.is_signed_in());

    let state = store
        .sign_in(ada(), "access-1", Some("refresh-1".to_string()))
        .unwrap();
    assert!(state.is_signed_in());
    assert_eq!(store.user(), Some(ada()));
    assert_eq!(store.access_token().as_deref(), Some("access-1"));
    assert_eq!(store.refresh_token().as_deref(), Some("refresh-1"));

    let state = store.sign_out();
    assert_eq!(state, SessionState::default());
    assert_eq!(store.user(), None);
    assert_eq!(store.access_token(), None);
    assert_eq!(store.refresh_token(), None);
}

#[tokio::test]
async fn missing_refresh_token_is_stored_as_null() {
    let (credentials, adapter) = secure_adapter();
    let store = SessionStore::new(adapter, Handle::current());
    store.load().await;

    store.sign_in(ada(), "access-1", None).unwrap();
    store.flush().await;

    let raw = credentials.get_item(SESSION_STORE_KEY).unwrap().unwrap();
    let envelope = StoredEnvelope::decode(&raw).unwrap();
    assert_eq!(envelope.version, 1);
    assert_eq!(envelope.payload["refreshToken"], json!(null));
    assert_eq!(envelope.payload["accessToken"], json!("access-1"));
    assert_eq!(envelope.payload["user"]["id"], json!("u-1"));
}

#[tokio::test]
async fn blank_input_is_rejected_without_mutation() {
    let (_, adapter) = secure_adapter();
    let store = SessionStore::new(adapter, Handle::current());
    store.load().await;

    let err = store
        .sign_in(UserProfile::new("  ", "x@example.com"), "token", None)
        .unwrap_err();
    assert_eq!(err, SessionError::EmptyUserId);

    let err = store.sign_in(ada(), "", None).unwrap_err();
    assert_eq!(err, SessionError::EmptyAccessToken);

    assert_eq!(store.snapshot(), SessionState::default());
}

#[tokio::test]
async fn session_survives_a_fresh_instance() {
    let (credentials, adapter) = secure_adapter();
    let first = SessionStore::new(adapter, Handle::current());
    first.load().await;
    first
        .sign_in(ada(), "access-1", Some("refresh-1".to_string()))
        .unwrap();
    first.flush().await;

    let second = SessionStore::new(
        Arc::new(SecureAdapter::new(credentials)),
        Handle::current(),
    );
    assert_eq!(second.load().await, LoadOutcome::Restored);
    assert_eq!(second.snapshot(), first.snapshot());
}

#[tokio::test]
async fn sign_out_is_persisted() {
    let (credentials, adapter) = secure_adapter();
    let store = SessionStore::new(adapter.clone(), Handle::current());
    store.load().await;
    store.sign_in(ada(), "access-1", None).unwrap();
    store.sign_out();
    store.flush().await;

    let reloaded = SessionStore::new(
        Arc::new(SecureAdapter::new(credentials)),
        Handle::current(),
    );
    reloaded.load().await;
    assert!(!reloaded.is_signed_in());
}

#[tokio::test]
async fn half_signed_in_payload_is_treated_as_corrupt() {
    let (_, adapter) = secure_adapter();
    let raw = StoredEnvelope::new(
        1,
        json!({ "user": { "id": "u-1", "email": "ada@example.com" }, "accessToken": null }),
    )
    .encode()
    .unwrap();
    adapter.set(SESSION_STORE_KEY, &raw).await.unwrap();

    let store = SessionStore::new(adapter, Handle::current());
    assert_eq!(
        store.load().await,
        LoadOutcome::Fallback(FallbackReason::MigrationFailed)
    );
    assert!(store.has_hydrated());
    assert!(!store.is_signed_in());
}

#[test]
fn debug_output_redacts_tokens() {
    let state = SessionState {
        user: Some(ada()),
        access_token: Some("secret-access".to_string()),
        refresh_token: Some("secret-refresh".to_string()),
    };
    let rendered = format!("{state:?}");
    assert!(!rendered.contains("secret-access"));
    assert!(!rendered.contains("secret-refresh"));
    assert!(rendered.contains("<redacted>"));
}

#[tokio::test]
async fn unversioned_session_blob_is_restored() {
    let (_, adapter) = secure_adapter();
    let raw = json!({
        "user": { "id": "u1", "email": "e@example.com" },
        "accessToken": "a",
        "refreshToken": null
    })
    .to_string();
    adapter.set(SESSION_STORE_KEY, &raw).await.unwrap();

    let store = SessionStore::new(adapter.clone(), Handle::current());
    assert_eq!(store.load().await, LoadOutcome::Restored);
    assert!(store.is_signed_in());
    assert_eq!(store.access_token().as_deref(), Some("a"));

    store.sign_out();
    store.flush().await;
    let rewritten = adapter.get(SESSION_STORE_KEY).await.unwrap().unwrap();
    let envelope = StoredEnvelope::decode(&rewritten).unwrap();
    assert_eq!(envelope.version, 1);
    assert_eq!(envelope.payload["accessToken"], json!(null));
}
