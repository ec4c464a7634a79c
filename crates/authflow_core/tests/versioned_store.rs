use async_trait::async_trait;
use authflow_core::storage::LocalKvStore;
use authflow_core::store::{MigrationError, StoredEnvelope};
use authflow_core::{
    BackendKind, FallbackReason, LoadOutcome, Sensitivity, StorageAdapter, StorageError,
    StorageResult, StoreSchema, VersionedStore,
};
use serde_json::{json, Value};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

#[derive(Debug, Clone, Default, PartialEq)]
struct Counter {
    count: u32,
    /// Transient; never persisted.
    dirty: bool,
}

/// v1 `{ "n": .. }`, v2 `{ "total": .. }`, v3 `{ "count": .. }`.
struct CounterSchema;

impl StoreSchema for CounterSchema {
    type State = Counter;

    const KEY: &'static str = "counter-storage";
    const CURRENT_VERSION: u32 = 3;
    const SENSITIVITY: Sensitivity = Sensitivity::Plain;

    fn partialize(state: &Counter) -> serde_json::Result<Value> {
        Ok(json!({ "count": state.count }))
    }

    fn migrate(payload: Value, from_version: u32) -> Result<Counter, MigrationError> {
        let field = match from_version {
            1 => "n",
            2 => "total",
            3 => "count",
            stored => {
                return Err(MigrationError::UnsupportedVersion {
                    stored,
                    current: 3,
                })
            }
        };
        let count = payload[field]
            .as_u64()
            .and_then(|value| u32::try_from(value).ok())
            .ok_or_else(|| MigrationError::Invariant(format!("`{field}` must be a u32")))?;
        Ok(Counter {
            count,
            dirty: false,
        })
    }
}

/// Local map whose reads and writes can be switched to fail.
struct FlakyAdapter {
    inner: LocalKvStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyAdapter {
    fn new() -> Self {
        Self {
            inner: LocalKvStore::in_memory(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }
}

fn io_failure() -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk unavailable"))
}

#[async_trait]
impl StorageAdapter for FlakyAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::WebLocal
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io_failure());
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io_failure());
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key).await
    }
}

fn counter_store(adapter: Arc<FlakyAdapter>) -> VersionedStore<CounterSchema> {
    VersionedStore::new(adapter, Handle::current())
}

async fn seed(adapter: &FlakyAdapter, raw: &str) {
    adapter.set(CounterSchema::KEY, raw).await.unwrap();
}

async fn stored_envelope(adapter: &FlakyAdapter) -> StoredEnvelope {
    let raw = adapter.get(CounterSchema::KEY).await.unwrap().unwrap();
    StoredEnvelope::decode(&raw).unwrap()
}

#[tokio::test]
async fn load_without_persisted_state_hydrates_with_default() {
    let store = counter_store(Arc::new(FlakyAdapter::new()));
    assert!(!store.has_hydrated());

    assert_eq!(store.load().await, LoadOutcome::Fresh);
    assert!(store.has_hydrated());
    assert_eq!(store.snapshot(), Counter::default());
}

#[tokio::test]
async fn mutation_is_visible_immediately_and_persisted_in_background() {
    let adapter = Arc::new(FlakyAdapter::new());
    let store = counter_store(adapter.clone());
    store.load().await;

    let returned = store.mutate(|state| {
        state.count = 7;
        state.dirty = true;
    });
    assert_eq!(returned.count, 7);
    assert_eq!(store.with_state(|state| state.count), 7);

    store.flush().await;
    let envelope = stored_envelope(&adapter).await;
    assert_eq!(envelope.version, 3);
    assert_eq!(envelope.payload, json!({ "count": 7 }));
}

#[tokio::test]
async fn identity_mutation_round_trips_through_fresh_instance() {
    let adapter = Arc::new(FlakyAdapter::new());
    let first = counter_store(adapter.clone());
    first.load().await;
    first.mutate(|state| state.count = 21);
    first.mutate(|_| {});
    first.flush().await;
    let persisted = stored_envelope(&adapter).await;

    let second = counter_store(adapter.clone());
    assert_eq!(second.load().await, LoadOutcome::Restored);
    assert_eq!(second.snapshot().count, 21);
    assert!(!second.snapshot().dirty);

    second.mutate(|_| {});
    second.flush().await;
    assert_eq!(stored_envelope(&adapter).await, persisted);
}

#[tokio::test]
async fn older_payload_is_migrated_and_written_back() {
    let adapter = Arc::new(FlakyAdapter::new());
    seed(
        &adapter,
        &StoredEnvelope::new(1, json!({ "n": 4 })).encode().unwrap(),
    )
    .await;

    let store = counter_store(adapter.clone());
    assert_eq!(store.load().await, LoadOutcome::Migrated { from: 1 });
    assert_eq!(store.snapshot().count, 4);

    let envelope = stored_envelope(&adapter).await;
    assert_eq!(envelope.version, 3);
    assert_eq!(envelope.payload, json!({ "count": 4 }));

    let reloaded = counter_store(adapter);
    assert_eq!(reloaded.load().await, LoadOutcome::Restored);
    assert_eq!(reloaded.snapshot().count, 4);
}

#[tokio::test]
async fn corrupt_envelope_falls_back_to_default() {
    let adapter = Arc::new(FlakyAdapter::new());
    seed(&adapter, "{\"version\": 3, \"payload\":").await;

    let store = counter_store(adapter);
    assert_eq!(
        store.load().await,
        LoadOutcome::Fallback(FallbackReason::CorruptEnvelope)
    );
    assert!(store.has_hydrated());
    assert_eq!(store.snapshot(), Counter::default());
}

#[tokio::test]
async fn failing_migration_falls_back_to_default() {
    let adapter = Arc::new(FlakyAdapter::new());
    seed(
        &adapter,
        &StoredEnvelope::new(2, json!({ "total": "many" }))
            .encode()
            .unwrap(),
    )
    .await;

    let store = counter_store(adapter);
    assert_eq!(
        store.load().await,
        LoadOutcome::Fallback(FallbackReason::MigrationFailed)
    );
    assert!(store.has_hydrated());
    assert_eq!(store.snapshot(), Counter::default());
}

#[tokio::test]
async fn newer_version_falls_back_without_overwriting() {
    let adapter = Arc::new(FlakyAdapter::new());
    let future = StoredEnvelope::new(9, json!({ "count": 1, "extra": true }))
        .encode()
        .unwrap();
    seed(&adapter, &future).await;

    let store = counter_store(adapter.clone());
    assert_eq!(
        store.load().await,
        LoadOutcome::Fallback(FallbackReason::NewerVersion { stored: 9 })
    );
    store.flush().await;
    assert_eq!(
        adapter.get(CounterSchema::KEY).await.unwrap().as_deref(),
        Some(future.as_str())
    );
}

#[tokio::test]
async fn read_failure_falls_back_and_still_hydrates() {
    let adapter = Arc::new(FlakyAdapter::new());
    adapter.fail_reads.store(true, Ordering::SeqCst);

    let store = counter_store(adapter);
    assert_eq!(
        store.load().await,
        LoadOutcome::Fallback(FallbackReason::ReadFailed)
    );
    assert!(store.has_hydrated());
}

#[tokio::test]
async fn write_failure_keeps_in_memory_state_authoritative() {
    let adapter = Arc::new(FlakyAdapter::new());
    let store = counter_store(adapter.clone());
    store.load().await;

    adapter.fail_writes.store(true, Ordering::SeqCst);
    store.mutate(|state| state.count = 3);
    store.flush().await;

    assert_eq!(store.snapshot().count, 3);
    assert_eq!(adapter.get(CounterSchema::KEY).await.unwrap(), None);
}

#[tokio::test]
async fn reset_restores_and_persists_default() {
    let adapter = Arc::new(FlakyAdapter::new());
    let store = counter_store(adapter.clone());
    store.load().await;
    store.mutate(|state| state.count = 11);

    let state = store.reset();
    store.flush().await;

    assert_eq!(state, Counter::default());
    assert_eq!(stored_envelope(&adapter).await.payload, json!({ "count": 0 }));
}

#[tokio::test]
async fn wait_hydrated_resolves_after_load() {
    let store = Arc::new(counter_store(Arc::new(FlakyAdapter::new())));
    let mut hydration = store.subscribe_hydration();
    assert!(!*hydration.borrow());

    let waiter = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.wait_hydrated().await })
    };

    store.load().await;
    waiter.await.unwrap();
    hydration.changed().await.unwrap();
    assert!(*hydration.borrow());

    // A second load keeps the flag set and does not signal again.
    store.load().await;
    assert!(store.has_hydrated());
    assert!(!hydration.has_changed().unwrap());
}

#[tokio::test]
async fn rapid_mutations_persist_the_last_state() {
    let adapter = Arc::new(FlakyAdapter::new());
    let store = counter_store(adapter.clone());
    store.load().await;

    for count in 1..=50 {
        store.mutate(|state| state.count = count);
    }
    store.flush().await;

    assert_eq!(stored_envelope(&adapter).await.payload, json!({ "count": 50 }));
}
