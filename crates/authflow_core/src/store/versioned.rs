//! Generic versioned store: in-memory state, write-through persistence,
//! load + migrate + write-back, hydration tracking.

use super::envelope::StoredEnvelope;
use super::schema::StoreSchema;
use super::write_queue::WriteQueue;
use crate::storage::StorageAdapter;
use log::{debug, error, info, warn};
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Why a load fell back to the default state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    ReadFailed,
    CorruptEnvelope,
    /// Written by a newer build; left on disk untouched.
    NewerVersion { stored: u32 },
    MigrationFailed,
}

impl FallbackReason {
    fn code(self) -> &'static str {
        match self {
            Self::ReadFailed => "read_failed",
            Self::CorruptEnvelope => "corrupt_envelope",
            Self::NewerVersion { .. } => "newer_version",
            Self::MigrationFailed => "migration_failed",
        }
    }
}

/// Result of one `load()`; informational only, loading never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing persisted yet.
    Fresh,
    /// Persisted state was already current.
    Restored,
    /// Persisted state was upgraded and written back.
    Migrated { from: u32 },
    Fallback(FallbackReason),
}

/// Persisted state container for one `StoreSchema`.
pub struct VersionedStore<S: StoreSchema> {
    state: RwLock<S::State>,
    hydrated: watch::Sender<bool>,
    adapter: Arc<dyn StorageAdapter>,
    queue: WriteQueue,
    _schema: PhantomData<fn() -> S>,
}

impl<S: StoreSchema> VersionedStore<S> {
    /// Creates an unhydrated store holding the default state.
    ///
    /// `runtime` drives the background persistence writes.
    pub fn new(adapter: Arc<dyn StorageAdapter>, runtime: Handle) -> Self {
        let (hydrated, _) = watch::channel(false);
        Self {
            state: RwLock::new(S::State::default()),
            hydrated,
            queue: WriteQueue::new(Arc::clone(&adapter), S::KEY, runtime),
            adapter,
            _schema: PhantomData,
        }
    }

    /// Loads persisted state, migrating and writing back older payloads.
    ///
    /// Always ends hydrated. Read, parse and migration failures leave the
    /// default state in place and are only logged.
    pub async fn load(&self) -> LoadOutcome {
        let started_at = Instant::now();
        info!(
            "event=store_load module=store status=start store={} backend={}",
            S::KEY,
            self.adapter.backend()
        );

        let (state, outcome) = self.read_persisted().await;

        if let LoadOutcome::Migrated { from } = outcome {
            // Write back before exposing so later loads skip the upgrade.
            self.enqueue_state(&state);
            self.queue.flush().await;
            info!(
                "event=store_migrate module=store status=ok store={} from_version={} to_version={}",
                S::KEY,
                from,
                S::CURRENT_VERSION
            );
        }

        *self.write_guard() = state;
        self.mark_hydrated();

        match outcome {
            LoadOutcome::Fallback(reason) => warn!(
                "event=store_load module=store status=fallback store={} duration_ms={} reason={}",
                S::KEY,
                started_at.elapsed().as_millis(),
                reason.code()
            ),
            _ => info!(
                "event=store_load module=store status=ok store={} duration_ms={} outcome={:?}",
                S::KEY,
                started_at.elapsed().as_millis(),
                outcome
            ),
        }
        outcome
    }

    /// Applies `updater` in memory, then persists in the background.
    ///
    /// The new state is visible to readers as soon as this returns; the
    /// returned value is a snapshot of it. Persistence failures are logged
    /// and otherwise ignored.
    pub fn mutate<F>(&self, updater: F) -> S::State
    where
        F: FnOnce(&mut S::State),
    {
        let mut guard = self.write_guard();
        updater(&mut *guard);
        // Enqueue under the state lock so queue order matches memory order.
        self.enqueue_state(&*guard);
        guard.clone()
    }

    /// Restores the default state and persists it.
    pub fn reset(&self) -> S::State {
        self.mutate(|state| *state = S::State::default())
    }

    /// Clone of the current in-memory state.
    pub fn snapshot(&self) -> S::State {
        self.read_guard().clone()
    }

    /// Reads the current state without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&S::State) -> R) -> R {
        f(&*self.read_guard())
    }

    pub fn has_hydrated(&self) -> bool {
        *self.hydrated.borrow()
    }

    /// Resolves once the first `load()` has finished.
    pub async fn wait_hydrated(&self) {
        let mut receiver = self.hydrated.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|hydrated| *hydrated).await;
    }

    /// Watch handle for UI layers that gate rendering on hydration.
    pub fn subscribe_hydration(&self) -> watch::Receiver<bool> {
        self.hydrated.subscribe()
    }

    /// Waits for every queued persistence write to finish.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    pub fn key(&self) -> &'static str {
        S::KEY
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    async fn read_persisted(&self) -> (S::State, LoadOutcome) {
        let raw = match self.adapter.get(S::KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return (S::State::default(), LoadOutcome::Fresh),
            Err(err) => {
                error!(
                    "event=store_load module=store status=error store={} error_code=read_failed error={}",
                    S::KEY,
                    err
                );
                return fallback(FallbackReason::ReadFailed);
            }
        };

        let envelope = match StoredEnvelope::decode_or_bare(&raw, S::BARE_PAYLOAD_VERSION) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(
                    "event=store_load module=store status=error store={} error_code=corrupt_envelope error={}",
                    S::KEY,
                    err
                );
                return fallback(FallbackReason::CorruptEnvelope);
            }
        };

        if envelope.version > S::CURRENT_VERSION {
            error!(
                "event=store_load module=store status=error store={} error_code=newer_version stored_version={} current_version={}",
                S::KEY,
                envelope.version,
                S::CURRENT_VERSION
            );
            return fallback(FallbackReason::NewerVersion {
                stored: envelope.version,
            });
        }

        match S::migrate(envelope.payload, envelope.version) {
            Ok(state) if envelope.version < S::CURRENT_VERSION => (
                state,
                LoadOutcome::Migrated {
                    from: envelope.version,
                },
            ),
            Ok(state) => (state, LoadOutcome::Restored),
            Err(err) => {
                error!(
                    "event=store_load module=store status=error store={} error_code=migration_failed stored_version={} error={}",
                    S::KEY,
                    envelope.version,
                    err
                );
                fallback(FallbackReason::MigrationFailed)
            }
        }
    }

    fn enqueue_state(&self, state: &S::State) {
        let encoded = S::partialize(state).and_then(|payload| {
            StoredEnvelope::new(S::CURRENT_VERSION, payload).encode()
        });
        match encoded {
            Ok(raw) => {
                debug!(
                    "event=store_persist module=store status=queued store={} version={}",
                    S::KEY,
                    S::CURRENT_VERSION
                );
                self.queue.enqueue(raw);
            }
            Err(err) => error!(
                "event=store_persist module=store status=error store={} error_code=encode_failed error={}",
                S::KEY,
                err
            ),
        }
    }

    fn mark_hydrated(&self) {
        let first = self.hydrated.send_if_modified(|hydrated| {
            let changed = !*hydrated;
            *hydrated = true;
            changed
        });
        if first {
            debug!(
                "event=store_hydrated module=store status=ok store={}",
                S::KEY
            );
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, S::State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, S::State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fallback<T: Default>(reason: FallbackReason) -> (T, LoadOutcome) {
    (T::default(), LoadOutcome::Fallback(reason))
}
