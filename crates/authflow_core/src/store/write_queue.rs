//! Single-flight, coalescing write path for one storage key.
//!
//! # Invariants
//! - At most one write per key is in flight.
//! - A write enqueued while another is in flight replaces any write still
//!   waiting; only the newest pending value is ever issued.
//! - Failed writes are logged and dropped; there is no retry.

use crate::storage::StorageAdapter;
use log::{debug, error};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Notify;

#[derive(Default)]
struct QueueState {
    /// Newest encoded value not yet handed to the adapter.
    pending: Option<String>,
    in_flight: bool,
}

/// Per-key write queue drained by one spawned worker at a time.
pub struct WriteQueue {
    inner: Arc<QueueInner>,
    runtime: Handle,
}

struct QueueInner {
    adapter: Arc<dyn StorageAdapter>,
    key: String,
    state: Mutex<QueueState>,
    idle: Notify,
}

impl WriteQueue {
    pub fn new(adapter: Arc<dyn StorageAdapter>, key: impl Into<String>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                adapter,
                key: key.into(),
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
            runtime,
        }
    }

    /// Queues `value`, superseding any write that has not started yet.
    ///
    /// Returns immediately; callable from synchronous code.
    pub fn enqueue(&self, value: String) {
        let spawn_worker = {
            let mut state = self.inner.lock_state();
            if state.pending.replace(value).is_some() {
                debug!(
                    "event=store_write module=store status=coalesced store={}",
                    self.inner.key
                );
            }
            !std::mem::replace(&mut state.in_flight, true)
        };

        if spawn_worker {
            let inner = Arc::clone(&self.inner);
            self.runtime.spawn(async move { inner.drain().await });
        }
    }

    /// Waits until no write is pending or in flight.
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.idle.notified();
            {
                let state = self.inner.lock_state();
                if !state.in_flight && state.pending.is_none() {
                    return;
                }
            }
            notified.await;
        }
    }

    #[cfg(test)]
    fn is_idle(&self) -> bool {
        let state = self.inner.lock_state();
        !state.in_flight && state.pending.is_none()
    }
}

impl QueueInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drain(&self) {
        loop {
            let value = {
                let mut state = self.lock_state();
                match state.pending.take() {
                    Some(value) => value,
                    None => {
                        state.in_flight = false;
                        drop(state);
                        self.idle.notify_waiters();
                        return;
                    }
                }
            };

            match self.adapter.set(&self.key, &value).await {
                Ok(()) => debug!(
                    "event=store_write module=store status=ok store={} bytes={} backend={}",
                    self.key,
                    value.len(),
                    self.adapter.backend()
                ),
                Err(err) => error!(
                    "event=store_write module=store status=error store={} backend={} error={}",
                    self.key,
                    self.adapter.backend(),
                    err
                ),
            }
        }
    }
}
