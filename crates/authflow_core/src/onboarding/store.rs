//! Onboarding store operations on top of the versioned engine.

use super::state::{Answers, OnboardingSchema, OnboardingState};
use crate::storage::StorageAdapter;
use crate::store::{LoadOutcome, VersionedStore};
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Onboarding progress: current step and collected answers.
pub struct OnboardingStore {
    inner: VersionedStore<OnboardingSchema>,
}

impl OnboardingStore {
    pub fn new(adapter: Arc<dyn StorageAdapter>, runtime: Handle) -> Self {
        Self {
            inner: VersionedStore::new(adapter, runtime),
        }
    }

    /// Hydrates from storage; see `VersionedStore::load`.
    pub async fn load(&self) -> LoadOutcome {
        self.inner.load().await
    }

    /// Moves to `step_index` as given; bounds are the caller's concern.
    pub fn set_step_index(&self, step_index: u32) -> OnboardingState {
        self.inner.mutate(|state| state.step_index = step_index)
    }

    /// Stores one answer, replacing only the previous value for `id`.
    pub fn save_answer(&self, id: impl Into<String>, value: Value) -> OnboardingState {
        let id = id.into();
        self.inner.mutate(move |state| {
            state.answers.insert(id, value);
        })
    }

    /// Drops all progress and persists the default state.
    pub fn reset(&self) -> OnboardingState {
        self.inner.reset()
    }

    pub fn snapshot(&self) -> OnboardingState {
        self.inner.snapshot()
    }

    pub fn step_index(&self) -> u32 {
        self.inner.with_state(|state| state.step_index)
    }

    pub fn answers(&self) -> Answers {
        self.inner.with_state(|state| state.answers.clone())
    }

    pub fn answer(&self, id: &str) -> Option<Value> {
        self.inner.with_state(|state| state.answers.get(id).cloned())
    }

    pub fn has_hydrated(&self) -> bool {
        self.inner.has_hydrated()
    }

    pub async fn wait_hydrated(&self) {
        self.inner.wait_hydrated().await;
    }

    pub fn subscribe_hydration(&self) -> watch::Receiver<bool> {
        self.inner.subscribe_hydration()
    }

    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Underlying engine, for diagnostics.
    pub fn engine(&self) -> &VersionedStore<OnboardingSchema> {
        &self.inner
    }
}
