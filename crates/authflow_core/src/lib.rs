//! Persisted client state for the authflow onboarding/auth app.
//! This crate owns storage routing, schema versioning and hydration for the
//! onboarding and session stores; UI layers only call into it.

pub mod config;
pub mod context;
pub mod logging;
pub mod onboarding;
pub mod session;
pub mod storage;
pub mod store;

pub use config::{ConfigError, StateConfig, DEFAULT_MAX_STEP};
pub use context::{AppStores, HydrationReport};
pub use logging::{default_log_level, init_logging, init_logging_for, logging_status};
pub use onboarding::{
    Answers, BootstrapDecision, BootstrapOptions, OnboardingState, OnboardingStore,
    DEV_DEFAULT_STEP,
};
pub use session::{SessionError, SessionState, SessionStore, UserProfile};
pub use storage::{
    select_backend, BackendKind, CredentialStore, Platform, SecureFallback, Sensitivity,
    StorageAdapter, StorageError, StorageResult,
};
pub use store::{FallbackReason, LoadOutcome, StoreSchema, VersionedStore};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
