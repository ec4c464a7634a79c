//! Onboarding progress store.
//!
//! # Responsibility
//! - Persist the flow step index and collected answers across restarts.
//! - Upgrade payloads written by older schema versions.
//! - Apply the native environment/dev-mode starting step on fresh installs.
//!
//! # Invariants
//! - Persisted payload shape is `{ version, stepIndex, answers }`.
//! - The store never clamps `stepIndex`; only the bootstrap clamps its own
//!   override to `[0, max_step]`.

mod bootstrap;
mod state;
mod store;

pub use bootstrap::{
    apply_bootstrap, clamp_step, decide_initial_step, BootstrapDecision, BootstrapOptions,
    DEV_DEFAULT_STEP,
};
pub use state::{
    coerce_answers, upgrade_v1_to_v2, Answers, OnboardingPayload, OnboardingPayloadV1,
    OnboardingSchema, OnboardingState, ONBOARDING_STORE_KEY, ONBOARDING_VERSION,
};
pub use store::OnboardingStore;
