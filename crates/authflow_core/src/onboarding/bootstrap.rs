//! Starting step for fresh native installs.
//!
//! An environment-supplied step wins over the development default. Either
//! one is applied only while onboarding is pristine (step 0, no answers),
//! so an existing user's progress is never moved.

use super::state::OnboardingState;
use super::store::OnboardingStore;
use crate::storage::Platform;
use log::info;

/// Starting step used by development builds.
pub const DEV_DEFAULT_STEP: u32 = 16;

/// Inputs for the bootstrap decision, normally derived from `StateConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub platform: Platform,
    pub dev_mode: bool,
    /// Raw override, clamped before use.
    pub initial_step: Option<i64>,
    pub max_step: u32,
}

/// Which starting step, if any, the bootstrap applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapDecision {
    Untouched,
    EnvOverride(u32),
    DevDefault(u32),
}

/// Clamps a raw step into `[0, max_step]`.
pub fn clamp_step(raw: i64, max_step: u32) -> u32 {
    u32::try_from(raw.clamp(0, i64::from(max_step))).unwrap_or(0)
}

/// Pure decision for `state` under `options`.
pub fn decide_initial_step(state: &OnboardingState, options: &BootstrapOptions) -> BootstrapDecision {
    if !options.platform.is_native() || !state.is_pristine() {
        return BootstrapDecision::Untouched;
    }

    match options.initial_step {
        Some(raw) => BootstrapDecision::EnvOverride(clamp_step(raw, options.max_step)),
        None if options.dev_mode => {
            BootstrapDecision::DevDefault(DEV_DEFAULT_STEP.min(options.max_step))
        }
        None => BootstrapDecision::Untouched,
    }
}

/// Applies the decision to a hydrated store.
pub fn apply_bootstrap(store: &OnboardingStore, options: &BootstrapOptions) -> BootstrapDecision {
    let decision = decide_initial_step(&store.snapshot(), options);
    match decision {
        BootstrapDecision::EnvOverride(step) | BootstrapDecision::DevDefault(step) => {
            store.set_step_index(step);
            info!(
                "event=onboarding_bootstrap module=onboarding status=ok decision={:?} step={}",
                decision, step
            );
        }
        BootstrapDecision::Untouched => {}
    }
    decision
}
