//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Own the process-wide tokio runtime and `AppStores` behind one
//!   bootstrap call.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Store calls made before `app_bootstrap` fail with an envelope instead
//!   of touching storage.
//! - Bootstrap happens once per process; later calls must name the same
//!   data directory.

use authflow_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AppStores, BootstrapDecision, HydrationReport, LoadOutcome, OnboardingState, Platform,
    SessionState, StateConfig, UserProfile,
};
use log::{error, info};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};
use tokio::runtime::{Builder, Runtime};

const RUNTIME_WORKER_THREADS: usize = 2;
const RUNTIME_THREAD_NAME: &str = "authflow-io";

static APP: OnceLock<AppContext> = OnceLock::new();
static BOOTSTRAP_LOCK: Mutex<()> = Mutex::new(());

struct AppContext {
    // Drives the store write queues; must outlive `stores`.
    runtime: Runtime,
    stores: AppStores,
    report: HydrationReport,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may perform small file-system setup work.
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Result of `app_bootstrap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapResponse {
    pub ok: bool,
    /// Human-readable response message for diagnostics.
    pub message: String,
    /// Onboarding load outcome (`fresh|restored|migrated|fallback`).
    pub onboarding_outcome: String,
    /// Session load outcome (`fresh|restored|migrated|fallback`).
    pub session_outcome: String,
    /// Starting step applied by the bootstrap, if any.
    pub initial_step: Option<u32>,
}

impl BootstrapResponse {
    fn from_report(message: impl Into<String>, report: &HydrationReport) -> Self {
        Self {
            ok: true,
            message: message.into(),
            onboarding_outcome: outcome_label(&report.onboarding).to_string(),
            session_outcome: outcome_label(&report.session).to_string(),
            initial_step: bootstrap_step(&report.bootstrap),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            onboarding_outcome: String::new(),
            session_outcome: String::new(),
            initial_step: None,
        }
    }
}

/// Hydration and routing diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationStatus {
    /// `app_bootstrap` has completed.
    pub initialized: bool,
    pub onboarding_hydrated: bool,
    pub session_hydrated: bool,
    /// Platform the stores were routed for; empty before bootstrap.
    pub platform: String,
    pub onboarding_backend: String,
    pub session_backend: String,
}

/// Onboarding state as seen by Dart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingSnapshot {
    pub version: u32,
    pub step_index: u32,
    /// Answers object encoded as JSON text.
    pub answers_json: String,
}

/// Response envelope for onboarding calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingResponse {
    pub ok: bool,
    pub message: String,
    /// State after the call; `None` on failure.
    pub state: Option<OnboardingSnapshot>,
}

impl OnboardingResponse {
    fn success(message: impl Into<String>, state: &OnboardingState) -> Self {
        match serde_json::to_string(&state.answers) {
            Ok(answers_json) => Self {
                ok: true,
                message: message.into(),
                state: Some(OnboardingSnapshot {
                    version: state.version,
                    step_index: state.step_index,
                    answers_json,
                }),
            },
            Err(err) => Self::failure(format!("answers encode failed: {err}")),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            state: None,
        }
    }
}

/// Session state as seen by Dart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub signed_in: bool,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl From<SessionState> for SessionSnapshot {
    fn from(state: SessionState) -> Self {
        let signed_in = state.is_signed_in();
        let (user_id, email, name, avatar_url) = match state.user {
            Some(user) => (Some(user.id), Some(user.email), user.name, user.avatar_url),
            None => (None, None, None, None),
        };
        Self {
            signed_in,
            user_id,
            email,
            name,
            avatar_url,
            access_token: state.access_token,
            refresh_token: state.refresh_token,
        }
    }
}

/// Response envelope for session calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResponse {
    pub ok: bool,
    pub message: String,
    /// State after the call; `None` on failure.
    pub state: Option<SessionSnapshot>,
}

impl SessionResponse {
    fn success(message: impl Into<String>, state: SessionState) -> Self {
        Self {
            ok: true,
            message: message.into(),
            state: Some(state.into()),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            state: None,
        }
    }
}

/// Builds the stores for `data_dir` and hydrates them.
///
/// Input semantics:
/// - `data_dir`: absolute directory for persisted state; empty means the
///   `AUTHFLOW_DATA_DIR` / temp-dir default.
/// - `platform`: `android|ios|macos|windows|linux|web`; `None` means the
///   `AUTHFLOW_PLATFORM` / compile-target default.
///
/// # FFI contract
/// - Sync call; blocks until both stores are hydrated.
/// - Repeating with the same data directory returns the first report.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn app_bootstrap(data_dir: String, platform: Option<String>) -> BootstrapResponse {
    let config = match resolve_config(&data_dir, platform.as_deref()) {
        Ok(config) => config,
        Err(message) => return BootstrapResponse::failure(message),
    };

    let _guard = BOOTSTRAP_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(app) = APP.get() {
        if app.stores.config().data_dir != config.data_dir {
            return BootstrapResponse::failure(format!(
                "app_bootstrap failed: already bootstrapped at `{}`",
                app.stores.config().data_dir.display()
            ));
        }
        return BootstrapResponse::from_report("Already bootstrapped.", &app.report);
    }

    match start_app(config) {
        Ok(app) => {
            let response = BootstrapResponse::from_report("Bootstrapped.", &app.report);
            // Serialized by BOOTSTRAP_LOCK, so the cell is still empty.
            let _ = APP.set(app);
            response
        }
        Err(message) => {
            error!(
                "event=app_bootstrap module=ffi status=error error={}",
                message
            );
            BootstrapResponse::failure(message)
        }
    }
}

/// Reports hydration and backend routing.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never panics; reports `initialized=false` before bootstrap.
#[flutter_rust_bridge::frb(sync)]
pub fn hydration_status() -> HydrationStatus {
    match APP.get() {
        Some(app) => HydrationStatus {
            initialized: true,
            onboarding_hydrated: app.stores.onboarding.has_hydrated(),
            session_hydrated: app.stores.session.has_hydrated(),
            platform: app.stores.config().platform.to_string(),
            onboarding_backend: app
                .stores
                .onboarding
                .engine()
                .adapter()
                .backend()
                .to_string(),
            session_backend: app.stores.session.engine().adapter().backend().to_string(),
        },
        None => HydrationStatus {
            initialized: false,
            onboarding_hydrated: false,
            session_hydrated: false,
            platform: String::new(),
            onboarding_backend: String::new(),
            session_backend: String::new(),
        },
    }
}

/// Waits until every queued write has reached storage.
///
/// # FFI contract
/// - Sync call; blocks on pending writes. Intended for app backgrounding.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn app_flush() -> String {
    match app() {
        Ok(app) => {
            app.runtime.block_on(app.stores.flush());
            String::new()
        }
        Err(message) => message,
    }
}

/// Current onboarding state.
#[flutter_rust_bridge::frb(sync)]
pub fn onboarding_snapshot() -> OnboardingResponse {
    match app() {
        Ok(app) => OnboardingResponse::success("ok", &app.stores.onboarding.snapshot()),
        Err(message) => OnboardingResponse::failure(message),
    }
}

/// Moves onboarding to `step_index`. The value is stored as given.
#[flutter_rust_bridge::frb(sync)]
pub fn onboarding_set_step(step_index: u32) -> OnboardingResponse {
    match app() {
        Ok(app) => OnboardingResponse::success(
            "Step updated.",
            &app.stores.onboarding.set_step_index(step_index),
        ),
        Err(message) => OnboardingResponse::failure(message),
    }
}

/// Records one answer.
///
/// Input semantics:
/// - `id`: non-blank question identifier.
/// - `json_value`: any JSON value encoded as text (`"\"calm\""`, `42`,
///   `{"a":1}`).
///
/// # FFI contract
/// - Sync call; persistence happens in the background.
/// - Never panics; invalid input returns a failure envelope and leaves
///   state unchanged.
#[flutter_rust_bridge::frb(sync)]
pub fn onboarding_save_answer(id: String, json_value: String) -> OnboardingResponse {
    let id = id.trim().to_string();
    if id.is_empty() {
        return OnboardingResponse::failure("onboarding_save_answer failed: id cannot be empty");
    }
    let value = match serde_json::from_str::<serde_json::Value>(&json_value) {
        Ok(value) => value,
        Err(err) => {
            return OnboardingResponse::failure(format!(
                "onboarding_save_answer failed: invalid JSON value: {err}"
            ))
        }
    };

    match app() {
        Ok(app) => {
            OnboardingResponse::success("Answer saved.", &app.stores.onboarding.save_answer(id, value))
        }
        Err(message) => OnboardingResponse::failure(message),
    }
}

/// Clears all onboarding progress.
#[flutter_rust_bridge::frb(sync)]
pub fn onboarding_reset() -> OnboardingResponse {
    match app() {
        Ok(app) => OnboardingResponse::success("Onboarding reset.", &app.stores.onboarding.reset()),
        Err(message) => OnboardingResponse::failure(message),
    }
}

/// Current session state.
#[flutter_rust_bridge::frb(sync)]
pub fn session_snapshot() -> SessionResponse {
    match app() {
        Ok(app) => SessionResponse::success("ok", app.stores.session.snapshot()),
        Err(message) => SessionResponse::failure(message),
    }
}

/// Signs in with the profile and tokens returned by the auth backend.
///
/// # FFI contract
/// - Sync call; persistence to the secure backend happens in the background.
/// - Never panics; blank `user_id` or `access_token` returns a failure
///   envelope and leaves the session unchanged.
#[flutter_rust_bridge::frb(sync)]
pub fn session_sign_in(
    user_id: String,
    email: String,
    name: Option<String>,
    avatar_url: Option<String>,
    access_token: String,
    refresh_token: Option<String>,
) -> SessionResponse {
    let app = match app() {
        Ok(app) => app,
        Err(message) => return SessionResponse::failure(message),
    };
    let user = UserProfile {
        name,
        avatar_url,
        ..UserProfile::new(user_id, email)
    };
    match app.stores.session.sign_in(user, access_token, refresh_token) {
        Ok(state) => SessionResponse::success("Signed in.", state),
        Err(err) => SessionResponse::failure(format!("session_sign_in failed: {err}")),
    }
}

/// Clears user and tokens.
#[flutter_rust_bridge::frb(sync)]
pub fn session_sign_out() -> SessionResponse {
    match app() {
        Ok(app) => SessionResponse::success("Signed out.", app.stores.session.sign_out()),
        Err(message) => SessionResponse::failure(message),
    }
}

fn app() -> Result<&'static AppContext, String> {
    APP.get()
        .ok_or_else(|| "app not bootstrapped; call app_bootstrap first".to_string())
}

fn resolve_config(data_dir: &str, platform: Option<&str>) -> Result<StateConfig, String> {
    let mut config =
        StateConfig::from_env().map_err(|err| format!("app_bootstrap failed: {err}"))?;

    let data_dir = data_dir.trim();
    if !data_dir.is_empty() {
        let path = PathBuf::from(data_dir);
        if !path.is_absolute() {
            return Err(format!(
                "app_bootstrap failed: data_dir must be an absolute path, got `{data_dir}`"
            ));
        }
        config.data_dir = path;
    }
    if let Some(raw) = platform {
        config.platform = raw
            .parse::<Platform>()
            .map_err(|err| format!("app_bootstrap failed: {err}"))?;
    }
    Ok(config)
}

fn start_app(config: StateConfig) -> Result<AppContext, String> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(RUNTIME_WORKER_THREADS)
        .thread_name(RUNTIME_THREAD_NAME)
        .enable_all()
        .build()
        .map_err(|err| format!("app_bootstrap failed: runtime start failed: {err}"))?;

    let stores = AppStores::open(config, runtime.handle().clone())
        .map_err(|err| format!("app_bootstrap failed: {err}"))?;
    let report = runtime.block_on(stores.hydrate());

    info!(
        "event=app_bootstrap module=ffi status=ok platform={} onboarding={} session={}",
        stores.config().platform,
        outcome_label(&report.onboarding),
        outcome_label(&report.session)
    );
    Ok(AppContext {
        runtime,
        stores,
        report,
    })
}

fn outcome_label(outcome: &LoadOutcome) -> &'static str {
    match outcome {
        LoadOutcome::Fresh => "fresh",
        LoadOutcome::Restored => "restored",
        LoadOutcome::Migrated { .. } => "migrated",
        LoadOutcome::Fallback(_) => "fallback",
    }
}

fn bootstrap_step(decision: &BootstrapDecision) -> Option<u32> {
    match decision {
        BootstrapDecision::Untouched => None,
        BootstrapDecision::EnvOverride(step)
        | BootstrapDecision::DevDefault(step) => Some(*step),
    }
}
