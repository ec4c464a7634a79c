//! Process-wide store context.
//!
//! # Responsibility
//! - Build both stores once at startup from `StateConfig`, routing each to
//!   its backend.
//! - Hydrate both stores concurrently and run the onboarding bootstrap.
//!
//! # Invariants
//! - One `AppStores` per process; consumers receive it by reference.
//! - Routing decided here is never revisited.
//! - The credential sandbox is only opened when a store routes to it.
//! - Under the refuse policy no session copy survives in plain storage.

use crate::config::StateConfig;
use crate::onboarding::{apply_bootstrap, BootstrapDecision, OnboardingSchema, OnboardingStore};
use crate::session::{SessionSchema, SessionStore};
use crate::storage::{
    log_backend_choice, select_backend, BackendKind, CredentialStore, DisabledStore,
    FileCredentialStore, LocalKvStore, SecureAdapter, SqliteKvStore, StorageAdapter,
    StorageResult,
};
use crate::store::{LoadOutcome, StoreSchema};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;

/// Per-store hydration results of one `AppStores::hydrate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationReport {
    pub onboarding: LoadOutcome,
    pub session: LoadOutcome,
    pub bootstrap: BootstrapDecision,
}

/// Both persisted stores plus the config they were built from.
pub struct AppStores {
    pub onboarding: OnboardingStore,
    pub session: SessionStore,
    config: StateConfig,
    /// Plain backend that may still hold a session written before the
    /// secure fallback was refused.
    stale_session: Option<Arc<dyn StorageAdapter>>,
}

impl AppStores {
    /// Builds stores with the sandboxed file credential store under
    /// `config.credentials_dir()`, opened only if the session routes there.
    pub fn open(config: StateConfig, runtime: Handle) -> StorageResult<Self> {
        let sandbox = CredentialSource::Sandbox(config.credentials_dir());
        Self::open_from(config, sandbox, runtime)
    }

    /// Builds stores routed by `config`, using `credentials` wherever the
    /// secure backend is selected.
    pub fn open_with_credentials(
        config: StateConfig,
        credentials: Arc<dyn CredentialStore>,
        runtime: Handle,
    ) -> StorageResult<Self> {
        Self::open_from(config, CredentialSource::Provided(credentials), runtime)
    }

    fn open_from(
        config: StateConfig,
        credentials: CredentialSource,
        runtime: Handle,
    ) -> StorageResult<Self> {
        let (onboarding_adapter, session_adapter, stale_session) = {
            let mut factory = AdapterFactory {
                config: &config,
                credentials,
                plain: None,
            };
            let onboarding = factory.adapter_for::<OnboardingSchema>()?;
            let session = factory.adapter_for::<SessionSchema>()?;
            let stale = if session.backend() == BackendKind::Disabled {
                Some(factory.plain()?)
            } else {
                None
            };
            (onboarding, session, stale)
        };

        let mut stores = Self::with_adapters(config, onboarding_adapter, session_adapter, runtime);
        stores.stale_session = stale_session;
        Ok(stores)
    }

    /// Builds stores over explicit adapters.
    pub fn with_adapters(
        config: StateConfig,
        onboarding_adapter: Arc<dyn StorageAdapter>,
        session_adapter: Arc<dyn StorageAdapter>,
        runtime: Handle,
    ) -> Self {
        Self {
            onboarding: OnboardingStore::new(onboarding_adapter, runtime.clone()),
            session: SessionStore::new(session_adapter, runtime),
            config,
            stale_session: None,
        }
    }

    /// Loads both stores concurrently, then applies the onboarding bootstrap.
    ///
    /// With a refused secure fallback, any session left in plain storage is
    /// deleted first.
    pub async fn hydrate(&self) -> HydrationReport {
        let started_at = Instant::now();
        self.purge_stale_session().await;
        let (onboarding, session) = tokio::join!(self.onboarding.load(), self.session.load());
        let bootstrap = apply_bootstrap(&self.onboarding, &self.config.bootstrap_options());

        info!(
            "event=app_hydrate module=context status=ok duration_ms={} onboarding={:?} session={:?}",
            started_at.elapsed().as_millis(),
            onboarding,
            session
        );
        HydrationReport {
            onboarding,
            session,
            bootstrap,
        }
    }

    /// Both stores finished their first load.
    pub fn is_hydrated(&self) -> bool {
        self.onboarding.has_hydrated() && self.session.has_hydrated()
    }

    /// Waits for every queued write on both stores.
    pub async fn flush(&self) {
        tokio::join!(self.onboarding.flush(), self.session.flush());
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    async fn purge_stale_session(&self) {
        let Some(plain) = &self.stale_session else {
            return;
        };
        match plain.remove(SessionSchema::KEY).await {
            Ok(()) => info!(
                "event=session_purge module=context status=ok store={} backend={}",
                SessionSchema::KEY,
                plain.backend()
            ),
            Err(err) => warn!(
                "event=session_purge module=context status=error store={} backend={} error={}",
                SessionSchema::KEY,
                plain.backend(),
                err
            ),
        }
    }
}

/// Where secure-routed stores get their credential store from.
enum CredentialSource {
    Provided(Arc<dyn CredentialStore>),
    /// File store opened on first use.
    Sandbox(PathBuf),
}

struct AdapterFactory<'a> {
    config: &'a StateConfig,
    credentials: CredentialSource,
    /// Plain backend shared by every store routed to it.
    plain: Option<Arc<dyn StorageAdapter>>,
}

impl AdapterFactory<'_> {
    fn adapter_for<S: StoreSchema>(&mut self) -> StorageResult<Arc<dyn StorageAdapter>> {
        let backend = select_backend(
            S::SENSITIVITY,
            self.config.platform,
            self.config.secure_fallback,
        );
        log_backend_choice(S::KEY, S::SENSITIVITY, self.config.platform, backend);

        match backend {
            BackendKind::NativeKv | BackendKind::WebLocal => self.plain(),
            BackendKind::Secure => Ok(Arc::new(SecureAdapter::new(self.credentials()?))),
            BackendKind::Disabled => Ok(Arc::new(DisabledStore)),
        }
    }

    fn credentials(&mut self) -> StorageResult<Arc<dyn CredentialStore>> {
        let store: Arc<dyn CredentialStore> = match &self.credentials {
            CredentialSource::Provided(store) => return Ok(Arc::clone(store)),
            CredentialSource::Sandbox(dir) => Arc::new(FileCredentialStore::open(dir)?),
        };
        self.credentials = CredentialSource::Provided(Arc::clone(&store));
        Ok(store)
    }

    /// Plain backend for the configured platform, shared by every caller.
    fn plain(&mut self) -> StorageResult<Arc<dyn StorageAdapter>> {
        if let Some(adapter) = &self.plain {
            return Ok(Arc::clone(adapter));
        }

        std::fs::create_dir_all(self.config.data_dir())?;
        let adapter: Arc<dyn StorageAdapter> = if self.config.platform.is_native() {
            Arc::new(SqliteKvStore::open(self.config.kv_db_path())?)
        } else {
            Arc::new(LocalKvStore::open(self.config.local_storage_path())?)
        };
        self.plain = Some(Arc::clone(&adapter));
        Ok(adapter)
    }
}
