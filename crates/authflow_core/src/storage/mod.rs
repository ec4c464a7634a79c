//! Async key/value storage adapters and backend routing.
//!
//! # Responsibility
//! - Define the uniform `StorageAdapter` contract used by every store.
//! - Provide the plain (native SQLite, web local) and secure backends.
//! - Route each store to a backend as a pure function of sensitivity,
//!   platform and the configured secure fallback policy.
//!
//! # Invariants
//! - `get` of an absent key is `Ok(None)`, never an error.
//! - Backend selection is decided once at startup and never changes.
//! - Each store key lives in exactly one backend.

use async_trait::async_trait;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

mod local_kv;
mod secure;
mod sqlite_kv;

pub use local_kv::LocalKvStore;
pub use secure::{
    CredentialStore, DisabledStore, FileCredentialStore, MemoryCredentialStore, SecureAdapter,
};
pub use sqlite_kv::{latest_schema_version, SqliteKvStore};

pub type StorageResult<T> = Result<T, StorageError>;

/// Failure of an underlying storage backend.
///
/// Callers in the store engine treat every variant as non-fatal.
#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    /// The kv database was written by a newer build.
    SchemaTooNew { found: u32, supported: u32 },
    Io(std::io::Error),
    Encode(serde_json::Error),
    /// Backend refuses persistence (fail-closed secure policy).
    Unavailable(BackendKind),
    /// Blocking worker died before reporting a result.
    Task(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite failed: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "kv schema version {found} is newer than supported {supported}"
            ),
            Self::Io(err) => write!(f, "storage io failed: {err}"),
            Self::Encode(err) => write!(f, "storage encoding failed: {err}"),
            Self::Unavailable(kind) => write!(f, "storage backend `{kind}` refuses persistence"),
            Self::Task(message) => write!(f, "storage worker failed: {message}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::SchemaTooNew { .. } | Self::Unavailable(_) | Self::Task(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Task(value.to_string())
    }
}

/// Uniform async key/value contract over every physical backend.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Physical backend behind this adapter, used in diagnostics.
    fn backend(&self) -> BackendKind;

    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Whether a store holds credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    Plain,
    Secure,
}

/// Runtime platform the state layer runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android,
    Ios,
    Macos,
    Windows,
    Linux,
    Web,
}

impl Platform {
    /// Platform of the current compile target.
    pub fn current() -> Self {
        if cfg!(target_arch = "wasm32") {
            Self::Web
        } else if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else if cfg!(target_os = "macos") {
            Self::Macos
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Macos => "macos",
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Web => "web",
        }
    }

    /// Whether the platform offers a keychain-like credential primitive.
    pub fn has_secure_storage(self) -> bool {
        !matches!(self, Self::Web)
    }

    /// Native targets run the environment-driven onboarding bootstrap.
    pub fn is_native(self) -> bool {
        !matches!(self, Self::Web)
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            "macos" => Ok(Self::Macos),
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "web" => Ok(Self::Web),
            other => Err(format!(
                "unsupported platform `{other}`; expected android|ios|macos|windows|linux|web"
            )),
        }
    }
}

/// What to do with secure data on a platform without a secure primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecureFallback {
    /// Store credentials in the plain backend. Acceptable for the mock auth
    /// flow only.
    #[default]
    PlainStorage,
    /// Refuse persistence; the user re-authenticates every launch.
    Refuse,
}

impl FromStr for SecureFallback {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::PlainStorage),
            "refuse" => Ok(Self::Refuse),
            other => Err(format!(
                "unsupported secure fallback `{other}`; expected plain|refuse"
            )),
        }
    }
}

/// Physical backend chosen for one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// SQLite-backed key/value table on native targets.
    NativeKv,
    /// Synchronous local key/value map on the web target.
    WebLocal,
    /// Platform credential store.
    Secure,
    /// Fail-closed sink.
    Disabled,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NativeKv => "native_kv",
            Self::WebLocal => "web_local",
            Self::Secure => "secure",
            Self::Disabled => "disabled",
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chooses the backend for a store.
///
/// Pure: the same inputs always yield the same backend.
pub fn select_backend(
    sensitivity: Sensitivity,
    platform: Platform,
    fallback: SecureFallback,
) -> BackendKind {
    let plain = if platform.is_native() {
        BackendKind::NativeKv
    } else {
        BackendKind::WebLocal
    };

    match sensitivity {
        Sensitivity::Plain => plain,
        Sensitivity::Secure if platform.has_secure_storage() => BackendKind::Secure,
        Sensitivity::Secure => match fallback {
            SecureFallback::PlainStorage => plain,
            SecureFallback::Refuse => BackendKind::Disabled,
        },
    }
}

/// Logs the routing decision, flagging a confidentiality downgrade.
pub(crate) fn log_backend_choice(
    store_key: &str,
    sensitivity: Sensitivity,
    platform: Platform,
    backend: BackendKind,
) {
    if sensitivity == Sensitivity::Secure && backend != BackendKind::Secure {
        warn!(
            "event=backend_select module=storage status=fallback store={} platform={} backend={} secure_available=false",
            store_key, platform, backend
        );
    } else {
        info!(
            "event=backend_select module=storage status=ok store={} platform={} backend={}",
            store_key, platform, backend
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{select_backend, BackendKind, Platform, SecureFallback, Sensitivity};

    #[test]
    fn plain_stores_route_by_platform() {
        for platform in [
            Platform::Android,
            Platform::Ios,
            Platform::Macos,
            Platform::Windows,
            Platform::Linux,
        ] {
            assert_eq!(
                select_backend(Sensitivity::Plain, platform, SecureFallback::Refuse),
                BackendKind::NativeKv
            );
        }
        assert_eq!(
            select_backend(Sensitivity::Plain, Platform::Web, SecureFallback::Refuse),
            BackendKind::WebLocal
        );
    }

    #[test]
    fn secure_stores_use_credential_store_when_available() {
        assert_eq!(
            select_backend(Sensitivity::Secure, Platform::Ios, SecureFallback::PlainStorage),
            BackendKind::Secure
        );
        assert_eq!(
            select_backend(Sensitivity::Secure, Platform::Android, SecureFallback::Refuse),
            BackendKind::Secure
        );
    }

    #[test]
    fn web_secure_store_follows_fallback_policy() {
        assert_eq!(
            select_backend(Sensitivity::Secure, Platform::Web, SecureFallback::PlainStorage),
            BackendKind::WebLocal
        );
        assert_eq!(
            select_backend(Sensitivity::Secure, Platform::Web, SecureFallback::Refuse),
            BackendKind::Disabled
        );
    }

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!(" Web ".parse::<Platform>(), Ok(Platform::Web));
        assert_eq!("IOS".parse::<Platform>(), Ok(Platform::Ios));
        assert!("symbian".parse::<Platform>().is_err());
    }

    #[test]
    fn secure_fallback_parses_known_values() {
        assert_eq!("plain".parse::<SecureFallback>(), Ok(SecureFallback::PlainStorage));
        assert_eq!("REFUSE".parse::<SecureFallback>(), Ok(SecureFallback::Refuse));
        assert!("maybe".parse::<SecureFallback>().is_err());
    }
}
