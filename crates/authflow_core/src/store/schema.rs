//! Per-store schema contract consumed by `VersionedStore`.

use crate::storage::Sensitivity;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure while turning a stored payload into current state.
#[derive(Debug)]
pub enum MigrationError {
    /// Payload does not match the shape of its declared version.
    Malformed(serde_json::Error),
    /// No upgrade path exists for the stored version.
    UnsupportedVersion { stored: u32, current: u32 },
    /// Payload decodes but breaks a state invariant.
    Invariant(String),
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed payload: {err}"),
            Self::UnsupportedVersion { stored, current } => write!(
                f,
                "stored schema version {stored} cannot be migrated to {current}"
            ),
            Self::Invariant(message) => write!(f, "payload violates invariant: {message}"),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::UnsupportedVersion { .. } | Self::Invariant(_) => None,
        }
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value)
    }
}

/// Describes one persisted store: where it lives, which version it writes,
/// what it persists and how older payloads upgrade.
pub trait StoreSchema: Send + Sync + 'static {
    type State: Clone + Default + Send + Sync + 'static;

    /// Storage key; unique per store.
    const KEY: &'static str;
    const CURRENT_VERSION: u32;
    const SENSITIVITY: Sensitivity;
    /// Version of a payload object found without an envelope, for stores
    /// whose older builds wrote the bare state. `None` treats it as corrupt.
    const BARE_PAYLOAD_VERSION: Option<u32> = None;

    /// Selects the persisted subset of `state`.
    fn partialize(state: &Self::State) -> serde_json::Result<Value>;

    /// Turns a payload written at `from_version` into current state.
    ///
    /// Called for every `from_version <= CURRENT_VERSION`. A payload already
    /// at `CURRENT_VERSION` must come back unchanged.
    fn migrate(payload: Value, from_version: u32) -> Result<Self::State, MigrationError>;
}
