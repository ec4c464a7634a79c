//! Versioned persisted state engine.
//!
//! # Responsibility
//! - Hold one in-memory state value per store and persist a partialized
//!   subset of it, wrapped in a versioned envelope.
//! - Load, migrate and write back persisted state on startup.
//! - Track hydration so UI can wait for persisted state before rendering.
//!
//! # Invariants
//! - Loading never fails; any read, parse or migration problem falls back
//!   to the default state.
//! - Hydration flips to `true` exactly once per store.
//! - Writes to one key go through a single-flight queue, so the last
//!   mutation is the last value persisted.

mod envelope;
mod schema;
mod versioned;
mod write_queue;

pub use envelope::StoredEnvelope;
pub use schema::{MigrationError, StoreSchema};
pub use versioned::{FallbackReason, LoadOutcome, VersionedStore};
pub use write_queue::WriteQueue;
