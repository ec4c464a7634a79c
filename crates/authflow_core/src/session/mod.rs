//! Authenticated session store (user + tokens), kept in secure storage.
//!
//! # Invariants
//! - `user` and `access_token` are present together or absent together.
//! - Sign-out clears user, access token and refresh token in one mutation.
//! - Token refresh/expiry is handled outside this crate.

mod state;
mod store;

pub use state::{SessionSchema, SessionState, UserProfile, SESSION_STORE_KEY, SESSION_VERSION};
pub use store::{SessionError, SessionStore};
