//! Session store operations on top of the versioned engine.

use super::state::{SessionSchema, SessionState, UserProfile};
use crate::storage::StorageAdapter;
use crate::store::{LoadOutcome, VersionedStore};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Rejected sign-in input; the session is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    EmptyUserId,
    EmptyAccessToken,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUserId => write!(f, "user id cannot be empty"),
            Self::EmptyAccessToken => write!(f, "access token cannot be empty"),
        }
    }
}

impl Error for SessionError {}

/// Authenticated user and tokens.
pub struct SessionStore {
    inner: VersionedStore<SessionSchema>,
}

impl SessionStore {
    pub fn new(adapter: Arc<dyn StorageAdapter>, runtime: Handle) -> Self {
        Self {
            inner: VersionedStore::new(adapter, runtime),
        }
    }

    pub async fn load(&self) -> LoadOutcome {
        self.inner.load().await
    }

    /// Sets user, access token and refresh token in one mutation.
    ///
    /// # Errors
    /// - `EmptyUserId` / `EmptyAccessToken` for blank input.
    pub fn sign_in(
        &self,
        user: UserProfile,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Result<SessionState, SessionError> {
        let access_token = access_token.into();
        if user.id.trim().is_empty() {
            return Err(SessionError::EmptyUserId);
        }
        if access_token.trim().is_empty() {
            return Err(SessionError::EmptyAccessToken);
        }

        let has_refresh = refresh_token.is_some();
        let state = self.inner.mutate(move |state| {
            *state = SessionState {
                user: Some(user),
                access_token: Some(access_token),
                refresh_token,
            };
        });
        info!(
            "event=session_sign_in module=session status=ok has_refresh_token={}",
            has_refresh
        );
        Ok(state)
    }

    /// Clears user and both tokens in one mutation.
    pub fn sign_out(&self) -> SessionState {
        let state = self.inner.reset();
        info!("event=session_sign_out module=session status=ok");
        state
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.snapshot()
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.with_state(SessionState::is_signed_in)
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.with_state(|state| state.user.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.with_state(|state| state.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.with_state(|state| state.refresh_token.clone())
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

    pub fn engine(&self) -> &VersionedStore<SessionSchema> {
        &self.inner
    }
}
