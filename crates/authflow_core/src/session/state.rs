//! Session state and its persisted schema.

use crate::storage::Sensitivity;
use crate::store::{MigrationError, StoreSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Debug, Formatter};

/// Storage key of the session envelope.
pub const SESSION_STORE_KEY: &str = "session-storage";
/// The session schema has never changed shape.
pub const SESSION_VERSION: u32 = 1;

/// Signed-in user as returned by the (mocked) auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Opaque backend identifier.
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
            avatar_url: None,
        }
    }
}

/// Current session; also the persisted payload shape.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some() && self.access_token.is_some()
    }

    /// Signed in with user + access token, or fully signed out.
    pub fn is_consistent(&self) -> bool {
        match (&self.user, &self.access_token) {
            (Some(_), Some(_)) => true,
            (None, None) => self.refresh_token.is_none(),
            _ => false,
        }
    }
}

// Tokens must never reach logs.
impl Debug for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("user", &self.user)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Schema binding session state to the versioned store engine.
pub struct SessionSchema;

impl StoreSchema for SessionSchema {
    type State = SessionState;

    const KEY: &'static str = SESSION_STORE_KEY;
    const CURRENT_VERSION: u32 = SESSION_VERSION;
    const SENSITIVITY: Sensitivity = Sensitivity::Secure;
    const BARE_PAYLOAD_VERSION: Option<u32> = Some(SESSION_VERSION);

    fn partialize(state: &SessionState) -> serde_json::Result<Value> {
        serde_json::to_value(state)
    }

    /// Identity migration plus the user/token pairing check.
    fn migrate(payload: Value, _from_version: u32) -> Result<SessionState, MigrationError> {
        let state: SessionState = serde_json::from_value(payload)?;
        if !state.is_consistent() {
            return Err(MigrationError::Invariant(
                "user and accessToken must be set or cleared together".to_string(),
            ));
        }
        Ok(state)
    }
}
