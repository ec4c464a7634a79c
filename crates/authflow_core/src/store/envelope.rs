//! On-disk envelope pairing a schema version with a state payload.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted wrapper for one store: `{ "version": n, "payload": { .. } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEnvelope {
    pub version: u32,
    pub payload: Value,
}

impl StoredEnvelope {
    pub fn new(version: u32, payload: Value) -> Self {
        Self { version, payload }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a raw envelope; a payload that is not a JSON object is corrupt.
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        Self::decode_or_bare(raw, None)
    }

    /// Like `decode`, but when `bare_version` is set, an object carrying
    /// neither `version` nor `payload` is read as a payload stored without
    /// an envelope at that version.
    pub fn decode_or_bare(raw: &str, bare_version: Option<u32>) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let bare = value
            .as_object()
            .is_some_and(|map| !map.contains_key("version") && !map.contains_key("payload"));
        match bare_version {
            Some(version) if bare => Ok(Self::new(version, value)),
            _ => Self::from_value(value),
        }
    }

    fn from_value(value: Value) -> serde_json::Result<Self> {
        let envelope: Self = serde_json::from_value(value)?;
        if !envelope.payload.is_object() {
            return Err(serde_json::Error::custom(
                "envelope payload must be a JSON object",
            ));
        }
        Ok(envelope)
    }
}
