//! Onboarding state, versioned payload shapes and schema.

use crate::storage::Sensitivity;
use crate::store::{MigrationError, StoreSchema};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Storage key of the onboarding envelope.
pub const ONBOARDING_STORE_KEY: &str = "onboarding-storage";
/// Schema version written by this build.
pub const ONBOARDING_VERSION: u32 = 2;

/// Collected answers keyed by question/step identifier. Values are
/// free-form and never validated by the store.
pub type Answers = BTreeMap<String, Value>;

/// Current (v2) onboarding state; also the persisted v2 payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub step_index: u32,
    /// Missing or non-object answers decode as empty.
    #[serde(default, deserialize_with = "answers_or_empty")]
    pub answers: Answers,
}

impl Default for OnboardingState {
    fn default() -> Self {
        Self {
            version: ONBOARDING_VERSION,
            step_index: 0,
            answers: Answers::new(),
        }
    }
}

impl OnboardingState {
    /// No progress recorded: first step and no answers.
    pub fn is_pristine(&self) -> bool {
        self.step_index == 0 && self.answers.is_empty()
    }
}

fn current_version() -> u32 {
    ONBOARDING_VERSION
}

fn answers_or_empty<'de, D>(deserializer: D) -> Result<Answers, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(coerce_answers)
}

/// Keeps an answers object as-is; anything else becomes `{}`.
pub fn coerce_answers(raw: Value) -> Answers {
    match raw {
        Value::Object(map) => map.into_iter().collect(),
        _ => Answers::new(),
    }
}

/// Payload written before answers were guaranteed to be an object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingPayloadV1 {
    #[serde(default)]
    pub step_index: u32,
    /// Anything, including absent (`Null`).
    #[serde(default)]
    pub answers: Value,
}

/// Stored onboarding payload, tagged by the envelope version.
#[derive(Debug, Clone, PartialEq)]
pub enum OnboardingPayload {
    V1(OnboardingPayloadV1),
    V2(OnboardingState),
}

impl OnboardingPayload {
    /// Interprets `payload` as written at `version`. Version 0 predates
    /// explicit versioning and shares the v1 shape.
    pub fn parse(payload: Value, version: u32) -> Result<Self, MigrationError> {
        match version {
            0 | 1 => Ok(Self::V1(serde_json::from_value(payload)?)),
            ONBOARDING_VERSION => Ok(Self::V2(serde_json::from_value(payload)?)),
            stored => Err(MigrationError::UnsupportedVersion {
                stored,
                current: ONBOARDING_VERSION,
            }),
        }
    }

    /// Applies each upgrade step in order until the payload is current.
    pub fn into_current(self) -> OnboardingState {
        let v2 = match self {
            Self::V1(v1) => upgrade_v1_to_v2(v1),
            Self::V2(v2) => v2,
        };
        OnboardingState {
            version: ONBOARDING_VERSION,
            ..v2
        }
    }
}

/// v1 -> v2: `answers` becomes `{}` unless it already is an object.
pub fn upgrade_v1_to_v2(v1: OnboardingPayloadV1) -> OnboardingState {
    OnboardingState {
        version: ONBOARDING_VERSION,
        step_index: v1.step_index,
        answers: coerce_answers(v1.answers),
    }
}

/// Schema binding onboarding state to the versioned store engine.
pub struct OnboardingSchema;

impl StoreSchema for OnboardingSchema {
    type State = OnboardingState;

    const KEY: &'static str = ONBOARDING_STORE_KEY;
    const CURRENT_VERSION: u32 = ONBOARDING_VERSION;
    const SENSITIVITY: Sensitivity = Sensitivity::Plain;

    fn partialize(state: &OnboardingState) -> serde_json::Result<Value> {
        serde_json::to_value(state)
    }

    fn migrate(payload: Value, from_version: u32) -> Result<OnboardingState, MigrationError> {
        OnboardingPayload::parse(payload, from_version).map(OnboardingPayload::into_current)
    }
}

#[cfg(test)]
mod tests {
    use super::{OnboardingPayload, OnboardingSchema, OnboardingState};
    use crate::store::{MigrationError, StoreSchema};
    use serde_json::json;

    #[test]
    fn partialize_uses_camel_case_wire_fields() {
        let state = OnboardingState {
            step_index: 4,
            answers: [("goal".to_string(), json!("sleep"))].into_iter().collect(),
            ..OnboardingState::default()
        };

        let payload = OnboardingSchema::partialize(&state).expect("partialize");
        assert_eq!(
            payload,
            json!({ "version": 2, "stepIndex": 4, "answers": { "goal": "sleep" } })
        );
    }

    #[test]
    fn v1_payload_keeps_object_answers() {
        let state = OnboardingSchema::migrate(
            json!({ "stepIndex": 2, "answers": { "name": "Ada" } }),
            1,
        )
        .expect("migrate");
        assert_eq!(state.version, 2);
        assert_eq!(state.step_index, 2);
        assert_eq!(state.answers.get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn v2_payload_with_bad_step_type_is_malformed() {
        let err = OnboardingSchema::migrate(json!({ "stepIndex": "three", "answers": {} }), 2)
            .expect_err("stepIndex must be numeric");
        assert!(matches!(err, MigrationError::Malformed(_)));
    }

    #[test]
    fn v2_payload_without_usable_answers_keeps_step() {
        for payload in [
            json!({ "stepIndex": 5 }),
            json!({ "stepIndex": 5, "answers": null }),
            json!({ "stepIndex": 5, "answers": [1, 2] }),
        ] {
            let state = OnboardingSchema::migrate(payload, 2).expect("migrate");
            assert_eq!(state.step_index, 5);
            assert!(state.answers.is_empty());
            assert_eq!(state.version, 2);
        }
    }

    #[test]
    fn migrating_a_migrated_payload_is_stable() {
        let once = OnboardingSchema::migrate(json!({ "stepIndex": 5, "answers": "x" }), 1)
            .expect("first migrate");
        let payload = OnboardingSchema::partialize(&once).expect("partialize");
        let twice = OnboardingSchema::migrate(payload, 2).expect("second migrate");
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_version_is_rejected_by_parse() {
        let err = OnboardingPayload::parse(json!({}), 7).expect_err("v7 is unknown");
        assert!(matches!(
            err,
            MigrationError::UnsupportedVersion {
                stored: 7,
                current: 2
            }
        ));
    }

    #[test]
    fn pristine_means_first_step_without_answers() {
        let mut state = OnboardingState::default();
        assert!(state.is_pristine());
        state.answers.insert("a".to_string(), json!(1));
        assert!(!state.is_pristine());
    }
}
