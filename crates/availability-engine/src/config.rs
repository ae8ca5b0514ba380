//! Engine configuration.
//!
//! An [`EngineConfig`] is built once by the embedding application and passed
//! into the expander, resolver and session at construction.

use serde::{Deserialize, Serialize};

use crate::error::AvailabilityError;

/// How a `merge` resolution combines a draft with the records it overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Widen the surviving record to the union of all windows and take the
    /// draft's status.
    #[default]
    UnionWindow,
    /// Widen the surviving record to the union of all windows and keep its
    /// own status.
    UnionKeepStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Most drafts a single expansion may collect before failing.
    pub max_occurrences: usize,
    pub merge_policy: MergePolicy,
    /// Whether `keep_both` on a `choose` conflict needs explicit consent.
    pub keep_both_requires_consent: bool,
    /// Whether a session resumes submitting after a resolution is applied.
    pub continue_after_resolution: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_occurrences: 1000,
            merge_policy: MergePolicy::default(),
            keep_both_requires_consent: true,
            continue_after_resolution: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::InvalidConfig`] for malformed JSON or a
    /// zero `max_occurrences`.
    pub fn from_json(json: &str) -> Result<Self, AvailabilityError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AvailabilityError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AvailabilityError> {
        if self.max_occurrences == 0 {
            return Err(AvailabilityError::InvalidConfig(
                "max_occurrences must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
