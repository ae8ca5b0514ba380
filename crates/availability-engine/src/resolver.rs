//! Turn a detected conflict plus a chosen action into a resolution plan.
//!
//! The resolver never touches the store. It returns a [`ResolutionPlan`]
//! (ids to delete, an optional record to rewrite, an optional draft to
//! insert) that the store applies as one atomic operation.
//!
//! | action      | to_delete          | to_update            | to_insert |
//! |-------------|--------------------|----------------------|-----------|
//! | `cancel`    | none               | none                 | none      |
//! | `replace`   | all conflicting    | none                 | draft     |
//! | `merge`     | all but survivor   | widened survivor     | none      |
//! | `keep_both` | none               | none                 | draft     |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, MergePolicy};
use crate::conflict::{Conflict, RequiredAction};
use crate::error::AvailabilityError;
use crate::model::{AvailabilityDraft, OwnerId, PersistedAvailability, RecordId};

/// The fixed vocabulary of responses to a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Discard the draft and keep what is stored.
    Cancel,
    /// Delete the conflicting records and insert the draft.
    Replace,
    /// Fold the draft into an existing record instead of inserting it.
    Merge,
    /// Insert the draft and let the overlap stand.
    KeepBoth,
}

impl fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cancel => "cancel",
            Self::Replace => "replace",
            Self::Merge => "merge",
            Self::KeepBoth => "keep_both",
        })
    }
}

impl FromStr for ResolutionAction {
    type Err = AvailabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "cancel" => Ok(Self::Cancel),
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            "keep_both" => Ok(Self::KeepBoth),
            other => Err(AvailabilityError::InvalidValue(format!(
                "unknown resolution action '{other}'"
            ))),
        }
    }
}

/// Mutations the store must apply together, or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    pub owner_id: OwnerId,
    pub action: ResolutionAction,
    pub to_delete: Vec<RecordId>,
    /// An existing record rewritten in place, keeping its id.
    pub to_update: Option<PersistedAvailability>,
    pub to_insert: Option<AvailabilityDraft>,
}

impl ResolutionPlan {
    /// True when applying the plan changes nothing.
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_update.is_none() && self.to_insert.is_none()
    }

    fn empty(conflict: &Conflict, action: ResolutionAction) -> Self {
        Self {
            owner_id: conflict.draft.owner_id.clone(),
            action,
            to_delete: Vec::new(),
            to_update: None,
            to_insert: None,
        }
    }
}

/// Plans resolutions according to an [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    merge_policy: MergePolicy,
    keep_both_requires_consent: bool,
}

impl ConflictResolver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            merge_policy: config.merge_policy,
            keep_both_requires_consent: config.keep_both_requires_consent,
        }
    }

    /// Plan `action` for `conflict`.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::InvalidResolution`] for `keep_both` on a
    /// `choose` conflict when consent is required (use
    /// [`ConflictResolver::resolve_with_consent`]), or for `merge` on a
    /// conflict with no existing records.
    ///
    /// # Examples
    ///
    /// ```
    /// use availability_engine::{
    ///     conflict::find_conflict, AvailabilityTemplate, ConflictResolver, EngineConfig,
    ///     Origin, PersistedAvailability, ResolutionAction,
    /// };
    ///
    /// let shift = AvailabilityTemplate::parse("ff-17", "2025-02-10", "09:00", "17:00", "available").unwrap();
    /// let existing = PersistedAvailability::from_draft("r1", &shift.draft_on(shift.date, Origin::Manual));
    /// let lunch = AvailabilityTemplate::parse("ff-17", "2025-02-10", "12:00", "13:00", "unavailable").unwrap();
    /// let conflict = find_conflict(&lunch.draft_on(lunch.date, Origin::Manual), &[existing]).unwrap();
    ///
    /// let plan = ConflictResolver::new(&EngineConfig::default())
    ///     .resolve(&conflict, ResolutionAction::Replace)
    ///     .unwrap();
    /// assert_eq!(plan.to_delete, vec!["r1".to_string()]);
    /// assert!(plan.to_insert.is_some());
    /// ```
    pub fn resolve(
        &self,
        conflict: &Conflict,
        action: ResolutionAction,
    ) -> Result<ResolutionPlan, AvailabilityError> {
        self.plan(conflict, action, false)
    }

    /// Plan `action` with the user's explicit consent to keep an overlap.
    pub fn resolve_with_consent(
        &self,
        conflict: &Conflict,
        action: ResolutionAction,
    ) -> Result<ResolutionPlan, AvailabilityError> {
        self.plan(conflict, action, true)
    }

    fn plan(
        &self,
        conflict: &Conflict,
        action: ResolutionAction,
        consent: bool,
    ) -> Result<ResolutionPlan, AvailabilityError> {
        let mut plan = ResolutionPlan::empty(conflict, action);
        match action {
            ResolutionAction::Cancel => {}
            ResolutionAction::Replace => {
                plan.to_delete = conflict.existing_ids();
                plan.to_insert = Some(conflict.draft.clone());
            }
            ResolutionAction::Merge => {
                let (survivor, deleted) = self.merge(conflict)?;
                plan.to_update = Some(survivor);
                plan.to_delete = deleted;
            }
            ResolutionAction::KeepBoth => {
                let needs_consent = conflict.required_action == RequiredAction::Choose
                    && self.keep_both_requires_consent;
                if needs_consent && !consent {
                    return Err(AvailabilityError::InvalidResolution(
                        "keep_both on a mutually exclusive conflict requires explicit consent"
                            .to_string(),
                    ));
                }
                plan.to_insert = Some(conflict.draft.clone());
            }
        }
        Ok(plan)
    }

    /// The earliest conflicting record survives, widened to cover the draft
    /// and every other conflicting record, which are deleted.
    ///
    /// Only records in the conflict are considered. If the owner already holds
    /// overlapping records (say from an earlier `keep_both`), the widened
    /// window can reach one of them; the store refuses such an update.
    fn merge(
        &self,
        conflict: &Conflict,
    ) -> Result<(PersistedAvailability, Vec<RecordId>), AvailabilityError> {
        let survivor = conflict
            .existing
            .iter()
            .map(|c| &c.record)
            .min_by(|a, b| (a.start, &a.id).cmp(&(b.start, &b.id)))
            .ok_or_else(|| {
                AvailabilityError::InvalidResolution(
                    "merge needs at least one existing record".to_string(),
                )
            })?;

        let window = conflict
            .existing
            .iter()
            .fold(conflict.draft.window(), |acc, c| acc.union(&c.record.window()));

        let mut merged = survivor.clone();
        merged.start = window.start;
        merged.end = window.end;
        if self.merge_policy == MergePolicy::UnionWindow {
            merged.status = conflict.draft.status;
        }

        let deleted = conflict
            .existing
            .iter()
            .map(|c| c.record.id.clone())
            .filter(|id| *id != survivor.id)
            .collect();

        Ok((merged, deleted))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
