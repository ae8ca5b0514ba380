//! Detect overlaps between an incoming draft and a person's persisted records.
//!
//! Two records overlap when they share a date and their `[start, end)`
//! windows intersect: `a.start < b.end && b.start < a.end`. Windows that only
//! touch (one ends exactly when the other starts) are NOT conflicts.
//!
//! All records overlapping one draft are grouped into a single [`Conflict`],
//! so [`detect`] returns at most one element.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{AvailabilityDraft, PersistedAvailability, RecordId};

/// What a conflict needs before the batch can move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredAction {
    /// Mutually exclusive overlap; a person must pick a resolution.
    Choose,
    /// Exact duplicate of what is already stored; safe to skip silently.
    Auto,
}

impl fmt::Display for RequiredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Choose => "choose",
            Self::Auto => "auto",
        })
    }
}

/// One existing record caught up in a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingRecord {
    pub record: PersistedAvailability,
    pub overlap_minutes: i64,
}

/// An incoming draft paired with every existing record it overlaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub draft: AvailabilityDraft,
    pub existing: Vec<ConflictingRecord>,
    pub required_action: RequiredAction,
}

impl Conflict {
    pub fn existing_ids(&self) -> Vec<RecordId> {
        self.existing.iter().map(|c| c.record.id.clone()).collect()
    }

    pub fn is_duplicate(&self) -> bool {
        self.required_action == RequiredAction::Auto
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} overlaps {} record(s) [{}]",
            self.draft,
            self.existing.len(),
            self.required_action
        )
    }
}

/// Detect conflicts between `draft` and the records already stored.
///
/// Records belonging to other owners are ignored. The conflict is
/// [`RequiredAction::Auto`] only when every overlapping record has the
/// draft's exact window and status; any partial overlap or differing status
/// makes it [`RequiredAction::Choose`].
pub fn detect(draft: &AvailabilityDraft, existing: &[PersistedAvailability]) -> Vec<Conflict> {
    find_conflict(draft, existing).into_iter().collect()
}

/// Like [`detect`], returning the single grouped conflict if there is one.
pub fn find_conflict(
    draft: &AvailabilityDraft,
    existing: &[PersistedAvailability],
) -> Option<Conflict> {
    let window = draft.window();

    let overlapping: Vec<ConflictingRecord> = existing
        .iter()
        .filter(|r| r.owner_id == draft.owner_id && r.date == draft.date)
        .filter(|r| r.window().overlaps(&window))
        .map(|r| ConflictingRecord {
            overlap_minutes: r.window().overlap_minutes(&window),
            record: r.clone(),
        })
        .collect();

    if overlapping.is_empty() {
        return None;
    }

    let required_action = if overlapping.iter().all(|c| c.record.is_duplicate_of(draft)) {
        RequiredAction::Auto
    } else {
        RequiredAction::Choose
    };

    Some(Conflict {
        draft: draft.clone(),
        existing: overlapping,
        required_action,
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────
