//! Availability records: the template a user fills in, the recurrence rule
//! that repeats it, the drafts expansion produces, and the persisted rows the
//! store hands back.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::calendar::{format_local_date, format_local_time, parse_local_date, parse_local_time};
use crate::error::AvailabilityError;

/// Identifier of the person an availability record belongs to.
pub type OwnerId = String;

/// Store-assigned identifier of a persisted availability record.
pub type RecordId = String;

// ── Enumerations ────────────────────────────────────────────────────────────

/// Whether the person can be rostered during the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        })
    }
}

impl FromStr for AvailabilityStatus {
    type Err = AvailabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "unavailable" => Ok(Self::Unavailable),
            other => Err(AvailabilityError::InvalidValue(format!(
                "unknown availability status '{other}'"
            ))),
        }
    }
}

/// How a draft came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Entered directly as a single occurrence.
    #[default]
    Manual,
    /// Generated by expanding a recurrence rule.
    Recurrence,
}

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Weekly,
    Monthly,
}

impl fmt::Display for RecurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        })
    }
}

impl FromStr for RecurrenceKind {
    type Err = AvailabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(AvailabilityError::InvalidValue(format!(
                "unknown recurrence kind '{other}'"
            ))),
        }
    }
}

// ── Time windows ────────────────────────────────────────────────────────────

/// A same-day `[start, end)` wall-clock window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Build a window, rejecting empty and inverted ranges.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, AvailabilityError> {
        if start >= end {
            return Err(AvailabilityError::InvalidWindow(format!(
                "start {} must be before end {}",
                format_local_time(start),
                format_local_time(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Half-open overlap: windows that only touch at a boundary do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Length of the shared part of two windows, zero when they do not overlap.
    pub fn overlap_minutes(&self, other: &TimeWindow) -> i64 {
        if !self.overlaps(other) {
            return 0;
        }
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end - start).num_minutes()
    }

    /// Smallest window covering both.
    pub fn union(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            format_local_time(self.start),
            format_local_time(self.end)
        )
    }
}

// ── Template and rule ───────────────────────────────────────────────────────

/// The single window a user enters, anchored on one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityTemplate {
    pub owner_id: OwnerId,
    /// Anchor date; the first possible occurrence.
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub status: AvailabilityStatus,
}

impl AvailabilityTemplate {
    /// Build a template, validating that `start < end`.
    pub fn new(
        owner_id: impl Into<OwnerId>,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        status: AvailabilityStatus,
    ) -> Result<Self, AvailabilityError> {
        TimeWindow::new(start, end)?;
        Ok(Self {
            owner_id: owner_id.into(),
            date,
            start,
            end,
            status,
        })
    }

    /// Build a template from form strings (`YYYY-MM-DD`, `HH:MM`, status name).
    ///
    /// # Examples
    ///
    /// ```
    /// use availability_engine::AvailabilityTemplate;
    ///
    /// let t = AvailabilityTemplate::parse("ff-17", "2025-02-10", "09:00", "17:00", "available").unwrap();
    /// assert_eq!(t.window().to_string(), "09:00-17:00");
    /// ```
    pub fn parse(
        owner_id: impl Into<OwnerId>,
        date: &str,
        start: &str,
        end: &str,
        status: &str,
    ) -> Result<Self, AvailabilityError> {
        Self::new(
            owner_id,
            parse_local_date(date)?,
            parse_local_time(start)?,
            parse_local_time(end)?,
            status.parse()?,
        )
    }

    /// Re-check invariants; deserialized templates skip [`AvailabilityTemplate::new`].
    pub fn validate(&self) -> Result<(), AvailabilityError> {
        TimeWindow::new(self.start, self.end).map(|_| ())
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }

    /// A draft of this template on `date`.
    pub fn draft_on(&self, date: NaiveDate, origin: Origin) -> AvailabilityDraft {
        AvailabilityDraft {
            owner_id: self.owner_id.clone(),
            date,
            start: self.start,
            end: self.end,
            status: self.status,
            origin,
        }
    }
}

/// How a template repeats.
///
/// `weekdays` and `biweekly` only mean something for weekly rules. Weekdays
/// are numbered 0 (Sunday) through 6 (Saturday).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub kind: RecurrenceKind,
    #[serde(default)]
    pub weekdays: BTreeSet<u8>,
    #[serde(default)]
    pub biweekly: bool,
    /// Inclusive last date an occurrence may fall on.
    pub end_date: NaiveDate,
    /// Dates skipped even when the rule matches them.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude_dates: BTreeSet<NaiveDate>,
}

impl RecurrenceRule {
    pub fn weekly(weekdays: impl IntoIterator<Item = u8>, end_date: NaiveDate) -> Self {
        Self {
            kind: RecurrenceKind::Weekly,
            weekdays: weekdays.into_iter().collect(),
            biweekly: false,
            end_date,
            exclude_dates: BTreeSet::new(),
        }
    }

    pub fn monthly(end_date: NaiveDate) -> Self {
        Self {
            kind: RecurrenceKind::Monthly,
            weekdays: BTreeSet::new(),
            biweekly: false,
            end_date,
            exclude_dates: BTreeSet::new(),
        }
    }

    /// Emit only every other matching week.
    pub fn every_other_week(mut self) -> Self {
        self.biweekly = true;
        self
    }

    pub fn excluding(mut self, date: NaiveDate) -> Self {
        self.exclude_dates.insert(date);
        self
    }

    /// Check that the rule can be expanded.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::InvalidRule`] when a weekly rule names no
    /// weekdays or a weekday index above 6.
    pub fn validate(&self) -> Result<(), AvailabilityError> {
        if self.kind != RecurrenceKind::Weekly {
            return Ok(());
        }
        if self.weekdays.is_empty() {
            return Err(AvailabilityError::InvalidRule(
                "weekly rule requires at least one weekday".to_string(),
            ));
        }
        if let Some(bad) = self.weekdays.iter().find(|w| **w > 6) {
            return Err(AvailabilityError::InvalidRule(format!(
                "weekday index {bad} out of range 0-6"
            )));
        }
        Ok(())
    }
}

// ── Drafts and persisted records ────────────────────────────────────────────

/// One concrete, not yet persisted occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityDraft {
    pub owner_id: OwnerId,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub origin: Origin,
}

impl AvailabilityDraft {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }
}

impl fmt::Display for AvailabilityDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({})",
            self.owner_id,
            format_local_date(self.date),
            self.window(),
            self.status
        )
    }
}

/// A record as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAvailability {
    pub id: RecordId,
    pub owner_id: OwnerId,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub origin: Origin,
}

impl PersistedAvailability {
    pub fn from_draft(id: impl Into<RecordId>, draft: &AvailabilityDraft) -> Self {
        Self {
            id: id.into(),
            owner_id: draft.owner_id.clone(),
            date: draft.date,
            start: draft.start,
            end: draft.end,
            status: draft.status,
            origin: draft.origin,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }

    /// Same owner, date, window and status as `draft`.
    pub fn is_duplicate_of(&self, draft: &AvailabilityDraft) -> bool {
        self.owner_id == draft.owner_id
            && self.date == draft.date
            && self.window() == draft.window()
            && self.status == draft.status
    }
}
