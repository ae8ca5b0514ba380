//! Expand one availability template and its recurrence rule into concrete
//! dated drafts.
//!
//! Expansion is lazy: [`expand`] validates eagerly and returns an
//! [`Occurrences`] iterator that computes each date on demand, bounded by the
//! rule's inclusive `end_date`. [`RecurrenceExpander::expand_all`] collects
//! the iterator under the configured occurrence cap.
//!
//! # Ordering
//!
//! Weekly rules are expanded one weekday at a time in ascending weekday
//! order (0 = Sunday). Each weekday's dates are chronological but the
//! combined output is not; use [`sort_chronologically`] when a single
//! timeline is needed.
//!
//! # Biweekly
//!
//! Every weekday keeps its own week counter, starting at 0 on the first
//! matching date on or after the anchor. Only even counter values are
//! emitted. A Wednesday anchor with Monday selected therefore starts the
//! Monday cadence on the following Monday, not on the anchor's week.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

use crate::calendar::{advance_by_days, month_with_day, next_weekday_on_or_after};
use crate::config::EngineConfig;
use crate::error::AvailabilityError;
use crate::model::{
    AvailabilityDraft, AvailabilityTemplate, Origin, RecurrenceKind, RecurrenceRule,
};

/// Expander bound to an [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct RecurrenceExpander {
    max_occurrences: usize,
}

impl RecurrenceExpander {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_occurrences: config.max_occurrences,
        }
    }

    /// Lazily expand; see [`expand`].
    pub fn expand(
        &self,
        template: &AvailabilityTemplate,
        rule: Option<&RecurrenceRule>,
    ) -> Result<Occurrences, AvailabilityError> {
        expand(template, rule)
    }

    /// Expand and collect every draft.
    ///
    /// # Errors
    ///
    /// Everything [`expand`] returns, plus
    /// [`AvailabilityError::TooManyOccurrences`] when the rule yields more
    /// than `max_occurrences` drafts.
    pub fn expand_all(
        &self,
        template: &AvailabilityTemplate,
        rule: Option<&RecurrenceRule>,
    ) -> Result<Vec<AvailabilityDraft>, AvailabilityError> {
        let drafts: Vec<_> = expand(template, rule)?
            .take(self.max_occurrences.saturating_add(1))
            .collect();
        if drafts.len() > self.max_occurrences {
            return Err(AvailabilityError::TooManyOccurrences {
                limit: self.max_occurrences,
            });
        }
        Ok(drafts)
    }
}

/// Expand `template` according to `rule`.
///
/// Without a rule the result is exactly one [`Origin::Manual`] draft on the
/// template's date. With a rule every draft is tagged
/// [`Origin::Recurrence`]; an `end_date` before the anchor date yields no
/// drafts.
///
/// # Errors
///
/// Returns [`AvailabilityError::InvalidWindow`] if the template's start is
/// not before its end, or [`AvailabilityError::InvalidRule`] if a weekly rule
/// has no (or out-of-range) weekdays.
///
/// # Examples
///
/// ```
/// use availability_engine::calendar::{format_local_date, parse_local_date};
/// use availability_engine::expander::expand;
/// use availability_engine::{AvailabilityTemplate, RecurrenceRule};
///
/// let template =
///     AvailabilityTemplate::parse("ff-17", "2025-01-06", "08:00", "18:00", "available").unwrap();
/// let rule = RecurrenceRule::weekly([1], parse_local_date("2025-01-27").unwrap());
///
/// let dates: Vec<String> = expand(&template, Some(&rule))
///     .unwrap()
///     .map(|d| format_local_date(d.date))
///     .collect();
/// assert_eq!(dates, ["2025-01-06", "2025-01-13", "2025-01-20", "2025-01-27"]);
/// ```
pub fn expand(
    template: &AvailabilityTemplate,
    rule: Option<&RecurrenceRule>,
) -> Result<Occurrences, AvailabilityError> {
    template.validate()?;

    let Some(rule) = rule else {
        return Ok(Occurrences {
            template: template.clone(),
            end_date: template.date,
            exclude_dates: BTreeSet::new(),
            cursor: Cursor::Single { emitted: false },
        });
    };
    rule.validate()?;

    let cursor = match rule.kind {
        RecurrenceKind::Weekly => Cursor::Weekly {
            weekdays: rule.weekdays.iter().copied().collect(),
            slot: 0,
            next: None,
            week: 0,
            biweekly: rule.biweekly,
        },
        RecurrenceKind::Monthly => Cursor::Monthly { step: 0, done: false },
    };

    Ok(Occurrences {
        template: template.clone(),
        end_date: rule.end_date,
        exclude_dates: rule.exclude_dates.clone(),
        cursor,
    })
}

/// Sort drafts by date, then start time, then end time, keeping generation
/// order for ties.
pub fn sort_chronologically(drafts: &mut [AvailabilityDraft]) {
    drafts.sort_by_key(|d| (d.date, d.start, d.end));
}

/// Lazy sequence of drafts produced by [`expand`].
///
/// Single-use: to expand again, call [`expand`] again.
#[derive(Debug, Clone)]
pub struct Occurrences {
    template: AvailabilityTemplate,
    end_date: NaiveDate,
    exclude_dates: BTreeSet<NaiveDate>,
    cursor: Cursor,
}

#[derive(Debug, Clone)]
enum Cursor {
    Single {
        emitted: bool,
    },
    Weekly {
        weekdays: Vec<u8>,
        slot: usize,
        /// Next candidate for the current weekday; `None` before the first.
        next: Option<NaiveDate>,
        week: u32,
        biweekly: bool,
    },
    Monthly {
        step: i32,
        done: bool,
    },
}

impl Occurrences {
    fn draft(&self, date: NaiveDate, origin: Origin) -> AvailabilityDraft {
        self.template.draft_on(date, origin)
    }
}

impl Iterator for Occurrences {
    type Item = AvailabilityDraft;

    fn next(&mut self) -> Option<Self::Item> {
        let anchor = self.template.date;
        loop {
            match &mut self.cursor {
                Cursor::Single { emitted } => {
                    if *emitted {
                        return None;
                    }
                    *emitted = true;
                    return Some(self.draft(anchor, Origin::Manual));
                }
                Cursor::Weekly {
                    weekdays,
                    slot,
                    next,
                    week,
                    biweekly,
                } => {
                    let weekday = *weekdays.get(*slot)?;
                    let candidate = match *next {
                        Some(date) => Some(date),
                        None if *week == 0 => next_weekday_on_or_after(anchor, weekday),
                        None => None,
                    };
                    let date = match candidate {
                        Some(date) if date <= self.end_date => date,
                        _ => {
                            *slot += 1;
                            *next = None;
                            *week = 0;
                            continue;
                        }
                    };

                    let emit = !*biweekly || *week % 2 == 0;
                    *week += 1;
                    // Overflow leaves `next` empty with a non-zero counter,
                    // which ends this weekday on the following call.
                    *next = advance_by_days(date, 7);

                    if emit && !self.exclude_dates.contains(&date) {
                        return Some(self.draft(date, Origin::Recurrence));
                    }
                }
                Cursor::Monthly { step, done } => {
                    if *done {
                        return None;
                    }
                    let date = month_with_day(anchor.year(), anchor.month(), *step, anchor.day());
                    *step += 1;
                    let date = match date {
                        Some(date) if date >= anchor && date <= self.end_date => date,
                        _ => {
                            *done = true;
                            return None;
                        }
                    };
                    if !self.exclude_dates.contains(&date) {
                        return Some(self.draft(date, Origin::Recurrence));
                    }
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
