//! One batch from template to final tally, as an explicit state machine.
//!
//! ```text
//! Idle ──expand──▶ Expanding ──▶ Submitting ──run──▶ Done
//!                                  ▲      │
//!                          resolve │      │ choose conflict
//!                                  │      ▼
//!                          Resolving ◀── Conflicted ──cancel──▶ Done
//! ```
//!
//! `Expanding` and `Resolving` are transient: they are only observable from
//! inside [`BatchSession::expand`] and [`BatchSession::resolve`]. A failed
//! expansion returns to `Idle`; a failed resolution stays `Conflicted` with
//! nothing applied. `Done` is terminal.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::batch::{BatchOutcome, BatchSubmitter, CancelHandle, DraftFailure};
use crate::config::EngineConfig;
use crate::conflict::Conflict;
use crate::error::AvailabilityError;
use crate::expander::RecurrenceExpander;
use crate::model::{
    AvailabilityDraft, AvailabilityTemplate, OwnerId, PersistedAvailability, RecordId,
    RecurrenceRule,
};
use crate::resolver::{ConflictResolver, ResolutionAction, ResolutionPlan};
use crate::store::AvailabilityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Idle,
    Expanding,
    Submitting,
    Conflicted,
    Resolving,
    Done,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Expanding => "expanding",
            Self::Submitting => "submitting",
            Self::Conflicted => "conflicted",
            Self::Resolving => "resolving",
            Self::Done => "done",
        })
    }
}

/// A resolution the store accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedResolution {
    pub date: NaiveDate,
    pub action: ResolutionAction,
    pub deleted: Vec<RecordId>,
    pub updated: Option<RecordId>,
    pub inserted: Option<RecordId>,
}

/// Totals across every submission run and resolution of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub drafts: usize,
    pub created: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub errors: Vec<DraftFailure>,
    pub resolutions: Vec<AppliedResolution>,
    pub cancelled: bool,
    /// Drafts never sent to the store because the session ended early.
    pub not_submitted: usize,
}

impl SessionReport {
    fn absorb(&mut self, outcome: &BatchOutcome) {
        self.created += outcome.created;
        self.skipped_duplicate += outcome.skipped_duplicate;
        self.failed += outcome.failed;
        self.errors.extend(outcome.errors.iter().cloned());
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} of {} drafts created, {} skipped as duplicate, {} failed, {} conflict(s) resolved",
            self.created,
            self.drafts,
            self.skipped_duplicate,
            self.failed,
            self.resolutions.len()
        );
        if self.cancelled {
            text.push_str(&format!("; cancelled with {} not submitted", self.not_submitted));
        }
        text
    }
}

/// Drives one template through expansion, submission and conflict resolution
/// against a store.
pub struct BatchSession<S> {
    store: S,
    config: EngineConfig,
    expander: RecurrenceExpander,
    resolver: ConflictResolver,
    submitter: BatchSubmitter,
    cancel: CancelHandle,
    phase: BatchPhase,
    owner_id: Option<OwnerId>,
    pending: Vec<AvailabilityDraft>,
    conflict: Option<Conflict>,
    report: SessionReport,
}

impl<S: AvailabilityStore> BatchSession<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        let cancel = CancelHandle::new();
        Self {
            expander: RecurrenceExpander::new(&config),
            resolver: ConflictResolver::new(&config),
            submitter: BatchSubmitter::new().with_cancel(cancel.clone()),
            cancel,
            store,
            config,
            phase: BatchPhase::Idle,
            owner_id: None,
            pending: Vec::new(),
            conflict: None,
            report: SessionReport::default(),
        }
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    /// The conflict awaiting a decision, while `Conflicted`.
    pub fn pending_conflict(&self) -> Option<&Conflict> {
        self.conflict.as_ref()
    }

    /// Drafts not yet sent to the store.
    pub fn pending_drafts(&self) -> &[AvailabilityDraft] {
        &self.pending
    }

    /// Handle another task can use to stop a running submission before its
    /// next draft.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn require(&self, expected: BatchPhase, action: &str) -> Result<(), AvailabilityError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(AvailabilityError::InvalidTransition {
                from: self.phase.to_string(),
                action: action.to_string(),
            })
        }
    }

    /// Expand `template` into the session's drafts. Returns the draft count.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidTransition` unless `Idle`, and with any expansion
    /// error, in which case the session stays `Idle` and nothing is submitted.
    pub fn expand(
        &mut self,
        template: &AvailabilityTemplate,
        rule: Option<&RecurrenceRule>,
    ) -> Result<usize, AvailabilityError> {
        self.require(BatchPhase::Idle, "expand")?;
        self.phase = BatchPhase::Expanding;

        match self.expander.expand_all(template, rule) {
            Ok(drafts) => {
                self.report.drafts = drafts.len();
                self.pending = drafts;
                self.owner_id = Some(template.owner_id.clone());
                self.phase = BatchPhase::Submitting;
                Ok(self.report.drafts)
            }
            Err(e) => {
                self.phase = BatchPhase::Idle;
                Err(e)
            }
        }
    }

    /// Submit pending drafts until the batch finishes, pauses on a `choose`
    /// conflict, or is cancelled. Returns the new phase.
    pub async fn run(&mut self) -> Result<BatchPhase, AvailabilityError> {
        self.require(BatchPhase::Submitting, "run")?;

        let drafts = std::mem::take(&mut self.pending);
        let outcome = self.submitter.submit_to(drafts, &self.store).await;
        self.report.absorb(&outcome);

        let BatchOutcome {
            conflicted,
            cancelled,
            remaining,
            ..
        } = outcome;

        if cancelled {
            self.report.cancelled = true;
            self.report.not_submitted = remaining.len();
            self.phase = BatchPhase::Done;
        } else if let Some(conflict) = conflicted {
            self.pending = remaining;
            self.conflict = Some(conflict);
            self.phase = BatchPhase::Conflicted;
        } else {
            self.phase = BatchPhase::Done;
        }
        Ok(self.phase)
    }

    /// Apply `action` to the pending conflict.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidTransition` unless `Conflicted`. A rejected plan or
    /// a store failure leaves the session `Conflicted` with the same conflict.
    pub async fn resolve(
        &mut self,
        action: ResolutionAction,
    ) -> Result<BatchPhase, AvailabilityError> {
        self.require(BatchPhase::Conflicted, "resolve")?;
        let (plan, date) = self.plan(action, false)?;
        self.apply(plan, date).await
    }

    /// Like [`BatchSession::resolve`], with explicit consent for `keep_both`.
    pub async fn resolve_with_consent(
        &mut self,
        action: ResolutionAction,
    ) -> Result<BatchPhase, AvailabilityError> {
        self.require(BatchPhase::Conflicted, "resolve")?;
        let (plan, date) = self.plan(action, true)?;
        self.apply(plan, date).await
    }

    fn plan(
        &self,
        action: ResolutionAction,
        consent: bool,
    ) -> Result<(ResolutionPlan, NaiveDate), AvailabilityError> {
        let conflict = self.conflict.as_ref().ok_or_else(|| {
            AvailabilityError::InvalidTransition {
                from: self.phase.to_string(),
                action: "resolve".to_string(),
            }
        })?;
        let plan = if consent {
            self.resolver.resolve_with_consent(conflict, action)?
        } else {
            self.resolver.resolve(conflict, action)?
        };
        Ok((plan, conflict.draft.date))
    }

    async fn apply(
        &mut self,
        plan: ResolutionPlan,
        date: NaiveDate,
    ) -> Result<BatchPhase, AvailabilityError> {
        self.phase = BatchPhase::Resolving;

        let inserted = match self.store.apply_resolution(&plan).await {
            Ok(inserted) => inserted,
            Err(e) => {
                self.phase = BatchPhase::Conflicted;
                return Err(e.into());
            }
        };

        self.conflict = None;
        info!(
            owner = %plan.owner_id,
            %date,
            action = %plan.action,
            deleted = plan.to_delete.len(),
            "resolution applied"
        );
        self.report.resolutions.push(AppliedResolution {
            date,
            action: plan.action,
            deleted: plan.to_delete,
            updated: plan.to_update.map(|r| r.id),
            inserted,
        });

        if self.config.continue_after_resolution {
            self.phase = BatchPhase::Submitting;
        } else {
            self.report.not_submitted = self.pending.len();
            self.pending.clear();
            self.phase = BatchPhase::Done;
        }
        Ok(self.phase)
    }

    /// Abandon the rest of the batch. Records already created stay.
    pub fn cancel(&mut self) -> Result<BatchPhase, AvailabilityError> {
        if self.phase == BatchPhase::Done {
            return Err(AvailabilityError::InvalidTransition {
                from: self.phase.to_string(),
                action: "cancel".to_string(),
            });
        }
        self.cancel.cancel();
        let unresolved = usize::from(self.conflict.take().is_some());
        self.report.cancelled = true;
        self.report.not_submitted = self.pending.len() + unresolved;
        self.pending.clear();
        self.phase = BatchPhase::Done;
        info!(not_submitted = self.report.not_submitted, "session cancelled");
        Ok(self.phase)
    }

    /// Re-read the owner's records from the store.
    pub async fn refresh(&self) -> Result<Vec<PersistedAvailability>, AvailabilityError> {
        let owner_id = self.owner_id.as_deref().ok_or_else(|| {
            AvailabilityError::InvalidTransition {
                from: self.phase.to_string(),
                action: "refresh".to_string(),
            }
        })?;
        Ok(self.store.list_for_owner(owner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::parse_local_date;
    use crate::model::Origin;
    use crate::store::MemoryStore;

    fn template(start: &str, end: &str, status: &str) -> AvailabilityTemplate {
        AvailabilityTemplate::parse("ff-17", "2025-01-06", start, end, status).unwrap()
    }

    fn mondays() -> RecurrenceRule {
        RecurrenceRule::weekly([1], parse_local_date("2025-01-27").unwrap())
    }

    /// Store already holding a day shift on 2025-01-13.
    fn store_with_shift() -> MemoryStore {
        let shift = template("09:00", "17:00", "available");
        let date = parse_local_date("2025-01-13").unwrap();
        MemoryStore::with_records([PersistedAvailability::from_draft(
            "shift-1",
            &shift.draft_on(date, Origin::Manual),
        )])
        .unwrap()
    }

    #[tokio::test]
    async fn test_clean_batch_runs_to_done() {
        let mut session = BatchSession::new(MemoryStore::new(), EngineConfig::default());
        assert_eq!(session.phase(), BatchPhase::Idle);
        assert_eq!(session.expand(&template("08:00", "18:00", "available"), Some(&mondays())).unwrap(), 4);
        assert_eq!(session.phase(), BatchPhase::Submitting);
        assert_eq!(session.run().await.unwrap(), BatchPhase::Done);
        assert_eq!(session.report().created, 4);
        assert_eq!(session.refresh().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_conflict_pauses_then_replace_continues() {
        let mut session = BatchSession::new(store_with_shift(), EngineConfig::default());
        session
            .expand(&template("12:00", "13:00", "unavailable"), Some(&mondays()))
            .unwrap();

        assert_eq!(session.run().await.unwrap(), BatchPhase::Conflicted);
        assert_eq!(session.report().created, 1);
        assert_eq!(session.pending_drafts().len(), 2);
        assert_eq!(session.pending_conflict().unwrap().existing_ids(), vec!["shift-1"]);

        assert_eq!(
            session.resolve(ResolutionAction::Replace).await.unwrap(),
            BatchPhase::Submitting
        );
        assert_eq!(session.run().await.unwrap(), BatchPhase::Done);

        let report = session.report();
        assert_eq!(report.created, 3);
        assert_eq!(report.resolutions.len(), 1);
        assert_eq!(report.resolutions[0].deleted, vec!["shift-1"]);
        assert!(report.resolutions[0].inserted.is_some());

        let records = session.refresh().await.unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.window().to_string() == "12:00-13:00"));
    }

    #[tokio::test]
    async fn test_cancel_action_keeps_existing_and_continues() {
        let mut session = BatchSession::new(store_with_shift(), EngineConfig::default());
        session
            .expand(&template("12:00", "13:00", "unavailable"), Some(&mondays()))
            .unwrap();
        session.run().await.unwrap();
        session.resolve(ResolutionAction::Cancel).await.unwrap();
        session.run().await.unwrap();

        let records = session.refresh().await.unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().any(|r| r.id == "shift-1"));
    }

    #[tokio::test]
    async fn test_rejected_keep_both_stays_conflicted() {
        let mut session = BatchSession::new(store_with_shift(), EngineConfig::default());
        session
            .expand(&template("12:00", "13:00", "unavailable"), Some(&mondays()))
            .unwrap();
        session.run().await.unwrap();

        assert!(session.resolve(ResolutionAction::KeepBoth).await.is_err());
        assert_eq!(session.phase(), BatchPhase::Conflicted);
        assert!(session.pending_conflict().is_some());

        session
            .resolve_with_consent(ResolutionAction::KeepBoth)
            .await
            .unwrap();
        session.run().await.unwrap();
        assert_eq!(session.refresh().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_cancel_whole_operation_while_conflicted() {
        let mut session = BatchSession::new(store_with_shift(), EngineConfig::default());
        session
            .expand(&template("12:00", "13:00", "unavailable"), Some(&mondays()))
            .unwrap();
        session.run().await.unwrap();

        assert_eq!(session.cancel().unwrap(), BatchPhase::Done);
        let report = session.report();
        assert!(report.cancelled);
        assert_eq!(report.not_submitted, 3);
        assert_eq!(report.created, 1);
        assert!(session.cancel().is_err());
        assert_eq!(session.refresh().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_after_resolution_when_configured() {
        let config = EngineConfig {
            continue_after_resolution: false,
            ..EngineConfig::default()
        };
        let mut session = BatchSession::new(store_with_shift(), config);
        session
            .expand(&template("12:00", "13:00", "unavailable"), Some(&mondays()))
            .unwrap();
        session.run().await.unwrap();
        assert_eq!(
            session.resolve(ResolutionAction::Merge).await.unwrap(),
            BatchPhase::Done
        );
        assert_eq!(session.report().not_submitted, 2);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let mut session = BatchSession::new(MemoryStore::new(), EngineConfig::default());
        let err = session.run().await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot run while batch is idle");
        assert!(session.resolve(ResolutionAction::Cancel).await.is_err());
        assert!(session.refresh().await.is_err());

        session.expand(&template("08:00", "09:00", "available"), None).unwrap();
        assert!(session.expand(&template("08:00", "09:00", "available"), None).is_err());
    }

    #[tokio::test]
    async fn test_failed_expansion_returns_to_idle() {
        let mut session = BatchSession::new(MemoryStore::new(), EngineConfig::default());
        let rule = RecurrenceRule::weekly([], parse_local_date("2025-01-27").unwrap());
        let err = session
            .expand(&template("08:00", "09:00", "available"), Some(&rule))
            .unwrap_err();
        assert!(matches!(err, AvailabilityError::InvalidRule(_)));
        assert_eq!(session.phase(), BatchPhase::Idle);
        assert!(session.store().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_handle_stops_run() {
        let mut session = BatchSession::new(MemoryStore::new(), EngineConfig::default());
        session
            .expand(&template("08:00", "09:00", "available"), Some(&mondays()))
            .unwrap();
        session.cancel_handle().cancel();
        assert_eq!(session.run().await.unwrap(), BatchPhase::Done);
        assert!(session.report().cancelled);
        assert_eq!(session.report().not_submitted, 4);
        assert!(session.report().summary().ends_with("cancelled with 4 not submitted"));
    }
}
