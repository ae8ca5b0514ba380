//! Submit drafts to the store one at a time and tally what happened.
//!
//! Submission is strictly sequential: each `create` is awaited before the
//! next draft is sent, so at most one conflict is ever pending.
//!
//! Per-draft outcomes:
//!
//! - success: counted in `created`;
//! - `auto` conflict (exact duplicate): counted in `skipped_duplicate`, batch continues;
//! - `choose` conflict: batch **pauses**, the conflict and every unattempted
//!   draft are returned, nothing already created is rolled back;
//! - any other failure: counted in `failed`, recorded in `errors`, batch continues.
//!
//! `submit` never fails as a whole; the [`BatchOutcome`] is always returned.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calendar::format_local_date;
use crate::conflict::{Conflict, RequiredAction};
use crate::error::StoreError;
use crate::model::{AvailabilityDraft, RecordId};
use crate::store::AvailabilityStore;

/// Shared flag that stops a batch before its next submission.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Transport,
    NotFound,
}

/// A draft the store refused for a reason other than a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftFailure {
    pub draft: AvailabilityDraft,
    pub kind: FailureKind,
    pub message: String,
}

/// Tally of one submission run.
///
/// `created + skipped_duplicate + failed + conflicted + remaining` equals the
/// number of drafts handed to the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub created: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub errors: Vec<DraftFailure>,
    /// The `choose` conflict the run paused on.
    pub conflicted: Option<Conflict>,
    pub cancelled: bool,
    /// Drafts never sent to the store (after a pause or cancellation).
    pub remaining: Vec<AvailabilityDraft>,
    pub created_ids: Vec<RecordId>,
}

impl BatchOutcome {
    /// Whether the run stopped on a conflict awaiting resolution.
    pub fn is_paused(&self) -> bool {
        self.conflicted.is_some()
    }

    /// Drafts the store actually answered for.
    pub fn attempted(&self) -> usize {
        self.created
            + self.skipped_duplicate
            + self.failed
            + usize::from(self.conflicted.is_some())
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} created, {} skipped as duplicate, {} failed",
            self.created, self.skipped_duplicate, self.failed
        );
        if let Some(conflict) = &self.conflicted {
            text.push_str(&format!(
                "; paused on conflict at {} ({} existing record(s))",
                format_local_date(conflict.draft.date),
                conflict.existing.len()
            ));
        }
        if self.cancelled {
            text.push_str(&format!("; cancelled with {} not submitted", self.remaining.len()));
        }
        text
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Drives sequential submission of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchSubmitter {
    cancel: Option<CancelHandle>,
}

impl BatchSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `handle` before every submission.
    pub fn with_cancel(mut self, handle: CancelHandle) -> Self {
        self.cancel = Some(handle);
        self
    }

    /// Submit `drafts` in order through `create`.
    ///
    /// `drafts` is consumed lazily, so an [`Occurrences`](crate::expander::Occurrences)
    /// iterator can be passed straight in.
    pub async fn submit<I, F, Fut>(&self, drafts: I, mut create: F) -> BatchOutcome
    where
        I: IntoIterator<Item = AvailabilityDraft>,
        F: FnMut(AvailabilityDraft) -> Fut,
        Fut: Future<Output = Result<RecordId, StoreError>>,
    {
        let mut outcome = BatchOutcome::default();
        let mut drafts = drafts.into_iter();

        while let Some(draft) = drafts.next() {
            if self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled) {
                outcome.cancelled = true;
                outcome.remaining.push(draft);
                outcome.remaining.extend(drafts.by_ref());
                info!(remaining = outcome.remaining.len(), "batch cancelled");
                break;
            }

            match create(draft.clone()).await {
                Ok(id) => {
                    debug!(owner = %draft.owner_id, date = %draft.date, %id, "created availability");
                    outcome.created += 1;
                    outcome.created_ids.push(id);
                }
                Err(StoreError::Conflict(conflict)) => match conflict.required_action {
                    RequiredAction::Auto => {
                        debug!(owner = %draft.owner_id, date = %draft.date, "skipped duplicate");
                        outcome.skipped_duplicate += 1;
                    }
                    RequiredAction::Choose => {
                        info!(
                            owner = %draft.owner_id,
                            date = %draft.date,
                            existing = conflict.existing.len(),
                            "batch paused on conflict"
                        );
                        outcome.conflicted = Some(conflict);
                        outcome.remaining.extend(drafts.by_ref());
                        break;
                    }
                },
                Err(error) => {
                    warn!(owner = %draft.owner_id, date = %draft.date, %error, "draft rejected");
                    outcome.failed += 1;
                    outcome.errors.push(DraftFailure::new(draft, &error));
                }
            }
        }

        if !outcome.is_paused() && !outcome.cancelled {
            info!(summary = %outcome.summary(), "batch finished");
        }
        outcome
    }

    /// Submit `drafts` to `store`.
    pub async fn submit_to<I, S>(&self, drafts: I, store: &S) -> BatchOutcome
    where
        I: IntoIterator<Item = AvailabilityDraft>,
        S: AvailabilityStore + ?Sized,
    {
        self.submit(drafts, |draft| async move { store.create(&draft).await })
            .await
    }
}

impl DraftFailure {
    fn new(draft: AvailabilityDraft, error: &StoreError) -> Self {
        let (kind, message) = match error {
            StoreError::Validation(m) => (FailureKind::Validation, m.clone()),
            StoreError::Transport(m) => (FailureKind::Transport, m.clone()),
            StoreError::NotFound(m) => (FailureKind::NotFound, m.clone()),
            // Callers route conflicts elsewhere; keep the description anyway.
            StoreError::Conflict(_) => (FailureKind::Validation, error.to_string()),
        };
        Self {
            draft,
            kind,
            message,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
