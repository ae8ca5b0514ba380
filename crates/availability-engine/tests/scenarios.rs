//! End-to-end roster scenarios through the in-memory store.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;

use availability_engine::{
    detect, expand, parse_local_date, AvailabilityDraft, AvailabilityStatus, AvailabilityStore,
    AvailabilityTemplate, BatchPhase, BatchSession, BatchSubmitter, ConflictResolver,
    EngineConfig, MemoryStore, Origin, PersistedAvailability, RecordId, RecurrenceRule,
    RequiredAction, ResolutionAction, ResolutionPlan, StoreError,
};

fn date(s: &str) -> NaiveDate {
    parse_local_date(s).unwrap()
}

fn template(anchor: &str, start: &str, end: &str, status: &str) -> AvailabilityTemplate {
    AvailabilityTemplate::parse("ff-17", anchor, start, end, status).unwrap()
}

fn expanded_dates(template: &AvailabilityTemplate, rule: &RecurrenceRule) -> Vec<NaiveDate> {
    expand(template, Some(rule)).unwrap().map(|d| d.date).collect()
}

#[test]
fn weekly_mondays_expand_to_four_drafts() {
    let rule = RecurrenceRule::weekly([1], date("2025-01-27"));
    let dates = expanded_dates(&template("2025-01-06", "08:00", "18:00", "available"), &rule);
    assert_eq!(
        dates,
        vec![date("2025-01-06"), date("2025-01-13"), date("2025-01-20"), date("2025-01-27")]
    );
}

#[test]
fn biweekly_mondays_emit_counter_weeks_zero_and_two() {
    let rule = RecurrenceRule::weekly([1], date("2025-01-27")).every_other_week();
    let dates = expanded_dates(&template("2025-01-06", "08:00", "18:00", "available"), &rule);
    assert_eq!(dates, vec![date("2025-01-06"), date("2025-01-20")]);
}

#[test]
fn monthly_from_january_31st_clamps_to_month_end() {
    let rule = RecurrenceRule::monthly(date("2025-04-30"));
    let dates = expanded_dates(&template("2025-01-31", "08:00", "18:00", "available"), &rule);
    assert_eq!(
        dates,
        vec![date("2025-01-31"), date("2025-02-28"), date("2025-03-31"), date("2025-04-30")]
    );
}

#[test]
fn contained_window_is_choose_and_resolves_by_replace_or_cancel() {
    let shift = template("2025-02-10", "09:00", "17:00", "available");
    let existing = PersistedAvailability::from_draft("r-42", &shift.draft_on(shift.date, Origin::Manual));
    let lunch = template("2025-02-10", "12:00", "13:00", "available");
    let draft = lunch.draft_on(lunch.date, Origin::Manual);

    let conflicts = detect(&draft, std::slice::from_ref(&existing));
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].required_action, RequiredAction::Choose);

    let resolver = ConflictResolver::new(&EngineConfig::default());
    let replace = resolver.resolve(&conflicts[0], ResolutionAction::Replace).unwrap();
    assert_eq!(replace.to_delete, vec!["r-42".to_string()]);
    assert_eq!(replace.to_insert, Some(draft));

    let cancel = resolver.resolve(&conflicts[0], ResolutionAction::Cancel).unwrap();
    assert!(cancel.is_noop());
}

#[tokio::test]
async fn identical_record_is_skipped_as_duplicate_without_pausing() {
    let shift = template("2025-02-10", "09:00", "17:00", "available");
    let store = MemoryStore::with_records([PersistedAvailability::from_draft(
        "r-1",
        &shift.draft_on(shift.date, Origin::Manual),
    )])
    .unwrap();

    let rule = RecurrenceRule::weekly([1], date("2025-02-24"));
    let drafts = expand(&shift, Some(&rule)).unwrap();
    let outcome = BatchSubmitter::new().submit_to(drafts, &store).await;

    assert_eq!(outcome.skipped_duplicate, 1);
    assert_eq!(outcome.created, 2);
    assert!(outcome.conflicted.is_none());
    assert_eq!(store.len(), 3);
}

/// Store that fails transport for chosen dates and otherwise delegates.
struct FlakyStore {
    inner: MemoryStore,
    down_on: Vec<NaiveDate>,
    calls: Mutex<usize>,
}

#[async_trait]
impl AvailabilityStore for FlakyStore {
    async fn create(&self, draft: &AvailabilityDraft) -> Result<RecordId, StoreError> {
        *self.calls.lock() += 1;
        if self.down_on.contains(&draft.date) {
            return Err(StoreError::Transport("gateway timeout".to_string()));
        }
        self.inner.create(draft).await
    }

    async fn apply_resolution(
        &self,
        plan: &ResolutionPlan,
    ) -> Result<Option<RecordId>, StoreError> {
        self.inner.apply_resolution(plan).await
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<PersistedAvailability>, StoreError> {
        self.inner.list_for_owner(owner_id).await
    }
}

#[tokio::test]
async fn transport_failures_are_reported_not_fatal() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        down_on: vec![date("2025-01-13")],
        calls: Mutex::new(0),
    };
    let mut session = BatchSession::new(store, EngineConfig::default());
    session
        .expand(
            &template("2025-01-06", "07:00", "19:00", "unavailable"),
            Some(&RecurrenceRule::weekly([1], date("2025-01-27"))),
        )
        .unwrap();

    assert_eq!(session.run().await.unwrap(), BatchPhase::Done);
    let report = session.report();
    assert_eq!((report.created, report.failed), (3, 1));
    assert_eq!(report.errors[0].draft.date, date("2025-01-13"));
    assert!(report.summary().starts_with("3 of 4 drafts created"));
    assert_eq!(*session.store().calls.lock(), 4);
}

#[tokio::test]
async fn merge_keeps_existing_identity_across_a_weekly_batch() {
    let morning = template("2025-01-13", "06:00", "10:00", "available");
    let store = MemoryStore::with_records([PersistedAvailability::from_draft(
        "keep-me",
        &morning.draft_on(morning.date, Origin::Manual),
    )])
    .unwrap();
    let mut session = BatchSession::new(store, EngineConfig::default());
    session
        .expand(
            &template("2025-01-06", "08:00", "12:00", "unavailable"),
            Some(&RecurrenceRule::weekly([1], date("2025-01-20"))),
        )
        .unwrap();

    assert_eq!(session.run().await.unwrap(), BatchPhase::Conflicted);
    session.resolve(ResolutionAction::Merge).await.unwrap();
    assert_eq!(session.run().await.unwrap(), BatchPhase::Done);

    let records = session.refresh().await.unwrap();
    assert_eq!(records.len(), 3);
    let merged = records.iter().find(|r| r.id == "keep-me").unwrap();
    assert_eq!(merged.window().to_string(), "06:00-12:00");
    assert_eq!(merged.status, AvailabilityStatus::Unavailable);
    assert_eq!(session.report().resolutions[0].updated.as_deref(), Some("keep-me"));
}

#[tokio::test]
async fn several_conflicts_are_resolved_one_at_a_time() {
    let shift = template("2025-01-06", "09:00", "17:00", "available");
    let rule = RecurrenceRule::weekly([1], date("2025-01-27"));
    let store = MemoryStore::new();
    BatchSubmitter::new()
        .submit_to(expand(&shift, Some(&rule)).unwrap(), &store)
        .await;

    let mut session = BatchSession::new(store, EngineConfig::default());
    session
        .expand(&template("2025-01-06", "16:00", "20:00", "unavailable"), Some(&rule))
        .unwrap();

    let mut rounds = 0;
    while session.run().await.unwrap() == BatchPhase::Conflicted {
        rounds += 1;
        let conflict = session.pending_conflict().unwrap();
        assert_eq!(conflict.existing[0].overlap_minutes, 60);
        session.resolve(ResolutionAction::Replace).await.unwrap();
    }

    assert_eq!(rounds, 4);
    assert_eq!(session.report().resolutions.len(), 4);
    let records = session.refresh().await.unwrap();
    assert!(records
        .iter()
        .all(|r| r.status == AvailabilityStatus::Unavailable));
}
