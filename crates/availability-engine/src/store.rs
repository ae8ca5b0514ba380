//! The persistence capability the engine consumes, plus an in-memory
//! implementation.
//!
//! The real store lives outside this crate. It owns every
//! [`PersistedAvailability`] and must:
//!
//! - refuse a `create` that overlaps the owner's records with a structured
//!   [`StoreError::Conflict`], never a generic error;
//! - apply a [`ResolutionPlan`] atomically, so a delete is never observable
//!   without its matching insert or update.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::conflict::find_conflict;
use crate::error::StoreError;
use crate::model::{AvailabilityDraft, PersistedAvailability, RecordId, TimeWindow};
use crate::resolver::ResolutionPlan;

#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Persist `draft`, or report the records it conflicts with.
    async fn create(&self, draft: &AvailabilityDraft) -> Result<RecordId, StoreError>;

    /// Apply every mutation in `plan` or none of them. Returns the id of the
    /// inserted record, if the plan inserts one.
    async fn apply_resolution(&self, plan: &ResolutionPlan)
        -> Result<Option<RecordId>, StoreError>;

    async fn list_for_owner(&self, owner_id: &str)
        -> Result<Vec<PersistedAvailability>, StoreError>;
}

/// In-memory store running the engine's own conflict detection on `create`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<PersistedAvailability>,
    next_id: u64,
}

impl Inner {
    /// Next `avail-N` id not already held by a stored record.
    fn allocate_id(&mut self) -> RecordId {
        loop {
            self.next_id += 1;
            let id = format!("avail-{}", self.next_id);
            if self.position(&id).is_none() {
                return id;
            }
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `records`, keeping their ids.
    ///
    /// Ids the store issues later never collide with a seeded one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if two records share an id.
    pub fn with_records(
        records: impl IntoIterator<Item = PersistedAvailability>,
    ) -> Result<Self, StoreError> {
        let mut inner = Inner::default();
        for record in records {
            if inner.position(&record.id).is_some() {
                return Err(StoreError::Validation(format!(
                    "duplicate record id {}",
                    record.id
                )));
            }
            if let Some(n) = record
                .id
                .strip_prefix("avail-")
                .and_then(|n| n.parse::<u64>().ok())
            {
                inner.next_id = inner.next_id.max(n);
            }
            inner.records.push(record);
        }
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Copy of every record, in insertion order.
    pub fn snapshot(&self) -> Vec<PersistedAvailability> {
        self.inner.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_window(start: chrono::NaiveTime, end: chrono::NaiveTime) -> Result<(), StoreError> {
    TimeWindow::new(start, end)
        .map(|_| ())
        .map_err(|e| StoreError::Validation(e.to_string()))
}

/// A record outside the plan that `update` would overlap but `current` does
/// not already overlap.
fn newly_covered<'a>(
    records: &'a [PersistedAvailability],
    current: &PersistedAvailability,
    update: &PersistedAvailability,
    to_delete: &[RecordId],
) -> Option<&'a PersistedAvailability> {
    let before = current.window();
    let after = update.window();
    records.iter().find(|r| {
        r.id != update.id
            && r.owner_id == update.owner_id
            && r.date == update.date
            && !to_delete.contains(&r.id)
            && r.window().overlaps(&after)
            && !(r.date == current.date && r.window().overlaps(&before))
    })
}

#[async_trait]
impl AvailabilityStore for MemoryStore {
    async fn create(&self, draft: &AvailabilityDraft) -> Result<RecordId, StoreError> {
        check_window(draft.start, draft.end)?;

        let mut inner = self.inner.lock();
        if let Some(conflict) = find_conflict(draft, &inner.records) {
            return Err(StoreError::Conflict(conflict));
        }
        let id = inner.allocate_id();
        inner.records.push(PersistedAvailability::from_draft(id.clone(), draft));
        Ok(id)
    }

    async fn apply_resolution(
        &self,
        plan: &ResolutionPlan,
    ) -> Result<Option<RecordId>, StoreError> {
        let mut inner = self.inner.lock();

        // Validate everything before the first mutation.
        for id in &plan.to_delete {
            match inner.position(id) {
                Some(i) if inner.records[i].owner_id == plan.owner_id => {}
                _ => return Err(StoreError::NotFound(id.clone())),
            }
        }
        if let Some(update) = &plan.to_update {
            let current = match inner.position(&update.id) {
                Some(i)
                    if inner.records[i].owner_id == plan.owner_id
                        && update.owner_id == plan.owner_id
                        && !plan.to_delete.contains(&update.id) =>
                {
                    &inner.records[i]
                }
                _ => return Err(StoreError::NotFound(update.id.clone())),
            };
            check_window(update.start, update.end)?;
            if let Some(other) = newly_covered(&inner.records, current, update, &plan.to_delete) {
                return Err(StoreError::Validation(format!(
                    "updated window {} would overlap record {}",
                    update.window(),
                    other.id
                )));
            }
        }
        if let Some(draft) = &plan.to_insert {
            check_window(draft.start, draft.end)?;
        }

        inner.records.retain(|r| !plan.to_delete.contains(&r.id));
        if let Some(update) = &plan.to_update {
            if let Some(i) = inner.position(&update.id) {
                inner.records[i] = update.clone();
            }
        }
        let inserted = plan.to_insert.as_ref().map(|draft| {
            let id = inner.allocate_id();
            inner.records.push(PersistedAvailability::from_draft(id.clone(), draft));
            id
        });
        Ok(inserted)
    }

    async fn list_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<PersistedAvailability>, StoreError> {
        let mut records: Vec<_> = self
            .inner
            .lock()
            .records
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| (a.date, a.start, &a.id).cmp(&(b.date, b.start, &b.id)));
        Ok(records)
    }
}
