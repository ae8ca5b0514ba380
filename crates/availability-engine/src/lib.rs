//! # availability-engine
//!
//! Recurring availability generation and conflict resolution for personnel
//! rosters.
//!
//! A single availability template (date, window, status) plus an optional
//! weekly or monthly recurrence rule is expanded into concrete dated drafts,
//! submitted one by one to an external store, and any overlap the store
//! reports is resolved through an explicit, human-in-the-loop protocol.
//!
//! ## Modules
//!
//! - [`calendar`]: Local-date parsing/formatting, day and month stepping
//! - [`model`]: Templates, recurrence rules, drafts, persisted records
//! - [`expander`]: Template + rule → lazy sequence of drafts
//! - [`conflict`]: Overlap detection and `auto`/`choose` classification
//! - [`batch`]: Sequential submission with per-draft outcome tally
//! - [`resolver`]: Conflict + action → atomic resolution plan
//! - [`session`]: The batch state machine tying the above together
//! - [`store`]: The store capability trait and an in-memory implementation
//! - [`config`]: Engine configuration
//! - [`error`]: Error types

pub mod batch;
pub mod calendar;
pub mod config;
pub mod conflict;
pub mod error;
pub mod expander;
pub mod model;
pub mod resolver;
pub mod session;
pub mod store;

pub use batch::{BatchOutcome, BatchSubmitter, CancelHandle, DraftFailure, FailureKind};
pub use calendar::{
    advance_by_days, advance_by_months, format_local_date, format_local_time, parse_local_date,
    parse_local_time,
};
pub use config::{EngineConfig, MergePolicy};
pub use conflict::{detect, Conflict, ConflictingRecord, RequiredAction};
pub use error::{AvailabilityError, StoreError};
pub use expander::{expand, sort_chronologically, Occurrences, RecurrenceExpander};
pub use model::{
    AvailabilityDraft, AvailabilityStatus, AvailabilityTemplate, Origin, OwnerId,
    PersistedAvailability, RecordId, RecurrenceKind, RecurrenceRule, TimeWindow,
};
pub use resolver::{ConflictResolver, ResolutionAction, ResolutionPlan};
pub use session::{AppliedResolution, BatchPhase, BatchSession, SessionReport};
pub use store::{AvailabilityStore, MemoryStore};
