//! Error types for availability-engine operations.

use thiserror::Error;

use crate::conflict::Conflict;

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("Expansion produced more than {limit} occurrences")]
    TooManyOccurrences { limit: usize },

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Cannot {action} while batch is {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reported by the external availability store.
///
/// `Conflict` is an expected control-flow signal rather than a fault: the
/// store found overlapping records for the draft's owner and refused to
/// insert it.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Conflict with {} existing record(s) ({})", .0.existing.len(), .0.required_action)]
    Conflict(Conflict),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AvailabilityError>;
