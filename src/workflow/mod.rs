//! Approval workflow and delegation of approval authority
//!
//! `approval` and `delegation` hold the rules as pure functions over the data
//! model; `manager` loads state from the store, applies a rule and persists
//! the result.

pub mod approval;
pub mod authority;
pub mod delegation;
pub mod manager;

pub use authority::{Authority, AuthoritySet};
pub use delegation::{Actor, Delegation, DelegationReason, DelegationState, DelegationView, Grant};
pub use manager::{WorkflowEvent, WorkflowManager, WorkflowNotice};

use thiserror::Error;

/// A workflow rule refused the requested change
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("A team leader must be set before the status of a log with several assignees can change")]
    TeamLeaderRequired,

    #[error("Validation failed: {0}")]
    Validation(String),
}
