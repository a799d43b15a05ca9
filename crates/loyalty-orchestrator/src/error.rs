//! # Orchestrator Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Orchestrator Errors                                 │
//! │                                                                         │
//! │  BackendError   what a backend call failed with (transport level)      │
//! │  ├── Unavailable      store unreachable, pool exhausted → retry reads  │
//! │  ├── Conflict         lost a write race / store busy                   │
//! │  ├── UniqueViolation  insert collided with an existing row             │
//! │  ├── Rejected         store refused the request as invalid             │
//! │  └── Internal         anything else                                    │
//! │                                                                         │
//! │  ConfigError    register configuration could not be loaded/saved       │
//! │                                                                         │
//! │  SessionError   the cashier asked for something the session can't do  │
//! │                 right now; the session state is unchanged              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business results (not a member, out of stock, ...) are `Outcome` values
//! and never appear here.

use loyalty_core::session::TransitionError;
use loyalty_core::{Outcome, ValidationError};
use loyalty_db::DbError;
use thiserror::Error;

// =============================================================================
// Backend Error
// =============================================================================

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    // =========================================================================
    // Transient
    // =========================================================================
    /// The store could not be reached or had no capacity.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A conditional write lost a race, or the store was locked.
    #[error("Write conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Permanent
    // =========================================================================
    /// An insert hit an existing row.
    #[error("Duplicate {field}")]
    UniqueViolation { field: String },

    /// The store refused the request.
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    #[error("Backend error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Returns true if a read that failed with this error may be retried.
    ///
    /// Never used to retry commits: a commit failure is reported, not
    /// resent.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Conflict(_))
    }
}

impl From<DbError> for BackendError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UniqueViolation { field, .. } => BackendError::UniqueViolation { field },
            DbError::Busy(message) => BackendError::Conflict(message),
            DbError::CheckViolation { message } => BackendError::Conflict(message),
            DbError::ForeignKeyViolation { message } => BackendError::Rejected(message),
            DbError::NotFound { entity, id } => {
                BackendError::Rejected(format!("{} not found: {}", entity, id))
            }
            DbError::PoolExhausted | DbError::ConnectionFailed(_) => {
                BackendError::Unavailable(err.to_string())
            }
            other => BackendError::Internal(other.to_string()),
        }
    }
}

// =============================================================================
// Config Error
// =============================================================================

/// Register configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Failed to save config: {0}")]
    SaveFailed(String),

    /// A value is present but unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

// =============================================================================
// Session Error
// =============================================================================

/// A cashier action the session did not carry out.
///
/// The session state is the same as before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The current state does not accept the action.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A backend result arrived after the session had moved on
    /// (cancelled or rescanned) and was dropped.
    #[error("result of {operation} arrived after the session moved on")]
    Discarded { operation: &'static str },

    /// Cashier input failed local validation; no backend call was made.
    #[error("Rejected: {0}")]
    InvalidInput(#[from] ValidationError),

    /// The selected reward is not in the catalog on screen.
    #[error("reward {0} is not in the catalog")]
    UnknownReward(String),

    /// The action ended with a result code that has no screen of its own
    /// (e.g. the catalog could not be read).
    #[error("{}", .0.message())]
    Outcome(Outcome),
}

impl SessionError {
    /// Result code to show for this error.
    pub fn outcome(&self) -> Outcome {
        match self {
            SessionError::InvalidInput(err) => Outcome::rejected(err.to_string()),
            SessionError::UnknownReward(id) => {
                Outcome::rejected(format!("reward {} is not in the catalog", id))
            }
            SessionError::Outcome(outcome) => outcome.clone(),
            SessionError::Transition(err) => Outcome::rejected(err.to_string()),
            SessionError::Discarded { .. } => Outcome::rejected(self.to_string()),
        }
    }
}

/// Result type for session actions.
pub type SessionResult<T> = Result<T, SessionError>;
