//! # Error Types
//!
//! Domain-specific error types for loyalty-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  loyalty-core errors (this file)                                       │
//! │  ├── CoreError        - General domain errors                          │
//! │  ├── PayloadError     - Scanned code could not be decoded              │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  loyalty-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  loyalty-orchestrator errors                                           │
//! │  ├── BackendError     - Transport-level backend failures               │
//! │  └── SessionError     - Workflow misuse (invalid transitions)          │
//! │                                                                         │
//! │  Business outcomes (NotAMember, OutOfStock, ...) are NOT errors:       │
//! │  they travel as `Outcome` values.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The scanned code could not be turned into a payload.
    #[error("Invalid scan payload: {0}")]
    Payload(#[from] PayloadError),

    /// Money text could not be parsed.
    ///
    /// ## When This Occurs
    /// - Cashier typed letters into the amount field
    /// - More than two decimal places ("10.005")
    #[error("Invalid amount '{input}': {reason}")]
    InvalidAmount { input: String, reason: String },

    /// An idempotency token string is not a UUID.
    #[error("Invalid idempotency token: {0}")]
    InvalidToken(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Payload Error
// =============================================================================

/// Reasons a decoded QR string is not a usable scan payload.
///
/// Every variant maps to the `MalformedPayload` result code; the variants
/// only exist so logs say what was wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Not JSON, or not a JSON object.
    #[error("payload is not a JSON object: {0}")]
    NotJson(String),

    /// `type` is absent or not one of the known kinds.
    #[error("unknown payload type: {0}")]
    UnknownKind(String),

    /// `id` is absent, empty, or not a string/integer.
    #[error("payload id is missing or empty")]
    MissingId,

    /// `issuedAt` is absent or not an epoch-millis integer.
    #[error("payload issuedAt is missing or invalid")]
    MissingIssuedAt,
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when cashier input doesn't meet requirements.
/// They are raised before any backend call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
