//! # Validation Module
//!
//! Input validation run before anything reaches the backend.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Cashier UI                                                   │
//! │  └── Numeric keypad, required fields                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Orchestrator (THIS MODULE)                                   │
//! │  └── amount > 0, note length, ids present                              │
//! │      Failure → Outcome::Rejected, no backend call                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Ledger (SQLite)                                              │
//! │  ├── CHECK (available_points >= 0), CHECK (quantity >= 0)              │
//! │  └── UNIQUE (customer_id, organization_id)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_NOTES_LENGTH, MAX_PURCHASE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a purchase amount.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_PURCHASE_CENTS
///
/// ## Example
/// ```rust
/// use loyalty_core::money::Money;
/// use loyalty_core::validation::validate_amount;
///
/// assert!(validate_amount(Money::from_cents(1000)).is_ok());
/// assert!(validate_amount(Money::zero()).is_err());
/// assert!(validate_amount(Money::from_cents(-500)).is_err());
/// ```
pub fn validate_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    if amount.cents() > MAX_PURCHASE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 1,
            max: MAX_PURCHASE_CENTS,
        });
    }

    Ok(())
}

/// Normalizes an optional purchase note.
///
/// ## Returns
/// The trimmed note, or `None` when it is blank.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if notes.chars().count() > MAX_NOTES_LENGTH {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LENGTH,
        });
    }

    Ok(Some(notes.to_string()))
}

/// Validates that an identifier is present.
pub fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 128 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 128,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
