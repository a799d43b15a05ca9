//! # loyalty-core: Pure Domain Logic for the Loyalty Register
//!
//! This crate holds everything the register decides without talking to
//! anything: decoding a scanned code, checking its age, the domain types
//! shared with the ledger, the result codes shown to the cashier, and the
//! scan session state machine.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Loyalty Register Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Cashier UI (camera, screens)                    │   │
//! │  │    Scan ──► Customer Card ──► Earn / Redeem ──► Receipt         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ decoded payload, cashier input         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              loyalty-orchestrator (CashierSession)              │   │
//! │  │    resolver ─► gate ─► rules ─► committer, timeouts, retries    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ loyalty-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  payload  │  │   types   │  │  session  │  │  outcome  │  │   │
//! │  │   │ ScanPay-  │  │Membership │  │ State +   │  │ Result    │  │   │
//! │  │   │ load, age │  │Transaction│  │ transition│  │ codes     │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  loyalty-db (system of record)                  │   │
//! │  │         memberships, stock, ledger, idempotency records         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`payload`] - Scan payload decoding and the staleness window
//! - [`types`] - Domain types (Membership, Transaction, StockLine, ...)
//! - [`money`] - Integer-cent purchase amounts
//! - [`outcome`] - Result codes surfaced to the cashier UI
//! - [`session`] - The scan session state machine
//! - [`validation`] - Input validation
//! - [`clock`] - Time source used by the orchestrator
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use loyalty_core::payload::{decode_payload, PayloadKind};
//!
//! let raw = r#"{"type":"customer","id":"cust-42","issuedAt":1760000000000}"#;
//! let payload = decode_payload(raw).unwrap();
//!
//! assert_eq!(payload.kind, PayloadKind::Customer);
//! assert_eq!(payload.subject_id, "cust-42");
//! assert_eq!(payload.issued_at, Utc.timestamp_millis_opt(1_760_000_000_000).unwrap());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod money;
pub mod outcome;
pub mod payload;
pub mod session;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, PayloadError, ValidationError};
pub use money::Money;
pub use outcome::{FailureKind, Outcome};
pub use payload::{PayloadKind, ScanPayload};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default staleness window for scanned customer codes, in milliseconds.
///
/// A code older than this is rejected as `Expired`, which bounds how long a
/// screenshot of a customer's code stays usable.
pub const DEFAULT_MAX_PAYLOAD_AGE_MS: i64 = 5 * 60 * 1000;

/// Largest purchase amount a cashier can enter, in cents ($100,000.00).
pub const MAX_PURCHASE_CENTS: i64 = 10_000_000;

/// Longest free-text note stored with a purchase.
pub const MAX_NOTES_LENGTH: usize = 500;
