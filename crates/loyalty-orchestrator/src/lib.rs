//! # loyalty-orchestrator: Scan Session Orchestration
//!
//! Everything between "the camera decoded a string" and "the ledger applied
//! the entry": resolving the customer, checking membership, quoting points,
//! committing, and driving the session state machine through all of it.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CashierSession                                  │
//! │                                                                         │
//! │   scan ──► IdentityResolver ──► MembershipGate ──► Known / Enrolling   │
//! │                                                                         │
//! │   quote ─► PointsRuleClient (advisory, never committed)                 │
//! │                                                                         │
//! │   confirm ─► TransactionCommitter ─► Succeeded / Failed                │
//! │                  │ one attempt, idempotency token                       │
//! │                  └─ Unknown ─► verify (by token) or resubmit           │
//! │                                                                         │
//! │   reads: timeout + bounded backoff retry      writes: timeout only     │
//! └───────────────────────────────┬─────────────────────────────────────────┘
//!                                 │ LoyaltyBackend
//!                                 ▼
//!                    SqliteBackend (loyalty-db)
//! ```
//!
//! ## Modules
//!
//! - [`session`] - `CashierSession`, the async driver of the state machine
//! - [`identity`] - Scan payload to customer identity
//! - [`membership`] - Membership check and enrollment
//! - [`rules`] - Advisory points quotes and active offers
//! - [`committer`] - Ledger commits, verification by token
//! - [`backend`] - The `LoyaltyBackend` seam and its SQLite adapter
//! - [`retry`] - Timeout and backoff for reads
//! - [`config`] - `register.toml` loading
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use loyalty_db::Database;
//! use loyalty_orchestrator::{CashierSession, RegisterConfig, SessionSettings, SqliteBackend};
//!
//! let config = RegisterConfig::load_or_default(None);
//! let db = Database::new(config.db_config()).await?;
//!
//! let session = CashierSession::new(
//!     config.session_context(),
//!     Arc::new(SqliteBackend::new(db)),
//!     Arc::new(loyalty_core::SystemClock),
//!     SessionSettings::from(&config),
//! );
//! let state = session.scan(raw_code).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backend;
pub mod committer;
pub mod config;
pub mod error;
pub mod identity;
pub mod membership;
pub mod retry;
pub mod rules;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{BackendResult, LoyaltyBackend, SqliteBackend};
pub use committer::{CommitResult, TransactionCommitter};
pub use config::RegisterConfig;
pub use error::{BackendError, ConfigError, SessionError, SessionResult};
pub use identity::{IdentityResolver, Resolution};
pub use membership::{Enrollment, GateDecision, MembershipGate};
pub use retry::{read_with_retry, ReadFailure, ReadPolicy};
pub use rules::PointsRuleClient;
pub use session::{CashierSession, SessionSettings};
pub use telemetry::init_tracing;
