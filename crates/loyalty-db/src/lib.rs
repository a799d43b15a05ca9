//! # loyalty-db: Ledger Database for the Loyalty Register
//!
//! SQLite system of record behind the register: customers, memberships,
//! points rules, reward catalog, stock and the append-only transaction log.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Loyalty Register Data Flow                          │
//! │                                                                         │
//! │  loyalty-orchestrator (SqliteBackend)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     loyalty-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ CustomerRepo   │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ MembershipRepo │   │ 001_initial  │  │   │
//! │  │   │ busy_timeout  │    │ RuleRepo       │   │   _schema    │  │   │
//! │  │   │               │    │ CatalogRepo    │   │              │  │   │
//! │  │   │               │    │ LedgerRepo ◄── only writer of     │  │   │
//! │  │   └───────────────┘    └──── balances and stock ───────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loyalty_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("loyalty.db")).await?;
//!
//! let membership = db.memberships().find("cust-1", "org-1").await?;
//! let outcome = db.ledger().commit_redemption(&command).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DEFAULT_IDEMPOTENCY_TTL};

pub use repository::catalog::{CatalogRepository, NewRewardProduct};
pub use repository::customer::{CustomerRepository, NewCustomer};
pub use repository::ledger::{AuditDiscrepancy, LedgerRepository};
pub use repository::membership::MembershipRepository;
pub use repository::organization::OrganizationRepository;
pub use repository::rules::{NewPointsRule, RuleRepository};
