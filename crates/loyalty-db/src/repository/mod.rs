//! # Repository Module
//!
//! Database repositories for the loyalty ledger.
//!
//! ## Read Side vs Write Side
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Lookups (any connection, no lock)      Commits (one SQLite tx each)   │
//! │  ─────────────────────────────────      ─────────────────────────────  │
//! │  CustomerRepository::get_by_id          LedgerRepository               │
//! │  MembershipRepository::find             ├── commit_purchase            │
//! │  RuleRepository::active_offers          │   rule re-evaluated inside   │
//! │  RuleRepository::evaluate               ├── commit_redemption          │
//! │  CatalogRepository::list_rewards        │   conditional debit + stock  │
//! │  LedgerRepository::find_by_token        └── idempotency record         │
//! │                                                                         │
//! │  Enrollment (MembershipRepository::insert_enrolled) creates a          │
//! │  zero-balance row and never touches points.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`customer::CustomerRepository`] - Customer identity lookup
//! - [`organization::OrganizationRepository`] - Organizations and branches
//! - [`membership::MembershipRepository`] - Membership lookup and enrollment
//! - [`rules::RuleRepository`] - Points rules and their evaluation
//! - [`catalog::CatalogRepository`] - Reward products and stock lines
//! - [`ledger::LedgerRepository`] - Atomic commits, idempotency, audit

pub mod catalog;
pub mod customer;
pub mod ledger;
pub mod membership;
pub mod organization;
pub mod rules;

/// Generates a new entity id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal fixture shared by repository unit tests.

    use crate::{Database, DbConfig, NewCustomer, NewPointsRule, NewRewardProduct};

    pub const ORG: &str = "org-1";
    pub const BRANCH: &str = "branch-1";
    pub const OTHER_BRANCH: &str = "branch-2";
    pub const CUSTOMER: &str = "cust-1";

    /// In-memory database with one organization, two branches and one
    /// customer (no membership).
    pub async fn fixture() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.organizations().insert_organization(ORG, "Corner Coffee").await.unwrap();
        db.organizations().insert_branch(BRANCH, ORG, "Main St").await.unwrap();
        db.organizations().insert_branch(OTHER_BRANCH, ORG, "Harbor").await.unwrap();
        db.customers()
            .insert(&NewCustomer {
                id: CUSTOMER.to_string(),
                email: Some("ana@example.com".to_string()),
                first_name: Some("Ana".to_string()),
                last_name: Some("Pérez".to_string()),
            })
            .await
            .unwrap();

        db
    }

    /// Organization-wide rule paying `points_per_unit` per currency unit.
    pub fn rule(id: &str, points_per_unit: i64) -> NewPointsRule {
        NewPointsRule {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            branch_id: None,
            name: format!("Rule {}", id),
            description: None,
            points_per_unit,
            priority: 0,
            valid_from_ms: None,
            valid_until_ms: None,
        }
    }

    pub fn product(id: &str, required_points: i64) -> NewRewardProduct {
        NewRewardProduct {
            id: id.to_string(),
            organization_id: ORG.to_string(),
            name: format!("Reward {}", id),
            description: None,
            required_points,
        }
    }
}
