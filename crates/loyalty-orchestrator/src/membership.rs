//! # Membership Gate
//!
//! Decides whether a resolved customer may earn and redeem at this
//! organization, and enrolls them when they may not.
//!
//! ## Enrollment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert_membership ──ok──────────────────────────────► Enrolled        │
//! │        │                                                                │
//! │        └─ UniqueViolation (concurrent enrollment, or an inactive row)  │
//! │              │                                                          │
//! │              ▼                                                          │
//! │        find_membership ──active──────────────────────► Enrolled        │
//! │              │                                                          │
//! │              └─inactive──► reactivate_membership ────► Enrolled        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Enrollment never writes a transaction and never changes a balance.

use std::sync::Arc;

use tracing::{debug, info};

use loyalty_core::Membership;

use crate::backend::LoyaltyBackend;
use crate::error::BackendError;
use crate::retry::{read_with_retry, ReadPolicy};

/// Result of checking a customer's membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Member(Membership),
    /// No membership, or an inactive one.
    NotAMember,
    Unavailable,
}

/// Result of an enrollment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrollment {
    Enrolled(Membership),
    Unavailable,
}

pub struct MembershipGate {
    backend: Arc<dyn LoyaltyBackend>,
    policy: ReadPolicy,
}

impl MembershipGate {
    pub fn new(backend: Arc<dyn LoyaltyBackend>, policy: ReadPolicy) -> Self {
        MembershipGate { backend, policy }
    }

    pub async fn check(&self, customer_id: &str, organization_id: &str) -> GateDecision {
        let backend = &self.backend;
        let found = read_with_retry(&self.policy, "find_membership", || {
            backend.find_membership(customer_id, organization_id)
        })
        .await;

        match found {
            Ok(Some(membership)) if membership.active => GateDecision::Member(membership),
            Ok(Some(_)) | Ok(None) => {
                debug!(customer_id = %customer_id, organization_id = %organization_id, "Not a member");
                GateDecision::NotAMember
            }
            Err(_) => GateDecision::Unavailable,
        }
    }

    /// Enrolls a customer with a zero balance.
    ///
    /// Idempotent: enrolling an existing member returns their membership,
    /// enrolling a former member reactivates it with balances kept. The
    /// whole sequence is safe to repeat, so it runs under the read policy.
    pub async fn enroll(&self, customer_id: &str, organization_id: &str) -> Enrollment {
        let result = read_with_retry(&self.policy, "enroll", || {
            self.enroll_once(customer_id, organization_id)
        })
        .await;

        match result {
            Ok(membership) => Enrollment::Enrolled(membership),
            Err(_) => Enrollment::Unavailable,
        }
    }

    async fn enroll_once(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> Result<Membership, BackendError> {
        match self.backend.insert_membership(customer_id, organization_id).await {
            Ok(membership) => {
                info!(customer_id = %customer_id, organization_id = %organization_id, "Customer enrolled");
                Ok(membership)
            }
            Err(BackendError::UniqueViolation { .. }) => {
                debug!(customer_id = %customer_id, "Membership already exists, re-reading");
                match self
                    .backend
                    .find_membership(customer_id, organization_id)
                    .await?
                {
                    Some(membership) if membership.active => Ok(membership),
                    Some(_) => {
                        self.backend
                            .reactivate_membership(customer_id, organization_id)
                            .await
                    }
                    None => Err(BackendError::Conflict(
                        "membership vanished during enrollment".to_string(),
                    )),
                }
            }
            Err(other) => Err(other),
        }
    }
}
