//! # Identity Resolver
//!
//! Turns a decoded scan into the customer it names.
//!
//! ```text
//! ScanPayload ──► kind == customer? ──no──► MalformedPayload
//!                       │ yes
//!                       ▼
//!                 age <= max age? ──no──► Expired
//!                       │ yes                       (no backend call so far)
//!                       ▼
//!                 find_customer ──miss──► NotFound
//!                       │ hit      └─fail─► Unavailable
//!                       ▼
//!                 CustomerIdentity
//! ```
//!
//! Read-only: resolving never writes anything.

use std::sync::Arc;

use tracing::debug;

use loyalty_core::payload::{Freshness, PayloadKind, ScanPayload};
use loyalty_core::{Clock, CustomerIdentity, Outcome};

use crate::backend::LoyaltyBackend;
use crate::retry::{read_with_retry, ReadPolicy};

/// What a scan resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(CustomerIdentity),
    MalformedPayload,
    Expired,
    NotFound,
    Unavailable,
}

impl Resolution {
    /// The identity, or the result code for a scan that did not resolve.
    pub fn into_identity(self) -> Result<CustomerIdentity, Outcome> {
        match self {
            Resolution::Resolved(identity) => Ok(identity),
            Resolution::MalformedPayload => Err(Outcome::MalformedPayload),
            Resolution::Expired => Err(Outcome::Expired),
            Resolution::NotFound => Err(Outcome::NotFound),
            Resolution::Unavailable => Err(Outcome::Unavailable),
        }
    }
}

pub struct IdentityResolver {
    backend: Arc<dyn LoyaltyBackend>,
    clock: Arc<dyn Clock>,
    max_payload_age_ms: i64,
    policy: ReadPolicy,
}

impl IdentityResolver {
    pub fn new(
        backend: Arc<dyn LoyaltyBackend>,
        clock: Arc<dyn Clock>,
        max_payload_age_ms: i64,
        policy: ReadPolicy,
    ) -> Self {
        IdentityResolver {
            backend,
            clock,
            max_payload_age_ms,
            policy,
        }
    }

    pub async fn resolve(&self, payload: &ScanPayload) -> Resolution {
        if payload.kind != PayloadKind::Customer {
            debug!(kind = %payload.kind, "Scanned code is not a customer code");
            return Resolution::MalformedPayload;
        }

        if let Freshness::Expired { age_ms } =
            payload.freshness(self.clock.now(), self.max_payload_age_ms)
        {
            debug!(age_ms, max_age_ms = self.max_payload_age_ms, "Scanned code expired");
            return Resolution::Expired;
        }

        let backend = &self.backend;
        let customer_id = payload.subject_id.as_str();
        let found = read_with_retry(&self.policy, "find_customer", || {
            backend.find_customer(customer_id)
        })
        .await;

        match found {
            Ok(Some(identity)) => {
                debug!(customer_id = %identity.id, "Customer resolved");
                Resolution::Resolved(identity)
            }
            Ok(None) => {
                debug!(customer_id = %customer_id, "Customer not found");
                Resolution::NotFound
            }
            Err(_) => Resolution::Unavailable,
        }
    }
}
