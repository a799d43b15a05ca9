//! # Scan Session State Machine
//!
//! The cashier workflow as enumerated states and a pure transition function.
//! No I/O happens here: the orchestrator performs the backend calls and feeds
//! their results back in as events.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Idle ──decode──► Scanned ──start──► Resolving ─┬─► Enrolling ──┐      │
//! │    ▲                                             │   (offer)     │      │
//! │    │                                             └─► Known ◄─────┘      │
//! │    │                                                  │                 │
//! │    │                              ┌───────────────────┴──────┐          │
//! │    │                              ▼                          ▼          │
//! │    │                      QuotingPurchase          LoadingCatalog       │
//! │    │                              │                          │          │
//! │    │                              │                          ▼          │
//! │    │                              │                SelectingRedemption  │
//! │    │                              │                          │          │
//! │    │                              └────────► Committing ◄────┘          │
//! │    │                                            │                       │
//! │    │                              ┌─────────────┴────────────┐          │
//! │    │                              ▼                          ▼          │
//! │    └─────────────────────── Succeeded ◄── Verifying ◄──── Failed        │
//! │    └──────────────────────────────────────────────────────────┘         │
//! │                                                                         │
//! │  BUSY (backend call in flight): Scanned, Resolving, Enrolling(in        │
//! │  flight), QuotingPurchase(in flight), LoadingCatalog, Committing,       │
//! │  Verifying. A decode arriving while busy is dropped. Committing         │
//! │  cannot be cancelled.                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Unknown Outcomes
//! A commit that ends in `Outcome::Unknown` keeps its [`PendingCommit`] (and
//! idempotency token) in the `Failed` state. From there the cashier either
//! verifies ([`SessionEvent::VerificationStarted`], answered by
//! [`SessionEvent::OutcomeVerified`]) or explicitly resubmits the same token
//! ([`SessionEvent::CommitResubmitted`]). Nothing resubmits on its own.
//!
//! ## No Active Rule
//! A ledger or quote answer of `NoActiveRule` switches earning off on the
//! customer card, so going back to the card does not reopen the earn path.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::money::Money;
use crate::outcome::{FailureKind, Outcome};
use crate::payload::ScanPayload;
use crate::types::{
    CustomerIdentity, IdempotencyToken, Membership, QuoteResult, RewardProduct, Transaction,
};

// =============================================================================
// Session Data
// =============================================================================

/// A resolved customer with their membership snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KnownCustomer {
    pub identity: CustomerIdentity,
    pub membership: Membership,
    /// False disables the earning path (redemption stays available).
    pub has_active_rule: bool,
}

impl KnownCustomer {
    fn with_membership(&self, membership: Option<Membership>) -> KnownCustomer {
        match membership {
            Some(membership) => KnownCustomer {
                membership,
                ..self.clone()
            },
            None => self.clone(),
        }
    }
}

/// What the cashier confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitIntent {
    Purchase {
        amount: Money,
        notes: Option<String>,
    },
    Redemption {
        product_id: String,
        required_points: i64,
    },
}

/// A confirmed commit and the token that identifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingCommit {
    pub token: IdempotencyToken,
    pub intent: CommitIntent,
}

impl PendingCommit {
    /// A new logical action gets a new token.
    pub fn new(intent: CommitIntent) -> Self {
        PendingCommit {
            token: IdempotencyToken::generate(),
            intent,
        }
    }
}

/// Why the session is in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionFailure {
    pub outcome: Outcome,
    /// Customer card to go back to, with the freshest balance read.
    pub customer: Option<KnownCustomer>,
    /// The commit that failed, kept so an `Unknown` can be verified or resent.
    pub pending: Option<PendingCommit>,
}

impl SessionFailure {
    pub fn kind(&self) -> FailureKind {
        self.outcome.failure_kind()
    }
}

/// Result of verifying an `Unknown` commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Applied {
        transaction: Transaction,
        membership: Membership,
    },
    NotApplied {
        membership: Membership,
    },
}

// =============================================================================
// States and Events
// =============================================================================

/// Every state the scan session can be in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Scanned {
        payload: ScanPayload,
    },
    Resolving {
        payload: ScanPayload,
    },
    /// Customer exists but is not a member: enrollment is offered.
    Enrolling {
        identity: CustomerIdentity,
        in_flight: bool,
    },
    Known {
        customer: KnownCustomer,
    },
    /// The reward catalog is being read.
    LoadingCatalog {
        customer: KnownCustomer,
    },
    QuotingPurchase {
        customer: KnownCustomer,
        quote: Option<QuoteResult>,
        in_flight: bool,
    },
    SelectingRedemption {
        customer: KnownCustomer,
        catalog: Vec<RewardProduct>,
    },
    Committing {
        customer: KnownCustomer,
        pending: PendingCommit,
    },
    Succeeded {
        customer: KnownCustomer,
        transaction: Transaction,
    },
    Failed {
        failure: SessionFailure,
    },
    /// The ledger is being asked what became of an `Unknown` commit.
    Verifying {
        failure: SessionFailure,
    },
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Scanned { .. } => "scanned",
            SessionState::Resolving { .. } => "resolving",
            SessionState::Enrolling { .. } => "enrolling",
            SessionState::Known { .. } => "known",
            SessionState::LoadingCatalog { .. } => "loading_catalog",
            SessionState::QuotingPurchase { .. } => "quoting_purchase",
            SessionState::SelectingRedemption { .. } => "selecting_redemption",
            SessionState::Committing { .. } => "committing",
            SessionState::Succeeded { .. } => "succeeded",
            SessionState::Failed { .. } => "failed",
            SessionState::Verifying { .. } => "verifying",
        }
    }

    /// True while a backend call for this session is outstanding.
    pub fn is_busy(&self) -> bool {
        match self {
            SessionState::Scanned { .. }
            | SessionState::Resolving { .. }
            | SessionState::LoadingCatalog { .. }
            | SessionState::Committing { .. }
            | SessionState::Verifying { .. } => true,
            SessionState::Enrolling { in_flight, .. }
            | SessionState::QuotingPurchase { in_flight, .. } => *in_flight,
            _ => false,
        }
    }

    /// The customer card currently on screen, if any.
    pub fn customer(&self) -> Option<&KnownCustomer> {
        match self {
            SessionState::Known { customer }
            | SessionState::LoadingCatalog { customer }
            | SessionState::QuotingPurchase { customer, .. }
            | SessionState::SelectingRedemption { customer, .. }
            | SessionState::Committing { customer, .. }
            | SessionState::Succeeded { customer, .. } => Some(customer),
            SessionState::Failed { failure } | SessionState::Verifying { failure } => {
                failure.customer.as_ref()
            }
            _ => None,
        }
    }
}

/// Inputs to the state machine: cashier actions and backend results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PayloadDecoded(ScanPayload),
    /// The scanned string never became a usable customer payload.
    PayloadRejected(Outcome),
    ResolutionStarted,
    MemberFound(KnownCustomer),
    MembershipMissing(CustomerIdentity),
    ResolutionFailed(Outcome),
    EnrollmentStarted,
    Enrolled(KnownCustomer),
    EnrollmentFailed(Outcome),
    PurchaseSelected,
    QuoteRequested,
    QuoteReceived(QuoteResult),
    CatalogRequested,
    RedemptionSelected(Vec<RewardProduct>),
    /// The catalog could not be read; back to the card.
    CatalogUnavailable,
    BackToCustomer,
    CommitConfirmed(PendingCommit),
    CommitSucceeded {
        transaction: Transaction,
        membership: Membership,
    },
    CommitFailed {
        outcome: Outcome,
        /// Fresh balance read after the failure, when one was possible.
        membership: Option<Membership>,
    },
    CommitResubmitted,
    VerificationStarted,
    OutcomeVerified(Verification),
    /// The lookup failed; the commit is still unknown.
    VerificationUnavailable,
    ReturnToIdle,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::PayloadDecoded(_) => "payload_decoded",
            SessionEvent::PayloadRejected(_) => "payload_rejected",
            SessionEvent::ResolutionStarted => "resolution_started",
            SessionEvent::MemberFound(_) => "member_found",
            SessionEvent::MembershipMissing(_) => "membership_missing",
            SessionEvent::ResolutionFailed(_) => "resolution_failed",
            SessionEvent::EnrollmentStarted => "enrollment_started",
            SessionEvent::Enrolled(_) => "enrolled",
            SessionEvent::EnrollmentFailed(_) => "enrollment_failed",
            SessionEvent::PurchaseSelected => "purchase_selected",
            SessionEvent::QuoteRequested => "quote_requested",
            SessionEvent::QuoteReceived(_) => "quote_received",
            SessionEvent::CatalogRequested => "catalog_requested",
            SessionEvent::RedemptionSelected(_) => "redemption_selected",
            SessionEvent::CatalogUnavailable => "catalog_unavailable",
            SessionEvent::BackToCustomer => "back_to_customer",
            SessionEvent::CommitConfirmed(_) => "commit_confirmed",
            SessionEvent::CommitSucceeded { .. } => "commit_succeeded",
            SessionEvent::CommitFailed { .. } => "commit_failed",
            SessionEvent::CommitResubmitted => "commit_resubmitted",
            SessionEvent::VerificationStarted => "verification_started",
            SessionEvent::OutcomeVerified(_) => "outcome_verified",
            SessionEvent::VerificationUnavailable => "verification_unavailable",
            SessionEvent::ReturnToIdle => "return_to_idle",
        }
    }
}

/// An event the current state does not accept. The state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// A backend call is in flight; the event was dropped.
    #[error("session is busy ({state}); event dropped")]
    Busy { state: &'static str },

    /// A commit is outstanding and must resolve first.
    #[error("a commit is in flight; wait for its result")]
    CommitInFlight,

    /// Earning requires an active points rule.
    #[error("earning is disabled: no active points rule")]
    EarningDisabled,

    /// Only an `Unknown` commit can be resent.
    #[error("only a commit with an unknown outcome can be resubmitted")]
    NotResubmittable,

    /// The confirmed intent does not match the screen it came from.
    #[error("{intent} cannot be confirmed from {state}")]
    IntentMismatch {
        state: &'static str,
        intent: &'static str,
    },

    #[error("event {event} is not valid in state {state}")]
    Invalid {
        state: &'static str,
        event: &'static str,
    },
}

// =============================================================================
// Transition Function
// =============================================================================

/// Computes the next state. Pure: same input, same output.
pub fn transition(
    state: &SessionState,
    event: SessionEvent,
) -> Result<SessionState, TransitionError> {
    use SessionEvent as E;
    use SessionState as S;

    let invalid = |event: &SessionEvent| TransitionError::Invalid {
        state: state.name(),
        event: event.name(),
    };

    // Scans, rejections and leaving are allowed from every quiet state.
    match &event {
        E::PayloadDecoded(_) | E::PayloadRejected(_) | E::ReturnToIdle => {
            if matches!(state, S::Committing { .. }) {
                return Err(TransitionError::CommitInFlight);
            }
        }
        _ => {}
    }
    match &event {
        E::PayloadDecoded(_) | E::PayloadRejected(_) if state.is_busy() => {
            return Err(TransitionError::Busy {
                state: state.name(),
            });
        }
        _ => {}
    }

    let next = match (state, event) {
        (_, E::PayloadDecoded(payload)) => S::Scanned { payload },
        (_, E::PayloadRejected(outcome)) => S::Failed {
            failure: SessionFailure {
                outcome,
                customer: None,
                pending: None,
            },
        },
        (_, E::ReturnToIdle) => S::Idle,

        // --- resolution -----------------------------------------------------
        (S::Scanned { payload }, E::ResolutionStarted) => S::Resolving {
            payload: payload.clone(),
        },
        (S::Resolving { .. }, E::MemberFound(customer)) => S::Known { customer },
        (S::Resolving { .. }, E::MembershipMissing(identity)) => S::Enrolling {
            identity,
            in_flight: false,
        },
        (S::Resolving { .. }, E::ResolutionFailed(outcome)) => S::Failed {
            failure: SessionFailure {
                outcome,
                customer: None,
                pending: None,
            },
        },

        // --- enrollment -----------------------------------------------------
        (
            S::Enrolling {
                identity,
                in_flight: false,
            },
            E::EnrollmentStarted,
        ) => S::Enrolling {
            identity: identity.clone(),
            in_flight: true,
        },
        (S::Enrolling { in_flight: true, .. }, E::Enrolled(customer)) => S::Known { customer },
        (S::Enrolling { in_flight: true, .. }, E::EnrollmentFailed(outcome)) => S::Failed {
            failure: SessionFailure {
                outcome,
                customer: None,
                pending: None,
            },
        },

        // --- earning --------------------------------------------------------
        (S::Known { customer }, E::PurchaseSelected) => {
            if !customer.has_active_rule {
                return Err(TransitionError::EarningDisabled);
            }
            S::QuotingPurchase {
                customer: customer.clone(),
                quote: None,
                in_flight: false,
            }
        }
        (
            S::QuotingPurchase {
                customer,
                quote,
                in_flight: false,
            },
            E::QuoteRequested,
        ) => S::QuotingPurchase {
            customer: customer.clone(),
            quote: quote.clone(),
            in_flight: true,
        },
        (
            S::QuotingPurchase {
                customer,
                in_flight: true,
                ..
            },
            E::QuoteReceived(quote),
        ) => {
            let mut customer = customer.clone();
            match &quote {
                QuoteResult::Quoted { .. } => customer.has_active_rule = true,
                QuoteResult::NoActiveRule => customer.has_active_rule = false,
                QuoteResult::Unavailable { .. } => {}
            }
            S::QuotingPurchase {
                customer,
                quote: Some(quote),
                in_flight: false,
            }
        }

        // --- redemption -----------------------------------------------------
        (S::Known { customer }, E::CatalogRequested) => S::LoadingCatalog {
            customer: customer.clone(),
        },
        (S::LoadingCatalog { customer }, E::RedemptionSelected(catalog)) => {
            S::SelectingRedemption {
                customer: customer.clone(),
                catalog,
            }
        }
        (S::LoadingCatalog { customer }, E::CatalogUnavailable) => S::Known {
            customer: customer.clone(),
        },

        // --- back to the customer card --------------------------------------
        (
            S::QuotingPurchase {
                customer,
                in_flight: false,
                ..
            },
            E::BackToCustomer,
        )
        | (S::SelectingRedemption { customer, .. }, E::BackToCustomer) => S::Known {
            customer: customer.clone(),
        },
        (S::Failed { failure }, E::BackToCustomer) => match (&failure.customer, failure.kind()) {
            (Some(customer), FailureKind::DefinitelyNotApplied) => S::Known {
                customer: customer.clone(),
            },
            // An unknown commit must be verified before the card is trusted.
            _ => return Err(invalid(&E::BackToCustomer)),
        },

        // --- committing -----------------------------------------------------
        (
            S::QuotingPurchase {
                customer,
                quote,
                in_flight,
            },
            E::CommitConfirmed(pending),
        ) => {
            if *in_flight {
                return Err(TransitionError::Busy {
                    state: state.name(),
                });
            }
            if !matches!(pending.intent, CommitIntent::Purchase { .. }) {
                return Err(TransitionError::IntentMismatch {
                    state: state.name(),
                    intent: "redemption",
                });
            }
            if !customer.has_active_rule || quote.as_ref().is_some_and(QuoteResult::blocks_purchase) {
                return Err(TransitionError::EarningDisabled);
            }
            S::Committing {
                customer: customer.clone(),
                pending,
            }
        }
        (S::SelectingRedemption { customer, .. }, E::CommitConfirmed(pending)) => {
            if !matches!(pending.intent, CommitIntent::Redemption { .. }) {
                return Err(TransitionError::IntentMismatch {
                    state: state.name(),
                    intent: "purchase",
                });
            }
            S::Committing {
                customer: customer.clone(),
                pending,
            }
        }
        (
            S::Committing { customer, .. },
            E::CommitSucceeded {
                transaction,
                membership,
            },
        ) => S::Succeeded {
            customer: customer.with_membership(Some(membership)),
            transaction,
        },
        (
            S::Committing { customer, pending },
            E::CommitFailed {
                outcome,
                membership,
            },
        ) => {
            let mut customer = customer.with_membership(membership);
            if outcome == Outcome::NoActiveRule {
                customer.has_active_rule = false;
            }
            S::Failed {
                failure: SessionFailure {
                    outcome,
                    customer: Some(customer),
                    pending: Some(pending.clone()),
                },
            }
        }

        // --- unknown outcomes -----------------------------------------------
        (S::Failed { failure }, E::CommitResubmitted) => {
            match (&failure.customer, &failure.pending, failure.kind()) {
                (Some(customer), Some(pending), FailureKind::Unknown) => S::Committing {
                    customer: customer.clone(),
                    pending: pending.clone(),
                },
                _ => return Err(TransitionError::NotResubmittable),
            }
        }
        (S::Failed { failure }, E::VerificationStarted) => {
            match (&failure.customer, &failure.pending, failure.kind()) {
                (Some(_), Some(_), FailureKind::Unknown) => S::Verifying {
                    failure: failure.clone(),
                },
                _ => return Err(invalid(&E::VerificationStarted)),
            }
        }
        (S::Verifying { failure }, E::VerificationUnavailable) => S::Failed {
            failure: failure.clone(),
        },
        (S::Verifying { failure }, E::OutcomeVerified(verification)) => {
            let Some(customer) = &failure.customer else {
                return Err(invalid(&E::OutcomeVerified(verification)));
            };
            match verification {
                Verification::Applied {
                    transaction,
                    membership,
                } => S::Succeeded {
                    customer: customer.with_membership(Some(membership)),
                    transaction,
                },
                Verification::NotApplied { membership } => S::Known {
                    customer: customer.with_membership(Some(membership)),
                },
            }
        }

        (_, event) => return Err(invalid(&event)),
    };

    Ok(next)
}

// =============================================================================
// Unit Tests
// =============================================================================
