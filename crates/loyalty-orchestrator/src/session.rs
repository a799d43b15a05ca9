//! # Cashier Session
//!
//! Drives the scan session state machine from `loyalty-core` against a
//! backend: every cashier action becomes an event, every backend call runs
//! between two events.
//!
//! ## Flow of a Call
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cashier action                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  lock ─► transition(state, Started) ─► unlock      (refused → Err)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  backend call (resolver / gate / rules / committer), no lock held      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  lock ─► same epoch? ─► transition(state, Result) ─► unlock            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! While a call is in flight the state is busy, so a second scan is dropped
//! instead of queued. The epoch changes whenever the session starts over
//! (new scan, back to idle); a result that comes back under an older epoch
//! belongs to a customer who is no longer at the counter and is discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use loyalty_core::payload::{decode_payload, ScanPayload};
use loyalty_core::session::{
    transition, CommitIntent, KnownCustomer, PendingCommit, SessionEvent, SessionState,
    TransitionError,
};
use loyalty_core::validation::{validate_amount, validate_notes};
use loyalty_core::{
    ActiveOffer, Clock, CustomerIdentity, Membership, Money, Outcome, SessionContext,
};

use crate::backend::LoyaltyBackend;
use crate::committer::{CommitResult, TransactionCommitter};
use crate::config::RegisterConfig;
use crate::error::{SessionError, SessionResult};
use crate::identity::IdentityResolver;
use crate::membership::{Enrollment, GateDecision, MembershipGate};
use crate::retry::ReadPolicy;
use crate::rules::PointsRuleClient;

// =============================================================================
// Settings
// =============================================================================

/// Timing knobs for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub max_payload_age_ms: i64,
    pub read_policy: ReadPolicy,
    pub commit_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            max_payload_age_ms: loyalty_core::DEFAULT_MAX_PAYLOAD_AGE_MS,
            read_policy: ReadPolicy::default(),
            commit_timeout: Duration::from_secs(20),
        }
    }
}

impl From<&RegisterConfig> for SessionSettings {
    fn from(config: &RegisterConfig) -> Self {
        SessionSettings {
            max_payload_age_ms: config.max_payload_age_ms(),
            read_policy: config.read_policy(),
            commit_timeout: config.commit_timeout(),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Default)]
struct Slot {
    state: SessionState,
    epoch: u64,
}

/// One cashier's scan session.
pub struct CashierSession {
    context: SessionContext,
    clock: Arc<dyn Clock>,
    resolver: IdentityResolver,
    gate: MembershipGate,
    rules: PointsRuleClient,
    committer: TransactionCommitter,
    slot: Mutex<Slot>,
}

impl CashierSession {
    pub fn new(
        context: SessionContext,
        backend: Arc<dyn LoyaltyBackend>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        let policy = settings.read_policy;
        CashierSession {
            resolver: IdentityResolver::new(
                backend.clone(),
                clock.clone(),
                settings.max_payload_age_ms,
                policy.clone(),
            ),
            gate: MembershipGate::new(backend.clone(), policy.clone()),
            rules: PointsRuleClient::new(backend.clone(), policy.clone()),
            committer: TransactionCommitter::new(
                backend,
                clock.clone(),
                policy,
                settings.commit_timeout,
            ),
            context,
            clock,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> SessionState {
        self.slot.lock().await.state.clone()
    }

    // =========================================================================
    // State plumbing
    // =========================================================================

    /// Applies an event. With `expected_epoch`, only if the session has not
    /// started over since.
    async fn apply(
        &self,
        expected_epoch: Option<u64>,
        operation: &'static str,
        event: SessionEvent,
    ) -> SessionResult<(SessionState, u64)> {
        let mut slot = self.slot.lock().await;

        if let Some(epoch) = expected_epoch {
            if slot.epoch != epoch {
                debug!(operation, event = event.name(), "Dropping result for an abandoned session");
                return Err(SessionError::Discarded { operation });
            }
        }

        let event_name = event.name();
        let starts_over = matches!(
            event,
            SessionEvent::PayloadDecoded(_)
                | SessionEvent::PayloadRejected(_)
                | SessionEvent::ReturnToIdle
        );

        match transition(&slot.state, event) {
            Ok(next) => {
                debug!(from = slot.state.name(), to = next.name(), event = event_name, "Session transition");
                slot.state = next.clone();
                if starts_over {
                    slot.epoch += 1;
                }
                Ok((next, slot.epoch))
            }
            Err(err) => {
                debug!(state = slot.state.name(), event = event_name, %err, "Session event refused");
                Err(err.into())
            }
        }
    }

    async fn apply_at(
        &self,
        epoch: u64,
        operation: &'static str,
        event: SessionEvent,
    ) -> SessionResult<SessionState> {
        self.apply(Some(epoch), operation, event)
            .await
            .map(|(state, _)| state)
    }

    async fn snapshot(&self) -> (SessionState, u64) {
        let slot = self.slot.lock().await;
        (slot.state.clone(), slot.epoch)
    }

    // =========================================================================
    // Scan and resolution
    // =========================================================================

    /// Handles the raw string of a camera scan.
    ///
    /// Ends in `Known`, `Enrolling` (enrollment offered) or `Failed`. A scan
    /// arriving while another backend call is in flight is dropped with a
    /// `Busy` error.
    pub async fn scan(&self, raw: &str) -> SessionResult<SessionState> {
        let payload = match decode_payload(raw) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(%err, "Scan is not a loyalty code");
                let rejected = SessionEvent::PayloadRejected(Outcome::MalformedPayload);
                return self.apply(None, "scan", rejected).await.map(|(state, _)| state);
            }
        };

        let (_, epoch) = self
            .apply(None, "scan", SessionEvent::PayloadDecoded(payload.clone()))
            .await?;
        self.apply_at(epoch, "scan", SessionEvent::ResolutionStarted).await?;

        let result = self.resolve(&payload).await;
        self.apply_at(epoch, "resolve", result).await
    }

    async fn resolve(&self, payload: &ScanPayload) -> SessionEvent {
        let identity = match self.resolver.resolve(payload).await.into_identity() {
            Ok(identity) => identity,
            Err(outcome) => return SessionEvent::ResolutionFailed(outcome),
        };

        match self.gate.check(&identity.id, &self.context.organization_id).await {
            GateDecision::Member(membership) => match self.known(identity, membership).await {
                Ok(customer) => {
                    info!(
                        customer_id = %customer.identity.id,
                        available_points = customer.membership.available_points,
                        "Member recognized"
                    );
                    SessionEvent::MemberFound(customer)
                }
                Err(outcome) => SessionEvent::ResolutionFailed(outcome),
            },
            GateDecision::NotAMember => SessionEvent::MembershipMissing(identity),
            GateDecision::Unavailable => SessionEvent::ResolutionFailed(Outcome::Unavailable),
        }
    }

    /// Builds the customer card, deriving whether earning is possible.
    async fn known(
        &self,
        identity: CustomerIdentity,
        membership: Membership,
    ) -> Result<KnownCustomer, Outcome> {
        let offers = self
            .rules
            .active_offers(&self.context, self.clock.now())
            .await
            .map_err(|_| Outcome::Unavailable)?;

        Ok(KnownCustomer {
            identity,
            membership,
            has_active_rule: !offers.is_empty(),
        })
    }

    // =========================================================================
    // Enrollment
    // =========================================================================

    /// Accepts the enrollment offer.
    pub async fn enroll(&self) -> SessionResult<SessionState> {
        let (state, epoch) = self
            .apply(None, "enroll", SessionEvent::EnrollmentStarted)
            .await?;
        let SessionState::Enrolling { identity, .. } = state else {
            return Ok(state);
        };

        let result = match self
            .gate
            .enroll(&identity.id, &self.context.organization_id)
            .await
        {
            Enrollment::Enrolled(membership) => match self.known(identity, membership).await {
                Ok(customer) => SessionEvent::Enrolled(customer),
                Err(outcome) => SessionEvent::EnrollmentFailed(outcome),
            },
            Enrollment::Unavailable => SessionEvent::EnrollmentFailed(Outcome::Unavailable),
        };
        self.apply_at(epoch, "enroll", result).await
    }

    // =========================================================================
    // Earning
    // =========================================================================

    /// Opens the earn screen. Refused when no points rule is active.
    pub async fn start_purchase(&self) -> SessionResult<SessionState> {
        self.apply(None, "start_purchase", SessionEvent::PurchaseSelected)
            .await
            .map(|(state, _)| state)
    }

    /// Asks for an advisory quote of `amount`.
    pub async fn quote(&self, amount: Money) -> SessionResult<SessionState> {
        validate_amount(amount)?;

        let (_, epoch) = self
            .apply(None, "quote", SessionEvent::QuoteRequested)
            .await?;
        let quote = self.rules.quote(amount, &self.context, self.clock.now()).await;
        self.apply_at(epoch, "quote", SessionEvent::QuoteReceived(quote))
            .await
    }

    /// Offers running at this branch, for the earn screen.
    pub async fn active_offers(&self) -> SessionResult<Vec<ActiveOffer>> {
        self.rules
            .active_offers(&self.context, self.clock.now())
            .await
            .map_err(|_| SessionError::Outcome(Outcome::Unavailable))
    }

    /// Commits a purchase under a new idempotency token.
    pub async fn confirm_purchase(
        &self,
        amount: Money,
        notes: Option<&str>,
    ) -> SessionResult<SessionState> {
        validate_amount(amount)?;
        let notes = validate_notes(notes)?;

        let pending = PendingCommit::new(CommitIntent::Purchase { amount, notes });
        self.confirm(pending).await
    }

    // =========================================================================
    // Redemption
    // =========================================================================

    /// Opens the reward catalog.
    ///
    /// A failed read goes back to the customer card and reports
    /// `Unavailable`.
    pub async fn start_redemption(&self) -> SessionResult<SessionState> {
        let (_, epoch) = self
            .apply(None, "start_redemption", SessionEvent::CatalogRequested)
            .await?;

        match self.committer.rewards(&self.context).await {
            Ok(catalog) => {
                self.apply_at(epoch, "start_redemption", SessionEvent::RedemptionSelected(catalog))
                    .await
            }
            Err(_) => {
                self.apply_at(epoch, "start_redemption", SessionEvent::CatalogUnavailable)
                    .await?;
                Err(SessionError::Outcome(Outcome::Unavailable))
            }
        }
    }

    /// Commits a redemption of one unit of `product_id` from the catalog
    /// on screen.
    pub async fn confirm_redemption(&self, product_id: &str) -> SessionResult<SessionState> {
        let required_points = match self.snapshot().await.0 {
            SessionState::SelectingRedemption { catalog, .. } => catalog
                .iter()
                .find(|product| product.id == product_id)
                .map(|product| product.required_points)
                .ok_or_else(|| SessionError::UnknownReward(product_id.to_string()))?,
            other => {
                return Err(TransitionError::IntentMismatch {
                    state: other.name(),
                    intent: "redemption",
                }
                .into())
            }
        };

        let pending = PendingCommit::new(CommitIntent::Redemption {
            product_id: product_id.to_string(),
            required_points,
        });
        self.confirm(pending).await
    }

    // =========================================================================
    // Commit
    // =========================================================================

    async fn confirm(&self, pending: PendingCommit) -> SessionResult<SessionState> {
        let (state, epoch) = self
            .apply(None, "confirm", SessionEvent::CommitConfirmed(pending))
            .await?;
        self.run_commit(state, epoch).await
    }

    /// Sends the commit held by a `Committing` state and records the result.
    async fn run_commit(&self, state: SessionState, epoch: u64) -> SessionResult<SessionState> {
        let SessionState::Committing { customer, pending } = state else {
            return Ok(state);
        };

        let result = self
            .committer
            .commit(&self.context, &customer.identity.id, &pending)
            .await;
        let event = match result {
            CommitResult::Committed {
                transaction,
                membership,
                ..
            } => SessionEvent::CommitSucceeded {
                transaction,
                membership,
            },
            CommitResult::Failed {
                outcome,
                membership,
            } => SessionEvent::CommitFailed {
                outcome,
                membership,
            },
        };
        self.apply_at(epoch, "commit", event).await
    }

    /// Resends a commit whose outcome is unknown, with the same token.
    ///
    /// Only ever done on the cashier's explicit request.
    pub async fn resubmit(&self) -> SessionResult<SessionState> {
        let (state, epoch) = self
            .apply(None, "resubmit", SessionEvent::CommitResubmitted)
            .await?;
        info!("Resubmitting commit with its original token");
        self.run_commit(state, epoch).await
    }

    /// Looks up what became of a commit whose outcome is unknown.
    ///
    /// When the lookup itself fails the commit stays unknown: the session
    /// returns to `Failed` and the error is reported.
    pub async fn verify(&self) -> SessionResult<SessionState> {
        let (state, epoch) = self
            .apply(None, "verify", SessionEvent::VerificationStarted)
            .await?;
        let target = match &state {
            SessionState::Verifying { failure } => failure
                .customer
                .as_ref()
                .zip(failure.pending.as_ref())
                .map(|(customer, pending)| (customer.identity.id.clone(), pending.token.clone())),
            _ => None,
        };
        let Some((customer_id, token)) = target else {
            return Ok(state);
        };

        match self.committer.verify(&self.context, &customer_id, &token).await {
            Ok(verification) => {
                self.apply_at(epoch, "verify", SessionEvent::OutcomeVerified(verification))
                    .await
            }
            Err(outcome) => {
                self.apply_at(epoch, "verify", SessionEvent::VerificationUnavailable)
                    .await?;
                Err(SessionError::Outcome(outcome))
            }
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Back to the customer card.
    pub async fn back(&self) -> SessionResult<SessionState> {
        self.apply(None, "back", SessionEvent::BackToCustomer)
            .await
            .map(|(state, _)| state)
    }

    /// Ends the session (done or cancelled). Refused while a commit is in
    /// flight.
    pub async fn finish(&self) -> SessionResult<SessionState> {
        self.apply(None, "finish", SessionEvent::ReturnToIdle)
            .await
            .map(|(state, _)| state)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
