//! # Transaction Committer
//!
//! Sends confirmed purchases and redemptions to the ledger and turns the
//! answer into a session result.
//!
//! ## Commit Results
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  local validation fails ─────────────► Rejected   (no backend call)    │
//! │                                                                         │
//! │  backend answers within commit timeout:                                 │
//! │    Applied (or replayed) ────────────► Committed                       │
//! │    InsufficientPoints / OutOfStock /                                    │
//! │    NoActiveRule / Rejected ──────────► Failed + fresh balance read     │
//! │    membership gone ──────────────────► NotAMember + fresh read         │
//! │    lost race / store busy ───────────► Conflict + fresh read           │
//! │                                                                         │
//! │  timeout, transport failure ─────────► Unknown    (may have applied!)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A commit is sent exactly once per call. Nothing here retries a write:
//! after `Unknown` the caller verifies by idempotency token, or resubmits
//! the same token on purpose.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use loyalty_core::session::{CommitIntent, PendingCommit, Verification};
use loyalty_core::validation::{validate_amount, validate_id, validate_notes};
use loyalty_core::{
    Clock, IdempotencyToken, LedgerOutcome, Membership, Money, Outcome, PurchaseCommand,
    RedemptionCommand, RewardProduct, SessionContext, Transaction, ValidationError,
};

use crate::backend::{BackendResult, LoyaltyBackend};
use crate::error::BackendError;
use crate::retry::{read_with_retry, ReadFailure, ReadPolicy};

/// What became of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    Committed {
        transaction: Transaction,
        membership: Membership,
        /// The token had already been applied; this is the original result.
        replayed: bool,
    },
    Failed {
        outcome: Outcome,
        /// Balance re-read after the failure, when one was possible.
        membership: Option<Membership>,
    },
}

impl CommitResult {
    fn rejected(err: ValidationError) -> Self {
        CommitResult::Failed {
            outcome: Outcome::rejected(err.to_string()),
            membership: None,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            CommitResult::Committed { transaction, .. } => Outcome::Success {
                transaction: transaction.clone(),
            },
            CommitResult::Failed { outcome, .. } => outcome.clone(),
        }
    }
}

pub struct TransactionCommitter {
    backend: Arc<dyn LoyaltyBackend>,
    clock: Arc<dyn Clock>,
    policy: ReadPolicy,
    commit_timeout: Duration,
}

impl TransactionCommitter {
    pub fn new(
        backend: Arc<dyn LoyaltyBackend>,
        clock: Arc<dyn Clock>,
        policy: ReadPolicy,
        commit_timeout: Duration,
    ) -> Self {
        TransactionCommitter {
            backend,
            clock,
            policy,
            commit_timeout,
        }
    }

    // =========================================================================
    // Commits
    // =========================================================================

    /// Commits a purchase. Points are derived by the ledger at commit time.
    pub async fn commit_purchase(
        &self,
        ctx: &SessionContext,
        customer_id: &str,
        amount: Money,
        notes: Option<&str>,
        token: &IdempotencyToken,
    ) -> CommitResult {
        let notes = match validate_id("customer_id", customer_id)
            .and_then(|_| validate_amount(amount))
            .and_then(|_| validate_notes(notes))
        {
            Ok(notes) => notes,
            Err(err) => return CommitResult::rejected(err),
        };

        let command = PurchaseCommand {
            token: token.clone(),
            context: ctx.clone(),
            customer_id: customer_id.to_string(),
            amount,
            notes,
            requested_at: self.clock.now(),
        };

        info!(
            customer_id = %customer_id,
            amount = %amount,
            token = %token,
            cashier_id = %ctx.cashier_id,
            "Committing purchase"
        );
        let sent = tokio::time::timeout(self.commit_timeout, self.backend.commit_purchase(&command)).await;
        self.settle(ctx, customer_id, token, sent).await
    }

    pub async fn commit_redemption(
        &self,
        ctx: &SessionContext,
        customer_id: &str,
        product_id: &str,
        token: &IdempotencyToken,
    ) -> CommitResult {
        if let Err(err) =
            validate_id("customer_id", customer_id).and_then(|_| validate_id("product_id", product_id))
        {
            return CommitResult::rejected(err);
        }

        let command = RedemptionCommand {
            token: token.clone(),
            context: ctx.clone(),
            customer_id: customer_id.to_string(),
            product_id: product_id.to_string(),
            requested_at: self.clock.now(),
        };

        info!(
            customer_id = %customer_id,
            product_id = %product_id,
            token = %token,
            cashier_id = %ctx.cashier_id,
            "Committing redemption"
        );
        let sent =
            tokio::time::timeout(self.commit_timeout, self.backend.commit_redemption(&command)).await;
        self.settle(ctx, customer_id, token, sent).await
    }

    /// Commits whatever the cashier confirmed, under its token.
    pub async fn commit(
        &self,
        ctx: &SessionContext,
        customer_id: &str,
        pending: &PendingCommit,
    ) -> CommitResult {
        match &pending.intent {
            CommitIntent::Purchase { amount, notes } => {
                self.commit_purchase(ctx, customer_id, *amount, notes.as_deref(), &pending.token)
                    .await
            }
            CommitIntent::Redemption { product_id, .. } => {
                self.commit_redemption(ctx, customer_id, product_id, &pending.token)
                    .await
            }
        }
    }

    async fn settle(
        &self,
        ctx: &SessionContext,
        customer_id: &str,
        token: &IdempotencyToken,
        sent: Result<BackendResult<LedgerOutcome>, tokio::time::error::Elapsed>,
    ) -> CommitResult {
        let outcome = match sent {
            Ok(Ok(LedgerOutcome::Applied {
                transaction,
                membership,
                replayed,
            })) => {
                info!(
                    transaction_id = %transaction.id(),
                    kind = %transaction.kind(),
                    points_delta = transaction.points_delta(),
                    available_points = membership.available_points,
                    replayed,
                    "Commit applied"
                );
                return CommitResult::Committed {
                    transaction,
                    membership,
                    replayed,
                };
            }
            Ok(Ok(LedgerOutcome::InsufficientPoints {
                available,
                required,
            })) => {
                info!(customer_id = %customer_id, available, required, "Insufficient points");
                Outcome::InsufficientPoints
            }
            Ok(Ok(LedgerOutcome::OutOfStock { product_id })) => {
                info!(product_id = %product_id, "Reward out of stock");
                Outcome::OutOfStock
            }
            Ok(Ok(LedgerOutcome::NoActiveRule)) => Outcome::NoActiveRule,
            Ok(Ok(LedgerOutcome::MembershipMissing)) => {
                warn!(customer_id = %customer_id, "Membership inactive at commit time");
                Outcome::NotAMember
            }
            Ok(Ok(LedgerOutcome::Rejected { reason })) | Ok(Err(BackendError::Rejected(reason))) => {
                warn!(token = %token, reason = %reason, "Commit rejected");
                Outcome::Rejected { reason }
            }
            Ok(Err(BackendError::Conflict(message))) => {
                warn!(token = %token, %message, "Commit lost a race");
                Outcome::Conflict
            }
            Ok(Err(BackendError::UniqueViolation { field })) => {
                warn!(token = %token, field = %field, "Commit collided with an existing row");
                Outcome::Conflict
            }
            Ok(Err(error)) => {
                warn!(token = %token, %error, "Commit failed in transit; outcome unknown");
                return CommitResult::Failed {
                    outcome: Outcome::Unknown,
                    membership: None,
                };
            }
            Err(_) => {
                warn!(
                    token = %token,
                    timeout = ?self.commit_timeout,
                    "Commit timed out; outcome unknown"
                );
                return CommitResult::Failed {
                    outcome: Outcome::Unknown,
                    membership: None,
                };
            }
        };

        let membership = self.refresh_membership(ctx, customer_id).await.ok().flatten();
        CommitResult::Failed {
            outcome,
            membership,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Re-reads a customer's membership.
    pub async fn refresh_membership(
        &self,
        ctx: &SessionContext,
        customer_id: &str,
    ) -> Result<Option<Membership>, ReadFailure> {
        let backend = &self.backend;
        read_with_retry(&self.policy, "find_membership", || {
            backend.find_membership(customer_id, &ctx.organization_id)
        })
        .await
    }

    /// The organization's reward catalog, cheapest first.
    pub async fn rewards(&self, ctx: &SessionContext) -> Result<Vec<RewardProduct>, ReadFailure> {
        let backend = &self.backend;
        read_with_retry(&self.policy, "list_rewards", || {
            backend.list_rewards(&ctx.organization_id)
        })
        .await
    }

    /// Finds out what happened to a commit whose outcome is unknown.
    ///
    /// ## Returns
    /// - `Ok(Applied)`: a transaction is recorded under the token
    /// - `Ok(NotApplied)`: nothing is recorded; carries the fresh balance
    /// - `Err(Outcome::Unavailable)`: could not tell, try again
    /// - `Err(Outcome::NotAMember)`: the membership is gone
    pub async fn verify(
        &self,
        ctx: &SessionContext,
        customer_id: &str,
        token: &IdempotencyToken,
    ) -> Result<Verification, Outcome> {
        let backend = &self.backend;
        let found = read_with_retry(&self.policy, "find_transaction", || {
            backend.find_transaction(token)
        })
        .await
        .map_err(|_| Outcome::Unavailable)?;

        if let Some((transaction, membership)) = found {
            info!(token = %token, transaction_id = %transaction.id(), "Verified: commit was applied");
            return Ok(Verification::Applied {
                transaction,
                membership,
            });
        }

        match self.refresh_membership(ctx, customer_id).await {
            Ok(Some(membership)) => {
                info!(token = %token, "Verified: commit was not applied");
                Ok(Verification::NotApplied { membership })
            }
            Ok(None) => Err(Outcome::NotAMember),
            Err(_) => Err(Outcome::Unavailable),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, Fault, ScriptedBackend};
    use loyalty_core::SystemClock;

    const COMMIT_TIMEOUT: Duration = Duration::from_secs(20);

    fn ctx() -> SessionContext {
        SessionContext::new("org-1", "branch-1", "cashier-1")
    }

    fn setup() -> (Arc<ScriptedBackend>, TransactionCommitter) {
        let backend = Arc::new(ScriptedBackend::new("org-1", "branch-1"));
        backend.add_member("cust-1", "Ana", 500);
        backend.set_rule(10);
        backend.add_reward("mug", 500, 1);
        let committer = TransactionCommitter::new(
            backend.clone(),
            Arc::new(SystemClock),
            ReadPolicy::default(),
            COMMIT_TIMEOUT,
        );
        (backend, committer)
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected_without_backend_call() {
        let (backend, committer) = setup();
        let token = IdempotencyToken::generate();

        for cents in [0, -500] {
            let result = committer
                .commit_purchase(&ctx(), "cust-1", Money::from_cents(cents), None, &token)
                .await;
            assert_eq!(result.outcome(), Outcome::rejected("amount must be positive"));
        }
        assert_eq!(backend.calls(Call::CommitPurchase), 0);
    }

    #[tokio::test]
    async fn test_purchase_commits_with_ledger_points() {
        let (backend, committer) = setup();
        let result = committer
            .commit_purchase(&ctx(), "cust-1", Money::from_cents(1000), Some("  "), &IdempotencyToken::generate())
            .await;

        let CommitResult::Committed {
            transaction: Transaction::Purchase(purchase),
            membership,
            replayed: false,
        } = result
        else {
            panic!("expected a committed purchase, got {:?}", result);
        };
        assert_eq!(purchase.points_earned, 100);
        assert_eq!(purchase.notes, None);
        assert_eq!(membership.available_points, 600);
        assert_eq!(backend.calls(Call::CommitPurchase), 1);
    }

    #[tokio::test]
    async fn test_insufficient_points_comes_with_fresh_balance() {
        let (backend, committer) = setup();
        backend.add_reward("tote", 900, 3);

        let result = committer
            .commit_redemption(&ctx(), "cust-1", "tote", &IdempotencyToken::generate())
            .await;
        assert_eq!(
            result,
            CommitResult::Failed {
                outcome: Outcome::InsufficientPoints,
                membership: backend.membership("cust-1"),
            }
        );
        assert_eq!(backend.stock("tote"), 3);
    }

    #[tokio::test]
    async fn test_conflict_is_not_retried() {
        let (backend, committer) = setup();
        backend.inject(
            Call::CommitRedemption,
            Fault::Fail(BackendError::Conflict("database is locked".into())),
        );

        let result = committer
            .commit_redemption(&ctx(), "cust-1", "mug", &IdempotencyToken::generate())
            .await;
        assert_eq!(result.outcome(), Outcome::Conflict);
        assert_eq!(backend.calls(Call::CommitRedemption), 1);
        assert_eq!(backend.stock("mug"), 1);
    }

    #[tokio::test]
    async fn test_deactivated_membership_is_not_a_member() {
        let (backend, committer) = setup();
        backend.set_membership_active("cust-1", false);

        let result = committer
            .commit_purchase(&ctx(), "cust-1", Money::from_cents(1000), None, &IdempotencyToken::generate())
            .await;
        assert!(matches!(
            result,
            CommitResult::Failed { outcome: Outcome::NotAMember, membership: Some(ref m) } if !m.active
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_unknown_and_not_resent() {
        let (backend, committer) = setup();
        backend.inject(
            Call::CommitRedemption,
            Fault::ApplyThenHang(Duration::from_secs(60)),
        );
        let token = IdempotencyToken::generate();

        let result = committer.commit_redemption(&ctx(), "cust-1", "mug", &token).await;
        assert_eq!(
            result,
            CommitResult::Failed {
                outcome: Outcome::Unknown,
                membership: None,
            }
        );
        assert_eq!(result.outcome().failure_kind(), loyalty_core::FailureKind::Unknown);
        assert_eq!(backend.calls(Call::CommitRedemption), 1);

        // The write landed: verification finds it.
        let verification = committer.verify(&ctx(), "cust-1", &token).await.unwrap();
        assert!(matches!(
            verification,
            Verification::Applied { ref membership, .. } if membership.available_points == 0
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_unknown() {
        let (backend, committer) = setup();
        backend.inject(
            Call::CommitPurchase,
            Fault::Fail(BackendError::Unavailable("connection reset".into())),
        );
        let token = IdempotencyToken::generate();

        let result = committer
            .commit_purchase(&ctx(), "cust-1", Money::from_cents(1000), None, &token)
            .await;
        assert_eq!(result.outcome(), Outcome::Unknown);

        let verification = committer.verify(&ctx(), "cust-1", &token).await.unwrap();
        assert!(matches!(
            verification,
            Verification::NotApplied { ref membership } if membership.available_points == 500
        ));
    }

    #[tokio::test]
    async fn test_resubmitted_token_replays() {
        let (backend, committer) = setup();
        let token = IdempotencyToken::generate();

        let first = committer.commit_redemption(&ctx(), "cust-1", "mug", &token).await;
        let second = committer.commit_redemption(&ctx(), "cust-1", "mug", &token).await;

        assert!(matches!(first, CommitResult::Committed { replayed: false, .. }));
        assert!(matches!(second, CommitResult::Committed { replayed: true, .. }));
        assert_eq!(backend.transaction_count(), 1);
        assert_eq!(backend.stock("mug"), 0);
    }
}
