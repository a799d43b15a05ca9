//! # Scripted Backend
//!
//! An in-memory [`LoyaltyBackend`] for orchestrator tests that need what a
//! real database will not do on demand: fail a call, hang past a timeout,
//! or apply a commit and then lose the answer.
//!
//! ```rust,ignore
//! let backend = ScriptedBackend::new("org-1", "branch-1");
//! backend.add_member("cust-1", "Ana", 500);
//! backend.inject(Call::CommitRedemption, Fault::ApplyThenHang(Duration::from_secs(60)));
//! ```
//!
//! Faults are queued per call and each one is consumed by the next call of
//! that kind.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use loyalty_core::{
    ActiveOffer, CustomerIdentity, IdempotencyToken, LedgerOutcome, Membership, Money, Purchase,
    PurchaseCommand, Redemption, RedemptionCommand, RewardProduct, RuleEvaluation, StockLine,
    Transaction,
};

use crate::backend::{BackendResult, LoyaltyBackend};
use crate::error::BackendError;

/// Backend operations, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    FindCustomer,
    FindMembership,
    InsertMembership,
    ReactivateMembership,
    ActiveOffers,
    EvaluatePoints,
    ListRewards,
    CommitPurchase,
    CommitRedemption,
    FindTransaction,
}

/// What the next call of a kind does instead of answering normally.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fails without touching anything.
    Fail(BackendError),
    /// Sleeps, then answers normally.
    Hang(Duration),
    /// Applies the change, then sleeps before answering.
    ApplyThenHang(Duration),
}

#[derive(Debug, Default)]
struct State {
    customers: HashMap<String, CustomerIdentity>,
    memberships: HashMap<(String, String), Membership>,
    offers: Vec<ActiveOffer>,
    rewards: Vec<RewardProduct>,
    ledger: HashMap<IdempotencyToken, Transaction>,
    faults: HashMap<Call, VecDeque<Fault>>,
    calls: HashMap<Call, usize>,
    next_id: u64,
}

/// In-memory backend with scripted faults.
#[derive(Debug)]
pub struct ScriptedBackend {
    organization_id: String,
    branch_id: String,
    state: Mutex<State>,
}

impl ScriptedBackend {
    pub fn new(organization_id: &str, branch_id: &str) -> Self {
        ScriptedBackend {
            organization_id: organization_id.to_string(),
            branch_id: branch_id.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Adds a customer without a membership.
    pub fn add_customer(&self, customer_id: &str, name: &str) {
        self.state().customers.insert(
            customer_id.to_string(),
            CustomerIdentity {
                id: customer_id.to_string(),
                display_name: name.to_string(),
                email: None,
            },
        );
    }

    /// Adds a customer enrolled with `points` already earned.
    pub fn add_member(&self, customer_id: &str, name: &str, points: i64) {
        self.add_customer(customer_id, name);
        let mut membership = Membership::enrolled(customer_id, &self.organization_id);
        membership.available_points = points;
        membership.total_earned = points;
        self.state().memberships.insert(
            (customer_id.to_string(), self.organization_id.clone()),
            membership,
        );
    }

    pub fn set_membership_active(&self, customer_id: &str, active: bool) {
        let key = (customer_id.to_string(), self.organization_id.clone());
        if let Some(membership) = self.state().memberships.get_mut(&key) {
            membership.active = active;
        }
    }

    /// Runs an org-wide offer at `points_per_unit` (replacing any other).
    pub fn set_rule(&self, points_per_unit: i64) {
        self.state().offers = vec![ActiveOffer {
            id: "rule-1".to_string(),
            name: format!("{} pts per unit", points_per_unit),
            description: None,
            points_per_unit,
            branch_id: None,
        }];
    }

    pub fn clear_rules(&self) {
        self.state().offers.clear();
    }

    /// Adds a reward stocked at the backend's branch.
    pub fn add_reward(&self, product_id: &str, required_points: i64, stock: i64) {
        let product = RewardProduct {
            id: product_id.to_string(),
            organization_id: self.organization_id.clone(),
            name: product_id.to_string(),
            description: None,
            required_points,
            stock_lines: vec![StockLine {
                id: format!("stock-{}", product_id),
                product_id: product_id.to_string(),
                branch_id: self.branch_id.clone(),
                quantity: stock,
            }],
        };
        self.state().rewards.push(product);
    }

    /// Queues a fault for the next call of `call`.
    pub fn inject(&self, call: Call, fault: Fault) {
        self.state().faults.entry(call).or_default().push_back(fault);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn calls(&self, call: Call) -> usize {
        self.state().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn membership(&self, customer_id: &str) -> Option<Membership> {
        let key = (customer_id.to_string(), self.organization_id.clone());
        self.state().memberships.get(&key).cloned()
    }

    pub fn stock(&self, product_id: &str) -> i64 {
        self.state()
            .rewards
            .iter()
            .find(|p| p.id == product_id)
            .map(RewardProduct::total_stock)
            .unwrap_or(0)
    }

    pub fn transaction_count(&self) -> usize {
        self.state().ledger.len()
    }

    // =========================================================================
    // Fault plumbing
    // =========================================================================

    /// Counts the call and plays its fault. `Ok(Some(d))` means: apply,
    /// then sleep `d` before answering.
    async fn enter(&self, call: Call) -> BackendResult<Option<Duration>> {
        let fault = {
            let mut state = self.state();
            *state.calls.entry(call).or_default() += 1;
            state.faults.get_mut(&call).and_then(VecDeque::pop_front)
        };

        match fault {
            None => Ok(None),
            Some(Fault::Fail(error)) => Err(error),
            Some(Fault::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(None)
            }
            Some(Fault::ApplyThenHang(duration)) => Ok(Some(duration)),
        }
    }

    async fn leave(hang: Option<Duration>) {
        if let Some(duration) = hang {
            tokio::time::sleep(duration).await;
        }
    }

    // =========================================================================
    // Ledger simulation
    // =========================================================================

    fn apply_purchase(&self, command: &PurchaseCommand) -> LedgerOutcome {
        let mut state = self.state();
        if let Some(existing) = replay(&state, &command.token) {
            return existing;
        }
        if !command.amount.is_positive() {
            return LedgerOutcome::Rejected {
                reason: "amount must be positive".to_string(),
            };
        }
        let Some(rate) = state.offers.first().map(|offer| offer.points_per_unit) else {
            return LedgerOutcome::NoActiveRule;
        };
        let points = command.amount.cents() * rate / 100;

        let key = (command.customer_id.clone(), command.context.organization_id.clone());
        let Some(membership) = state.memberships.get_mut(&key).filter(|m| m.active) else {
            return LedgerOutcome::MembershipMissing;
        };
        membership.available_points += points;
        membership.total_earned += points;
        let membership = membership.clone();

        state.next_id += 1;
        let transaction = Transaction::Purchase(Purchase {
            id: format!("tx-{}", state.next_id),
            idempotency_token: command.token.clone(),
            customer_id: command.customer_id.clone(),
            organization_id: command.context.organization_id.clone(),
            branch_id: command.context.branch_id.clone(),
            cashier_id: command.context.cashier_id.clone(),
            amount: command.amount,
            points_earned: points,
            notes: command.notes.clone(),
            created_at: command.requested_at,
        });
        state.ledger.insert(command.token.clone(), transaction.clone());

        LedgerOutcome::Applied {
            transaction,
            membership,
            replayed: false,
        }
    }

    fn apply_redemption(&self, command: &RedemptionCommand) -> LedgerOutcome {
        let mut state = self.state();
        if let Some(existing) = replay(&state, &command.token) {
            return existing;
        }
        let Some(required) = state
            .rewards
            .iter()
            .find(|p| p.id == command.product_id)
            .map(|p| p.required_points)
        else {
            return LedgerOutcome::Rejected {
                reason: format!("reward {} is not available", command.product_id),
            };
        };

        let key = (command.customer_id.clone(), command.context.organization_id.clone());
        let available = match state.memberships.get(&key) {
            Some(m) if m.active => m.available_points,
            _ => return LedgerOutcome::MembershipMissing,
        };
        if available < required {
            return LedgerOutcome::InsufficientPoints {
                available,
                required,
            };
        }

        let line = state
            .rewards
            .iter_mut()
            .find(|p| p.id == command.product_id)
            .and_then(|p| p.stock_lines.iter_mut().find(|line| line.quantity > 0));
        let Some(line) = line else {
            return LedgerOutcome::OutOfStock {
                product_id: command.product_id.clone(),
            };
        };
        line.quantity -= 1;
        let (stock_line_id, branch_id) = (line.id.clone(), line.branch_id.clone());

        let Some(membership) = state.memberships.get_mut(&key) else {
            return LedgerOutcome::MembershipMissing;
        };
        membership.available_points -= required;
        membership.total_redeemed += required;
        let membership = membership.clone();

        state.next_id += 1;
        let transaction = Transaction::Redemption(Redemption {
            id: format!("tx-{}", state.next_id),
            idempotency_token: command.token.clone(),
            customer_id: command.customer_id.clone(),
            organization_id: command.context.organization_id.clone(),
            product_id: command.product_id.clone(),
            points_spent: required,
            stock_line_id,
            branch_id,
            cashier_id: command.context.cashier_id.clone(),
            created_at: command.requested_at,
        });
        state.ledger.insert(command.token.clone(), transaction.clone());

        LedgerOutcome::Applied {
            transaction,
            membership,
            replayed: false,
        }
    }
}

fn replay(state: &State, token: &IdempotencyToken) -> Option<LedgerOutcome> {
    let transaction = state.ledger.get(token)?;
    let key = (
        transaction.customer_id().to_string(),
        match transaction {
            Transaction::Purchase(p) => p.organization_id.clone(),
            Transaction::Redemption(r) => r.organization_id.clone(),
        },
    );
    let membership = state.memberships.get(&key)?.clone();
    Some(LedgerOutcome::Applied {
        transaction: transaction.clone(),
        membership,
        replayed: true,
    })
}

#[async_trait]
impl LoyaltyBackend for ScriptedBackend {
    async fn find_customer(&self, customer_id: &str) -> BackendResult<Option<CustomerIdentity>> {
        let hang = self.enter(Call::FindCustomer).await?;
        let customer = self.state().customers.get(customer_id).cloned();
        Self::leave(hang).await;
        Ok(customer)
    }

    async fn find_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> BackendResult<Option<Membership>> {
        let hang = self.enter(Call::FindMembership).await?;
        let key = (customer_id.to_string(), organization_id.to_string());
        let membership = self.state().memberships.get(&key).cloned();
        Self::leave(hang).await;
        Ok(membership)
    }

    async fn insert_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> BackendResult<Membership> {
        let hang = self.enter(Call::InsertMembership).await?;
        let key = (customer_id.to_string(), organization_id.to_string());
        let inserted = {
            let mut state = self.state();
            if state.memberships.contains_key(&key) {
                Err(BackendError::UniqueViolation {
                    field: "membership".to_string(),
                })
            } else {
                let membership = Membership::enrolled(customer_id, organization_id);
                state.memberships.insert(key, membership.clone());
                Ok(membership)
            }
        };
        Self::leave(hang).await;
        inserted
    }

    async fn reactivate_membership(
        &self,
        customer_id: &str,
        organization_id: &str,
    ) -> BackendResult<Membership> {
        let hang = self.enter(Call::ReactivateMembership).await?;
        let key = (customer_id.to_string(), organization_id.to_string());
        let reactivated = match self.state().memberships.get_mut(&key) {
            Some(membership) => {
                membership.active = true;
                Ok(membership.clone())
            }
            None => Err(BackendError::Rejected(format!(
                "membership not found: {}",
                customer_id
            ))),
        };
        Self::leave(hang).await;
        reactivated
    }

    async fn active_offers(
        &self,
        _organization_id: &str,
        _branch_id: &str,
        _at: DateTime<Utc>,
    ) -> BackendResult<Vec<ActiveOffer>> {
        let hang = self.enter(Call::ActiveOffers).await?;
        let offers = self.state().offers.clone();
        Self::leave(hang).await;
        Ok(offers)
    }

    async fn evaluate_points(
        &self,
        amount: Money,
        _organization_id: &str,
        _branch_id: &str,
        _at: DateTime<Utc>,
    ) -> BackendResult<RuleEvaluation> {
        let hang = self.enter(Call::EvaluatePoints).await?;
        let evaluation = match self.state().offers.first() {
            Some(offer) => RuleEvaluation::Evaluated {
                points: amount.cents().max(0) * offer.points_per_unit / 100,
                rule_id: offer.id.clone(),
                rule_name: offer.name.clone(),
            },
            None => RuleEvaluation::NoActiveRule,
        };
        Self::leave(hang).await;
        Ok(evaluation)
    }

    async fn list_rewards(&self, _organization_id: &str) -> BackendResult<Vec<RewardProduct>> {
        let hang = self.enter(Call::ListRewards).await?;
        let mut rewards = self.state().rewards.clone();
        rewards.sort_by(|a, b| a.required_points.cmp(&b.required_points).then(a.id.cmp(&b.id)));
        Self::leave(hang).await;
        Ok(rewards)
    }

    async fn commit_purchase(&self, command: &PurchaseCommand) -> BackendResult<LedgerOutcome> {
        let hang = self.enter(Call::CommitPurchase).await?;
        let outcome = self.apply_purchase(command);
        Self::leave(hang).await;
        Ok(outcome)
    }

    async fn commit_redemption(
        &self,
        command: &RedemptionCommand,
    ) -> BackendResult<LedgerOutcome> {
        let hang = self.enter(Call::CommitRedemption).await?;
        let outcome = self.apply_redemption(command);
        Self::leave(hang).await;
        Ok(outcome)
    }

    async fn find_transaction(
        &self,
        token: &IdempotencyToken,
    ) -> BackendResult<Option<(Transaction, Membership)>> {
        let hang = self.enter(Call::FindTransaction).await?;
        let found = match replay(&self.state(), token) {
            Some(LedgerOutcome::Applied {
                transaction,
                membership,
                ..
            }) => Some((transaction, membership)),
            _ => None,
        };
        Self::leave(hang).await;
        Ok(found)
    }
}
