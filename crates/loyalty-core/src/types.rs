//! # Domain Types
//!
//! Domain types shared by the orchestrator, the ledger and the cashier UI.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ CustomerIdentity │   │   Membership     │   │   Transaction    │    │
//! │  │ ──────────────── │   │ ──────────────── │   │ ──────────────── │    │
//! │  │ id               │   │ customer_id      │   │ Purchase         │    │
//! │  │ display_name     │──►│ organization_id  │◄──│  (earns points)  │    │
//! │  │ email            │   │ available_points │   │ Redemption       │    │
//! │  └──────────────────┘   │ total_earned     │   │  (spends points, │    │
//! │                         │ total_redeemed   │   │   takes 1 unit)  │    │
//! │                         │ active           │   └────────┬─────────┘    │
//! │                         └──────────────────┘            │              │
//! │                                                         ▼              │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │   PointsQuote    │   │  RewardProduct   │──►│    StockLine     │    │
//! │  │ (advisory only)  │   │ required_points  │   │ branch, quantity │    │
//! │  └──────────────────┘   └──────────────────┘   └──────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ledger Projection
//! Membership counters are a projection of the transaction log:
//! `total_earned = Σ purchase.points_earned`,
//! `total_redeemed = Σ redemption.points_spent`,
//! `available_points = total_earned - total_redeemed >= 0`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Session Context
// =============================================================================

/// Who is operating the register and where.
///
/// Set once when the cashier signs in and passed explicitly into every
/// orchestrator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionContext {
    pub organization_id: String,
    pub branch_id: String,
    pub cashier_id: String,
}

impl SessionContext {
    pub fn new(
        organization_id: impl Into<String>,
        branch_id: impl Into<String>,
        cashier_id: impl Into<String>,
    ) -> Self {
        SessionContext {
            organization_id: organization_id.into(),
            branch_id: branch_id.into(),
            cashier_id: cashier_id.into(),
        }
    }
}

// =============================================================================
// Customer Identity
// =============================================================================

/// Read-only snapshot of the scanned customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerIdentity {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
}

impl CustomerIdentity {
    /// Builds the name shown on the customer card.
    ///
    /// "First Last" when any name part is present, otherwise the email,
    /// otherwise a generic label.
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::CustomerIdentity;
    ///
    /// assert_eq!(CustomerIdentity::display_name_from(Some("Ana"), None, None), "Ana");
    /// assert_eq!(
    ///     CustomerIdentity::display_name_from(None, None, Some("ana@example.com")),
    ///     "ana@example.com"
    /// );
    /// ```
    pub fn display_name_from(
        first_name: Option<&str>,
        last_name: Option<&str>,
        email: Option<&str>,
    ) -> String {
        let full = format!(
            "{} {}",
            first_name.unwrap_or("").trim(),
            last_name.unwrap_or("").trim()
        );
        let full = full.trim();

        if !full.is_empty() {
            full.to_string()
        } else if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
            email.trim().to_string()
        } else {
            "Customer".to_string()
        }
    }
}

// =============================================================================
// Membership
// =============================================================================

/// A customer's points standing with one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Membership {
    pub customer_id: String,
    pub organization_id: String,
    pub available_points: i64,
    pub total_earned: i64,
    pub total_redeemed: i64,
    pub active: bool,
}

impl Membership {
    /// A freshly enrolled membership: active, all counters zero.
    pub fn enrolled(customer_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Membership {
            customer_id: customer_id.into(),
            organization_id: organization_id.into(),
            available_points: 0,
            total_earned: 0,
            total_redeemed: 0,
            active: true,
        }
    }

    /// True when the counters satisfy the ledger projection invariant.
    pub fn is_consistent(&self) -> bool {
        self.available_points >= 0
            && self.total_earned >= 0
            && self.total_redeemed >= 0
            && self.available_points == self.total_earned - self.total_redeemed
    }

    /// Advisory affordability check for the catalog screen.
    ///
    /// The ledger re-checks at commit time; this only greys out rewards.
    pub fn can_afford(&self, required_points: i64) -> bool {
        self.active && self.available_points >= required_points
    }
}

// =============================================================================
// Points Rules
// =============================================================================

/// The context a points evaluation was made in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleContext {
    pub organization_id: String,
    pub branch_id: String,
    #[ts(as = "String")]
    pub evaluated_at: DateTime<Utc>,
    pub rule_id: Option<String>,
    pub rule_name: Option<String>,
}

/// Advisory points computation shown before a purchase is confirmed.
///
/// Never used as the committed value: the ledger re-derives points when the
/// purchase is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PointsQuote {
    pub amount: Money,
    pub points: i64,
    pub rule_context: RuleContext,
}

/// What the rule engine said about an amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RuleEvaluation {
    /// No rule is active for the organization/branch at that time.
    NoActiveRule,
    /// A rule applied; `points` may legitimately be zero.
    Evaluated {
        points: i64,
        rule_id: String,
        rule_name: String,
    },
}

/// Result of asking for a quote, as the session stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuoteResult {
    Quoted { quote: PointsQuote },
    /// Earning is blocked until the store configures a rule.
    NoActiveRule,
    /// Rule engine unreachable or failing. No client-side guess is made.
    Unavailable { reason: String },
}

impl QuoteResult {
    /// True when the quote blocks confirming a purchase.
    pub fn blocks_purchase(&self) -> bool {
        matches!(self, QuoteResult::NoActiveRule)
    }
}

/// An offer currently running at a branch, shown on the earn screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActiveOffer {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub points_per_unit: i64,
    /// `None` when the offer runs at every branch of the organization.
    pub branch_id: Option<String>,
}

// =============================================================================
// Reward Catalog
// =============================================================================

/// Units of one reward product held by one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLine {
    pub id: String,
    pub product_id: String,
    pub branch_id: String,
    pub quantity: i64,
}

/// A product customers can redeem points for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RewardProduct {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub description: Option<String>,
    pub required_points: i64,
    pub stock_lines: Vec<StockLine>,
}

impl RewardProduct {
    /// Total units across every branch.
    pub fn total_stock(&self) -> i64 {
        self.stock_lines.iter().map(|line| line.quantity.max(0)).sum()
    }

    /// True when at least one stock line has a unit left.
    pub fn is_in_stock(&self) -> bool {
        self.stock_lines.iter().any(|line| line.quantity > 0)
    }
}

// =============================================================================
// Idempotency Token
// =============================================================================

/// Client-generated identifier attached to a commit request.
///
/// One token per logical cashier action. Resubmitting the same token makes
/// the ledger return the transaction it already recorded instead of applying
/// the change twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        IdempotencyToken(Uuid::new_v4().to_string())
    }

    /// Parses a token received from elsewhere (must be a UUID).
    pub fn parse(value: &str) -> CoreResult<Self> {
        Uuid::parse_str(value.trim())
            .map(|uuid| IdempotencyToken(uuid.to_string()))
            .map_err(|_| CoreError::InvalidToken(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// The two kinds of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Purchase,
    Redemption,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Purchase => write!(f, "purchase"),
            TransactionKind::Redemption => write!(f, "redemption"),
        }
    }
}

/// A points-earning purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Purchase {
    pub id: String,
    pub idempotency_token: IdempotencyToken,
    pub customer_id: String,
    pub organization_id: String,
    pub branch_id: String,
    pub cashier_id: String,
    pub amount: Money,
    pub points_earned: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A points-spending redemption of one unit of a reward product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Redemption {
    pub id: String,
    pub idempotency_token: IdempotencyToken,
    pub customer_id: String,
    pub organization_id: String,
    pub product_id: String,
    pub points_spent: i64,
    pub stock_line_id: String,
    /// Branch whose stock line supplied the unit.
    pub branch_id: String,
    pub cashier_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transaction {
    Purchase(Purchase),
    Redemption(Redemption),
}

impl Transaction {
    pub fn id(&self) -> &str {
        match self {
            Transaction::Purchase(p) => &p.id,
            Transaction::Redemption(r) => &r.id,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Transaction::Purchase(_) => TransactionKind::Purchase,
            Transaction::Redemption(_) => TransactionKind::Redemption,
        }
    }

    pub fn idempotency_token(&self) -> &IdempotencyToken {
        match self {
            Transaction::Purchase(p) => &p.idempotency_token,
            Transaction::Redemption(r) => &r.idempotency_token,
        }
    }

    pub fn customer_id(&self) -> &str {
        match self {
            Transaction::Purchase(p) => &p.customer_id,
            Transaction::Redemption(r) => &r.customer_id,
        }
    }

    /// Signed effect on `available_points`.
    pub fn points_delta(&self) -> i64 {
        match self {
            Transaction::Purchase(p) => p.points_earned,
            Transaction::Redemption(r) => -r.points_spent,
        }
    }
}

// =============================================================================
// Commit Requests
// =============================================================================

/// Everything the ledger needs to apply a purchase.
///
/// Carries the amount, never the quoted points: the ledger evaluates the
/// rules itself at `requested_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseCommand {
    pub token: IdempotencyToken,
    pub context: SessionContext,
    pub customer_id: String,
    pub amount: Money,
    pub notes: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// Everything the ledger needs to apply a redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionCommand {
    pub token: IdempotencyToken,
    pub context: SessionContext,
    pub customer_id: String,
    pub product_id: String,
    pub requested_at: DateTime<Utc>,
}

impl PurchaseCommand {
    /// Identity of the request, stored beside its idempotency token.
    ///
    /// A token resubmitted with a different fingerprint is a client bug and
    /// is rejected instead of being answered with somebody else's result.
    pub fn fingerprint(&self) -> String {
        format!(
            "purchase:{}:{}:{}:{}",
            self.customer_id,
            self.context.organization_id,
            self.context.branch_id,
            self.amount.cents()
        )
    }
}

impl RedemptionCommand {
    pub fn fingerprint(&self) -> String {
        format!(
            "redemption:{}:{}:{}",
            self.customer_id, self.context.organization_id, self.product_id
        )
    }
}

/// The ledger's answer to a commit request.
///
/// Everything except `Applied` means nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The transaction is recorded. `replayed` is true when the token had
    /// already been applied and this is the original result.
    Applied {
        transaction: Transaction,
        membership: Membership,
        replayed: bool,
    },
    InsufficientPoints { available: i64, required: i64 },
    OutOfStock { product_id: String },
    NoActiveRule,
    /// No active membership at commit time (deactivated since the gate ran).
    MembershipMissing,
    Rejected { reason: String },
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(
            CustomerIdentity::display_name_from(Some(" Ana "), Some("Pérez"), None),
            "Ana Pérez"
        );
        assert_eq!(CustomerIdentity::display_name_from(None, Some("Pérez"), None), "Pérez");
        assert_eq!(
            CustomerIdentity::display_name_from(Some(""), Some("  "), Some("a@b.co")),
            "a@b.co"
        );
        assert_eq!(CustomerIdentity::display_name_from(None, None, None), "Customer");
    }

    #[test]
    fn test_membership_consistency() {
        let mut membership = Membership::enrolled("c1", "org1");
        assert!(membership.is_consistent());

        membership.total_earned = 500;
        membership.available_points = 500;
        assert!(membership.is_consistent());
        assert!(membership.can_afford(500));
        assert!(!membership.can_afford(501));

        membership.total_redeemed = 100;
        assert!(!membership.is_consistent());
    }

    #[test]
    fn test_inactive_membership_cannot_afford() {
        let mut membership = Membership::enrolled("c1", "org1");
        membership.active = false;
        assert!(!membership.can_afford(0));
    }

    #[test]
    fn test_reward_stock_totals() {
        let product = RewardProduct {
            id: "p1".into(),
            organization_id: "org1".into(),
            name: "Mug".into(),
            description: None,
            required_points: 300,
            stock_lines: vec![
                StockLine { id: "s1".into(), product_id: "p1".into(), branch_id: "b1".into(), quantity: 0 },
                StockLine { id: "s2".into(), product_id: "p1".into(), branch_id: "b2".into(), quantity: 3 },
            ],
        };
        assert_eq!(product.total_stock(), 3);
        assert!(product.is_in_stock());
    }

    #[test]
    fn test_idempotency_token_parse() {
        let token = IdempotencyToken::generate();
        let parsed = IdempotencyToken::parse(token.as_str()).unwrap();
        assert_eq!(parsed, token);
        assert!(IdempotencyToken::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_transaction_serializes_with_kind_tag() {
        let tx = Transaction::Redemption(Redemption {
            id: "t1".into(),
            idempotency_token: IdempotencyToken::generate(),
            customer_id: "c1".into(),
            organization_id: "org1".into(),
            product_id: "p1".into(),
            points_spent: 500,
            stock_line_id: "s1".into(),
            branch_id: "b1".into(),
            cashier_id: "u1".into(),
            created_at: Utc::now(),
        });
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["kind"], "redemption");
        assert_eq!(json["points_spent"], 500);
        assert_eq!(tx.points_delta(), -500);
    }

    #[test]
    fn test_fingerprint_distinguishes_amounts() {
        let base = PurchaseCommand {
            token: IdempotencyToken::generate(),
            context: SessionContext::new("org1", "b1", "u1"),
            customer_id: "c1".into(),
            amount: Money::from_cents(1000),
            notes: None,
            requested_at: Utc::now(),
        };
        let mut other = base.clone();
        other.amount = Money::from_cents(1001);
        assert_ne!(base.fingerprint(), other.fingerprint());
    }
}
