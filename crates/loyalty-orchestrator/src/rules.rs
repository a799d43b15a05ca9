//! # Points Rule Client
//!
//! Advisory quotes for the earn screen. The number shown here is never what
//! gets committed: the ledger evaluates the rules again when it applies the
//! purchase.
//!
//! "No rule is active" and "a rule gives zero points" are different answers:
//! the first blocks earning, the second is a valid quote of 0.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use loyalty_core::{
    ActiveOffer, Money, PointsQuote, QuoteResult, RuleContext, RuleEvaluation, SessionContext,
};

use crate::backend::LoyaltyBackend;
use crate::retry::{read_with_retry, ReadFailure, ReadPolicy};

pub struct PointsRuleClient {
    backend: Arc<dyn LoyaltyBackend>,
    policy: ReadPolicy,
}

impl PointsRuleClient {
    pub fn new(backend: Arc<dyn LoyaltyBackend>, policy: ReadPolicy) -> Self {
        PointsRuleClient { backend, policy }
    }

    /// Quotes `amount` under the rules active at `at`.
    pub async fn quote(
        &self,
        amount: Money,
        ctx: &SessionContext,
        at: DateTime<Utc>,
    ) -> QuoteResult {
        let backend = &self.backend;
        let evaluation = read_with_retry(&self.policy, "evaluate_points", || {
            backend.evaluate_points(amount, &ctx.organization_id, &ctx.branch_id, at)
        })
        .await;

        match evaluation {
            Ok(RuleEvaluation::Evaluated {
                points,
                rule_id,
                rule_name,
            }) => {
                debug!(amount = %amount, points, rule_id = %rule_id, "Quoted purchase");
                QuoteResult::Quoted {
                    quote: PointsQuote {
                        amount,
                        points,
                        rule_context: RuleContext {
                            organization_id: ctx.organization_id.clone(),
                            branch_id: ctx.branch_id.clone(),
                            evaluated_at: at,
                            rule_id: Some(rule_id),
                            rule_name: Some(rule_name),
                        },
                    },
                }
            }
            Ok(RuleEvaluation::NoActiveRule) => QuoteResult::NoActiveRule,
            Err(failure) => QuoteResult::Unavailable {
                reason: failure.to_string(),
            },
        }
    }

    /// Offers running at the cashier's branch.
    pub async fn active_offers(
        &self,
        ctx: &SessionContext,
        at: DateTime<Utc>,
    ) -> Result<Vec<ActiveOffer>, ReadFailure> {
        let backend = &self.backend;
        read_with_retry(&self.policy, "active_offers", || {
            backend.active_offers(&ctx.organization_id, &ctx.branch_id, at)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::testing::{Call, Fault, ScriptedBackend};

    fn ctx() -> SessionContext {
        SessionContext::new("org-1", "branch-1", "cashier-1")
    }

    #[tokio::test]
    async fn test_quote_carries_rule_context() {
        let backend = Arc::new(ScriptedBackend::new("org-1", "branch-1"));
        backend.set_rule(10);
        let client = PointsRuleClient::new(backend, ReadPolicy::default());
        let at = Utc::now();

        let QuoteResult::Quoted { quote } = client.quote(Money::from_cents(1000), &ctx(), at).await
        else {
            panic!("expected a quote");
        };
        assert_eq!(quote.points, 100);
        assert_eq!(quote.rule_context.evaluated_at, at);
        assert_eq!(quote.rule_context.rule_id.as_deref(), Some("rule-1"));
    }

    #[tokio::test]
    async fn test_zero_rate_is_a_quote_not_no_rule() {
        let backend = Arc::new(ScriptedBackend::new("org-1", "branch-1"));
        backend.set_rule(0);
        let client = PointsRuleClient::new(backend, ReadPolicy::default());

        let result = client.quote(Money::from_cents(1000), &ctx(), Utc::now()).await;
        assert!(matches!(result, QuoteResult::Quoted { ref quote } if quote.points == 0));
        assert!(!result.blocks_purchase());
    }

    #[tokio::test]
    async fn test_no_active_rule_blocks_purchase() {
        let backend = Arc::new(ScriptedBackend::new("org-1", "branch-1"));
        let client = PointsRuleClient::new(backend.clone(), ReadPolicy::default());

        let result = client.quote(Money::from_cents(1000), &ctx(), Utc::now()).await;
        assert_eq!(result, QuoteResult::NoActiveRule);
        assert!(result.blocks_purchase());
        assert!(client.active_offers(&ctx(), Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_is_unavailable_without_guess() {
        let backend = Arc::new(ScriptedBackend::new("org-1", "branch-1"));
        backend.set_rule(10);
        backend.inject(
            Call::EvaluatePoints,
            Fault::Fail(BackendError::Internal("rule engine crashed".into())),
        );
        let client = PointsRuleClient::new(backend, ReadPolicy::default());

        let result = client.quote(Money::from_cents(1000), &ctx(), Utc::now()).await;
        assert!(matches!(result, QuoteResult::Unavailable { .. }));
        assert!(!result.blocks_purchase());
    }
}
