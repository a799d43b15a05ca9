//! Text rendering of the session screens.

use loyalty_core::session::{KnownCustomer, SessionState};
use loyalty_core::{ActiveOffer, FailureKind, Outcome, QuoteResult, RewardProduct, Transaction};
use loyalty_db::AuditDiscrepancy;

pub fn state(state: &SessionState) -> String {
    match state {
        SessionState::Idle => "Ready to scan".to_string(),
        SessionState::Scanned { .. } | SessionState::Resolving { .. } => {
            "Looking up customer...".to_string()
        }
        SessionState::Enrolling { identity, in_flight } => {
            if *in_flight {
                format!("Enrolling {}...", identity.display_name)
            } else {
                format!(
                    "{} is not a member yet. 'enroll' to sign them up, 'cancel' to skip",
                    identity.display_name
                )
            }
        }
        SessionState::Known { customer } => {
            let mut text = card(customer);
            if !customer.has_active_rule {
                text.push_str("\n  earning is off: no points rule is active here");
            }
            text
        }
        SessionState::LoadingCatalog { customer } => {
            format!("{}\n  [rewards] loading the catalog...", card(customer))
        }
        SessionState::QuotingPurchase {
            customer,
            quote,
            in_flight,
        } => {
            let mut text = card(customer);
            text.push_str("\n  [earn] ");
            text.push_str(&match (quote, in_flight) {
                (_, true) => "quoting...".to_string(),
                (None, false) => "'quote <amount>' or 'sale <amount> [note]'".to_string(),
                (Some(quote), false) => self::quote(quote),
            });
            text
        }
        SessionState::SelectingRedemption { customer, catalog } => {
            let mut text = card(customer);
            text.push_str("\n  [rewards]");
            if catalog.is_empty() {
                text.push_str("\n    no rewards in the catalog");
            }
            for product in catalog {
                text.push_str("\n    ");
                text.push_str(&reward(product, customer.membership.available_points));
            }
            text
        }
        SessionState::Committing { .. } => "Sending to the ledger...".to_string(),
        SessionState::Succeeded {
            customer,
            transaction,
        } => format!(
            "{}\n  balance now {} pts. 'done' for the next customer",
            self::transaction(transaction),
            customer.membership.available_points
        ),
        SessionState::Failed { failure } => {
            let mut text = format!("{} [{}]", failure.outcome.message(), failure.outcome.code());
            match (failure.kind(), &failure.customer) {
                (FailureKind::Unknown, _) => {
                    text.push_str("\n  'verify' to check the ledger, 'resubmit' to resend");
                }
                (FailureKind::DefinitelyNotApplied, Some(customer)) => {
                    text.push_str(&format!(
                        "\n  balance {} pts. 'back' to the customer, 'cancel' to end",
                        customer.membership.available_points
                    ));
                }
                (FailureKind::DefinitelyNotApplied, None) => {
                    text.push_str("\n  scan again or 'cancel'");
                }
            }
            text
        }
        SessionState::Verifying { .. } => "Checking the ledger for the last commit...".to_string(),
    }
}

fn card(customer: &KnownCustomer) -> String {
    format!(
        "{} ({})\n  {} pts available, {} earned, {} redeemed",
        customer.identity.display_name,
        customer.identity.id,
        customer.membership.available_points,
        customer.membership.total_earned,
        customer.membership.total_redeemed
    )
}

fn quote(quote: &QuoteResult) -> String {
    match quote {
        QuoteResult::Quoted { quote } => format!(
            "{} earns about {} pts{}",
            quote.amount,
            quote.points,
            quote
                .rule_context
                .rule_name
                .as_ref()
                .map(|name| format!(" ({})", name))
                .unwrap_or_default()
        ),
        QuoteResult::NoActiveRule => Outcome::NoActiveRule.message(),
        QuoteResult::Unavailable { .. } => {
            "quote unavailable, the ledger will compute the points".to_string()
        }
    }
}

fn reward(product: &RewardProduct, available_points: i64) -> String {
    let stock = product.total_stock();
    let mut line = format!(
        "{:<16} {:>6} pts  {}",
        product.id, product.required_points, product.name
    );
    if stock == 0 {
        line.push_str("  (out of stock)");
    } else {
        line.push_str(&format!("  ({} left)", stock));
    }
    if available_points < product.required_points {
        line.push_str("  [not enough points]");
    }
    line
}

pub fn transaction(transaction: &Transaction) -> String {
    match transaction {
        Transaction::Purchase(purchase) => format!(
            "{} purchase {} +{} pts{}",
            purchase.id,
            purchase.amount,
            purchase.points_earned,
            purchase
                .notes
                .as_ref()
                .map(|notes| format!(" \"{}\"", notes))
                .unwrap_or_default()
        ),
        Transaction::Redemption(redemption) => format!(
            "{} redemption {} -{} pts at {}",
            redemption.id, redemption.product_id, redemption.points_spent, redemption.branch_id
        ),
    }
}

pub fn offers(offers: &[ActiveOffer]) -> String {
    if offers.is_empty() {
        return "No points offers running here".to_string();
    }
    offers
        .iter()
        .map(|offer| {
            format!(
                "{}: {} pts per unit{}",
                offer.name,
                offer.points_per_unit,
                if offer.branch_id.is_some() {
                    " (this branch only)"
                } else {
                    ""
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn audit(discrepancies: &[AuditDiscrepancy]) -> String {
    if discrepancies.is_empty() {
        return "Ledger audit: all balances match their transactions".to_string();
    }
    discrepancies
        .iter()
        .map(|d| {
            format!(
                "MISMATCH {}@{}: available {} earned {} redeemed {}, ledger earned {} redeemed {}",
                d.membership.customer_id,
                d.membership.organization_id,
                d.membership.available_points,
                d.membership.total_earned,
                d.membership.total_redeemed,
                d.ledger_earned,
                d.ledger_redeemed
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
