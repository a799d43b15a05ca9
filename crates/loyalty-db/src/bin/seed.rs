//! # Seed Data Generator
//!
//! Populates a development database for the register.
//!
//! ## Usage
//! ```bash
//! # Seed ./loyalty_dev.db
//! cargo run -p loyalty-db --bin seed
//!
//! # Specify database path
//! cargo run -p loyalty-db --bin seed -- --db ./data/loyalty.db
//! ```
//!
//! ## Generated Data
//! - One organization with three branches
//! - A base earning rule plus a weekend promotion at the flagship branch
//! - Reward products from 100 to 2,000 points, stocked unevenly per branch
//! - Customers; most are members, some with earned points, a few are not
//!   members yet (to exercise enrollment)
//!
//! Point balances come from real purchases committed through the ledger, so
//! the seeded data passes the ledger audit.

use chrono::Utc;
use std::env;

use loyalty_core::{IdempotencyToken, LedgerOutcome, Money, PurchaseCommand, SessionContext};
use loyalty_db::{Database, DbConfig, NewCustomer, NewPointsRule, NewRewardProduct};

const ORGANIZATION: (&str, &str) = ("org-demo", "Corner Coffee Co.");

const BRANCHES: &[(&str, &str)] = &[
    ("branch-main", "Main Street"),
    ("branch-harbor", "Harbor"),
    ("branch-airport", "Airport"),
];

/// (id, name, required points, stock per branch in BRANCHES order)
const REWARDS: &[(&str, &str, i64, [i64; 3])] = &[
    ("reward-cookie", "Chocolate Cookie", 100, [20, 10, 0]),
    ("reward-coffee", "Free Coffee", 250, [50, 25, 25]),
    ("reward-mug", "Branded Mug", 500, [1, 0, 3]),
    ("reward-tote", "Canvas Tote", 900, [5, 5, 0]),
    ("reward-beans", "1kg Coffee Beans", 2000, [0, 0, 0]),
];

const FIRST_NAMES: &[&str] = &[
    "Ana", "Bruno", "Carla", "Diego", "Elena", "Felipe", "Gabriela", "Hugo", "Inés", "Javier",
];
const LAST_NAMES: &[&str] = &["Pérez", "Silva", "Rojas", "Muñoz", "Soto"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./loyalty_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Loyalty Register Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./loyalty_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Loyalty Register Seed Data Generator");
    println!("====================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.organizations().count().await? > 0 {
        println!("⚠ Database already has data");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let (org_id, org_name) = ORGANIZATION;
    db.organizations().insert_organization(org_id, org_name).await?;
    for (branch_id, name) in BRANCHES {
        db.organizations().insert_branch(branch_id, org_id, name).await?;
    }
    println!("✓ Organization {} with {} branches", org_id, BRANCHES.len());

    db.rules()
        .insert(&NewPointsRule {
            id: "rule-base".to_string(),
            organization_id: org_id.to_string(),
            branch_id: None,
            name: "10 points per dollar".to_string(),
            description: Some("Standard earning rate".to_string()),
            points_per_unit: 10,
            priority: 0,
            valid_from_ms: None,
            valid_until_ms: None,
        })
        .await?;
    db.rules()
        .insert(&NewPointsRule {
            id: "rule-main-promo".to_string(),
            organization_id: org_id.to_string(),
            branch_id: Some(BRANCHES[0].0.to_string()),
            name: "Double points at Main Street".to_string(),
            description: None,
            points_per_unit: 20,
            priority: 10,
            valid_from_ms: None,
            valid_until_ms: None,
        })
        .await?;
    println!("✓ Points rules");

    for (product_id, name, required_points, stock) in REWARDS {
        db.catalog()
            .insert_product(&NewRewardProduct {
                id: product_id.to_string(),
                organization_id: org_id.to_string(),
                name: name.to_string(),
                description: None,
                required_points: *required_points,
            })
            .await?;

        for ((branch_id, _), quantity) in BRANCHES.iter().zip(stock.iter()) {
            db.catalog().set_stock(product_id, branch_id, *quantity).await?;
        }
    }
    println!("✓ {} reward products", REWARDS.len());

    let context = SessionContext::new(org_id, BRANCHES[1].0, "seed");
    let mut members = 0;
    let mut purchases = 0;

    for (index, first_name) in FIRST_NAMES.iter().enumerate() {
        let last_name = LAST_NAMES[index % LAST_NAMES.len()];
        let customer_id = format!("cust-{:03}", index + 1);

        db.customers()
            .insert(&NewCustomer {
                id: customer_id.clone(),
                email: Some(format!("{}@example.com", first_name.to_lowercase())),
                first_name: Some(first_name.to_string()),
                last_name: Some(last_name.to_string()),
            })
            .await?;

        // Every fourth customer is left unenrolled.
        if index % 4 == 3 {
            continue;
        }

        db.memberships().insert_enrolled(&customer_id, org_id).await?;
        members += 1;

        for visit in 0..(index % 3) {
            let cents = 500 + ((index * 731 + visit * 257) % 4500) as i64;
            let command = PurchaseCommand {
                token: IdempotencyToken::generate(),
                context: context.clone(),
                customer_id: customer_id.clone(),
                amount: Money::from_cents(cents),
                notes: None,
                requested_at: Utc::now(),
            };

            match db.ledger().commit_purchase(&command).await? {
                LedgerOutcome::Applied { .. } => purchases += 1,
                other => eprintln!("Purchase for {} not applied: {:?}", customer_id, other),
            }
        }
    }
    println!(
        "✓ {} customers, {} members, {} purchases",
        FIRST_NAMES.len(),
        members,
        purchases
    );

    let discrepancies = db.ledger().audit().await?;
    println!();
    if discrepancies.is_empty() {
        println!("✓ Ledger audit clean");
    } else {
        println!("⚠ Ledger audit found {} discrepancies", discrepancies.len());
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
