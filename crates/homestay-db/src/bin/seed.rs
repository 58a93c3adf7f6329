//! # Demo Credit Seeder
//!
//! Grants starting credit to demo guests so bookings can be exercised
//! locally with a partial or full credit payment.
//!
//! ## Usage
//! ```bash
//! # Grant ₩100,000 to guest-1 .. guest-5 (default)
//! cargo run -p homestay-db --bin seed
//!
//! # Custom guest count and amount
//! cargo run -p homestay-db --bin seed -- --guests 20 --amount 50000
//!
//! # Specify database path
//! cargo run -p homestay-db --bin seed -- --db ./data/booking.db
//! ```
//!
//! Grants use the idempotency key `seed:<guest>`, so running the seeder
//! twice leaves balances unchanged.

use chrono::Utc;
use homestay_core::Money;
use homestay_db::{AppendOutcome, Database, DbConfig};
use std::env;
use tracing_subscriber::EnvFilter;

const DEFAULT_GUESTS: usize = 5;
const DEFAULT_AMOUNT: i64 = 100_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut guests = DEFAULT_GUESTS;
    let mut amount = DEFAULT_AMOUNT;
    let mut db_path = String::from("./homestay_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--guests" | "-g" => {
                if i + 1 < args.len() {
                    guests = args[i + 1].parse().unwrap_or(DEFAULT_GUESTS);
                    i += 1;
                }
            }
            "--amount" | "-a" => {
                if i + 1 < args.len() {
                    amount = args[i + 1].parse().unwrap_or(DEFAULT_AMOUNT);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Homestay Demo Credit Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -g, --guests <N>     Number of demo guests (default: {})", DEFAULT_GUESTS);
                println!("  -a, --amount <WON>   Credit per guest (default: {})", DEFAULT_AMOUNT);
                println!("  -d, --db <PATH>      Database file path (default: ./homestay_dev.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let amount = Money::from_won(amount);
    if !amount.is_positive() {
        return Err(format!("--amount must be positive, got {}", amount).into());
    }

    println!("🌱 Homestay Demo Credit Seeder");
    println!("==============================");
    println!("Database: {}", db_path);
    println!("Guests:   {}", guests);
    println!("Amount:   {}", amount);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");
    println!();

    let credits = db.credits();
    let now = Utc::now();
    let mut granted = 0;

    for n in 1..=guests {
        let guest_id = format!("guest-{}", n);
        let key = format!("seed:{}", guest_id);

        match credits.grant(&guest_id, amount, &key, Some("demo credit"), now).await {
            Ok(AppendOutcome::Appended(_)) => granted += 1,
            Ok(AppendOutcome::Replayed(_)) => {
                println!("  {} already seeded", guest_id);
            }
            Err(e) => {
                eprintln!("Failed to seed {}: {}", guest_id, e);
                continue;
            }
        }

        let balance = credits.balance(&guest_id).await?;
        println!("  {:<10} balance {}", guest_id, balance);
    }

    println!();
    println!("✓ Granted credit to {} guests", granted);

    db.close().await;
    Ok(())
}
