//! # Seed Data Generator
//!
//! Populates the database with development data: customer tiers, sample
//! customers, and a product catalog.
//!
//! ## Usage
//! ```bash
//! # Generate 500 products (default)
//! cargo run -p atlas-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p atlas-db --bin seed -- --count 2000
//!
//! # Specify database path
//! cargo run -p atlas-db --bin seed -- --db ./data/atlas.db
//! ```

use chrono::Utc;
use std::env;

use atlas_core::{Customer, CustomerTier, Product};
use atlas_db::repository::customer::{generate_customer_id, generate_tier_id};
use atlas_db::repository::product::generate_product_id;
use atlas_db::{Database, DbConfig};

/// Product categories with base names.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "TV",
        &[
            "LED TV 32in",
            "LED TV 43in",
            "LED TV 55in",
            "OLED TV 55in",
            "OLED TV 65in",
            "QLED TV 50in",
        ],
    ),
    (
        "MOB",
        &[
            "Smartphone A1",
            "Smartphone A2 Pro",
            "Smartphone X Lite",
            "Feature Phone F10",
            "Tablet T8",
            "Tablet T11 Plus",
        ],
    ),
    (
        "APP",
        &[
            "Refrigerator 260L",
            "Refrigerator 360L",
            "Washing Machine 7kg",
            "Microwave 20L",
            "Air Conditioner 1.5T",
            "Water Purifier",
        ],
    ),
    (
        "AUD",
        &[
            "Soundbar 2.1",
            "Bluetooth Speaker",
            "Wireless Earbuds",
            "Over-Ear Headphones",
            "Party Speaker",
            "AV Receiver",
        ],
    ),
    (
        "ACC",
        &[
            "HDMI Cable 2m",
            "Wall Mount Kit",
            "Surge Protector",
            "USB-C Charger 65W",
            "Power Bank 20000mAh",
            "Remote Control",
        ],
    ),
];

/// (tier name, min cumulative spend cents, discount bps)
const TIERS: &[(&str, i64, u32)] = &[
    ("Standard", 0, 0),
    ("Silver", 5_000_000, 500),
    ("Gold", 20_000_000, 1000),
    ("Platinum", 50_000_000, 1500),
];

const CUSTOMER_NAMES: &[&str] = &[
    "Asha Verma",
    "Rohan Mehta",
    "Priya Nair",
    "Vikram Singh",
    "Neha Kapoor",
    "Arjun Rao",
    "Sana Sheikh",
    "Karan Joshi",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 500;
    let mut db_path = String::from("./atlas_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(500);
                    i += 1;
                }
            }
            "--db" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    println!("Seeding {} products into {}", count, db_path);

    let db = Database::new(DbConfig::new(&db_path)).await?;

    // Tiers first; customers reference them
    let customers_repo = db.customers();
    let mut tier_ids = Vec::new();
    for (name, min_spent, discount_bps) in TIERS {
        let tier = CustomerTier {
            id: generate_tier_id(),
            name: name.to_string(),
            min_spent_cents: *min_spent,
            discount_bps: *discount_bps,
            created_at: Utc::now(),
        };
        customers_repo.insert_tier(&tier).await?;
        tier_ids.push(tier.id);
    }
    println!("Inserted {} tiers", tier_ids.len());

    let now = Utc::now();
    for (idx, name) in CUSTOMER_NAMES.iter().enumerate() {
        let customer = Customer {
            id: generate_customer_id(),
            name: name.to_string(),
            tier_id: Some(tier_ids[idx % tier_ids.len()].clone()),
            total_spent_cents: 0,
            last_purchase_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        customers_repo.insert(&customer).await?;
    }
    println!("Inserted {} customers", CUSTOMER_NAMES.len());

    let products_repo = db.products();
    let mut inserted = 0usize;
    'outer: for n in 0.. {
        for (category, names) in CATEGORIES {
            for (j, name) in names.iter().enumerate() {
                if inserted >= count {
                    break 'outer;
                }

                let serial = n * names.len() + j;
                // Deterministic pseudo-variety from the serial number
                let price_cents = 49_900 + (serial as i64 % 40) * 250_000;
                let stock = (serial as i64 * 7) % 100;

                let product = Product {
                    id: generate_product_id(),
                    sku: format!("{}-{:05}", category, serial),
                    name: format!("{} #{}", name, serial),
                    price_cents,
                    cost_cents: Some(price_cents * 7 / 10),
                    stock,
                    reorder_level: 5,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };
                products_repo.insert(&product).await?;
                inserted += 1;

                if inserted % 100 == 0 {
                    println!("  {} products...", inserted);
                }
            }
        }
    }

    println!("Inserted {} products", inserted);
    println!("Done. Active products in catalog: {}", products_repo.count().await?);

    db.close().await;
    Ok(())
}
