//! # Seed Data Generator
//!
//! Populates a development database with companies, products, pools and
//! issued codes, then prints the capacity report.
//!
//! ## Usage
//! ```bash
//! # 3 companies x 50 products (default)
//! cargo run -p codemint-db --bin seed
//!
//! # Custom amounts
//! cargo run -p codemint-db --bin seed -- --companies 10 --products 200
//!
//! # Specify database path (otherwise CODEMINT_DB_PATH / ./codemint.db)
//! cargo run -p codemint-db --bin seed -- --db ./data/dev.db
//! ```
//!
//! ## Generated Layout
//! ```text
//! ULN pool      1000  UPI13  global         one ULN per company
//! barcode pool  2000  UPI13  global         fallback for every company
//! barcode pool  30NN  UPI13  company #1     scoped pool, preferred for its products
//! ```

use std::env;
use std::time::Instant;

use codemint_core::{CodeKind, IdentifierKind};
use codemint_db::{Database, DbConfig};
use tracing_subscriber::EnvFilter;

const ULN_PREFIX: &str = "1000";
const GLOBAL_BARCODE_PREFIX: &str = "2000";
const SCOPED_BARCODE_PREFIX: &str = "3000";

/// Product lines used to name generated products
const PRODUCT_LINES: &[&str] = &[
    "Tomato Paste",
    "Basmati Rice",
    "Green Tea",
    "Olive Oil",
    "Chickpeas",
    "Wheat Flour",
    "Orange Juice",
    "Sunflower Seeds",
];

/// Pack sizes appended to product names
const SIZES: &[&str] = &["250g", "500g", "1kg", "2kg"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut companies: usize = 3;
    let mut products_per_company: usize = 50;
    let mut db_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--companies" | "-c" => {
                if i + 1 < args.len() {
                    companies = args[i + 1].parse().unwrap_or(companies);
                    i += 1;
                }
            }
            "--products" | "-p" => {
                if i + 1 < args.len() {
                    products_per_company = args[i + 1].parse().unwrap_or(products_per_company);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Codemint Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --companies <N>  Number of companies (default: 3)");
                println!("  -p, --products <N>   Products per company (default: 50)");
                println!("  -d, --db <PATH>      Database file (default: $CODEMINT_DB_PATH or ./codemint.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = match db_path {
        Some(path) => DbConfig::new(path),
        None => DbConfig::from_env()?,
    };

    println!("🌱 Codemint Seed Data Generator");
    println!("===============================");
    println!("Database:  {}", config.database_path.display());
    println!("Companies: {}", companies);
    println!("Products:  {} per company", products_per_company);
    println!();

    let db = Database::new(config).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if !db.pools().list(None, None).await?.is_empty() {
        println!("⚠ Database already has pools");
        println!("  Skipping seed to avoid duplicate prefixes.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = Instant::now();

    // Owners
    let owners = db.owners();
    let mut company_ids = Vec::with_capacity(companies);
    for c in 0..companies {
        let company = owners.create_company(&format!("Company {:03}", c + 1)).await?;
        for p in 0..products_per_company {
            let line = PRODUCT_LINES[p % PRODUCT_LINES.len()];
            let size = SIZES[(p / PRODUCT_LINES.len()) % SIZES.len()];
            owners
                .create_product(&company.id, &format!("{} {} #{}", line, size, p + 1))
                .await?;
        }
        company_ids.push(company.id);
    }
    println!("✓ Created {} companies", company_ids.len());

    // Pools
    let pools = db.pools();
    let uln_pool = pools
        .create(IdentifierKind::Uln, ULN_PREFIX, CodeKind::Upi13, None)
        .await?;
    pools.activate(&uln_pool.id, None).await?;

    let global_pool = pools
        .create(IdentifierKind::Barcode, GLOBAL_BARCODE_PREFIX, CodeKind::Upi13, None)
        .await?;
    pools.activate(&global_pool.id, None).await?;

    if let Some(first) = company_ids.first() {
        let scoped = pools
            .create(
                IdentifierKind::Barcode,
                SCOPED_BARCODE_PREFIX,
                CodeKind::Upi13,
                Some(first),
            )
            .await?;
        pools.activate(&scoped.id, Some(first)).await?;
    }
    println!("✓ Pools registered and activated");

    // Codes
    let issuance = db.issuance();

    let uln_owners: Vec<String> = owners
        .companies_without_uln()
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    let ulns = issuance.bulk_assign(IdentifierKind::Uln, &uln_owners).await?;
    println!(
        "✓ ULNs: {} issued, {} failed",
        ulns.succeeded.len(),
        ulns.failed.len()
    );

    let barcode_owners: Vec<String> = owners
        .products_without_barcode(None)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    let barcodes = issuance
        .bulk_assign(IdentifierKind::Barcode, &barcode_owners)
        .await?;
    println!(
        "✓ Barcodes: {} issued, {} failed",
        barcodes.succeeded.len(),
        barcodes.failed.len()
    );

    let elapsed = start.elapsed();
    let issued = ulns.succeeded.len() + barcodes.succeeded.len();
    println!();
    println!("✓ Issued {} codes in {:?}", issued, elapsed);
    println!(
        "  Rate: {:.0} codes/second",
        issued as f64 / elapsed.as_secs_f64()
    );

    // Capacity report
    println!();
    println!("Capacity report:");
    let mut report = pools.capacity_report(IdentifierKind::Barcode, None).await?;
    report.extend(pools.capacity_report(IdentifierKind::Uln, None).await?);
    println!("{}", serde_json::to_string_pretty(&report)?);

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

/// Installs the log subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show refused assignments too
/// - Default: INFO for codemint crates, WARN for sqlx
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,codemint_db=info,codemint_core=info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
