//! Operator CLI for the bakery back office
//!
//! Runs migrations, seeds a demo catalog and prints the reports staff ask
//! for most often without going through the HTTP API.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::{ArgAction, Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use bakery_api::{
    config,
    db::{self, DbPool},
    events::{self, EventSender},
    services::{
        catalog::{ActiveFilter, CatalogService, CreateCategoryInput, CreateProductInput, ProductFilter},
        inventory::{CreateSupplyItemInput, InventoryService},
        reports::{format_cop, ReportService},
    },
};

#[derive(Parser)]
#[command(name = "bakery", about = "Bakery back-office maintenance and reports", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[arg(long, global = true, help = "Overrides the configured database URL")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Load the demo catalog and supplies into an empty database
    Seed,
    /// Supplies at or below their minimum quantity
    LowStock,
    /// Sales for today and the current month
    Stats,
    /// Best-selling products of a month
    BestSellers {
        #[arg(long, help = "Year, defaults to the current one")]
        year: Option<i32>,
        #[arg(long, help = "Month 1-12, defaults to the current one")]
        month: Option<u32>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Customers ranked by what they have spent
    Customers {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the receipt of an order
    Receipt {
        #[arg(value_parser = clap::value_parser!(Uuid), help = "Order identifier (UUID)")]
        order_id: Uuid,
    },
}

struct CliContext {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    currency: String,
}

impl CliContext {
    async fn initialize(database_url: Option<String>) -> Result<Self> {
        let mut cfg = config::load_config().context("failed to load configuration")?;
        config::init_tracing(cfg.log_level(), cfg.log_json);
        if let Some(url) = database_url {
            cfg.database_url = url;
        }

        let pool = db::connect(&cfg)
            .await
            .context("failed to connect to the database")?;

        let (tx, rx) = mpsc::channel(cfg.event_channel_capacity);
        tokio::spawn(events::process_events(rx));

        Ok(Self {
            db: Arc::new(pool),
            event_sender: Arc::new(EventSender::new(tx)),
            currency: cfg.currency,
        })
    }

    fn catalog(&self) -> CatalogService {
        CatalogService::new(self.db.clone(), self.event_sender.clone())
    }

    fn inventory(&self) -> InventoryService {
        InventoryService::new(self.db.clone(), self.event_sender.clone())
    }

    fn reports(&self) -> ReportService {
        ReportService::new(self.db.clone(), self.currency.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize(cli.database_url).await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db).await?;
            println!("Migrations applied");
        }
        Commands::Seed => seed(&context).await?,
        Commands::LowStock => low_stock(&context, cli.json).await?,
        Commands::Stats => stats(&context, cli.json).await?,
        Commands::BestSellers { year, month, limit } => {
            let today = Utc::now().date_naive();
            let year = year.unwrap_or_else(|| today.year());
            let month = month.unwrap_or_else(|| today.month());
            best_sellers(&context, year, month, limit, cli.json).await?
        }
        Commands::Customers { limit } => customers(&context, limit, cli.json).await?,
        Commands::Receipt { order_id } => receipt(&context, order_id, cli.json).await?,
    }

    Ok(())
}

const DEMO_CATEGORIES: &[(&str, &str)] = &[
    ("Panadería", "Pan fresco horneado cada mañana"),
    ("Pastelería", "Tortas, postres y hojaldres"),
    ("Bebidas", "Café y bebidas calientes"),
];

struct DemoProduct {
    name: &'static str,
    description: &'static str,
    price: Decimal,
    stock: i32,
    category: usize,
}

const DEMO_PRODUCTS: &[DemoProduct] = &[
    DemoProduct {
        name: "Pan Francés",
        description: "Baguette crujiente",
        price: dec!(2500),
        stock: 40,
        category: 0,
    },
    DemoProduct {
        name: "Croissant",
        description: "Hojaldre de mantequilla",
        price: dec!(3500),
        stock: 25,
        category: 1,
    },
    DemoProduct {
        name: "Torta de Chocolate",
        description: "Torta entera para ocho porciones",
        price: dec!(32000),
        stock: 5,
        category: 1,
    },
    DemoProduct {
        name: "Galletas de Avena",
        description: "Paquete de seis unidades",
        price: dec!(1500),
        stock: 60,
        category: 0,
    },
    DemoProduct {
        name: "Café Americano",
        description: "Taza de 12 onzas",
        price: dec!(2800),
        stock: 100,
        category: 2,
    },
    DemoProduct {
        name: "Sandwich de Jamón",
        description: "Pan artesanal con jamón y queso",
        price: dec!(8500),
        stock: 15,
        category: 0,
    },
];

// (name, unit, initial, minimum, purchase price)
const DEMO_SUPPLIES: &[(&str, &str, Decimal, Decimal, Decimal)] = &[
    ("Harina", "kg", dec!(50), dec!(10), dec!(3200)),
    ("Azúcar", "kg", dec!(20), dec!(5), dec!(4100)),
    ("Mantequilla", "kg", dec!(8), dec!(3), dec!(18000)),
    ("Huevos", "unidad", dec!(120), dec!(30), dec!(600)),
    ("Levadura", "kg", dec!(2), dec!(1), dec!(15000)),
];

async fn seed(context: &CliContext) -> Result<()> {
    let catalog = context.catalog();
    let existing = catalog
        .count_products(&ProductFilter::new(ActiveFilter::All))
        .await?;
    if existing > 0 {
        println!("Catalog already has {} products; nothing to seed", existing);
        return Ok(());
    }

    info!("Seeding demo catalog");
    let mut category_ids = Vec::with_capacity(DEMO_CATEGORIES.len());
    for (name, description) in DEMO_CATEGORIES {
        let category = catalog
            .create_category(CreateCategoryInput {
                name: name.to_string(),
                description: Some(description.to_string()),
            })
            .await
            .with_context(|| format!("failed to create category {}", name))?;
        category_ids.push(category.id);
    }

    for product in DEMO_PRODUCTS {
        catalog
            .create_product(CreateProductInput {
                name: product.name.to_string(),
                description: Some(product.description.to_string()),
                price: product.price,
                stock: product.stock,
                category_id: category_ids.get(product.category).copied(),
                image_url: None,
            })
            .await
            .with_context(|| format!("failed to create product {}", product.name))?;
    }

    // Seeded balances are attributed to the nil user
    let inventory = context.inventory();
    for (name, unit, initial, minimum, price) in DEMO_SUPPLIES {
        inventory
            .create_supply_item(
                CreateSupplyItemInput {
                    name: name.to_string(),
                    description: None,
                    initial_quantity: *initial,
                    minimum_quantity: *minimum,
                    unit: unit.to_string(),
                    purchase_price: Some(*price),
                    supplier: None,
                },
                Uuid::nil(),
            )
            .await
            .with_context(|| format!("failed to create supply item {}", name))?;
    }

    println!(
        "Seeded {} categories, {} products and {} supply items",
        DEMO_CATEGORIES.len(),
        DEMO_PRODUCTS.len(),
        DEMO_SUPPLIES.len()
    );
    Ok(())
}

async fn low_stock(context: &CliContext, json: bool) -> Result<()> {
    let lines = context.reports().low_stock_report().await?;
    if json {
        return print_json(&lines);
    }
    if lines.is_empty() {
        println!("No supplies below their minimum");
        return Ok(());
    }
    println!("{:<24} {:>10} {:>10} {:>10}", "Supply", "Current", "Minimum", "Missing");
    for line in lines {
        println!(
            "{:<24} {:>10} {:>10} {:>10} {}",
            line.name, line.current_quantity, line.minimum_quantity, line.shortfall, line.unit
        );
    }
    Ok(())
}

async fn stats(context: &CliContext, json: bool) -> Result<()> {
    let stats = context.reports().sales_stats(Utc::now()).await?;
    if json {
        return print_json(&stats);
    }
    println!(
        "Today:      {} orders, {}",
        stats.orders_today,
        format_cop(stats.sales_today)
    );
    println!(
        "This month: {} orders, {}",
        stats.orders_this_month,
        format_cop(stats.sales_this_month)
    );
    for (status, count) in &stats.orders_by_status {
        println!("  {:<12} {}", status, count);
    }
    Ok(())
}

async fn best_sellers(
    context: &CliContext,
    year: i32,
    month: u32,
    limit: usize,
    json: bool,
) -> Result<()> {
    let ranked = context.reports().best_sellers(year, month, limit).await?;
    if json {
        return print_json(&ranked);
    }
    println!("Best sellers {}-{:02}", year, month);
    for (position, seller) in ranked.iter().enumerate() {
        println!(
            "{:>2}. {:<24} {:>5} units {:>14}",
            position + 1,
            seller.product_name,
            seller.units,
            format_cop(seller.revenue)
        );
    }
    Ok(())
}

async fn customers(context: &CliContext, limit: usize, json: bool) -> Result<()> {
    let ranked = context.reports().customer_ranking(limit).await?;
    if json {
        return print_json(&ranked);
    }
    if ranked.is_empty() {
        println!("No orders yet");
        return Ok(());
    }
    for (position, customer) in ranked.iter().enumerate() {
        let last = customer
            .last_order_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{:>2}. {} {:>4} orders {:>14} avg {:>12} last {}",
            position + 1,
            customer.user_id,
            customer.orders,
            format_cop(customer.total_spent),
            format_cop(customer.average_order),
            last
        );
    }
    Ok(())
}

async fn receipt(context: &CliContext, order_id: Uuid, json: bool) -> Result<()> {
    let receipt = context
        .reports()
        .order_receipt(order_id)
        .await
        .with_context(|| format!("failed to build receipt for {}", order_id))?;
    if json {
        return print_json(&receipt);
    }

    println!("{}  ({})", receipt.order_number, receipt.status);
    println!(
        "Entrega: {} {} - {}",
        receipt.delivery_date, receipt.delivery_time, receipt.delivery_address
    );
    for line in &receipt.lines {
        println!(
            "{:>3} x {:<24} {:>12} {:>12}",
            line.quantity, line.product_name, line.unit_price_display, line.subtotal_display
        );
    }
    println!("Total: {}", receipt.total_display);
    if !receipt.matches_stored_total {
        println!("warning: line totals differ from the stored order total");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
