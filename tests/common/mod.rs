#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use bakery_api::{
    config::AppConfig,
    db,
    entities::{product, supply_item},
    events::{self, EventSender},
    services::{
        cart::{Cart, HybridCartStore},
        catalog::{ActiveFilter, CreateProductInput},
        inventory::CreateSupplyItemInput,
        orders::DeliveryInfo,
    },
    AppState,
};
use chrono::{NaiveDate, NaiveTime};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Application state and router backed by a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

/// Identity headers a request is sent with
#[derive(Clone, Debug, Default)]
pub struct Identity {
    pub user_id: Option<Uuid>,
    pub role: Option<&'static str>,
    pub session_id: Option<String>,
}

impl Identity {
    pub fn anonymous(session_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            ..Default::default()
        }
    }

    pub fn as_role(role: &'static str) -> Self {
        Self {
            user_id: Some(Uuid::new_v4()),
            role: Some(role),
            session_id: None,
        }
    }

    pub fn customer(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            role: Some("cliente"),
            session_id: None,
        }
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = test_config("sqlite::memory:");
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        Self::with_config(cfg).await
    }

    /// SQLite file shared by several pooled connections, for tests that
    /// need writers racing each other
    pub async fn on_file(path: &Path) -> Self {
        let mut cfg = test_config(&format!("sqlite://{}?mode=rwc", path.display()));
        cfg.db_max_connections = 4;
        cfg.db_min_connections = 1;
        Self::with_config(cfg).await
    }

    async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::connect(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let cart_store = Arc::new(HybridCartStore::new(db_arc.clone()));
        let state = AppState::new(db_arc, cfg, event_sender, cart_store);
        let router = bakery_api::build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: None,
                price,
                stock,
                category_id: None,
                image_url: None,
            })
            .await
            .expect("seed product for tests")
    }

    pub async fn seed_supply(
        &self,
        name: &str,
        initial: Decimal,
        minimum: Decimal,
    ) -> supply_item::Model {
        self.state
            .services
            .inventory
            .create_supply_item(
                CreateSupplyItemInput {
                    name: name.to_string(),
                    description: None,
                    initial_quantity: initial,
                    minimum_quantity: minimum,
                    unit: "kg".to_string(),
                    purchase_price: None,
                    supplier: None,
                },
                Uuid::new_v4(),
            )
            .await
            .expect("seed supply item for tests")
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        self.state
            .services
            .catalog
            .require_product(product_id, ActiveFilter::All)
            .await
            .expect("product exists")
            .stock
    }

    /// Fills a cart through the service so quantities are clamped the same
    /// way a shopper's would be.
    pub async fn cart_with(&self, lines: &[(Uuid, i64)]) -> Cart {
        let mut cart = Cart::new();
        for (product_id, quantity) in lines {
            self.state
                .services
                .cart
                .add_item(&mut cart, *product_id, *quantity)
                .await
                .expect("add item to cart");
        }
        cart
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        identity: &Identity,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(user_id) = identity.user_id {
            builder = builder.header("x-user-id", user_id.to_string());
        }
        if let Some(role) = identity.role {
            builder = builder.header("x-user-role", role);
        }
        if let Some(session_id) = &identity.session_id {
            builder = builder.header("x-session-id", session_id.as_str());
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

fn test_config(database_url: &str) -> AppConfig {
    AppConfig::new(
        database_url.to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    )
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body is json")
}

pub fn delivery() -> DeliveryInfo {
    DeliveryInfo {
        delivery_address: "Calle 10 # 43-12, Medellín".to_string(),
        contact_phone: "3001234567".to_string(),
        delivery_date: NaiveDate::from_ymd_opt(2026, 11, 2).expect("valid date"),
        delivery_time: NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
        payment_method: Default::default(),
        payment_proof: None,
        notes: None,
    }
}
