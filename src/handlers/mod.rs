pub mod auth;
pub mod cart;
pub mod catalog;
pub mod common;
pub mod health;
pub mod inventory;
pub mod orders;
pub mod reports;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    cart::{CartService, CartStore},
    catalog::CatalogService,
    inventory::InventoryService,
    orders::OrderService,
    reports::ReportService,
};
use std::sync::Arc;

/// Services layer used by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub inventory: Arc<InventoryService>,
    pub reports: Arc<ReportService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        cart_store: Arc<dyn CartStore>,
        currency: &str,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone(), event_sender.clone())),
            cart: Arc::new(CartService::new(
                db_pool.clone(),
                cart_store,
                event_sender.clone(),
            )),
            orders: Arc::new(OrderService::new(db_pool.clone(), event_sender.clone())),
            inventory: Arc::new(InventoryService::new(db_pool.clone(), event_sender)),
            reports: Arc::new(ReportService::new(db_pool, currency)),
        }
    }
}
