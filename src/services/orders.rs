use crate::{
    db::{self, DbPool},
    entities::{
        cart_item,
        order::{self, PaymentMethod},
        order_line, product, DecimalColumn, OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::cart::Cart,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Delivery metadata collected at checkout
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct DeliveryInfo {
    #[validate(length(min = 5, max = 300, message = "Delivery address is required"))]
    pub delivery_address: String,
    #[validate(length(min = 7, max = 20, message = "Contact phone is required"))]
    pub contact_phone: String,
    pub delivery_date: NaiveDate,
    pub delivery_time: NaiveTime,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[validate(length(max = 500))]
    pub payment_proof: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// An order together with its frozen lines
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderWithLines {
    pub order: order::Model,
    pub lines: Vec<order_line::Model>,
}

impl OrderWithLines {
    /// Sum of the lines at the prices they were sold at
    pub fn lines_total(&self) -> Decimal {
        self.lines
            .iter()
            .fold(Decimal::ZERO, |acc, line| acc.saturating_add(line.subtotal()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl OrderFilter {
    fn query(&self) -> Select<order::Entity> {
        let mut query = order::Entity::find();
        if let Some(status) = self.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(user_id) = self.user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        if let Some(method) = self.payment_method {
            query = query.filter(order::Column::PaymentMethod.eq(method));
        }
        query
    }
}

/// Turns carts into orders and drives them through their lifecycle
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Places an order for everything in `cart`.
    ///
    /// Prices are read once inside the transaction and copied onto the
    /// lines. Stock is decremented with a conditional update so concurrent
    /// checkouts of the same product cannot oversell. Nothing is written if
    /// any line fails. The user's stored cart rows are deleted in the same
    /// transaction, and `cart` is emptied only after the commit.
    #[instrument(skip(self, cart, delivery), fields(user_id = %user_id, lines = cart.len()))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        cart: &mut Cart,
        delivery: DeliveryInfo,
    ) -> Result<Uuid, ServiceError> {
        if cart.is_empty() {
            counter!("bakery_orders.failed", 1, "reason" => "empty_cart");
            return Err(ServiceError::EmptyCart);
        }
        delivery.validate()?;

        let started = Instant::now();
        let txn = self.db_pool.begin().await?;

        match self.write_order(&txn, user_id, cart, delivery).await {
            Ok(placed) => {
                txn.commit().await.map_err(|e| {
                    error!(error = %e, order_id = %placed.order_id, "Failed to commit order");
                    db::record_transaction("place_order", started, false);
                    ServiceError::DatabaseError(e)
                })?;
                db::record_transaction("place_order", started, true);

                cart.clear();
                counter!("bakery_orders.placed", 1);
                info!(order_id = %placed.order_id, total = %placed.total, "Order placed");

                self.event_sender
                    .send_or_log(Event::OrderPlaced {
                        order_id: placed.order_id,
                        user_id,
                        total: placed.total,
                        line_count: placed.line_count,
                    })
                    .await;

                Ok(placed.order_id)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    error!(error = %rollback, "Failed to roll back order transaction");
                }
                db::record_transaction("place_order", started, false);
                counter!("bakery_orders.failed", 1, "reason" => e.kind());
                warn!(error = %e, "Order rejected");
                Err(e)
            }
        }
    }

    async fn write_order(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        cart: &Cart,
        delivery: DeliveryInfo,
    ) -> Result<PlacedOrder, ServiceError> {
        let ids: Vec<Uuid> = cart.lines().map(|(id, _)| id).collect();

        let mut query = product::Entity::find().filter(product::Column::Id.is_in(ids));
        if db::supports_row_locks(&self.db_pool) {
            query = query.lock_exclusive();
        }
        let products: HashMap<Uuid, product::Model> = query
            .all(txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut priced = Vec::with_capacity(cart.len());
        for (product_id, quantity) in cart.lines() {
            let product = products
                .get(&product_id)
                .filter(|p| p.active)
                .ok_or(ServiceError::ProductNotFound(product_id))?;

            let units = i32::try_from(quantity)
                .ok()
                .filter(|q| *q > 0)
                .ok_or_else(|| {
                    ServiceError::InvalidQuantity(format!(
                        "Quantity {} for product {} is out of range",
                        quantity, product_id
                    ))
                })?;

            if units > product.stock {
                return Err(ServiceError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: product.stock,
                });
            }

            priced.push((product, units));
        }

        let total = priced
            .iter()
            .try_fold(Decimal::ZERO, |acc, (p, units)| {
                order_line::checked_subtotal(p.price, i64::from(*units))
                    .and_then(|subtotal| acc.checked_add(subtotal))
            })
            .filter(|total| DecimalColumn::TOTAL.holds(*total))
            .ok_or_else(|| {
                ServiceError::ValidationError("Order total is out of range".to_string())
            })?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order::order_number_for(order_id)),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            total: Set(total),
            payment_method: Set(delivery.payment_method),
            payment_proof: Set(delivery.payment_proof),
            delivery_address: Set(delivery.delivery_address),
            contact_phone: Set(delivery.contact_phone),
            delivery_date: Set(delivery.delivery_date),
            delivery_time: Set(delivery.delivery_time),
            notes: Set(delivery.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        for (product, units) in &priced {
            order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                quantity: Set(*units),
                unit_price: Set(product.price),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;

            let result = product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(*units),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(product.id))
                .filter(product::Column::Stock.gte(*units))
                .exec(txn)
                .await?;

            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock {
                    product_id: product.id,
                    requested: units.unsigned_abs(),
                    available: product.stock,
                });
            }
        }

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(txn)
            .await?;

        Ok(PlacedOrder {
            order_id,
            total,
            line_count: priced.len(),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithLines, ServiceError> {
        let db = &*self.db_pool;
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .order_by_asc(order_line::Column::ProductName)
            .all(db)
            .await?;

        Ok(OrderWithLines { order, lines })
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<order::Model>, ServiceError> {
        let mut query = filter.query().order_by_desc(order::Column::CreatedAt);
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = filter.offset {
            query = query.offset(offset);
        }
        Ok(query.all(&*self.db_pool).await?)
    }

    pub async fn count_orders(&self, filter: &OrderFilter) -> Result<u64, ServiceError> {
        Ok(filter.query().count(&*self.db_pool).await?)
    }

    /// Moves an order along its lifecycle. Re-applying the current status
    /// changes nothing.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let started = Instant::now();
        let txn = self.db_pool.begin().await?;

        let mut query = order::Entity::find_by_id(order_id);
        if db::supports_row_locks(&self.db_pool) {
            query = query.lock_exclusive();
        }
        let existing = match query.one(&txn).await? {
            Some(order) => order,
            None => {
                db::record_transaction("update_order_status", started, false);
                return Err(ServiceError::OrderNotFound(order_id));
            }
        };

        let old_status = existing.status;
        if old_status == new_status {
            txn.commit().await?;
            db::record_transaction("update_order_status", started, true);
            return Ok(existing);
        }

        if !old_status.can_transition_to(new_status) {
            db::record_transaction("update_order_status", started, false);
            return Err(ServiceError::InvalidStatusTransition {
                from: old_status,
                to: new_status,
            });
        }

        let mut model: order::ActiveModel = existing.into();
        model.status = Set(new_status);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&txn).await?;

        txn.commit().await?;
        db::record_transaction("update_order_status", started, true);

        counter!("bakery_orders.status_changed", 1, "status" => new_status.to_string());
        info!(%order_id, %old_status, %new_status, "Order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        Ok(updated)
    }

    /// Cancels an open order. Stock is not returned to the shelf.
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.update_order_status(order_id, OrderStatus::Cancelled)
            .await
    }

    /// Stores a reference to the customer's transfer receipt
    #[instrument(skip(self, proof))]
    pub async fn attach_payment_proof(
        &self,
        order_id: Uuid,
        proof: String,
    ) -> Result<order::Model, ServiceError> {
        let proof = proof.trim().to_string();
        if proof.is_empty() {
            return Err(ServiceError::ValidationError(
                "Payment proof reference cannot be empty".to_string(),
            ));
        }

        let existing = order::Entity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        if existing.status == OrderStatus::Cancelled {
            return Err(ServiceError::ValidationError(format!(
                "Order {} is cancelled",
                existing.order_number
            )));
        }

        let mut model: order::ActiveModel = existing.into();
        model.payment_proof = Set(Some(proof));
        model.updated_at = Set(Utc::now());
        Ok(model.update(&*self.db_pool).await?)
    }
}

struct PlacedOrder {
    order_id: Uuid,
    total: Decimal,
    line_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> DeliveryInfo {
        DeliveryInfo {
            delivery_address: "Calle 10 # 4-21, Popayán".into(),
            contact_phone: "3001234567".into(),
            delivery_date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            delivery_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            payment_method: PaymentMethod::Cash,
            payment_proof: None,
            notes: None,
        }
    }

    #[test]
    fn delivery_requires_address_and_phone() {
        assert!(delivery().validate().is_ok());

        let mut missing_address = delivery();
        missing_address.delivery_address = String::new();
        assert!(missing_address.validate().is_err());

        let mut missing_phone = delivery();
        missing_phone.contact_phone = "12".into();
        assert!(missing_phone.validate().is_err());
    }

    #[test]
    fn payment_method_defaults_to_cash() {
        let json = serde_json::json!({
            "delivery_address": "Carrera 5 # 12-30",
            "contact_phone": "3109876543",
            "delivery_date": "2024-03-02",
            "delivery_time": "16:00:00"
        });
        let parsed: DeliveryInfo = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.payment_method, PaymentMethod::Cash);
    }
}
