use crate::{
    db::{self, DbPool},
    entities::{inventory_movement, supply_item, DecimalColumn, MovementDirection},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

const DEFAULT_UNIT: &str = "kg";
const OPENING_BALANCE_REASON: &str = "inventario inicial";

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Value cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_quantity(value: &Decimal) -> Result<(), ValidationError> {
    validate_non_negative(value)?;
    if !DecimalColumn::QUANTITY.holds(*value) {
        let mut err = ValidationError::new("quantity");
        err.message = Some("Quantity allows at most 3 decimals and 9 integer digits".into());
        return Err(err);
    }
    Ok(())
}

fn validate_purchase_price(value: &Decimal) -> Result<(), ValidationError> {
    validate_non_negative(value)?;
    if !DecimalColumn::PRICE.holds(*value) {
        let mut err = ValidationError::new("purchase_price");
        err.message = Some("Price allows at most 2 decimals and 10 integer digits".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateSupplyItemInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    /// Opening balance, booked as an `entrada` movement
    #[serde(default)]
    #[validate(custom = "validate_quantity")]
    pub initial_quantity: Decimal,
    #[validate(custom = "validate_quantity")]
    pub minimum_quantity: Decimal,
    #[serde(default = "default_unit")]
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
    #[validate(custom = "validate_purchase_price")]
    pub purchase_price: Option<Decimal>,
    pub supplier: Option<String>,
}

/// Everything about a supply item except its quantity
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateSupplyItemInput {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_quantity")]
    pub minimum_quantity: Option<Decimal>,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
    #[validate(custom = "validate_purchase_price")]
    pub purchase_price: Option<Decimal>,
    pub supplier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordMovementInput {
    pub supply_item_id: Uuid,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub reason: String,
    pub actor_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub supply_item_id: Option<Uuid>,
    pub direction: Option<MovementDirection>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

/// Totals for one direction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DirectionTotals {
    pub movements: u64,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MovementSummary {
    pub entrada: DirectionTotals,
    pub salida: DirectionTotals,
}

impl MovementSummary {
    fn add(&mut self, movement: &inventory_movement::Model) {
        let bucket = match movement.direction {
            MovementDirection::Entrada => &mut self.entrada,
            MovementDirection::Salida => &mut self.salida,
        };
        bucket.movements += 1;
        bucket.quantity += movement.quantity;
    }
}

/// Supply items and the movement ledger behind their quantities
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a supply item. A non-zero opening balance is booked as the
    /// item's first movement so the ledger stays complete.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_supply_item(
        &self,
        input: CreateSupplyItemInput,
        actor_id: Uuid,
    ) -> Result<supply_item::Model, ServiceError> {
        input.validate()?;

        let started = Instant::now();
        let txn = self.db_pool.begin().await?;
        let now = Utc::now();

        let item = supply_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            current_quantity: Set(Decimal::ZERO),
            minimum_quantity: Set(input.minimum_quantity),
            unit: Set(input.unit),
            purchase_price: Set(input.purchase_price),
            supplier: Set(input.supplier),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let item = if input.initial_quantity > Decimal::ZERO {
            let (_, item) = apply_movement(
                &txn,
                item,
                MovementDirection::Entrada,
                input.initial_quantity,
                OPENING_BALANCE_REASON.to_string(),
                actor_id,
            )
            .await?;
            item
        } else {
            item
        };

        txn.commit().await?;
        db::record_transaction("create_supply_item", started, true);

        info!(supply_item_id = %item.id, quantity = %item.current_quantity, "Supply item created");
        Ok(item)
    }

    #[instrument(skip(self, input))]
    pub async fn update_supply_item(
        &self,
        id: Uuid,
        input: UpdateSupplyItemInput,
    ) -> Result<supply_item::Model, ServiceError> {
        input.validate()?;

        let existing = self.get_supply_item(id).await?;
        let mut model: supply_item::ActiveModel = existing.into();

        if let Some(name) = input.name {
            model.name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            model.description = Set(Some(description));
        }
        if let Some(minimum) = input.minimum_quantity {
            model.minimum_quantity = Set(minimum);
        }
        if let Some(unit) = input.unit {
            model.unit = Set(unit);
        }
        if let Some(price) = input.purchase_price {
            model.purchase_price = Set(Some(price));
        }
        if let Some(supplier) = input.supplier {
            model.supplier = Set(Some(supplier));
        }

        Ok(model.update(&*self.db_pool).await?)
    }

    pub async fn get_supply_item(&self, id: Uuid) -> Result<supply_item::Model, ServiceError> {
        supply_item::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or(ServiceError::SupplyItemNotFound(id))
    }

    /// All items ordered by name
    pub async fn list_supply_items(&self) -> Result<Vec<supply_item::Model>, ServiceError> {
        Ok(supply_item::Entity::find()
            .order_by_asc(supply_item::Column::Name)
            .all(&*self.db_pool)
            .await?)
    }

    /// Books a movement and applies it to the item's quantity in one
    /// transaction. An outgoing movement larger than what is on hand leaves
    /// the item at zero.
    #[instrument(skip(self, input), fields(supply_item_id = %input.supply_item_id, direction = %input.direction))]
    pub async fn record_movement(
        &self,
        input: RecordMovementInput,
    ) -> Result<inventory_movement::Model, ServiceError> {
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidMovement(format!(
                "Quantity must be greater than zero, got {}",
                input.quantity
            )));
        }
        if !DecimalColumn::QUANTITY.holds(input.quantity) {
            return Err(ServiceError::InvalidMovement(format!(
                "Quantity {} needs more than 3 decimals or 9 integer digits",
                input.quantity
            )));
        }
        let reason = input.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::InvalidMovement(
                "A reason is required".to_string(),
            ));
        }

        let started = Instant::now();
        let txn = self.db_pool.begin().await?;

        let mut query = supply_item::Entity::find_by_id(input.supply_item_id);
        if db::supports_row_locks(&self.db_pool) {
            query = query.lock_exclusive();
        }
        let Some(item) = query.one(&txn).await? else {
            db::record_transaction("record_movement", started, false);
            return Err(ServiceError::SupplyItemNotFound(input.supply_item_id));
        };

        let previous = item.current_quantity;
        let (movement, item) = match apply_movement(
            &txn,
            item,
            input.direction,
            input.quantity,
            reason,
            input.actor_id,
        )
        .await
        {
            Ok(applied) => applied,
            Err(e) => {
                db::record_transaction("record_movement", started, false);
                return Err(e);
            }
        };

        txn.commit().await?;
        db::record_transaction("record_movement", started, true);

        counter!("bakery_inventory.movements", 1, "direction" => movement.direction.to_string());
        if input.direction == MovementDirection::Salida && input.quantity > previous {
            warn!(
                supply_item_id = %item.id,
                %previous,
                requested = %input.quantity,
                "Outgoing movement exceeded stock on hand; quantity floored at zero"
            );
        }

        self.event_sender
            .send_or_log(Event::MovementRecorded {
                movement_id: movement.id,
                supply_item_id: item.id,
                direction: movement.direction,
                quantity: movement.quantity,
                resulting_quantity: movement.resulting_quantity,
            })
            .await;

        if item.is_low_stock() {
            self.event_sender
                .send_or_log(Event::LowStockDetected {
                    supply_item_id: item.id,
                    current_quantity: item.current_quantity,
                    minimum_quantity: item.minimum_quantity,
                })
                .await;
        }

        Ok(movement)
    }

    /// Whether the item is at or below its minimum
    pub async fn is_low_stock(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.get_supply_item(id).await?.is_low_stock())
    }

    /// Items at or below their minimum, ordered by name
    #[instrument(skip(self))]
    pub async fn list_low_stock(&self) -> Result<Vec<supply_item::Model>, ServiceError> {
        Ok(supply_item::Entity::find()
            .filter(
                Expr::col(supply_item::Column::CurrentQuantity)
                    .lte(Expr::col(supply_item::Column::MinimumQuantity)),
            )
            .order_by_asc(supply_item::Column::Name)
            .all(&*self.db_pool)
            .await?)
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> Result<Vec<inventory_movement::Model>, ServiceError> {
        let mut query = inventory_movement::Entity::find();
        if let Some(item_id) = filter.supply_item_id {
            query = query.filter(inventory_movement::Column::SupplyItemId.eq(item_id));
        }
        if let Some(direction) = filter.direction {
            query = query.filter(inventory_movement::Column::Direction.eq(direction));
        }
        if let Some(since) = filter.since {
            query = query.filter(inventory_movement::Column::CreatedAt.gte(since));
        }
        if let Some(until) = filter.until {
            query = query.filter(inventory_movement::Column::CreatedAt.lt(until));
        }
        query = query.order_by_desc(inventory_movement::Column::CreatedAt);
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        Ok(query.all(&*self.db_pool).await?)
    }

    /// Movement counts and quantities per direction over an optional range
    pub async fn movement_summary(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<MovementSummary, ServiceError> {
        let movements = self
            .list_movements(&MovementFilter {
                since,
                until,
                ..Default::default()
            })
            .await?;

        let mut summary = MovementSummary::default();
        for movement in &movements {
            summary.add(movement);
        }
        Ok(summary)
    }
}

/// Inserts the movement row and writes the item's new quantity. The caller
/// owns the transaction.
async fn apply_movement<C>(
    conn: &C,
    item: supply_item::Model,
    direction: MovementDirection,
    quantity: Decimal,
    reason: String,
    actor_id: Uuid,
) -> Result<(inventory_movement::Model, supply_item::Model), ServiceError>
where
    C: ConnectionTrait,
{
    let resulting = direction
        .apply(item.current_quantity, quantity)
        .filter(|balance| DecimalColumn::QUANTITY.holds(*balance))
        .ok_or_else(|| {
            ServiceError::InvalidMovement(format!(
                "Balance of {} cannot absorb {} {}",
                item.name, direction, quantity
            ))
        })?;

    let movement = inventory_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        supply_item_id: Set(item.id),
        direction: Set(direction),
        quantity: Set(quantity),
        resulting_quantity: Set(resulting),
        reason: Set(reason),
        actor_id: Set(actor_id),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    let mut model: supply_item::ActiveModel = item.into();
    model.current_quantity = Set(resulting);
    model.updated_at = Set(Utc::now());
    let item = model.update(conn).await?;

    Ok((movement, item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn movement(direction: MovementDirection, quantity: Decimal) -> inventory_movement::Model {
        inventory_movement::Model {
            id: Uuid::new_v4(),
            supply_item_id: Uuid::nil(),
            direction,
            quantity,
            resulting_quantity: Decimal::ZERO,
            reason: "test".into(),
            actor_id: Uuid::nil(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn summary_buckets_by_direction() {
        let mut summary = MovementSummary::default();
        summary.add(&movement(MovementDirection::Entrada, dec!(25)));
        summary.add(&movement(MovementDirection::Entrada, dec!(5)));
        summary.add(&movement(MovementDirection::Salida, dec!(12.5)));

        assert_eq!(summary.entrada.movements, 2);
        assert_eq!(summary.entrada.quantity, dec!(30));
        assert_eq!(summary.salida.movements, 1);
        assert_eq!(summary.salida.quantity, dec!(12.5));
    }

    #[test]
    fn negative_values_are_rejected() {
        assert!(validate_non_negative(&dec!(-1)).is_err());
        assert!(validate_non_negative(&dec!(0)).is_ok());
        assert!(validate_non_negative(&dec!(3.5)).is_ok());
    }

    #[test]
    fn quantities_must_fit_the_ledger_columns() {
        assert!(validate_quantity(&dec!(12.125)).is_ok());
        assert!(validate_quantity(&dec!(0.0001)).is_err());
        assert!(validate_quantity(&Decimal::MAX).is_err());
        assert!(validate_purchase_price(&dec!(4200.50)).is_ok());
        assert!(validate_purchase_price(&dec!(4200.505)).is_err());
    }
}
