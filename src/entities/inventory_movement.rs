use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Append-only ledger row for a supply item
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "inventory_movements")]
#[schema(as = InventoryMovement)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub supply_item_id: Uuid,
    pub direction: MovementDirection,
    #[sea_orm(column_type = "Decimal(Some((12, 3)))")]
    pub quantity: Decimal,
    /// Quantity on hand right after this movement was applied
    #[sea_orm(column_type = "Decimal(Some((12, 3)))")]
    pub resulting_quantity: Decimal,
    pub reason: String,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::supply_item::Entity",
        from = "Column::SupplyItemId",
        to = "super::supply_item::Column::Id"
    )]
    SupplyItem,
}

impl Related<super::supply_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SupplyItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MovementDirection {
    /// Stock coming in
    #[sea_orm(string_value = "entrada")]
    Entrada,
    /// Stock going out
    #[sea_orm(string_value = "salida")]
    Salida,
}

impl MovementDirection {
    /// Quantity after applying a movement of `quantity` to `current`, or
    /// `None` if the sum overflows. Outgoing movements never take the
    /// balance below zero.
    pub fn apply(self, current: Decimal, quantity: Decimal) -> Option<Decimal> {
        match self {
            MovementDirection::Entrada => current.checked_add(quantity),
            MovementDirection::Salida => current
                .checked_sub(quantity)
                .map(|left| left.max(Decimal::ZERO)),
        }
    }
}
