use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "orders")]
#[schema(as = Order)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    /// Sum of line subtotals, computed from the frozen line prices
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_proof: Option<String>,
    pub delivery_address: String,
    pub contact_phone: String,
    pub delivery_date: NaiveDate,
    pub delivery_time: NaiveTime,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_line::Entity")]
    OrderLines,
}

impl Related<super::order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Human-facing order number. Carries the whole id so it is as unique as
/// the primary key.
pub fn order_number_for(id: Uuid) -> String {
    format!("ORD-{}", id.simple().to_string().to_uppercase())
}

/// Order lifecycle.
///
/// `Pending -> Preparing -> Ready -> Delivered`, with `Cancelled` reachable
/// from any non-terminal state.
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    #[serde(alias = "pendiente")]
    #[strum(to_string = "pending", serialize = "pendiente")]
    Pending,
    #[sea_orm(string_value = "preparing")]
    #[serde(alias = "preparando")]
    #[strum(to_string = "preparing", serialize = "preparando")]
    Preparing,
    #[sea_orm(string_value = "ready")]
    #[serde(alias = "listo")]
    #[strum(to_string = "ready", serialize = "listo")]
    Ready,
    #[sea_orm(string_value = "delivered")]
    #[serde(alias = "entregado")]
    #[strum(to_string = "delivered", serialize = "entregado")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    #[serde(alias = "cancelado")]
    #[strum(to_string = "cancelled", serialize = "cancelado")]
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether `self -> next` is an allowed move. Re-applying the current
    /// status is allowed and treated as a no-op by callers.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if self == next {
            return true;
        }

        match (self, next) {
            (Pending, Preparing) | (Preparing, Ready) | (Ready, Delivered) => true,
            (Pending | Preparing | Ready, Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentMethod {
    #[default]
    #[sea_orm(string_value = "cash")]
    #[serde(alias = "efectivo")]
    #[strum(to_string = "cash", serialize = "efectivo")]
    Cash,
    #[sea_orm(string_value = "nequi")]
    Nequi,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn forward_chain_is_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Preparing));
        assert!(OrderStatus::Preparing.can_transition_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn skips_and_backward_moves_are_rejected() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn terminal_states_stay_put() {
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
        assert!(OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn cancel_from_open_states() {
        for status in [OrderStatus::Pending, OrderStatus::Preparing, OrderStatus::Ready] {
            assert!(status.can_transition_to(OrderStatus::Cancelled));
        }
    }

    #[test]
    fn parses_spanish_labels() {
        assert_eq!(OrderStatus::from_str("preparando").unwrap(), OrderStatus::Preparing);
        assert_eq!(OrderStatus::from_str("LISTO").unwrap(), OrderStatus::Ready);
        assert_eq!(PaymentMethod::from_str("efectivo").unwrap(), PaymentMethod::Cash);
        assert!(OrderStatus::from_str("shipped").is_err());
    }

    #[test]
    fn order_number_carries_the_full_id() {
        let id = Uuid::parse_str("3f2a9c10-0000-4000-8000-00000000beef").unwrap();
        assert_eq!(order_number_for(id), "ORD-3F2A9C1000004000800000000000BEEF");

        let other = Uuid::parse_str("3f2a9c10-ffff-4000-8000-000000000001").unwrap();
        assert_ne!(order_number_for(id), order_number_for(other));
    }
}
