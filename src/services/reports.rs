use crate::{
    db::DbPool,
    entities::{order, order_line, supply_item, OrderStatus},
    errors::ServiceError,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Formats a peso amount the way receipts print it: `$32.000`.
///
/// Amounts are rounded to whole pesos and grouped with `.`.
pub fn format_cop(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// `$32.000 COP`
pub fn format_with_currency(amount: Decimal, currency: &str) -> String {
    format!("{} {}", format_cop(amount), currency)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReceiptLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub unit_price_display: String,
    pub subtotal_display: String,
}

/// Printable order summary built only from the frozen line prices
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderReceipt {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub delivery_address: String,
    pub delivery_date: NaiveDate,
    pub delivery_time: NaiveTime,
    pub lines: Vec<ReceiptLine>,
    pub total: Decimal,
    pub total_display: String,
    /// Whether the recomputed total agrees with the one stored on the order
    pub matches_stored_total: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SalesStats {
    pub orders_today: u64,
    pub sales_today: Decimal,
    pub orders_this_month: u64,
    pub sales_this_month: Decimal,
    /// Every order ever placed, keyed by status
    pub orders_by_status: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailySales {
    pub date: NaiveDate,
    pub orders: u64,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BestSeller {
    pub product_id: Uuid,
    pub product_name: String,
    pub units: i64,
    pub revenue: Decimal,
}

/// What a customer has bought so far. Cancelled orders do not count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CustomerStats {
    pub user_id: Uuid,
    pub orders: u64,
    pub total_spent: Decimal,
    pub last_order_at: Option<DateTime<Utc>>,
    /// Rounded to cents
    pub average_order: Decimal,
}

impl CustomerStats {
    fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            orders: 0,
            total_spent: Decimal::ZERO,
            last_order_at: None,
            average_order: Decimal::ZERO,
        }
    }

    fn add(&mut self, order: &order::Model) {
        self.orders += 1;
        self.total_spent = self.total_spent.saturating_add(order.total);
        if self.last_order_at.map_or(true, |last| order.created_at > last) {
            self.last_order_at = Some(order.created_at);
        }
    }

    fn finish(mut self) -> Self {
        if self.orders > 0 {
            self.average_order = (self.total_spent / Decimal::from(self.orders))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LowStockLine {
    pub supply_item_id: Uuid,
    pub name: String,
    pub unit: String,
    pub current_quantity: Decimal,
    pub minimum_quantity: Decimal,
    pub shortfall: Decimal,
}

/// First instant of the month and first instant of the next one
fn month_bounds(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
    let invalid = || ServiceError::ValidationError(format!("Invalid month {}-{:02}", year, month));

    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1).ok_or_else(invalid)?;

    let midnight = |d: NaiveDate| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN));
    Ok((midnight(start), midnight(end)))
}

/// Read-only aggregations over orders and inventory
#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
    currency: String,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>, currency: impl Into<String>) -> Self {
        Self {
            db_pool,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Rebuilds an order's totals from its lines. Catalog prices are never
    /// consulted.
    #[instrument(skip(self))]
    pub async fn order_receipt(&self, order_id: Uuid) -> Result<OrderReceipt, ServiceError> {
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

        let lines: Vec<ReceiptLine> = lines
            .into_iter()
            .map(|line| {
                let subtotal = line.subtotal();
                ReceiptLine {
                    product_id: line.product_id,
                    product_name: line.product_name,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    subtotal,
                    unit_price_display: format_cop(line.unit_price),
                    subtotal_display: format_cop(subtotal),
                }
            })
            .collect();

        let total: Decimal = lines.iter().map(|l| l.subtotal).sum();

        Ok(OrderReceipt {
            order_id,
            order_number: order.order_number,
            status: order.status,
            placed_at: order.created_at,
            delivery_address: order.delivery_address,
            delivery_date: order.delivery_date,
            delivery_time: order.delivery_time,
            total_display: format_with_currency(total, &self.currency),
            matches_stored_total: total == order.total,
            lines,
            total,
        })
    }

    /// Today's and this month's sales as of `now`. Cancelled orders are left
    /// out of the counts and totals.
    #[instrument(skip(self))]
    pub async fn sales_stats(&self, now: DateTime<Utc>) -> Result<SalesStats, ServiceError> {
        let (month_start, month_end) = month_bounds(now.year(), now.month())?;
        let day_start = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));

        let (month_orders, orders_by_status) = futures::try_join!(
            self.orders_between(month_start, month_end),
            self.orders_by_status(),
        )?;

        let mut stats = SalesStats {
            orders_today: 0,
            sales_today: Decimal::ZERO,
            orders_this_month: 0,
            sales_this_month: Decimal::ZERO,
            orders_by_status,
        };

        for order in month_orders
            .iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
        {
            stats.orders_this_month += 1;
            stats.sales_this_month += order.total;
            if order.created_at >= day_start {
                stats.orders_today += 1;
                stats.sales_today += order.total;
            }
        }

        Ok(stats)
    }

    /// Purchase history of one customer. A customer with no orders gets
    /// zeroes rather than an error.
    #[instrument(skip(self))]
    pub async fn customer_stats(&self, user_id: Uuid) -> Result<CustomerStats, ServiceError> {
        let mut stats = self.customer_totals(Some(user_id)).await?;
        Ok(stats.pop().unwrap_or_else(|| CustomerStats::empty(user_id)))
    }

    /// Every customer with at least one live order, biggest spenders first
    #[instrument(skip(self))]
    pub async fn customer_ranking(&self, limit: usize) -> Result<Vec<CustomerStats>, ServiceError> {
        let mut ranked = self.customer_totals(None).await?;
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn customer_totals(&self, user_id: Option<Uuid>) -> Result<Vec<CustomerStats>, ServiceError> {
        let mut query =
            order::Entity::find().filter(order::Column::Status.ne(OrderStatus::Cancelled));
        if let Some(user_id) = user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        let orders = query.all(&*self.db_pool).await?;

        let mut by_user: HashMap<Uuid, CustomerStats> = HashMap::new();
        for order in &orders {
            by_user
                .entry(order.user_id)
                .or_insert_with(|| CustomerStats::empty(order.user_id))
                .add(order);
        }

        let mut ranked: Vec<CustomerStats> = by_user
            .into_values()
            .map(CustomerStats::finish)
            .collect();
        ranked.sort_by(|a, b| {
            b.total_spent
                .cmp(&a.total_spent)
                .then_with(|| b.orders.cmp(&a.orders))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(ranked)
    }

    /// One entry per day of the month that had sales, oldest first
    #[instrument(skip(self))]
    pub async fn daily_sales(&self, year: i32, month: u32) -> Result<Vec<DailySales>, ServiceError> {
        let (start, end) = month_bounds(year, month)?;
        let orders = self.orders_between(start, end).await?;

        let mut days: BTreeMap<NaiveDate, DailySales> = BTreeMap::new();
        for order in orders
            .iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
        {
            let date = order.created_at.date_naive();
            let day = days.entry(date).or_insert(DailySales {
                date,
                orders: 0,
                total: Decimal::ZERO,
            });
            day.orders += 1;
            day.total += order.total;
        }

        Ok(days.into_values().collect())
    }

    /// Products ranked by units sold in the month, at their sold prices
    #[instrument(skip(self))]
    pub async fn best_sellers(
        &self,
        year: i32,
        month: u32,
        limit: usize,
    ) -> Result<Vec<BestSeller>, ServiceError> {
        let (start, end) = month_bounds(year, month)?;
        let order_ids: Vec<Uuid> = self
            .orders_between(start, end)
            .await?
            .into_iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .map(|o| o.id)
            .collect();

        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.is_in(order_ids))
            .all(&*self.db_pool)
            .await?;

        let mut by_product: HashMap<Uuid, BestSeller> = HashMap::new();
        for line in &lines {
            let entry = by_product.entry(line.product_id).or_insert_with(|| BestSeller {
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                units: 0,
                revenue: Decimal::ZERO,
            });
            entry.units += i64::from(line.quantity);
            entry.revenue = entry.revenue.saturating_add(line.subtotal());
        }

        let mut ranked: Vec<BestSeller> = by_product.into_values().collect();
        ranked.sort_by(|a, b| {
            b.units
                .cmp(&a.units)
                .then_with(|| b.revenue.cmp(&a.revenue))
                .then_with(|| a.product_name.cmp(&b.product_name))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Supply items at or below their minimum with how much is missing
    pub async fn low_stock_report(&self) -> Result<Vec<LowStockLine>, ServiceError> {
        let items = supply_item::Entity::find()
            .order_by_asc(supply_item::Column::Name)
            .all(&*self.db_pool)
            .await?;

        Ok(items
            .into_iter()
            .filter(supply_item::Model::is_low_stock)
            .map(|item| LowStockLine {
                supply_item_id: item.id,
                shortfall: (item.minimum_quantity - item.current_quantity).max(Decimal::ZERO),
                name: item.name,
                unit: item.unit,
                current_quantity: item.current_quantity,
                minimum_quantity: item.minimum_quantity,
            })
            .collect())
    }

    /// Every order ever placed, cancelled ones included
    async fn orders_by_status(&self) -> Result<BTreeMap<String, u64>, ServiceError> {
        let all = order::Entity::find().all(&*self.db_pool).await?;
        let mut counts = BTreeMap::new();
        for order in &all {
            *counts.entry(order.status.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn orders_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::CreatedAt.gte(start))
            .filter(order::Column::CreatedAt.lt(end))
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::PaymentMethod;
    use rust_decimal_macros::dec;

    #[test]
    fn formats_pesos_with_dot_grouping() {
        assert_eq!(format_cop(dec!(32000)), "$32.000");
        assert_eq!(format_cop(dec!(2500)), "$2.500");
        assert_eq!(format_cop(dec!(999)), "$999");
        assert_eq!(format_cop(dec!(0)), "$0");
        assert_eq!(format_cop(dec!(1234567)), "$1.234.567");
    }

    #[test]
    fn rounds_to_whole_pesos() {
        assert_eq!(format_cop(dec!(7000.49)), "$7.000");
        assert_eq!(format_cop(dec!(7000.5)), "$7.001");
        assert_eq!(format_cop(dec!(-1500)), "-$1.500");
    }

    #[test]
    fn currency_suffix() {
        assert_eq!(format_with_currency(dec!(32000), "COP"), "$32.000 COP");
    }

    #[test]
    fn customer_average_is_rounded_to_cents() {
        let user_id = Uuid::new_v4();
        let placed = |total: Decimal, day: u32| order::Model {
            id: Uuid::new_v4(),
            order_number: String::new(),
            user_id,
            status: OrderStatus::Delivered,
            total,
            delivery_address: String::new(),
            contact_phone: String::new(),
            delivery_date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            delivery_time: NaiveTime::MIN,
            payment_method: PaymentMethod::Cash,
            payment_proof: None,
            notes: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap(),
        };

        let mut stats = CustomerStats::empty(user_id);
        stats.add(&placed(dec!(10000), 3));
        stats.add(&placed(dec!(5000), 9));
        stats.add(&placed(dec!(5000), 1));
        let stats = stats.finish();

        assert_eq!(stats.orders, 3);
        assert_eq!(stats.total_spent, dec!(20000));
        assert_eq!(stats.average_order, dec!(6666.67));
        assert_eq!(
            stats.last_order_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 9, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn customer_without_orders_has_zero_average() {
        let stats = CustomerStats::empty(Uuid::new_v4()).finish();
        assert_eq!(stats.orders, 0);
        assert_eq!(stats.average_order, Decimal::ZERO);
        assert!(stats.last_order_at.is_none());
    }

    #[test]
    fn month_bounds_roll_over_december() {
        let (start, end) = month_bounds(2024, 12).unwrap();
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(month_bounds(2024, 13).is_err());
    }
}
