use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::{Action, AuthRouterExt, Caller},
    services::reports::{BestSeller, CustomerStats, DailySales, LowStockLine, SalesStats},
    ApiResponse, ApiResult, AppState,
};

const DEFAULT_BEST_SELLERS: usize = 10;
const DEFAULT_TOP_CUSTOMERS: usize = 20;

#[derive(Debug, Deserialize, IntoParams)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MonthQuery {
    /// Defaults to the current year
    pub year: Option<i32>,
    /// 1-12, defaults to the current month
    pub month: Option<u32>,
    pub limit: Option<usize>,
}

impl MonthQuery {
    fn resolve(&self) -> (i32, u32) {
        let today = Utc::now().date_naive();
        (
            self.year.unwrap_or_else(|| today.year()),
            self.month.unwrap_or_else(|| today.month()),
        )
    }
}

pub fn report_routes() -> Router<AppState> {
    let sales = Router::new()
        .route("/reports/sales", get(sales_stats))
        .route("/reports/daily-sales", get(daily_sales))
        .route("/reports/best-sellers", get(best_sellers))
        .route("/reports/customers", get(top_customers))
        .with_permission(Action::ViewSalesReports);

    let stock = Router::new()
        .route("/reports/low-stock", get(low_stock))
        .with_permission(Action::ViewInventory);

    Router::new()
        .merge(sales)
        .merge(stock)
        .route("/me/stats", get(my_stats))
}

/// Today's and this month's sales plus orders per status
#[utoipa::path(
    get,
    path = "/api/v1/reports/sales",
    responses(
        (status = 200, description = "Sales statistics", body = ApiResponse<SalesStats>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    )
)]
pub async fn sales_stats(State(state): State<AppState>) -> ApiResult<SalesStats> {
    let stats = state.services.reports.sales_stats(Utc::now()).await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn daily_sales(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Vec<DailySales>> {
    let (year, month) = query.resolve();
    let days = state.services.reports.daily_sales(year, month).await?;
    Ok(Json(ApiResponse::success(days)))
}

pub async fn best_sellers(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Vec<BestSeller>> {
    let (year, month) = query.resolve();
    let limit = query.limit.unwrap_or(DEFAULT_BEST_SELLERS).max(1);
    let ranked = state
        .services
        .reports
        .best_sellers(year, month, limit)
        .await?;
    Ok(Json(ApiResponse::success(ranked)))
}

pub async fn low_stock(State(state): State<AppState>) -> ApiResult<Vec<LowStockLine>> {
    let lines = state.services.reports.low_stock_report().await?;
    Ok(Json(ApiResponse::success(lines)))
}

/// Customers ranked by what they have spent
#[utoipa::path(
    get,
    path = "/api/v1/reports/customers",
    params(LimitQuery),
    responses(
        (status = 200, description = "Customer ranking", body = ApiResponse<Vec<CustomerStats>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    )
)]
pub async fn top_customers(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<CustomerStats>> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_CUSTOMERS).max(1);
    let ranked = state.services.reports.customer_ranking(limit).await?;
    Ok(Json(ApiResponse::success(ranked)))
}

/// The caller's own purchase history
pub async fn my_stats(State(state): State<AppState>, caller: Caller) -> ApiResult<CustomerStats> {
    caller.require(Action::ViewOwnOrders)?;
    let user_id = caller.require_user()?;
    let stats = state.services.reports.customer_stats(user_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}
