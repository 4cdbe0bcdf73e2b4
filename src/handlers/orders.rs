use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::{Action, AuthRouterExt, Caller},
    entities::{
        order::{self, PaymentMethod},
        OrderStatus,
    },
    errors::ServiceError,
    handlers::common::{created, PaginationParams},
    services::{
        orders::{DeliveryInfo, OrderFilter, OrderWithLines},
        reports::OrderReceipt,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub payment_method: Option<PaymentMethod>,
    /// Staff only; customers always see their own orders
    pub user_id: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentProofRequest {
    pub reference: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: OrderWithLines,
    pub total_display: String,
}

impl From<OrderWithLines> for OrderView {
    fn from(order: OrderWithLines) -> Self {
        Self {
            total_display: crate::services::reports::format_cop(order.order.total),
            order,
        }
    }
}

fn sees_all_orders(caller: &Caller) -> bool {
    caller.can(Action::ManageOrders) || caller.can(Action::ViewKitchenOrders)
}

/// Customers only reach their own orders; anything else looks missing
fn ensure_visible(caller: &Caller, order: &order::Model) -> Result<(), ServiceError> {
    if sees_all_orders(caller) {
        return Ok(());
    }
    caller.require(Action::ViewOwnOrders)?;
    if caller.user_id == Some(order.user_id) {
        Ok(())
    } else {
        Err(ServiceError::OrderNotFound(order.id))
    }
}

pub fn order_routes() -> Router<AppState> {
    let shop = Router::new()
        .route("/orders", get(list_orders).post(place_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/receipt", get(get_receipt))
        .route("/orders/:id/payment-proof", put(attach_payment_proof));

    let kitchen = Router::new()
        .route("/orders/:id/status", put(update_status))
        .route("/orders/:id/cancel", post(cancel_order))
        .with_permission(Action::UpdateOrderStatus);

    Router::new().merge(shop).merge(kitchen)
}

/// Check out the caller's stored cart
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = DeliveryInfo,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderView>),
        (status = 400, description = "Empty cart or invalid delivery data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Sign in required", body = crate::errors::ErrorResponse),
        (status = 404, description = "A product no longer exists", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    )
)]
pub async fn place_order(
    State(state): State<AppState>,
    caller: Caller,
    Json(delivery): Json<DeliveryInfo>,
) -> Result<(StatusCode, Json<ApiResponse<OrderView>>), ServiceError> {
    caller.require(Action::PlaceOrder)?;
    let user_id = caller.require_user()?;
    let owner = caller.cart_owner()?;

    let carts = &state.services.cart;
    let mut cart = carts.load(&owner).await?;

    let order_id = state
        .services
        .orders
        .place_order(user_id, &mut cart, delivery)
        .await?;
    // The stored rows went with the order's transaction; this only notifies.
    if let Err(e) = carts.clear_stored(&owner).await {
        warn!(%order_id, error = %e, "Order placed but the stored cart was not cleared");
    }

    info!(%order_id, %user_id, "Checkout completed");
    let order = state.services.orders.get_order(order_id).await?;
    Ok(created(order.into()))
}

/// Newest first. Customers see their own orders only.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(OrderQuery),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<PaginatedResponse<order::Model>>),
        (status = 401, description = "Sign in required", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_orders(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<OrderQuery>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let user_id = if sees_all_orders(&caller) {
        query.user_id
    } else {
        caller.require(Action::ViewOwnOrders)?;
        Some(caller.require_user()?)
    };

    let page = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve(&state.config);

    let mut filter = OrderFilter {
        status: query.status,
        user_id,
        payment_method: query.payment_method,
        ..Default::default()
    };
    let total = state.services.orders.count_orders(&filter).await?;
    filter.limit = Some(page.per_page);
    filter.offset = Some(page.offset());
    let orders = state.services.orders.list_orders(&filter).await?;

    Ok(Json(ApiResponse::success(page.wrap(orders, total))))
}

pub async fn get_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.get_order(id).await?;
    ensure_visible(&caller, &order.order)?;
    Ok(Json(ApiResponse::success(order.into())))
}

/// Receipt rebuilt from the prices the order was sold at
pub async fn get_receipt(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderReceipt> {
    let order = state.services.orders.get_order(id).await?;
    ensure_visible(&caller, &order.order)?;
    let receipt = state.services.reports.order_receipt(id).await?;
    Ok(Json(ApiResponse::success(receipt)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<order::Model>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<order::Model> {
    let order = state
        .services
        .orders
        .update_order_status(id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<order::Model> {
    let order = state.services.orders.cancel_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Customers attach the reference of their transfer; sellers may do it for them
pub async fn attach_payment_proof(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<PaymentProofRequest>,
) -> ApiResult<order::Model> {
    let existing = state.services.orders.get_order(id).await?;
    if !caller.can(Action::ManageOrders) {
        caller.require(Action::PlaceOrder)?;
        if caller.user_id != Some(existing.order.user_id) {
            return Err(ServiceError::OrderNotFound(id));
        }
    }

    let order = state
        .services
        .orders
        .attach_payment_proof(id, request.reference)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
