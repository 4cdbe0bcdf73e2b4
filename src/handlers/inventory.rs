use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::{Action, AuthRouterExt, Caller},
    entities::{inventory_movement, supply_item, MovementDirection},
    errors::ServiceError,
    handlers::common::created,
    services::inventory::{
        CreateSupplyItemInput, MovementFilter, MovementSummary, RecordMovementInput,
        UpdateSupplyItemInput,
    },
    ApiResponse, ApiResult, AppState,
};

const DEFAULT_MOVEMENT_LIMIT: u64 = 50;

#[derive(Debug, Deserialize, ToSchema)]
pub struct MovementRequest {
    pub supply_item_id: Uuid,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub reason: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MovementQuery {
    pub supply_item_id: Option<Uuid>,
    pub direction: Option<MovementDirection>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SupplyItemView {
    #[serde(flatten)]
    pub item: supply_item::Model,
    pub low_stock: bool,
}

impl From<supply_item::Model> for SupplyItemView {
    fn from(item: supply_item::Model) -> Self {
        Self {
            low_stock: item.is_low_stock(),
            item,
        }
    }
}

pub fn inventory_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/inventory/items", get(list_items))
        .route("/inventory/items/:id", get(get_item))
        .route("/inventory/low-stock", get(list_low_stock))
        .route("/inventory/movements", get(list_movements))
        .route("/inventory/movements/summary", get(movement_summary))
        .with_permission(Action::ViewInventory);

    let write = Router::new()
        .route("/inventory/items", post(create_item))
        .route("/inventory/items/:id", axum::routing::put(update_item))
        .route("/inventory/movements", post(record_movement))
        .with_permission(Action::ManageInventory);

    Router::new().merge(read).merge(write)
}

pub async fn list_items(State(state): State<AppState>) -> ApiResult<Vec<SupplyItemView>> {
    let items = state.services.inventory.list_supply_items().await?;
    Ok(Json(ApiResponse::success(
        items.into_iter().map(SupplyItemView::from).collect(),
    )))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SupplyItemView> {
    let item = state.services.inventory.get_supply_item(id).await?;
    Ok(Json(ApiResponse::success(item.into())))
}

pub async fn create_item(
    State(state): State<AppState>,
    caller: Caller,
    Json(input): Json<CreateSupplyItemInput>,
) -> Result<(StatusCode, Json<ApiResponse<SupplyItemView>>), ServiceError> {
    let actor_id = caller.require_user()?;
    let item = state
        .services
        .inventory
        .create_supply_item(input, actor_id)
        .await?;
    Ok(created(item.into()))
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSupplyItemInput>,
) -> ApiResult<SupplyItemView> {
    let item = state.services.inventory.update_supply_item(id, input).await?;
    Ok(Json(ApiResponse::success(item.into())))
}

/// Items at or below their minimum quantity, by name
pub async fn list_low_stock(State(state): State<AppState>) -> ApiResult<Vec<SupplyItemView>> {
    let items = state.services.inventory.list_low_stock().await?;
    Ok(Json(ApiResponse::success(
        items.into_iter().map(SupplyItemView::from).collect(),
    )))
}

/// Book an entrada or salida against a supply item
#[utoipa::path(
    post,
    path = "/api/v1/inventory/movements",
    request_body = MovementRequest,
    responses(
        (status = 201, description = "Movement recorded", body = ApiResponse<inventory_movement::Model>),
        (status = 400, description = "Invalid movement", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Supply item not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn record_movement(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<MovementRequest>,
) -> Result<(StatusCode, Json<ApiResponse<inventory_movement::Model>>), ServiceError> {
    let actor_id = caller.require_user()?;
    let movement = state
        .services
        .inventory
        .record_movement(RecordMovementInput {
            supply_item_id: request.supply_item_id,
            direction: request.direction,
            quantity: request.quantity,
            reason: request.reason,
            actor_id,
        })
        .await?;
    Ok(created(movement))
}

/// Newest first
pub async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<MovementQuery>,
) -> ApiResult<Vec<inventory_movement::Model>> {
    let filter = MovementFilter {
        supply_item_id: query.supply_item_id,
        direction: query.direction,
        since: query.since,
        until: query.until,
        limit: Some(
            query
                .limit
                .unwrap_or(DEFAULT_MOVEMENT_LIMIT)
                .clamp(1, state.config.api_max_page_size),
        ),
    };
    let movements = state.services.inventory.list_movements(&filter).await?;
    Ok(Json(ApiResponse::success(movements)))
}

pub async fn movement_summary(
    State(state): State<AppState>,
    Query(query): Query<MovementQuery>,
) -> ApiResult<MovementSummary> {
    let summary = state
        .services
        .inventory
        .movement_summary(query.since, query.until)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
