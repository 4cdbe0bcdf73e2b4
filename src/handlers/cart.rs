use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{Action, AuthRouterExt, Caller},
    services::cart::CartSummary,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetQuantityRequest {
    pub quantity: i64,
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route(
            "/cart/items/:product_id",
            put(set_quantity).delete(remove_item),
        )
        .with_permission(Action::ManageCart)
}

/// Current cart valued at live prices
pub async fn get_cart(State(state): State<AppState>, caller: Caller) -> ApiResult<CartSummary> {
    let owner = caller.cart_owner()?;
    let carts = &state.services.cart;
    let cart = carts.load(&owner).await?;
    Ok(Json(ApiResponse::success(carts.summarize(&cart).await?)))
}

/// Add units of a product. The line is capped at the product's stock.
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Item added", body = ApiResponse<CartSummary>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Product out of stock", body = crate::errors::ErrorResponse),
    )
)]
pub async fn add_item(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<AddItemRequest>,
) -> ApiResult<CartSummary> {
    let owner = caller.cart_owner()?;
    let carts = &state.services.cart;

    let mut cart = carts.load(&owner).await?;
    carts
        .add_item(&mut cart, request.product_id, request.quantity)
        .await?;
    carts.save(&owner, &cart).await?;

    Ok(Json(ApiResponse::success(carts.summarize(&cart).await?)))
}

pub async fn set_quantity(
    State(state): State<AppState>,
    caller: Caller,
    Path(product_id): Path<Uuid>,
    Json(request): Json<SetQuantityRequest>,
) -> ApiResult<CartSummary> {
    let owner = caller.cart_owner()?;
    let carts = &state.services.cart;

    let mut cart = carts.load(&owner).await?;
    carts
        .set_quantity(&mut cart, product_id, request.quantity)
        .await?;
    carts.save(&owner, &cart).await?;

    Ok(Json(ApiResponse::success(carts.summarize(&cart).await?)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    caller: Caller,
    Path(product_id): Path<Uuid>,
) -> ApiResult<CartSummary> {
    let owner = caller.cart_owner()?;
    let carts = &state.services.cart;

    let mut cart = carts.load(&owner).await?;
    if carts.remove_item(&mut cart, product_id).is_some() {
        carts.save(&owner, &cart).await?;
    }

    Ok(Json(ApiResponse::success(carts.summarize(&cart).await?)))
}

pub async fn clear_cart(State(state): State<AppState>, caller: Caller) -> ApiResult<CartSummary> {
    let owner = caller.cart_owner()?;
    let carts = &state.services.cart;

    carts.clear_stored(&owner).await?;
    Ok(Json(ApiResponse::success(
        carts.summarize(&Default::default()).await?,
    )))
}
