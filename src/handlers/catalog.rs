use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::{Action, AuthRouterExt, Caller},
    entities::{category, product},
    errors::ServiceError,
    handlers::common::{created, PaginationParams},
    services::catalog::{
        ActiveFilter, CreateCategoryInput, CreateProductInput, ProductFilter, UpdateProductInput,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductQuery {
    /// Staff may ask for inactive products; shoppers always see active ones
    pub active: Option<ActiveFilter>,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    #[serde(default)]
    pub in_stock: bool,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ActiveQuery {
    pub active: Option<ActiveFilter>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePriceRequest {
    pub price: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FavoriteToggled {
    pub product_id: Uuid,
    pub favorite: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: product::Model,
    pub price_display: String,
}

impl From<product::Model> for ProductView {
    fn from(product: product::Model) -> Self {
        Self {
            price_display: crate::services::reports::format_cop(product.price),
            product,
        }
    }
}

/// Inactive rows are only visible to roles that manage the catalog
fn visible_filter(caller: &Caller, requested: Option<ActiveFilter>) -> ActiveFilter {
    match requested {
        Some(filter) if caller.can(Action::ManageProducts) => filter,
        _ => ActiveFilter::ActiveOnly,
    }
}

pub fn catalog_routes() -> Router<AppState> {
    let public = Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/categories", get(list_categories))
        .route("/favorites", get(list_favorites))
        .route("/favorites/:product_id", post(toggle_favorite))
        .with_permission(Action::ViewProducts);

    let manage_products = Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product))
        .route("/products/:id/price", put(update_price))
        .route("/products/:id/restock", post(restock_product))
        .route("/products/:id/deactivate", post(deactivate_product))
        .route("/products/:id/activate", post(activate_product))
        .with_permission(Action::ManageProducts);

    let manage_categories = Router::new()
        .route("/categories", post(create_category))
        .route("/categories/:id/deactivate", post(deactivate_category))
        .with_permission(Action::ManageCategories);

    Router::new()
        .merge(public)
        .merge(manage_products)
        .merge(manage_categories)
}

/// List products, newest first
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductQuery),
    responses(
        (status = 200, description = "Products retrieved", body = ApiResponse<PaginatedResponse<ProductView>>),
        (status = 400, description = "Invalid query", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_products(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ProductQuery>,
) -> ApiResult<PaginatedResponse<ProductView>> {
    let page = PaginationParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve(&state.config);

    let mut filter = ProductFilter::new(visible_filter(&caller, query.active));
    filter.category_id = query.category_id;
    filter.search = query.search;
    filter.in_stock_only = query.in_stock;

    let total = state.services.catalog.count_products(&filter).await?;
    filter.limit = Some(page.per_page);
    filter.offset = Some(page.offset());
    let products = state.services.catalog.list_products(&filter).await?;

    let items = products.into_iter().map(ProductView::from).collect();
    Ok(Json(ApiResponse::success(page.wrap(items, total))))
}

pub async fn get_product(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Query(query): Query<ActiveQuery>,
) -> ApiResult<ProductView> {
    let product = state
        .services
        .catalog
        .require_product(id, visible_filter(&caller, query.active))
        .await?;
    Ok(Json(ApiResponse::success(product.into())))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<ApiResponse<ProductView>>), ServiceError> {
    let product = state.services.catalog.create_product(input).await?;
    Ok(created(product.into()))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> ApiResult<ProductView> {
    let product = state.services.catalog.update_product(id, input).await?;
    Ok(Json(ApiResponse::success(product.into())))
}

/// Change the live price. Existing orders are unaffected.
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}/price",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdatePriceRequest,
    responses(
        (status = 200, description = "Price updated", body = ApiResponse<ProductView>),
        (status = 400, description = "Invalid price", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_price(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePriceRequest>,
) -> ApiResult<ProductView> {
    let product = state
        .services
        .catalog
        .update_product_price(id, request.price)
        .await?;
    Ok(Json(ApiResponse::success(product.into())))
}

pub async fn restock_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RestockRequest>,
) -> ApiResult<ProductView> {
    let product = state
        .services
        .catalog
        .restock_product(id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(product.into())))
}

pub async fn deactivate_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductView> {
    let product = state.services.catalog.set_product_active(id, false).await?;
    Ok(Json(ApiResponse::success(product.into())))
}

pub async fn activate_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProductView> {
    let product = state.services.catalog.set_product_active(id, true).await?;
    Ok(Json(ApiResponse::success(product.into())))
}

pub async fn list_categories(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ActiveQuery>,
) -> ApiResult<Vec<category::Model>> {
    let filter = visible_filter(&caller, query.active);
    let categories = state.services.catalog.list_categories(filter).await?;
    Ok(Json(ApiResponse::success(categories)))
}

pub async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<ApiResponse<category::Model>>), ServiceError> {
    let category = state.services.catalog.create_category(input).await?;
    Ok(created(category))
}

pub async fn deactivate_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<category::Model> {
    let category = state.services.catalog.set_category_active(id, false).await?;
    Ok(Json(ApiResponse::success(category)))
}

/// Mark or unmark a product as one of the caller's favorites
#[utoipa::path(
    post,
    path = "/api/v1/favorites/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Favorite toggled", body = ApiResponse<FavoriteToggled>),
        (status = 401, description = "Sign in required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn toggle_favorite(
    State(state): State<AppState>,
    caller: Caller,
    Path(product_id): Path<Uuid>,
) -> ApiResult<FavoriteToggled> {
    let user_id = caller.require_user()?;
    let favorite = state
        .services
        .catalog
        .toggle_favorite(user_id, product_id)
        .await?;
    Ok(Json(ApiResponse::success(FavoriteToggled {
        product_id,
        favorite,
    })))
}

pub async fn list_favorites(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<ProductView>> {
    let user_id = caller.require_user()?;
    let products = state.services.catalog.list_favorites(user_id).await?;
    Ok(Json(ApiResponse::success(
        products.into_iter().map(ProductView::from).collect(),
    )))
}
