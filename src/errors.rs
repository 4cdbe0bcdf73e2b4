use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::OrderStatus;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// JSON body of every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "message": "Insufficient stock for product 7d1f0c2e-93a4-4b8e-a1c9-0f6f2d55b001: requested 4, available 1",
    "request_id": "5b3a4c1e-2f0d-4a8e-9d62-1c7e0b9f4a10",
    "timestamp": "2026-11-02T14:05:00Z"
}))]
pub struct ErrorResponse {
    /// Reason phrase of the status code
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Category {0} not found")]
    CategoryNotFound(Uuid),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Supply item {0} not found")]
    SupplyItemNotFound(Uuid),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: u32,
        available: i32,
    },

    #[error("Product {0} is out of stock")]
    OutOfStock(Uuid),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid movement: {0}")]
    InvalidMovement(String),

    #[error("Cannot place an order from an empty cart")]
    EmptyCart,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ProductNotFound(_)
            | Self::CategoryNotFound(_)
            | Self::OrderNotFound(_)
            | Self::SupplyItemNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidQuantity(_)
            | Self::InvalidMovement(_)
            | Self::EmptyCart
            | Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock { .. } | Self::OutOfStock(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to clients. Database and internal errors are masked.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Stable label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database",
            Self::ProductNotFound(_) => "product_not_found",
            Self::CategoryNotFound(_) => "category_not_found",
            Self::OrderNotFound(_) => "order_not_found",
            Self::SupplyItemNotFound(_) => "supply_item_not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::OutOfStock(_) => "out_of_stock",
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::InvalidMovement(_) => "invalid_movement",
            Self::EmptyCart => "empty_cart",
            Self::InvalidStatusTransition { .. } => "invalid_status_transition",
            Self::ValidationError(_) => "validation",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::InternalError(_) => "internal",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::OrderNotFound(Uuid::nil()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.error, "Not Found");
    }

    #[test]
    fn status_code_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            ServiceError::ProductNotFound(id).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InsufficientStock {
                product_id: id,
                requested: 5,
                available: 3
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ServiceError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::InvalidQuantity("0".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidStatusTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("connection reset".into()))
                .response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::InternalError("secret".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::EmptyCart.response_message(),
            "Cannot place an order from an empty cart"
        );
    }

    #[test]
    fn transition_message_uses_status_names() {
        let err = ServiceError::InvalidStatusTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Delivered,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition from pending to delivered"
        );
    }
}
