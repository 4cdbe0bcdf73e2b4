use crate::{config::AppConfig, ApiResponse, PaginatedResponse};
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

/// Pagination parameters for list operations
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PaginationParams {
    /// Resolves the page and page size against the configured bounds
    pub fn resolve(&self, config: &AppConfig) -> Page {
        Page {
            page: self.page.unwrap_or(1).max(1),
            per_page: config.page_size(self.per_page),
        }
    }
}

/// A concrete page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub per_page: u64,
}

impl Page {
    /// Zero-based row offset
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1) * self.per_page
    }

    pub fn wrap<T>(&self, items: Vec<T>, total: u64) -> PaginatedResponse<T> {
        let total_pages = if total == 0 {
            0
        } else {
            (total + self.per_page - 1) / self.per_page
        };
        PaginatedResponse {
            items,
            total,
            page: self.page,
            limit: self.per_page,
            total_pages,
        }
    }
}

/// Standard created response
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}
