use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use strum::IntoEnumIterator;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{can_access_dashboard, permissions_for, Action, Caller, Dashboard, Role},
    ApiResponse, ApiResult, AppState,
};

/// What the current caller is allowed to do
#[derive(Debug, Serialize, ToSchema)]
pub struct CallerProfile {
    pub user_id: Option<Uuid>,
    pub role: Role,
    pub role_description: &'static str,
    pub permissions: Vec<Action>,
    pub dashboards: Vec<Dashboard>,
}

impl From<&Caller> for CallerProfile {
    fn from(caller: &Caller) -> Self {
        Self {
            user_id: caller.user_id,
            role: caller.role,
            role_description: caller.role.description(),
            permissions: permissions_for(caller.role),
            dashboards: Dashboard::iter()
                .filter(|d| can_access_dashboard(caller.role, *d))
                .collect(),
        }
    }
}

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

pub async fn me(caller: Caller) -> ApiResult<CallerProfile> {
    Ok(Json(ApiResponse::success(CallerProfile::from(&caller))))
}
