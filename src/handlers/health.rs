use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

static BOOTED_AT: OnceLock<Instant> = OnceLock::new();

/// Marks process start for the `uptime_secs` field
pub fn init_start_time() {
    BOOTED_AT.get_or_init(Instant::now);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Up,
    Down,
}

#[derive(Debug, Serialize)]
pub struct DatabaseCheck {
    pub status: CheckState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub status: CheckState,
    pub version: &'static str,
    pub timestamp: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    #[serde(flatten)]
    pub liveness: Liveness,
    pub database: DatabaseCheck,
}

fn liveness(status: CheckState) -> Liveness {
    Liveness {
        status,
        version: VERSION,
        timestamp: Utc::now().to_rfc3339(),
        uptime_secs: BOOTED_AT.get().map_or(0, |t| t.elapsed().as_secs()),
    }
}

async fn live() -> Json<Liveness> {
    Json(liveness(CheckState::Up))
}

/// 200 while the database answers a ping, 503 otherwise
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let started = Instant::now();
    let database = match crate::db::check_connection(&state.db).await {
        Ok(()) => DatabaseCheck {
            status: CheckState::Up,
            latency_ms: u64::try_from(started.elapsed().as_millis()).ok(),
            error: None,
        },
        Err(e) => DatabaseCheck {
            status: CheckState::Down,
            latency_ms: None,
            error: Some(e.response_message()),
        },
    };

    let code = match database.status {
        CheckState::Up => StatusCode::OK,
        CheckState::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = Readiness {
        liveness: liveness(database.status),
        database,
    };
    (code, Json(body))
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(live))
        .route("/ready", get(ready))
}
