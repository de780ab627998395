use axum::{extract::State, http::StatusCode, Json, response::IntoResponse};
use serde_json::json;

use crate::api::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Chargeflow API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Charge lifecycle and webhook dispatch engine",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "charges": "/api/charges",
            "invoices": "/api/invoices"
        }
    }))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1")
        .execute(&state.service_context.db_pool)
        .await;

    let (status, label) = match database {
        Ok(_) => (StatusCode::OK, "healthy"),
        Err(e) => {
            tracing::error!("health check: database unreachable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    (status, Json(json!({
        "status": label,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
