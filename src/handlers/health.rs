use axum::extract::State;
use serde_json::{json, Value};

use crate::{ApiResponse, ApiResult, AppState};

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up")),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let store = match state.store.list_warehouses().await {
        Ok(_) => "healthy",
        Err(e) => {
            tracing::warn!(error = %e, "store health probe failed");
            "unhealthy"
        }
    };
    Ok(axum::Json(ApiResponse::success(json!({
        "status": if store == "healthy" { "healthy" } else { "degraded" },
        "checks": { "store": store },
        "storage_backend": state.config.storage_backend,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))))
}
