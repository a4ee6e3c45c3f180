use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::created_response;
use crate::auth::{roles, Actor};
use crate::entities::alert::{self, AlertKind, AlertSeverity};
use crate::errors::ServiceError;
use crate::repositories::AlertFilter;
use crate::services::alerts::NewAlert;
use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(list_alerts).post(raise_alert))
        .route("/alerts/:id/seen", post(mark_seen))
        .route("/alerts/:id/resolve", post(resolve_alert))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AlertQuery {
    pub project_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    #[param(value_type = Option<String>)]
    pub kind: Option<AlertKind>,
    pub resolved: Option<bool>,
    /// Only alerts addressed to the caller
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RaiseAlertRequest {
    #[schema(value_type = String)]
    #[serde(alias = "tipo")]
    pub kind: AlertKind,
    #[schema(value_type = String)]
    #[serde(default = "default_severity", alias = "prioridad")]
    pub severity: AlertSeverity,
    #[validate(length(min = 1, max = 1000))]
    #[serde(alias = "mensaje")]
    pub message: String,
    pub project_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    /// Defaults to active administrators plus the project lead
    #[serde(default)]
    pub recipients: Vec<Uuid>,
}

fn default_severity() -> AlertSeverity {
    AlertSeverity::Info
}

#[utoipa::path(
    get,
    path = "/api/v1/alerts",
    params(AlertQuery),
    responses((status = 200, description = "Alerts, newest first")),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<AlertQuery>,
) -> ApiResult<Vec<alert::Model>> {
    let recipient = if query.mine {
        Some(actor.require_identified()?)
    } else {
        None
    };
    let alerts = state
        .services
        .alerts
        .list(AlertFilter {
            project_id: query.project_id,
            material_id: query.material_id,
            kind: query.kind,
            resolved: query.resolved,
            recipient,
        })
        .await?;
    Ok(Json(ApiResponse::success(alerts)))
}

#[utoipa::path(
    post,
    path = "/api/v1/alerts",
    request_body = RaiseAlertRequest,
    responses(
        (status = 201, description = "Alert opened"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn raise_alert(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<RaiseAlertRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    actor.require(roles::SITE_MANAGERS)?;
    payload.validate()?;
    let alert = state
        .services
        .alerts
        .raise(
            NewAlert {
                kind: payload.kind,
                severity: payload.severity,
                message: payload.message,
                project_id: payload.project_id,
                material_id: payload.material_id,
                user_id: payload.user_id,
                request_id: payload.request_id,
                recipients: payload.recipients,
            },
            actor,
        )
        .await?;
    Ok(created_response(alert))
}

#[utoipa::path(
    post,
    path = "/api/v1/alerts/{id}/seen",
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Alert marked as seen"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn mark_seen(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<alert::Model> {
    actor.require_identified()?;
    let alert = state.services.alerts.mark_seen(id).await?;
    Ok(Json(ApiResponse::success(alert)))
}

#[utoipa::path(
    post,
    path = "/api/v1/alerts/{id}/resolve",
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Alert resolved"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "alerts"
)]
pub async fn resolve_alert(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<alert::Model> {
    actor.require_identified()?;
    let alert = state.services.alerts.resolve(id, actor).await?;
    Ok(Json(ApiResponse::success(alert)))
}
