use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{roles, Actor};
use crate::entities::budget::{self, BudgetLine};
use crate::services::budgets::{BudgetSaved, SaveBudget};
use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/budgets/:project_id", post(save_budget).get(get_budget))
}

/// Budget line; accepts `material`/`materialId`, `cantidadPrevista` and `costoPrevisto`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BudgetItemRequest {
    #[serde(alias = "material", alias = "materialId")]
    pub material_id: Uuid,
    #[serde(alias = "cantidadPrevista")]
    pub quantity_planned: Decimal,
    #[serde(alias = "costoPrevisto")]
    pub unit_cost_planned: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveBudgetRequest {
    /// Submitted total; replaced by the sum of the lines when they disagree
    #[serde(alias = "presupuestoTotal")]
    pub total: Decimal,
    #[serde(default, alias = "lines")]
    pub items: Vec<BudgetItemRequest>,
}

impl From<SaveBudgetRequest> for SaveBudget {
    fn from(request: SaveBudgetRequest) -> Self {
        SaveBudget {
            total: request.total,
            lines: request
                .items
                .into_iter()
                .map(|item| BudgetLine {
                    material_id: item.material_id,
                    quantity_planned: item.quantity_planned,
                    unit_cost_planned: item.unit_cost_planned,
                })
                .collect(),
        }
    }
}

/// Save a project budget and reconcile the project's allocations to its lines
#[utoipa::path(
    post,
    path = "/api/v1/budgets/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = SaveBudgetRequest,
    responses(
        (status = 200, description = "Budget saved; `message` carries the total adjustment note"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Project or material not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "budgets"
)]
pub async fn save_budget(
    State(state): State<AppState>,
    actor: Actor,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<SaveBudgetRequest>,
) -> ApiResult<BudgetSaved> {
    actor.require(roles::ADMIN)?;
    let saved = state
        .services
        .budgets
        .save(project_id, payload.into(), actor)
        .await?;
    let note = saved.adjustment.as_ref().map(|a| a.note.clone());
    let mut response = ApiResponse::success(saved);
    if let Some(note) = note {
        response = response.with_message(note);
    }
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/budgets/{project_id}",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Stored budget"),
        (status = 404, description = "No budget for the project", body = crate::errors::ErrorResponse)
    ),
    tag = "budgets"
)]
pub async fn get_budget(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<budget::Model> {
    let budget = state.services.budgets.get(project_id).await?;
    Ok(Json(ApiResponse::success(budget)))
}
