use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, no_content_response};
use crate::auth::{roles, Actor};
use crate::entities::project::{self, Criterion};
use crate::errors::ServiceError;
use crate::services::projects::{Deactivation, NewProject, ProgressView, ProjectChanged, ProjectPatch};
use crate::services::reconciler::{ConsumptionOutcome, DesiredAllocation};
use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project).get(list_projects))
        .route(
            "/projects/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/:id/deactivate", post(deactivate_project))
        .route(
            "/projects/:id/materials/:material_id/usage",
            post(record_usage),
        )
        .route("/projects/:id/progress", get(get_progress))
        .route("/projects/:id/criteria/:code", put(set_criterion))
        .route("/criteria/templates", get(preview_criteria))
}

/// Desired allocation; accepts `material`/`materialId` and `cantidad`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AllocationRequest {
    #[serde(alias = "material", alias = "materialId")]
    pub material_id: Uuid,
    #[serde(alias = "cantidad", alias = "cantidadAsignada")]
    pub quantity: Decimal,
}

impl From<AllocationRequest> for DesiredAllocation {
    fn from(request: AllocationRequest) -> Self {
        DesiredAllocation {
            material_id: request.material_id,
            quantity: request.quantity,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CriterionRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub weight: f64,
    #[serde(default)]
    pub completed: bool,
    /// Kept from the stored criterion with the same code when omitted.
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<CriterionRequest> for Criterion {
    fn from(request: CriterionRequest) -> Self {
        Criterion {
            code: request.code,
            name: request.name,
            description: request.description,
            weight: request.weight,
            completed: request.completed,
            completed_at: request.completed_at.filter(|_| request.completed),
        }
    }
}

fn criteria(list: Option<Vec<CriterionRequest>>) -> Option<Vec<Criterion>> {
    list.map(|l| l.into_iter().map(Criterion::from).collect())
}

fn allocations(list: Vec<AllocationRequest>) -> Vec<DesiredAllocation> {
    list.into_iter().map(DesiredAllocation::from).collect()
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "tipo", alias = "type")]
    pub project_type: String,
    #[serde(default, alias = "prioridad")]
    pub priority: String,
    #[serde(alias = "estado")]
    pub status: Option<String>,
    #[serde(alias = "fechaInicio")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(alias = "fechaFin")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(alias = "progresoManual")]
    pub manual_progress: Option<f64>,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub criteria: Option<Vec<CriterionRequest>>,
    #[serde(default, alias = "materiales")]
    pub materials: Vec<AllocationRequest>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    #[serde(alias = "nombre")]
    pub name: Option<String>,
    #[serde(alias = "tipo", alias = "type")]
    pub project_type: Option<String>,
    #[serde(alias = "prioridad")]
    pub priority: Option<String>,
    #[serde(alias = "estado")]
    pub status: Option<String>,
    #[serde(alias = "fechaInicio")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(alias = "fechaFin")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(alias = "progresoManual")]
    pub manual_progress: Option<f64>,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub criteria: Option<Vec<CriterionRequest>>,
    /// Full desired allocation set; omit to leave allocations untouched
    #[serde(alias = "materiales")]
    pub materials: Option<Vec<AllocationRequest>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UsageRequest {
    #[serde(alias = "cantidad")]
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CriterionToggleRequest {
    #[serde(alias = "completado")]
    pub completed: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ProjectListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TemplateQuery {
    #[serde(default, rename = "type")]
    pub project_type: String,
    #[serde(default)]
    pub priority: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock for initial materials", body = crate::errors::ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn create_project(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    actor.require(roles::ADMIN)?;
    payload.validate()?;
    let input = NewProject {
        name: payload.name,
        project_type: payload.project_type,
        priority: payload.priority,
        status: payload.status,
        start_date: payload.start_date,
        end_date: payload.end_date,
        manual_progress: payload.manual_progress,
        lead_id: payload.lead_id,
        client_id: payload.client_id,
        criteria: criteria(payload.criteria),
        materials: allocations(payload.materials),
    };
    let created = state.services.projects.create(input, actor).await?;
    Ok(created_response(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/projects",
    params(ProjectListQuery),
    responses((status = 200, description = "Projects")),
    tag = "projects"
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectListQuery>,
) -> ApiResult<Vec<project::Model>> {
    let projects = state.services.projects.list(query.active_only).await?;
    Ok(Json(ApiResponse::success(projects)))
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<project::Model> {
    let project = state.services.projects.get(id).await?;
    Ok(Json(ApiResponse::success(project)))
}

/// Update a project; a `materiales` field reconciles its allocations
#[utoipa::path(
    put,
    path = "/api/v1/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn update_project(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<ProjectChanged> {
    actor.require(roles::SITE_MANAGERS)?;
    payload.validate()?;
    let patch = ProjectPatch {
        name: payload.name,
        project_type: payload.project_type,
        priority: payload.priority,
        status: payload.status,
        start_date: payload.start_date,
        end_date: payload.end_date,
        manual_progress: payload.manual_progress,
        lead_id: payload.lead_id,
        client_id: payload.client_id,
        criteria: criteria(payload.criteria),
        materials: payload.materials.map(allocations),
    };
    let changed = state.services.projects.update(id, patch, actor).await?;
    Ok(Json(ApiResponse::success(changed)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted; allocations returned to stock"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn delete_project(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    actor.require(roles::ADMIN)?;
    state.services.projects.delete(id, actor).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/projects/{id}/deactivate",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project deactivated"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn deactivate_project(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Deactivation> {
    actor.require(roles::ADMIN)?;
    let deactivation = state.services.projects.deactivate(id, actor).await?;
    Ok(Json(ApiResponse::success(deactivation)))
}

/// Record usage of an allocated material
#[utoipa::path(
    post,
    path = "/api/v1/projects/{id}/materials/{material_id}/usage",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("material_id" = Uuid, Path, description = "Material id")
    ),
    request_body = UsageRequest,
    responses(
        (status = 200, description = "Usage recorded"),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not allocated", body = crate::errors::ErrorResponse),
        (status = 422, description = "Exceeds allocation or stock", body = crate::errors::ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn record_usage(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, material_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UsageRequest>,
) -> ApiResult<ConsumptionOutcome> {
    actor.require(roles::SITE_MANAGERS)?;
    let outcome = state
        .services
        .reconciler
        .consume(id, material_id, payload.quantity, actor)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}/progress",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Progress score and breakdown"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProgressView> {
    let view = state.services.projects.progress(id).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    put,
    path = "/api/v1/projects/{id}/criteria/{code}",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("code" = String, Path, description = "Criterion code")
    ),
    request_body = CriterionToggleRequest,
    responses(
        (status = 200, description = "Criterion updated"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "projects"
)]
pub async fn set_criterion(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, code)): Path<(Uuid, String)>,
    Json(payload): Json<CriterionToggleRequest>,
) -> ApiResult<project::Model> {
    actor.require(roles::SITE_MANAGERS)?;
    let project = state
        .services
        .projects
        .set_criterion(id, &code, payload.completed)
        .await?;
    Ok(Json(ApiResponse::success(project)))
}

#[utoipa::path(
    get,
    path = "/api/v1/criteria/templates",
    params(TemplateQuery),
    responses((status = 200, description = "Criteria seeded for the type and priority")),
    tag = "projects"
)]
pub async fn preview_criteria(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
) -> ApiResult<Vec<Criterion>> {
    let criteria = state
        .services
        .projects
        .engine()
        .generate_criteria(&query.project_type, &query.priority);
    Ok(Json(ApiResponse::success(criteria)))
}
