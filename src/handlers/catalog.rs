//! Warehouses, materials and the stock ledger.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, PaginationParams};
use crate::auth::{roles, Actor};
use crate::entities::{material, stock_movement, warehouse};
use crate::errors::ServiceError;
use crate::services::materials::{ManualMovement, NewMaterial};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/warehouses", post(create_warehouse).get(list_warehouses))
        .route("/materials", post(create_material).get(list_materials))
        .route("/materials/:id", get(get_material).delete(delete_material))
        .route(
            "/materials/:id/movements",
            post(record_movement).get(material_history),
        )
        .route("/movements", get(list_movements))
        .route("/movements/:id", patch(annotate_movement))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateWarehouseRequest {
    #[validate(length(min = 1, max = 120))]
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(alias = "ubicacion")]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateMaterialRequest {
    #[validate(length(min = 1, max = 200))]
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(alias = "categoria")]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 32))]
    #[serde(alias = "unidad")]
    pub unit: String,
    #[serde(default, alias = "precioUnitario")]
    pub unit_price: Decimal,
    /// Initial stock, booked as an `entry` movement
    #[serde(default, alias = "cantidad")]
    pub quantity: Decimal,
    #[serde(default, alias = "stockMinimo")]
    pub minimum_stock: Decimal,
    #[serde(alias = "almacen")]
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MovementRequest {
    /// entry | exit | adjustment (Spanish names accepted)
    #[serde(alias = "tipo")]
    pub kind: String,
    #[serde(alias = "cantidad")]
    pub quantity: Decimal,
    #[serde(alias = "motivo")]
    pub reason: Option<String>,
    #[serde(alias = "descripcion")]
    pub description: Option<String>,
    #[serde(alias = "proyecto")]
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnnotateMovementRequest {
    #[serde(alias = "descripcion")]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MaterialListQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouses",
    request_body = CreateWarehouseRequest,
    responses(
        (status = 201, description = "Warehouse created"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn create_warehouse(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateWarehouseRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    actor.require(roles::ADMIN)?;
    payload.validate()?;
    let warehouse = state
        .services
        .catalog
        .create_warehouse(payload.name, payload.location)
        .await?;
    Ok(created_response(warehouse))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouses",
    responses((status = 200, description = "Warehouses")),
    tag = "catalog"
)]
pub async fn list_warehouses(State(state): State<AppState>) -> ApiResult<Vec<warehouse::Model>> {
    let warehouses = state.services.catalog.list_warehouses().await?;
    Ok(Json(ApiResponse::success(warehouses)))
}

#[utoipa::path(
    post,
    path = "/api/v1/materials",
    request_body = CreateMaterialRequest,
    responses(
        (status = 201, description = "Material created"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Warehouse not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn create_material(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateMaterialRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    actor.require(roles::ADMIN)?;
    payload.validate()?;
    let material = state
        .services
        .catalog
        .create_material(
            NewMaterial {
                name: payload.name,
                category: payload.category,
                unit: payload.unit,
                unit_price: payload.unit_price,
                minimum_stock: payload.minimum_stock,
                initial_quantity: payload.quantity,
                warehouse_id: payload.warehouse_id,
            },
            actor,
        )
        .await?;
    Ok(created_response(material))
}

#[utoipa::path(
    get,
    path = "/api/v1/materials",
    params(MaterialListQuery),
    responses((status = 200, description = "Materials")),
    tag = "catalog"
)]
pub async fn list_materials(
    State(state): State<AppState>,
    Query(query): Query<MaterialListQuery>,
) -> ApiResult<Vec<material::Model>> {
    let materials = state
        .services
        .catalog
        .list_materials(query.include_deleted)
        .await?;
    Ok(Json(ApiResponse::success(materials)))
}

#[utoipa::path(
    get,
    path = "/api/v1/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "Material"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<material::Model> {
    let material = state.services.catalog.get_material(id).await?;
    Ok(Json(ApiResponse::success(material)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "Material soft-deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn delete_material(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<material::Model> {
    actor.require(roles::ADMIN)?;
    let material = state.services.catalog.delete_material(id).await?;
    Ok(Json(ApiResponse::success(material)))
}

#[utoipa::path(
    post,
    path = "/api/v1/materials/{id}/movements",
    params(("id" = Uuid, Path, description = "Material id")),
    request_body = MovementRequest,
    responses(
        (status = 201, description = "Movement recorded"),
        (status = 400, description = "Invalid quantity or kind", body = crate::errors::ErrorResponse),
        (status = 404, description = "Material not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn record_movement(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<MovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    actor.require(roles::ADMIN)?;
    let movement = state
        .services
        .catalog
        .record_movement(
            id,
            ManualMovement {
                kind: payload.kind.parse()?,
                quantity: payload.quantity,
                reason: payload.reason,
                description: payload.description,
                project_id: payload.project_id,
            },
            actor,
        )
        .await?;
    Ok(created_response(movement))
}

#[utoipa::path(
    get,
    path = "/api/v1/materials/{id}/movements",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "Ledger entries, newest first"),
        (status = 404, description = "Material not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn material_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<stock_movement::Model>> {
    let history = state.services.ledger.history(id).await?;
    Ok(Json(ApiResponse::success(history)))
}

#[utoipa::path(
    get,
    path = "/api/v1/movements",
    params(PaginationParams),
    responses((status = 200, description = "Ledger entries, newest first")),
    tag = "catalog"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<stock_movement::Model>> {
    let page = params.page();
    let limit = state.config.page_size(params.limit);
    let (items, total) = state.services.ledger.list(page, limit).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/movements/{id}",
    params(("id" = Uuid, Path, description = "Movement id")),
    request_body = AnnotateMovementRequest,
    responses(
        (status = 200, description = "Description updated"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn annotate_movement(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnnotateMovementRequest>,
) -> ApiResult<stock_movement::Model> {
    actor.require(roles::ADMIN)?;
    let movement = state
        .services
        .ledger
        .annotate(id, payload.description)
        .await?;
    Ok(Json(ApiResponse::success(movement)))
}
