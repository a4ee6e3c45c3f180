use axum::{
    extract::State,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use super::common::created_response;
use crate::auth::{roles, Actor};
use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;
use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/users", post(create_user).get(list_users))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 120))]
    #[serde(alias = "nombre")]
    pub name: String,
    #[validate(email)]
    pub email: String,
    /// admin | site_lead | client (Spanish names accepted)
    #[serde(alias = "rol")]
    pub role: String,
    #[serde(default = "default_active", alias = "activo")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    actor.require(roles::ADMIN)?;
    payload.validate()?;
    let role: UserRole = payload.role.parse().map_err(ServiceError::ValidationError)?;
    let user = state
        .services
        .users
        .create(payload.name, payload.email, role, payload.active)
        .await?;
    Ok(created_response(user))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses((status = 200, description = "Users")),
    tag = "users"
)]
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<user::Model>> {
    let users = state.services.users.list().await?;
    Ok(Json(ApiResponse::success(users)))
}
