use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Obra API",
        version = "1.0.0",
        description = r#"
# Obra API

Material allocation, stock ledger, budgets and progress for construction projects.

## Identity

Requests are authenticated upstream. The gateway forwards the caller as
`x-user-id` (uuid) and `x-user-role` (`admin`, `site_lead`, `client`).

## Numbers

Quantities and money are plain JSON numbers in a single currency.

## Errors

Failures return an `ErrorResponse` body. Stock shortfalls and usage beyond an
allocation answer `422 Unprocessable Entity`.
        "#
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "budgets", description = "Budget documents and allocation reconciliation"),
        (name = "projects", description = "Projects, usage, progress and criteria"),
        (name = "catalog", description = "Warehouses, materials and the stock ledger"),
        (name = "alerts", description = "Threshold and manual alerts"),
        (name = "users", description = "User directory"),
        (name = "health", description = "Health check")
    ),
    paths(
        crate::handlers::health::health_check,
        crate::handlers::budgets::save_budget,
        crate::handlers::budgets::get_budget,
        crate::handlers::projects::create_project,
        crate::handlers::projects::list_projects,
        crate::handlers::projects::get_project,
        crate::handlers::projects::update_project,
        crate::handlers::projects::delete_project,
        crate::handlers::projects::deactivate_project,
        crate::handlers::projects::record_usage,
        crate::handlers::projects::get_progress,
        crate::handlers::projects::set_criterion,
        crate::handlers::projects::preview_criteria,
        crate::handlers::catalog::create_warehouse,
        crate::handlers::catalog::list_warehouses,
        crate::handlers::catalog::create_material,
        crate::handlers::catalog::list_materials,
        crate::handlers::catalog::get_material,
        crate::handlers::catalog::delete_material,
        crate::handlers::catalog::record_movement,
        crate::handlers::catalog::material_history,
        crate::handlers::catalog::list_movements,
        crate::handlers::catalog::annotate_movement,
        crate::handlers::alerts::list_alerts,
        crate::handlers::alerts::raise_alert,
        crate::handlers::alerts::mark_seen,
        crate::handlers::alerts::resolve_alert,
        crate::handlers::users::create_user,
        crate::handlers::users::list_users,
    ),
    components(
        schemas(
            crate::handlers::budgets::SaveBudgetRequest,
            crate::handlers::budgets::BudgetItemRequest,
            crate::handlers::projects::CreateProjectRequest,
            crate::handlers::projects::UpdateProjectRequest,
            crate::handlers::projects::AllocationRequest,
            crate::handlers::projects::CriterionRequest,
            crate::handlers::projects::UsageRequest,
            crate::handlers::projects::CriterionToggleRequest,
            crate::handlers::catalog::CreateWarehouseRequest,
            crate::handlers::catalog::CreateMaterialRequest,
            crate::handlers::catalog::MovementRequest,
            crate::handlers::catalog::AnnotateMovementRequest,
            crate::handlers::alerts::RaiseAlertRequest,
            crate::handlers::users::CreateUserRequest,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url(OPENAPI_JSON_PATH, ApiDocV1::openapi())
}

pub fn routes() -> Router<AppState> {
    Router::new().merge(swagger_ui())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_core_routes() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Obra API"));
        assert!(json.contains("/api/v1/budgets/{project_id}"));
        assert!(json.contains("/api/v1/projects/{id}/materials/{material_id}/usage"));
        assert!(json.contains("/api/v1/projects/{id}/progress"));
        assert!(json.contains("SaveBudgetRequest"));
    }
}
