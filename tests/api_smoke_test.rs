mod common;

use axum::http::{Method, StatusCode};
use obra_api::middleware_helpers::REQUEST_ID_HEADER;
use serde_json::json;

use common::{response_json, TestApp};

#[tokio::test]
async fn health_reports_the_store_and_echoes_a_request_id() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["storage_backend"], "memory");
    assert!(body["meta"]["request_id"].is_string());
}

#[tokio::test]
async fn openapi_document_lists_the_reconciliation_routes() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = response_json(response).await;
    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/api/v1/budgets/{project_id}"));
    assert!(paths.contains_key("/api/v1/projects/{id}"));
    assert!(paths.contains_key("/api/v1/projects/{id}/materials/{material_id}/usage"));
    assert!(paths.contains_key("/api/v1/projects/{id}/progress"));
}

#[tokio::test]
async fn user_emails_are_unique_case_insensitively() {
    let app = TestApp::new().await;
    let user = json!({ "nombre": "Lucía", "email": "Lucia@Obra.test", "rol": "encargado" });

    let response = app.admin(Method::POST, "/api/v1/users", Some(user)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["email"], "lucia@obra.test");
    assert_eq!(body["data"]["role"], "site_lead");

    let duplicate = json!({ "name": "Other", "email": "LUCIA@obra.test", "role": "client" });
    let response = app.admin(Method::POST, "/api/v1/users", Some(duplicate)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let invalid = json!({ "name": "Bad", "email": "not-an-email", "role": "client" });
    let response = app.admin(Method::POST, "/api/v1/users", Some(invalid)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleted_materials_cannot_be_newly_reserved() {
    let app = TestApp::new().await;
    let asphalt = app.create_material("Asphalt", 50.0, 0.0, 30.0).await;
    let project = app.create_project("Highway").await;

    let response = app
        .admin(Method::DELETE, &format!("/api/v1/materials/{asphalt}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .set_materials(project, json!([{ "material": asphalt, "cantidad": 5 }]))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stock(asphalt).await, 50.0);
}
