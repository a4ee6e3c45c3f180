mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use obra_api::repositories::ProjectStore;

use common::{response_json, uuid_at, TestApp};

async fn project_with_two_criteria(app: &TestApp) -> Uuid {
    let response = app
        .admin(
            Method::POST,
            "/api/v1/projects",
            Some(json!({
                "nombre": "Clinic",
                "estado": "en progreso",
                "criteria": [
                    { "code": "foundations", "name": "Foundations", "weight": 50 },
                    { "code": "structure", "name": "Structure", "weight": 50 }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["project"]["progress"], 6);
    uuid_at(&body["data"]["project"]["id"])
}

async fn complete(app: &TestApp, project: Uuid, code: &str) {
    let response = app
        .admin(
            Method::PUT,
            &format!("/api/v1/projects/{project}/criteria/{code}"),
            Some(json!({ "completado": true })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn progress(app: &TestApp, project: Uuid) -> Value {
    let response = app
        .admin(Method::GET, &format!("/api/v1/projects/{project}/progress"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await["data"].clone()
}

/// Overwrites the stored progress as an out-of-band writer would.
async fn store_progress(app: &TestApp, project: Uuid, value: i32) {
    let mut model = app
        .store
        .find_project(project)
        .await
        .expect("find project")
        .expect("project exists");
    model.progress = value;
    app.store.update_project(model).await.expect("store progress");
}

async fn stored_progress(app: &TestApp, project: Uuid) -> i32 {
    app.store
        .find_project(project)
        .await
        .expect("find project")
        .expect("project exists")
        .progress
}

#[tokio::test]
async fn toggling_a_criterion_rescores_the_project() {
    let app = TestApp::new().await;
    let project = project_with_two_criteria(&app).await;

    let response = app
        .admin(
            Method::PUT,
            &format!("/api/v1/projects/{project}/criteria/foundations"),
            Some(json!({ "completado": true })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["progress"], 36);

    let response = app
        .admin(Method::GET, &format!("/api/v1/projects/{project}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["progress"], 36);

    let view = progress(&app, project).await;
    assert_eq!(view["total"], 36);
    assert_eq!(view["previous"], 36);
    assert_eq!(view["persisted"], true);
    assert_eq!(view["breakdown"]["criteria"], 50);
    assert_eq!(view["breakdown"]["status"], 60);
    assert_eq!(view["breakdown"]["time"], 0);
}

#[tokio::test]
async fn updating_status_rescores_the_project() {
    let app = TestApp::new().await;
    let project = project_with_two_criteria(&app).await;

    let response = app
        .admin(
            Method::PUT,
            &format!("/api/v1/projects/{project}"),
            Some(json!({ "estado": "completado" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    // status 100 * 0.1
    assert_eq!(response_json(response).await["data"]["project"]["progress"], 10);
    assert_eq!(stored_progress(&app, project).await, 10);
}

#[tokio::test]
async fn reading_a_project_persists_a_stale_score() {
    let app = TestApp::new().await;
    let project = project_with_two_criteria(&app).await;
    complete(&app, project, "foundations").await;

    store_progress(&app, project, 0).await;
    let view = progress(&app, project).await;
    assert_eq!(view["total"], 36);
    assert_eq!(view["previous"], 0);
    assert_eq!(view["persisted"], true);
    assert_eq!(progress(&app, project).await["previous"], 36);

    store_progress(&app, project, 0).await;
    let response = app
        .admin(Method::GET, &format!("/api/v1/projects/{project}"), None)
        .await;
    assert_eq!(response_json(response).await["data"]["progress"], 36);
    assert_eq!(stored_progress(&app, project).await, 36);

    store_progress(&app, project, 0).await;
    let response = app.admin(Method::GET, "/api/v1/projects", None).await;
    let body = response_json(response).await;
    let listed = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == json!(project))
        .cloned()
        .unwrap();
    assert_eq!(listed["progress"], 36);
}

#[tokio::test]
async fn failed_persistence_still_returns_the_computed_score() {
    let app = TestApp::new().await;
    let project = project_with_two_criteria(&app).await;
    complete(&app, project, "foundations").await;
    complete(&app, project, "structure").await;
    store_progress(&app, project, 6).await;

    app.store.fail_project_updates(true);
    let view = progress(&app, project).await;
    assert_eq!(view["total"], 66);
    assert_eq!(view["previous"], 6);
    assert_eq!(view["persisted"], false);

    let response = app
        .admin(Method::GET, &format!("/api/v1/projects/{project}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["progress"], 66);

    app.store.fail_project_updates(false);
    let view = progress(&app, project).await;
    assert_eq!(view["previous"], 6);
    assert_eq!(view["persisted"], true);
    assert_eq!(progress(&app, project).await["previous"], 66);
}

#[tokio::test]
async fn replacing_criteria_keeps_completion_dates() {
    let app = TestApp::new().await;
    let project = project_with_two_criteria(&app).await;
    complete(&app, project, "foundations").await;

    let read = |body: &Value, code: &str| {
        body.as_array()
            .unwrap()
            .iter()
            .find(|c| c["code"] == code)
            .cloned()
            .unwrap()
    };
    let response = app
        .admin(Method::GET, &format!("/api/v1/projects/{project}"), None)
        .await;
    let before = read(&response_json(response).await["data"]["criteria"], "foundations");
    assert!(before["completed_at"].is_string());

    let response = app
        .admin(
            Method::PUT,
            &format!("/api/v1/projects/{project}"),
            Some(json!({
                "criteria": [
                    { "code": "foundations", "name": "Foundations", "weight": 40, "completed": true },
                    { "code": "structure", "name": "Structure", "weight": 60 }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let criteria = &body["data"]["project"]["criteria"];
    assert_eq!(read(criteria, "foundations")["completed_at"], before["completed_at"]);
    assert!(read(criteria, "structure")["completed_at"].is_null());
}

#[tokio::test]
async fn criteria_are_seeded_from_type_and_priority() {
    let app = TestApp::new().await;
    let response = app
        .admin(Method::GET, "/api/v1/criteria/templates?type=mantenimiento&priority=alta", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let templates = response_json(response).await["data"].clone();
    let templates = templates.as_array().unwrap();
    assert!(!templates.is_empty());
    let weight: f64 = templates.iter().map(|c| c["weight"].as_f64().unwrap()).sum();
    assert!((weight - 100.0).abs() < 1e-9);

    let project = app.create_project("Seeded").await;
    let response = app
        .admin(Method::GET, &format!("/api/v1/projects/{project}"), None)
        .await;
    let body = response_json(response).await;
    let criteria = body["data"]["criteria"].as_array().unwrap();
    assert!(!criteria.is_empty());
    assert!(criteria.iter().all(|c| c["completed"] == false));
}

#[tokio::test]
async fn progress_of_unknown_project_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .admin(
            Method::GET,
            &format!("/api/v1/projects/{}/progress", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
