mod common;

use std::collections::HashSet;

use axum::http::{Method, StatusCode};
use obra_api::entities::user::UserRole;
use serde_json::json;
use uuid::Uuid;

use common::{number, response_json, uuid_at, TestApp};

async fn manual_exit(app: &TestApp, material: Uuid, quantity: f64) {
    let response = app
        .admin(
            Method::POST,
            &format!("/api/v1/materials/{material}/movements"),
            Some(json!({ "tipo": "salida", "cantidad": quantity, "motivo": "site use" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn reservation_below_minimum_alerts_every_active_admin_once() {
    let app = TestApp::new().await;
    let second_admin = app.seed_user(UserRole::Admin, true).await;
    app.seed_user(UserRole::Admin, false).await;
    app.seed_user(UserRole::SiteLead, true).await;

    let steel = app.create_material("Steel beams", 100.0, 20.0, 250.0).await;
    let project = app.create_project("Stadium").await;

    let response = app
        .set_materials(project, json!([{ "material": steel, "cantidad": 90 }]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.stock(steel).await, 10.0);

    let alerts = app.stock_alerts(steel).await;
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert["severity"], "warning");
    assert_eq!(alert["resolved"], false);
    assert_eq!(number(&alert["observed_value"]), 10.0);
    assert_eq!(number(&alert["threshold_value"]), 20.0);

    let recipients: HashSet<Uuid> = alert["recipients"]
        .as_array()
        .unwrap()
        .iter()
        .map(uuid_at)
        .collect();
    assert_eq!(recipients, HashSet::from([app.admin.id, second_admin.id]));
}

#[tokio::test]
async fn stock_alerts_fire_on_crossing_and_again_after_resolution() {
    let app = TestApp::new().await;
    let mortar = app.create_material("Mortar", 10.0, 5.0, 8.0).await;

    manual_exit(&app, mortar, 5.0).await;
    let alerts = app.stock_alerts(mortar).await;
    assert_eq!(alerts.len(), 1);

    manual_exit(&app, mortar, 2.0).await;
    let alerts = app.stock_alerts(mortar).await;
    assert_eq!(alerts.len(), 1, "no duplicate while an alert is open");

    let alert_id = uuid_at(&alerts[0]["id"]);
    let response = app
        .admin(Method::POST, &format!("/api/v1/alerts/{alert_id}/resolve"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    manual_exit(&app, mortar, 1.0).await;
    let alerts = app.stock_alerts(mortar).await;
    assert_eq!(alerts.len(), 2);
    let open: Vec<_> = alerts.iter().filter(|a| a["resolved"] == false).collect();
    assert_eq!(open.len(), 1);
    assert_eq!(number(&open[0]["observed_value"]), 2.0);
}

#[tokio::test]
async fn entries_and_materials_without_minimum_never_alert() {
    let app = TestApp::new().await;
    let nails = app.create_material("Nails", 10.0, 0.0, 0.1).await;
    let screws = app.create_material("Screws", 3.0, 5.0, 0.2).await;

    manual_exit(&app, nails, 10.0).await;
    assert!(app.stock_alerts(nails).await.is_empty());

    let response = app
        .admin(
            Method::POST,
            &format!("/api/v1/materials/{screws}/movements"),
            Some(json!({ "kind": "entry", "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(app.stock_alerts(screws).await.is_empty());
}

#[tokio::test]
async fn emptying_the_stock_raises_a_critical_alert() {
    let app = TestApp::new().await;
    let cable = app.create_material("Cable", 8.0, 2.0, 15.0).await;

    manual_exit(&app, cable, 8.0).await;
    let alerts = app.stock_alerts(cable).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity"], "critical");
}

#[tokio::test]
async fn exit_beyond_stock_is_rejected_without_ledger_entry() {
    let app = TestApp::new().await;
    let lime = app.create_material("Lime", 4.0, 0.0, 3.0).await;
    let entries = app.history(lime).await.len();

    let response = app
        .admin(
            Method::POST,
            &format!("/api/v1/materials/{lime}/movements"),
            Some(json!({ "kind": "exit", "quantity": 5 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.history(lime).await.len(), entries);
    assert_eq!(app.stock(lime).await, 4.0);
}

#[tokio::test]
async fn recipients_can_list_and_mark_their_alerts() {
    let app = TestApp::new().await;
    let response = app
        .admin(
            Method::POST,
            "/api/v1/alerts",
            Some(json!({ "tipo": "request", "mensaje": "Crane needed on Monday" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let alert_id = uuid_at(&body["data"]["id"]);
    assert_eq!(body["data"]["severity"], "info");

    let response = app.admin(Method::GET, "/api/v1/alerts?mine=true", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let response = app
        .admin(Method::POST, &format!("/api/v1/alerts/{alert_id}/seen"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["seen"], true);
}
