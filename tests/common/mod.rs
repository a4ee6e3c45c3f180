#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use obra_api::{
    auth::{USER_ID_HEADER, USER_ROLE_HEADER},
    config::AppConfig,
    entities::user::{self, UserRole},
    events::{self, EventSender},
    repositories::{InMemoryStore, UserDirectory},
    AppState,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Application harness over an in-memory store.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: InMemoryStore,
    pub admin: user::Model,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = InMemoryStore::new();
        let cfg = AppConfig::in_memory();

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx, Vec::new()));

        let state = AppState::new(cfg, Arc::new(store.clone()), EventSender::new(event_tx));
        let router = obra_api::app(state.clone());

        let admin = store
            .insert_user(user::Model {
                id: Uuid::new_v4(),
                name: "Admin".into(),
                email: "admin@obra.test".into(),
                role: UserRole::Admin,
                active: true,
                created_at: Utc::now(),
            })
            .await
            .expect("seed admin");

        Self {
            router,
            state,
            store,
            admin,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        role: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(role) = role {
            builder = builder
                .header(USER_ID_HEADER, self.admin.id.to_string())
                .header(USER_ROLE_HEADER, role);
        }
        let body = body
            .map(|b| Body::from(b.to_string()))
            .unwrap_or_else(Body::empty);
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response")
    }

    /// Request as the seeded administrator.
    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some("admin")).await
    }

    pub async fn seed_user(&self, role: UserRole, active: bool) -> user::Model {
        self.store
            .insert_user(user::Model {
                id: Uuid::new_v4(),
                name: format!("{role:?}"),
                email: format!("{}@obra.test", Uuid::new_v4()),
                role,
                active,
                created_at: Utc::now(),
            })
            .await
            .expect("seed user")
    }

    /// Creates a material through the API and returns its id.
    pub async fn create_material(&self, name: &str, quantity: f64, minimum: f64, price: f64) -> Uuid {
        let response = self
            .admin(
                Method::POST,
                "/api/v1/materials",
                Some(json!({
                    "name": name,
                    "unit": "u",
                    "unit_price": price,
                    "quantity": quantity,
                    "minimum_stock": minimum,
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        uuid_at(&body["data"]["id"])
    }

    /// Creates a project through the API and returns its id.
    pub async fn create_project(&self, name: &str) -> Uuid {
        let response = self
            .admin(
                Method::POST,
                "/api/v1/projects",
                Some(json!({ "name": name, "project_type": "residential", "priority": "high" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        uuid_at(&body["data"]["project"]["id"])
    }

    pub async fn stock(&self, material_id: Uuid) -> f64 {
        let response = self
            .admin(Method::GET, &format!("/api/v1/materials/{material_id}"), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        number(&response_json(response).await["data"]["quantity"])
    }

    pub async fn history(&self, material_id: Uuid) -> Vec<Value> {
        let response = self
            .admin(
                Method::GET,
                &format!("/api/v1/materials/{material_id}/movements"),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        response_json(response).await["data"]
            .as_array()
            .cloned()
            .unwrap_or_default()
    }

    pub async fn stock_alerts(&self, material_id: Uuid) -> Vec<Value> {
        let response = self
            .admin(
                Method::GET,
                &format!("/api/v1/alerts?kind=stock&material_id={material_id}"),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        response_json(response).await["data"]
            .as_array()
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_materials(&self, project_id: Uuid, materials: Value) -> Response {
        self.admin(
            Method::PUT,
            &format!("/api/v1/projects/{project_id}"),
            Some(json!({ "materiales": materials })),
        )
        .await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn uuid_at(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("uuid value")
}

/// Decimals travel as JSON numbers.
pub fn number(value: &Value) -> f64 {
    value.as_f64().expect("numeric value")
}
