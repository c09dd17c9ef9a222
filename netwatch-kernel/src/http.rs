/**
 * HTTP API - Read side of the monitor plus notification toggles
 *
 * Routes:
 * - GET  /               dashboard page (polls /api/data)
 * - GET  /health         liveness, plain "ok"
 * - GET  /system/health  kernel counters (cycles, failures, memory)
 * - GET  /api/data       {"device_status": {name: snapshot}}
 * - GET  /api/settings   {name: notifications_enabled}
 * - POST /api/settings   partial {name: bool}, written back to the registry
 *
 * Handlers only read the StatusStore and call the registry; device runtime
 * state stays inside the poll loop.
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::models::StatusMap;
use crate::registry::{notification_flags, NotificationUpdate, RegistrySource};
use crate::store::StatusStore;
use axum::http::StatusCode;
use axum::response::Html;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const DASHBOARD: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub store: StatusStore,
    pub registry: Arc<dyn RegistrySource>,
    pub health: HealthTracker,
}

#[derive(Serialize)]
struct DataView {
    device_status: StatusMap,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Html(DASHBOARD) }))
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/data", get(get_data))
        .route("/api/settings", get(get_settings).post(update_settings))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health())
}

// GET /api/data
async fn get_data(State(app): State<AppState>) -> Json<DataView> {
    Json(DataView {
        device_status: app.store.read_all(),
    })
}

// GET /api/settings
async fn get_settings(State(app): State<AppState>) -> Result<Json<BTreeMap<String, bool>>, ApiError> {
    let devices = app.registry.load().await.map_err(internal)?;
    Ok(Json(notification_flags(&devices)))
}

// POST /api/settings
async fn update_settings(
    State(app): State<AppState>,
    Json(updates): Json<BTreeMap<String, bool>>,
) -> Result<Json<NotificationUpdate>, ApiError> {
    let outcome = app.registry.set_notifications(&updates).await.map_err(|e| {
        tracing::error!(error = %e, "failed to persist notification settings");
        internal(e)
    })?;
    if !outcome.unknown.is_empty() {
        tracing::warn!(unknown = ?outcome.unknown, "settings update named unknown devices");
    }
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceStatus, DeviceStatusSnapshot};
    use crate::testing::{ping_device, StaticRegistry};
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(registry: Arc<StaticRegistry>, store: StatusStore) -> Router {
        build_router(AppState {
            store,
            registry,
            health: HealthTracker::new(),
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn data_endpoint_serves_the_store_snapshot() {
        let store = StatusStore::new();
        store.write(
            "nas",
            DeviceStatusSnapshot {
                status: DeviceStatus::Alert,
                messages: vec!["Device nas (10.0.0.20) is unreachable".into()],
                address: "10.0.0.20".into(),
                reachable: false,
            },
        );
        let registry = Arc::new(StaticRegistry::new(vec![]));

        let response = app(registry, store).oneshot(get("/api/data")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "device_status": {
                    "nas": {
                        "status": "Alert",
                        "messages": ["Device nas (10.0.0.20) is unreachable"],
                        "ip": "10.0.0.20",
                        "reachable": false
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn settings_round_trip_through_the_registry() {
        let mut muted = ping_device("lab-server", "10.0.4.4");
        muted.notifications_enabled = false;
        let registry = Arc::new(StaticRegistry::new(vec![ping_device("nas", "10.0.0.20"), muted]));
        let router = app(registry.clone(), StatusStore::new());

        let response = router.clone().oneshot(get("/api/settings")).await.unwrap();
        assert_eq!(body_json(response).await, json!({ "lab-server": false, "nas": true }));

        let post = Request::builder()
            .method(Method::POST)
            .uri("/api/settings")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"nas": false, "printer": true}"#))
            .unwrap();
        let response = router.clone().oneshot(post).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "updated": ["nas"], "unknown": ["printer"] }));

        let response = router.oneshot(get("/api/settings")).await.unwrap();
        assert_eq!(body_json(response).await, json!({ "lab-server": false, "nas": false }));
    }

    #[tokio::test]
    async fn registry_failure_is_a_server_error() {
        let registry = Arc::new(StaticRegistry::new(vec![]));
        registry.set_failing(true);

        let response = app(registry, StatusStore::new())
            .oneshot(get("/api/settings"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("scripted failure"));
    }

    #[tokio::test]
    async fn malformed_settings_body_is_rejected() {
        let registry = Arc::new(StaticRegistry::new(vec![ping_device("nas", "10.0.0.20")]));
        let post = Request::builder()
            .method(Method::POST)
            .uri("/api/settings")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"nas": "off"}"#))
            .unwrap();

        let response = app(registry, StatusStore::new()).oneshot(post).await.unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn health_and_dashboard_are_served() {
        let router = app(Arc::new(StaticRegistry::new(vec![])), StatusStore::new());

        let response = router.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router.clone().oneshot(get("/system/health")).await.unwrap();
        assert_eq!(body_json(response).await["cycles_completed"], json!(0));

        let response = router.oneshot(get("/")).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("/api/data"));
    }
}
