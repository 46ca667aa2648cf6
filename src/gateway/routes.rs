use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{handlers, state::GatewayState, websocket::websocket_handler};

pub fn create_router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // System endpoints
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/metrics", get(handlers::metrics))
        // Cleaner registry
        .route("/storage/cleaners", post(handlers::register_cleaner))
        .route(
            "/storage/cleaners/:id/idle",
            get(handlers::get_cleaner_idle).put(handlers::set_cleaner_idle),
        )
        // Pool
        .route("/storage/cleaning-mode", get(handlers::cleaning_mode))
        .route("/storage/files/count", get(handlers::file_count))
        .route("/storage/files", post(handlers::upload_file))
        .route("/storage/files/oldest/remove", post(handlers::remove_oldest))
        .route("/storage/files/:index/take", post(handlers::take_file))
        // Admin
        .route("/admin/capacity", put(handlers::set_capacity))
        // Bus bridge for remote workers
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{AdmissionPolicy, StorageCoordinator};
    use crate::metrics::Metrics;
    use crate::transport::MessageBus;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(capacity: u64) -> (Router, Arc<StorageCoordinator>) {
        let coord = Arc::new(StorageCoordinator::new(
            capacity,
            AdmissionPolicy::CheckBeforeInsert,
            3,
        ));
        let state = GatewayState::new(coord.clone(), MessageBus::new(8), Arc::new(Metrics::new()));
        (create_router(state), coord)
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(100);
        let (status, body) = send(&app, request(Method::GET, "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_upload_admission_boundary() {
        let (app, coord) = app(200);

        let (_, body) = send(
            &app,
            request(Method::POST, "/storage/files", Some(json!({"name": "a", "size": 120}))),
        )
        .await;
        assert_eq!(body["admitted"], true);

        let (_, body) = send(
            &app,
            request(Method::POST, "/storage/files", Some(json!({"name": "b", "size": 81}))),
        )
        .await;
        assert_eq!(body["admitted"], false);
        assert_eq!(coord.snapshot().await.occupied, 120);

        let (_, body) = send(
            &app,
            request(Method::POST, "/storage/files", Some(json!({"name": "c", "size": 80}))),
        )
        .await;
        assert_eq!(body["admitted"], true);
        assert_eq!(coord.snapshot().await.occupied, 200);
    }

    #[tokio::test]
    async fn test_unknown_cleaner_is_404() {
        let (app, _) = app(100);
        let (status, _) = send(
            &app,
            request(Method::GET, "/storage/cleaners/nonexistent/idle", None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cleaner_idle_round_trip() {
        let (app, _) = app(100);
        let (status, body) = send(
            &app,
            request(Method::POST, "/storage/cleaners", Some(json!({"cleaner_id": "c1"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["registered"], true);

        let (status, _) = send(
            &app,
            request(Method::PUT, "/storage/cleaners/c1/idle", Some(json!({"idle": false}))),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, request(Method::GET, "/storage/cleaners/c1/idle", None)).await;
        assert_eq!(body["idle"], false);
    }

    #[tokio::test]
    async fn test_take_and_remove_oldest() {
        let (app, coord) = app(200);
        coord.register_cleaner("c1").await;
        coord.try_send_file("old", 30).await;
        coord.try_send_file("new", 40).await;

        let (status, body) = send(&app, request(Method::POST, "/storage/files/1/take", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "new");

        let (status, _) = send(&app, request(Method::POST, "/storage/files/5/take", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, request(Method::POST, "/storage/files/-1/take", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(
            &app,
            request(
                Method::POST,
                "/storage/files/oldest/remove",
                Some(json!({"cleaner_id": "c1"})),
            ),
        )
        .await;
        assert_eq!(body["removed"], true);

        let (_, body) = send(&app, request(Method::GET, "/storage/files/count", None)).await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_admin_capacity() {
        let (app, _) = app(100);
        let (status, body) = send(
            &app,
            request(Method::PUT, "/admin/capacity", Some(json!({"capacity": 300}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["capacity"], 300);

        let (status, _) = send(
            &app,
            request(Method::PUT, "/admin/capacity", Some(json!({"capacity": 0}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_reports_snapshot_and_counters() {
        let (app, coord) = app(100);
        coord.try_send_file("a", 10).await;
        let (status, body) = send(&app, request(Method::GET, "/status", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["storage"]["occupied"], 10);
        assert_eq!(body["storage"]["cleaning_mode"], false);
        assert!(body["metrics"].is_object());
    }
}
