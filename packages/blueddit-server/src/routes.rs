//! Router, middleware and handlers.

use std::any::Any;
use std::path::Path;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Full application: routes plus middleware
pub fn app(static_dir: &Path) -> Router {
    with_middleware(routes(static_dir))
}

/// Routes without middleware
pub fn routes(static_dir: &Path) -> Router {
    let client = ServeDir::new(static_dir)
        .fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/api/health", get(health_handler))
        .fallback_service(client)
}

/// Wrap `router` in the standard middleware stack
pub fn with_middleware(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers(cors::Any);

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// Liveness check.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// Turn a handler panic into the generic 500 body.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Something broke!" })),
    )
        .into_response()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn client_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>blueddit</html>").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets").join("app.js"), "console.log(1)").unwrap();
        dir
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let dir = client_dir();
        let (status, body) = get_body(app(dir.path()), "/api/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test]
    async fn test_static_asset() {
        let dir = client_dir();
        let (status, body) = get_body(app(dir.path()), "/assets/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log(1)");
    }

    #[tokio::test]
    async fn test_client_route_falls_back_to_index() {
        let dir = client_dir();
        let (status, body) = get_body(app(dir.path()), "/posts/42").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("blueddit"));
    }

    async fn boom() -> &'static str {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let dir = client_dir();
        let router = with_middleware(
            routes(dir.path()).route("/boom", get(boom)),
        );
        let (status, body) = get_body(router, "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Something broke!");
    }

    #[tokio::test]
    async fn test_security_headers() {
        let dir = client_dir();
        let response = app(dir.path())
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
    }
}
