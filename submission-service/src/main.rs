use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

mod config;
mod handlers;

use config::Config;
use shared::messaging::RedisWorkQueue;
use shared::observability::init_logging;
use shared::storage::{RedisBlobStore, RedisReportStore};
use shared::{IngestionService, ReportLookup};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub lookup: Arc<ReportLookup>,
    pub max_file_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    config.validate()?;

    init_logging(config.logging.to_log_config("submission-service")?)?;

    tracing::info!("Starting Submission Service...");

    let blobs = RedisBlobStore::connect(&config.redis).await?;
    let reports = RedisReportStore::connect(&config.redis).await?;
    let queue = RedisWorkQueue::connect(&config.redis, config.queue.clone()).await?;
    tracing::info!(redis_url = %config.redis.url, "Redis stores initialized successfully");

    let state = AppState {
        ingestion: Arc::new(IngestionService::new(Arc::new(blobs), Arc::new(queue))),
        lookup: Arc::new(ReportLookup::new(Arc::new(reports))),
        max_file_size: config.server.max_file_size_bytes(),
    };

    let app = build_router(state);

    let addr = config.server.socket_addr()?;
    tracing::info!("Submission Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Submission Service shut down gracefully");

    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where available
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = handlers::validation::request_body_limit(state.max_file_size);

    Router::new()
        .route("/health", get(health_check))
        .route("/submit-file", post(handlers::file_upload::submit_encoded_file))
        .route("/submit/file", post(handlers::file_upload::submit_file))
        .route(
            "/report-summary/:sha256",
            get(handlers::report::report_summary),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "Submission Service is healthy"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use pretty_assertions::assert_eq;
    use shared::messaging::MemoryWorkQueue;
    use shared::storage::{MemoryBlobStore, MemoryReportStore};
    use shared::{BlobStore, Channel, ContentHash, Report, ReportStore};
    use tower::ServiceExt;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    struct TestApp {
        router: Router,
        blobs: Arc<MemoryBlobStore>,
        reports: Arc<MemoryReportStore>,
        queue: Arc<MemoryWorkQueue>,
    }

    fn test_app(max_file_size: usize) -> TestApp {
        let blobs = Arc::new(MemoryBlobStore::new());
        let reports = Arc::new(MemoryReportStore::new());
        let queue = Arc::new(MemoryWorkQueue::new());
        let state = AppState {
            ingestion: Arc::new(IngestionService::new(blobs.clone(), queue.clone())),
            lookup: Arc::new(ReportLookup::new(reports.clone())),
            max_file_size,
        };
        TestApp {
            router: build_router(state),
            blobs,
            reports,
            queue,
        }
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn json_submission(encoded: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/submit-file")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"encoded-data":"{}"}}"#, encoded)))
            .unwrap()
    }

    fn multipart_submission(file_name: &str, data: &str) -> Request<Body> {
        let boundary = "X-SANDBOX-BOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n{d}\r\n--{b}--\r\n",
            b = boundary,
            f = file_name,
            d = data
        );
        Request::builder()
            .method("POST")
            .uri("/submit/file")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(1024);
        let response = app
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_submit_encoded_file_returns_hash() {
        let app = test_app(1024);

        let response = app.router.oneshot(json_submission("aGVsbG8=")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, HELLO_SHA256);

        let hash = ContentHash::parse(HELLO_SHA256).unwrap();
        assert_eq!(app.blobs.get_blob(&hash).await.unwrap(), b"hello".to_vec());
        assert_eq!(app.queue.ready(Channel::Scan), vec![HELLO_SHA256.to_string()]);
    }

    #[tokio::test]
    async fn test_submit_multipart_file_returns_hash() {
        let app = test_app(1024);

        let response = app
            .router
            .oneshot(multipart_submission("hello.txt", "hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, HELLO_SHA256);
        assert_eq!(app.queue.ready(Channel::Scan).len(), 1);
    }

    #[tokio::test]
    async fn test_bad_base64_is_rejected() {
        let app = test_app(1024);

        let response = app.router.oneshot(json_submission("%%%")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_line_wrapped_base64_is_accepted() {
        let app = test_app(1024);

        let response = app.router.oneshot(json_submission("aGVs\\nbG8=\\n")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_empty_file_is_rejected() {
        let app = test_app(1024);

        let response = app.router.oneshot(json_submission("")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.queue.ready(Channel::Scan).is_empty());
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected() {
        let app = test_app(4);

        // "hello" is one byte over the limit
        let response = app.router.oneshot(json_submission("aGVsbG8=")).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(app.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_report_summary_returns_stored_body() {
        let app = test_app(1024);
        let body = r#"{"state":"SUCCESS","verdict":"malicious"}"#;
        app.reports
            .put_report(&Report {
                content_hash: ContentHash::parse(HELLO_SHA256).unwrap(),
                body: body.to_string(),
            })
            .await
            .unwrap();

        let response = app
            .router
            .oneshot(
                Request::get(format!("/report-summary/{}", HELLO_SHA256))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, body);
    }

    #[tokio::test]
    async fn test_report_summary_unknown_hash_is_404() {
        let app = test_app(1024);

        let response = app
            .router
            .oneshot(
                Request::get(format!("/report-summary/{}", HELLO_SHA256))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_report_summary_malformed_hash_is_400() {
        let app = test_app(1024);

        let response = app
            .router
            .oneshot(Request::get("/report-summary/xyz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
