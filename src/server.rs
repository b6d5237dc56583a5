//! HTTP JSON boundary for the tutorial pipeline.
//!
//! Thin by design: request parsing, error-to-status mapping and JSON
//! encoding. All generation logic lives in the pipeline.
//!
//! Endpoints:
//! - POST /generate-tutorial  - Generate a bilingual drawing tutorial
//! - GET  /health             - Server status

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::error::PipelineError;
use crate::pipeline::Pipeline;

/// Generation requests are tiny; anything bigger is malformed.
const MAX_BODY_SIZE: usize = 16 * 1024;

pub struct AppState {
    pub pipeline: Pipeline,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub subject: String,
}

fn json_error(status: StatusCode, detail: &str) -> Response {
    (status, Json(serde_json::json!({ "detail": detail }))).into_response()
}

/// Client-caused failures map to 400; failures of the upstream generation
/// stages surface as 502.
fn error_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidSubject(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

async fn handle_generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    match state.pipeline.generate(&request.subject).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            error!("Tutorial generation failed: {}", e);
            json_error(error_status(&e), &e.to_string())
        }
    }
}

async fn handle_health() -> Response {
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/generate-tutorial", post(handle_generate))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

pub async fn start_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_deserializes() {
        let req: GenerateRequest = serde_json::from_str(r#"{ "subject": "cat" }"#).unwrap();
        assert_eq!(req.subject, "cat");

        assert!(serde_json::from_str::<GenerateRequest>(r#"{}"#).is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&PipelineError::InvalidSubject("empty".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&PipelineError::Planning("boom".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&PipelineError::ImageChain {
                step: 2,
                reason: "boom".into()
            }),
            StatusCode::BAD_GATEWAY
        );
    }
}
