//! HTTP surface: check intake and health.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use micr_core::EncodingLineRecord;
use micr_ocr::{CheckPipeline, OcrBackend};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};

use crate::error::ApiError;
use crate::payload::{self, PayloadError};

/// Application state shared across handlers.
pub struct AppState<R> {
    pub pipeline: CheckPipeline<R>,
    pub max_body_bytes: usize,
}

impl<R> AppState<R> {
    pub fn new(pipeline: CheckPipeline<R>, max_body_bytes: usize) -> Self {
        Self { pipeline, max_body_bytes }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub fn router<R: OcrBackend + 'static>(state: Arc<AppState<R>>) -> Router {
    let max_body_bytes = state.max_body_bytes;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/processCheck", post(process_check_handler::<R>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Body: `<mime-prefix>,<base64 image>`. Answers the encoding-line record.
///
/// The body is taken as raw bytes so oversized and non-UTF-8 uploads still get
/// a JSON error body.
async fn process_check_handler<R: OcrBackend + 'static>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<EncodingLineRecord>, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("process_check", %request_id);

    async move {
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        info!(content_length, "check image received");

        let body = body.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::PayloadTooLarge { limit: state.max_body_bytes }
            } else {
                PayloadError::Unreadable(rejection.body_text()).into()
            }
        })?;
        let encoded = payload::decode_data_url(&body)?;
        let record = state.pipeline.process_encoded(encoded).await?;
        info!(
            routing_number = %record.routing_number,
            has_check_number = record.check_number.is_some(),
            "encoding line extracted"
        );
        Ok(Json(record))
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorBody;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use image::{GrayImage, Luma};
    use micr_ocr::{BoundingBox, EnginePool, MockRecognizer, RecognizedWord};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(lines: &[&str], acquire_ms: u64) -> (Router, Arc<AppState<MockRecognizer>>) {
        app_limited(lines, acquire_ms, 1 << 20)
    }

    fn app_limited(
        lines: &[&str],
        acquire_ms: u64,
        max_body_bytes: usize,
    ) -> (Router, Arc<AppState<MockRecognizer>>) {
        let words = lines
            .iter()
            .map(|t| RecognizedWord::new(*t, 87.0, BoundingBox::new(20, 300, 1200, 40)))
            .collect();
        let pipeline = CheckPipeline::new(
            EnginePool::new(vec![MockRecognizer::new(words)], Duration::from_millis(acquire_ms)),
            Duration::from_secs(5),
        );
        let state = Arc::new(AppState::new(pipeline, max_body_bytes));
        (router(Arc::clone(&state)), state)
    }

    fn data_url() -> String {
        let img = GrayImage::from_pixel(64, 32, Luma([235]));
        let png = micr_ocr::preprocess::encode_as_png(&img).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(png))
    }

    fn post_check(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/processCheck")
            .header("content-type", "text/plain")
            .body(body.into())
            .unwrap()
    }

    async fn read_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (app, _) = app_with(&[], 50);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: HealthResponse = read_json(resp).await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn extracts_record_from_data_url() {
        let (app, _) = app_with(&["C1001CA021000021A1234567890C"], 50);
        let resp = app.oneshot(post_check(data_url())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json: serde_json::Value = read_json(resp).await;
        assert_eq!(
            json,
            serde_json::json!({
                "checkNumber": "1001",
                "routingNumber": "021000021",
                "accountNumber": "1234567890"
            })
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let (app, _) = app_with(&[], 50);
        let resp = app.oneshot(post_check("not a data url")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = read_json(resp).await;
        assert_eq!(body.error, "invalid_payload");
    }

    #[tokio::test]
    async fn non_utf8_body_is_an_invalid_payload() {
        let (app, _) = app_with(&[], 50);
        let resp = app.oneshot(post_check(&b"d,\xff\xfe"[..])).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = read_json(resp).await;
        assert_eq!(body.error, "invalid_payload");
    }

    #[tokio::test]
    async fn oversized_body_is_payload_too_large() {
        let (app, _) = app_limited(&[], 50, 64);
        let resp = app.oneshot(post_check(data_url())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: ErrorBody = read_json(resp).await;
        assert_eq!(body.error, "payload_too_large");
        assert!(body.message.contains("64"));
    }

    #[tokio::test]
    async fn undecodable_image_is_bad_request() {
        let (app, _) = app_with(&[], 50);
        let body = format!("data:image/png;base64,{}", STANDARD.encode(b"definitely not a png"));
        let resp = app.oneshot(post_check(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = read_json(resp).await;
        assert_eq!(body.error, "invalid_image");
    }

    #[tokio::test]
    async fn checksum_failure_is_reported_precisely() {
        let (app, _) = app_with(&["C1001CA123456789A55C"], 50);
        let resp = app.oneshot(post_check(data_url())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorBody = read_json(resp).await;
        assert_eq!(body.error, "routing_number_checksum_invalid");
        assert!(body.message.contains("123456789"));
    }

    #[tokio::test]
    async fn no_line_is_distinct_from_parse_failures() {
        let (app, _) = app_with(&["short"], 50);
        let resp = app.oneshot(post_check(data_url())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorBody = read_json(resp).await;
        assert_eq!(body.error, "no_candidate_line_found");
    }

    #[tokio::test]
    async fn busy_engine_is_service_unavailable() {
        let (app, state) = app_with(&["A021000021A1234567890"], 20);
        let _held = state.pipeline.engines().checkout().await.unwrap();

        let resp = app.oneshot(post_check(data_url())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: ErrorBody = read_json(resp).await;
        assert_eq!(body.error, "engine_busy");
    }
}
