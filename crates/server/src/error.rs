use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use micr_ocr::PipelineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload::PayloadError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),
    #[error("Request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// JSON body of every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "invalid_payload",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::Pipeline(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Pipeline(e) => match e {
                PipelineError::Decode(_) => StatusCode::BAD_REQUEST,
                PipelineError::Normalization(_)
                | PipelineError::Extraction(micr_ocr::ExtractionError::NoCandidateLineFound)
                | PipelineError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::Pool(micr_ocr::PoolError::Busy(_)) => StatusCode::SERVICE_UNAVAILABLE,
                PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                PipelineError::Extraction(micr_ocr::ExtractionError::Ocr(_))
                | PipelineError::Pool(micr_ocr::PoolError::Closed)
                | PipelineError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
