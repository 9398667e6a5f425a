use std::future::Future;
use std::time::{Duration, Instant};

use image::DynamicImage;
use micr_core::{EncodingLineRecord, ParseError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::{EnginePool, PoolError};
use crate::extract::{self, ExtractionError};
use crate::preprocess::{self, PreprocessError};
use crate::recognizer::OcrBackend;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image could not be decoded: {0}")]
    Decode(PreprocessError),
    #[error("Image normalization failed: {0}")]
    Normalization(#[from] PreprocessError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("Encoding line rejected: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("Extraction did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Extraction worker failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Stable snake_case name of the failure, one per distinguishable cause.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Decode(_) => "invalid_image",
            PipelineError::Normalization(_) => "image_normalization_error",
            PipelineError::Extraction(ExtractionError::NoCandidateLineFound) => {
                "no_candidate_line_found"
            }
            PipelineError::Extraction(ExtractionError::Ocr(_)) => "ocr_engine_error",
            PipelineError::Parse(ParseError::RoutingNumberNotFound) => "routing_number_not_found",
            PipelineError::Parse(ParseError::RoutingNumberChecksumInvalid(_)) => {
                "routing_number_checksum_invalid"
            }
            PipelineError::Parse(ParseError::AccountNumberNotFound) => "account_number_not_found",
            PipelineError::Pool(PoolError::Busy(_)) => "engine_busy",
            PipelineError::Timeout(_) => "extraction_timeout",
            PipelineError::Pool(PoolError::Closed) | PipelineError::Worker(_) => "internal_error",
        }
    }
}

/// normalize → extract → parse, synchronously, with the caller's engine.
///
/// The parser only runs once a candidate line has been found.
pub fn run<R>(image: &DynamicImage, ocr: &mut R) -> Result<EncodingLineRecord, PipelineError>
where
    R: OcrBackend + ?Sized,
{
    let normalized = preprocess::normalize(image)?;
    let line = extract::extract_encoding_line(&normalized, ocr)?;
    debug!(line = %line, "candidate encoding line");
    Ok(micr_core::parse(&line)?)
}

/// Runs check images through the pipeline on blocking worker threads, one
/// pooled engine per run.
pub struct CheckPipeline<R> {
    engines: EnginePool<R>,
    request_timeout: Duration,
}

impl<R: OcrBackend + 'static> CheckPipeline<R> {
    pub fn new(engines: EnginePool<R>, request_timeout: Duration) -> Self {
        Self { engines, request_timeout }
    }

    pub fn engines(&self) -> &EnginePool<R> {
        &self.engines
    }

    /// Extract the encoding line from a decoded check image.
    ///
    /// The whole run, including the wait for an engine, is bounded by the
    /// request timeout. A run that overshoots keeps its engine until the OCR
    /// call returns, then hands it back to the pool.
    pub async fn process(&self, image: DynamicImage) -> Result<EncodingLineRecord, PipelineError> {
        self.bounded(self.extract_on_pool(image)).await
    }

    /// Like [`process`](Self::process), starting from encoded container bytes
    /// (PNG, JPEG, ...). Decoding runs on a blocking thread before an engine is
    /// checked out and counts against the same request timeout.
    pub async fn process_encoded(&self, bytes: Vec<u8>) -> Result<EncodingLineRecord, PipelineError> {
        self.bounded(async move {
            let image = tokio::task::spawn_blocking(move || preprocess::decode_image(&bytes))
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?
                .map_err(PipelineError::Decode)?;
            debug!(width = image.width(), height = image.height(), "image decoded");
            self.extract_on_pool(image).await
        })
        .await
    }

    async fn extract_on_pool(&self, image: DynamicImage) -> Result<EncodingLineRecord, PipelineError> {
        let mut engine = self.engines.checkout().await?;
        tokio::task::spawn_blocking(move || run(&image, &mut *engine))
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?
    }

    async fn bounded(
        &self,
        work: impl Future<Output = Result<EncodingLineRecord, PipelineError>>,
    ) -> Result<EncodingLineRecord, PipelineError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.request_timeout, work)
            .await
            .unwrap_or(Err(PipelineError::Timeout(self.request_timeout)));

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => debug!(elapsed_ms, "check processed"),
            Err(e) => warn!(kind = e.kind(), error = %e, elapsed_ms, "check extraction failed"),
        }
        result
    }
}
