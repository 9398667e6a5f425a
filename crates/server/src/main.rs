use anyhow::Context;
use micr_ocr::{CheckPipeline, EnginePool, OcrBackend};
use micr_server::{config::ServerConfig, platform, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load().context("loading configuration")?;
    telemetry::init(config.logging.format).context("installing tracing subscriber")?;

    let platform = platform::initialize(&config).context("platform initialization")?;
    info!(classifier = %platform.classifier(), "starting micr-server");

    let engines = build_engines(&config)?;
    info!(
        instances = engines.len(),
        language = %config.ocr.language,
        "OCR engines ready"
    );

    let pool = EnginePool::new(engines, config.ocr.acquire_timeout());
    let pipeline = CheckPipeline::new(pool, config.ocr.request_timeout());
    micr_server::serve(&config, pipeline).await
}

#[cfg(feature = "tesseract")]
fn build_engines(config: &ServerConfig) -> anyhow::Result<Vec<Box<dyn OcrBackend>>> {
    let data_path = config.ocr.tessdata_dir.to_string_lossy();
    (0..config.ocr.engine_instances)
        .map(|_| -> anyhow::Result<Box<dyn OcrBackend>> {
            let engine =
                micr_ocr::TesseractRecognizer::new(Some(data_path.as_ref()), &config.ocr.language)?;
            Ok(Box::new(engine) as Box<dyn OcrBackend>)
        })
        .collect()
}

#[cfg(not(feature = "tesseract"))]
fn build_engines(_config: &ServerConfig) -> anyhow::Result<Vec<Box<dyn OcrBackend>>> {
    Err(micr_ocr::OcrError::NotAvailable).context("micr-server was built without the `tesseract` feature")
}
