pub mod engine;
pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use engine::{EnginePool, PoolError, PooledEngine};
pub use extract::{extract_encoding_line, select_candidate, sort_words, ExtractionError};
pub use pipeline::{run, CheckPipeline, PipelineError};
pub use preprocess::{decode_image, normalize, PreprocessError};
pub use recognizer::{MockRecognizer, OcrBackend, OcrError, ScriptedRecognizer};
pub use types::{BoundingBox, Granularity, RecognizedWord};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
