use std::collections::VecDeque;

use image::GrayImage;
use thiserror::Error;

use crate::types::{Granularity, RecognizedWord};

#[derive(Debug, Clone, Error)]
pub enum OcrError {
    #[error("Image encode error: {0}")]
    ImageEncode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available: build with the `tesseract` feature")]
    NotAvailable,
}

/// Abstraction over an OCR backend.
///
/// Engines behind this trait are stateful and not reentrant, so recognition
/// takes `&mut self`: whoever holds the instance has it exclusively for the
/// duration of the call.
pub trait OcrBackend: Send {
    fn recognize_words(
        &mut self,
        image: &GrayImage,
        granularity: Granularity,
    ) -> Result<Vec<RecognizedWord>, OcrError>;
}

impl<R: OcrBackend + ?Sized> OcrBackend for Box<R> {
    fn recognize_words(
        &mut self,
        image: &GrayImage,
        granularity: Granularity,
    ) -> Result<Vec<RecognizedWord>, OcrError> {
        (**self).recognize_words(image, granularity)
    }
}

// ── Mock backends (always available, used for tests) ──────────────────────────

/// Returns the same pre-set words on every call.
#[derive(Debug, Clone, Default)]
pub struct MockRecognizer {
    pub words: Vec<RecognizedWord>,
    pub calls: usize,
}

impl MockRecognizer {
    pub fn new(words: Vec<RecognizedWord>) -> Self {
        Self { words, calls: 0 }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize_words(
        &mut self,
        _image: &GrayImage,
        _granularity: Granularity,
    ) -> Result<Vec<RecognizedWord>, OcrError> {
        self.calls += 1;
        Ok(self.words.clone())
    }
}

/// Answers each call with the next queued response and keeps every image it
/// was shown. Once the script runs out it reports no words.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    responses: VecDeque<Result<Vec<RecognizedWord>, OcrError>>,
    pub seen: Vec<GrayImage>,
}

impl ScriptedRecognizer {
    pub fn new(responses: impl IntoIterator<Item = Result<Vec<RecognizedWord>, OcrError>>) -> Self {
        Self { responses: responses.into_iter().collect(), seen: Vec::new() }
    }

    pub fn calls(&self) -> usize {
        self.seen.len()
    }
}

impl OcrBackend for ScriptedRecognizer {
    fn recognize_words(
        &mut self,
        image: &GrayImage,
        _granularity: Granularity,
    ) -> Result<Vec<RecognizedWord>, OcrError> {
        self.seen.push(image.clone());
        self.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use crate::preprocess::encode_as_png;
    use crate::types::{BoundingBox, Granularity, RecognizedWord};
    use image::GrayImage;
    use leptess::{LepTess, Variable};

    /// Fully automatic page segmentation with orientation and script detection.
    const PSM_AUTO_OSD: &str = "1";

    /// Tesseract configured for one language data set.
    ///
    /// Construction checks that the language loads; each recognition then
    /// works on its own `LepTess` handle, which never leaves the calling thread.
    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<&str>, lang: &str) -> Result<Self, OcrError> {
            let recognizer = Self {
                data_path: data_path.map(str::to_string),
                lang: lang.to_string(),
            };
            recognizer.engine()?;
            Ok(recognizer)
        }

        fn engine(&self) -> Result<LepTess, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang).map_err(|e| {
                OcrError::Engine(format!(
                    "Failed to initialize Tesseract with language '{}': {e}",
                    self.lang
                ))
            })?;
            lt.set_variable(Variable::TesseditPagesegMode, PSM_AUTO_OSD)
                .map_err(|e| OcrError::Engine(format!("Failed to set PSM: {e}")))?;
            Ok(lt)
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize_words(
            &mut self,
            image: &GrayImage,
            granularity: Granularity,
        ) -> Result<Vec<RecognizedWord>, OcrError> {
            let png = encode_as_png(image).map_err(|e| OcrError::ImageEncode(e.to_string()))?;
            let mut lt = self.engine()?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::ImageEncode(e.to_string()))?;

            let level = match granularity {
                Granularity::Word => leptess::capi::TessPageIteratorLevel_RIL_WORD,
                Granularity::Line => leptess::capi::TessPageIteratorLevel_RIL_TEXTLINE,
            };
            // No boxes means a blank page, not an engine failure.
            let Some(boxes) = lt.get_component_boxes(level, true) else {
                return Ok(Vec::new());
            };

            let mut words = Vec::new();
            for bbox in &boxes {
                let g = bbox.get_geometry();
                lt.set_rectangle(g.x, g.y, g.w, g.h);
                let text = lt
                    .get_utf8_text()
                    .map_err(|e| OcrError::Engine(e.to_string()))?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                words.push(RecognizedWord::new(
                    text,
                    lt.mean_text_conf() as f32,
                    BoundingBox::new(
                        g.x.max(0) as u32,
                        g.y.max(0) as u32,
                        g.w.max(0) as u32,
                        g.h.max(0) as u32,
                    ),
                ));
            }
            Ok(words)
        }
    }
}
