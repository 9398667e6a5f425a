use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle reported by the OCR engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// One unit of recognized text at the requested granularity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizedWord {
    pub text: String,
    /// Engine confidence, 0–100.
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl RecognizedWord {
    pub fn new(text: impl Into<String>, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 100.0),
            bounding_box,
        }
    }
}

/// Page-iterator level the engine groups its results by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Word,
    Line,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Word => write!(f, "word"),
            Granularity::Line => write!(f, "line"),
        }
    }
}
