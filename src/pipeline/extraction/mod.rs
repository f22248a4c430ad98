//! Text extraction: classical OCR, a vision-model fallback and the arbiter
//! that picks the best candidate.

pub mod arbiter;
pub mod ocr;
pub mod preprocess;
pub mod vision;

pub use arbiter::{TextArbiter, TextCandidate, CLASSICAL_CONFIDENCE_THRESHOLD};
pub use ocr::{MockOcrEngine, OcrEngine, OcrResult, PSM_MODES};
pub use vision::{VisionEngine, VISION_FALLBACK_CONFIDENCE};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("OCR engine initialization failed: {0}")]
    OcrInit(String),
    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),
    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),
    #[error("Vision model failure: {0}")]
    Vision(#[from] crate::ollama::OllamaError),
}
