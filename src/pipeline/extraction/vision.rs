//! Vision-model OCR fallback via Ollama.

use std::sync::Arc;

use base64::Engine as _;

use super::ExtractionError;
use crate::ollama::{strip_code_fences, VisionClient};

/// Vision output carries no word-level scores; this fixed value slots it
/// between a failed classical run and a confident one.
pub const VISION_FALLBACK_CONFIDENCE: f32 = 0.6;

const VISION_PROMPT: &str = "You are an expert OCR system for Russian service documents.\n\
Analyze the image and extract the data into a structured format.\n\
\n\
Focus on:\n\
1. Service Act Number (АКТ по заявке №)\n\
2. Equipment Model (Модель аппарата)\n\
3. Serial Number (Серийный №)\n\
4. Counter readings (Счетчик страниц)\n\
5. COMPLETED WORKS (Выполненные работы) - list items with quantities\n\
6. Customer organization (Заказчик)\n\
\n\
Transcribe all visible text, maintaining the document layout.";

/// Wraps a [`VisionClient`] with the fixed prompt and base64 plumbing.
pub struct VisionEngine {
    client: Arc<dyn VisionClient>,
    model: String,
}

impl VisionEngine {
    pub fn new(client: Arc<dyn VisionClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the vision model to transcribe the page.
    pub fn extract_text(&self, image_png: &[u8]) -> Result<String, ExtractionError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_png);

        tracing::info!(model = %self.model, image_bytes = image_png.len(), "vision OCR request");
        let response = self
            .client
            .generate_with_image(&self.model, VISION_PROMPT, &encoded)?;

        Ok(strip_code_fences(&response).to_string())
    }
}
