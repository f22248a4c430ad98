//! Selects the best text candidate across OCR strategies.
//!
//! Strategy order: classical OCR on the normalized image, classical OCR on a
//! binarized variant, then the vision model if nothing confident came back.
//! Any engine failure is logged and skipped; the arbiter itself never fails,
//! an all-empty outcome is reported as an empty candidate.

use std::sync::Arc;

use image::RgbImage;

use super::ocr::{OcrEngine, OcrResult, PSM_MODES};
use super::preprocess;
use super::vision::{VisionEngine, VISION_FALLBACK_CONFIDENCE};

/// A classical run above this mean word confidence is trusted enough to skip
/// the vision model.
pub const CLASSICAL_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// One extraction outcome with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct TextCandidate {
    pub text: String,
    pub confidence: f32,
    pub source: &'static str,
}

impl TextCandidate {
    fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            source: "none",
        }
    }
}

pub struct TextArbiter {
    ocr: Option<Arc<dyn OcrEngine>>,
    vision: Option<VisionEngine>,
    confidence_threshold: f32,
    binarized_variant: bool,
}

impl TextArbiter {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>, vision: Option<VisionEngine>) -> Self {
        Self {
            ocr,
            vision,
            confidence_threshold: CLASSICAL_CONFIDENCE_THRESHOLD,
            binarized_variant: true,
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_binarized_variant(mut self, enabled: bool) -> Self {
        self.binarized_variant = enabled;
        self
    }

    /// Run all configured engines and pick the winner.
    pub fn extract(&self, image: &RgbImage) -> TextCandidate {
        let mut candidates = Vec::new();

        if let Some(engine) = &self.ocr {
            match preprocess::encode_png(image) {
                Ok(png) => {
                    if let Some(c) = self.best_classical_run(engine.as_ref(), &png, "classical_original") {
                        candidates.push(c);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode image for OCR"),
            }

            if self.binarized_variant {
                let binary = preprocess::binarize_for_ocr(image);
                match preprocess::encode_gray_png(&binary) {
                    Ok(png) => {
                        if let Some(c) =
                            self.best_classical_run(engine.as_ref(), &png, "classical_binarized")
                        {
                            candidates.push(c);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to encode binarized variant"),
                }
            }
        }

        let confident = candidates
            .iter()
            .any(|c| c.confidence > self.confidence_threshold);
        if !confident {
            if let Some(vision) = &self.vision {
                self.try_vision(vision, image, &mut candidates);
            }
        }

        let winner = select(candidates);
        tracing::info!(
            source = winner.source,
            confidence = winner.confidence,
            chars = winner.text.chars().count(),
            "text candidate selected"
        );
        winner
    }

    /// Best mean-confidence run across segmentation modes for one variant.
    fn best_classical_run(
        &self,
        engine: &dyn OcrEngine,
        png: &[u8],
        source: &'static str,
    ) -> Option<TextCandidate> {
        let mut best: Option<OcrResult> = None;
        for &psm in PSM_MODES {
            match engine.recognize(png, psm) {
                Ok(run) => {
                    if best.as_ref().map_or(true, |b| run.confidence > b.confidence) {
                        best = Some(run);
                    }
                }
                Err(e) => {
                    tracing::warn!(psm, source, error = %e, "OCR run failed, skipping mode");
                }
            }
        }
        best.filter(|r| !r.text.trim().is_empty())
            .map(|r| TextCandidate {
                text: r.text,
                confidence: r.confidence,
                source,
            })
    }

    fn try_vision(&self, vision: &VisionEngine, image: &RgbImage, out: &mut Vec<TextCandidate>) {
        let png = match preprocess::encode_png(image) {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode image for vision OCR");
                return;
            }
        };
        match vision.extract_text(&png) {
            Ok(text) if !text.trim().is_empty() => out.push(TextCandidate {
                text,
                confidence: VISION_FALLBACK_CONFIDENCE,
                source: "vision",
            }),
            Ok(_) => tracing::warn!("vision OCR returned empty text"),
            Err(e) => tracing::warn!(error = %e, "vision OCR failed, skipping"),
        }
    }
}

/// Max by (confidence, text length); the first candidate wins exact ties.
fn select(candidates: Vec<TextCandidate>) -> TextCandidate {
    let mut winner: Option<TextCandidate> = None;
    for candidate in candidates {
        let better = match &winner {
            None => true,
            Some(current) => {
                candidate.confidence > current.confidence
                    || (candidate.confidence == current.confidence
                        && candidate.text.chars().count() > current.text.chars().count())
            }
        };
        if better {
            winner = Some(candidate);
        }
    }
    winner.unwrap_or_else(TextCandidate::empty)
}
