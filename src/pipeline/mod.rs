//! Document processing pipeline.
//!
//! Stages: decode, geometry normalization, text extraction and marker
//! detection, text cleanup, field extraction, validation. Only an
//! undecodable image is fatal; every later stage degrades and the document
//! still produces a record, possibly a REJECTED one.

pub mod cleanup;
pub mod extraction;
pub mod fields;
pub mod geometry;
pub mod markers;
pub mod validation;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::ollama::{LlmClient, OllamaClient, VisionClient, CLEANUP_TIMEOUT_SECS, VISION_TIMEOUT_SECS};
use extraction::ocr::OcrEngine;
use extraction::vision::VisionEngine;
use extraction::TextArbiter;
use fields::DocumentType;
use markers::MarkerConfig;
use validation::{ValidationReport, ValidationRules};

/// Persisted records keep this much text as a preview.
pub const TEXT_PREVIEW_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),
}

/// Everything extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub claim_number: Option<String>,
    pub equipment_model: Option<String>,
    pub cartridge_model: Option<String>,
    pub nomenclature: Option<String>,
    pub customer_name: Option<String>,
    pub work_type: Option<String>,
    pub service_date: Option<String>,
    pub page_count: Option<u32>,
    pub quantity: u32,
    pub has_signature: bool,
    pub has_stamp: bool,
    pub text_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub engine: String,
    pub model: String,
}

/// The persisted result of processing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub timestamp: DateTime<Utc>,
    pub filename: String,
    pub processing_time_seconds: f64,
    pub document_type: DocumentType,
    pub extracted_data: ExtractedData,
    pub validation: ValidationReport,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub confidence_threshold: f32,
    pub binarized_variant: bool,
    pub marker_config: MarkerConfig,
    pub rules: ValidationRules,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: extraction::CLASSICAL_CONFIDENCE_THRESHOLD,
            binarized_variant: true,
            marker_config: MarkerConfig::default(),
            rules: ValidationRules::default(),
        }
    }
}

pub struct DocumentPipeline {
    arbiter: TextArbiter,
    llm: Option<(Arc<dyn LlmClient>, String)>,
    marker_config: MarkerConfig,
    rules: ValidationRules,
    metadata: RecordMetadata,
}

impl DocumentPipeline {
    pub fn new(
        ocr: Option<Arc<dyn OcrEngine>>,
        vision: Option<VisionEngine>,
        llm: Option<(Arc<dyn LlmClient>, String)>,
        options: PipelineOptions,
    ) -> Self {
        let engine = match (&ocr, &vision) {
            (Some(_), Some(_)) => "hybrid",
            (Some(_), None) => "classical",
            (None, Some(_)) => "vision",
            (None, None) => "none",
        };
        let model = vision
            .as_ref()
            .map(|v| v.model().to_string())
            .or_else(|| llm.as_ref().map(|(_, m)| m.clone()))
            .unwrap_or_default();

        Self {
            arbiter: TextArbiter::new(ocr, vision)
                .with_confidence_threshold(options.confidence_threshold)
                .with_binarized_variant(options.binarized_variant),
            llm,
            marker_config: options.marker_config,
            rules: options.rules,
            metadata: RecordMetadata {
                engine: engine.to_string(),
                model,
            },
        }
    }

    /// Wire up real engines from the runtime configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let vision = if config.vision_fallback {
            let client: Arc<dyn VisionClient> =
                Arc::new(OllamaClient::new(&config.ollama_url, VISION_TIMEOUT_SECS));
            Some(VisionEngine::new(client, &config.vision_model))
        } else {
            None
        };

        let llm: Option<(Arc<dyn LlmClient>, String)> = if config.llm_cleanup {
            let client: Arc<dyn LlmClient> =
                Arc::new(OllamaClient::new(&config.ollama_url, CLEANUP_TIMEOUT_SECS));
            Some((client, config.cleanup_model.clone()))
        } else {
            None
        };

        let options = PipelineOptions {
            binarized_variant: config.preprocess_variant,
            rules: ValidationRules {
                require_nomenclature: config.require_nomenclature,
            },
            ..PipelineOptions::default()
        };

        Self::new(classical_engine(config), vision, llm, options)
    }

    /// Process one document image end to end.
    pub fn process(
        &self,
        bytes: &[u8],
        filename: &str,
        expected_claim: Option<&str>,
    ) -> Result<DocumentRecord, PipelineError> {
        let started = std::time::Instant::now();
        tracing::info!(filename, bytes = bytes.len(), "processing document");

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PipelineError::ImageDecode(e.to_string()))?
            .to_rgb8();

        let normalized = geometry::normalize(&decoded);

        let candidate = self.arbiter.extract(&normalized);
        let detected = markers::detect(&normalized, &self.marker_config);

        let text = cleanup::normalize_text(
            &candidate.text,
            self.llm
                .as_ref()
                .map(|(client, model)| (client.as_ref(), model.as_str())),
        );

        let extracted_fields = fields::extract(&text);
        let document_type = fields::classify(&text);

        let extracted_data = ExtractedData {
            claim_number: extracted_fields.claim_number,
            equipment_model: extracted_fields.equipment_model,
            cartridge_model: extracted_fields.cartridge_model,
            nomenclature: extracted_fields.nomenclature,
            customer_name: extracted_fields.customer_name,
            work_type: extracted_fields.work_type,
            service_date: extracted_fields.service_date,
            page_count: extracted_fields.page_count,
            quantity: extracted_fields.quantity,
            has_signature: detected.has_signature,
            has_stamp: detected.has_stamp,
            text_preview: preview(&text),
        };

        let report = validation::check(&extracted_data, expected_claim, &self.rules);

        let record = DocumentRecord {
            timestamp: Utc::now(),
            filename: filename.to_string(),
            processing_time_seconds: started.elapsed().as_secs_f64(),
            document_type,
            extracted_data,
            validation: report,
            metadata: self.metadata.clone(),
        };

        tracing::info!(
            filename,
            status = ?record.validation.status,
            claim = record.extracted_data.claim_number.as_deref().unwrap_or("-"),
            elapsed_s = record.processing_time_seconds,
            "document processed"
        );

        Ok(record)
    }
}

fn classical_engine(config: &AppConfig) -> Option<Arc<dyn OcrEngine>> {
    #[cfg(feature = "ocr")]
    {
        return Some(Arc::new(extraction::ocr::TesseractEngine::new(
            config.tessdata_dir.clone(),
        )));
    }
    #[cfg(not(feature = "ocr"))]
    {
        let _ = config;
        tracing::warn!("built without the `ocr` feature; classical OCR disabled");
        None
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(TEXT_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
