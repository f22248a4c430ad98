use std::path::PathBuf;

use crate::ollama::DEFAULT_OLLAMA_URL;

/// Application-level constants
pub const APP_NAME: &str = "actcheck";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hard cap on request bodies; scans above this are rejected at the HTTP layer.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Raster formats the pipeline accepts.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "tif"];

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Base URL of the Ollama instance used for vision OCR and text cleanup.
    pub ollama_url: String,
    /// Vision model for the OCR fallback.
    pub vision_model: String,
    /// Text model for OCR error correction.
    pub cleanup_model: String,
    /// Whether to send extracted text through the LLM cleanup step.
    pub llm_cleanup: bool,
    /// Whether to fall back to the vision model on low-confidence OCR.
    pub vision_fallback: bool,
    /// Whether to also run classical OCR on a binarized/sharpened variant.
    pub preprocess_variant: bool,
    /// Tessdata directory override for the classical engine.
    pub tessdata_dir: Option<String>,
    /// Root directory for persisted results.
    pub data_dir: PathBuf,
    /// Treat a missing nomenclature as a blocking error.
    pub require_nomenclature: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("ACTCHECK_BIND", "0.0.0.0:3000"),
            ollama_url: env_or("ACTCHECK_OLLAMA_URL", DEFAULT_OLLAMA_URL),
            vision_model: env_or("ACTCHECK_VISION_MODEL", "llava:7b"),
            cleanup_model: env_or("ACTCHECK_CLEANUP_MODEL", "mistral:7b-instruct-v0.2-q4_K_M"),
            llm_cleanup: env_flag("ACTCHECK_LLM_CLEANUP", true),
            vision_fallback: env_flag("ACTCHECK_VISION_FALLBACK", true),
            preprocess_variant: env_flag("ACTCHECK_PREPROCESS_VARIANT", true),
            tessdata_dir: std::env::var("ACTCHECK_TESSDATA").ok(),
            data_dir: std::env::var("ACTCHECK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),
            require_nomenclature: env_flag("ACTCHECK_REQUIRE_NOMENCLATURE", false),
        }
    }

    /// Directory holding one JSON file per processed document.
    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// ~/actcheck/ (user-visible)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
