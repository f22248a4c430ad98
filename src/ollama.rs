//! HTTP client for a local Ollama instance.
//!
//! Both the vision OCR fallback and the text cleanup step talk to the same
//! `/api/generate` endpoint; they differ only in model, options and timeout.
//! The traits below are the seams the pipeline mocks in tests.

use serde::{Deserialize, Serialize};

/// Default Ollama instance address.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Vision inference is slow on CPU; give it five minutes.
pub const VISION_TIMEOUT_SECS: u64 = 300;

/// Text cleanup is a short prompt over at most 2000 characters.
pub const CLEANUP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("Ollama not reachable at {0}")]
    NotReachable(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("HTTP client error: {0}")]
    Http(String),
    #[error("Ollama returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Failed to parse Ollama response: {0}")]
    ResponseParsing(String),
}

/// Sampling options for /api/generate.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    pub num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerateOptions {
    /// Near-deterministic settings for vision OCR. The fixed seed keeps
    /// repeated runs over the same scan comparable.
    pub fn vision() -> Self {
        Self {
            temperature: 0.05,
            top_p: None,
            num_predict: 4096,
            seed: Some(42),
        }
    }

    /// Settings for OCR text correction.
    pub fn cleanup() -> Self {
        Self {
            temperature: 0.1,
            top_p: Some(0.9),
            num_predict: 2048,
            seed: None,
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    stream: bool,
    options: &'a GenerateOptions,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

/// Text-only generation (OCR cleanup).
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, OllamaError>;
}

/// Image-conditioned generation (vision OCR fallback).
pub trait VisionClient: Send + Sync {
    fn generate_with_image(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, OllamaError>;
}

/// Blocking Ollama HTTP client.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    /// Default instance at localhost:11434 with the vision timeout.
    pub fn default_local() -> Self {
        Self::new(DEFAULT_OLLAMA_URL, VISION_TIMEOUT_SECS)
    }

    fn generate_inner(
        &self,
        model: &str,
        prompt: &str,
        images: Option<Vec<String>>,
        options: &GenerateOptions,
    ) -> Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            images,
            stream: false,
            options,
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                OllamaError::NotReachable(self.base_url.clone())
            } else if e.is_timeout() {
                OllamaError::Timeout(self.timeout_secs)
            } else {
                OllamaError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OllamaError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| OllamaError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    /// Names of all models the instance has pulled.
    pub fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() {
                OllamaError::NotReachable(self.base_url.clone())
            } else {
                OllamaError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OllamaError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .map_err(|e| OllamaError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    pub fn is_model_available(&self, model: &str) -> Result<bool, OllamaError> {
        let models = self.list_models()?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }
}

impl LlmClient for OllamaClient {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, OllamaError> {
        self.generate_inner(model, prompt, None, &GenerateOptions::cleanup())
    }
}

impl VisionClient for OllamaClient {
    fn generate_with_image(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, OllamaError> {
        self.generate_inner(
            model,
            prompt,
            Some(vec![image_base64.to_string()]),
            &GenerateOptions::vision(),
        )
    }
}

/// Strip a markdown code fence if the model wrapped its answer in one.
/// Returns the inner text of the first fenced block, or the input unchanged.
pub fn strip_code_fences(text: &str) -> &str {
    if let Some(rest) = text.split_once("```json").map(|(_, r)| r) {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    if let Some(rest) = text.split_once("```").map(|(_, r)| r) {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    text.trim()
}

/// Mock LLM client for testing, with a configurable response or failure.
pub struct MockLlmClient {
    response: String,
    fail: bool,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            response: String::new(),
            fail: true,
        }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, _prompt: &str) -> Result<String, OllamaError> {
        if self.fail {
            return Err(OllamaError::NotReachable(DEFAULT_OLLAMA_URL.into()));
        }
        Ok(self.response.clone())
    }
}

/// Mock vision client for testing.
pub struct MockVisionClient {
    response: String,
    fail: bool,
}

impl MockVisionClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            response: String::new(),
            fail: true,
        }
    }
}

impl VisionClient for MockVisionClient {
    fn generate_with_image(
        &self,
        _model: &str,
        _prompt: &str,
        _image_base64: &str,
    ) -> Result<String, OllamaError> {
        if self.fail {
            return Err(OllamaError::Timeout(VISION_TIMEOUT_SECS));
        }
        Ok(self.response.clone())
    }
}
