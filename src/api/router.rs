//! HTTP API router.
//!
//! Returns a composable `Router`; handlers hand the blocking pipeline off to
//! `spawn_blocking` so the runtime stays responsive during OCR.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::error::ApiError;
use crate::api::types::{
    BatchItem, BatchResponse, HealthResponse, HistoryResponse, UploadResponse,
};
use crate::config::{AppConfig, ALLOWED_EXTENSIONS, MAX_UPLOAD_BYTES};
use crate::ollama::OllamaClient;
use crate::pipeline::{DocumentPipeline, DocumentRecord};
use crate::store::{ResultStore, StoreError};

/// Probing Ollama for /health should not hang the endpoint.
const HEALTH_PROBE_TIMEOUT_SECS: u64 = 5;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DocumentPipeline>,
    pub store: Arc<ResultStore>,
    pub ollama: Arc<OllamaClient>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        Ok(Self {
            pipeline: Arc::new(DocumentPipeline::from_config(config)),
            store: Arc::new(ResultStore::open(config.results_dir())?),
            ollama: Arc::new(OllamaClient::new(
                &config.ollama_url,
                HEALTH_PROBE_TIMEOUT_SECS,
            )),
        })
    }
}

/// Build the document-checking API router.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/api/check", post(check))
        .route("/batch", post(batch))
        .route("/result/:id", get(result))
        .route("/history", get(history))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// One uploaded file plus the form fields that came with it.
struct UploadForm {
    filename: String,
    bytes: Vec<u8>,
    expected_claim: Option<String>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut expected_claim = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("File part has no filename".into()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("expected_claim") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                if !value.trim().is_empty() {
                    expected_claim = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| ApiError::BadRequest("No file provided".into()))?;
    check_extension(&filename)?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }

    Ok(UploadForm {
        filename,
        bytes,
        expected_claim,
    })
}

fn check_extension(filename: &str) -> Result<(), ApiError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match ext {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ApiError::UnsupportedMediaType(format!(
            "Allowed file types: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ))),
    }
}

async fn run_pipeline(
    pipeline: Arc<DocumentPipeline>,
    form: UploadForm,
) -> Result<DocumentRecord, ApiError> {
    let outcome = tokio::task::spawn_blocking(move || {
        pipeline.process(&form.bytes, &form.filename, form.expected_claim.as_deref())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Processing task failed: {e}")))?;
    Ok(outcome?)
}

/// Process a document and persist the result.
async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form = read_upload_form(multipart).await?;
    let original_name = form.filename.clone();

    let record = run_pipeline(state.pipeline.clone(), form).await?;
    let file_id = state.store.save(&record)?;

    Ok(Json(UploadResponse {
        success: true,
        file_id,
        original_name,
        result: record,
    }))
}

/// Process a document without persisting anything.
async fn check(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DocumentRecord>, ApiError> {
    let form = read_upload_form(multipart).await?;
    let record = run_pipeline(state.pipeline.clone(), form).await?;
    Ok(Json(record))
}

/// Process several documents; per-file failures land in the item, not the
/// response status.
async fn batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchResponse>, ApiError> {
    let mut results = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "unnamed".to_string());
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                results.push(BatchItem {
                    filename,
                    result: None,
                    error: Some(format!("Failed to read file: {e}")),
                });
                continue;
            }
        };

        let item = match check_extension(&filename) {
            Err(e) => BatchItem {
                filename,
                result: None,
                error: Some(e.to_string()),
            },
            Ok(()) => {
                let form = UploadForm {
                    filename: filename.clone(),
                    bytes,
                    expected_claim: None,
                };
                match run_pipeline(state.pipeline.clone(), form).await {
                    Ok(record) => {
                        state.store.save(&record)?;
                        BatchItem {
                            filename,
                            result: Some(record),
                            error: None,
                        }
                    }
                    Err(e) => BatchItem {
                        filename,
                        result: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        };
        results.push(item);
    }

    if results.is_empty() {
        return Err(ApiError::BadRequest("No files provided".into()));
    }
    let processed = results.iter().filter(|r| r.result.is_some()).count();
    Ok(Json(BatchResponse {
        success: true,
        processed,
        results,
    }))
}

/// Fetch a previously persisted result.
async fn result(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<DocumentRecord>, ApiError> {
    match state.store.load(&id)? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::NotFound(format!("No result with id {id}"))),
    }
}

/// Processing history, newest first.
async fn history(State(state): State<AppState>) -> Result<Json<HistoryResponse>, ApiError> {
    Ok(Json(HistoryResponse {
        history: state.store.history()?,
    }))
}

/// Liveness plus an Ollama reachability probe.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let client = state.ollama.clone();
    let ollama_available = tokio::task::spawn_blocking(move || client.list_models().is_ok())
        .await
        .unwrap_or(false);

    Json(HealthResponse {
        status: if ollama_available { "ok" } else { "degraded" }.to_string(),
        ollama_available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use image::{Rgb, RgbImage};
    use tower::ServiceExt;

    use crate::pipeline::extraction::ocr::{MockOcrEngine, OcrEngine};
    use crate::pipeline::extraction::preprocess::encode_png;
    use crate::pipeline::PipelineOptions;

    const ACT_TEXT: &str = "АКТ выполненных работ по заявке № 1847896\n\
        Оборудование: HP LaserJet M1132\n\
        Выполнена замена картриджа CE285A";

    fn test_state(tmp: &tempfile::TempDir) -> AppState {
        let ocr: Arc<dyn OcrEngine> = Arc::new(MockOcrEngine::new(ACT_TEXT, 0.9));
        let pipeline = DocumentPipeline::new(
            Some(ocr),
            None,
            None,
            PipelineOptions {
                binarized_variant: false,
                ..PipelineOptions::default()
            },
        );
        AppState {
            pipeline: Arc::new(pipeline),
            store: Arc::new(ResultStore::open(tmp.path().join("results")).unwrap()),
            // Discard port; the probe fails fast with connection refused.
            // Built on a separate thread: reqwest's blocking client cannot be
            // constructed inside the tokio test runtime.
            ollama: Arc::new(
                std::thread::spawn(|| OllamaClient::new("http://127.0.0.1:9", 1))
                    .join()
                    .unwrap(),
            ),
        }
    }

    fn png_bytes() -> Vec<u8> {
        let page = RgbImage::from_pixel(64, 64, Rgb([255, 255, 255]));
        encode_png(&page).unwrap()
    }

    const BOUNDARY: &str = "actcheck-test-boundary";

    fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, filename, bytes) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn response_json(response: axum::http::Response<Body>) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn upload_processes_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(&tmp);
        let app = api_router(state.clone());

        let png = png_bytes();
        let req = multipart_request(
            "/upload",
            &[
                ("file", Some("act.png"), &png),
                ("expected_claim", None, b"1847896"),
            ],
        );
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["original_name"], "act.png");
        let file_id = json["file_id"].as_str().unwrap();
        assert!(!file_id.is_empty());
        assert_eq!(
            json["result"]["extracted_data"]["claim_number"],
            "1847896"
        );

        // Persisted record is retrievable
        let app = api_router(state);
        let req = Request::builder()
            .uri(format!("/result/{file_id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn upload_without_file_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let app = api_router(test_state(&tmp));

        let req = multipart_request("/upload", &[("expected_claim", None, b"1847896")]);
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = response_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn upload_rejects_unknown_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let app = api_router(test_state(&tmp));

        let req = multipart_request("/upload", &[("file", Some("act.pdf"), b"%PDF-1.4")]);
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn upload_rejects_undecodable_image() {
        let tmp = tempfile::tempdir().unwrap();
        let app = api_router(test_state(&tmp));

        let req = multipart_request("/upload", &[("file", Some("act.png"), b"not a png")]);
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn check_does_not_persist() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(&tmp);

        let png = png_bytes();
        let req = multipart_request("/api/check", &[("file", Some("act.png"), &png)]);
        let response = api_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["document_type"], "service_act");

        assert!(state.store.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_reports_per_file_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let app = api_router(test_state(&tmp));

        let png = png_bytes();
        let req = multipart_request(
            "/batch",
            &[
                ("files", Some("good.png"), &png),
                ("files", Some("broken.png"), b"garbage"),
            ],
        );
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["processed"], 1);
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0]["result"].is_object());
        assert!(results[0].get("error").is_none());
        assert!(results[1]["error"].is_string());
    }

    #[tokio::test]
    async fn batch_without_files_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let app = api_router(test_state(&tmp));

        let req = multipart_request("/batch", &[("other", None, b"x")]);
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn result_with_malformed_id_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let app = api_router(test_state(&tmp));

        let req = Request::builder()
            .uri("/result/not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn result_with_unknown_id_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let app = api_router(test_state(&tmp));

        let id = uuid::Uuid::new_v4();
        let req = Request::builder()
            .uri(format!("/result/{id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_lists_uploads() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(&tmp);

        let png = png_bytes();
        let req = multipart_request("/upload", &[("file", Some("act.png"), &png)]);
        api_router(state.clone()).oneshot(req).await.unwrap();

        let req = Request::builder()
            .uri("/history")
            .body(Body::empty())
            .unwrap();
        let response = api_router(state).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        let history = json["history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["claim_number"], "1847896");
    }

    #[tokio::test]
    async fn health_reports_unreachable_ollama() {
        let tmp = tempfile::tempdir().unwrap();
        let app = api_router(test_state(&tmp));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["ollama_available"], false);
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(check_extension("scan.PNG").is_ok());
        assert!(check_extension("scan.tiff").is_ok());
        assert!(check_extension("scan.pdf").is_err());
        assert!(check_extension("no_extension").is_err());
    }
}
