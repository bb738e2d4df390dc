// HTTP surface: catalog lookup, job submission, status polling, file delivery

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mime_guess::MimeGuess;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::downloader::tools::ToolInfo;
use crate::downloader::utils::{format_length, format_thousands};
use crate::downloader::{
    build_quality_options, DownloadError, DownloadQueue, JobStatus, JobStore, QualityOption,
    StreamCatalog,
};

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobStore,
    pub queue: DownloadQueue,
    pub catalog: Arc<dyn StreamCatalog>,
    pub download_dir: Arc<PathBuf>,
    pub max_file_age: Duration,
    /// Probed once at startup
    pub tools: Arc<Vec<ToolInfo>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        let status = match err {
            DownloadError::InvalidRequest(_)
            | DownloadError::NoMatchingStream(_)
            | DownloadError::FetchFailure(_)
            | DownloadError::ParseError(_) => StatusCode::BAD_REQUEST,
            DownloadError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
            "success": false,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    quality: Option<String>,
}

impl UrlRequest {
    fn url(&self) -> ApiResult<&str> {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(ApiError::bad_request("URL is required")),
        }
    }
}

#[derive(Debug, Serialize)]
struct InfoResponse {
    title: String,
    author: String,
    length: String,
    views: String,
    thumbnail: String,
    qualities: Vec<QualityOption>,
    success: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/info", post(get_info))
        .route("/get_info", post(get_info))
        .route("/download", post(start_download))
        .route("/status/{job_id}", get(get_status))
        .route("/file/{filename}", get(download_file))
        .route("/download_file/{filename}", get(download_file))
        .route("/cleanup", post(cleanup))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", err);
    }
}

fn parse_body(body: Result<Json<UrlRequest>, JsonRejection>) -> ApiResult<UrlRequest> {
    body.map(|Json(request)| request)
        .map_err(|_| ApiError::bad_request("URL is required"))
}

async fn get_info(
    State(state): State<AppState>,
    body: Result<Json<UrlRequest>, JsonRejection>,
) -> ApiResult<Json<InfoResponse>> {
    let request = parse_body(body)?;
    let url = request.url()?;

    let catalog = state.catalog.fetch_catalog(url).await.map_err(|e| {
        warn!(url, "catalog lookup failed: {}", e);
        ApiError::from(e)
    })?;

    Ok(Json(InfoResponse {
        length: format_length(catalog.length_seconds),
        views: format_thousands(catalog.views),
        qualities: build_quality_options(&catalog),
        title: catalog.title,
        author: catalog.author,
        thumbnail: catalog.thumbnail_url,
        success: true,
    }))
}

async fn start_download(
    State(state): State<AppState>,
    body: Result<Json<UrlRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let request = parse_body(body)?;
    let url = request.url()?;
    let quality = request.quality.as_deref().unwrap_or("highest");

    let job_id = state.queue.submit(url, quality);
    info!(job_id = %job_id, url, quality, "download queued");

    let body = json!({
        "job_id": job_id,
        "message": "Download started",
        "success": true,
    });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job = state
        .jobs
        .get(&job_id)
        .ok_or_else(|| ApiError::not_found("Download not found"))?;

    let download_url = match (&job.status, &job.filename) {
        (JobStatus::Completed, Some(filename)) => Some(format!("/file/{}", filename)),
        _ => None,
    };

    let mut value =
        serde_json::to_value(&job).map_err(|err| ApiError::internal(err.to_string()))?;
    if let (Some(url), Some(map)) = (download_url, value.as_object_mut()) {
        map.insert("download_url".to_string(), json!(url));
    }
    Ok(Json(value))
}

async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    ensure_safe_path_segment(&filename)?;
    let path = state.download_dir.join(&filename);

    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;
    if !metadata.is_file() {
        return Err(ApiError::not_found("File not found"));
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type_for(&filename));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    let disposition = format!("attachment; filename=\"{}\"", download_name(&filename));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

async fn cleanup(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let jobs = state.jobs.clone();
    let dir = Arc::clone(&state.download_dir);
    let max_age = state.max_file_age;

    let report = tokio::task::spawn_blocking(move || jobs.sweep(&dir, max_age))
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?
        .map_err(|err| ApiError::internal(err.to_string()))?;

    Ok(Json(json!({
        "message": format!("Cleaned up {} old files", report.deleted_files.len()),
        "deleted_files": report.deleted_files,
        "pruned_jobs": report.pruned_jobs,
        "success": true,
    })))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "jobs": state.jobs.len(),
        "tools": state.tools.as_slice(),
    }))
}

/// A single path segment that cannot leave the download directory
fn ensure_safe_path_segment(value: &str) -> ApiResult<()> {
    let mut components = std::path::Path::new(value).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if value.is_empty() || !single_normal || value.contains('\\') {
        return Err(ApiError::not_found("File not found"));
    }
    Ok(())
}

fn content_type_for(filename: &str) -> HeaderValue {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let known = match ext.as_deref() {
        Some("mp4") => Some("video/mp4"),
        Some("webm") => Some("video/webm"),
        Some("mp3") => Some("audio/mpeg"),
        Some("m4a") => Some("audio/mp4"),
        _ => None,
    };
    if let Some(mime) = known {
        return HeaderValue::from_static(mime);
    }

    MimeGuess::from_path(filename)
        .first()
        .and_then(|mime| HeaderValue::from_str(mime.as_ref()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"))
}

/// Client-facing name: the stored name without its job id prefix
fn download_name(filename: &str) -> String {
    let name = match filename.split_once('_') {
        Some((_, rest)) if !rest.is_empty() => rest,
        _ => filename,
    };
    name.replace('"', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::{StreamDescriptor, StreamKind};
    use crate::downloader::testing::{FakeCatalog, FakeMuxer};
    use crate::downloader::Orchestrator;

    fn streams() -> Vec<StreamDescriptor> {
        vec![
            StreamDescriptor::new("18", StreamKind::Video, Some("360p".to_string()), Some("96kbps".to_string()), "mp4", Some(3 * 1024 * 1024), true),
            StreamDescriptor::new("137", StreamKind::Video, Some("1080p".to_string()), None, "mp4", Some(50 * 1024 * 1024), false),
            StreamDescriptor::new("140", StreamKind::Audio, None, Some("128kbps".to_string()), "m4a", Some(5 * 1024 * 1024), false),
        ]
    }

    fn state_with(catalog: FakeCatalog, dir: &std::path::Path) -> AppState {
        let jobs = JobStore::new();
        let catalog: Arc<dyn StreamCatalog> = Arc::new(catalog);
        let orchestrator = Orchestrator::new(
            Arc::clone(&catalog),
            Arc::new(FakeMuxer::succeeding()),
            jobs.clone(),
            dir.to_path_buf(),
        );
        AppState {
            queue: DownloadQueue::new(Arc::new(orchestrator), 2),
            jobs,
            catalog,
            download_dir: Arc::new(dir.to_path_buf()),
            max_file_age: Duration::from_secs(24 * 3600),
            tools: Arc::new(Vec::new()),
        }
    }

    fn body(url: Option<&str>, quality: Option<&str>) -> Result<Json<UrlRequest>, JsonRejection> {
        Ok(Json(UrlRequest {
            url: url.map(str::to_string),
            quality: quality.map(str::to_string),
        }))
    }

    async fn read_json(response: Response) -> (StatusCode, serde_json::Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_info_returns_formatted_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(FakeCatalog::new(streams()), dir.path());

        let response = get_info(State(state), body(Some("https://youtu.be/x"), None))
            .await
            .into_response();
        let (status, json) = read_json(response).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["title"], "Fake Video");
        assert_eq!(json["length"], "4:05");
        assert_eq!(json["views"], "1,234,567");
        let qualities = json["qualities"].as_array().unwrap();
        assert_eq!(qualities.first().unwrap()["value"], "highest");
        assert_eq!(qualities.last().unwrap()["value"], "lowest");
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(FakeCatalog::new(streams()), dir.path());

        let response = get_info(State(state.clone()), body(Some("  "), None))
            .await
            .into_response();
        let (status, json) = read_json(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "URL is required");
        assert_eq!(json["success"], false);

        let response = start_download(State(state.clone()), body(None, Some("720p")))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_info_extraction_failure_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(FakeCatalog::unavailable(), dir.path());

        let response = get_info(State(state), body(Some("https://youtu.be/gone"), None))
            .await
            .into_response();
        let (status, json) = read_json(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Video unavailable"));
    }

    #[tokio::test]
    async fn test_download_then_poll_until_completed() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(FakeCatalog::new(streams()), dir.path());

        let response = start_download(State(state.clone()), body(Some("https://youtu.be/x"), None))
            .await
            .into_response();
        let (status, json) = read_json(response).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["message"], "Download started");
        let job_id = json["job_id"].as_str().unwrap().to_string();

        let mut last = serde_json::Value::Null;
        for _ in 0..200 {
            let response = get_status(State(state.clone()), Path(job_id.clone()))
                .await
                .into_response();
            let (status, json) = read_json(response).await;
            assert_eq!(status, StatusCode::OK);
            assert_ne!(json["status"], "pending");
            last = json;
            if last["status"] != "processing" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(last["status"], "completed");
        assert_eq!(last["resolution"], "1080p");
        let filename = last["filename"].as_str().unwrap();
        assert_eq!(last["download_url"], format!("/file/{}", filename));
        assert!(last.get("filepath").is_none());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(FakeCatalog::new(streams()), dir.path());

        let response = get_status(State(state), Path("dl-missing".to_string()))
            .await
            .into_response();
        let (status, json) = read_json(response).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Download not found");
    }

    #[tokio::test]
    async fn test_file_delivery_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dl-abc_20240101_120000.mp4"), b"movie").unwrap();
        let state = state_with(FakeCatalog::new(streams()), dir.path());

        let response = download_file(State(state), Path("dl-abc_20240101_120000.mp4".to_string()))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"20240101_120000.mp4\""
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"movie");
    }

    #[tokio::test]
    async fn test_file_rejects_missing_and_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(FakeCatalog::new(streams()), dir.path());

        for name in ["missing.mp4", "..", "../secret.mp4", "sub/dir.mp4"] {
            let response = download_file(State(state.clone()), Path(name.to_string()))
                .await
                .into_response();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_cleanup_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dl-new_x.mp4"), b"fresh").unwrap();
        let state = state_with(FakeCatalog::new(streams()), dir.path());

        let response = cleanup(State(state)).await.into_response();
        let (status, json) = read_json(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Cleaned up 0 old files");
        assert_eq!(json["deleted_files"], json!([]));
        assert!(dir.path().join("dl-new_x.mp4").exists());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a_b.webm"), "video/webm");
        assert_eq!(content_type_for("a_b.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("a_b.m4a"), "audio/mp4");
        assert_eq!(content_type_for("a_b.mkv"), "video/x-matroska");
        assert_eq!(content_type_for("a_b.zzz-unknown"), "application/octet-stream");
    }

    #[test]
    fn test_download_name_strips_job_prefix() {
        assert_eq!(download_name("dl-1_20240101_120000.mp4"), "20240101_120000.mp4");
        assert_eq!(download_name("plain.mp4"), "plain.mp4");
    }
}
