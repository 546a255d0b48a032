//! Gemini API client for media understanding.
//!
//! Media is sent through the Files API: a resumable upload, polling until the
//! file is `ACTIVE`, then a `generateContent` call that references it.
//! Uploaded files belong to the key that uploaded them, so a rotated call
//! uploads again under the new key.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use remix_pool::{keys_from_env, parse_retry_after, ApiKey, CredentialPool, PoolConfig};

use crate::error::{AiError, AiResult};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
    /// Delay between file state polls
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
            max_polls: 90,
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            poll_interval: std::env::var("GEMINI_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            ..defaults
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    name: String,
    uri: String,
    mime_type: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini client. Cheap to clone; clones share the credential pool.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    pool: CredentialPool,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, pool: CredentialPool) -> AiResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("remix-ai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiError::config_error(e.to_string()))?;
        Ok(Self { http, pool, config })
    }

    /// Keys from `GEMINI_API_KEYS` (or `GOOGLE_ROTATION_KEYS`).
    pub fn from_env() -> AiResult<Self> {
        let keys = keys_from_env("GEMINI_API_KEYS", "GOOGLE_ROTATION_KEYS");
        if keys.is_empty() {
            return Err(AiError::config_error(
                "GEMINI_API_KEYS or GOOGLE_ROTATION_KEYS must list at least one key",
            ));
        }
        let pool = CredentialPool::new("gemini", keys, PoolConfig::from_env("GEMINI"));
        Self::new(GeminiConfig::from_env(), pool)
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Ask the model about a local media file and return its text answer.
    pub async fn generate_with_file(
        &self,
        operation: &str,
        path: &Path,
        prompt: &str,
    ) -> AiResult<String> {
        let bytes = tokio::fs::read(path).await?;
        let mime = mime_for(path);
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());

        info!(
            operation,
            model = %self.config.model,
            bytes = bytes.len(),
            mime,
            "Gemini media request"
        );

        let bytes = bytes.as_slice();
        let display_name = display_name.as_str();
        self.pool
            .call(operation, move |key| {
                self.generate_once(key, bytes, mime, display_name, prompt)
            })
            .await
            .map_err(AiError::from)
    }

    async fn generate_once(
        &self,
        key: ApiKey,
        bytes: &[u8],
        mime: &str,
        display_name: &str,
        prompt: &str,
    ) -> AiResult<String> {
        let file = self.upload(&key, bytes, mime, display_name).await?;
        let file = self.wait_active(&key, file).await?;
        let result = self.generate(&key, &file, mime, prompt).await;
        self.delete_file(&key, &file.name).await;
        result
    }

    async fn upload(
        &self,
        key: &ApiKey,
        bytes: &[u8],
        mime: &str,
        display_name: &str,
    ) -> AiResult<FileInfo> {
        let start = self
            .http
            .post(format!("{}/upload/v1beta/files", self.config.base_url))
            .header(API_KEY_HEADER, key.expose())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AiError::invalid_response("upload session without x-goog-upload-url"))?;

        let finished = self
            .http
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes.to_vec())
            .send()
            .await?;
        let uploaded: UploadResponse = check_status(finished).await?.json().await?;

        debug!(file = %uploaded.file.name, slot_key = %key, "Uploaded media to Gemini");
        Ok(uploaded.file)
    }

    async fn wait_active(&self, key: &ApiKey, mut file: FileInfo) -> AiResult<FileInfo> {
        for _ in 0..self.config.max_polls {
            match file.state.as_deref() {
                None | Some("ACTIVE") => return Ok(file),
                Some("FAILED") => return Err(AiError::FileProcessing(file.name)),
                Some(_) => {}
            }
            tokio::time::sleep(self.config.poll_interval).await;

            let response = self
                .http
                .get(format!("{}/v1beta/{}", self.config.base_url, file.name))
                .header(API_KEY_HEADER, key.expose())
                .send()
                .await?;
            file = check_status(response).await?.json().await?;
        }

        Err(AiError::FileProcessing(format!(
            "{} still processing after {} polls",
            file.name, self.config.max_polls
        )))
    }

    async fn generate(
        &self,
        key: &ApiKey,
        file: &FileInfo,
        mime: &str,
        prompt: &str,
    ) -> AiResult<String> {
        let file_data = FileData {
            mime_type: file.mime_type.as_deref().unwrap_or(mime),
            file_uri: &file.uri,
        };
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "fileData": file_data },
                    { "text": prompt }
                ]
            }]
        });

        let response = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.config.base_url, self.config.model
            ))
            .header(API_KEY_HEADER, key.expose())
            .json(&body)
            .send()
            .await?;
        let parsed: GenerateResponse = check_status(response).await?.json().await?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AiError::EmptyOutput("no text in Gemini response".into()));
        }
        Ok(text.trim().to_string())
    }

    async fn delete_file(&self, key: &ApiKey, name: &str) {
        let result = self
            .http
            .delete(format!("{}/v1beta/{}", self.config.base_url, name))
            .header(API_KEY_HEADER, key.expose())
            .send()
            .await;
        if let Err(e) = result {
            debug!(file = name, "Failed to delete uploaded file: {}", e.without_url());
        }
    }
}

/// Turn a non-success response into an [`AiError::Http`].
pub(crate) async fn check_status(response: Response) -> AiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    );
    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(500).collect();
    Err(AiError::http(status.as_u16(), message, retry_after))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mp3",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        _ => "application/octet-stream",
    }
}
