//! MiniMax music generation client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use remix_models::MusicRequest;
use remix_pool::{keys_from_env, CredentialPool, PoolConfig};

use crate::error::{AiError, AiResult};
use crate::gemini::check_status;

pub const DEFAULT_BASE_URL: &str = "https://api.minimax.io";
pub const DEFAULT_MODEL: &str = "music-2.5";

#[derive(Debug, Clone)]
pub struct MinimaxConfig {
    pub base_url: String,
    pub model: String,
    /// Generation requests routinely take minutes.
    pub request_timeout: Duration,
}

impl Default for MinimaxConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl MinimaxConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("MINIMAX_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("MINIMAX_MODEL").unwrap_or(defaults.model),
            ..defaults
        }
    }
}

#[derive(Debug, Serialize)]
struct AudioSetting {
    sample_rate: u32,
    bitrate: u32,
    format: &'static str,
}

#[derive(Debug, Serialize)]
struct GenerationPayload<'a> {
    model: &'a str,
    prompt: String,
    lyrics: String,
    audio_setting: AudioSetting,
    output_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    data: Option<GenerationData>,
    audio_file: Option<String>,
    base_resp: Option<BaseResp>,
}

#[derive(Debug, Deserialize)]
struct GenerationData {
    audio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaseResp {
    status_code: i64,
    #[serde(default)]
    status_msg: String,
}

impl GenerationResponse {
    fn into_audio_url(self) -> AiResult<String> {
        if let Some(base) = self.base_resp.as_ref().filter(|b| b.status_code != 0) {
            return Err(AiError::Api {
                code: base.status_code,
                message: base.status_msg.clone(),
            });
        }
        self.data
            .and_then(|d| d.audio)
            .or(self.audio_file)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AiError::EmptyOutput("no audio url in generation response".into()))
    }
}

/// Composes a soundtrack for a [`MusicRequest`].
#[derive(Clone)]
pub struct MinimaxClient {
    http: Client,
    pool: CredentialPool,
    config: MinimaxConfig,
}

impl MinimaxClient {
    pub fn new(config: MinimaxConfig, pool: CredentialPool) -> AiResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("remix-ai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiError::config_error(e.to_string()))?;
        Ok(Self { http, pool, config })
    }

    /// Keys from `MINIMAX_API_KEYS` (or `MINIMAX_API_KEY`).
    pub fn from_env() -> AiResult<Self> {
        let keys = keys_from_env("MINIMAX_API_KEYS", "MINIMAX_API_KEY");
        if keys.is_empty() {
            return Err(AiError::config_error(
                "MINIMAX_API_KEYS or MINIMAX_API_KEY must be set",
            ));
        }
        let pool = CredentialPool::new("minimax", keys, PoolConfig::from_env("MINIMAX"));
        Self::new(MinimaxConfig::from_env(), pool)
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    fn payload(&self, request: &MusicRequest) -> GenerationPayload<'_> {
        GenerationPayload {
            model: &self.config.model,
            prompt: request.prompt(),
            lyrics: request.lyrics(),
            audio_setting: AudioSetting {
                sample_rate: 44100,
                bitrate: 256000,
                format: "mp3",
            },
            output_format: "url",
        }
    }

    /// Generate a track and return its MP3 bytes.
    pub async fn compose(&self, request: &MusicRequest) -> AiResult<Vec<u8>> {
        let payload = self.payload(request);
        let payload = &payload;
        let endpoint = format!("{}/v1/music_generation", self.config.base_url);
        let endpoint = endpoint.as_str();

        info!(
            model = %self.config.model,
            bpm = request.bpm,
            sections = request.section_plan.len(),
            "Requesting music generation"
        );

        let audio_url = self
            .pool
            .call("music_generation", move |key| async move {
                let response = self
                    .http
                    .post(endpoint)
                    .bearer_auth(key.expose())
                    .json(payload)
                    .send()
                    .await?;
                let parsed: GenerationResponse = check_status(response).await?.json().await?;
                parsed.into_audio_url()
            })
            .await
            .map_err(AiError::from)?;

        let audio_url = audio_url.as_str();
        let bytes = self
            .pool
            .call("download_audio", move |_key| async move {
                let response = self.http.get(audio_url).send().await?;
                let bytes = check_status(response).await?.bytes().await?;
                Ok::<_, AiError>(bytes.to_vec())
            })
            .await
            .map_err(AiError::from)?;

        if bytes.is_empty() {
            return Err(AiError::EmptyOutput("downloaded track is empty".into()));
        }
        info!(bytes = bytes.len(), "Music track downloaded");
        Ok(bytes)
    }
}
