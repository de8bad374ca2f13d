//! Suno music generation API client
//!
//! Two calls: submit a generation task, then poll its record until the
//! provider reports a terminal status. Outbound requests share one
//! `governor` limiter so concurrent monitors cannot flood the provider.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use tunemint_common::config::SunoConfig;

const USER_AGENT: &str = concat!("TuneMint/", env!("CARGO_PKG_VERSION"));

/// Prompt limit when style/title are supplied
pub const MAX_CUSTOM_PROMPT_CHARS: usize = 3000;
/// Prompt limit for description-only requests
pub const MAX_DESCRIPTION_PROMPT_CHARS: usize = 500;
pub const MAX_STYLE_CHARS: usize = 200;
pub const MAX_TITLE_CHARS: usize = 80;

/// Suno client errors
#[derive(Debug, Error)]
pub enum SunoError {
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx HTTP status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// 2xx response carrying a non-200 application code
    #[error("Request rejected (code {code}): {msg}")]
    Rejected { code: i64, msg: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub instrumental: bool,
}

impl GenerateRequest {
    /// Custom mode: style or title given, prompt used as lyrics
    pub fn is_custom(&self) -> bool {
        self.style.is_some() || self.title.is_some()
    }

    /// Check provider input limits
    pub fn validate(&self) -> Result<(), String> {
        let prompt_len = self.prompt.trim().chars().count();
        if prompt_len == 0 {
            return Err("Prompt is required".to_string());
        }
        let max_prompt = if self.is_custom() {
            MAX_CUSTOM_PROMPT_CHARS
        } else {
            MAX_DESCRIPTION_PROMPT_CHARS
        };
        if prompt_len > max_prompt {
            return Err(format!("Prompt longer than {} characters", max_prompt));
        }
        if let Some(style) = &self.style {
            if style.chars().count() > MAX_STYLE_CHARS {
                return Err(format!("Style longer than {} characters", MAX_STYLE_CHARS));
            }
        }
        if let Some(title) = &self.title {
            if title.chars().count() > MAX_TITLE_CHARS {
                return Err(format!("Title longer than {} characters", MAX_TITLE_CHARS));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    custom_mode: bool,
    instrumental: bool,
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    call_back_url: Option<&'a str>,
}

/// Envelope shared by every Suno response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitData {
    task_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInfo {
    status: String,
    #[serde(default)]
    response: Option<RecordResponse>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordResponse {
    #[serde(default)]
    suno_data: Vec<SunoClip>,
}

/// One generated clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SunoClip {
    pub id: String,
    #[serde(default)]
    pub audio_url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Provider-side task state
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Pending,
    /// Lyrics/text done, audio still rendering
    TextSuccess,
    /// First clip done
    FirstSuccess,
    /// All clips done
    Success(Vec<SunoClip>),
    /// Terminal failure reported by the provider
    Failed { status: String, message: Option<String> },
}

impl TaskStatus {
    pub fn label(&self) -> &str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::TextSuccess => "TEXT_SUCCESS",
            TaskStatus::FirstSuccess => "FIRST_SUCCESS",
            TaskStatus::Success(_) => "SUCCESS",
            TaskStatus::Failed { status, .. } => status,
        }
    }

    fn from_record(record: RecordInfo) -> Self {
        match record.status.as_str() {
            "SUCCESS" => TaskStatus::Success(
                record.response.map(|r| r.suno_data).unwrap_or_default(),
            ),
            "TEXT_SUCCESS" => TaskStatus::TextSuccess,
            "FIRST_SUCCESS" => TaskStatus::FirstSuccess,
            "CREATE_TASK_FAILED"
            | "GENERATE_AUDIO_FAILED"
            | "CALLBACK_EXCEPTION"
            | "SENSITIVE_WORD_ERROR" => TaskStatus::Failed {
                status: record.status,
                message: record.error_message,
            },
            other => {
                if other != "PENDING" {
                    debug!(status = other, "Unrecognized task status, treating as pending");
                }
                TaskStatus::Pending
            }
        }
    }
}

/// Suno API client
pub struct SunoClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    callback_url: Option<String>,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl SunoClient {
    /// Build a client; `None` when no API key is configured
    pub fn from_config(config: &SunoConfig) -> Result<Option<Self>, SunoError> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SunoError::Network(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Some(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            callback_url: config.callback_url.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }))
    }

    /// Submit a generation task and return its task id
    pub async fn submit(&self, request: &GenerateRequest) -> Result<String, SunoError> {
        self.rate_limiter.until_ready().await;

        let body = SubmitBody {
            custom_mode: request.is_custom(),
            instrumental: request.instrumental,
            model: &self.model,
            prompt: request.prompt.trim(),
            style: request.style.as_deref(),
            title: request.title.as_deref(),
            call_back_url: self.callback_url.as_deref(),
        };

        let url = format!("{}/api/v1/generate", self.base_url);
        debug!(url = %url, custom = body.custom_mode, "Submitting generation task");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SunoError::Network(e.to_string()))?;

        let data: SubmitData = Self::unwrap_envelope(response).await?;
        Ok(data.task_id)
    }

    /// Fetch the current status of a task
    pub async fn status(&self, task_id: &str) -> Result<TaskStatus, SunoError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/api/v1/generate/record-info", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("taskId", task_id)])
            .send()
            .await
            .map_err(|e| SunoError::Network(e.to_string()))?;

        let record: RecordInfo = Self::unwrap_envelope(response).await?;
        Ok(TaskStatus::from_record(record))
    }

    async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SunoError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SunoError::Api(status.as_u16(), text));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| SunoError::Parse(e.to_string()))?;

        if envelope.code != 200 {
            return Err(SunoError::Rejected {
                code: envelope.code,
                msg: envelope.msg,
            });
        }

        envelope
            .data
            .ok_or_else(|| SunoError::Parse("Response has no data".to_string()))
    }
}
