//! # Whisper client
//!
//! Sends one audio file per request to `POST {base_url}/audio/transcriptions`
//! and decodes the returned [`Transcript`]. All configuration, including the
//! API key, is passed in explicitly through [`WhisperConfig`].

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::CancellationToken;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use tracing::{debug, info, warn};

use crate::{RetryConfig, TranscribeError, Transcript};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "whisper-1";
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const WHISPER_MAX_BYTES: u64 = 25 * 1024 * 1024;
const WHISPER_MAX_BYTES_PADDING: u64 = 100 * 1024;

/// Largest file the service accepts, minus a safety margin.
pub const fn max_upload_size() -> u64 {
    WHISPER_MAX_BYTES - WHISPER_MAX_BYTES_PADDING
}

/// Response body format requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Text only.
    #[default]
    Json,
    /// Text plus word and segment timings.
    VerboseJson,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::VerboseJson => "verbose_json",
        }
    }
}

/// Speech-to-text backend used by the transcribe stage.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `path`. Must abort the outstanding
    /// request once `token` is cancelled.
    async fn transcribe(
        &self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Transcript, TranscribeError>;
}

/// Settings for [`WhisperClient`].
#[derive(Clone)]
pub struct WhisperConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: String,
    pub response_format: ResponseFormat,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl fmt::Debug for WhisperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhisperConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .field("response_format", &self.response_format)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl WhisperConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            response_format: ResponseFormat::default(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fail fast on settings that can never produce a successful request.
    pub fn validate(&self) -> Result<(), TranscribeError> {
        if self.api_key.trim().is_empty() {
            return Err(TranscribeError::Config(
                "missing API key: set API_KEY_OPENAI or pass --api-key".to_string(),
            ));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(TranscribeError::Config(format!(
                "invalid base url: {}",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(TranscribeError::Config("model must not be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(TranscribeError::Config(
                "request timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// [`Transcriber`] backed by the OpenAI audio transcription endpoint.
pub struct WhisperClient {
    client: reqwest::Client,
    config: WhisperConfig,
}

impl WhisperClient {
    /// Validate `config` and build the HTTP client.
    pub fn new(config: WhisperConfig) -> Result<Self, TranscribeError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("scribe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TranscribeError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_form(&self, file_name: &str, audio: Vec<u8>) -> Result<Form, TranscribeError> {
        let file_part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/ogg")?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone())
            .text("response_format", self.config.response_format.as_str());

        if self.config.response_format == ResponseFormat::VerboseJson {
            form = form
                .text("timestamp_granularities[]", "word")
                .text("timestamp_granularities[]", "segment");
        }
        Ok(form)
    }

    async fn send_once(&self, file_name: &str, audio: &[u8]) -> Result<Transcript, TranscribeError> {
        let form = self.build_form(file_name, audio.to_vec())?;

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Status {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| TranscribeError::Decode(e.to_string()))
    }
}

/// `Retry-After` in its delay-seconds form. HTTP dates are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(
        &self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Transcript, TranscribeError> {
        let audio = tokio::fs::read(path).await.map_err(|source| TranscribeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.ogg".to_string());

        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            debug!(file = %file_name, bytes = audio.len(), attempt, "Sending transcription request");

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(TranscribeError::Cancelled),
                result = self.send_once(&file_name, &audio) => result,
            };

            match result {
                Ok(transcript) => {
                    info!(file = %file_name, chars = transcript.text.len(), "Transcription completed");
                    return Ok(transcript);
                }
                Err(e) if e.is_transient() && retry.allows(attempt) => {
                    attempt += 1;
                    let delay = retry.backoff(attempt, e.retry_after());
                    warn!(
                        file = %file_name,
                        error = %e,
                        attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transient transcription failure, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(TranscribeError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_upload_size() {
        assert_eq!(max_upload_size(), 26_112_000);
    }

    #[test]
    fn test_config_defaults() {
        let config = WhisperConfig::new("sk-test");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, "whisper-1");
        assert_eq!(config.language, "en");
        assert_eq!(config.response_format, ResponseFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_fails_fast() {
        let err = WhisperConfig::new("  ").validate().unwrap_err();
        assert!(matches!(err, TranscribeError::Config(_)));
        assert!(WhisperClient::new(WhisperConfig::new("")).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let config = WhisperConfig::new("sk-test").with_base_url("api.openai.com");
        assert!(matches!(config.validate(), Err(TranscribeError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let shown = format!("{:?}", WhisperConfig::new("sk-secret"));
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client =
            WhisperClient::new(WhisperConfig::new("k").with_base_url("http://localhost:9/v1/"))
                .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/v1/audio/transcriptions");
    }
}
