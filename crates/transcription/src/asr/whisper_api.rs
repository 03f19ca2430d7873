use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;
use vuko_config::TranscriptionSettings;

use super::{SttBackend, SttRequest, TranscriptionResult};

/// Speech-to-text over an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct WhisperApiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    language: Option<String>,
    duration: Option<f64>,
}

impl WhisperApiBackend {
    pub fn new(settings: &TranscriptionSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build STT HTTP client")?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            language: settings.language.clone(),
        })
    }
}

/// Content type for an uploaded media file, by extension.
fn content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "webm" => "audio/webm",
        "wav" => "audio/wav",
        "mp3" | "mpga" | "mpeg" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl SttBackend for WhisperApiBackend {
    async fn transcribe(&self, request: SttRequest) -> anyhow::Result<TranscriptionResult> {
        if request.media.is_empty() {
            anyhow::bail!("Refusing to transcribe empty media '{}'", request.file_name);
        }

        let start = Instant::now();
        let bytes = request.media.len();
        let part = Part::bytes(request.media)
            .file_name(request.file_name.clone())
            .mime_str(content_type(&request.file_name))
            .context("Invalid media content type")?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(lang) = request.language_hint.or_else(|| self.language.clone()) {
            form = form.text("language", lang);
        }

        debug!(model = %self.model, bytes, file = %request.file_name, "Sending media to STT");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("STT HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("STT returned {}: {}", status, error_body);
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse STT response")?;

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            chars = parsed.text.len(),
            "STT response received"
        );

        Ok(TranscriptionResult {
            text: parsed.text,
            language: parsed.language,
            duration_secs: parsed.duration,
        })
    }

    fn name(&self) -> &str {
        "whisper_api"
    }
}
