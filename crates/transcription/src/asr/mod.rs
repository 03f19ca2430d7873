pub mod whisper_api;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request to transcribe one uploaded answer.
pub struct SttRequest {
    /// Raw media bytes as uploaded (webm, wav, mp3, mp4, ...).
    pub media: Vec<u8>,
    /// Original file name; the extension drives the content type.
    pub file_name: String,
    /// Optional language hint (ISO 639-1, e.g. "id", "en").
    pub language_hint: Option<String>,
}

/// Result of an STT call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language: Option<String>,
    pub duration_secs: Option<f64>,
}

/// Trait for pluggable speech-to-text backends.
///
/// Callers validate that the media exists and is non-empty before calling;
/// backends may reject unsupported formats.
#[async_trait]
pub trait SttBackend: Send + Sync + 'static {
    async fn transcribe(&self, request: SttRequest) -> anyhow::Result<TranscriptionResult>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Returns true if the text is a known Whisper hallucination/placeholder.
pub fn is_hallucination(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.contains("[blank_audio]")
        || lower.contains("[silence]")
        || lower.contains("[music]")
        || lower.contains("(silence)")
        || lower.contains("(music)")
        || lower == "you"
        || lower == "thank you."
        || lower == "thanks for watching!"
        || lower == "terima kasih."
        || lower == "terima kasih telah menonton!"
}
