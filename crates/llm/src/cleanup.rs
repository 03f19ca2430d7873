use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::client::{GenerationRequest, TextGenerator};

const CLEANUP_SYSTEM_PROMPT: &str = "Anda merapikan transkrip jawaban interview.";

const CLEANUP_INSTRUCTIONS: &str = "\
Perbaiki tanda baca dan hapus kata pengisi (seperti \"eh\", \"em\", \"anu\") dari transkrip berikut \
tanpa mengubah makna maupun bahasanya. Balas hanya dengan transkrip yang sudah dirapikan.";

/// A cleaned transcript shorter than this fraction of the raw one is treated
/// as a summary rather than a cleanup and rejected.
const MIN_RETAINED_RATIO: f64 = 0.5;

/// Output budget per transcript character. Indonesian text tokenizes at
/// roughly three characters per token; one token per two characters leaves
/// room for added punctuation.
const TOKENS_PER_CHAR: f64 = 0.5;
const TOKEN_MARGIN: u32 = 64;

/// Optional post-processing of a raw speech-to-text transcript.
#[async_trait]
pub trait TranscriptCleaner: Send + Sync + 'static {
    async fn clean(&self, raw: &str) -> anyhow::Result<String>;
}

/// Cleans a transcript with a text-generation model.
pub struct LlmTranscriptCleaner {
    generator: Arc<dyn TextGenerator>,
    min_tokens: u32,
}

impl LlmTranscriptCleaner {
    /// `min_tokens` is the smallest output budget requested; longer
    /// transcripts get a budget sized to their length.
    pub fn new(generator: Arc<dyn TextGenerator>, min_tokens: u32) -> Self {
        Self {
            generator,
            min_tokens,
        }
    }

    fn token_budget(&self, raw: &str) -> u32 {
        let sized = (raw.chars().count() as f64 * TOKENS_PER_CHAR).ceil() as u32;
        sized.saturating_add(TOKEN_MARGIN).max(self.min_tokens)
    }
}

fn validate_cleaned(raw: &str, cleaned: &str) -> anyhow::Result<()> {
    if cleaned.is_empty() {
        anyhow::bail!("Cleanup returned an empty transcript");
    }
    let raw_len = raw.chars().count() as f64;
    let cleaned_len = cleaned.chars().count() as f64;
    if cleaned_len < raw_len * MIN_RETAINED_RATIO {
        anyhow::bail!(
            "Cleanup dropped too much text ({} of {} chars)",
            cleaned_len,
            raw_len
        );
    }
    Ok(())
}

#[async_trait]
impl TranscriptCleaner for LlmTranscriptCleaner {
    async fn clean(&self, raw: &str) -> anyhow::Result<String> {
        let request = GenerationRequest {
            system_prompt: CLEANUP_SYSTEM_PROMPT.to_string(),
            user_prompt: format!("{CLEANUP_INSTRUCTIONS}\n\n{raw}"),
            max_tokens: self.token_budget(raw),
            temperature: 0.0,
            json_output: false,
        };
        let generation = self.generator.generate(&request).await?;
        if generation.is_truncated() {
            anyhow::bail!(
                "Cleanup hit the {} token limit before finishing",
                request.max_tokens
            );
        }
        let cleaned = generation.content.trim().to_string();
        validate_cleaned(raw, &cleaned)?;

        debug!(
            raw_chars = raw.len(),
            cleaned_chars = cleaned.len(),
            latency_ms = generation.latency_ms,
            "Transcript cleaned"
        );
        Ok(cleaned)
    }
}
