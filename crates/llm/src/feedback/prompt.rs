use vuko_config::{LlmSettings, ResponseFormat};

use crate::client::GenerationRequest;

pub const SYSTEM_PROMPT: &str = "Anda adalah asisten yang memberikan feedback untuk interview.";

const INTRO: &str = "Berikut adalah jawaban dari kandidat terhadap pertanyaan interview:";

const TEMPLATE_INSTRUCTIONS: &str = "\
Tolong berikan ringkasan jawaban tersebut dan evaluasi sederhana dalam format berikut:
- Ringkasan: [ringkasan singkat]
- Evaluasi:
  - Kejelasan: [1-10]
  - Struktur: [1-10]
  - Kata kunci: [1-10]
- Saran: [saran perbaikan singkat]";

const STRUCTURED_INSTRUCTIONS: &str = "\
Tolong berikan ringkasan jawaban tersebut dan evaluasi sederhana.
Balas HANYA dengan satu objek JSON dengan kunci berikut:
{\"ringkasan\": string, \"kejelasan\": bilangan bulat 1-10, \"struktur\": bilangan bulat 1-10, \"kata_kunci\": bilangan bulat 1-10, \"saran\": string}";

/// Prompt asking the model to summarize and score one answer.
#[derive(Debug, Clone)]
pub struct FeedbackPrompt {
    pub question: String,
    pub transcript: String,
    pub format: ResponseFormat,
}

impl FeedbackPrompt {
    pub fn new(question: &str, transcript: &str, format: ResponseFormat) -> Self {
        Self {
            question: question.to_string(),
            transcript: transcript.to_string(),
            format,
        }
    }

    pub fn user_prompt(&self) -> String {
        let instructions = match self.format {
            ResponseFormat::Template => TEMPLATE_INSTRUCTIONS,
            ResponseFormat::Structured => STRUCTURED_INSTRUCTIONS,
        };
        format!(
            "{INTRO}\n\n\"Pertanyaan: {}\"\n\n\"Jawaban: {}\"\n\n{instructions}",
            self.question, self.transcript
        )
    }

    pub fn build(&self, settings: &LlmSettings) -> GenerationRequest {
        GenerationRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: self.user_prompt(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            json_output: self.format == ResponseFormat::Structured,
        }
    }
}
