pub mod cleanup;
pub mod client;
pub mod feedback;
pub mod openai;

pub use cleanup::{LlmTranscriptCleaner, TranscriptCleaner};
pub use client::{Generation, GenerationRequest, TextGenerator};
pub use feedback::{FeedbackField, FeedbackParseError, ParsedFeedback};
pub use openai::ChatCompletionsClient;
