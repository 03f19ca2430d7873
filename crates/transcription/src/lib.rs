pub mod asr;

pub use asr::whisper_api::WhisperApiBackend;
pub use asr::{SttBackend, SttRequest, TranscriptionResult, is_hallucination};
