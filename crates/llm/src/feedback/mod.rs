//! Feedback generation for a transcribed interview answer: the prompt sent to
//! the model and the two ways its reply is turned into scores.

mod parser;
mod prompt;

use std::fmt;

use serde::Serialize;

pub use parser::{parse_structured, parse_template};
pub use prompt::{FeedbackPrompt, SYSTEM_PROMPT};

pub const DEFAULT_SUMMARY: &str = "Ringkasan jawaban...";
pub const DEFAULT_CLARITY: i32 = 7;
pub const DEFAULT_CONFIDENCE: i32 = 6;
pub const DEFAULT_STRUCTURE: i32 = 8;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

/// A labelled field of the feedback reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackField {
    Summary,
    Clarity,
    Structure,
    Confidence,
    Suggestion,
}

impl FeedbackField {
    /// Label the model is asked to use in the template reply.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Summary => "Ringkasan",
            Self::Clarity => "Kejelasan",
            Self::Structure => "Struktur",
            Self::Confidence => "Kata kunci",
            Self::Suggestion => "Saran",
        }
    }
}

impl fmt::Display for FeedbackField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedbackParseError {
    #[error("Feedback reply is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Feedback reply is missing {0}")]
    MissingField(FeedbackField),
    #[error("{field} score {value} is outside 1-10")]
    OutOfRange { field: FeedbackField, value: i64 },
}

/// Scores and commentary extracted from a model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeedback {
    pub summary: String,
    pub clarity: i32,
    pub confidence: i32,
    pub structure: i32,
    pub suggestion: Option<String>,
    /// Fields that fell back to their default because the reply did not
    /// carry a usable value.
    pub defaulted: Vec<FeedbackField>,
}

impl Default for ParsedFeedback {
    fn default() -> Self {
        Self {
            summary: DEFAULT_SUMMARY.to_string(),
            clarity: DEFAULT_CLARITY,
            confidence: DEFAULT_CONFIDENCE,
            structure: DEFAULT_STRUCTURE,
            suggestion: None,
            defaulted: Vec::new(),
        }
    }
}

impl ParsedFeedback {
    pub fn is_fully_parsed(&self) -> bool {
        self.defaulted.is_empty()
    }
}
