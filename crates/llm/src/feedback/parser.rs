use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::{FeedbackField, FeedbackParseError, MAX_SCORE, MIN_SCORE, ParsedFeedback};

/// Marker the prompt uses for an unfilled score slot.
const SCORE_PLACEHOLDER: &str = "[1-10]";

static CLARITY_RE: LazyLock<Regex> = LazyLock::new(|| score_regex("Kejelasan"));
static STRUCTURE_RE: LazyLock<Regex> = LazyLock::new(|| score_regex("Struktur"));
static CONFIDENCE_RE: LazyLock<Regex> = LazyLock::new(|| score_regex(r"Kata\s+kunci"));

fn score_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{label}\s*:\s*(\d{{1,2}})\b")).expect("static score pattern")
}

/// Strip a leading bullet and return the text after `label:` if the line is
/// that labelled entry. The label matches case-insensitively, like the scores.
fn labelled_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let body = line.trim_start().trim_start_matches(['-', '*']).trim_start();
    let head = body.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = &body[label.len()..];
    let value = rest.trim_start().strip_prefix(':')?.trim();
    Some(value)
}

fn is_placeholder(value: &str) -> bool {
    value.starts_with('[') && value.ends_with(']')
}

fn score_in_line(line: &str, re: &Regex) -> Option<i32> {
    if line.contains(SCORE_PLACEHOLDER) {
        return None;
    }
    let value: i32 = re.captures(line)?.get(1)?.as_str().parse().ok()?;
    (MIN_SCORE..=MAX_SCORE).contains(&value).then_some(value)
}

/// Lenient line-by-line parse of the labelled template reply.
///
/// Never fails. Any field without a usable value keeps its default and is
/// listed in [`ParsedFeedback::defaulted`]. A later line for the same label
/// overrides an earlier one. Scores outside 1-10 count as absent.
pub fn parse_template(text: &str) -> ParsedFeedback {
    let mut summary = None;
    let mut suggestion = None;
    let mut clarity = None;
    let mut structure = None;
    let mut confidence = None;

    for line in text.lines() {
        if let Some(value) = labelled_value(line, FeedbackField::Summary.label())
            && !value.is_empty()
            && !is_placeholder(value)
        {
            summary = Some(value.to_string());
            continue;
        }
        if let Some(value) = labelled_value(line, FeedbackField::Suggestion.label())
            && !value.is_empty()
            && !is_placeholder(value)
        {
            suggestion = Some(value.to_string());
            continue;
        }
        if let Some(v) = score_in_line(line, &CLARITY_RE) {
            clarity = Some(v);
        }
        if let Some(v) = score_in_line(line, &STRUCTURE_RE) {
            structure = Some(v);
        }
        if let Some(v) = score_in_line(line, &CONFIDENCE_RE) {
            confidence = Some(v);
        }
    }

    let mut parsed = ParsedFeedback::default();
    match summary {
        Some(s) => parsed.summary = s,
        None => parsed.defaulted.push(FeedbackField::Summary),
    }
    match clarity {
        Some(v) => parsed.clarity = v,
        None => parsed.defaulted.push(FeedbackField::Clarity),
    }
    match structure {
        Some(v) => parsed.structure = v,
        None => parsed.defaulted.push(FeedbackField::Structure),
    }
    match confidence {
        Some(v) => parsed.confidence = v,
        None => parsed.defaulted.push(FeedbackField::Confidence),
    }
    parsed.suggestion = suggestion;
    parsed
}

#[derive(Debug, Deserialize)]
struct StructuredReply {
    #[serde(alias = "summary")]
    ringkasan: Option<String>,
    #[serde(alias = "clarity")]
    kejelasan: Option<i64>,
    #[serde(alias = "structure")]
    struktur: Option<i64>,
    #[serde(alias = "confidence", alias = "kata kunci")]
    kata_kunci: Option<i64>,
    #[serde(alias = "suggestion")]
    saran: Option<String>,
}

/// The JSON object inside `text`, tolerating surrounding prose or a fenced
/// code block.
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn checked_score(field: FeedbackField, value: Option<i64>) -> Result<i32, FeedbackParseError> {
    let value = value.ok_or(FeedbackParseError::MissingField(field))?;
    if !(i64::from(MIN_SCORE)..=i64::from(MAX_SCORE)).contains(&value) {
        return Err(FeedbackParseError::OutOfRange { field, value });
    }
    Ok(value as i32)
}

/// Strict parse of a JSON feedback reply. Every score must be present and in
/// range, and the summary must be non-empty.
pub fn parse_structured(text: &str) -> Result<ParsedFeedback, FeedbackParseError> {
    let raw = json_object(text)
        .ok_or_else(|| FeedbackParseError::InvalidJson("no JSON object in reply".to_string()))?;
    let reply: StructuredReply =
        serde_json::from_str(raw).map_err(|e| FeedbackParseError::InvalidJson(e.to_string()))?;

    let summary = reply
        .ringkasan
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(FeedbackParseError::MissingField(FeedbackField::Summary))?;

    Ok(ParsedFeedback {
        summary,
        clarity: checked_score(FeedbackField::Clarity, reply.kejelasan)?,
        structure: checked_score(FeedbackField::Structure, reply.struktur)?,
        confidence: checked_score(FeedbackField::Confidence, reply.kata_kunci)?,
        suggestion: reply
            .saran
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        defaulted: Vec::new(),
    })
}
