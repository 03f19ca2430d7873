use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use vuko_llm::{Generation, GenerationRequest, TextGenerator};
use vuko_transcription::{SttBackend, SttRequest, TranscriptionResult};

/// Replies served in order; once the script runs out the fallback repeats.
struct Script {
    queued: VecDeque<Result<String, String>>,
    fallback: Result<String, String>,
}

impl Script {
    fn new(fallback: Result<String, String>) -> Self {
        Self {
            queued: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self) -> Result<String, String> {
        self.queued.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

/// Speech-to-text stand-in that returns canned transcripts.
pub struct ScriptedStt {
    script: Mutex<Script>,
    requests: Mutex<Vec<SttRequest>>,
    stall: Mutex<Option<Duration>>,
}

impl ScriptedStt {
    pub fn new(default_text: &str) -> Self {
        Self {
            script: Mutex::new(Script::new(Ok(default_text.to_string()))),
            requests: Mutex::new(Vec::new()),
            stall: Mutex::new(None),
        }
    }

    /// Every call from now on waits `delay` before replying.
    pub fn stall_for(&self, delay: Duration) {
        *self.stall.lock() = Some(delay);
    }

    pub fn push_text(&self, text: &str) {
        self.script.lock().queued.push_back(Ok(text.to_string()));
    }

    pub fn push_error(&self, error: &str) {
        self.script.lock().queued.push_back(Err(error.to_string()));
    }

    /// Every call from now on fails.
    pub fn fail_always(&self, error: &str) {
        let mut script = self.script.lock();
        script.queued.clear();
        script.fallback = Err(error.to_string());
    }

    pub fn succeed_with(&self, text: &str) {
        let mut script = self.script.lock();
        script.queued.clear();
        script.fallback = Ok(text.to_string());
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_media(&self) -> Option<Vec<u8>> {
        self.requests.lock().last().map(|r| r.media.clone())
    }
}

#[async_trait]
impl SttBackend for ScriptedStt {
    async fn transcribe(&self, request: SttRequest) -> anyhow::Result<TranscriptionResult> {
        self.requests.lock().push(request);
        let stall = *self.stall.lock();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        let reply = self.script.lock().next();
        match reply {
            Ok(text) => Ok(TranscriptionResult {
                text,
                language: Some("id".to_string()),
                duration_secs: Some(12.5),
            }),
            Err(e) => anyhow::bail!("{e}"),
        }
    }

    fn name(&self) -> &str {
        "scripted_stt"
    }
}

/// Text generator stand-in that returns canned replies and records prompts.
pub struct ScriptedGenerator {
    script: Mutex<Script>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(default_reply: &str) -> Self {
        Self {
            script: Mutex::new(Script::new(Ok(default_reply.to_string()))),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: &str) {
        self.script.lock().queued.push_back(Ok(reply.to_string()));
    }

    pub fn push_error(&self, error: &str) {
        self.script.lock().queued.push_back(Err(error.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Generation> {
        self.requests.lock().push(request.clone());
        let reply = self.script.lock().next();
        match reply {
            Ok(content) => Ok(Generation {
                content,
                model: "scripted".to_string(),
                tokens_used: 42,
                latency_ms: 1,
                finish_reason: Some("stop".to_string()),
            }),
            Err(e) => anyhow::bail!("{e}"),
        }
    }

    fn name(&self) -> &str {
        "scripted_llm"
    }
}
