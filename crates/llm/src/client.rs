use async_trait::async_trait;

/// A single system/user prompt exchange.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the model for a JSON object instead of free text.
    pub json_output: bool,
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub content: String,
    pub model: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
    /// Why the model stopped, as reported by the backend (`"stop"`, `"length"`, ...).
    pub finish_reason: Option<String>,
}

impl Generation {
    /// The model ran out of `max_tokens` before finishing its reply.
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Text-generation collaborator. No structural guarantee on the output.
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Generation>;

    fn name(&self) -> &str;
}
