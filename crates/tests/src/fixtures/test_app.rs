use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use vuko_broker::MemoryBroker;
use vuko_config::{ResponseFormat, Settings};
use vuko_db::models::Answer;
use vuko_services::workers::{Consumer, Settlement};
use vuko_services::{IntakeError, InterviewStore, MemoryStore, Submission};
use vuko_worker::AppState;

use super::scripted::{ScriptedGenerator, ScriptedStt};
use super::seed::{SeededInterview, seed_interview};

pub const TRANSCRIPT: &str = "Saya memiliki pengalaman tiga tahun sebagai backend engineer.";

pub const STRUCTURED_REPLY: &str = r#"{"ringkasan":"Kandidat menjelaskan pengalaman backend.","kejelasan":8,"struktur":7,"kata_kunci":6,"saran":"Tambahkan contoh konkret."}"#;

pub const TEMPLATE_REPLY: &str = "\
- Ringkasan: Kandidat menjelaskan pengalaman backend.
- Evaluasi:
  - Kejelasan: 9
  - Struktur: 7
  - Kata kunci: 5
- Saran: Tambahkan contoh konkret.";

const RECEIVE_WAIT: Duration = Duration::from_millis(50);

/// The whole pipeline wired over in-memory collaborators.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub broker: Arc<MemoryBroker>,
    pub stt: Arc<ScriptedStt>,
    pub llm: Arc<ScriptedGenerator>,
    pub media_dir: TempDir,
}

impl TestApp {
    /// Structured feedback mode, the default.
    pub async fn spawn() -> Self {
        Self::spawn_with(ResponseFormat::Structured).await
    }

    pub async fn spawn_with(format: ResponseFormat) -> Self {
        let media_dir = tempfile::tempdir().unwrap();

        let mut settings = Settings::default();
        settings.media.upload_dir = media_dir.path().to_string_lossy().into_owned();
        settings.llm.response_format = format;
        settings.broker.consumer_name = "test-worker".to_string();

        let store = Arc::new(MemoryStore::new());
        let broker = Arc::new(MemoryBroker::new());
        let stt = Arc::new(ScriptedStt::new(TRANSCRIPT));
        let reply = match format {
            ResponseFormat::Structured => STRUCTURED_REPLY,
            ResponseFormat::Template => TEMPLATE_REPLY,
        };
        let llm = Arc::new(ScriptedGenerator::new(reply));

        let state = AppState::from_parts(
            settings,
            store.clone(),
            broker.clone(),
            stt.clone(),
            llm.clone(),
            None,
        );

        Self {
            state,
            store,
            broker,
            stt,
            llm,
            media_dir,
        }
    }

    pub fn stt_queue(&self) -> &str {
        &self.state.settings.broker.stt_queue
    }

    pub fn feedback_queue(&self) -> &str {
        &self.state.settings.broker.feedback_queue
    }

    pub async fn seed_interview(&self, user_id: i64) -> SeededInterview {
        seed_interview(self.store.as_ref(), user_id, "Backend Engineer").await
    }

    pub async fn try_submit(&self, seeded: &SeededInterview, bytes: &[u8]) -> Result<Submission, IntakeError> {
        self.state
            .intake()
            .submit(
                seeded.user_id,
                seeded.session.id,
                seeded.question_id(),
                "jawaban.webm",
                bytes,
            )
            .await
    }

    pub async fn submit(&self, seeded: &SeededInterview) -> i64 {
        self.try_submit(seeded, b"fake-webm-bytes").await.unwrap().answer_id
    }

    pub fn transcription_consumer(&self) -> Consumer {
        self.state
            .transcription_consumer()
            .with_receive_timeout(RECEIVE_WAIT)
    }

    pub fn feedback_consumer(&self) -> Consumer {
        self.state.feedback_consumer().with_receive_timeout(RECEIVE_WAIT)
    }

    /// Settles one transcription job, if any is waiting.
    pub async fn step_transcription(&self) -> Option<Settlement> {
        self.transcription_consumer().run_once().await.unwrap()
    }

    /// Settles one feedback job, if any is waiting.
    pub async fn step_feedback(&self) -> Option<Settlement> {
        self.feedback_consumer().run_once().await.unwrap()
    }

    /// Serves the worker's HTTP router on an ephemeral port and returns its
    /// base URL.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = vuko_worker::build_router(self.state.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub async fn answer(&self, id: i64) -> Answer {
        self.store.find_answer(id).await.unwrap().unwrap()
    }
}
