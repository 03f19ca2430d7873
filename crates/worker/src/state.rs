use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use vuko_broker::{Broker, MemoryBroker, RedisBroker};
use vuko_config::Settings;
use vuko_llm::{ChatCompletionsClient, LlmTranscriptCleaner, TextGenerator, TranscriptCleaner};
use vuko_services::workers::{Consumer, FeedbackJobHandler, TranscriptionJobHandler};
use vuko_services::{AnswerIntake, InterviewService, InterviewStore, MediaStorage, MemoryStore, MongoStore};
use vuko_transcription::{SttBackend, WhisperApiBackend};

/// Process-wide dependencies. Owns the broker pool; everything else borrows
/// it through the `Arc`s handed out here.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn InterviewStore>,
    pub broker: Arc<dyn Broker>,
    pub media: Arc<MediaStorage>,
    pub stt: Arc<dyn SttBackend>,
    pub generator: Arc<dyn TextGenerator>,
    pub cleaner: Option<Arc<dyn TranscriptCleaner>>,
}

impl AppState {
    /// Connects to MongoDB and Redis and builds the HTTP collaborators.
    pub async fn connect(settings: Settings) -> anyhow::Result<Self> {
        let store = MongoStore::connect(&settings.database)
            .await
            .context("Failed to connect to MongoDB")?;
        let broker = RedisBroker::open(&settings.broker)
            .await
            .context("Failed to open broker pool")?;
        info!(url = %settings.broker.url, "Broker pool opened");
        Self::with_backends(settings, Arc::new(store), Arc::new(broker))
    }

    /// In-process store and broker, real STT and LLM clients.
    pub fn in_memory(settings: Settings) -> anyhow::Result<Self> {
        info!("Using in-memory store and broker");
        Self::with_backends(settings, Arc::new(MemoryStore::new()), Arc::new(MemoryBroker::new()))
    }

    fn with_backends(
        settings: Settings,
        store: Arc<dyn InterviewStore>,
        broker: Arc<dyn Broker>,
    ) -> anyhow::Result<Self> {
        let stt: Arc<dyn SttBackend> = Arc::new(WhisperApiBackend::new(&settings.transcription)?);
        let generator: Arc<dyn TextGenerator> = Arc::new(ChatCompletionsClient::new(&settings.llm)?);
        let cleaner = settings.transcription.cleanup_enabled.then(|| {
            Arc::new(LlmTranscriptCleaner::new(generator.clone(), settings.llm.max_tokens))
                as Arc<dyn TranscriptCleaner>
        });
        Ok(Self::from_parts(settings, store, broker, stt, generator, cleaner))
    }

    pub fn from_parts(
        settings: Settings,
        store: Arc<dyn InterviewStore>,
        broker: Arc<dyn Broker>,
        stt: Arc<dyn SttBackend>,
        generator: Arc<dyn TextGenerator>,
        cleaner: Option<Arc<dyn TranscriptCleaner>>,
    ) -> Self {
        let media = Arc::new(MediaStorage::new(&settings.media));
        Self {
            settings: Arc::new(settings),
            store,
            broker,
            media,
            stt,
            generator,
            cleaner,
        }
    }

    pub fn intake(&self) -> AnswerIntake {
        AnswerIntake::new(
            self.store.clone(),
            self.broker.clone(),
            self.media.clone(),
            self.settings.broker.stt_queue.clone(),
        )
    }

    pub fn interviews(&self) -> InterviewService {
        InterviewService::new(self.store.clone(), self.media.clone())
    }

    pub fn transcription_consumer(&self) -> Consumer {
        let broker = &self.settings.broker;
        let mut handler = TranscriptionJobHandler::new(
            self.store.clone(),
            self.broker.clone(),
            self.media.clone(),
            self.stt.clone(),
            broker.stt_queue.clone(),
            broker.feedback_queue.clone(),
        )
        .with_language(self.settings.transcription.language.clone());
        if let Some(cleaner) = &self.cleaner {
            handler = handler.with_cleaner(cleaner.clone());
        }
        Consumer::new(self.broker.clone(), Arc::new(handler), broker)
    }

    pub fn feedback_consumer(&self) -> Consumer {
        let handler = FeedbackJobHandler::new(
            self.store.clone(),
            self.generator.clone(),
            self.settings.llm.clone(),
            self.settings.broker.feedback_queue.clone(),
        );
        Consumer::new(self.broker.clone(), Arc::new(handler), &self.settings.broker)
    }

    /// Closes the broker pool.
    pub async fn shutdown(&self) {
        self.broker.close().await;
        info!("Broker pool closed");
    }
}
