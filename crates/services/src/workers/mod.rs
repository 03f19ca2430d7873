//! Queue consumers for the answer pipeline.
//!
//! ```text
//! stt_processing ──► TranscriptionJobHandler ──► feedback_analysis ──► FeedbackJobHandler
//! ```
//!
//! Each handler turns one [`JobMessage`] into a [`JobOutcome`] or a
//! [`JobError`]; the [`Consumer`] decides how the delivery is settled.

pub mod consumer;
pub mod feedback;
pub mod transcription;

pub use consumer::{Consumer, Settlement};
pub use feedback::FeedbackJobHandler;
pub use transcription::TranscriptionJobHandler;

use async_trait::async_trait;
use thiserror::Error;
use vuko_broker::{BrokerError, JobMessage};
use vuko_llm::FeedbackParseError;

use crate::dao::DaoError;

#[derive(Debug, Error)]
pub enum JobError {
    /// The job can never succeed. Acknowledged and dropped.
    #[error("{0}")]
    Invalid(String),
    /// A collaborator failed. Retried up to the configured limit.
    #[error("{0}")]
    Transient(String),
    /// The model reply did not match the requested structure. Retried like
    /// a transient failure.
    #[error("Feedback reply rejected: {0}")]
    Parse(#[from] FeedbackParseError),
}

impl JobError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, JobError::Invalid(_))
    }
}

impl From<DaoError> for JobError {
    fn from(e: DaoError) -> Self {
        JobError::Transient(format!("store: {e}"))
    }
}

impl From<BrokerError> for JobError {
    fn from(e: BrokerError) -> Self {
        JobError::Transient(format!("broker: {e}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Nothing left to do, e.g. a redelivery of an already analyzed answer.
    AlreadyDone,
}

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Queue this handler consumes.
    fn queue(&self) -> &str;

    async fn handle(&self, job: &JobMessage) -> Result<JobOutcome, JobError>;

    /// Called once a job has used up its retries, before it is dead-lettered.
    async fn on_exhausted(&self, _job: &JobMessage, _error: &JobError) {}
}
