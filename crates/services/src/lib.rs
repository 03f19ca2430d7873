pub mod dao;
pub mod intake;
pub mod interview;
pub mod media;
pub mod memory;
pub mod store;
pub mod workers;

pub use intake::{AnswerIntake, IntakeError, Submission};
pub use interview::{AnswerDetails, CancelSummary, HistoryEntry, InterviewError, InterviewService};
pub use media::{MediaError, MediaStorage};
pub use memory::MemoryStore;
pub use store::{InterviewStore, MongoStore};
