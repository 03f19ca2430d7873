pub mod answer;
pub mod counter;
pub mod question;
pub mod role;
pub mod session;

pub use answer::{Answer, AnswerStatus};
pub use counter::Counter;
pub use question::{Difficulty, Question};
pub use role::Role;
pub use session::{InterviewSession, SessionStatus};
