pub mod answer;
pub mod base;
pub mod counter;
pub mod question;
pub mod role;
pub mod session;

pub use answer::{AnswerDao, FeedbackUpdate};
pub use base::{BaseDao, DaoError, DaoResult};
pub use counter::CounterDao;
pub use question::QuestionDao;
pub use role::RoleDao;
pub use session::SessionDao;
