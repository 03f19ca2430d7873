use async_trait::async_trait;
use bson::doc;
use mongodb::{Client, Database};
use tracing::info;
use vuko_config::DatabaseSettings;
use vuko_db::models::{
    Answer, Difficulty, InterviewSession, Question, Role, SessionStatus,
};

use crate::dao::{
    AnswerDao, CounterDao, DaoResult, FeedbackUpdate, QuestionDao, RoleDao, SessionDao,
};

/// Persistent rows for roles, questions, sessions and answers.
///
/// Every `create_*` allocates the row's integer id itself.
#[async_trait]
pub trait InterviewStore: Send + Sync + 'static {
    async fn create_role(&self, name: &str, description: Option<&str>) -> DaoResult<Role>;
    async fn find_role(&self, id: i64) -> DaoResult<Option<Role>>;
    async fn list_roles(&self) -> DaoResult<Vec<Role>>;

    async fn create_question(
        &self,
        role_id: i64,
        question_text: &str,
        difficulty: Difficulty,
        category: Option<&str>,
    ) -> DaoResult<Question>;
    async fn find_question(&self, id: i64) -> DaoResult<Option<Question>>;
    async fn questions_for_role(&self, role_id: i64) -> DaoResult<Vec<Question>>;

    async fn create_session(&self, user_id: i64, role_id: i64) -> DaoResult<InterviewSession>;
    async fn find_session(&self, id: i64) -> DaoResult<Option<InterviewSession>>;
    /// Newest first.
    async fn sessions_for_user(&self, user_id: i64) -> DaoResult<Vec<InterviewSession>>;
    /// Moves an active session to `status`; false if it was not active.
    async fn close_session(&self, id: i64, status: SessionStatus) -> DaoResult<bool>;

    async fn create_answer(
        &self,
        session_id: i64,
        question_id: i64,
        media_path: &str,
    ) -> DaoResult<Answer>;
    async fn find_answer(&self, id: i64) -> DaoResult<Option<Answer>>;
    /// Newest first.
    async fn answers_for_sessions(&self, session_ids: &[i64]) -> DaoResult<Vec<Answer>>;
    async fn save_transcript(&self, id: i64, transcript: &str) -> DaoResult<bool>;
    async fn save_feedback(&self, id: i64, update: &FeedbackUpdate) -> DaoResult<bool>;
    async fn mark_failed(&self, id: i64, error: &str) -> DaoResult<bool>;
    async fn delete_answers_for_session(&self, session_id: i64) -> DaoResult<u64>;

    async fn ping(&self) -> DaoResult<()>;
}

/// MongoDB-backed store.
pub struct MongoStore {
    db: Database,
    counters: CounterDao,
    roles: RoleDao,
    questions: QuestionDao,
    sessions: SessionDao,
    answers: AnswerDao,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self {
            counters: CounterDao::new(&db),
            roles: RoleDao::new(&db),
            questions: QuestionDao::new(&db),
            sessions: SessionDao::new(&db),
            answers: AnswerDao::new(&db),
            db,
        }
    }

    /// Connects and ensures indexes.
    pub async fn connect(settings: &DatabaseSettings) -> DaoResult<Self> {
        let client = Client::with_uri_str(&settings.uri).await?;
        let db = client.database(&settings.name);
        vuko_db::indexes::ensure_indexes(&db).await?;
        info!(database = %settings.name, "Connected to MongoDB");
        Ok(Self::new(db))
    }
}

#[async_trait]
impl InterviewStore for MongoStore {
    async fn create_role(&self, name: &str, description: Option<&str>) -> DaoResult<Role> {
        let id = self.counters.next(Role::COLLECTION).await?;
        self.roles
            .create(id, name.to_string(), description.map(str::to_string))
            .await
    }

    async fn find_role(&self, id: i64) -> DaoResult<Option<Role>> {
        self.roles.find(id).await
    }

    async fn list_roles(&self) -> DaoResult<Vec<Role>> {
        self.roles.list().await
    }

    async fn create_question(
        &self,
        role_id: i64,
        question_text: &str,
        difficulty: Difficulty,
        category: Option<&str>,
    ) -> DaoResult<Question> {
        let id = self.counters.next(Question::COLLECTION).await?;
        self.questions
            .create(
                id,
                role_id,
                question_text.to_string(),
                difficulty,
                category.map(str::to_string),
            )
            .await
    }

    async fn find_question(&self, id: i64) -> DaoResult<Option<Question>> {
        self.questions.find(id).await
    }

    async fn questions_for_role(&self, role_id: i64) -> DaoResult<Vec<Question>> {
        self.questions.find_for_role(role_id).await
    }

    async fn create_session(&self, user_id: i64, role_id: i64) -> DaoResult<InterviewSession> {
        let id = self.counters.next(InterviewSession::COLLECTION).await?;
        self.sessions.create(id, user_id, role_id).await
    }

    async fn find_session(&self, id: i64) -> DaoResult<Option<InterviewSession>> {
        self.sessions.find(id).await
    }

    async fn sessions_for_user(&self, user_id: i64) -> DaoResult<Vec<InterviewSession>> {
        self.sessions.find_for_user(user_id).await
    }

    async fn close_session(&self, id: i64, status: SessionStatus) -> DaoResult<bool> {
        self.sessions.close(id, status).await
    }

    async fn create_answer(
        &self,
        session_id: i64,
        question_id: i64,
        media_path: &str,
    ) -> DaoResult<Answer> {
        let id = self.counters.next(Answer::COLLECTION).await?;
        self.answers
            .create(id, session_id, question_id, media_path.to_string())
            .await
    }

    async fn find_answer(&self, id: i64) -> DaoResult<Option<Answer>> {
        self.answers.find(id).await
    }

    async fn answers_for_sessions(&self, session_ids: &[i64]) -> DaoResult<Vec<Answer>> {
        self.answers.find_for_sessions(session_ids).await
    }

    async fn save_transcript(&self, id: i64, transcript: &str) -> DaoResult<bool> {
        self.answers.save_transcript(id, transcript).await
    }

    async fn save_feedback(&self, id: i64, update: &FeedbackUpdate) -> DaoResult<bool> {
        self.answers.save_feedback(id, update).await
    }

    async fn mark_failed(&self, id: i64, error: &str) -> DaoResult<bool> {
        self.answers.mark_failed(id, error).await
    }

    async fn delete_answers_for_session(&self, session_id: i64) -> DaoResult<u64> {
        self.answers.delete_for_session(session_id).await
    }

    async fn ping(&self) -> DaoResult<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
