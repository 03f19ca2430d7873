use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use bson::DateTime;
use dashmap::DashMap;
use vuko_db::models::{
    Answer, AnswerStatus, Difficulty, InterviewSession, Question, Role, SessionStatus,
};

use crate::dao::{DaoError, DaoResult, FeedbackUpdate};
use crate::store::InterviewStore;

/// In-process [`InterviewStore`] for tests and `--in-memory` runs.
///
/// Counts every successful write so callers can assert that a code path
/// left the store untouched, and can be told to fail upcoming writes.
#[derive(Default)]
pub struct MemoryStore {
    roles: DashMap<i64, Role>,
    questions: DashMap<i64, Question>,
    sessions: DashMap<i64, InterviewSession>,
    answers: DashMap<i64, Answer>,
    next_id: AtomicI64,
    mutations: AtomicU64,
    failing_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes applied so far.
    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// The next `n` writes fail with [`DaoError::Unavailable`].
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }

    fn allocate(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn begin_write(&self) -> DaoResult<()> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DaoError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    fn applied(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn update_answer(&self, id: i64, apply: impl FnOnce(&mut Answer)) -> DaoResult<bool> {
        self.begin_write()?;
        let Some(mut answer) = self.answers.get_mut(&id) else {
            return Ok(false);
        };
        apply(&mut *answer);
        answer.updated_at = DateTime::now();
        drop(answer);
        self.applied();
        Ok(true)
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn create_role(&self, name: &str, description: Option<&str>) -> DaoResult<Role> {
        self.begin_write()?;
        let role = Role {
            id: self.allocate(),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        self.roles.insert(role.id, role.clone());
        self.applied();
        Ok(role)
    }

    async fn find_role(&self, id: i64) -> DaoResult<Option<Role>> {
        Ok(self.roles.get(&id).map(|r| r.clone()))
    }

    async fn list_roles(&self) -> DaoResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.roles.iter().map(|r| r.clone()).collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn create_question(
        &self,
        role_id: i64,
        question_text: &str,
        difficulty: Difficulty,
        category: Option<&str>,
    ) -> DaoResult<Question> {
        self.begin_write()?;
        let now = DateTime::now();
        let question = Question {
            id: self.allocate(),
            role_id,
            question_text: question_text.to_string(),
            difficulty,
            category: category.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        self.questions.insert(question.id, question.clone());
        self.applied();
        Ok(question)
    }

    async fn find_question(&self, id: i64) -> DaoResult<Option<Question>> {
        Ok(self.questions.get(&id).map(|q| q.clone()))
    }

    async fn questions_for_role(&self, role_id: i64) -> DaoResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .questions
            .iter()
            .filter(|q| q.role_id == role_id)
            .map(|q| q.clone())
            .collect();
        questions.sort_by_key(|q| q.id);
        Ok(questions)
    }

    async fn create_session(&self, user_id: i64, role_id: i64) -> DaoResult<InterviewSession> {
        self.begin_write()?;
        let session = InterviewSession::new(self.allocate(), user_id, role_id);
        self.sessions.insert(session.id, session.clone());
        self.applied();
        Ok(session)
    }

    async fn find_session(&self, id: i64) -> DaoResult<Option<InterviewSession>> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn sessions_for_user(&self, user_id: i64) -> DaoResult<Vec<InterviewSession>> {
        let mut sessions: Vec<InterviewSession> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.clone())
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn close_session(&self, id: i64, status: SessionStatus) -> DaoResult<bool> {
        self.begin_write()?;
        let Some(mut session) = self.sessions.get_mut(&id) else {
            return Ok(false);
        };
        if !session.is_active() {
            return Ok(false);
        }
        session.status = status;
        session.completed_at = Some(DateTime::now());
        drop(session);
        self.applied();
        Ok(true)
    }

    async fn create_answer(
        &self,
        session_id: i64,
        question_id: i64,
        media_path: &str,
    ) -> DaoResult<Answer> {
        self.begin_write()?;
        let answer = Answer::new(self.allocate(), session_id, question_id, media_path.to_string());
        self.answers.insert(answer.id, answer.clone());
        self.applied();
        Ok(answer)
    }

    async fn find_answer(&self, id: i64) -> DaoResult<Option<Answer>> {
        Ok(self.answers.get(&id).map(|a| a.clone()))
    }

    async fn answers_for_sessions(&self, session_ids: &[i64]) -> DaoResult<Vec<Answer>> {
        let mut answers: Vec<Answer> = self
            .answers
            .iter()
            .filter(|a| session_ids.contains(&a.session_id))
            .map(|a| a.clone())
            .collect();
        answers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(answers)
    }

    async fn save_transcript(&self, id: i64, transcript: &str) -> DaoResult<bool> {
        self.update_answer(id, |answer| {
            answer.transcript_text = Some(transcript.to_string());
            answer.status = AnswerStatus::Transcribed;
            answer.last_error = None;
        })
    }

    async fn save_feedback(&self, id: i64, update: &FeedbackUpdate) -> DaoResult<bool> {
        self.update_answer(id, |answer| {
            answer.summary = Some(update.summary.clone());
            answer.feedback = Some(update.feedback.clone());
            answer.suggestion = update.suggestion.clone();
            answer.clarity_score = Some(update.clarity_score);
            answer.confidence_score = Some(update.confidence_score);
            answer.structure_score = Some(update.structure_score);
            answer.status = AnswerStatus::Analyzed;
            answer.last_error = None;
        })
    }

    async fn mark_failed(&self, id: i64, error: &str) -> DaoResult<bool> {
        self.update_answer(id, |answer| {
            answer.status = AnswerStatus::Failed;
            answer.last_error = Some(error.to_string());
        })
    }

    async fn delete_answers_for_session(&self, session_id: i64) -> DaoResult<u64> {
        self.begin_write()?;
        let before = self.answers.len();
        self.answers.retain(|_, a| a.session_id != session_id);
        let deleted = (before - self.answers.len()) as u64;
        if deleted > 0 {
            self.applied();
        }
        Ok(deleted)
    }

    async fn ping(&self) -> DaoResult<()> {
        Ok(())
    }
}
