use tokio_test::assert_err;
use vuko_broker::{Broker, JobMessage, PublishOutcome};
use vuko_db::models::AnswerStatus;
use vuko_services::{IntakeError, InterviewStore, MediaError};

use crate::fixtures::test_app::TestApp;

#[tokio::test]
async fn submit_stores_media_and_pending_answer() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(3).await;

    let submission = app.try_submit(&seeded, b"audio-bytes").await.unwrap();

    assert!(submission.media_path.ends_with("_jawaban.webm"));
    assert!(submission.media_path.starts_with(&*app.media_dir.path().to_string_lossy()));
    assert_eq!(std::fs::read(&submission.media_path).unwrap(), b"audio-bytes");

    let answer = app.answer(submission.answer_id).await;
    assert_eq!(answer.status, AnswerStatus::Pending);
    assert_eq!(answer.session_id, seeded.session.id);
    assert!(answer.transcript_text.is_none());
    assert!(answer.summary.is_none());
    assert!(answer.clarity_score.is_none());
}

#[tokio::test]
async fn publish_retry_after_lost_reply_delivers_one_job() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    app.broker.fail_after_apply(1);

    let answer_id = app.submit(&seeded).await;

    let jobs = app.broker.ready_jobs(app.stt_queue());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].answer_id, answer_id);
    let stats = app.broker.stats();
    assert_eq!(stats.publish_attempts, 2);
    assert_eq!(stats.reconnects, 1);
}

#[tokio::test]
async fn publish_retry_after_failed_write_delivers_one_job() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    app.broker.fail_next_publishes(1);

    app.submit(&seeded).await;

    assert_eq!(app.broker.ready_jobs(app.stt_queue()).len(), 1);
    assert_eq!(app.broker.stats().reconnects, 1);
}

#[tokio::test]
async fn publish_failing_twice_surfaces_error_but_keeps_answer() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    app.broker.fail_next_publishes(2);

    let err = assert_err!(app.try_submit(&seeded, b"bytes").await);

    let IntakeError::Publish { answer_id, .. } = err else {
        panic!("expected publish error, got {err:?}");
    };
    assert_eq!(app.answer(answer_id).await.status, AnswerStatus::Pending);
    assert!(app.broker.ready_jobs(app.stt_queue()).is_empty());
    assert_eq!(app.broker.stats().publish_attempts, 2);
}

#[tokio::test]
async fn submit_to_someone_elses_session_is_rejected() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;

    let err = app
        .state
        .intake()
        .submit(2, seeded.session.id, seeded.question_id(), "a.webm", b"x")
        .await
        .unwrap_err();

    assert!(matches!(err, IntakeError::SessionNotFound(id) if id == seeded.session.id));
    assert_eq!(app.store.answer_count(), 0);
    assert!(app.broker.ready_jobs(app.stt_queue()).is_empty());
}

#[tokio::test]
async fn submit_to_completed_session_is_rejected() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    app.state
        .interviews()
        .complete_session(1, seeded.session.id)
        .await
        .unwrap();

    let err = app.try_submit(&seeded, b"x").await.unwrap_err();
    assert!(matches!(err, IntakeError::SessionClosed(_)));
}

#[tokio::test]
async fn question_from_another_role_is_rejected() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let other_role = app.store.create_role("Data Analyst", None).await.unwrap();
    let foreign = app
        .store
        .create_question(other_role.id, "Apa itu SQL?", Default::default(), None)
        .await
        .unwrap();

    let err = app
        .state
        .intake()
        .submit(1, seeded.session.id, foreign.id, "a.webm", b"x")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IntakeError::QuestionNotInRole { question_id, .. } if question_id == foreign.id
    ));
}

#[tokio::test]
async fn empty_upload_is_rejected_before_anything_is_stored() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let before = app.store.mutations();

    let err = app.try_submit(&seeded, b"").await.unwrap_err();

    assert!(matches!(err, IntakeError::Media(MediaError::Empty)));
    assert_eq!(app.store.mutations(), before);
    assert_eq!(std::fs::read_dir(app.media_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn store_failure_removes_saved_media() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    app.store.fail_next_writes(1);

    let err = app.try_submit(&seeded, b"bytes").await.unwrap_err();

    assert!(matches!(err, IntakeError::Store(_)));
    assert_eq!(std::fs::read_dir(app.media_dir.path()).unwrap().count(), 0);
    assert!(app.broker.ready_jobs(app.stt_queue()).is_empty());
}

#[tokio::test]
async fn duplicate_message_id_is_reported() {
    let app = TestApp::spawn().await;
    let job = JobMessage::with_id(1, "fixed");

    assert_eq!(
        app.broker.publish(app.stt_queue(), &job).await.unwrap(),
        PublishOutcome::Published
    );
    assert_eq!(
        app.broker.publish(app.stt_queue(), &job).await.unwrap(),
        PublishOutcome::Duplicate
    );
}
