use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use vuko_broker::{Broker, JobMessage};
use vuko_config::ResponseFormat;
use vuko_db::models::AnswerStatus;
use vuko_llm::LlmTranscriptCleaner;
use vuko_llm::feedback::{DEFAULT_CONFIDENCE, DEFAULT_STRUCTURE, DEFAULT_SUMMARY, SYSTEM_PROMPT};
use vuko_services::InterviewStore;
use vuko_services::workers::{Consumer, Settlement, TranscriptionJobHandler};

use crate::fixtures::test_app::{TRANSCRIPT, TestApp};

// ─── Happy Path ─────────────────────────────────────────────────

#[tokio::test]
async fn upload_flows_through_transcription_and_feedback() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;

    assert_eq!(app.step_transcription().await, Some(Settlement::Acked));
    let transcribed = app.answer(answer_id).await;
    assert_eq!(transcribed.transcript_text.as_deref(), Some(TRANSCRIPT));
    assert_eq!(transcribed.status, AnswerStatus::Transcribed);
    assert_eq!(app.stt.last_media().as_deref(), Some(&b"fake-webm-bytes"[..]));

    let queued = app.broker.ready_jobs(app.feedback_queue());
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].answer_id, answer_id);

    assert_eq!(app.step_feedback().await, Some(Settlement::Acked));
    let analyzed = app.answer(answer_id).await;
    assert_eq!(analyzed.status, AnswerStatus::Analyzed);
    assert_eq!(analyzed.summary.as_deref(), Some("Kandidat menjelaskan pengalaman backend."));
    assert_eq!(analyzed.clarity_score, Some(8));
    assert_eq!(analyzed.structure_score, Some(7));
    assert_eq!(analyzed.confidence_score, Some(6));
    assert_eq!(analyzed.suggestion.as_deref(), Some("Tambahkan contoh konkret."));
    assert!(analyzed.feedback.unwrap().contains("\"kejelasan\":8"));

    let request = app.llm.last_request().unwrap();
    assert_eq!(request.system_prompt, SYSTEM_PROMPT);
    assert!(request.user_prompt.contains(&seeded.questions[0].question_text));
    assert!(request.user_prompt.contains(TRANSCRIPT));
    assert!(request.json_output);

    assert_eq!(app.broker.in_flight(), 0);
}

#[tokio::test]
async fn running_consumers_process_an_upload_and_stop_on_shutdown() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stt = tokio::spawn(app.transcription_consumer().run(shutdown_rx.clone()));
    let feedback = tokio::spawn(app.feedback_consumer().run(shutdown_rx));

    let answer_id = app.submit(&seeded).await;

    let analyzed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let answer = app.answer(answer_id).await;
            if answer.status == AnswerStatus::Analyzed {
                return answer;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pipeline did not finish");
    assert_eq!(analyzed.clarity_score, Some(8));

    shutdown_tx.send_replace(true);
    stt.await.unwrap().unwrap();
    feedback.await.unwrap().unwrap();
    assert_eq!(app.broker.in_flight(), 0);
}

// ─── Intake ─────────────────────────────────────────────────────

#[tokio::test]
async fn each_upload_enqueues_exactly_one_transcription_job() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;

    let first = app.submit(&seeded).await;
    let second = app.submit(&seeded).await;

    assert_ne!(first, second);
    let jobs: Vec<i64> = app
        .broker
        .ready_jobs(app.stt_queue())
        .iter()
        .map(|j| j.answer_id)
        .collect();
    assert_eq!(jobs, vec![first, second]);
}

// ─── Invalid Jobs ───────────────────────────────────────────────

#[tokio::test]
async fn transcription_job_for_unknown_answer_is_acked_without_mutation() {
    let app = TestApp::spawn().await;
    app.broker
        .publish(app.stt_queue(), &JobMessage::new(9_999))
        .await
        .unwrap();
    let before = app.store.mutations();

    assert_eq!(app.step_transcription().await, Some(Settlement::Dropped));

    assert_eq!(app.store.mutations(), before);
    assert_eq!(app.stt.calls(), 0);
    assert_eq!(app.broker.in_flight(), 0);
    assert!(app.broker.dead_letters(app.stt_queue()).is_empty());
}

#[tokio::test]
async fn feedback_job_without_transcript_is_acked_without_mutation() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    app.broker
        .publish(app.feedback_queue(), &JobMessage::new(answer_id))
        .await
        .unwrap();
    let before = app.store.mutations();

    assert_eq!(app.step_feedback().await, Some(Settlement::Dropped));

    assert_eq!(app.store.mutations(), before);
    assert_eq!(app.llm.calls(), 0);
    let answer = app.answer(answer_id).await;
    assert_eq!(answer.status, AnswerStatus::Pending);
    assert!(answer.clarity_score.is_none());
}

#[tokio::test]
async fn missing_media_marks_answer_failed_and_is_dropped() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    std::fs::remove_file(app.answer(answer_id).await.media_path).unwrap();

    assert_eq!(app.step_transcription().await, Some(Settlement::Dropped));

    let answer = app.answer(answer_id).await;
    assert_eq!(answer.status, AnswerStatus::Failed);
    assert!(answer.last_error.unwrap().contains("media unusable"));
    assert_eq!(app.stt.calls(), 0);
    assert!(app.broker.ready_jobs(app.feedback_queue()).is_empty());
}

#[tokio::test]
async fn silent_recording_does_not_reach_feedback() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    app.stt.push_text("Terima kasih.");

    assert_eq!(app.step_transcription().await, Some(Settlement::Dropped));

    let answer = app.answer(answer_id).await;
    assert_eq!(answer.status, AnswerStatus::Failed);
    assert!(answer.transcript_text.is_none());
    assert!(app.broker.ready_jobs(app.feedback_queue()).is_empty());
}

#[tokio::test]
async fn malformed_body_is_dead_lettered() {
    let app = TestApp::spawn().await;
    app.broker.push_raw(app.stt_queue(), "{not json");

    assert_eq!(app.step_transcription().await, Some(Settlement::DeadLettered));

    let dead = app.broker.dead_letters(app.stt_queue());
    assert_eq!(dead.len(), 1);
    assert!(dead[0].reason.starts_with("malformed body"));
}

#[tokio::test]
async fn legacy_message_without_envelope_fields_is_processed() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let media_path = app.state.media.save("legacy.webm", b"legacy-bytes").await.unwrap();
    let answer = app
        .store
        .create_answer(seeded.session.id, seeded.question_id(), &media_path)
        .await
        .unwrap();
    app.broker.push_raw(
        app.stt_queue(),
        &format!(r#"{{"answer_id": {}, "timestamp": 1700000000}}"#, answer.id),
    );

    assert_eq!(app.step_transcription().await, Some(Settlement::Acked));

    assert_eq!(app.stt.calls(), 1);
    assert_eq!(app.answer(answer.id).await.status, AnswerStatus::Transcribed);
    let chained = app.broker.ready_jobs(app.feedback_queue());
    assert_eq!(chained.len(), 1);
    assert_eq!(chained[0].message_id, format!("feedback:{}", answer.id));
}

// ─── Transcript Cleanup ─────────────────────────────────────────

fn consumer_with_cleanup(app: &TestApp) -> Consumer {
    let settings = &app.state.settings.broker;
    let handler = TranscriptionJobHandler::new(
        app.state.store.clone(),
        app.state.broker.clone(),
        app.state.media.clone(),
        app.state.stt.clone(),
        settings.stt_queue.clone(),
        settings.feedback_queue.clone(),
    )
    .with_cleaner(Arc::new(LlmTranscriptCleaner::new(app.llm.clone(), 200)));
    Consumer::new(app.state.broker.clone(), Arc::new(handler), settings)
        .with_receive_timeout(Duration::from_millis(50))
}

#[tokio::test]
async fn cleanup_pass_replaces_raw_transcript() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    app.stt
        .push_text("Eh, saya em memiliki pengalaman tiga tahun sebagai backend engineer.");
    app.llm.push_reply(TRANSCRIPT);
    let answer_id = app.submit(&seeded).await;

    let settlement = consumer_with_cleanup(&app).run_once().await.unwrap();

    assert_eq!(settlement, Some(Settlement::Acked));
    assert_eq!(app.answer(answer_id).await.transcript_text.as_deref(), Some(TRANSCRIPT));
    let request = app.llm.last_request().unwrap();
    assert_eq!(request.temperature, 0.0);
    assert!(!request.json_output);
    assert!(request.user_prompt.contains("Eh, saya em"));
}

#[tokio::test]
async fn rejected_cleanup_keeps_raw_transcript() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    app.llm.push_reply("Backend.");
    let answer_id = app.submit(&seeded).await;

    let settlement = consumer_with_cleanup(&app).run_once().await.unwrap();

    assert_eq!(settlement, Some(Settlement::Acked));
    assert_eq!(app.answer(answer_id).await.transcript_text.as_deref(), Some(TRANSCRIPT));
    assert_eq!(app.llm.calls(), 1);
}

// ─── Feedback Parsing ───────────────────────────────────────────

#[tokio::test]
async fn template_reply_scores_are_taken_literally() {
    let app = TestApp::spawn_with(ResponseFormat::Template).await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;

    app.step_transcription().await;
    assert_eq!(app.step_feedback().await, Some(Settlement::Acked));

    let answer = app.answer(answer_id).await;
    assert_eq!(answer.clarity_score, Some(9));
    assert_eq!(answer.structure_score, Some(7));
    assert_eq!(answer.confidence_score, Some(5));
    assert!(!app.llm.last_request().unwrap().json_output);
}

#[tokio::test]
async fn template_reply_missing_fields_uses_defaults() {
    let app = TestApp::spawn_with(ResponseFormat::Template).await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    app.llm.push_reply("- Kejelasan: 9");

    app.step_transcription().await;
    assert_eq!(app.step_feedback().await, Some(Settlement::Acked));

    let answer = app.answer(answer_id).await;
    assert_eq!(answer.status, AnswerStatus::Analyzed);
    assert_eq!(answer.clarity_score, Some(9));
    assert_eq!(answer.structure_score, Some(DEFAULT_STRUCTURE));
    assert_eq!(answer.confidence_score, Some(DEFAULT_CONFIDENCE));
    assert_eq!(answer.summary.as_deref(), Some(DEFAULT_SUMMARY));
}

#[tokio::test]
async fn structured_reply_drift_is_retried_until_valid() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    app.llm.push_reply("- Kejelasan: 9\n- Struktur: 7");

    app.step_transcription().await;
    assert_eq!(
        app.step_feedback().await,
        Some(Settlement::Retried { attempt: 1 })
    );
    let retried = app.broker.ready_jobs(app.feedback_queue());
    assert_eq!(retried[0].attempt, 1);
    assert!(retried[0].last_error.as_deref().unwrap().contains("rejected"));
    assert_eq!(app.answer(answer_id).await.status, AnswerStatus::Transcribed);

    assert_eq!(app.step_feedback().await, Some(Settlement::Acked));
    assert_eq!(app.answer(answer_id).await.clarity_score, Some(8));
    assert_eq!(app.llm.calls(), 2);
}

// ─── Retries & Dead Letters ─────────────────────────────────────

#[tokio::test]
async fn stt_failures_exhaust_retries_then_dead_letter() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    app.stt.fail_always("unsupported media");

    for attempt in 1..=3 {
        assert_eq!(
            app.step_transcription().await,
            Some(Settlement::Retried { attempt })
        );
        assert_eq!(app.answer(answer_id).await.status, AnswerStatus::Pending);
    }
    assert_eq!(app.step_transcription().await, Some(Settlement::DeadLettered));
    assert_eq!(app.step_transcription().await, None);

    let answer = app.answer(answer_id).await;
    assert_eq!(answer.status, AnswerStatus::Failed);
    assert!(answer.last_error.unwrap().contains("unsupported media"));
    assert_eq!(app.stt.calls(), 4);

    let dead = app.broker.dead_letters(app.stt_queue());
    assert_eq!(dead.len(), 1);
    assert!(dead[0].reason.contains("unsupported media"));
}

#[tokio::test]
async fn store_failure_while_saving_transcript_is_retried() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    app.store.fail_next_writes(1);

    assert_eq!(
        app.step_transcription().await,
        Some(Settlement::Retried { attempt: 1 })
    );
    assert_eq!(app.step_transcription().await, Some(Settlement::Acked));
    assert_eq!(app.answer(answer_id).await.status, AnswerStatus::Transcribed);
    assert_eq!(app.broker.ready_jobs(app.feedback_queue()).len(), 1);
}

#[tokio::test]
async fn llm_outage_retries_then_succeeds() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    app.llm.push_error("503 Service Unavailable");

    app.step_transcription().await;
    assert_eq!(
        app.step_feedback().await,
        Some(Settlement::Retried { attempt: 1 })
    );
    assert_eq!(app.step_feedback().await, Some(Settlement::Acked));
    assert_eq!(app.answer(answer_id).await.status, AnswerStatus::Analyzed);
}

// ─── Redelivery ─────────────────────────────────────────────────

#[tokio::test]
async fn redelivered_transcription_job_does_not_repeat_work() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    app.step_transcription().await;

    app.broker
        .publish(app.stt_queue(), &JobMessage::new(answer_id))
        .await
        .unwrap();
    assert_eq!(app.step_transcription().await, Some(Settlement::Acked));

    assert_eq!(app.stt.calls(), 1);
    assert_eq!(app.broker.ready_jobs(app.feedback_queue()).len(), 1);
}

#[tokio::test]
async fn redelivered_feedback_job_for_analyzed_answer_is_acked() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    let answer_id = app.submit(&seeded).await;
    app.step_transcription().await;
    app.step_feedback().await;

    app.broker
        .publish(app.feedback_queue(), &JobMessage::new(answer_id))
        .await
        .unwrap();
    let before = app.store.mutations();
    assert_eq!(app.step_feedback().await, Some(Settlement::Acked));

    assert_eq!(app.store.mutations(), before);
    assert_eq!(app.llm.calls(), 1);
}
