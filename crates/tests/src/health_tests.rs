use serde_json::Value;
use vuko_worker::health;

use crate::fixtures::test_app::TestApp;

#[tokio::test]
async fn health_reports_components_and_queue_depths() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_interview(1).await;
    app.submit(&seeded).await;
    app.broker.push_raw(app.feedback_queue(), "garbage");
    app.step_feedback().await.unwrap();

    let report = health::check(&app.state).await;

    assert!(report.is_healthy());
    assert_eq!(report.status, "ok");
    assert_eq!(report.queues.len(), 2);
    let stt = report.queues.iter().find(|q| q.name == app.stt_queue()).unwrap();
    assert_eq!((stt.ready, stt.dead), (1, 0));
    let feedback = report
        .queues
        .iter()
        .find(|q| q.name == app.feedback_queue())
        .unwrap();
    assert_eq!((feedback.ready, feedback.dead), (0, 1));
}

#[tokio::test]
async fn failed_depth_query_degrades_health() {
    let app = TestApp::spawn().await;
    app.broker.fail_next_depths(1);

    let report = health::check(&app.state).await;

    assert!(!report.is_healthy());
    assert_eq!(report.status, "degraded");
    assert!(report.broker.ok);
    let stt = report.queues.iter().find(|q| q.name == app.stt_queue()).unwrap();
    assert!(stt.error.as_deref().unwrap().contains("injected depth failure"));
    let feedback = report
        .queues
        .iter()
        .find(|q| q.name == app.feedback_queue())
        .unwrap();
    assert!(feedback.error.is_none());

    let base = app.serve().await;
    app.broker.fail_next_depths(1);
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert!(body["queues"][0]["error"].is_string());
    assert!(body["queues"][1].get("error").is_none());
}

#[tokio::test]
async fn health_endpoint_serves_report() {
    let app = TestApp::spawn().await;
    let base = app.serve().await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"]["ok"], true);
    assert_eq!(body["broker"]["ok"], true);
    assert!(body["broker"].get("error").is_none());
    assert_eq!(body["queues"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::spawn().await;
    let base = app.serve().await;

    let resp = reqwest::get(format!("{base}/api/answers")).await.unwrap();

    assert_eq!(resp.status().as_u16(), 404);
}
