use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub store: ComponentHealth,
    pub broker: ComponentHealth,
    pub queues: Vec<QueueReport>,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Depth of one queue. When the depth query fails the counts are zero and
/// `error` says why.
#[derive(Debug, Serialize)]
pub struct QueueReport {
    pub name: String,
    pub ready: u64,
    pub dead: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.store.ok && self.broker.ok && self.queues.iter().all(|q| q.error.is_none())
    }
}

/// Pings the store and broker and reads queue depths.
pub async fn check(state: &AppState) -> HealthReport {
    let store = ComponentHealth::from_result(state.store.ping().await);
    let broker = ComponentHealth::from_result(state.broker.health_check().await);

    let mut queues = Vec::new();
    if broker.ok {
        let names = [
            &state.settings.broker.stt_queue,
            &state.settings.broker.feedback_queue,
        ];
        for name in names {
            let report = match state.broker.depth(name).await {
                Ok(depth) => QueueReport {
                    name: name.clone(),
                    ready: depth.ready,
                    dead: depth.dead,
                    error: None,
                },
                Err(e) => {
                    warn!(queue = %name, error = %e, "Queue depth unavailable");
                    QueueReport {
                        name: name.clone(),
                        ready: 0,
                        dead: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            queues.push(report);
        }
    }

    let mut report = HealthReport {
        status: "ok",
        store,
        broker,
        queues,
    };
    if !report.is_healthy() {
        report.status = "degraded";
    }
    report
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = check(&state).await;
    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
