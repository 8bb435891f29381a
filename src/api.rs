// src/api.rs
use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::trace::TraceLayer;

/// Read-only data the liveness routes report. Nothing here is shared with the pipeline.
#[derive(Clone, Default)]
pub struct AppState {
    pub channels: Vec<String>,
    pub source_count: usize,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
pub struct HealthResp {
    pub status: &'static str,
    pub timestamp: String,
    pub channels: Vec<String>,
    pub sources: usize,
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(health))
        .route("/health", get(health));
    if let Some(handle) = state.metrics.clone() {
        app = app.route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        );
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        channels: state.channels,
        sources: state.source_count,
    })
}
