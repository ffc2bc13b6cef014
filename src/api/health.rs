use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use super::predictions::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "echo-ef",
        "version": env!("CARGO_PKG_VERSION"),
        "predictor": state.predictor.kind(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
