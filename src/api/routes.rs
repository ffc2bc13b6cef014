use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::health::health_check;
use super::predictions::{assess_echo, predict_ef, AppState, MAX_UPLOAD_BYTES};

pub fn create_routes(state: AppState) -> Router {
    let ef_routes = Router::new()
        .route("/predict", post(predict_ef))
        .route("/assess", post(assess_echo))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/ef", ef_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
