//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - permissive; the gateway in front restricts origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.max_upload_bytes();

    let predict = Router::new()
        .route("/single", post(handlers::predict_single))
        .route("/results", get(handlers::list_predictions))
        .route(
            "/results/{prediction_id}",
            get(handlers::get_prediction).delete(handlers::delete_prediction),
        )
        .route("/location", get(handlers::predictions_by_location))
        .route("/date-range", get(handlers::predictions_by_date_range))
        .route("/latest", get(handlers::latest_predictions))
        .route("/batch/{upload_id}", get(handlers::batch_results))
        .route("/statistics", get(handlers::prediction_statistics));

    let reports = Router::new()
        .route("/", get(handlers::list_reports))
        .route("/generate", post(handlers::generate_report))
        .route("/export/csv", post(handlers::export_csv))
        .route(
            "/templates",
            get(handlers::list_templates).post(handlers::save_template),
        )
        .route(
            "/schedules",
            get(handlers::list_report_schedules).post(handlers::create_report_schedule),
        )
        .route(
            "/schedules/{schedule_id}",
            delete(handlers::cancel_report_schedule),
        )
        .route(
            "/{report_id}",
            get(handlers::get_report).delete(handlers::delete_report),
        )
        .route("/{report_id}/status", get(handlers::report_status))
        .route("/{report_id}/data", get(handlers::report_data))
        .route("/{report_id}/download", get(handlers::download_report))
        .route("/{report_id}/events", get(handlers::stream_report_status));

    // Build the API router with versioned endpoints
    let api_v1 = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/data", get(handlers::list_analyses))
        .route(
            "/data/{analysis_id}",
            get(handlers::get_analysis).delete(handlers::delete_analysis),
        )
        .nest("/predict", predict)
        .nest("/reports", reports);

    // Combine all routes
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
