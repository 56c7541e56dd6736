pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::screening::handlers;
use crate::state::AppState;

/// Upper bound on a request body, uploads included.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resumes
        .route(
            "/api/v1/resumes",
            post(handlers::handle_upload_resumes)
                .get(handlers::handle_list_resumes)
                .delete(handlers::handle_delete_all_resumes),
        )
        .route(
            "/api/v1/resumes/:id",
            get(handlers::handle_get_resume).delete(handlers::handle_delete_resume),
        )
        // Jobs
        .route(
            "/api/v1/jobs",
            post(handlers::handle_create_job)
                .get(handlers::handle_list_jobs)
                .delete(handlers::handle_delete_all_jobs),
        )
        .route("/api/v1/jobs/upload", post(handlers::handle_upload_job))
        .route(
            "/api/v1/jobs/:id",
            get(handlers::handle_get_job).delete(handlers::handle_delete_job),
        )
        // Two-phase matching
        .route(
            "/api/v1/jobs/:id/requirements",
            get(handlers::handle_get_requirements),
        )
        .route(
            "/api/v1/jobs/:id/requirements/refresh",
            post(handlers::handle_refresh_requirements),
        )
        .route("/api/v1/jobs/:id/match", post(handlers::handle_match))
        .route("/api/v1/jobs/:id/results", get(handlers::handle_get_results))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
