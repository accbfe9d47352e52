use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/session", post(handlers::sign_in).delete(handlers::sign_out))
        .route("/api/load", post(handlers::reload))
        .route("/api/status", get(handlers::get_status))
        .route("/api/entries", get(handlers::list_entries).post(handlers::create_entry))
        .route(
            "/api/entries/:id",
            patch(handlers::update_entry).delete(handlers::delete_entry),
        )
        .route(
            "/api/track-types",
            get(handlers::list_track_types).post(handlers::create_track_type),
        )
        .route(
            "/api/track-types/:id",
            patch(handlers::update_track_type).delete(handlers::delete_track_type),
        )
        .route("/api/calendar/:month", get(handlers::get_calendar))
        .route("/api/timeline", get(handlers::get_timeline))
        .route("/api/timeline/extend", post(handlers::extend_timeline))
        .route("/api/timeline/settle", post(handlers::settle_timeline))
        .route("/api/timeline/target", post(handlers::target_timeline))
        .route("/api/activities", get(handlers::get_activities))
        .route("/api/export", get(handlers::export))
        .with_state(state)
}
