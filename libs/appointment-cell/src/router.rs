// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

/// Staff routes, mounted under `/consultations`.
pub fn consultation_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::list_consultations).post(handlers::create_consultation))
        .route("/check", get(handlers::check_slot))
        .route("/date/{date}", get(handlers::consultations_by_date))
        .route("/patients/{patient_id}", get(handlers::patient_history))
        .route("/doctors/{doctor_id}", get(handlers::doctor_consultations))
        .route(
            "/{consultation_id}",
            get(handlers::get_consultation)
                .put(handlers::update_consultation)
                .delete(handlers::delete_consultation),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

/// Mounted under `/admin/calendar`.
pub fn admin_calendar_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(handlers::get_calendar))
        .route("/consultations", post(handlers::admin_create_consultation))
        .route(
            "/consultations/{consultation_id}",
            put(handlers::admin_update_consultation).delete(handlers::admin_delete_consultation),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

/// Mounted under `/doctor`.
pub fn doctor_calendar_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/consultations", get(handlers::doctor_calendar))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

/// Mounted under `/patient`.
pub fn patient_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/consultations", get(handlers::my_consultations))
        .route("/consultations/{consultation_id}", get(handlers::my_consultation))
        .route("/appointments", post(handlers::book_appointment))
        .route("/appointments/{consultation_id}", delete(handlers::cancel_appointment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
