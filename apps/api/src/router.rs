use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{
    admin_calendar_routes, consultation_routes, doctor_calendar_routes, patient_routes,
};
use doctor_cell::router::doctor_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/consultations", consultation_routes(state.clone()))
        .nest("/admin/calendar", admin_calendar_routes(state.clone()))
        .nest("/doctor", doctor_calendar_routes(state.clone()))
        .nest("/patient", patient_routes(state))
}
