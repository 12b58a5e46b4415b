use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;

use crate::services::doctor::DoctorService;

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    /// Admin calendar needs doctors still awaiting approval as well.
    pub include_unapproved: Option<bool>,
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<Value>, AppError> {
    let include_unapproved = query.include_unapproved.unwrap_or(false);
    if include_unapproved && !user.has_role(UserRole::Admin) {
        return Err(AppError::Forbidden("Only administrators can list unapproved doctors".to_string()));
    }

    let doctor_service = DoctorService::new(&state);
    let doctors = doctor_service.list_doctors(!include_unapproved, auth.token()).await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);
    let doctor = doctor_service.get_doctor(doctor_id, auth.token()).await?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn get_doctor_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);
    let availability = doctor_service.get_availability(doctor_id, auth.token()).await?;

    Ok(Json(json!(availability)))
}
