// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::{NaiveDate, Utc};
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::{
    BookConsultationRequest, CalendarQuery, ConsultationFilter, DoctorCalendarQuery,
    PatientBookingRequest, SlotCheckQuery, UpdateConsultationRequest,
};
use crate::services::booking::ConsultationBookingService;

const STAFF: &[UserRole] = &[UserRole::Admin, UserRole::Doctor];

// ==============================================================================
// CONSULTATION HANDLERS (ADMIN / DOCTOR)
// ==============================================================================

#[axum::debug_handler]
pub async fn list_consultations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(filter): Query<ConsultationFilter>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, STAFF)?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultations = booking_service.list_consultations(&filter, auth.token()).await?;

    Ok(Json(json!({
        "consultations": consultations,
        "total": consultations.len()
    })))
}

#[axum::debug_handler]
pub async fn create_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookConsultationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, STAFF)?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultation = booking_service.book_consultation(request, auth.token()).await?;

    Ok((StatusCode::CREATED, Json(json!(consultation))))
}

/// Reports what a booking at `start_time` would be told, without writing.
#[axum::debug_handler]
pub async fn check_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<SlotCheckQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, STAFF)?;

    let booking_service = ConsultationBookingService::new(&state);
    let (start_time, decision) = booking_service
        .check_slot(query.doctor_id, &query.start_time, query.exclude_id, auth.token())
        .await?;

    Ok(Json(json!({
        "doctor_id": query.doctor_id,
        "start_time": start_time,
        "available": decision.is_accepted(),
        "decision": decision
    })))
}

#[axum::debug_handler]
pub async fn consultations_by_date(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, STAFF)?;

    let filter = ConsultationFilter { date: Some(date), ..Default::default() };
    let booking_service = ConsultationBookingService::new(&state);
    let consultations = booking_service.list_consultations(&filter, auth.token()).await?;

    Ok(Json(json!({
        "date": date,
        "consultations": consultations,
        "total": consultations.len()
    })))
}

#[axum::debug_handler]
pub async fn patient_history(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, STAFF)?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultations = booking_service.consultations_for_patient(patient_id, auth.token()).await?;

    Ok(Json(json!({
        "patient_id": patient_id,
        "consultations": consultations,
        "total": consultations.len()
    })))
}

#[axum::debug_handler]
pub async fn doctor_consultations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, STAFF)?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultations = booking_service.consultations_for_doctor(doctor_id, auth.token()).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "consultations": consultations,
        "total": consultations.len()
    })))
}

#[axum::debug_handler]
pub async fn get_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, STAFF)?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultation = booking_service.get_consultation(consultation_id, auth.token()).await?;

    Ok(Json(json!(consultation)))
}

#[axum::debug_handler]
pub async fn update_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<UpdateConsultationRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, STAFF)?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultation = booking_service
        .update_consultation(consultation_id, request, auth.token())
        .await?;

    Ok(Json(json!(consultation)))
}

#[axum::debug_handler]
pub async fn delete_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&user, STAFF)?;

    let booking_service = ConsultationBookingService::new(&state);
    booking_service.delete_consultation(consultation_id, auth.token()).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// ADMIN CALENDAR HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_calendar(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Admin])?;

    let booking_service = ConsultationBookingService::new(&state);
    let calendar = booking_service.calendar(&query, auth.token()).await?;

    Ok(Json(json!(calendar)))
}

#[axum::debug_handler]
pub async fn admin_create_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookConsultationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, &[UserRole::Admin])?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultation = booking_service.book_consultation(request, auth.token()).await?;

    Ok((StatusCode::CREATED, Json(json!(consultation))))
}

#[axum::debug_handler]
pub async fn admin_update_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
    Json(request): Json<UpdateConsultationRequest>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Admin])?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultation = booking_service
        .update_consultation(consultation_id, request, auth.token())
        .await?;

    Ok(Json(json!(consultation)))
}

#[axum::debug_handler]
pub async fn admin_delete_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&user, &[UserRole::Admin])?;

    let booking_service = ConsultationBookingService::new(&state);
    booking_service.delete_consultation(consultation_id, auth.token()).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// DOCTOR CALENDAR HANDLERS
// ==============================================================================

/// The calling doctor's own consultations, defaulting to the current month.
#[axum::debug_handler]
pub async fn doctor_calendar(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DoctorCalendarQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Doctor])?;

    let booking_service = ConsultationBookingService::new(&state);
    let calendar = booking_service
        .doctor_calendar(&user, &query, Utc::now(), auth.token())
        .await?;

    Ok(Json(json!(calendar)))
}

// ==============================================================================
// PATIENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn my_consultations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Patient])?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultations = booking_service.patient_consultations(&user, auth.token()).await?;

    Ok(Json(json!({
        "consultations": consultations,
        "total": consultations.len()
    })))
}

#[axum::debug_handler]
pub async fn my_consultation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Patient])?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultation = booking_service
        .patient_consultation(&user, consultation_id, auth.token())
        .await?;

    Ok(Json(json!(consultation)))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<PatientBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, &[UserRole::Patient])?;

    let booking_service = ConsultationBookingService::new(&state);
    let consultation = booking_service.book_for_patient(&user, request, auth.token()).await?;

    Ok((StatusCode::CREATED, Json(json!(consultation))))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(consultation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, &[UserRole::Patient])?;

    let booking_service = ConsultationBookingService::new(&state);
    booking_service
        .cancel_for_patient(&user, consultation_id, Utc::now(), auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Consultation cancelled"
    })))
}
