// libs/appointment-cell/src/services/booking.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::models::Doctor;
use doctor_cell::services::doctor::DoctorService;
use shared_config::AppConfig;
use shared_database::{supabase::SupabaseClient, DatabaseError};
use shared_models::auth::User;

use crate::models::{
    AppointmentError, BookConsultationRequest, CalendarPeriod, CalendarQuery, CalendarView,
    Consultation, ConsultationFilter, DoctorCalendar, DoctorCalendarQuery, Patient,
    PatientBookingRequest, RequestedStart, UpdateConsultationRequest, ValidationResult,
};
use crate::services::conflict::{parse_consultations, ConflictDetectionService};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::validator::AppointmentValidator;
use crate::services::window::local_day_bounds;

pub struct ConsultationBookingService {
    supabase: Arc<SupabaseClient>,
    doctor_service: DoctorService,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    validator: AppointmentValidator,
    timezone: Tz,
}

impl ConsultationBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            doctor_service: DoctorService::new(config),
            lifecycle_service: AppointmentLifecycleService::new(&config.scheduling),
            validator: AppointmentValidator::new(&config.scheduling),
            timezone: config.scheduling.timezone,
            supabase,
        }
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    /// Create a consultation for any patient (admin calendar and staff).
    pub async fn book_consultation(
        &self,
        request: BookConsultationRequest,
        auth_token: &str,
    ) -> Result<Consultation, AppointmentError> {
        debug!("Booking consultation for patient {} with doctor {} at {}",
               request.patient_id, request.doctor_id, request.start_time);

        let start_time = self.resolve_start(&request.start_time)?;
        let doctor = self.bookable_doctor(request.doctor_id, auth_token).await?;
        self.get_patient(request.patient_id, auth_token).await?;

        self.ensure_slot(&doctor, start_time, None, auth_token).await?;

        let window = self.validator.proposed_window(start_time);
        let body = json!({
            "doctor_id": request.doctor_id,
            "patient_id": request.patient_id,
            "start_time": window.start.to_rfc3339(),
            "end_time": window.end.to_rfc3339(),
            "motif": request.motif.unwrap_or_default(),
        });

        let result = self.supabase
            .request_returning(Method::POST, "/rest/v1/consultations", Some(auth_token), Some(body))
            .await
            .map_err(map_write_error)?;

        let consultation = first_consultation(result)?;
        info!("Consultation {} booked with doctor {} at {}",
              consultation.id, consultation.doctor_id, consultation.start_time);
        Ok(consultation)
    }

    /// Self-booking: the patient record is resolved from the caller's account.
    pub async fn book_for_patient(
        &self,
        user: &User,
        request: PatientBookingRequest,
        auth_token: &str,
    ) -> Result<Consultation, AppointmentError> {
        let patient = self.patient_for_user(user, auth_token).await?;

        self.book_consultation(BookConsultationRequest {
            doctor_id: request.doctor_id,
            patient_id: patient.id,
            start_time: request.start_time,
            motif: request.motif,
        }, auth_token).await
    }

    /// Move or edit a consultation. A new doctor or start time is validated
    /// again, ignoring the consultation being edited.
    pub async fn update_consultation(
        &self,
        consultation_id: Uuid,
        request: UpdateConsultationRequest,
        auth_token: &str,
    ) -> Result<Consultation, AppointmentError> {
        debug!("Updating consultation {}", consultation_id);

        let current = self.get_consultation(consultation_id, auth_token).await?;
        if request.is_empty() {
            return Ok(current);
        }

        let doctor_id = request.doctor_id.unwrap_or(current.doctor_id);
        let start_time = match &request.start_time {
            Some(requested) => self.resolve_start(requested)?,
            None => current.start_time,
        };
        let mut changes = Map::new();

        if doctor_id != current.doctor_id || start_time != current.start_time {
            let doctor = self.bookable_doctor(doctor_id, auth_token).await?;
            self.ensure_slot(&doctor, start_time, Some(consultation_id), auth_token).await?;

            let window = self.validator.proposed_window(start_time);
            changes.insert("doctor_id".to_string(), json!(doctor_id));
            changes.insert("start_time".to_string(), json!(window.start.to_rfc3339()));
            changes.insert("end_time".to_string(), json!(window.end.to_rfc3339()));
        }

        if let Some(patient_id) = request.patient_id.filter(|id| *id != current.patient_id) {
            self.get_patient(patient_id, auth_token).await?;
            changes.insert("patient_id".to_string(), json!(patient_id));
        }

        if let Some(motif) = request.motif {
            changes.insert("motif".to_string(), json!(motif));
        }

        if changes.is_empty() {
            return Ok(current);
        }
        changes.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/consultations?id=eq.{}", consultation_id);
        let result = self.supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), Some(Value::Object(changes)))
            .await
            .map_err(map_write_error)?;

        let consultation = first_consultation(result)?;
        info!("Consultation {} updated", consultation.id);
        Ok(consultation)
    }

    /// Dry run of the booking decision; nothing is written.
    pub async fn check_slot(
        &self,
        doctor_id: Uuid,
        start_time: &RequestedStart,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(DateTime<Utc>, ValidationResult), AppointmentError> {
        let start_time = self.resolve_start(start_time)?;
        let doctor = self.doctor_service.get_doctor(doctor_id, auth_token).await?;
        let decision = self.evaluate(&doctor, start_time, exclude_id, auth_token).await?;
        Ok((start_time, decision))
    }

    // ==============================================================================
    // CANCELLATION
    // ==============================================================================

    /// Patient cancellation, subject to the notice rule.
    pub async fn cancel_for_patient(
        &self,
        user: &User,
        consultation_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let patient = self.patient_for_user(user, auth_token).await?;
        let consultation = self.get_consultation(consultation_id, auth_token).await?;

        if consultation.patient_id != patient.id {
            warn!("Patient {} tried to cancel consultation {} of another patient", patient.id, consultation_id);
            return Err(AppointmentError::Unauthorized);
        }

        self.lifecycle_service.validate_cancellation(consultation.start_time, now)?;
        self.delete_consultation(consultation_id, auth_token).await
    }

    /// Staff deletion; no notice rule applies.
    pub async fn delete_consultation(
        &self,
        consultation_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/consultations?id=eq.{}", consultation_id);
        let deleted = self.supabase
            .request_returning(Method::DELETE, &path, Some(auth_token), None)
            .await?;

        if deleted.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        info!("Consultation {} deleted", consultation_id);
        Ok(())
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_consultation(
        &self,
        consultation_id: Uuid,
        auth_token: &str,
    ) -> Result<Consultation, AppointmentError> {
        let path = format!("/rest/v1/consultations?id=eq.{}&limit=1", consultation_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        first_consultation(result)
    }

    /// Filtered listing, oldest first. `date` is a day in the clinic's zone.
    pub async fn list_consultations(
        &self,
        filter: &ConsultationFilter,
        auth_token: &str,
    ) -> Result<Vec<Consultation>, AppointmentError> {
        let mut query_parts = vec!["order=start_time.asc".to_string()];

        if let Some(date) = filter.date {
            let day = local_day_bounds(date, self.timezone)
                .ok_or_else(|| AppointmentError::InvalidRequest(format!("Unsupported date {}", date)))?;
            query_parts.push(format!("start_time=gte.{}", urlencoding::encode(&day.start.to_rfc3339())));
            query_parts.push(format!("start_time=lt.{}", urlencoding::encode(&day.end.to_rfc3339())));
        }
        if let Some(patient_id) = filter.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = filter.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }

        self.fetch_consultations(&query_parts.join("&"), auth_token).await
    }

    /// A patient's history, newest first.
    pub async fn consultations_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Consultation>, AppointmentError> {
        let query = format!("patient_id=eq.{}&order=start_time.desc", patient_id);
        self.fetch_consultations(&query, auth_token).await
    }

    /// A doctor's consultations, newest first.
    pub async fn consultations_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Consultation>, AppointmentError> {
        let query = format!("doctor_id=eq.{}&order=start_time.desc", doctor_id);
        self.fetch_consultations(&query, auth_token).await
    }

    pub async fn patient_consultations(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Consultation>, AppointmentError> {
        let patient = self.patient_for_user(user, auth_token).await?;
        self.consultations_for_patient(patient.id, auth_token).await
    }

    /// One consultation, only if it belongs to the calling patient.
    pub async fn patient_consultation(
        &self,
        user: &User,
        consultation_id: Uuid,
        auth_token: &str,
    ) -> Result<Consultation, AppointmentError> {
        let patient = self.patient_for_user(user, auth_token).await?;
        let consultation = self.get_consultation(consultation_id, auth_token).await?;

        if consultation.patient_id != patient.id {
            return Err(AppointmentError::NotFound);
        }
        Ok(consultation)
    }

    /// Consultations between two local days (inclusive) plus the doctors to
    /// lay them out against.
    pub async fn calendar(
        &self,
        query: &CalendarQuery,
        auth_token: &str,
    ) -> Result<CalendarView, AppointmentError> {
        if let (Some(start), Some(end)) = (query.start, query.end) {
            if start > end {
                return Err(AppointmentError::InvalidRequest(
                    format!("Calendar start {} is after end {}", start, end),
                ));
            }
        }

        let mut query_parts = vec!["order=start_time.asc".to_string()];
        if let Some(start) = query.start {
            let day = local_day_bounds(start, self.timezone)
                .ok_or_else(|| AppointmentError::InvalidRequest(format!("Unsupported date {}", start)))?;
            query_parts.push(format!("start_time=gte.{}", urlencoding::encode(&day.start.to_rfc3339())));
        }
        if let Some(end) = query.end {
            let day = local_day_bounds(end, self.timezone)
                .ok_or_else(|| AppointmentError::InvalidRequest(format!("Unsupported date {}", end)))?;
            query_parts.push(format!("start_time=lt.{}", urlencoding::encode(&day.end.to_rfc3339())));
        }
        if let Some(doctor_id) = query.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }

        let consultations = self.fetch_consultations(&query_parts.join("&"), auth_token).await?;
        let doctors = match query.doctor_id {
            Some(doctor_id) => vec![self.doctor_service.get_doctor(doctor_id, auth_token).await?],
            None => self.doctor_service.list_doctors(false, auth_token).await?,
        };
        let patients = self.list_patients(auth_token).await?;

        Ok(CalendarView { consultations, doctors, patients })
    }

    /// The calling doctor's consultations over a period, grouped by local day.
    pub async fn doctor_calendar(
        &self,
        user: &User,
        query: &DoctorCalendarQuery,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<DoctorCalendar, AppointmentError> {
        let today = now.with_timezone(&self.timezone).date_naive();
        let period = query.period(today)?;
        let doctor = self.doctor_service.get_doctor_for_user(&user.id, auth_token).await?;
        debug!("Doctor calendar for {} from {} to {}", doctor.id, period.start, period.end);

        let (from, until) = self.period_bounds(&period)?;
        let consultations = self.fetch_consultations(&format!(
            "doctor_id=eq.{}&start_time=gte.{}&start_time=lt.{}&order=start_time.asc",
            doctor.id,
            urlencoding::encode(&from.to_rfc3339()),
            urlencoding::encode(&until.to_rfc3339()),
        ), auth_token).await?;

        let mut consultations_by_date: BTreeMap<_, Vec<Consultation>> = BTreeMap::new();
        for consultation in &consultations {
            let day = consultation.start_time.with_timezone(&self.timezone).date_naive();
            consultations_by_date.entry(day).or_default().push(consultation.clone());
        }

        Ok(DoctorCalendar {
            period,
            total_consultations: consultations.len(),
            consultations_by_date,
            all_consultations: consultations,
        })
    }

    // ==============================================================================
    // HELPERS
    // ==============================================================================

    fn resolve_start(&self, requested: &RequestedStart) -> Result<DateTime<Utc>, AppointmentError> {
        requested.resolve(self.timezone)
    }

    fn period_bounds(&self, period: &CalendarPeriod) -> Result<(DateTime<Utc>, DateTime<Utc>), AppointmentError> {
        let unsupported = || AppointmentError::InvalidRequest("Unsupported calendar period".to_string());
        let first = local_day_bounds(period.start, self.timezone).ok_or_else(unsupported)?;
        let last = local_day_bounds(period.end, self.timezone).ok_or_else(unsupported)?;
        Ok((first.start, last.end))
    }

    async fn list_patients(&self, auth_token: &str) -> Result<Vec<Patient>, AppointmentError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            "/rest/v1/patients?order=last_name.asc",
            Some(auth_token),
            None,
        ).await?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Patient>, _>>()
            .map_err(|e| AppointmentError::InvalidRecord(format!("Failed to parse patients: {}", e)))
    }

    async fn bookable_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, AppointmentError> {
        let doctor = self.doctor_service.get_doctor(doctor_id, auth_token).await?;
        if !doctor.is_approved {
            warn!("Refusing booking with unapproved doctor {} ({})", doctor.full_name(), doctor_id);
            return Err(AppointmentError::DoctorNotApproved);
        }
        Ok(doctor)
    }

    async fn evaluate(
        &self,
        doctor: &Doctor,
        start_time: DateTime<Utc>,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ValidationResult, AppointmentError> {
        let window = self.validator.proposed_window(start_time);
        let candidates = self.conflict_service
            .find_candidates(doctor.id, &window, exclude_id, auth_token)
            .await?;

        Ok(self.validator.validate(
            doctor.id,
            doctor.schedule.as_deref(),
            start_time,
            &candidates,
            exclude_id,
        ))
    }

    async fn ensure_slot(
        &self,
        doctor: &Doctor,
        start_time: DateTime<Utc>,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let decision = self.evaluate(doctor, start_time, exclude_id, auth_token).await?;
        if let ValidationResult::Rejected { reason, details } = &decision {
            warn!("Slot {} with doctor {} rejected ({:?}): {}", start_time, doctor.id, reason, details);
        }
        decision.into_result()
    }

    async fn get_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<Patient, AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&limit=1", patient_id);
        self.fetch_patient(&path, auth_token).await
    }

    async fn patient_for_user(&self, user: &User, auth_token: &str) -> Result<Patient, AppointmentError> {
        let path = format!("/rest/v1/patients?user_id=eq.{}&limit=1", urlencoding::encode(&user.id));
        self.fetch_patient(&path, auth_token).await
    }

    async fn fetch_patient(&self, path: &str, auth_token: &str) -> Result<Patient, AppointmentError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(AppointmentError::PatientNotFound)?;
        serde_json::from_value(row)
            .map_err(|e| AppointmentError::InvalidRecord(format!("Failed to parse patient: {}", e)))
    }

    async fn fetch_consultations(&self, query: &str, auth_token: &str) -> Result<Vec<Consultation>, AppointmentError> {
        let path = format!("/rest/v1/consultations?{}", query);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        parse_consultations(result)
    }
}

/// The exclusion constraint on `consultations` answers 409 when a concurrent
/// booking won the slot.
fn map_write_error(e: DatabaseError) -> AppointmentError {
    match e {
        DatabaseError::Conflict(msg) => {
            warn!("Storage rejected overlapping consultation: {}", msg);
            AppointmentError::conflict("Slot was taken by a concurrent booking")
        },
        other => AppointmentError::Database(other),
    }
}

fn first_consultation(rows: Vec<Value>) -> Result<Consultation, AppointmentError> {
    let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
    serde_json::from_value(row)
        .map_err(|e| AppointmentError::InvalidRecord(format!("Failed to parse consultation: {}", e)))
}
