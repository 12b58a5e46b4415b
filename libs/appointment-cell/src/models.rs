use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::Doctor;
use shared_database::DatabaseError;
use shared_models::error::AppError;

use crate::services::window::TimeWindow;

// ==============================================================================
// CONSULTATION MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Reason for the visit, as typed by whoever booked it.
    #[serde(default)]
    pub motif: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Consultation {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A start time as clients send it: an instant with an offset, or wall-clock
/// time to be read in the clinic's zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedStart {
    Absolute(DateTime<FixedOffset>),
    Local(NaiveDateTime),
}

impl RequestedStart {
    /// Ambiguous local times (clock set back) take the earlier instant;
    /// times skipped by a clock change are refused.
    pub fn resolve(&self, timezone: Tz) -> Result<DateTime<Utc>, AppointmentError> {
        match self {
            RequestedStart::Absolute(instant) => Ok(instant.with_timezone(&Utc)),
            RequestedStart::Local(naive) => match timezone.from_local_datetime(naive) {
                LocalResult::Single(local) => Ok(local.with_timezone(&Utc)),
                LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
                LocalResult::None => Err(AppointmentError::InvalidRequest(format!(
                    "{} does not exist in {} (clock change)",
                    naive, timezone
                ))),
            },
        }
    }
}

impl From<DateTime<Utc>> for RequestedStart {
    fn from(instant: DateTime<Utc>) -> Self {
        RequestedStart::Absolute(instant.into())
    }
}

impl FromStr for RequestedStart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
            return Ok(RequestedStart::Absolute(instant));
        }
        if let Ok(instant) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Ok(RequestedStart::Absolute(instant));
        }

        LOCAL_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
            .map(RequestedStart::Local)
            .ok_or_else(|| format!("invalid start time: {:?}", s))
    }
}

impl fmt::Display for RequestedStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedStart::Absolute(instant) => write!(f, "{}", instant.to_rfc3339()),
            RequestedStart::Local(naive) => write!(f, "{}", naive.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl Serialize for RequestedStart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestedStart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConsultationRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: RequestedStart,
    pub motif: Option<String>,
}

/// Self-booking body; the patient is whoever holds the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientBookingRequest {
    pub doctor_id: Uuid,
    pub start_time: RequestedStart,
    pub motif: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateConsultationRequest {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub start_time: Option<RequestedStart>,
    pub motif: Option<String>,
}

impl UpdateConsultationRequest {
    pub fn is_empty(&self) -> bool {
        self.doctor_id.is_none()
            && self.patient_id.is_none()
            && self.start_time.is_none()
            && self.motif.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsultationFilter {
    /// Calendar day in the clinic's time zone.
    pub date: Option<NaiveDate>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotCheckQuery {
    pub doctor_id: Uuid,
    pub start_time: RequestedStart,
    pub exclude_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarView {
    pub consultations: Vec<Consultation>,
    pub doctors: Vec<Doctor>,
    pub patients: Vec<Patient>,
}

/// Either `year` + `month`, or `start_date` + `end_date`; otherwise the
/// current month.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorCalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CalendarPeriod {
    pub fn month(year: i32, month: u32) -> Result<Self, AppointmentError> {
        let invalid = || AppointmentError::InvalidRequest(format!("Invalid month {}-{}", year, month));
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }

        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let end = next.and_then(|d| d.pred_opt()).ok_or_else(invalid)?;

        Ok(Self { start, end })
    }
}

impl DoctorCalendarQuery {
    /// Inclusive range of local days to show; `today` is in the clinic's zone.
    pub fn period(&self, today: NaiveDate) -> Result<CalendarPeriod, AppointmentError> {
        match (self.start_date, self.end_date, self.year, self.month) {
            (Some(start), Some(end), _, _) => {
                if start > end {
                    return Err(AppointmentError::InvalidRequest(
                        format!("start_date {} is after end_date {}", start, end),
                    ));
                }
                Ok(CalendarPeriod { start, end })
            },
            (_, _, Some(year), Some(month)) => CalendarPeriod::month(year, month),
            _ => CalendarPeriod::month(today.year(), today.month()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCalendar {
    pub period: CalendarPeriod,
    pub total_consultations: usize,
    /// Keyed by local calendar day.
    pub consultations_by_date: BTreeMap<NaiveDate, Vec<Consultation>>,
    pub all_consultations: Vec<Consultation>,
}

// ==============================================================================
// VALIDATION
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    OutsideWorkingHours,
    ScheduleConflict,
    InvalidScheduleFormat,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::OutsideWorkingHours => write!(f, "outside the doctor's working hours"),
            RejectionReason::ScheduleConflict => write!(f, "overlaps an existing consultation"),
            RejectionReason::InvalidScheduleFormat => write!(f, "doctor schedule cannot be read"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationResult {
    Accepted,
    Rejected {
        reason: RejectionReason,
        details: String,
    },
}

impl ValidationResult {
    pub fn rejected(reason: RejectionReason, details: impl Into<String>) -> Self {
        ValidationResult::Rejected { reason, details: details.into() }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted)
    }

    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            ValidationResult::Accepted => None,
            ValidationResult::Rejected { reason, .. } => Some(*reason),
        }
    }

    pub fn into_result(self) -> Result<(), AppointmentError> {
        match self {
            ValidationResult::Accepted => Ok(()),
            ValidationResult::Rejected { reason, details } => {
                Err(AppointmentError::Rejected { reason, details })
            }
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Consultation not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor is not approved for bookings")]
    DoctorNotApproved,

    #[error("Slot rejected, {reason}: {details}")]
    Rejected {
        reason: RejectionReason,
        details: String,
    },

    #[error("Consultation has already started")]
    AlreadyPast,

    #[error("Consultations can only be cancelled at least {notice_hours} hours in advance")]
    CancellationTooLate { notice_hours: i64 },

    #[error("Not authorized to access this consultation")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid consultation record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl AppointmentError {
    pub fn conflict(details: impl Into<String>) -> Self {
        AppointmentError::Rejected {
            reason: RejectionReason::ScheduleConflict,
            details: details.into(),
        }
    }
}

impl From<doctor_cell::DoctorError> for AppointmentError {
    fn from(e: doctor_cell::DoctorError) -> Self {
        match e {
            doctor_cell::DoctorError::NotFound => AppointmentError::DoctorNotFound,
            doctor_cell::DoctorError::InvalidRecord(msg) => AppointmentError::InvalidRecord(msg),
            doctor_cell::DoctorError::Database(db) => AppointmentError::Database(db),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound
            | AppointmentError::DoctorNotFound
            | AppointmentError::PatientNotFound => AppError::NotFound(e.to_string()),
            AppointmentError::Rejected { reason, .. } => {
                let message = e.to_string();
                match reason {
                    RejectionReason::OutsideWorkingHours => AppError::BadRequest(message),
                    RejectionReason::ScheduleConflict => AppError::Conflict(message),
                    RejectionReason::InvalidScheduleFormat => AppError::Unprocessable(message),
                }
            },
            AppointmentError::DoctorNotApproved
            | AppointmentError::AlreadyPast
            | AppointmentError::CancellationTooLate { .. }
            | AppointmentError::InvalidRequest(_) => AppError::BadRequest(e.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(e.to_string()),
            AppointmentError::InvalidRecord(msg) => AppError::Internal(msg),
            AppointmentError::Database(db) => AppError::from(db),
        }
    }
}
