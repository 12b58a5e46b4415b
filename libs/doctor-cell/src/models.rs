use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;

// ==============================================================================
// DOCTOR MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub phone: String,
    /// Free-form weekly hours, e.g. `"Lun-Ven 9:00-17:00"`.
    pub schedule: Option<String>,
    #[serde(default)]
    pub is_approved: bool,
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("Dr. {} {}", self.first_name, self.last_name).trim_end().to_string()
    }
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

/// Weekly working-hours window parsed from a doctor's schedule text.
///
/// Weekdays are numbered from Monday (0) to Sunday (6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub active_weekdays: BTreeSet<u8>,
    pub daily_start: NaiveTime,
    pub daily_end: NaiveTime,
}

impl Availability {
    pub fn new(active_weekdays: BTreeSet<u8>, daily_start: NaiveTime, daily_end: NaiveTime) -> Self {
        Self { active_weekdays, daily_start, daily_end }
    }

    pub fn includes_weekday(&self, weekday: Weekday) -> bool {
        self.active_weekdays.contains(&(weekday.num_days_from_monday() as u8))
    }

    pub fn weekdays(&self) -> Vec<Weekday> {
        self.active_weekdays
            .iter()
            .filter_map(|d| Weekday::try_from(*d).ok())
            .collect()
    }

    /// A window whose end is not after its start never admits a slot.
    pub fn is_inverted(&self) -> bool {
        self.daily_start >= self.daily_end
    }

    /// Whether a slot given in local wall-clock time fits the window.
    ///
    /// Each endpoint's weekday is checked on its own, so a slot that runs
    /// past midnight is refused even when both days are working days.
    pub fn admits(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.includes_weekday(start.weekday())
            && self.includes_weekday(end.weekday())
            && start.time() >= self.daily_start
            && end.time() <= self.daily_end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleParseError {
    #[error("schedule is empty")]
    Empty,

    #[error("schedule has no time range")]
    MissingTimeRange,

    #[error("unrecognised day token: {0}")]
    UnknownDay(String),

    #[error("no recognisable day in: {0}")]
    NoDays(String),

    #[error("malformed time range: {0}")]
    MalformedTimeRange(String),

    #[error("invalid time of day: {0}")]
    InvalidTime(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorAvailabilityResponse {
    pub doctor_id: Uuid,
    pub schedule: Option<String>,
    pub parsable: bool,
    pub availability: Option<Availability>,
    pub parse_error: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Invalid doctor record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<DoctorError> for AppError {
    fn from(e: DoctorError) -> Self {
        match e {
            DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
            DoctorError::InvalidRecord(msg) => AppError::Internal(msg),
            DoctorError::Database(db) => AppError::from(db),
        }
    }
}
