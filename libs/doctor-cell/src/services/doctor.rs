use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Doctor, DoctorAvailabilityResponse, DoctorError};
use crate::services::schedule::ScheduleParser;

pub struct DoctorService {
    supabase: SupabaseClient,
    parser: ScheduleParser,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            parser: ScheduleParser::new(config.scheduling.schedule_parse_mode),
        }
    }

    /// Fetch a doctor, including the raw schedule text.
    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}&limit=1", doctor_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| DoctorError::InvalidRecord(format!("Failed to parse doctor: {}", e)))
    }

    /// The doctor profile linked to an account.
    pub async fn get_doctor_for_user(&self, user_id: &str, auth_token: &str) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor for user: {}", user_id);

        let path = format!("/rest/v1/doctors?user_id=eq.{}&limit=1", urlencoding::encode(user_id));
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| DoctorError::InvalidRecord(format!("Failed to parse doctor: {}", e)))
    }

    /// List doctors ordered by last name; patients only ever see approved ones.
    pub async fn list_doctors(&self, approved_only: bool, auth_token: &str) -> Result<Vec<Doctor>, DoctorError> {
        debug!("Listing doctors (approved_only: {})", approved_only);

        let mut path = "/rest/v1/doctors?order=last_name.asc".to_string();
        if approved_only {
            path.push_str("&is_approved=eq.true");
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Doctor>, _>>()
            .map_err(|e| DoctorError::InvalidRecord(format!("Failed to parse doctors: {}", e)))
    }

    /// Parse the doctor's schedule and report what the booking checks will see.
    pub async fn get_availability(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<DoctorAvailabilityResponse, DoctorError> {
        let doctor = self.get_doctor(doctor_id, auth_token).await?;

        let (availability, parse_error) = match self.parser.parse(doctor.schedule.as_deref()) {
            Ok(availability) => {
                if availability.is_inverted() {
                    warn!("Doctor {} has an inverted working-hours window: {:?}", doctor_id, doctor.schedule);
                }
                (Some(availability), None)
            },
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(DoctorAvailabilityResponse {
            doctor_id,
            parsable: availability.is_some(),
            schedule: doctor.schedule,
            availability,
            parse_error,
        })
    }
}
