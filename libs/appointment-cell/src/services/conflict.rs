use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentError, Consultation};
use crate::services::window::TimeWindow;

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// The doctor's consultations that may overlap `window`, oldest first.
    ///
    /// The filter is only a narrowing step; the validator re-applies the
    /// overlap test on what comes back.
    pub async fn find_candidates(
        &self,
        doctor_id: Uuid,
        window: &TimeWindow,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Consultation>, AppointmentError> {
        debug!("Looking up consultations of doctor {} around {} - {}", doctor_id, window.start, window.end);

        let mut path = format!(
            "/rest/v1/consultations?doctor_id=eq.{}&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            doctor_id,
            urlencoding::encode(&window.end.to_rfc3339()),
            urlencoding::encode(&window.start.to_rfc3339()),
        );
        if let Some(id) = exclude_id {
            path.push_str(&format!("&id=neq.{}", id));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let candidates = parse_consultations(result)?;
        debug!("Found {} candidate consultations", candidates.len());
        Ok(candidates)
    }
}

pub(crate) fn parse_consultations(rows: Vec<Value>) -> Result<Vec<Consultation>, AppointmentError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Consultation>, _>>()
        .map_err(|e| AppointmentError::InvalidRecord(format!("Failed to parse consultations: {}", e)))
}
