// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use shared_config::{SchedulingConfig, MAX_CANCELLATION_NOTICE_HOURS};

use crate::models::AppointmentError;

pub struct AppointmentLifecycleService {
    notice_hours: i64,
}

impl AppointmentLifecycleService {
    pub fn new(config: &SchedulingConfig) -> Self {
        Self::with_notice_hours(config.cancellation_notice_hours)
    }

    /// Notice is kept within `0..=MAX_CANCELLATION_NOTICE_HOURS`.
    pub fn with_notice_hours(notice_hours: i64) -> Self {
        Self { notice_hours: notice_hours.clamp(0, MAX_CANCELLATION_NOTICE_HOURS) }
    }

    pub fn notice_hours(&self) -> i64 {
        self.notice_hours
    }

    /// A patient may cancel only a future consultation, and only with the
    /// configured notice. Exactly `notice_hours` ahead is still allowed.
    pub fn validate_cancellation(
        &self,
        start_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if start_time < now {
            warn!("Cancellation refused: consultation at {} is in the past", start_time);
            return Err(AppointmentError::AlreadyPast);
        }

        let lead = start_time - now;
        if lead < Duration::hours(self.notice_hours) {
            warn!(
                "Cancellation refused: consultation at {} is only {} minutes away",
                start_time,
                lead.num_minutes()
            );
            return Err(AppointmentError::CancellationTooLate { notice_hours: self.notice_hours });
        }

        debug!("Cancellation allowed for consultation at {}", start_time);
        Ok(())
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new(&SchedulingConfig::default())
    }
}
