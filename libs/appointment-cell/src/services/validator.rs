// libs/appointment-cell/src/services/validator.rs
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};
use uuid::Uuid;

use doctor_cell::models::Availability;
use doctor_cell::services::schedule::ScheduleParser;
use shared_config::{ScheduleFormatPolicy, SchedulingConfig, MAX_CONSULTATION_MINUTES};

use crate::models::{Consultation, RejectionReason, ValidationResult};
use crate::services::window::TimeWindow;

/// Decides whether a proposed consultation may be written.
///
/// Every create and update path goes through [`AppointmentValidator::validate`]:
/// the doctor's schedule is parsed once, the slot is checked against the
/// working hours in the clinic's time zone, then against the doctor's other
/// consultations. A working-hours or schedule-format rejection is reported in
/// preference to a conflict.
#[derive(Debug, Clone)]
pub struct AppointmentValidator {
    parser: ScheduleParser,
    policy: ScheduleFormatPolicy,
    timezone: Tz,
    duration_minutes: i64,
}

impl AppointmentValidator {
    pub fn new(config: &SchedulingConfig) -> Self {
        Self {
            parser: ScheduleParser::new(config.schedule_parse_mode),
            policy: config.schedule_format_policy,
            timezone: config.timezone,
            duration_minutes: config.consultation_minutes.clamp(1, MAX_CONSULTATION_MINUTES),
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration_minutes
    }

    pub fn proposed_window(&self, proposed_start: DateTime<Utc>) -> TimeWindow {
        TimeWindow::starting_at(proposed_start, self.duration_minutes)
    }

    pub fn validate(
        &self,
        doctor_id: Uuid,
        schedule: Option<&str>,
        proposed_start: DateTime<Utc>,
        existing: &[Consultation],
        exclude_id: Option<Uuid>,
    ) -> ValidationResult {
        let window = self.proposed_window(proposed_start);

        let hours_rejection = self.check_working_hours(doctor_id, schedule, &window);
        let conflicts = find_conflicts(&window, existing, exclude_id);

        if let Some(rejection) = hours_rejection {
            return rejection;
        }

        if !conflicts.is_empty() {
            let ids: Vec<String> = conflicts.iter().map(|c| c.id.to_string()).collect();
            debug!("Doctor {} slot {} conflicts with {:?}", doctor_id, window.start, ids);
            return ValidationResult::rejected(
                RejectionReason::ScheduleConflict,
                format!("Overlaps consultation(s): {}", ids.join(", ")),
            );
        }

        ValidationResult::Accepted
    }

    fn check_working_hours(
        &self,
        doctor_id: Uuid,
        schedule: Option<&str>,
        window: &TimeWindow,
    ) -> Option<ValidationResult> {
        let availability = match self.parser.parse(schedule) {
            Ok(availability) => availability,
            Err(_) if schedule.map(str::trim).unwrap_or_default().is_empty() => return None,
            Err(e) => {
                warn!(
                    "Doctor {} has an unreadable schedule {:?} ({}), policy: {}",
                    doctor_id, schedule, e, self.policy
                );
                return match self.policy {
                    ScheduleFormatPolicy::Strict => Some(ValidationResult::rejected(
                        RejectionReason::InvalidScheduleFormat,
                        format!("Schedule {:?} could not be parsed: {}", schedule.unwrap_or_default(), e),
                    )),
                    ScheduleFormatPolicy::Permissive => None,
                };
            },
        };

        let local_start = window.start.with_timezone(&self.timezone).naive_local();
        let local_end = window.end.with_timezone(&self.timezone).naive_local();

        if availability.admits(local_start, local_end) {
            return None;
        }

        Some(ValidationResult::rejected(
            RejectionReason::OutsideWorkingHours,
            format!(
                "Requested {} to {} ({}), doctor works {}",
                local_start.format("%a %Y-%m-%d %H:%M"),
                local_end.format("%H:%M"),
                self.timezone,
                describe(&availability),
            ),
        ))
    }
}

fn find_conflicts<'a>(
    window: &TimeWindow,
    existing: &'a [Consultation],
    exclude_id: Option<Uuid>,
) -> Vec<&'a Consultation> {
    existing
        .iter()
        .filter(|c| Some(c.id) != exclude_id)
        .filter(|c| c.window().overlaps(window))
        .collect()
}

fn describe(availability: &Availability) -> String {
    let days: Vec<String> = availability.weekdays().iter().map(|d| d.to_string()).collect();
    format!(
        "{} {}-{}",
        days.join(","),
        availability.daily_start.format("%H:%M"),
        availability.daily_end.format("%H:%M"),
    )
}
