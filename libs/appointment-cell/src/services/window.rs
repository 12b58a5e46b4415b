use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` interval of absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn starting_at(start: DateTime<Utc>, minutes: i64) -> Self {
        Self::new(start, start + Duration::minutes(minutes))
    }

    /// Back-to-back windows do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// The absolute span covered by one calendar day in `tz`.
///
/// Returns `None` only for dates chrono cannot represent.
pub fn local_day_bounds(date: NaiveDate, tz: Tz) -> Option<TimeWindow> {
    let start = local_midnight(date, tz)?;
    let end = local_midnight(date.succ_opt()?, tz)?;
    Some(TimeWindow::new(start, end))
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;

    // Zones that skip midnight on DST day start the day at the first valid instant.
    let local = tz
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())?;

    Some(local.with_timezone(&Utc))
}
