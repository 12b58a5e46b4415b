use std::env;
use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use tracing::warn;

/// Length of every consultation. Appointments have no per-type duration.
pub const DEFAULT_CONSULTATION_MINUTES: i64 = 30;

/// Minimum notice a patient must give to cancel a consultation.
pub const DEFAULT_CANCELLATION_NOTICE_HOURS: i64 = 24;

/// Longest consultation the config accepts: one day.
pub const MAX_CONSULTATION_MINUTES: i64 = 24 * 60;

/// Longest cancellation notice the config accepts: one year.
pub const MAX_CANCELLATION_NOTICE_HOURS: i64 = 366 * 24;

pub const DEFAULT_PORT: u16 = 3000;

/// What to do when a doctor has a non-empty schedule that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleFormatPolicy {
    /// Refuse the booking and report `InvalidScheduleFormat`.
    #[default]
    Strict,
    /// Treat the doctor as having no working-hours constraint.
    Permissive,
}

impl FromStr for ScheduleFormatPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "reject" => Ok(Self::Strict),
            "permissive" | "allow" => Ok(Self::Permissive),
            other => Err(format!("unknown schedule format policy: {}", other)),
        }
    }
}

impl fmt::Display for ScheduleFormatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleFormatPolicy::Strict => write!(f, "strict"),
            ScheduleFormatPolicy::Permissive => write!(f, "permissive"),
        }
    }
}

/// How schedule text is split into its day part and time part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleParseMode {
    /// `"<days> <HH:MM-HH:MM>"`, the first two whitespace-separated fields.
    #[default]
    Standard,
    /// Whitespace and `|` are stripped first, e.g. `"Lun - Ven | 08:00 - 16:00"`.
    Tolerant,
}

impl FromStr for ScheduleParseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "strict" => Ok(Self::Standard),
            "tolerant" | "lenient" => Ok(Self::Tolerant),
            other => Err(format!("unknown schedule parse mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    pub timezone: Tz,
    pub consultation_minutes: i64,
    pub cancellation_notice_hours: i64,
    pub schedule_format_policy: ScheduleFormatPolicy,
    pub schedule_parse_mode: ScheduleParseMode,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            consultation_minutes: DEFAULT_CONSULTATION_MINUTES,
            cancellation_notice_hours: DEFAULT_CANCELLATION_NOTICE_HOURS,
            schedule_format_policy: ScheduleFormatPolicy::default(),
            schedule_parse_mode: ScheduleParseMode::default(),
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            timezone: parse_env("CLINIC_TIMEZONE", defaults.timezone),
            consultation_minutes: parse_positive_env(
                "CONSULTATION_DURATION_MINUTES",
                defaults.consultation_minutes,
                MAX_CONSULTATION_MINUTES,
            ),
            cancellation_notice_hours: parse_positive_env(
                "CANCELLATION_NOTICE_HOURS",
                defaults.cancellation_notice_hours,
                MAX_CANCELLATION_NOTICE_HOURS,
            ),
            schedule_format_policy: parse_env(
                "SCHEDULE_FORMAT_POLICY",
                defaults.schedule_format_policy,
            ),
            schedule_parse_mode: parse_env("SCHEDULE_PARSE_MODE", defaults.schedule_parse_mode),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub port: u16,
    pub scheduling: SchedulingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            port: parse_env("PORT", DEFAULT_PORT),
            scheduling: SchedulingConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {} value {:?} ({}), using default {}", key, raw, e, default);
            default
        }),
        Err(_) => default,
    }
}

fn parse_positive_env(key: &str, default: i64, max: i64) -> i64 {
    bounded(key, parse_env(key, default), default, max)
}

/// Non-positive values fall back to `default`; oversized ones are capped at `max`.
fn bounded(key: &str, value: i64, default: i64, max: i64) -> i64 {
    if value <= 0 {
        warn!("{} must be positive, using default {}", key, default);
        return default;
    }
    if value > max {
        warn!("{} value {} exceeds {}, capping", key, value, max);
        return max;
    }
    value
}

impl fmt::Display for ScheduleParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleParseMode::Standard => write!(f, "standard"),
            ScheduleParseMode::Tolerant => write!(f, "tolerant"),
        }
    }
}
