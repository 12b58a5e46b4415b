use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Clinic roles. Anything else (e.g. Supabase's `authenticated`) grants no access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Doctor,
    Patient,
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "doctor" => Ok(UserRole::Doctor),
            "patient" => Ok(UserRole::Patient),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Doctor => write!(f, "doctor"),
            UserRole::Patient => write!(f, "patient"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn user_role(&self) -> Option<UserRole> {
        self.role.as_deref().and_then(|r| r.parse().ok())
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.user_role() == Some(role)
    }

    pub fn has_any_role(&self, roles: &[UserRole]) -> bool {
        self.user_role().is_some_and(|r| roles.contains(&r))
    }
}
