use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "event_category", rename_all = "lowercase")]
pub enum EventCategory {
    Auth,
    Job,
    Application,
    Profile,
    Admin,
    Security,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Auth => "auth",
            EventCategory::Job => "job",
            EventCategory::Application => "application",
            EventCategory::Profile => "profile",
            EventCategory::Admin => "admin",
            EventCategory::Security => "security",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "event_severity", rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Warning,
    Critical,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Info => "info",
            EventSeverity::Warning => "warning",
            EventSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Failure,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "success",
            EventStatus::Failure => "failure",
            EventStatus::Error => "error",
        }
    }

    /// Failures and errors both feed the monitor's per-action counters.
    pub fn is_failure(&self) -> bool {
        matches!(self, EventStatus::Failure | EventStatus::Error)
    }
}

/// One immutable audit record. Rows are append-only: the store assigns `id`
/// on insert and nothing is ever updated except the `compressed` bookkeeping
/// flag.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub category: EventCategory,
    pub severity: EventSeverity,
    pub status: EventStatus,
    pub metadata: serde_json::Value,
    pub compressed: bool,
    /// Set at insert time. Kept optional so the integrity check can report a
    /// row that somehow lost its timestamp instead of panicking on it.
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert shape — everything the store does not assign itself.
#[derive(Debug, Clone, Deserialize)]
pub struct NewActivityEvent {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub category: EventCategory,
    pub severity: EventSeverity,
    pub status: EventStatus,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "authorization",
    "api_key",
    "apikey",
    "ssn",
    "credit_card",
];

/// Replace values under sensitive keys with a placeholder, recursively.
/// Applied before storage so nothing sensitive ever reaches disk or exports.
pub fn redact_metadata(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let lowered = key.to_lowercase();
                if SENSITIVE_KEYS.iter().any(|k| lowered.contains(k)) {
                    *val = serde_json::Value::String("[REDACTED]".to_string());
                } else {
                    redact_metadata(val);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                redact_metadata(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_sensitive_keys_recursively() {
        let mut meta = json!({
            "ip": "10.0.0.1",
            "password": "hunter2",
            "request": {
                "Authorization": "Bearer abc",
                "path": "/login"
            },
            "attempts": [{"api_key": "xyz"}]
        });

        redact_metadata(&mut meta);

        assert_eq!(meta["ip"], "10.0.0.1");
        assert_eq!(meta["password"], "[REDACTED]");
        assert_eq!(meta["request"]["Authorization"], "[REDACTED]");
        assert_eq!(meta["request"]["path"], "/login");
        assert_eq!(meta["attempts"][0]["api_key"], "[REDACTED]");
    }

    #[test]
    fn scalars_pass_through_untouched() {
        let mut meta = json!("plain string");
        redact_metadata(&mut meta);
        assert_eq!(meta, json!("plain string"));
    }
}
