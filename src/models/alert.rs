use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ActivityEvent;

/// Produced by the monitor when an abuse pattern is detected. Ephemeral:
/// published to alert subscribers and logged, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAlert {
    pub reason: String,
    pub events: Vec<ActivityEvent>,
    pub triggered_at: DateTime<Utc>,
}
