//! Event store backends.
//!
//! The pipeline treats durable storage as a capability: insert with an
//! auto-increment id, filtered range queries ordered by id, cursor-based
//! batch fetch, and policy deletes. `PgEventStore` is the production
//! backend; `MemoryEventStore` backs tests and constrained environments.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{ActivityEvent, EventCategory, EventSeverity, NewActivityEvent};

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

/// Equality/range filters shared by queries, counts, and exports.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub user_id: Option<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub severity: Option<EventSeverity>,
    pub category: Option<EventCategory>,
}

impl EventFilter {
    pub fn matches(&self, event: &ActivityEvent) -> bool {
        if let Some(user_id) = self.user_id {
            if event.user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if event.severity != severity {
                return false;
            }
        }
        if let Some(category) = self.category {
            if event.category != category {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if !event.created_at.is_some_and(|t| t >= from) {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if !event.created_at.is_some_and(|t| t <= to) {
                return false;
            }
        }
        true
    }
}

/// Grouping granularity for statistics queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    pub fn as_sql_unit(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }
}

/// One grouped-count bucket, labeled with the truncated period start date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodCount {
    pub period: String,
    pub count: i64,
}

/// Count keyed by category or severity name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCounts {
    pub total: i64,
    pub successful: i64,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert one event; the store assigns `id` and, if absent, `created_at`.
    async fn insert(&self, event: NewActivityEvent) -> Result<ActivityEvent, PipelineError>;

    /// All matching events, ascending by id.
    async fn query(&self, filter: &EventFilter) -> Result<Vec<ActivityEvent>, PipelineError>;

    /// Next batch for a cursor walk: matching events with `id > last_id`,
    /// ascending, at most `limit` rows.
    async fn fetch_after(
        &self,
        filter: &EventFilter,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>, PipelineError>;

    async fn count(&self, filter: &EventFilter) -> Result<u64, PipelineError>;

    /// Events with `created_at < cutoff`, ascending by id.
    async fn select_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, PipelineError>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, PipelineError>;

    /// Flag not-yet-flagged rows older than `cutoff`; returns rows affected.
    /// Idempotent.
    async fn mark_compressed_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, PipelineError>;

    async fn count_in_range(
        &self,
        user_id: Option<Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, PipelineError>;

    async fn grouped_counts(
        &self,
        period: Period,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<PeriodCount>, PipelineError>;

    async fn category_breakdown(&self) -> Result<Vec<BucketCount>, PipelineError>;

    async fn severity_breakdown(&self) -> Result<Vec<BucketCount>, PipelineError>;

    async fn status_counts(&self) -> Result<StatusCounts, PipelineError>;

    /// Per-day counts for the trailing `days` days before `now`. Days with
    /// no events are simply absent.
    async fn daily_counts(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PeriodCount>, PipelineError>;
}

/// Truncate a timestamp to its period start, formatted `YYYY-MM-DD` to match
/// what `date_trunc` + `to_char` produce on the Postgres side.
pub(crate) fn truncate_period(ts: DateTime<Utc>, period: Period) -> String {
    use chrono::Datelike;

    let date = ts.date_naive();
    let start = match period {
        Period::Day => date,
        Period::Week => date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64),
        Period::Month => date.with_day(1).unwrap_or(date),
        Period::Year => date
            .with_month(1)
            .and_then(|d| d.with_day(1))
            .unwrap_or(date),
    };
    start.format("%Y-%m-%d").to_string()
}
