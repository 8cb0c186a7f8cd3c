use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::PipelineError;
use crate::models::{ActivityEvent, EventStatus, NewActivityEvent};

use super::{
    truncate_period, BucketCount, EventFilter, EventStore, Period, PeriodCount, StatusCounts,
};

/// In-memory event store. Single-process, no durability — used by tests and
/// environments without a database. Ids are assigned monotonically, so
/// insertion order is id order.
pub struct MemoryEventStore {
    events: RwLock<Vec<ActivityEvent>>,
    next_id: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl MemoryEventStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(0),
            clock,
        }
    }

    /// Insert a fully-formed row as-is, bypassing id assignment. Lets tests
    /// seed rows with chosen ids and timestamps, including broken ones.
    pub fn push_raw(&self, event: ActivityEvent) {
        if let Ok(mut events) = self.events.write() {
            self.next_id.fetch_max(event.id, Ordering::SeqCst);
            events.push(event);
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<ActivityEvent>>, PipelineError> {
        self.events
            .read()
            .map_err(|_| PipelineError::Internal("event store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<ActivityEvent>>, PipelineError> {
        self.events
            .write()
            .map_err(|_| PipelineError::Internal("event store lock poisoned".to_string()))
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, event: NewActivityEvent) -> Result<ActivityEvent, PipelineError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = ActivityEvent {
            id,
            user_id: event.user_id,
            action: event.action,
            category: event.category,
            severity: event.severity,
            status: event.status,
            metadata: event.metadata,
            compressed: false,
            created_at: Some(event.created_at.unwrap_or_else(|| self.clock.now())),
        };
        self.write()?.push(row.clone());
        Ok(row)
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<ActivityEvent>, PipelineError> {
        let mut rows: Vec<ActivityEvent> = self
            .read()?
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.id);
        Ok(rows)
    }

    async fn fetch_after(
        &self,
        filter: &EventFilter,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>, PipelineError> {
        let mut rows: Vec<ActivityEvent> = self
            .read()?
            .iter()
            .filter(|e| e.id > last_id && filter.matches(e))
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.id);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn count(&self, filter: &EventFilter) -> Result<u64, PipelineError> {
        Ok(self.read()?.iter().filter(|e| filter.matches(e)).count() as u64)
    }

    async fn select_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, PipelineError> {
        let mut rows: Vec<ActivityEvent> = self
            .read()?
            .iter()
            .filter(|e| e.created_at.is_some_and(|t| t < cutoff))
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.id);
        Ok(rows)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, PipelineError> {
        let mut events = self.write()?;
        let before = events.len();
        events.retain(|e| !e.created_at.is_some_and(|t| t < cutoff));
        Ok((before - events.len()) as u64)
    }

    async fn mark_compressed_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, PipelineError> {
        let mut events = self.write()?;
        let mut affected = 0;
        for event in events.iter_mut() {
            if !event.compressed && event.created_at.is_some_and(|t| t < cutoff) {
                event.compressed = true;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn count_in_range(
        &self,
        user_id: Option<Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, PipelineError> {
        Ok(self
            .read()?
            .iter()
            .filter(|e| {
                e.created_at.is_some_and(|t| t >= from && t < to)
                    && (user_id.is_none() || e.user_id == user_id)
            })
            .count() as u64)
    }

    async fn grouped_counts(
        &self,
        period: Period,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<PeriodCount>, PipelineError> {
        let mut buckets: BTreeMap<String, i64> = BTreeMap::new();
        for event in self.read()?.iter() {
            let Some(ts) = event.created_at else { continue };
            if from.is_some_and(|f| ts < f) || to.is_some_and(|t| ts > t) {
                continue;
            }
            *buckets.entry(truncate_period(ts, period)).or_insert(0) += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|(period, count)| PeriodCount { period, count })
            .collect())
    }

    async fn category_breakdown(&self) -> Result<Vec<BucketCount>, PipelineError> {
        let mut buckets: BTreeMap<&'static str, i64> = BTreeMap::new();
        for event in self.read()?.iter() {
            *buckets.entry(event.category.as_str()).or_insert(0) += 1;
        }
        let mut rows: Vec<BucketCount> = buckets
            .into_iter()
            .map(|(key, count)| BucketCount {
                key: key.to_string(),
                count,
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(rows)
    }

    async fn severity_breakdown(&self) -> Result<Vec<BucketCount>, PipelineError> {
        let mut buckets: BTreeMap<&'static str, i64> = BTreeMap::new();
        for event in self.read()?.iter() {
            *buckets.entry(event.severity.as_str()).or_insert(0) += 1;
        }
        let mut rows: Vec<BucketCount> = buckets
            .into_iter()
            .map(|(key, count)| BucketCount {
                key: key.to_string(),
                count,
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(rows)
    }

    async fn status_counts(&self) -> Result<StatusCounts, PipelineError> {
        let events = self.read()?;
        Ok(StatusCounts {
            total: events.len() as i64,
            successful: events
                .iter()
                .filter(|e| e.status == EventStatus::Success)
                .count() as i64,
        })
    }

    async fn daily_counts(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PeriodCount>, PipelineError> {
        let from = now - chrono::Duration::days(days);
        let mut buckets: BTreeMap<String, i64> = BTreeMap::new();
        for event in self.read()?.iter() {
            let Some(ts) = event.created_at else { continue };
            if ts < from || ts > now {
                continue;
            }
            *buckets.entry(truncate_period(ts, Period::Day)).or_insert(0) += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|(period, count)| PeriodCount { period, count })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventCategory, EventSeverity};
    use chrono::TimeZone;

    fn new_event(action: &str) -> NewActivityEvent {
        NewActivityEvent {
            user_id: None,
            action: action.to_string(),
            category: EventCategory::Auth,
            severity: EventSeverity::Info,
            status: EventStatus::Success,
            metadata: serde_json::json!({}),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn insert_assigns_monotonic_ids() {
        let store = MemoryEventStore::default();
        let a = store.insert(new_event("a")).await.unwrap();
        let b = store.insert(new_event("b")).await.unwrap();
        let c = store.insert(new_event("c")).await.unwrap();
        assert!(a.id < b.id && b.id < c.id);
        assert!(a.created_at.is_some());
    }

    #[tokio::test]
    async fn fetch_after_walks_the_full_set() {
        let store = MemoryEventStore::default();
        for i in 0..7 {
            store.insert(new_event(&format!("e{i}"))).await.unwrap();
        }

        let filter = EventFilter::default();
        let mut seen = Vec::new();
        let mut last_id = 0;
        loop {
            let batch = store.fetch_after(&filter, last_id, 3).await.unwrap();
            if batch.is_empty() {
                break;
            }
            last_id = batch[batch.len() - 1].id;
            seen.extend(batch.into_iter().map(|e| e.id));
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn filters_apply_to_query_and_count() {
        let store = MemoryEventStore::default();
        let mut failing = new_event("login_failed");
        failing.severity = EventSeverity::Warning;
        store.insert(failing).await.unwrap();
        store.insert(new_event("login")).await.unwrap();

        let filter = EventFilter {
            severity: Some(EventSeverity::Warning),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 1);
        let rows = store.query(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "login_failed");
    }

    #[tokio::test]
    async fn retention_cutoffs_split_by_created_at() {
        let clock = Arc::new(crate::clock::ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = MemoryEventStore::new(clock.clone());

        let mut old = new_event("old");
        old.created_at = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        store.insert(old).await.unwrap();
        store.insert(new_event("fresh")).await.unwrap();

        let cutoff = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(store.select_older_than(cutoff).await.unwrap().len(), 1);
        assert_eq!(store.mark_compressed_older_than(cutoff).await.unwrap(), 1);
        // Re-running only touches not-yet-flagged rows.
        assert_eq!(store.mark_compressed_older_than(cutoff).await.unwrap(), 0);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 1);
        assert_eq!(store.count(&EventFilter::default()).await.unwrap(), 1);
    }
}
