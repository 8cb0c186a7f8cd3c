use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{ActivityEvent, NewActivityEvent};

use super::{BucketCount, EventFilter, EventStore, Period, PeriodCount, StatusCounts};

/// Postgres-backed event store.
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(from) = filter.date_from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            builder.push(" AND created_at <= ").push_bind(to);
        }
        if let Some(severity) = filter.severity {
            builder.push(" AND severity = ").push_bind(severity);
        }
        if let Some(category) = filter.category {
            builder.push(" AND category = ").push_bind(category);
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert(&self, event: NewActivityEvent) -> Result<ActivityEvent, PipelineError> {
        let row = sqlx::query_as::<_, ActivityEvent>(
            "INSERT INTO activity_events (user_id, action, category, severity, status, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, now()))
             RETURNING *",
        )
        .bind(event.user_id)
        .bind(&event.action)
        .bind(event.category)
        .bind(event.severity)
        .bind(event.status)
        .bind(&event.metadata)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<ActivityEvent>, PipelineError> {
        let mut builder =
            QueryBuilder::new("SELECT * FROM activity_events WHERE TRUE");
        Self::push_filter(&mut builder, filter);
        builder.push(" ORDER BY id ASC");

        let rows = builder
            .build_query_as::<ActivityEvent>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_after(
        &self,
        filter: &EventFilter,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<ActivityEvent>, PipelineError> {
        let mut builder =
            QueryBuilder::new("SELECT * FROM activity_events WHERE id > ");
        builder.push_bind(last_id);
        Self::push_filter(&mut builder, filter);
        builder.push(" ORDER BY id ASC LIMIT ");
        builder.push_bind(limit);

        let rows = builder
            .build_query_as::<ActivityEvent>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count(&self, filter: &EventFilter) -> Result<u64, PipelineError> {
        let mut builder =
            QueryBuilder::new("SELECT COUNT(*) FROM activity_events WHERE TRUE");
        Self::push_filter(&mut builder, filter);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn select_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, PipelineError> {
        let rows = sqlx::query_as::<_, ActivityEvent>(
            "SELECT * FROM activity_events WHERE created_at < $1 ORDER BY id ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, PipelineError> {
        let result = sqlx::query("DELETE FROM activity_events WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn mark_compressed_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, PipelineError> {
        let result = sqlx::query(
            "UPDATE activity_events SET compressed = TRUE
             WHERE created_at < $1 AND compressed = FALSE",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_in_range(
        &self,
        user_id: Option<Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, PipelineError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM activity_events
             WHERE created_at >= $1 AND created_at < $2
               AND ($3::uuid IS NULL OR user_id = $3)",
        )
        .bind(from)
        .bind(to)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn grouped_counts(
        &self,
        period: Period,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<PeriodCount>, PipelineError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT to_char(date_trunc($1, created_at), 'YYYY-MM-DD') AS period, COUNT(*)
             FROM activity_events
             WHERE ($2::timestamptz IS NULL OR created_at >= $2)
               AND ($3::timestamptz IS NULL OR created_at <= $3)
             GROUP BY 1 ORDER BY 1",
        )
        .bind(period.as_sql_unit())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(period, count)| PeriodCount { period, count })
            .collect())
    }

    async fn category_breakdown(&self) -> Result<Vec<BucketCount>, PipelineError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT category::TEXT, COUNT(*) FROM activity_events
             GROUP BY category ORDER BY COUNT(*) DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(key, count)| BucketCount { key, count })
            .collect())
    }

    async fn severity_breakdown(&self) -> Result<Vec<BucketCount>, PipelineError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT severity::TEXT, COUNT(*) FROM activity_events
             GROUP BY severity ORDER BY COUNT(*) DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(key, count)| BucketCount { key, count })
            .collect())
    }

    async fn status_counts(&self) -> Result<StatusCounts, PipelineError> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'success')
             FROM activity_events",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StatusCounts {
            total: row.0,
            successful: row.1,
        })
    }

    async fn daily_counts(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PeriodCount>, PipelineError> {
        let from = now - chrono::Duration::days(days);
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT to_char(date_trunc('day', created_at), 'YYYY-MM-DD') AS day, COUNT(*)
             FROM activity_events
             WHERE created_at >= $1 AND created_at <= $2
             GROUP BY 1 ORDER BY 1",
        )
        .bind(from)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(period, count)| PeriodCount { period, count })
            .collect())
    }
}
