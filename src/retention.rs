//! Retention and archival: moves aged events out of the hot store.
//!
//! Archive, delete, and compress are deliberately independent operations —
//! nothing here is transactional across them. A crash between archiving and
//! deleting leaves rows both archived and present; archive filenames are
//! derived from id ranges, so re-archiving the same range overwrites rather
//! than duplicates, and callers delete only after a successful archive.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::error::PipelineError;
use crate::store::{EventFilter, EventStore};

pub struct RetentionManager {
    store: Arc<dyn EventStore>,
    config: RetentionConfig,
    clock: Arc<dyn Clock>,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn EventStore>, config: RetentionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Archive every event older than `age_days` into gzip-compressed JSON
    /// chunk files named `activity_logs_<minId>_<maxId>.json.gz`. Chunks
    /// follow selection order (ascending id); returns the written paths.
    pub async fn archive_older_than(&self, age_days: i64) -> Result<Vec<PathBuf>, PipelineError> {
        let cutoff = self.clock.now() - chrono::Duration::days(age_days);
        let events = self.store.select_older_than(cutoff).await?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.config.archive_dir).await?;

        let mut paths = Vec::new();
        for chunk in events.chunks(self.config.chunk_size) {
            let min_id = chunk[0].id;
            let max_id = chunk[chunk.len() - 1].id;

            let json = serde_json::to_vec(chunk)?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json)?;
            let compressed = encoder.finish()?;

            let path = self
                .config
                .archive_dir
                .join(format!("activity_logs_{min_id}_{max_id}.json.gz"));
            tokio::fs::write(&path, compressed).await?;

            tracing::info!(
                path = %path.display(),
                rows = chunk.len(),
                "archived activity chunk"
            );
            paths.push(path);
        }

        Ok(paths)
    }

    /// Delete events older than `age_days`; returns the count removed.
    /// Independent from archiving — archive first if the data matters.
    pub async fn delete_expired(&self, age_days: i64) -> Result<u64, PipelineError> {
        let cutoff = self.clock.now() - chrono::Duration::days(age_days);
        let deleted = self.store.delete_older_than(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, age_days, "purged expired activity events");
        }
        Ok(deleted)
    }

    /// Flag events older than `age_days` as compressed for storage
    /// bookkeeping. Idempotent — already-flagged rows are untouched.
    pub async fn mark_compressed(&self, age_days: i64) -> Result<u64, PipelineError> {
        let cutoff = self.clock.now() - chrono::Duration::days(age_days);
        let affected = self.store.mark_compressed_older_than(cutoff).await?;
        Ok(affected)
    }

    /// Read-only diagnostic over an optionally bounded range: false as soon
    /// as an id fails to increase or a timestamp is missing, true otherwise
    /// (vacuously true for an empty range). Never repairs anything.
    pub async fn validate_integrity(
        &self,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<bool, PipelineError> {
        let filter = EventFilter {
            date_from,
            date_to,
            ..Default::default()
        };
        let events = self.store.query(&filter).await?;

        let mut last_id = None;
        for event in &events {
            if event.created_at.is_none() {
                tracing::warn!(id = event.id, "integrity check: missing timestamp");
                return Ok(false);
            }
            if last_id.is_some_and(|prev| event.id <= prev) {
                tracing::warn!(id = event.id, "integrity check: non-increasing id");
                return Ok(false);
            }
            last_id = Some(event.id);
        }
        Ok(true)
    }

    /// One scheduler pass: compress bookkeeping, then archive, then purge.
    pub async fn run_cycle(&self) -> Result<(), PipelineError> {
        let compressed = self.mark_compressed(self.config.compress_age_days).await?;
        let archived = self
            .archive_older_than(self.config.archive_age_days)
            .await?;
        let deleted = self.delete_expired(self.config.delete_age_days).await?;
        tracing::info!(
            compressed,
            archived = archived.len(),
            deleted,
            "retention cycle complete"
        );
        Ok(())
    }
}
