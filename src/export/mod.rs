//! Bulk export of filtered event sets into CSV, NDJSON, or XLSX.
//!
//! Exports walk the store with a strictly increasing id cursor and serialize
//! one batch at a time, so peak memory is bounded by the batch size rather
//! than the result set. The output still comes back as one in-memory buffer —
//! streaming only bounds the intermediate state. Any batch or serialization
//! error aborts the whole export; there is no partial-result contract.

pub mod csv;
pub mod ndjson;
pub mod xlsx;

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ExportConfig;
use crate::error::PipelineError;
use crate::models::ActivityEvent;
use crate::store::{EventFilter, EventStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/x-ndjson",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "ndjson",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

/// Finished export: the serialized bytes plus metadata for the caller.
#[derive(Debug)]
pub struct ExportResult {
    pub buffer: Vec<u8>,
    pub byte_length: usize,
    pub total_rows: u64,
    pub format: ExportFormat,
}

pub(crate) const EXPORT_COLUMNS: [&str; 8] = [
    "id",
    "user_id",
    "action",
    "category",
    "severity",
    "status",
    "created_at",
    "metadata",
];

pub(crate) fn row_values(event: &ActivityEvent) -> [String; 8] {
    [
        event.id.to_string(),
        event.user_id.map(|u| u.to_string()).unwrap_or_default(),
        event.action.clone(),
        event.category.as_str().to_string(),
        event.severity.as_str().to_string(),
        event.status.as_str().to_string(),
        event
            .created_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        event.metadata.to_string(),
    ]
}

/// Where serialized batches accumulate: a temp file in normal operation
/// (unlinked on creation, so the OS reclaims it on every exit path), or a
/// plain buffer in constrained/test environments.
pub(crate) enum ExportSink {
    File(std::fs::File),
    Memory(Vec<u8>),
}

impl ExportSink {
    fn new(in_memory: bool) -> Result<Self, PipelineError> {
        if in_memory {
            Ok(ExportSink::Memory(Vec::new()))
        } else {
            Ok(ExportSink::File(tempfile::tempfile()?))
        }
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> Result<(), PipelineError> {
        match self {
            ExportSink::File(file) => file.write_all(bytes)?,
            ExportSink::Memory(buffer) => buffer.extend_from_slice(bytes),
        }
        Ok(())
    }

    pub(crate) fn into_bytes(self) -> Result<Vec<u8>, PipelineError> {
        match self {
            ExportSink::File(mut file) => {
                file.flush()?;
                file.seek(SeekFrom::Start(0))?;
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer)?;
                Ok(buffer)
            }
            ExportSink::Memory(buffer) => Ok(buffer),
        }
    }
}

/// Per-format serialization strategy. The batching loop never changes when a
/// backend does: implementations either stream bytes into the sink (CSV,
/// NDJSON) or accumulate rows and produce the document at the end (XLSX).
pub(crate) trait RowSerializer: Send {
    fn begin(&mut self, sink: &mut ExportSink) -> Result<(), PipelineError>;

    fn write_batch(
        &mut self,
        rows: &[ActivityEvent],
        sink: &mut ExportSink,
    ) -> Result<(), PipelineError>;

    fn finish(self: Box<Self>, sink: ExportSink) -> Result<Vec<u8>, PipelineError>;
}

fn make_serializer(format: ExportFormat) -> Result<Box<dyn RowSerializer>, PipelineError> {
    Ok(match format {
        ExportFormat::Csv => Box::new(csv::CsvSerializer),
        ExportFormat::Json => Box::new(ndjson::NdjsonSerializer),
        ExportFormat::Xlsx => Box::new(xlsx::XlsxSerializer::new()?),
    })
}

pub struct ExportService {
    store: Arc<dyn EventStore>,
    config: ExportConfig,
}

impl ExportService {
    pub fn new(store: Arc<dyn EventStore>, config: ExportConfig) -> Self {
        Self { store, config }
    }

    pub async fn export_to_csv(&self, filter: &EventFilter) -> Result<ExportResult, PipelineError> {
        self.export(ExportFormat::Csv, filter).await
    }

    /// Newline-delimited JSON, one object per line.
    pub async fn export_to_json(
        &self,
        filter: &EventFilter,
    ) -> Result<ExportResult, PipelineError> {
        self.export(ExportFormat::Json, filter).await
    }

    pub async fn export_to_xlsx(
        &self,
        filter: &EventFilter,
    ) -> Result<ExportResult, PipelineError> {
        self.export(ExportFormat::Xlsx, filter).await
    }

    pub async fn export(
        &self,
        format: ExportFormat,
        filter: &EventFilter,
    ) -> Result<ExportResult, PipelineError> {
        let total_rows = self.store.count(filter).await?;

        let mut sink = ExportSink::new(self.config.in_memory)?;
        let mut serializer = make_serializer(format)?;
        serializer.begin(&mut sink)?;

        let mut last_id = 0;
        loop {
            let batch = self
                .store
                .fetch_after(filter, last_id, self.config.batch_size)
                .await?;
            let Some(last) = batch.last() else { break };
            last_id = last.id;
            serializer.write_batch(&batch, &mut sink)?;
        }

        let buffer = serializer.finish(sink)?;
        tracing::debug!(
            format = format.as_str(),
            rows = total_rows,
            bytes = buffer.len(),
            "export complete"
        );
        Ok(ExportResult {
            byte_length: buffer.len(),
            total_rows,
            format,
            buffer,
        })
    }
}
