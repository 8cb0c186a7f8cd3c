use crate::error::PipelineError;
use crate::models::ActivityEvent;

use super::{ExportSink, RowSerializer};

/// Newline-delimited JSON: one event object per line, no envelope.
pub(crate) struct NdjsonSerializer;

impl RowSerializer for NdjsonSerializer {
    fn begin(&mut self, _sink: &mut ExportSink) -> Result<(), PipelineError> {
        Ok(())
    }

    fn write_batch(
        &mut self,
        rows: &[ActivityEvent],
        sink: &mut ExportSink,
    ) -> Result<(), PipelineError> {
        let mut out = Vec::new();
        for event in rows {
            serde_json::to_writer(&mut out, event)?;
            out.push(b'\n');
        }
        sink.write_all(&out)
    }

    fn finish(self: Box<Self>, sink: ExportSink) -> Result<Vec<u8>, PipelineError> {
        sink.into_bytes()
    }
}
