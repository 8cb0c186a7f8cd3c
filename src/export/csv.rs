use crate::error::PipelineError;
use crate::models::ActivityEvent;

use super::{row_values, ExportSink, RowSerializer, EXPORT_COLUMNS};

pub(crate) struct CsvSerializer;

impl RowSerializer for CsvSerializer {
    fn begin(&mut self, sink: &mut ExportSink) -> Result<(), PipelineError> {
        let mut header = EXPORT_COLUMNS.join(",");
        header.push('\n');
        sink.write_all(header.as_bytes())
    }

    fn write_batch(
        &mut self,
        rows: &[ActivityEvent],
        sink: &mut ExportSink,
    ) -> Result<(), PipelineError> {
        let mut out = String::new();
        for event in rows {
            let cells = row_values(event);
            let line: Vec<String> = cells.iter().map(|cell| sanitize_cell(cell)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        sink.write_all(out.as_bytes())
    }

    fn finish(self: Box<Self>, sink: ExportSink) -> Result<Vec<u8>, PipelineError> {
        sink.into_bytes()
    }
}

/// Quote-escape a CSV cell. Values that would be interpreted as spreadsheet
/// formulas (`=`, `+`, `-`, `@` prefixes) get a leading apostrophe first so
/// they open as literal text.
pub(crate) fn sanitize_cell(value: &str) -> String {
    let value = if value.starts_with(['=', '+', '-', '@']) {
        format!("'{value}")
    } else {
        value.to_string()
    };

    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}
