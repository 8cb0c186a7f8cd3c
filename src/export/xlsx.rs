use rust_xlsxwriter::Workbook;

use crate::error::PipelineError;
use crate::models::ActivityEvent;

use super::{row_values, ExportSink, RowSerializer, EXPORT_COLUMNS};

/// Single-sheet workbook writer. Rows accumulate in the workbook rather than
/// the sink — the XLSX container can only be produced whole at the end.
pub(crate) struct XlsxSerializer {
    workbook: Workbook,
    next_row: u32,
}

impl XlsxSerializer {
    pub(crate) fn new() -> Result<Self, PipelineError> {
        let mut workbook = Workbook::new();
        workbook.add_worksheet();
        Ok(Self {
            workbook,
            next_row: 0,
        })
    }
}

impl RowSerializer for XlsxSerializer {
    fn begin(&mut self, _sink: &mut ExportSink) -> Result<(), PipelineError> {
        let worksheet = self.workbook.worksheet_from_index(0)?;
        for (col, name) in EXPORT_COLUMNS.iter().enumerate() {
            worksheet.write_string(0, col as u16, *name)?;
        }
        self.next_row = 1;
        Ok(())
    }

    fn write_batch(
        &mut self,
        rows: &[ActivityEvent],
        _sink: &mut ExportSink,
    ) -> Result<(), PipelineError> {
        let worksheet = self.workbook.worksheet_from_index(0)?;
        for event in rows {
            let cells = row_values(event);
            worksheet.write_number(self.next_row, 0, event.id as f64)?;
            for (col, cell) in cells.iter().enumerate().skip(1) {
                worksheet.write_string(self.next_row, col as u16, cell.as_str())?;
            }
            self.next_row += 1;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>, _sink: ExportSink) -> Result<Vec<u8>, PipelineError> {
        Ok(self.workbook.save_to_buffer()?)
    }
}
