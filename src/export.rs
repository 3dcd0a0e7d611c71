// src/export.rs

use crate::error::ExportError;
use crate::summary::{COLUMNS, Cell, SummaryRow};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const DEFAULT_SHEET_NAME: &str = "InvoiceSummary";
pub const DEFAULT_EXPORT_PATH: &str = "invoice_summary.xlsx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

/// Write rows to `path` in the requested format.
pub fn export(
    rows: &[SummaryRow],
    format: ExportFormat,
    path: &Path,
    sheet_name: &str,
) -> Result<(), ExportError> {
    match format {
        ExportFormat::Xlsx => std::fs::write(path, xlsx_bytes(rows, sheet_name)?)?,
        ExportFormat::Csv => {
            let file = std::fs::File::create(path)?;
            write_csv(rows, file)?;
        }
    }
    info!(path = %path.display(), rows = rows.len(), format = ?format, "Exported summary");
    Ok(())
}

/// One-sheet workbook: a header row, then one row per invoice.
pub fn xlsx_bytes(rows: &[SummaryRow], sheet_name: &str) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name)?;

    for (col, title) in COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.cells().iter().enumerate() {
            match cell {
                Cell::Text(s) => sheet.write_string(r, col as u16, *s)?,
                Cell::Number(n) => sheet.write_number(r, col as u16, *n)?,
            };
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// The same table as CSV, header first.
pub fn write_csv<W: Write>(rows: &[SummaryRow], writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(COLUMNS)?;
    for row in rows {
        wtr.write_record(row.cells().iter().map(Cell::display))?;
    }
    wtr.flush()?;
    Ok(())
}
