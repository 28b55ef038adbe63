//! The report workbook on disk
//!
//! Every stage re-opens the file, transforms the values and writes the whole
//! workbook back. `calamine` only gives back values, so the formatting that
//! earlier stages applied travels alongside in [`SheetFormatting`] and is
//! re-applied on every save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context};
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Color, Format, FormatPattern, Workbook, Worksheet};
use tracing::debug;

use super::record::{is_missing, parse_amount, CellValue, Column, MovementRecord};
use super::summary::{SummaryRow, SummaryTable, FUND_HEADER};
use crate::utils::BRL_NUM_FORMAT;

pub const PRIMARY_SHEET: &str = "Movimentações";
pub const SUMMARY_SHEET: &str = "Resumo";
const HIGHLIGHT_COLOR: u32 = 0xFFFF00;

/// Formatting applied so far to the primary sheet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SheetFormatting {
    pub currency: bool,
    pub highlight_negative_gross: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStyle {
    Plain,
    Currency,
    Highlighted,
    CurrencyHighlighted,
}

impl SheetFormatting {
    /// Style of a data cell (never the header row).
    pub fn style_for(&self, column: Column, value: &CellValue<'_>) -> CellStyle {
        let currency = self.currency && column.is_monetary();
        let highlight = self.highlight_negative_gross
            && column == Column::GrossValue
            && matches!(value, CellValue::Amount(v) if *v < Decimal::ZERO);

        match (currency, highlight) {
            (false, false) => CellStyle::Plain,
            (true, false) => CellStyle::Currency,
            (false, true) => CellStyle::Highlighted,
            (true, true) => CellStyle::CurrencyHighlighted,
        }
    }
}

/// In-memory view of a report workbook
#[derive(Debug, Clone)]
pub struct ReportWorkbook {
    path: PathBuf,
    pub with_net_value: bool,
    pub movements: Vec<MovementRecord>,
    pub summary: Option<SummaryTable>,
}

impl ReportWorkbook {
    pub fn new(path: PathBuf, movements: Vec<MovementRecord>) -> Self {
        Self {
            path,
            with_net_value: false,
            movements,
            summary: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> Vec<Column> {
        Column::layout(self.with_net_value)
    }

    /// Re-open a report written by [`save`](Self::save).
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let mut workbook: Xlsx<_> = open_workbook(path)
            .with_context(|| format!("Failed to open report workbook {:?}", path))?;

        let range = workbook
            .worksheet_range(PRIMARY_SHEET)
            .with_context(|| format!("Report has no '{}' sheet", PRIMARY_SHEET))?;
        let (with_net_value, movements) = read_movements(&range)?;

        let summary = if workbook.sheet_names().iter().any(|s| s == SUMMARY_SHEET) {
            let range = workbook
                .worksheet_range(SUMMARY_SHEET)
                .context("Failed to read summary sheet")?;
            Some(read_summary(&range)?)
        } else {
            None
        };

        debug!(
            "Opened {:?}: {} movements, summary: {}",
            path,
            movements.len(),
            summary.is_some()
        );
        Ok(Self {
            path: path.to_path_buf(),
            with_net_value,
            movements,
            summary,
        })
    }

    /// Write the whole workbook to its path, replacing the previous file.
    pub fn save(&self, formatting: &SheetFormatting) -> crate::Result<()> {
        let currency = Format::new().set_num_format(BRL_NUM_FORMAT);
        let fill = Format::new()
            .set_pattern(FormatPattern::Solid)
            .set_background_color(Color::RGB(HIGHLIGHT_COLOR));
        let currency_fill = currency
            .clone()
            .set_pattern(FormatPattern::Solid)
            .set_background_color(Color::RGB(HIGHLIGHT_COLOR));

        let mut workbook = Workbook::new();

        let sheet = workbook.add_worksheet();
        sheet.set_name(PRIMARY_SHEET)?;
        let columns = self.columns();
        for (col, column) in columns.iter().enumerate() {
            sheet.write_string(0, col as u16, column.header())?;
        }
        for (idx, record) in self.movements.iter().enumerate() {
            let row = idx as u32 + 1;
            for (col, column) in columns.iter().enumerate() {
                let col = col as u16;
                let value = record.value(*column);
                let format = match formatting.style_for(*column, &value) {
                    CellStyle::Plain => None,
                    CellStyle::Currency => Some(&currency),
                    CellStyle::Highlighted => Some(&fill),
                    CellStyle::CurrencyHighlighted => Some(&currency_fill),
                };
                write_cell(sheet, row, col, &value, format)?;
            }
        }

        if let Some(summary) = &self.summary {
            let sheet = workbook.add_worksheet();
            sheet.set_name(SUMMARY_SHEET)?;
            write_summary(sheet, summary, &currency)?;
        }

        workbook
            .save(&self.path)
            .with_context(|| format!("Failed to write report workbook {:?}", self.path))?;
        Ok(())
    }
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue<'_>,
    format: Option<&Format>,
) -> crate::Result<()> {
    match (value, format) {
        (CellValue::Amount(v), Some(f)) => {
            sheet.write_number_with_format(row, col, to_f64(*v)?, f)?;
        }
        (CellValue::Amount(v), None) => {
            sheet.write_number(row, col, to_f64(*v)?)?;
        }
        (CellValue::Text(s), Some(f)) => {
            sheet.write_string_with_format(row, col, *s, f)?;
        }
        (CellValue::Text(s), None) => {
            sheet.write_string(row, col, *s)?;
        }
        (CellValue::Empty, _) => {}
    }
    Ok(())
}

fn write_summary(
    sheet: &mut Worksheet,
    summary: &SummaryTable,
    currency: &Format,
) -> crate::Result<()> {
    for (col, header) in summary.headers().iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (idx, row) in summary.rows.iter().enumerate() {
        let r = idx as u32 + 1;
        sheet.write_string(r, 0, &row.fund_cnpj)?;
        let amounts = row
            .gross_by_type
            .iter()
            .chain([&row.ir_value, &row.iof_value, &row.ir_total]);
        for (offset, amount) in amounts.enumerate() {
            sheet.write_number_with_format(r, offset as u16 + 1, to_f64(*amount)?, currency)?;
        }
    }
    Ok(())
}

fn to_f64(value: Decimal) -> crate::Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| anyhow!("Amount {} cannot be written as a number", value))
}

/// Convert a read-back cell into an amount.
///
/// Floats go through their shortest decimal representation so that `44.1`
/// comes back as `44.1` and not as the nearest binary fraction.
fn cell_amount(cell: &Data) -> crate::Result<Option<Decimal>> {
    match cell {
        Data::Empty => Ok(None),
        Data::Int(i) => Ok(Some(Decimal::from(*i))),
        Data::Float(f) => Decimal::from_str(&f.to_string())
            .ok()
            .or_else(|| Decimal::from_f64_retain(*f))
            .map(Some)
            .ok_or_else(|| anyhow!("Invalid amount: {}", f)),
        Data::String(s) => parse_amount(s),
        other => Err(anyhow!("Unexpected amount cell: {:?}", other)),
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if is_missing(s) => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn read_movements(range: &Range<Data>) -> crate::Result<(bool, Vec<MovementRecord>)> {
    let mut rows = range.rows();
    let header = rows.next().ok_or_else(|| anyhow!("Report sheet is empty"))?;

    let mapping: HashMap<usize, Column> = header
        .iter()
        .enumerate()
        .filter_map(|(idx, cell)| match cell {
            Data::String(h) => Column::from_header(h).map(|c| (idx, c)),
            _ => None,
        })
        .collect();
    let with_net_value = mapping.values().any(|c| *c == Column::NetValue);

    let mut movements = Vec::new();
    for (row_idx, row) in rows.enumerate() {
        let mut record = MovementRecord::default();
        for (idx, cell) in row.iter().enumerate() {
            let Some(&column) = mapping.get(&idx) else {
                continue;
            };
            if column.is_monetary() {
                let amount = cell_amount(cell).with_context(|| {
                    format!("report row {}: {}", row_idx + 2, column.header())
                })?;
                record.set_amount(column, amount);
            } else {
                record.set_text(column, cell_text(cell));
            }
        }
        movements.push(record);
    }

    Ok((with_net_value, movements))
}

fn read_summary(range: &Range<Data>) -> crate::Result<SummaryTable> {
    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| anyhow!("Summary sheet is empty"))?
        .iter()
        .map(|c| c.to_string())
        .collect();

    if header.len() < 4 || header[0] != FUND_HEADER {
        return Err(anyhow!("Unexpected summary header: {:?}", header));
    }
    let launch_types = header[1..header.len() - 3].to_vec();
    let type_count = launch_types.len();

    let mut table_rows = Vec::new();
    for row in rows {
        let amount = |idx: usize| -> crate::Result<Decimal> {
            Ok(row
                .get(idx)
                .map(cell_amount)
                .transpose()?
                .flatten()
                .unwrap_or_default())
        };
        table_rows.push(SummaryRow {
            fund_cnpj: row.first().map(|c| c.to_string()).unwrap_or_default(),
            gross_by_type: (1..=type_count).map(&amount).collect::<crate::Result<_>>()?,
            ir_value: amount(type_count + 1)?,
            iof_value: amount(type_count + 2)?,
            ir_total: amount(type_count + 3)?,
        });
    }

    Ok(SummaryTable {
        launch_types,
        rows: table_rows,
    })
}

/// `dir/{base}.xlsx`, or the first free `dir/{base} (n).xlsx`.
pub fn unique_report_path(dir: &Path, base_name: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{}.xlsx", base_name));
    let mut counter = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{} ({}).xlsx", base_name, counter));
        counter += 1;
    }
    candidate
}
