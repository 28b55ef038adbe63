//! Movement records and the raw CSV export
//!
//! The raw export carries many more columns than the report needs; only the
//! fifteen [`Column::RAW`] fields are kept, in that order, whatever order the
//! export uses.

use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{MovementsError, Result};

/// A column of the primary movement sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    MarketName,
    SubMarketName,
    Asset,
    FundCnpj,
    MovementDate,
    MovementHistory,
    LaunchType,
    GrossValue,
    IrValue,
    IofValue,
    NetValue,
    DueDate,
    Index,
    Fee,
    Issuer,
    AccountingGroupCode,
}

impl Column {
    /// Columns projected from the raw export, in report order
    pub const RAW: [Column; 15] = [
        Column::MarketName,
        Column::SubMarketName,
        Column::Asset,
        Column::FundCnpj,
        Column::MovementDate,
        Column::MovementHistory,
        Column::LaunchType,
        Column::GrossValue,
        Column::IrValue,
        Column::IofValue,
        Column::DueDate,
        Column::Index,
        Column::Fee,
        Column::Issuer,
        Column::AccountingGroupCode,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::MarketName => "marketName",
            Column::SubMarketName => "subMarketName",
            Column::Asset => "asset",
            Column::FundCnpj => "fundCnpj",
            Column::MovementDate => "movementDate",
            Column::MovementHistory => "movementHistory",
            Column::LaunchType => "launchType",
            Column::GrossValue => "grossValue",
            Column::IrValue => "irValue",
            Column::IofValue => "iofValue",
            Column::NetValue => "netValue",
            Column::DueDate => "dueDate",
            Column::Index => "index",
            Column::Fee => "fee",
            Column::Issuer => "issuer",
            Column::AccountingGroupCode => "accountingGroupCode",
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim().trim_start_matches('\u{feff}');
        Self::RAW
            .into_iter()
            .chain(std::iter::once(Column::NetValue))
            .find(|c| c.header() == header)
    }

    /// Gross, withholding and net amounts get the currency format
    pub fn is_monetary(self) -> bool {
        matches!(
            self,
            Column::GrossValue | Column::IrValue | Column::IofValue | Column::NetValue
        )
    }

    /// Sheet layout: the raw columns, with `netValue` right after `iofValue`
    /// once it has been derived.
    pub fn layout(with_net_value: bool) -> Vec<Column> {
        let mut columns = Column::RAW.to_vec();
        if with_net_value {
            let iof = columns
                .iter()
                .position(|c| *c == Column::IofValue)
                .unwrap_or(columns.len() - 1);
            columns.insert(iof + 1, Column::NetValue);
        }
        columns
    }
}

/// Value of a single cell, borrowed from a record
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue<'a> {
    Empty,
    Text(&'a str),
    Amount(Decimal),
}

/// One movement row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementRecord {
    pub market_name: Option<String>,
    pub sub_market_name: Option<String>,
    pub asset: Option<String>,
    pub fund_cnpj: Option<String>,
    pub movement_date: Option<String>,
    pub movement_history: Option<String>,
    pub launch_type: Option<String>,
    pub gross_value: Option<Decimal>,
    pub ir_value: Option<Decimal>,
    pub iof_value: Option<Decimal>,
    pub due_date: Option<String>,
    pub index: Option<String>,
    pub fee: Option<String>,
    pub issuer: Option<String>,
    pub accounting_group_code: Option<String>,
    /// Derived; absent until the net value stage runs
    pub net_value: Option<Decimal>,
}

fn text(value: &Option<String>) -> CellValue<'_> {
    value.as_deref().map_or(CellValue::Empty, CellValue::Text)
}

fn amount<'a>(value: Option<Decimal>) -> CellValue<'a> {
    value.map_or(CellValue::Empty, CellValue::Amount)
}

impl MovementRecord {
    pub fn value(&self, column: Column) -> CellValue<'_> {
        match column {
            Column::MarketName => text(&self.market_name),
            Column::SubMarketName => text(&self.sub_market_name),
            Column::Asset => text(&self.asset),
            Column::FundCnpj => text(&self.fund_cnpj),
            Column::MovementDate => text(&self.movement_date),
            Column::MovementHistory => text(&self.movement_history),
            Column::LaunchType => text(&self.launch_type),
            Column::GrossValue => amount(self.gross_value),
            Column::IrValue => amount(self.ir_value),
            Column::IofValue => amount(self.iof_value),
            Column::NetValue => amount(self.net_value),
            Column::DueDate => text(&self.due_date),
            Column::Index => text(&self.index),
            Column::Fee => text(&self.fee),
            Column::Issuer => text(&self.issuer),
            Column::AccountingGroupCode => text(&self.accounting_group_code),
        }
    }

    /// Set a text field; monetary columns go through [`set_amount`](Self::set_amount).
    pub fn set_text(&mut self, column: Column, value: Option<String>) {
        let slot = match column {
            Column::MarketName => &mut self.market_name,
            Column::SubMarketName => &mut self.sub_market_name,
            Column::Asset => &mut self.asset,
            Column::FundCnpj => &mut self.fund_cnpj,
            Column::MovementDate => &mut self.movement_date,
            Column::MovementHistory => &mut self.movement_history,
            Column::LaunchType => &mut self.launch_type,
            Column::DueDate => &mut self.due_date,
            Column::Index => &mut self.index,
            Column::Fee => &mut self.fee,
            Column::Issuer => &mut self.issuer,
            Column::AccountingGroupCode => &mut self.accounting_group_code,
            Column::GrossValue | Column::IrValue | Column::IofValue | Column::NetValue => return,
        };
        *slot = value;
    }

    pub fn set_amount(&mut self, column: Column, value: Option<Decimal>) {
        match column {
            Column::GrossValue => self.gross_value = value,
            Column::IrValue => self.ir_value = value,
            Column::IofValue => self.iof_value = value,
            Column::NetValue => self.net_value = value,
            _ => {}
        }
    }
}

/// Exports write missing values in a few different ways
pub fn is_missing(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty()
        || ["nan", "null", "none", "na", "n/a"]
            .iter()
            .any(|m| raw.eq_ignore_ascii_case(m))
}

/// Parse an amount as exported (`1234.56`, `-10`, `1.5e3`)
pub fn parse_amount(raw: &str) -> Result<Option<Decimal>> {
    if is_missing(raw) {
        return Ok(None);
    }
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map(Some)
        .map_err(|_| anyhow!("Invalid amount: {}", raw))
}

/// Read a raw CSV export and project it onto the report columns.
///
/// Fails with [`MovementsError::Schema`] naming every expected column the
/// export lacks. Extra columns are ignored.
pub fn read_raw_export<P: AsRef<Path>>(path: P) -> Result<Vec<MovementRecord>> {
    let path = path.as_ref();
    info!("Reading raw export {:?}", path);

    let mut reader = ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open raw export {:?}", path))?;

    let headers = reader
        .headers()
        .context("Failed to read raw export headers")?
        .clone();
    debug!("Raw export headers: {:?}", headers);

    let mut mapping = Vec::with_capacity(Column::RAW.len());
    let mut missing = Vec::new();
    for column in Column::RAW {
        match headers
            .iter()
            .position(|h| Column::from_header(h) == Some(column))
        {
            Some(idx) => mapping.push((column, idx)),
            None => missing.push(column.header()),
        }
    }
    if !missing.is_empty() {
        return Err(MovementsError::Schema(missing.join(", ")).into());
    }

    let mut records = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let line = row_idx + 2;
        let row = result.with_context(|| format!("Failed to read raw export line {}", line))?;

        let mut record = MovementRecord::default();
        for &(column, idx) in &mapping {
            let raw = row.get(idx).unwrap_or("");
            if column.is_monetary() {
                let amount = parse_amount(raw)
                    .with_context(|| format!("line {}: {}", line, column.header()))?;
                record.set_amount(column, amount);
            } else if !is_missing(raw) {
                record.set_text(column, Some(raw.trim().to_string()));
            }
        }
        records.push(record);
    }

    info!("Read {} movements from raw export", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    const HEADER: &str = "marketName,subMarketName,asset,fundCnpj,movementDate,movementHistory,launchType,grossValue,irValue,iofValue,dueDate,index,fee,issuer,accountingGroupCode";

    #[test]
    fn test_layout_places_net_value_after_iof() {
        let headers: Vec<_> = Column::layout(true).into_iter().map(Column::header).collect();
        assert_eq!(headers.len(), 16);
        assert_eq!(&headers[7..12], &["grossValue", "irValue", "iofValue", "netValue", "dueDate"]);
        assert!(!Column::layout(false).contains(&Column::NetValue));
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("100.50").unwrap(), Some(dec!(100.50)));
        assert_eq!(parse_amount("-3").unwrap(), Some(dec!(-3)));
        assert_eq!(parse_amount("1.5e3").unwrap(), Some(dec!(1500)));
        assert_eq!(parse_amount("").unwrap(), None);
        assert_eq!(parse_amount("NaN").unwrap(), None);
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_read_raw_export_reorders_and_drops_extra_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("123.csv");
        std::fs::write(
            &path,
            "extra,grossValue,launchType,marketName,subMarketName,asset,fundCnpj,movementDate,movementHistory,irValue,iofValue,dueDate,index,fee,issuer,accountingGroupCode\n\
             x,10.5,VENDA,Fundos,FI,ABC,12345678000199,2024-01-02,Resgate,,,,,,,\n",
        )
        .unwrap();

        let records = read_raw_export(&path).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.gross_value, Some(dec!(10.5)));
        assert_eq!(r.launch_type.as_deref(), Some("VENDA"));
        assert_eq!(r.market_name.as_deref(), Some("Fundos"));
        assert_eq!(r.ir_value, None);
        assert_eq!(r.due_date, None);
    }

    #[test]
    fn test_read_raw_export_reports_missing_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("123.csv");
        let header = HEADER.replace(",fundCnpj", "").replace(",issuer", "");
        std::fs::write(&path, format!("{}\n", header)).unwrap();

        let err = read_raw_export(&path).unwrap_err();
        match err.downcast_ref::<MovementsError>() {
            Some(MovementsError::Schema(cols)) => assert_eq!(cols, "fundCnpj, issuer"),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_raw_export_rejects_bad_amount() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("123.csv");
        std::fs::write(
            &path,
            format!("{}\nRF,RF,X,,2024-01-02,h,VENDA,dez,,,,,,,\n", HEADER),
        )
        .unwrap();

        let err = read_raw_export(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("grossValue"));
    }
}
