//! Movement report pipeline
//!
//! Turns a raw CSV export into the report workbook in five stages. Each
//! stage re-opens the workbook written by the previous one, so a failure
//! leaves the last completed stage on disk:
//!
//! 1. projection of the raw export onto the report columns (the CSV is
//!    deleted once the workbook exists)
//! 2. fund tax-id normalization and sign adjustment
//! 3. `netValue` derivation and currency formatting
//! 4. highlighting of negative gross values
//! 5. the "Resumo" summary sheet

pub mod net_value;
pub mod normalize;
pub mod record;
pub mod summary;
pub mod workbook;

use std::path::{Path, PathBuf};

use anyhow::Context;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::Result;
use record::read_raw_export;
use workbook::{unique_report_path, ReportWorkbook, SheetFormatting};

pub use record::{Column, MovementRecord};
pub use summary::SummaryTable;

/// What a finished pipeline produced
#[derive(Debug, Clone, PartialEq)]
pub struct ReportOutcome {
    pub path: PathBuf,
    pub movements: usize,
    pub funds: usize,
    pub total_gross: Decimal,
}

/// A report being built, one stage at a time
#[derive(Debug)]
pub struct ReportPipeline {
    path: PathBuf,
    formatting: SheetFormatting,
}

impl ReportPipeline {
    /// Stage 1: project the raw export and write it as a new workbook.
    pub fn convert(csv_path: &Path, base_name: &str, reports_dir: &Path) -> Result<Self> {
        let movements = read_raw_export(csv_path)?;

        std::fs::create_dir_all(reports_dir)
            .with_context(|| format!("Failed to create reports directory {:?}", reports_dir))?;
        let path = unique_report_path(reports_dir, base_name);

        let formatting = SheetFormatting::default();
        ReportWorkbook::new(path.clone(), movements).save(&formatting)?;

        std::fs::remove_file(csv_path)
            .with_context(|| format!("Failed to remove raw export {:?}", csv_path))?;
        info!("Report workbook created at {:?}", path);

        Ok(Self { path, formatting })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stage 2: punctuate fund tax-ids, fill missing ones, flip credit-like
    /// movements to negative.
    pub fn normalize(&mut self) -> Result<()> {
        let mut report = ReportWorkbook::open(&self.path)?;
        report
            .movements
            .iter_mut()
            .for_each(normalize::normalize_record);
        report.save(&self.formatting)?;
        info!("Fund tax-ids and signs normalized");
        Ok(())
    }

    /// Stage 3: add `netValue` after `iofValue`, then format the money columns.
    pub fn derive_net_value(&mut self) -> Result<()> {
        let mut report = ReportWorkbook::open(&self.path)?;
        report
            .movements
            .iter_mut()
            .for_each(net_value::derive_net_value);
        report.with_net_value = true;
        report.save(&self.formatting)?;

        self.formatting.currency = true;
        report.save(&self.formatting)?;
        info!("Net values derived and formatted");
        Ok(())
    }

    /// Stage 4: fill negative gross values.
    pub fn highlight_negatives(&mut self) -> Result<()> {
        let report = ReportWorkbook::open(&self.path)?;
        self.formatting.highlight_negative_gross = true;
        report.save(&self.formatting)?;
        info!("Negative gross values highlighted");
        Ok(())
    }

    /// Stage 5: append the "Resumo" sheet.
    pub fn summarize(&mut self) -> Result<SummaryTable> {
        let mut report = ReportWorkbook::open(&self.path)?;
        let table = summary::summarize(&report.movements);
        report.summary = Some(table.clone());
        report.save(&self.formatting)?;
        info!("Summary sheet created with {} funds", table.rows.len());
        Ok(table)
    }
}

/// Run all five stages on one raw export.
pub fn run_pipeline(csv_path: &Path, base_name: &str, reports_dir: &Path) -> Result<ReportOutcome> {
    let mut pipeline = ReportPipeline::convert(csv_path, base_name, reports_dir)
        .context("Projection and conversion failed")?;
    pipeline.normalize().context("Normalization failed")?;
    pipeline
        .derive_net_value()
        .context("Net value derivation failed")?;
    pipeline
        .highlight_negatives()
        .context("Highlighting failed")?;
    let table = pipeline.summarize().context("Summary generation failed")?;

    let total_gross: Decimal = table
        .rows
        .iter()
        .flat_map(|r| r.gross_by_type.iter())
        .copied()
        .sum();
    let movements = ReportWorkbook::open(pipeline.path())?.movements.len();

    Ok(ReportOutcome {
        path: pipeline.path,
        movements,
        funds: table.rows.len(),
        total_gross,
    })
}
