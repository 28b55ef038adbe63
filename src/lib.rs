//! Movimentacoes - account movement exports turned into audit-ready reports
//!
//! Requests asynchronous movement exports from the account API, waits for the
//! completion webhook and turns each raw CSV export into a formatted Excel
//! workbook with net values, highlighted debits and a per-fund summary.

pub mod api;
pub mod batch;
pub mod config;
pub mod error;
pub mod listener;
pub mod notify;
pub mod report;
pub mod roster;
pub mod utils;

pub use error::{MovementsError, Result};
