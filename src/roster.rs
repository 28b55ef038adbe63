//! Client roster
//!
//! Read-only mapping from client code to holder name, loaded once per run
//! from a spreadsheet or CSV kept by the back office. Holder names only
//! matter for naming the produced reports.

use std::path::Path;

use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use encoding_rs::WINDOWS_1252;
use tracing::{debug, info, warn};

use crate::error::{MovementsError, Result};

const CODE_HEADERS: &[&str] = &["code", "codigo", "código", "conta", "account", "clientcode"];
const HOLDER_HEADERS: &[&str] = &["holder", "titular", "nome", "name"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntry {
    pub code: String,
    pub holder: String,
}

impl ClientEntry {
    pub fn new(code: impl Into<String>, holder: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            holder: holder.into(),
        }
    }

    /// Client known only by its code; the report is named after the code.
    pub fn unnamed(code: impl Into<String>) -> Self {
        Self::new(code, "")
    }

    /// Base file name (no extension) of this client's report
    pub fn report_base_name(&self) -> String {
        let holder = self.holder.trim();
        if holder.is_empty() {
            return sanitize_file_name(&self.code);
        }
        format!("{} - {}", sanitize_file_name(holder), self.code)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<ClientEntry>,
}

impl Roster {
    pub fn new(entries: Vec<ClientEntry>) -> Self {
        Self { entries }
    }

    /// Load a roster from `.xlsx`/`.xls` or `.csv`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| anyhow!("Roster file has no extension: {:?}", path))?
            .to_lowercase();

        info!("Loading client roster from {:?}", path);

        let rows = match extension.as_str() {
            "xlsx" | "xls" => read_spreadsheet_rows(path)?,
            "csv" | "txt" => read_csv_rows(path)?,
            _ => {
                return Err(anyhow!(
                    "Unsupported roster format: {}. Supported formats: .xlsx, .xls, .csv",
                    extension
                ))
            }
        };

        let roster = Self::from_rows(rows)?;
        info!("Loaded {} clients from roster", roster.len());
        Ok(roster)
    }

    /// Build a roster from a header row followed by data rows.
    fn from_rows(rows: Vec<Vec<String>>) -> Result<Self> {
        let mut rows = rows.into_iter();
        let headers = rows.next().ok_or_else(|| anyhow!("Roster is empty"))?;

        let find = |candidates: &[&str]| {
            headers.iter().position(|h| {
                let h = h.trim().to_lowercase().replace([' ', '_'], "");
                candidates.contains(&h.as_str())
            })
        };
        let code_idx = find(CODE_HEADERS)
            .ok_or_else(|| anyhow!("Roster has no client code column (headers: {:?})", headers))?;
        let holder_idx = find(HOLDER_HEADERS)
            .ok_or_else(|| anyhow!("Roster has no holder column (headers: {:?})", headers))?;
        debug!(code_idx, holder_idx, "Roster column mapping");

        let mut entries = Vec::new();
        for (idx, row) in rows.enumerate() {
            let code = row.get(code_idx).map(|c| c.trim()).unwrap_or("");
            let holder = row.get(holder_idx).map(|h| h.trim()).unwrap_or("");
            if code.is_empty() {
                continue;
            }
            if holder.is_empty() {
                warn!("Roster row {} has no holder name for client {}", idx + 2, code);
            }
            entries.push(ClientEntry::new(code, holder));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ClientEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, code: &str) -> std::result::Result<&ClientEntry, MovementsError> {
        let code = code.trim();
        self.entries
            .iter()
            .find(|e| e.code == code)
            .ok_or_else(|| MovementsError::RosterLookup(code.to_string()))
    }
}

fn read_spreadsheet_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path).context("Failed to open roster workbook")?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Roster workbook has no sheets"))?
        .context("Failed to read roster sheet")?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Account numbers typed as numbers come back as floats
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let bytes = std::fs::read(path).context("Failed to read roster file")?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!("Roster is not UTF-8, decoding as Windows-1252");
            let (decoded, _, _) = WINDOWS_1252.decode(e.as_bytes());
            decoded.into_owned()
        }
    };

    let first_line = text.lines().next().unwrap_or("");
    let delimiter = if first_line.matches(';').count() > first_line.matches(',').count() {
        b';'
    } else {
        b','
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read roster record")?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }
    Ok(rows)
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
