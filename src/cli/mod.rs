use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod formatters;
pub mod interactive;

#[derive(Parser)]
#[command(name = "movimentacoes")]
#[command(
    version,
    about = "Account movement exports turned into audit-ready Excel reports"
)]
#[command(
    long_about = "Requests movement exports from the account API, waits for the completion webhook and builds a formatted report workbook (with a \"Resumo\" summary sheet) for each client."
)]
pub struct Cli {
    /// Configuration file (TOML); defaults to the user config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request and build reports for every client in the roster, unattended
    Batch {
        /// Client roster (.xlsx or .csv); overrides ROSTER_PATH
        #[arg(long)]
        roster: Option<PathBuf>,

        /// Period start (YYYY-MM-DD or DD/MM/YYYY); defaults to last month
        #[arg(long)]
        start: Option<String>,

        /// Period end (YYYY-MM-DD or DD/MM/YYYY); defaults to last month
        #[arg(long)]
        end: Option<String>,

        /// Seconds to wait for each client's completion webhook
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Process one client at a time, asking before each new client
    Interactive {
        /// Client roster used to name reports
        #[arg(long)]
        roster: Option<PathBuf>,
    },

    /// Build reports for raw exports already waiting in the export directory
    Reprocess {
        /// Client roster (.xlsx or .csv); overrides ROSTER_PATH
        #[arg(long)]
        roster: Option<PathBuf>,
    },

    /// Build a report from a single raw export file
    Report {
        /// Path to the raw CSV export (deleted once converted)
        file: PathBuf,

        /// Report base name; defaults to the file name
        #[arg(short, long)]
        name: Option<String>,
    },
}
