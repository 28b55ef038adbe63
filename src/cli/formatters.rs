//! Output formatting module for CLI display

use colored::Colorize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

use movimentacoes::batch::{ClientOutcome, ClientReport, ReprocessReport, RunReport};
use movimentacoes::report::ReportOutcome;
use movimentacoes::utils::format_currency;

#[derive(Tabled)]
struct ClientRow {
    #[tabled(rename = "Client")]
    code: String,
    #[tabled(rename = "Holder")]
    holder: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Movements")]
    movements: String,
    #[tabled(rename = "Gross total")]
    gross: String,
    #[tabled(rename = "Details")]
    details: String,
}

fn client_row(report: &ClientReport) -> ClientRow {
    let (status, movements, gross, details) = match &report.outcome {
        ClientOutcome::Processed(outcome) => (
            "processed".green().to_string(),
            outcome.movements.to_string(),
            format_currency(outcome.total_gross),
            outcome.path.display().to_string(),
        ),
        ClientOutcome::TimedOut(timeout) => (
            "timed out".yellow().to_string(),
            "-".to_string(),
            "-".to_string(),
            format!("no webhook after {}s", timeout.as_secs()),
        ),
        ClientOutcome::Failed { state, error } => (
            format!("failed ({})", state).red().to_string(),
            "-".to_string(),
            "-".to_string(),
            error.clone(),
        ),
    };

    ClientRow {
        code: report.client.code.clone(),
        holder: report.client.holder.clone(),
        status,
        movements,
        gross,
        details,
    }
}

/// Format a batch run as a table plus totals
pub fn format_run_report(report: &RunReport) -> String {
    let rows: Vec<ClientRow> = report.clients.iter().map(client_row).collect();

    let mut output = String::new();
    if !rows.is_empty() {
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(3..5)).with(Alignment::right()))
            .to_string();
        output.push_str(&format!("{}\n", table));
    }

    output.push_str(&format!(
        "\n{} Batch complete: {} processed, {} timed out, {} failed\n",
        "✓".green().bold(),
        report.processed().to_string().green(),
        report.timed_out().to_string().yellow(),
        report.failed().to_string().red()
    ));
    output
}

/// One-line summary of a finished report
pub fn format_report_outcome(outcome: &ReportOutcome) -> String {
    format!(
        "{} Report written to {} ({} movements, {} funds, gross total {})",
        "✓".green().bold(),
        outcome.path.display(),
        outcome.movements,
        outcome.funds,
        format_currency(outcome.total_gross)
    )
}

pub fn format_reprocess_report(report: &ReprocessReport) -> String {
    let mut output = String::new();
    for (client, outcome) in &report.processed {
        output.push_str(&format!("{} [{}]\n", format_report_outcome(outcome), client.code));
    }
    for (file, reason) in &report.skipped {
        output.push_str(&format!(
            "{} Skipped {}: {}\n",
            "✗".red().bold(),
            file.display(),
            reason
        ));
    }
    if report.processed.is_empty() && report.skipped.is_empty() {
        output.push_str("No pending exports found\n");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use movimentacoes::batch::ClientState;
    use movimentacoes::roster::ClientEntry;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;
    use std::time::Duration;

    fn report(outcome: ClientOutcome) -> ClientReport {
        ClientReport {
            client: ClientEntry::new("123", "Maria"),
            states: vec![ClientState::Idle, ClientState::Done],
            outcome,
        }
    }

    #[test]
    fn test_run_report_lists_every_client() {
        colored::control::set_override(false);
        let run = RunReport {
            clients: vec![
                report(ClientOutcome::Processed(ReportOutcome {
                    path: PathBuf::from("relatorios/Maria - 123.xlsx"),
                    movements: 2,
                    funds: 1,
                    total_gross: dec!(-150),
                })),
                report(ClientOutcome::TimedOut(Duration::from_secs(300))),
            ],
        };

        let text = format_run_report(&run);
        assert!(text.contains("R$ -150,00"));
        assert!(text.contains("no webhook after 300s"));
        assert!(text.contains("1 processed, 1 timed out, 0 failed"));
    }

    #[test]
    fn test_empty_reprocess_report() {
        let text = format_reprocess_report(&ReprocessReport::default());
        assert_eq!(text, "No pending exports found\n");
    }
}
