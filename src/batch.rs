//! Batch orchestrator
//!
//! Drives clients one at a time through
//! `Idle → Requested → Waiting → {Processing | Skipped} → Done`.
//! A client that fails or times out is recorded and skipped; only the caller
//! decides what is fatal (the first token and the listener are set up before
//! a batch starts; a token rejected mid-run is replaced once).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::api::{AccessToken, ExportApi, ExportPeriod};
use crate::error::{MovementsError, Result};
use crate::notify::NotificationChannel;
use crate::report::{run_pipeline, ReportOutcome};
use crate::roster::{ClientEntry, Roster};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Requested,
    Waiting,
    Processing,
    Skipped,
    Done,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Idle => "idle",
            ClientState::Requested => "requested",
            ClientState::Waiting => "waiting",
            ClientState::Processing => "processing",
            ClientState::Skipped => "skipped",
            ClientState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientOutcome {
    Processed(ReportOutcome),
    TimedOut(Duration),
    /// Export request or report generation failed; `state` is where it happened
    Failed { state: ClientState, error: String },
}

#[derive(Debug, Clone)]
pub struct ClientReport {
    pub client: ClientEntry,
    /// Every state the client went through, in order
    pub states: Vec<ClientState>,
    pub outcome: ClientOutcome,
}

impl ClientReport {
    pub fn is_processed(&self) -> bool {
        matches!(self.outcome, ClientOutcome::Processed(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub clients: Vec<ClientReport>,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.clients.iter().filter(|c| c.is_processed()).count()
    }

    pub fn timed_out(&self) -> usize {
        self.clients
            .iter()
            .filter(|c| matches!(c.outcome, ClientOutcome::TimedOut(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.clients
            .iter()
            .filter(|c| matches!(c.outcome, ClientOutcome::Failed { .. }))
            .count()
    }
}

/// Everything one batch run needs, passed explicitly
pub struct BatchContext<'a, A: ExportApi> {
    pub api: &'a A,
    pub channel: &'a NotificationChannel,
    /// Replaced in place when the export endpoint rejects it
    pub token: Mutex<AccessToken>,
    pub period: ExportPeriod,
    /// `None` waits for the webhook indefinitely (interactive mode)
    pub timeout: Option<Duration>,
    pub export_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub show_progress: bool,
}

impl<A: ExportApi> BatchContext<'_, A> {
    /// Process every client exactly once, strictly in order.
    pub async fn run(&self, clients: &[ClientEntry]) -> RunReport {
        info!(
            "Starting batch of {} clients for {}",
            clients.len(),
            self.period
        );
        let mut report = RunReport::default();
        for (idx, client) in clients.iter().enumerate() {
            info!("[{}/{}] Client {}", idx + 1, clients.len(), client.code);
            report.clients.push(self.process_client(client).await);
        }
        info!(
            "Batch finished: {} processed, {} timed out, {} failed",
            report.processed(),
            report.timed_out(),
            report.failed()
        );
        report
    }

    pub async fn process_client(&self, client: &ClientEntry) -> ClientReport {
        let mut states = vec![ClientState::Idle];

        // A callback that arrived after an earlier client timed out must not
        // satisfy this client's wait.
        self.channel.reset();

        if let Err(e) = self.request_export(&client.code).await {
            error!("Export request failed for client {}: {:#}", client.code, e);
            states.push(ClientState::Done);
            return ClientReport {
                client: client.clone(),
                states,
                outcome: ClientOutcome::Failed {
                    state: ClientState::Idle,
                    error: format!("{:#}", e),
                },
            };
        }
        states.push(ClientState::Requested);

        states.push(ClientState::Waiting);
        let spinner = self.spinner(&client.code);
        let signaled = self.channel.wait(self.timeout).await;
        spinner.finish_and_clear();

        if !signaled {
            let timeout = self.timeout.unwrap_or_default();
            warn!(
                "Client {} skipped: {}",
                client.code,
                MovementsError::Timeout(timeout)
            );
            states.push(ClientState::Skipped);
            states.push(ClientState::Done);
            return ClientReport {
                client: client.clone(),
                states,
                outcome: ClientOutcome::TimedOut(timeout),
            };
        }
        self.channel.reset();

        states.push(ClientState::Processing);
        let csv_path = self.export_dir.join(format!("{}.csv", client.code));
        let outcome = match self.generate_report(csv_path, client.report_base_name()).await {
            Ok(outcome) => {
                info!("Report for client {} written to {:?}", client.code, outcome.path);
                ClientOutcome::Processed(outcome)
            }
            Err(e) => {
                error!("Report generation failed for client {}: {:#}", client.code, e);
                ClientOutcome::Failed {
                    state: ClientState::Processing,
                    error: format!("{:#}", e),
                }
            }
        };
        states.push(ClientState::Done);

        ClientReport {
            client: client.clone(),
            states,
            outcome,
        }
    }

    /// Token currently in use, after any refresh during the run.
    pub async fn current_token(&self) -> AccessToken {
        self.token.lock().await.clone()
    }

    /// Request the export; an expired token is replaced once and the request
    /// retried with the new one.
    async fn request_export(&self, client_code: &str) -> Result<()> {
        let token = self.current_token().await;
        match self.api.request_export(client_code, &self.period, &token).await {
            Err(e) if is_rejected_token(&e) => {
                warn!("Access token rejected for client {}, requesting a new one", client_code);
                let fresh = self.api.acquire_token().await?;
                *self.token.lock().await = fresh.clone();
                self.api
                    .request_export(client_code, &self.period, &fresh)
                    .await
            }
            result => result,
        }
    }

    /// Run the (blocking) pipeline off the async worker and wait for it, so
    /// the next client never starts before this report is closed.
    async fn generate_report(&self, csv_path: PathBuf, base_name: String) -> Result<ReportOutcome> {
        let reports_dir = self.reports_dir.clone();
        tokio::task::spawn_blocking(move || run_pipeline(&csv_path, &base_name, &reports_dir))
            .await
            .context("Report task panicked")?
    }

    fn spinner(&self, client_code: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Waiting for export of client {}...", client_code));
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }
}

fn is_rejected_token(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<MovementsError>(),
        Some(MovementsError::Authentication(_))
    )
}

/// Result of reprocessing raw exports already sitting in the export directory
#[derive(Debug, Clone, Default)]
pub struct ReprocessReport {
    pub processed: Vec<(ClientEntry, ReportOutcome)>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Generate reports for every `{clientCode}.csv` found in `export_dir`.
///
/// Files whose stem is not in the roster are skipped, as are files whose
/// pipeline fails; neither stops the run.
pub fn reprocess_pending(
    export_dir: &Path,
    roster: &Roster,
    reports_dir: &Path,
) -> Result<ReprocessReport> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(export_dir)
        .with_context(|| format!("Failed to list export directory {:?}", export_dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    info!("Found {} pending exports in {:?}", files.len(), export_dir);

    let mut report = ReprocessReport::default();
    for file in files {
        let code = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let client = match roster.lookup(&code) {
            Ok(client) => client.clone(),
            Err(e) => {
                warn!("Skipping {:?}: {}", file, e);
                report.skipped.push((file, e.to_string()));
                continue;
            }
        };

        match run_pipeline(&file, &client.report_base_name(), reports_dir) {
            Ok(outcome) => report.processed.push((client, outcome)),
            Err(e) => {
                error!("Report generation failed for {:?}: {:#}", file, e);
                report.skipped.push((file, format!("{:#}", e)));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    struct RejectingApi;

    impl ExportApi for RejectingApi {
        async fn acquire_token(&self) -> Result<AccessToken> {
            Ok(AccessToken::new("t"))
        }

        async fn request_export(
            &self,
            client_code: &str,
            _period: &ExportPeriod,
            _token: &AccessToken,
        ) -> Result<()> {
            Err(MovementsError::Request(format!("HTTP 500 for {}", client_code)).into())
        }
    }

    fn period() -> ExportPeriod {
        ExportPeriod::previous_month(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap())
    }

    #[tokio::test]
    async fn test_request_failure_keeps_client_idle_and_moves_on() {
        let dir = tempfile::TempDir::new().unwrap();
        let channel = NotificationChannel::new();
        let ctx = BatchContext {
            api: &RejectingApi,
            channel: &channel,
            token: Mutex::new(AccessToken::new("t")),
            period: period(),
            timeout: Some(Duration::from_millis(10)),
            export_dir: dir.path().to_path_buf(),
            reports_dir: dir.path().join("out"),
            show_progress: false,
        };

        let report = ctx
            .run(&[ClientEntry::new("1", "A"), ClientEntry::new("2", "B")])
            .await;

        assert_eq!(report.failed(), 2);
        let first = &report.clients[0];
        assert_eq!(first.states, vec![ClientState::Idle, ClientState::Done]);
        assert!(matches!(
            &first.outcome,
            ClientOutcome::Failed { state: ClientState::Idle, error } if error.contains("HTTP 500 for 1")
        ));
    }

    /// Accepts only the token it issued last; every acquisition issues a new one.
    #[derive(Default)]
    struct ExpiringApi {
        issued: std::sync::atomic::AtomicUsize,
        requests: std::sync::Mutex<Vec<String>>,
    }

    impl ExportApi for ExpiringApi {
        async fn acquire_token(&self) -> Result<AccessToken> {
            let n = self.issued.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            Ok(AccessToken::new(format!("token-{}", n)))
        }

        async fn request_export(
            &self,
            client_code: &str,
            _period: &ExportPeriod,
            token: &AccessToken,
        ) -> Result<()> {
            self.requests
                .lock()
                .unwrap()
                .push(format!("{}:{}", client_code, token.as_str()));
            let current = format!(
                "token-{}",
                self.issued.load(std::sync::atomic::Ordering::SeqCst)
            );
            if token.as_str() != current {
                return Err(MovementsError::Authentication("token expired".into()).into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once_and_kept() {
        let dir = tempfile::TempDir::new().unwrap();
        let api = ExpiringApi::default();
        let channel = NotificationChannel::new();
        let ctx = BatchContext {
            api: &api,
            channel: &channel,
            token: Mutex::new(AccessToken::new("stale")),
            period: period(),
            timeout: Some(Duration::from_millis(10)),
            export_dir: dir.path().to_path_buf(),
            reports_dir: dir.path().join("out"),
            show_progress: false,
        };

        let report = ctx
            .run(&[ClientEntry::new("1", "A"), ClientEntry::new("2", "B")])
            .await;

        // Both requests went through; nobody signals, so both time out
        assert_eq!(report.timed_out(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(
            *api.requests.lock().unwrap(),
            vec!["1:stale", "1:token-1", "2:token-1"]
        );
        assert_eq!(ctx.current_token().await.as_str(), "token-1");
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ClientState::Skipped.to_string(), "skipped");
        assert_eq!(ClientState::Processing.to_string(), "processing");
    }
}
