mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::Parser;
use colored::Colorize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::formatters::{format_report_outcome, format_reprocess_report, format_run_report};
use cli::interactive::{Answer, Prompter};
use cli::{Cli, Commands};
use movimentacoes::api::{
    holder_from_account, AccessToken, AccountApiClient, ExportApi, ExportPeriod,
};
use movimentacoes::batch::{reprocess_pending, BatchContext, ClientOutcome};
use movimentacoes::config::Settings;
use movimentacoes::listener::{request_shutdown, WebhookListener};
use movimentacoes::notify::NotificationChannel;
use movimentacoes::report::run_pipeline;
use movimentacoes::roster::{ClientEntry, Roster};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Batch {
            roster,
            start,
            end,
            timeout,
        } => {
            let period = ExportPeriod::from_inputs(
                start.as_deref(),
                end.as_deref(),
                Local::now().date_naive(),
            )?;
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.batch_timeout());
            handle_batch(&settings, roster, period, timeout).await
        }
        Commands::Interactive { roster } => handle_interactive(&settings, roster).await,
        Commands::Reprocess { roster } => handle_reprocess(&settings, roster),
        Commands::Report { file, name } => handle_report(&settings, &file, name),
    }
}

fn load_roster(settings: &Settings, arg: Option<PathBuf>) -> Result<Roster> {
    let path = arg
        .or_else(|| settings.paths.roster.clone())
        .ok_or_else(|| anyhow!("No client roster given (use --roster or ROSTER_PATH)"))?;
    let roster = Roster::load(&path)?;
    info!("Loaded {} clients from {:?}", roster.len(), path);
    Ok(roster)
}

/// Load the roster when one is configured; a missing roster is not an error here.
fn optional_roster(settings: &Settings, arg: Option<PathBuf>) -> Result<Option<Roster>> {
    match arg.or_else(|| settings.paths.roster.clone()) {
        Some(path) => Roster::load(&path).map(Some),
        None => Ok(None),
    }
}

async fn start_session(
    settings: &Settings,
) -> Result<(AccountApiClient, AccessToken, Arc<NotificationChannel>, WebhookListener)> {
    let api = AccountApiClient::new(settings.api_credentials()?)?;
    let channel = Arc::new(NotificationChannel::new());
    let listener = WebhookListener::start(&settings.listener.bind, channel.clone()).await?;

    let token = match api.acquire_token().await {
        Ok(token) => token,
        Err(e) => {
            shutdown_listener(listener).await;
            return Err(e);
        }
    };
    Ok((api, token, channel, listener))
}

async fn shutdown_listener(listener: WebhookListener) {
    if let Err(e) = request_shutdown(&listener.base_url()).await {
        eprintln!("{} {:#}", "Listener shutdown request failed:".yellow(), e);
        listener.stop();
    }
    if let Err(e) = listener.join().await {
        warn!("Listener did not stop cleanly: {:#}", e);
    }
}

async fn handle_batch(
    settings: &Settings,
    roster: Option<PathBuf>,
    period: ExportPeriod,
    timeout: Duration,
) -> Result<()> {
    let roster = load_roster(settings, roster)?;
    if roster.is_empty() {
        println!("{}", "Roster has no clients, nothing to do.".yellow());
        return Ok(());
    }

    let (api, token, channel, listener) = start_session(settings).await?;

    let ctx = BatchContext {
        api: &api,
        channel: &channel,
        token: Mutex::new(token),
        period,
        timeout: Some(timeout),
        export_dir: settings.paths.export_dir.clone(),
        reports_dir: settings.paths.reports_dir.clone(),
        show_progress: true,
    };
    let report = ctx.run(roster.entries()).await;

    println!("{}", format_run_report(&report));
    shutdown_listener(listener).await;
    Ok(())
}

async fn handle_interactive(settings: &Settings, roster: Option<PathBuf>) -> Result<()> {
    let roster = optional_roster(settings, roster)?;
    let (api, token, channel, listener) = start_session(settings).await?;

    let result = interactive_loop(settings, roster.as_ref(), &api, token, &channel).await;

    shutdown_listener(listener).await;
    result
}

/// One client per iteration. Per-client problems are reported and the loop
/// goes on; only a broken terminal ends it early.
async fn interactive_loop(
    settings: &Settings,
    roster: Option<&Roster>,
    api: &AccountApiClient,
    mut token: AccessToken,
    channel: &NotificationChannel,
) -> Result<()> {
    let mut prompter = Prompter::new()?;

    println!("{}", "Interactive mode. Ctrl-D quits.".bold());
    loop {
        let code = match prompter.ask("Client code: ")? {
            Answer::Quit => break,
            Answer::Line(code) if code.is_empty() => continue,
            Answer::Line(code) => code,
        };

        let account = match &settings.api.account_url {
            Some(_) => match api.fetch_account(&code, &token).await {
                Ok(document) => Some(document),
                Err(e) => {
                    eprintln!("{} {:#}", "Client check failed:".red(), e);
                    continue;
                }
            },
            None => None,
        };

        let client = match roster.map(|r| r.lookup(&code)) {
            Some(Ok(entry)) => entry.clone(),
            lookup => {
                if let Some(Err(e)) = lookup {
                    warn!("{}; naming the report from the account data", e);
                }
                match account.as_ref().and_then(holder_from_account) {
                    Some(holder) => ClientEntry::new(code.clone(), holder),
                    None => ClientEntry::unnamed(code.clone()),
                }
            }
        };

        let Some(answer) = prompter.ask_period()? else {
            break;
        };
        let period = match answer.resolve(Local::now().date_naive()) {
            Ok(period) => period,
            Err(e) => {
                eprintln!("{} {:#}", "Invalid period:".red(), e);
                continue;
            }
        };

        let ctx = BatchContext {
            api,
            channel,
            token: Mutex::new(token.clone()),
            period,
            timeout: None,
            export_dir: settings.paths.export_dir.clone(),
            reports_dir: settings.paths.reports_dir.clone(),
            show_progress: true,
        };
        let result = ctx.process_client(&client).await;
        token = ctx.current_token().await;

        match &result.outcome {
            ClientOutcome::Processed(outcome) => println!("{}", format_report_outcome(outcome)),
            ClientOutcome::TimedOut(_) => println!("{}", "No export was delivered.".yellow()),
            ClientOutcome::Failed { state, error } => {
                error!("Client {} failed while {}: {}", client.code, state, error);
                eprintln!("{} {}", "Failed:".red(), error);
            }
        }

        if !prompter.ask_continue()? {
            break;
        }
    }
    Ok(())
}

fn handle_reprocess(settings: &Settings, roster: Option<PathBuf>) -> Result<()> {
    let roster = load_roster(settings, roster)?;
    let report = reprocess_pending(
        &settings.paths.export_dir,
        &roster,
        &settings.paths.reports_dir,
    )?;
    println!("{}", format_reprocess_report(&report));
    Ok(())
}

fn handle_report(settings: &Settings, file: &Path, name: Option<String>) -> Result<()> {
    let base_name = match name {
        Some(name) => name,
        None => file
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Cannot derive a report name from {:?}", file))?,
    };

    let outcome = run_pipeline(file, &base_name, &settings.paths.reports_dir)?;
    println!("{}", format_report_outcome(&outcome));
    Ok(())
}
