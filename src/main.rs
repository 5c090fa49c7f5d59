use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info, warn};
use monitorscope::app::App;
use monitorscope::config::Config;
use monitorscope::dashboard::{AlertView, TargetStatus};
use monitorscope::error::ConfigError;
use monitorscope::model::{AlertQuery, AlertStats, Observation, TargetId};
use monitorscope::orchestrator::{CheckReport, CycleSummary, NotificationStatus};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Configuration file looked up in the working directory when `--config` is absent
const DEFAULT_CONFIG_FILE: &str = "monitorscope.toml";

/// Command-line arguments for MonitorScope
#[derive(Parser)]
#[command(
    name = "monitorscope",
    about = "MonitorScope - API health checks with email alerting",
    long_about = "Probes configured HTTP endpoints, records status and latency history, \
                  opens and resolves alerts, and emails recipients with a per-target \
                  re-notification interval."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        global = true,
        help = "Enable verbose logging output (default filter debug)"
    )]
    verbose: bool,

    /// Record emails instead of sending them
    #[arg(
        long,
        global = true,
        help = "Log alert emails instead of delivering them over SMTP"
    )]
    dry_run: bool,

    /// Print JSON instead of text
    #[arg(long, global = true, help = "Print machine-readable JSON output")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Check every active target once, or a single target
    Run {
        #[arg(short, long, value_name = "ID")]
        target: Option<TargetId>,
    },
    /// Check every active target on a fixed interval until Ctrl+C
    Watch {
        /// Seconds between cycles, overrides schedule.interval_seconds
        #[arg(short, long, value_name = "SECONDS")]
        interval: Option<u64>,
    },
    /// Show the current health of every active target
    Status,
    /// Show recent check results, newest first
    History {
        #[arg(short, long, value_name = "ID")]
        target: Option<TargetId>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Inspect and resolve alerts
    Alerts {
        #[command(subcommand)]
        action: AlertsCommand,
    },
    /// Check the email configuration
    Email {
        #[command(subcommand)]
        action: EmailCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
enum AlertsCommand {
    /// List alerts, newest first
    List {
        #[arg(short, long, value_name = "ID")]
        target: Option<TargetId>,

        /// Only show active alerts
        #[arg(short, long)]
        active: bool,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show alert counts
    Stats,
    /// Resolve the active alert of a target
    Resolve {
        #[arg(short, long, value_name = "ID")]
        target: TargetId,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
enum EmailCommand {
    /// Validate settings and perform an SMTP handshake
    Verify,
    /// Send a sample alert email
    Test {
        #[arg(long, value_name = "ADDRESS")]
        to: String,
    },
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in load_config
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        match &self.command {
            Command::Watch { interval: Some(0) } => {
                Err("Watch interval must be greater than 0".to_string())
            }
            Command::History { limit: 0, .. }
            | Command::Alerts {
                action: AlertsCommand::List { limit: 0, .. },
            } => Err("Limit must be greater than 0".to_string()),
            Command::Email {
                action: EmailCommand::Test { to },
            } if !to.contains('@') => Err(format!("Invalid recipient address: {}", to)),
            _ => Ok(()),
        }
    }

    /// Convert config path to string safely, handling non-UTF-8 paths
    ///
    /// # Returns
    ///
    /// `Ok(Some(path_str))` if config is provided and valid UTF-8,
    /// `Ok(None)` if no config provided,
    /// `Err(String)` if config path contains invalid UTF-8
    fn config_path_str(&self) -> Result<Option<&str>, String> {
        match &self.config {
            Some(path) => match path.to_str() {
                Some(path_str) => Ok(Some(path_str)),
                None => Err(format!(
                    "Configuration file path contains invalid UTF-8 characters: {}",
                    path.display()
                )),
            },
            None => Ok(None),
        }
    }
}

/// Load configuration, falling back to defaults when no file exists
///
/// An explicitly given path that does not exist is a warning, not an error.
/// A file that exists but does not parse or validate is an error.
/// Email settings from the environment are applied last.
fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let path = match config_path {
        Some(path) => Some(path),
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Some(DEFAULT_CONFIG_FILE),
        None => None,
    };

    let mut config = match path {
        Some(path) if Path::new(path).exists() => {
            info!("Loading configuration from: {}", path);
            Config::from_file(Path::new(path))?
        }
        Some(path) => {
            warn!(
                "Configuration file '{}' not found, using defaults",
                path
            );
            Config::default()
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    config.email.apply_env();
    if config.targets.is_empty() {
        warn!("No targets configured, nothing will be checked");
    }
    Ok(config)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn describe_notification(notification: &NotificationStatus) -> String {
    match notification {
        NotificationStatus::NotDue => "-".to_string(),
        NotificationStatus::Sent { recipients } => format!("sent to {}", recipients),
        NotificationStatus::Skipped(reason) => format!("skipped ({:?})", reason),
        NotificationStatus::Failed(e) => format!("failed: {}", e),
    }
}

fn format_report(report: &CheckReport) -> String {
    let mut line = format!(
        "[{}] {} {} {}ms alert={:?} email={}",
        report.target_id,
        report.target_name,
        report.status,
        report.response_time_ms,
        report.alert,
        describe_notification(&report.notification)
    );
    if let Some(message) = &report.error_message {
        line.push_str(&format!(" ({})", message));
    }
    if !report.recorded {
        line.push_str(" [not recorded]");
    }
    line
}

fn print_summary(summary: &CycleSummary) {
    for report in &summary.reports {
        println!("{}", format_report(report));
    }
    for failure in &summary.failures {
        println!(
            "[{}] {} FAILED: {}",
            failure.target_id, failure.target_name, failure.error
        );
    }
    println!(
        "{} checked, {} up, {} down, {} alerts opened, {} resolved, {} emails sent, {} failed",
        summary.checked(),
        summary.up(),
        summary.down(),
        summary.alerts_opened(),
        summary.alerts_resolved(),
        summary.notifications_sent(),
        summary.notifications_failed()
    );
}

fn print_status(rows: &[TargetStatus]) {
    if rows.is_empty() {
        println!("No active targets");
        return;
    }
    for row in rows {
        let latest = match &row.latest {
            Some(observation) => format!(
                "{} {} at {}",
                observation.status,
                observation
                    .response_time
                    .map(|ms| format!("{}ms", ms))
                    .unwrap_or_else(|| "-".to_string()),
                observation.checked_at.to_rfc3339()
            ),
            None => "never checked".to_string(),
        };
        let alert = match &row.active_alert {
            Some(alert) => format!(" | ALERT x{}: {}", alert.alert_count, alert.message),
            None => String::new(),
        };
        println!(
            "[{}] {} ({}) {} - {}{}",
            row.target.id, row.target.name, row.target.url, row.label, latest, alert
        );
    }
}

fn print_history(observations: &[Observation]) {
    if observations.is_empty() {
        println!("No checks recorded");
        return;
    }
    for observation in observations {
        println!(
            "{} target={} {} {}",
            observation.checked_at.to_rfc3339(),
            observation.target_id,
            observation.status,
            observation
                .response_time
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "-".to_string())
        );
    }
}

fn print_alerts(alerts: &[AlertView]) {
    if alerts.is_empty() {
        println!("No alerts");
        return;
    }
    for view in alerts {
        let alert = &view.alert;
        let resolved = alert
            .resolved_at
            .map(|t| format!(", resolved {}", t.to_rfc3339()))
            .unwrap_or_default();
        println!(
            "#{} [{}] {} ({}) x{} triggered {}{}: {}",
            alert.id,
            alert.status.as_str(),
            view.target_name,
            view.target_url,
            alert.alert_count,
            alert.triggered_at.to_rfc3339(),
            resolved,
            alert.message
        );
    }
}

fn print_stats(stats: &AlertStats) {
    println!(
        "total: {}, active: {}, resolved: {}, average alert count: {:.2}",
        stats.total, stats.active, stats.resolved, stats.avg_alert_count
    );
}

async fn watch(app: &App, interval: Duration, json: bool) -> Result<()> {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    info!(
        "Checking targets every {}s. Press Ctrl+C to stop.",
        interval.as_secs()
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match app.run_all_checks().await {
                    Ok(summary) if json => print_json(&summary)?,
                    Ok(summary) => print_summary(&summary),
                    Err(e) => error!("Health check cycle failed: {}", e),
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    info!("MonitorScope stopped");
    Ok(())
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let app = App::from_config(&config, cli.dry_run).context("Failed to initialize MonitorScope")?;

    match cli.command {
        Command::Run { target: Some(id) } => {
            let report = app
                .run_check(id)
                .await
                .with_context(|| format!("Health check failed for target {}", id))?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("{}", format_report(&report));
            }
        }
        Command::Run { target: None } => {
            let summary = app
                .run_all_checks()
                .await
                .context("Health check cycle failed")?;
            if cli.json {
                print_json(&summary)?;
            } else {
                print_summary(&summary);
            }
        }
        Command::Watch { interval } => {
            let seconds = interval.unwrap_or(config.schedule.interval_seconds);
            watch(&app, Duration::from_secs(seconds), cli.json).await?;
        }
        Command::Status => {
            let rows = app.status().context("Failed to load target status")?;
            if cli.json {
                print_json(&rows)?;
            } else {
                print_status(&rows);
            }
        }
        Command::History { target, limit } => {
            let observations = app
                .history(target, limit)
                .context("Failed to load check history")?;
            if cli.json {
                print_json(&observations)?;
            } else {
                print_history(&observations);
            }
        }
        Command::Alerts { action } => match action {
            AlertsCommand::List {
                target,
                active,
                limit,
            } => {
                let alerts = app
                    .alerts(AlertQuery {
                        target_id: target,
                        active_only: active,
                        limit,
                    })
                    .context("Failed to load alerts")?;
                if cli.json {
                    print_json(&alerts)?;
                } else {
                    print_alerts(&alerts);
                }
            }
            AlertsCommand::Stats => {
                let stats = app.alert_stats().context("Failed to load alert stats")?;
                if cli.json {
                    print_json(&stats)?;
                } else {
                    print_stats(&stats);
                }
            }
            AlertsCommand::Resolve { target } => {
                let resolved = app
                    .resolve_alert(target)
                    .with_context(|| format!("Failed to resolve alert for target {}", target))?;
                if cli.json {
                    print_json(&serde_json::json!({ "target_id": target, "resolved": resolved }))?;
                } else if resolved {
                    println!("Alert for target {} resolved", target);
                } else {
                    println!("No active alert for target {}", target);
                }
            }
        },
        Command::Email { action } => match action {
            EmailCommand::Verify => {
                let report = app.verify_email().await;
                if cli.json {
                    print_json(&report)?;
                } else {
                    println!("{}", report.message);
                }
                if !report.success {
                    anyhow::bail!("Email configuration check failed");
                }
            }
            EmailCommand::Test { to } => {
                app.send_test_email(&to)
                    .await
                    .with_context(|| format!("Failed to send test email to {}", to))?;
                println!("Test email sent to {}", to);
            }
        },
    }

    if let Some(outbox) = app.outbox() {
        info!("[dry-run] {} email(s) captured", outbox.send_count());
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config_path = match cli.config_path_str() {
        Ok(path) => path,
        Err(e) => {
            error!("Invalid configuration path: {}", e);
            std::process::exit(1);
        }
    };

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
