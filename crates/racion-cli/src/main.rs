//! `racion`: command-line front end of the ration kiosk.
//!
//! `racion run` serves the kiosk, writing one JSON event per line on stdout
//! and reading one JSON command per line on stdin. The other subcommands
//! are one-shot maintenance operations on the same database. Logs go to
//! stderr and are filtered with `RUST_LOG`.
//!
//! Usage:
//!   racion configure --terminal-id TOTEM-01
//!   racion enroll --run 12345678 --name "Ana Rojas" --template ana
//!   racion run --emulate

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{ArgAction, Parser, Subcommand};
use racion_core::Identity;
use racion_core::constants::SERVICE_DATE_FORMAT;
use racion_hardware::mock::MockSensor;
use racion_hardware::{DeviceWorker, InitError};
use racion_kiosk::{
    ErrorCode, EventRecord, Kiosk, KioskCommand, KioskEvent, KioskSettings, KioskStatus,
    StatsData,
};
use racion_storage::{
    AdminSeed, ConfigRepository, Database, EnrollmentRequest, RationLedger, StudentRepository,
    TemplateStore, TerminalConfig,
};
use serde_json::{Value, json};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "racion", version)]
#[command(about = "Fingerprint-based school ration kiosk")]
struct Cli {
    /// SQLite database file (overrides RACION_DATABASE)
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Serve the kiosk: events on stdout, commands on stdin
    Run {
        /// Drive the emulated sensor and accept `touch` commands
        #[arg(long)]
        emulate: bool,

        /// Identification threshold, 0-100 (overrides RACION_MATCH_THRESHOLD)
        #[arg(long, value_parser = clap::value_parser!(i32).range(0..=100))]
        threshold: Option<i32>,

        /// Pause after each finger read in milliseconds (overrides RACION_COOLDOWN_MS)
        #[arg(long)]
        cooldown_ms: Option<u64>,
    },

    /// Write the terminal configuration
    Configure {
        #[arg(long)]
        terminal_id: String,

        /// Serial port of the ticket printer
        #[arg(long)]
        printer_port: Option<String>,
    },

    /// Create the administrator account if it does not exist yet
    BootstrapAdmin {
        #[arg(long)]
        run: Identity,

        #[arg(long)]
        name: String,

        #[arg(long, env = "RACION_ADMIN_PASSWORD_HASH", hide_env_values = true)]
        password_hash: String,
    },

    /// Enroll a student with a template given as text (emulated sensor format)
    Enroll {
        #[arg(long)]
        run: Identity,

        #[arg(long)]
        name: String,

        #[arg(long)]
        course: Option<String>,

        #[arg(long)]
        template: String,
    },

    /// Delete a student's template; the student and their history stay
    RemoveTemplate {
        #[arg(long)]
        run: Identity,
    },

    /// Print ledger rows not yet synchronized
    Pending,

    /// Mark ledger rows as synchronized
    MarkSynced {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },

    /// Print the most recent ledger rows
    Recent {
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print rations served on a day (default today)
    Stats {
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
}

fn parse_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, SERVICE_DATE_FORMAT)
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    // stdout carries the event stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = KioskSettings::from_env().context("invalid environment settings")?;
    if let Some(path) = cli.database {
        settings = settings.database_path(path);
    }

    match cli.command {
        Command::Run {
            emulate,
            threshold,
            cooldown_ms,
        } => {
            if let Some(threshold) = threshold {
                settings = settings.match_threshold(threshold);
            }
            if let Some(ms) = cooldown_ms {
                settings = settings.cooldown(Duration::from_millis(ms));
            }
            serve(settings, emulate).await
        }
        command => {
            let db = Database::new(settings.database_config())
                .await
                .with_context(|| format!("failed to open database {}", settings.database_path))?;
            let result = oneshot(&db, &settings, command).await;
            db.close().await;

            println!("{}", result?);
            Ok(())
        }
    }
}

/// Run the kiosk until a `stop` command or Ctrl-C.
async fn serve(settings: KioskSettings, emulate: bool) -> Result<()> {
    let (_sensor, handle) = MockSensor::with_name("Emulated Fingerprint Reader");
    if !emulate {
        // No vendor SDK backend is linked into this binary
        handle.fail_open(InitError::device_not_found("fingerprint reader"));
    }
    let factory = handle.clone();
    let worker = Arc::new(DeviceWorker::new(settings.worker_config(), move || {
        factory.sensor()
    }));

    let (kiosk, mut events) = Kiosk::open(settings, worker)
        .await
        .context("failed to start kiosk")?;
    let kiosk = Arc::new(if emulate {
        kiosk.with_emulator(handle)
    } else {
        kiosk
    });
    info!(terminal_id = %kiosk.terminal().terminal_id, emulate, "Serving");

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events.recv().await {
            let last = event == KioskEvent::status(KioskStatus::Stopped);
            match event.to_line() {
                Ok(mut line) => {
                    line.push('\n');
                    if let Err(e) = stdout.write_all(line.as_bytes()).await {
                        error!(error = %e, "Failed to write event");
                        break;
                    }
                    if let Err(e) = stdout.flush().await {
                        error!(error = %e, "Failed to flush stdout");
                        break;
                    }
                }
                Err(e) => error!(error = %e, ?event, "Failed to encode event"),
            }
            if last {
                break;
            }
        }
    });

    let (commands_tx, commands) = mpsc::unbounded_channel();
    spawn_stdin_reader(commands_tx, kiosk.event_sender())?;

    let (shutdown_tx, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                // Holding the sender keeps the loop running
                std::future::pending::<()>().await;
            }
        }
    });

    let served = kiosk.run(commands, shutdown).await;
    kiosk.shutdown().await;
    if let Err(e) = printer.await {
        error!(error = %e, "Event printer task failed");
    }

    served.context("kiosk loop failed")
}

/// Read commands from stdin on a plain thread, so a pending read never
/// holds up process exit.
fn spawn_stdin_reader(
    commands: mpsc::UnboundedSender<KioskCommand>,
    events: mpsc::UnboundedSender<KioskEvent>,
) -> Result<()> {
    std::thread::Builder::new()
        .name("racion-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match KioskCommand::parse(&line) {
                    Ok(command) => {
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Invalid command line");
                        if events.send(KioskEvent::error(ErrorCode::InvalidCommand)).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("stdin closed");
        })
        .context("failed to spawn stdin reader")?;
    Ok(())
}

/// Execute a maintenance subcommand and return the JSON to print.
async fn oneshot(db: &Database, settings: &KioskSettings, command: Command) -> Result<Value> {
    let value = match command {
        Command::Run { .. } => anyhow::bail!("`run` is not a one-shot command"),
        Command::Configure {
            terminal_id,
            printer_port,
        } => {
            let mut config = TerminalConfig::new(terminal_id);
            if let Some(port) = printer_port {
                config = config.with_printer_port(port);
            }
            db.config()
                .save(&config)
                .await
                .context("failed to save terminal configuration")?;
            json!({ "type": "config", "data": config })
        }
        Command::BootstrapAdmin {
            run,
            name,
            password_hash,
        } => {
            let seed = AdminSeed {
                identity: run,
                full_name: name,
                password_hash,
            };
            let created = db
                .bootstrap_admin(&seed)
                .await
                .context("failed to bootstrap administrator")?;
            json!({ "type": "admin", "run": seed.identity.as_str(), "created": created })
        }
        Command::Enroll {
            run,
            name,
            course,
            template,
        } => {
            let mut request = EnrollmentRequest::student(run.clone(), name, template.into_bytes());
            if let Some(course) = course {
                request = request.with_course(course);
            }
            db.students()
                .enroll(&request)
                .await
                .with_context(|| format!("failed to enroll {run}"))?;
            serde_json::to_value(KioskEvent::status(KioskStatus::EnrollSuccess))?
        }
        Command::RemoveTemplate { run } => {
            db.templates()
                .remove(&run)
                .await
                .with_context(|| format!("failed to remove template of {run}"))?;
            json!({ "type": "template_removed", "run": run.as_str() })
        }
        Command::Pending => {
            let rows = db.ledger().pending().await.context("failed to read ledger")?;
            serde_json::to_value(KioskEvent::SyncData {
                data: rows.iter().map(EventRecord::from).collect(),
            })?
        }
        Command::MarkSynced { ids } => {
            let changed = db
                .ledger()
                .mark_synced(&ids)
                .await
                .context("failed to mark rows synced")?;
            info!(requested = ids.len(), changed, "Rows marked synced");
            serde_json::to_value(KioskEvent::status(KioskStatus::SyncMarkedOk))?
        }
        Command::Recent { limit } => {
            let rows = db
                .ledger()
                .recent(limit.unwrap_or(settings.recent_limit))
                .await
                .context("failed to read ledger")?;
            serde_json::to_value(KioskEvent::RecentData {
                data: rows.iter().map(EventRecord::from).collect(),
            })?
        }
        Command::Stats { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let counts = db
                .ledger()
                .daily_counts(date)
                .await
                .context("failed to count rations")?;
            serde_json::to_value(KioskEvent::Stats {
                data: StatsData::from(counts),
            })?
        }
    };
    Ok(value)
}
