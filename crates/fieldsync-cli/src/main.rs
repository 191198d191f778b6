// crates/fieldsync-cli/src/main.rs
// ============================================================================
// Module: FieldSync CLI Entry Point
// Description: Command dispatcher for refresh, export, ledger, and scheduling.
// Purpose: Drive the sync pipelines manually or on a cron cadence.
// Dependencies: chrono, clap, fieldsync crates, thiserror
// ============================================================================

//! ## Overview
//! The FieldSync CLI wires configuration into the two pipelines and runs
//! them on demand (`refresh`, `export`), reports ledger state (`status`,
//! `runs`), validates configuration (`config validate`), or drives both
//! pipelines on their cron cadences (`schedule`). Pipeline telemetry goes to
//! stderr; command results go to stdout.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub(crate) mod scheduler;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use fieldsync_config::FieldsyncConfig;
use fieldsync_core::ObservationStore;
use fieldsync_core::ProcessName;
use fieldsync_core::RefreshOrchestrator;
use fieldsync_core::RunOutcome;
use fieldsync_core::SyncEvent;
use fieldsync_core::SyncLedger;
use fieldsync_core::SyncObserver;
use fieldsync_export::GeoExportSink;
use fieldsync_export::SignedUploader;
use fieldsync_store_sqlite::ObservationSink;
use fieldsync_store_sqlite::SqliteStore;
use fieldsync_upstream::CursorPager;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "fieldsync", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the observation refresh pipeline once.
    Refresh(PipelineCommand),
    /// Run the geodata export pipeline once.
    Export(PipelineCommand),
    /// Show the last successful sync per pipeline.
    Status(PipelineCommand),
    /// List every ledger entry.
    Runs(PipelineCommand),
    /// Run both pipelines on their cron cadences until interrupted.
    Schedule(PipelineCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a FieldSync configuration file.
    Validate(PipelineCommand),
}

/// Shared arguments for commands operating on a configuration.
#[derive(Args, Debug)]
struct PipelineCommand {
    /// Optional config file path (defaults to fieldsync.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("fieldsync {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Refresh(command) => command_refresh(&command),
        Commands::Export(command) => command_export(&command),
        Commands::Status(command) => command_status(&command),
        Commands::Runs(command) => command_runs(&command),
        Commands::Schedule(command) => command_schedule(&command),
        Commands::Config {
            command,
        } => command_config(&command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Pipeline Construction
// ============================================================================

/// Loads configuration for a command.
fn load_config(command: &PipelineCommand) -> CliResult<FieldsyncConfig> {
    FieldsyncConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Opens the configured store.
fn open_store(config: &FieldsyncConfig) -> CliResult<Arc<SqliteStore>> {
    let store = SqliteStore::new(&config.store)
        .map_err(|err| CliError::new(format!("failed to open store: {err}")))?;
    Ok(Arc::new(store))
}

/// Builds the observation refresh orchestrator.
fn build_refresh(
    config: &FieldsyncConfig,
    store: &Arc<SqliteStore>,
) -> CliResult<RefreshOrchestrator> {
    let pager = CursorPager::new(ProcessName::ObservationRefresh, config.upstream.clone())
        .map_err(|err| CliError::new(format!("failed to build pager: {err}")))?
        .with_observer(Arc::new(StderrObserver));
    let sink = ObservationSink::new(Arc::clone(store) as Arc<dyn ObservationStore>)
        .with_prune_stale(config.pipeline.prune_stale);
    let mut orchestrator = RefreshOrchestrator::new(
        ProcessName::ObservationRefresh,
        Arc::new(pager),
        Arc::new(sink),
        Arc::clone(store) as Arc<dyn SyncLedger>,
    )
    .with_observer(Arc::new(StderrObserver))
    .with_labels(&source_label(config), &config.store.path.display().to_string());
    if let Some(deadline_ms) = config.pipeline.run_deadline_ms {
        orchestrator = orchestrator.with_deadline(Duration::from_millis(deadline_ms));
    }
    Ok(orchestrator)
}

/// Builds the geodata export orchestrator.
fn build_export(
    config: &FieldsyncConfig,
    store: &Arc<SqliteStore>,
) -> CliResult<RefreshOrchestrator> {
    let Some(export) = config.export.clone() else {
        return Err(CliError::new(
            "export destination not configured; add an [export] section".to_string(),
        ));
    };
    let target = format!("{}/{}", export.endpoint.trim_end_matches('/'), export.bucket);
    let uploader = SignedUploader::new(export)
        .map_err(|err| CliError::new(format!("failed to build uploader: {err}")))?;
    let pager = CursorPager::new(ProcessName::GeodataExport, config.upstream.clone())
        .map_err(|err| CliError::new(format!("failed to build pager: {err}")))?
        .with_observer(Arc::new(StderrObserver));
    let mut orchestrator = RefreshOrchestrator::new(
        ProcessName::GeodataExport,
        Arc::new(pager),
        Arc::new(GeoExportSink::new(uploader)),
        Arc::clone(store) as Arc<dyn SyncLedger>,
    )
    .with_observer(Arc::new(StderrObserver))
    .with_labels(&source_label(config), &target);
    if let Some(deadline_ms) = config.pipeline.run_deadline_ms {
        orchestrator = orchestrator.with_deadline(Duration::from_millis(deadline_ms));
    }
    Ok(orchestrator)
}

/// Builds the ledger source label from the upstream configuration.
fn source_label(config: &FieldsyncConfig) -> String {
    format!("{}/{}", config.upstream.base_url.trim_end_matches('/'), config.upstream.resource)
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `refresh` command.
fn command_refresh(command: &PipelineCommand) -> CliResult<ExitCode> {
    let config = load_config(command)?;
    let store = open_store(&config)?;
    let orchestrator = build_refresh(&config, &store)?;
    let outcome = orchestrator
        .run()
        .map_err(|err| CliError::new(format!("refresh failed: {err}")))?;
    report_outcome("refresh", &outcome)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `export` command.
fn command_export(command: &PipelineCommand) -> CliResult<ExitCode> {
    let config = load_config(command)?;
    let store = open_store(&config)?;
    let orchestrator = build_export(&config, &store)?;
    let outcome =
        orchestrator.run().map_err(|err| CliError::new(format!("export failed: {err}")))?;
    report_outcome("export", &outcome)?;
    Ok(ExitCode::SUCCESS)
}

/// Prints a completed run outcome.
fn report_outcome(label: &str, outcome: &RunOutcome) -> CliResult<()> {
    let detail = outcome.detail.as_deref().map_or(String::new(), |detail| format!(" ({detail})"));
    write_stdout_line(&format!(
        "{label} complete: {} rows in run {}{detail}",
        outcome.rows_loaded, outcome.run_id
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Executes the `status` command.
fn command_status(command: &PipelineCommand) -> CliResult<ExitCode> {
    let config = load_config(command)?;
    let store = open_store(&config)?;
    for process in [ProcessName::ObservationRefresh, ProcessName::GeodataExport] {
        let last = store
            .last_success(process)
            .map_err(|err| CliError::new(format!("ledger query failed: {err}")))?;
        let line = match last {
            Some(millis) => {
                format!("{process}: last success at {}", format_millis(millis))
            }
            None => format!("{process}: no successful run recorded"),
        };
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    let count = store
        .count()
        .map_err(|err| CliError::new(format!("store count failed: {err}")))?;
    write_stdout_line(&format!("observations stored: {count}"))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `runs` command.
fn command_runs(command: &PipelineCommand) -> CliResult<ExitCode> {
    let config = load_config(command)?;
    let store = open_store(&config)?;
    let runs = store
        .list_runs()
        .map_err(|err| CliError::new(format!("ledger query failed: {err}")))?;
    if runs.is_empty() {
        write_stdout_line("no runs recorded")
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }
    for run in runs {
        let finish = run.finish_time.map_or("-".to_string(), format_millis);
        let error = run.error_message.map_or(String::new(), |message| format!(" error={message}"));
        write_stdout_line(&format!(
            "run {} {} {} started={} finished={finish} rows={}{error}",
            run.id,
            run.process,
            run.status,
            format_millis(run.start_time),
            run.rows_loaded,
        ))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `schedule` command.
fn command_schedule(command: &PipelineCommand) -> CliResult<ExitCode> {
    let config = load_config(command)?;
    let store = open_store(&config)?;
    let refresh = build_refresh(&config, &store)?;
    let export = if config.export.is_some() {
        Some(build_export(&config, &store)?)
    } else {
        None
    };
    scheduler::run_scheduler(&config, refresh, export)
        .map_err(|err| CliError::new(format!("scheduler failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Dispatches config subcommands.
fn command_config(command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(command),
    }
}

/// Executes the `config validate` command.
fn command_config_validate(command: &PipelineCommand) -> CliResult<ExitCode> {
    load_config(command)?;
    write_stdout_line("config ok").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Telemetry
// ============================================================================

/// Observer forwarding pipeline events to stderr.
struct StderrObserver;

impl SyncObserver for StderrObserver {
    fn record(&self, event: &SyncEvent) {
        let line = match event {
            SyncEvent::RunStarted {
                process,
                run_id,
            } => format!("{process}: run {run_id} started"),
            SyncEvent::PageFetched {
                process,
                page_index,
                records,
            } => format!("{process}: page {page_index} fetched ({records} records)"),
            SyncEvent::EarlyTermination {
                process,
                processed,
                total_count,
            } => format!(
                "{process}: empty page with cursor present; stopping at {processed} of \
                 {total_count} reported records"
            ),
            SyncEvent::RunFinished {
                process,
                run_id,
                status,
                rows_loaded,
                duration_ms,
            } => format!(
                "{process}: run {run_id} finished {status} with {rows_loaded} rows in \
                 {duration_ms} ms"
            ),
            SyncEvent::RunRejected {
                process,
            } => format!("{process}: trigger rejected, run already in progress"),
        };
        let _ = write_stderr_line(&line);
    }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Formats a unix-millisecond timestamp as UTC RFC 3339.
fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map_or_else(|| format!("{millis}ms"), |stamp| stamp.to_rfc3339())
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
