// crates/fieldsync-cli/src/scheduler.rs
// ============================================================================
// Module: Cron Scheduler
// Description: Drives both pipelines on their configured cron cadences.
// Purpose: Replace manual triggers with a timer loop that never overlaps runs.
// Dependencies: chrono, chrono-tz, cron, fieldsync-config, fieldsync-core
// ============================================================================

//! ## Overview
//! Each configured pipeline gets its own timer thread: sleep until the next
//! cron fire time in the configured timezone, run the pipeline, repeat. The
//! orchestrator's in-flight guard is the overlap protection; a fire that
//! lands while the previous run is still active is rejected and logged, and
//! the loop simply waits for the next fire. Run failures are logged and
//! never stop the loop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use fieldsync_config::ConfigError;
use fieldsync_config::FieldsyncConfig;
use fieldsync_core::PipelineError;
use fieldsync_core::RefreshOrchestrator;

use crate::write_stderr_line;

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Runs the configured pipelines on their cron cadences until interrupted.
///
/// # Errors
///
/// Returns [`ConfigError`] when a cron expression or timezone cannot be
/// parsed. Pipeline failures are logged, not returned.
pub(crate) fn run_scheduler(
    config: &FieldsyncConfig,
    refresh: RefreshOrchestrator,
    export: Option<RefreshOrchestrator>,
) -> Result<(), ConfigError> {
    let timezone = config.scheduler_timezone()?;
    let refresh_schedule = parse_schedule("refresh_cron", &config.schedule.refresh_cron)?;
    let export_schedule = parse_schedule("export_cron", &config.schedule.export_cron)?;
    thread::scope(|scope| {
        scope.spawn(|| drive_pipeline(&refresh, &refresh_schedule, timezone));
        if let Some(export) = &export {
            scope.spawn(|| drive_pipeline(export, &export_schedule, timezone));
        }
    });
    Ok(())
}

/// Parses one cron expression.
fn parse_schedule(field: &str, expression: &str) -> Result<Schedule, ConfigError> {
    Schedule::from_str(expression)
        .map_err(|err| ConfigError::Invalid(format!("schedule.{field} invalid: {err}")))
}

/// Timer loop for one pipeline.
fn drive_pipeline(orchestrator: &RefreshOrchestrator, schedule: &Schedule, timezone: Tz) {
    let process = orchestrator.process();
    loop {
        let now = Utc::now().with_timezone(&timezone);
        let Some(next) = schedule.after(&now).next() else {
            let _ = write_stderr_line(&format!("{process}: schedule has no future fire times"));
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        let _ = write_stderr_line(&format!("{process}: next run at {}", next.to_rfc3339()));
        thread::sleep(wait);
        match orchestrator.run() {
            Ok(outcome) => {
                let _ = write_stderr_line(&format!(
                    "{process}: scheduled run {} loaded {} rows",
                    outcome.run_id, outcome.rows_loaded
                ));
            }
            Err(PipelineError::Conflict {
                process,
            }) => {
                let _ = write_stderr_line(&format!(
                    "{process}: previous run still active, skipping this fire"
                ));
            }
            Err(err) => {
                let _ = write_stderr_line(&format!("{process}: scheduled run failed: {err}"));
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
