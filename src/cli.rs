//! Command-line front end.
//!
//! Parses arguments, wires settings into an [`OrganizeEngine`] over the real
//! filesystem, persists the move journal and run state after each pass, and
//! renders results through [`OutputFormatter`].

use crate::config::Settings;
use crate::engine::{EngineOptions, OrganizeEngine, OrganizeResult};
use crate::error::AppError;
use crate::history::{self, Journal, UndoReport};
use crate::output::OutputFormatter;
use crate::schedule::{describe_trigger, resume_trigger};
use crate::state::{AppState, StateLock};
use crate::storage::{OsStorage, Storage};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;

#[derive(Debug, Parser)]
#[command(name = "autotidy", version, about = "Move files into folders by rules you define")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print debug diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Command {
    /// Run one organization pass now
    Run {
        /// Show what would be moved without touching any file
        #[arg(long)]
        dry_run: bool,

        /// Print the pass result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move the files of the last pass back where they came from
    Undo,
    /// Show when the next scheduled pass will run
    Next,
    /// Stay running and organize on the configured schedule
    Daemon,
}

/// Executes a parsed command against loaded settings.
///
/// # Examples
///
/// ```no_run
/// use autotidy::cli::{run_command, Command};
/// use autotidy::config::Settings;
///
/// let settings = Settings::load(None).unwrap();
/// run_command(Command::Next, &settings).unwrap();
/// ```
pub fn run_command(command: Command, settings: &Settings) -> Result<(), AppError> {
    match command {
        Command::Run { dry_run, json } => {
            if json {
                let result = organize_now(settings, dry_run)?;
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            if dry_run {
                OutputFormatter::dry_run_notice("No files will be moved.");
            }
            let spinner = OutputFormatter::create_spinner("Organizing watched folders...");
            let result = organize_now(settings, dry_run);
            spinner.finish_and_clear();

            let result = result?;
            OutputFormatter::pass_summary(&result);
            if result.dry_run {
                OutputFormatter::dry_run_notice("Run without --dry-run to apply these moves.");
            } else if result.moved_count > 0 {
                OutputFormatter::success("Organization complete. Use 'autotidy undo' to revert.");
            }
            Ok(())
        }
        Command::Undo => {
            OutputFormatter::info("Undoing previous organization...");
            let report = undo_last(settings)?;
            OutputFormatter::undo_summary(&report);
            Ok(())
        }
        Command::Next => {
            let state_dir = settings.state_dir()?;
            let state = AppState::load(&state_dir)?;
            let now = Local::now();
            let next =
                resume_trigger(&settings.schedule, &now, state.last_run, settings.auto_organize)?;
            match next {
                Some(next) => OutputFormatter::info(&format!(
                    "Next organization: {}",
                    describe_trigger(&next, &now)
                )),
                None => OutputFormatter::warning("Automatic organization is disabled"),
            }
            OutputFormatter::state_summary(&state);
            Ok(())
        }
        Command::Daemon => run_daemon(settings),
    }
}

fn engine_for(settings: &Settings, dry_run: bool) -> Result<OrganizeEngine<OsStorage>, AppError> {
    let options = EngineOptions {
        dry_run,
        filters: settings.compile_filters()?,
    };
    Ok(OrganizeEngine::with_options(OsStorage, options))
}

/// Runs one pass over the configured watched folders.
///
/// A real pass that moved anything replaces the move journal; every real
/// pass updates the persisted run state. Real passes hold the [`StateLock`]
/// so they cannot overlap a pass or undo of another process.
pub fn organize_now(settings: &Settings, dry_run: bool) -> Result<OrganizeResult, AppError> {
    let engine = engine_for(settings, dry_run)?;
    let state_dir = settings.state_dir()?;
    organize_with(&engine, settings, &state_dir)
}

fn organize_with<S: Storage>(
    engine: &OrganizeEngine<S>,
    settings: &Settings,
    state_dir: &Path,
) -> Result<OrganizeResult, AppError> {
    let _lock = if engine.is_dry_run() {
        None
    } else {
        Some(StateLock::acquire(state_dir)?)
    };

    let result = engine.try_run(&settings.rules, &settings.watched_folders, Utc::now())?;
    if result.dry_run {
        return Ok(result);
    }

    let finished_at = Utc::now();
    if !result.moves.is_empty() {
        Journal::new(finished_at, result.moves.clone()).save(state_dir)?;
    }

    let mut state = AppState::load(state_dir)?;
    state.record(&result, finished_at);
    state.save(state_dir)?;

    Ok(result)
}

/// Reverses the last recorded pass on the real filesystem.
pub fn undo_last(settings: &Settings) -> Result<UndoReport, AppError> {
    let state_dir = settings.state_dir()?;
    let _lock = StateLock::acquire(&state_dir)?;
    Ok(history::undo(&OsStorage, &state_dir)?)
}

fn run_daemon(settings: &Settings) -> Result<(), AppError> {
    settings.schedule.validate()?;
    let state_dir = settings.state_dir()?;
    let engine = engine_for(settings, false)?;

    let events = engine.subscribe();
    thread::spawn(move || {
        for event in events {
            tracing::info!(
                moved = event.moved_count,
                errors = event.error_count,
                "pass completed"
            );
        }
    });

    // Kept in memory so a pass whose state could not be saved still moves
    // the schedule forward.
    let mut last_run = AppState::load(&state_dir)?.last_run;

    if settings.auto_organize
        && let Some(delay) = settings.schedule.startup_delay()
    {
        tracing::info!(delay_secs = delay.as_secs(), "organizing after startup delay");
        thread::sleep(delay);
        last_run = Some(scheduled_pass(&engine, settings, &state_dir));
    }

    loop {
        let now = Local::now();
        let Some(next) =
            resume_trigger(&settings.schedule, &now, last_run, settings.auto_organize)?
        else {
            OutputFormatter::warning("Automatic organization is disabled; nothing to do");
            return Ok(());
        };

        OutputFormatter::info(&format!("Next organization: {}", describe_trigger(&next, &now)));
        let wait = (next - now).to_std().unwrap_or_default();
        thread::sleep(wait);
        last_run = Some(scheduled_pass(&engine, settings, &state_dir));
    }
}

/// A pass run by the scheduler. Failures are logged, never fatal.
///
/// Returns when the attempt finished, whether or not it succeeded.
fn scheduled_pass<S: Storage>(
    engine: &OrganizeEngine<S>,
    settings: &Settings,
    state_dir: &Path,
) -> DateTime<Utc> {
    match organize_with(engine, settings, state_dir) {
        Ok(result) => {
            for err in &result.errors {
                tracing::warn!(path = %err.path, reason = %err.reason, "pass error");
            }
        }
        Err(e) => tracing::error!(error = %e, "scheduled organization failed"),
    }
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::rule::{Rule, RuleKind};
    use crate::schedule::{Interval, IntervalUnit, ScheduleConfig, ScheduleKind};
    use crate::storage::MemoryStorage;
    use std::fs;
    use tempfile::TempDir;

    fn settings_with_rule() -> Settings {
        Settings {
            watched_folders: vec![PathBuf::from("/w")],
            rules: vec![Rule::new("1", "Docs", RuleKind::Extension, "pdf", "/docs")],
            ..Settings::default()
        }
    }

    #[test]
    fn test_parse_run_with_flags() {
        let cli = Cli::try_parse_from(["autotidy", "-c", "my.toml", "run", "--dry-run"]).unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
        assert!(matches!(
            cli.command,
            Command::Run {
                dry_run: true,
                json: false
            }
        ));
    }

    #[test]
    fn test_parse_requires_subcommand() {
        assert!(Cli::try_parse_from(["autotidy"]).is_err());
    }

    #[test]
    fn test_real_pass_writes_journal_and_state() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = MemoryStorage::new();
        storage.add_file("/w/a.pdf", 1, Utc::now());
        let engine = OrganizeEngine::new(storage);

        let result = organize_with(&engine, &settings_with_rule(), temp_dir.path()).unwrap();

        assert_eq!(result.moved_count, 1);
        let journal = Journal::load(temp_dir.path()).unwrap().unwrap();
        assert_eq!(journal.moves, result.moves);
        let state = AppState::load(temp_dir.path()).unwrap();
        assert_eq!(state.organized_count, 1);
        assert!(state.last_run.is_some());
    }

    #[test]
    fn test_empty_pass_keeps_previous_journal() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = MemoryStorage::new();
        storage.add_file("/w/a.pdf", 1, Utc::now());
        let engine = OrganizeEngine::new(storage);
        let settings = settings_with_rule();

        organize_with(&engine, &settings, temp_dir.path()).unwrap();
        let second = organize_with(&engine, &settings, temp_dir.path()).unwrap();

        assert_eq!(second.moved_count, 0);
        assert_eq!(Journal::load(temp_dir.path()).unwrap().unwrap().moves.len(), 1);
    }

    #[test]
    fn test_dry_run_persists_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = MemoryStorage::new();
        storage.add_file("/w/a.pdf", 1, Utc::now());
        let options = EngineOptions {
            dry_run: true,
            ..EngineOptions::default()
        };
        let engine = OrganizeEngine::with_options(storage, options);

        let result = organize_with(&engine, &settings_with_rule(), temp_dir.path()).unwrap();

        assert_eq!(result.moved_count, 1);
        assert!(Journal::load(temp_dir.path()).unwrap().is_none());
        assert_eq!(AppState::load(temp_dir.path()).unwrap(), AppState::default());
    }

    #[test]
    fn test_real_pass_is_rejected_while_state_is_locked() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = MemoryStorage::new();
        storage.add_file("/w/a.pdf", 1, Utc::now());
        let engine = OrganizeEngine::new(storage);

        let held = StateLock::acquire(temp_dir.path()).unwrap();
        let result = organize_with(&engine, &settings_with_rule(), temp_dir.path());

        assert!(matches!(
            result,
            Err(AppError::Engine(EngineError::PassInProgress))
        ));
        assert!(engine.storage().is_file("/w/a.pdf"));

        drop(held);
        let result = organize_with(&engine, &settings_with_rule(), temp_dir.path()).unwrap();
        assert_eq!(result.moved_count, 1);
    }

    #[test]
    fn test_dry_run_ignores_the_state_lock() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = MemoryStorage::new();
        storage.add_file("/w/a.pdf", 1, Utc::now());
        let options = EngineOptions {
            dry_run: true,
            ..EngineOptions::default()
        };
        let engine = OrganizeEngine::with_options(storage, options);

        let _held = StateLock::acquire(temp_dir.path()).unwrap();
        let result = organize_with(&engine, &settings_with_rule(), temp_dir.path()).unwrap();

        assert_eq!(result.moved_count, 1);
    }

    #[test]
    fn test_undo_is_rejected_while_a_pass_holds_the_lock() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let settings = Settings {
            state_dir: Some(temp_dir.path().to_path_buf()),
            ..settings_with_rule()
        };

        let _held = StateLock::acquire(temp_dir.path()).unwrap();
        let result = undo_last(&settings);

        assert!(matches!(
            result,
            Err(AppError::Engine(EngineError::PassInProgress))
        ));
    }

    #[test]
    fn test_failed_scheduled_pass_still_advances_the_schedule() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        // a regular file where the state directory should be
        let state_dir = temp_dir.path().join("state");
        fs::write(&state_dir, "").unwrap();
        let storage = MemoryStorage::new();
        storage.add_file("/w/a.pdf", 1, Utc::now());
        let engine = OrganizeEngine::new(storage);
        let schedule = ScheduleConfig {
            kind: ScheduleKind::Custom,
            interval: Interval {
                value: 2,
                unit: IntervalUnit::Hours,
            },
            ..ScheduleConfig::default()
        };

        let started = Utc::now();
        let finished = scheduled_pass(&engine, &settings_with_rule(), &state_dir);

        assert!(finished >= started);
        let now = Utc::now();
        let next = resume_trigger(&schedule, &now, Some(finished), true)
            .unwrap()
            .unwrap();
        assert!(next > now);
    }
}
