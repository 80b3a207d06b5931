//! Counters kept between runs, and the lock that serializes passes across
//! processes sharing a state directory.

use crate::engine::OrganizeResult;
use crate::error::{AppError, EngineError, HistoryError};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "autotidy.lock";

/// Exclusive hold on a state directory, released when dropped.
///
/// A real pass and an undo both take it, so a manual run cannot overlap a
/// pass of a running daemon.
#[derive(Debug)]
pub struct StateLock {
    _file: File,
}

impl StateLock {
    /// Takes the lock without waiting.
    ///
    /// Returns [`EngineError::PassInProgress`] when another holder has it.
    pub fn acquire(state_dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(state_dir).map_err(|source| HistoryError::Write {
            path: state_dir.to_path_buf(),
            source,
        })?;

        let path = state_dir.join(LOCK_FILE);
        let file = File::options()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| HistoryError::Write {
                path: path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(EngineError::PassInProgress.into())
            }
            Err(source) => Err(HistoryError::Write { path, source }.into()),
        }
    }
}

/// Lifetime statistics and the time of the last real pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub organized_count: u64,
    pub last_run: Option<DateTime<Utc>>,
}

impl AppState {
    fn file_path(state_dir: &Path) -> PathBuf {
        state_dir.join(STATE_FILE)
    }

    /// Loads the state, starting fresh if none was saved yet.
    pub fn load(state_dir: &Path) -> Result<Self, HistoryError> {
        let path = Self::file_path(state_dir);
        if !path.exists() {
            return Ok(Self::default());
        }

        let json = fs::read_to_string(&path).map_err(|source| HistoryError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|e| HistoryError::InvalidFormat {
            path,
            reason: e.to_string(),
        })
    }

    pub fn save(&self, state_dir: &Path) -> Result<(), HistoryError> {
        fs::create_dir_all(state_dir).map_err(|source| HistoryError::Write {
            path: state_dir.to_path_buf(),
            source,
        })?;

        let path = Self::file_path(state_dir);
        let json = serde_json::to_string_pretty(self).map_err(|e| HistoryError::InvalidFormat {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|source| HistoryError::Write { path, source })
    }

    /// Folds a finished pass into the counters. Dry runs change nothing.
    pub fn record(&mut self, result: &OrganizeResult, finished_at: DateTime<Utc>) {
        if result.dry_run {
            return;
        }
        self.organized_count += result.moved_count as u64;
        self.last_run = Some(finished_at);
    }
}
