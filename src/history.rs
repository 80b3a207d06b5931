//! Move journal and undo.
//!
//! After a real pass the moves are written to `last_run.json` in the state
//! directory. Undo walks that journal backwards and puts every file back where
//! it came from. Only one journal is kept; a new pass replaces it.

use crate::engine::Move;
use crate::error::HistoryError;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const JOURNAL_FILE: &str = "last_run.json";

/// The moves of the most recent pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub timestamp: DateTime<Utc>,
    pub moves: Vec<Move>,
}

impl Journal {
    pub fn new(timestamp: DateTime<Utc>, moves: Vec<Move>) -> Self {
        Self { timestamp, moves }
    }

    fn file_path(state_dir: &Path) -> PathBuf {
        state_dir.join(JOURNAL_FILE)
    }

    /// Writes the journal, replacing any previous one.
    pub fn save(&self, state_dir: &Path) -> Result<(), HistoryError> {
        let path = Self::file_path(state_dir);
        fs::create_dir_all(state_dir).map_err(|source| HistoryError::Write {
            path: state_dir.to_path_buf(),
            source,
        })?;

        let json = serde_json::to_string_pretty(self).map_err(|e| HistoryError::InvalidFormat {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|source| HistoryError::Write { path, source })
    }

    /// Loads the journal, or `None` if no pass has been recorded.
    pub fn load(state_dir: &Path) -> Result<Option<Self>, HistoryError> {
        let path = Self::file_path(state_dir);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path).map_err(|source| HistoryError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| HistoryError::InvalidFormat {
                path,
                reason: e.to_string(),
            })
    }

    pub fn delete(state_dir: &Path) -> Result<(), HistoryError> {
        let path = Self::file_path(state_dir);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| HistoryError::Write { path, source })?;
        }
        Ok(())
    }
}

/// What an undo managed to put back.
#[derive(Debug, Default)]
pub struct UndoReport {
    pub restored_files: usize,
    /// Files that were found but could not be moved back.
    pub failed_restores: Vec<(PathBuf, String)>,
    /// Files no longer at the location they were moved to.
    pub skipped_files: Vec<(PathBuf, String)>,
}

impl UndoReport {
    /// True when every journalled move was reversed.
    pub fn is_complete_success(&self) -> bool {
        self.failed_restores.is_empty() && self.skipped_files.is_empty()
    }
}

/// Reverses the most recent pass recorded in `state_dir`.
///
/// Moves are undone newest first. A file that is gone from its destination
/// is skipped; a file now occupying the original path is renamed aside to
/// `<name>.bak.<timestamp>` first. The journal is deleted only when every
/// move was reversed, so a partial undo can be retried.
///
/// # Examples
///
/// ```no_run
/// use autotidy::history::undo;
/// use autotidy::storage::OsStorage;
/// use std::path::Path;
///
/// match undo(&OsStorage, Path::new("/home/me/.local/share/autotidy")) {
///     Ok(report) => println!("Restored {} files", report.restored_files),
///     Err(e) => eprintln!("Undo failed: {}", e),
/// }
/// ```
pub fn undo<S: Storage + ?Sized>(
    storage: &S,
    state_dir: &Path,
) -> Result<UndoReport, HistoryError> {
    let journal = Journal::load(state_dir)?.ok_or(HistoryError::NothingToUndo)?;

    let mut report = UndoReport::default();
    for entry in journal.moves.iter().rev() {
        if !storage.exists(&entry.to) {
            report.skipped_files.push((
                entry.to.clone(),
                "File not found at expected location".to_string(),
            ));
            continue;
        }

        match restore_file(storage, entry) {
            Ok(()) => {
                tracing::debug!(
                    from = %entry.to.display(),
                    to = %entry.from.display(),
                    "restored file"
                );
                report.restored_files += 1;
            }
            Err(reason) => report.failed_restores.push((entry.to.clone(), reason)),
        }
    }

    if report.is_complete_success()
        && let Err(e) = Journal::delete(state_dir)
    {
        tracing::warn!(error = %e, "could not delete move journal");
    }

    Ok(report)
}

fn restore_file<S: Storage + ?Sized>(storage: &S, entry: &Move) -> Result<(), String> {
    if storage.exists(&entry.from) {
        let backup_path = backup_path(&entry.from);
        storage
            .rename(&entry.from, &backup_path)
            .map_err(|e| format!("Could not backup conflicting file: {}", e))?;
        tracing::info!(backup = %backup_path.display(), "moved conflicting file aside");
    }

    if let Some(parent) = entry.from.parent() {
        storage
            .create_dir_all(parent)
            .map_err(|e| format!("Failed to recreate {}: {}", parent.display(), e))?;
    }

    storage
        .rename(&entry.to, &entry.from)
        .map_err(|e| format!("Failed to restore file: {}", e))
}

/// `file.txt` becomes `file.txt.bak.20251109-143052`.
fn backup_path(original_path: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let file_name = original_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());

    original_path.with_file_name(format!("{}.bak.{}", file_name, timestamp))
}
