//! Error types for autotidy.
//!
//! Errors that happen inside an organization pass never escape the pass:
//! they are flattened into [`PassError`] entries of the pass result so the
//! caller can render them. Everything outside a pass (settings, journal,
//! state, schedule validation) returns these enums through `Result`.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// A directory could not be traversed.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Watched folder not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Watched folder is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read metadata for {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WalkError {
    /// The path that could not be traversed.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::RootNotFound { path }
            | Self::NotADirectory { path }
            | Self::ReadDirectory { path, .. }
            | Self::Metadata { path, .. } => path,
        }
    }
}

/// A matched file could not be moved to its destination.
#[derive(Error, Debug)]
pub enum MoveError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File has no name component: {path}")]
    NoFileName { path: PathBuf },
}

/// A rule or watched folder is structurally invalid and is skipped for the pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleConfigError {
    #[error("Rule '{rule}' has unknown kind '{kind}'")]
    UnknownKind { rule: String, kind: String },

    #[error("Rule '{rule}' has no destination folder")]
    MissingDestination { rule: String },

    #[error("Rule '{rule}' destination must be an absolute path: {destination}")]
    RelativeDestination { rule: String, destination: PathBuf },

    #[error("Watched folder must be an absolute path: {path}")]
    RelativeWatchedFolder { path: PathBuf },
}

/// The schedule configuration cannot produce a trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Hour of day must be between 0 and 23, got {0}")]
    InvalidHour(u32),

    #[error("Day of week must be between 0 (Sunday) and 6, got {0}")]
    InvalidDay(u32),

    #[error("Custom interval must be a positive number")]
    ZeroInterval,

    #[error("Custom interval is too large to schedule")]
    IntervalOverflow,
}

/// Errors raised while loading settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },

    #[error("No state directory available; set `state_dir` in the configuration")]
    NoStateDir,
}

/// Errors raised while reading or writing the move journal and app state.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file format in {path}: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("No previous organization found to undo")]
    NothingToUndo,
}

/// Errors returned by the engine itself (never by a file inside a pass).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("An organization pass is already running")]
    PassInProgress,
}

/// Top-level error for the command-line front end.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to encode result: {0}")]
    Json(#[from] serde_json::Error),
}

/// Category of a per-file or per-rule failure recorded during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassErrorKind {
    Walk,
    Move,
    Config,
}

/// A failure recorded in a pass result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassError {
    pub kind: PassErrorKind,
    /// Offending path, or rule identifier for configuration errors.
    pub path: String,
    pub reason: String,
}

impl From<&WalkError> for PassError {
    fn from(err: &WalkError) -> Self {
        Self {
            kind: PassErrorKind::Walk,
            path: err.path().display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl PassError {
    pub(crate) fn moving(path: &std::path::Path, err: &MoveError) -> Self {
        Self {
            kind: PassErrorKind::Move,
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn config(subject: impl Into<String>, err: &RuleConfigError) -> Self {
        Self {
            kind: PassErrorKind::Config,
            path: subject.into(),
            reason: err.to_string(),
        }
    }
}
