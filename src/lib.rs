//! autotidy - rule-based file organization
//!
//! Watches a set of folders and moves files into destination folders
//! according to an ordered list of user rules (by extension, name, age or
//! size). Passes run on demand or on a daily, weekly or custom schedule,
//! can be previewed with a dry run, and can be undone from a move journal.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod output;
pub mod resolver;
pub mod rule;
pub mod schedule;
pub mod state;
pub mod storage;
pub mod walker;

pub use config::{CompiledFilters, FilterRules, Settings};
pub use engine::{CancelToken, EngineOptions, Move, OrganizeEngine, OrganizeResult, PassCompleted};
pub use error::{AppError, PassError, PassErrorKind};
pub use history::{Journal, UndoReport};
pub use rule::{Rule, RuleKind};
pub use schedule::{ScheduleConfig, ScheduleKind};
pub use state::AppState;
pub use storage::{MemoryStorage, OsStorage, Storage};
pub use walker::FileRecord;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise only warnings are shown, or debug
/// output for this crate when `verbose` is true.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "autotidy=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
