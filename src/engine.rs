//! The organization pass.
//!
//! A pass takes the active rules in order and, for each one, walks the
//! watched folders and moves every matching file into the rule's destination.
//! Moves happen immediately, so a file claimed by an earlier rule is gone by
//! the time later rules look. Failures are recorded in the result and never
//! stop the pass.

use crate::config::CompiledFilters;
use crate::error::{EngineError, MoveError, PassError, RuleConfigError, WalkError};
use crate::resolver;
use crate::rule::{Condition, Rule, RuleKind};
use crate::storage::Storage;
use crate::walker::{self, FileRecord};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

/// A file moved (or, in a dry run, planned to move) during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: PathBuf,
    pub to: PathBuf,
    pub rule_name: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizeResult {
    pub moved_count: usize,
    pub moves: Vec<Move>,
    pub errors: Vec<PassError>,
    /// The pass stopped early because it was cancelled.
    pub cancelled: bool,
    /// Nothing was touched on disk; `moves` is the plan.
    pub dry_run: bool,
}

/// Sent to subscribers when a pass finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassCompleted {
    pub moved_count: usize,
    pub error_count: usize,
    pub cancelled: bool,
    pub dry_run: bool,
}

/// Cooperative cancellation flag, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub dry_run: bool,
    pub filters: CompiledFilters,
}

/// Runs organization passes against a [`Storage`].
///
/// Passes on the same engine never overlap: [`run`](Self::run) waits for a
/// pass in progress, [`try_run`](Self::try_run) refuses to start.
pub struct OrganizeEngine<S> {
    storage: S,
    options: EngineOptions,
    pass_lock: Mutex<()>,
    subscribers: Mutex<Vec<Sender<PassCompleted>>>,
}

impl<S: Storage> OrganizeEngine<S> {
    pub fn new(storage: S) -> Self {
        Self::with_options(storage, EngineOptions::default())
    }

    pub fn with_options(storage: S, options: EngineOptions) -> Self {
        Self {
            storage,
            options,
            pass_lock: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// True if passes of this engine only plan moves.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Receives a [`PassCompleted`] after every subsequent pass.
    pub fn subscribe(&self) -> Receiver<PassCompleted> {
        let (sender, receiver) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Runs a pass, waiting for any pass already in progress to finish.
    pub fn run(
        &self,
        rules: &[Rule],
        watched_folders: &[PathBuf],
        now: DateTime<Utc>,
    ) -> OrganizeResult {
        self.run_with_cancel(rules, watched_folders, now, &CancelToken::new())
    }

    /// Runs a pass that stops before the next file once `cancel` is set.
    pub fn run_with_cancel(
        &self,
        rules: &[Rule],
        watched_folders: &[PathBuf],
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> OrganizeResult {
        let _guard = self
            .pass_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.execute(rules, watched_folders, now, cancel)
    }

    /// Runs a pass unless one is already in progress.
    pub fn try_run(
        &self,
        rules: &[Rule],
        watched_folders: &[PathBuf],
        now: DateTime<Utc>,
    ) -> Result<OrganizeResult, EngineError> {
        let _guard = match self.pass_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(EngineError::PassInProgress),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        Ok(self.execute(rules, watched_folders, now, &CancelToken::new()))
    }

    fn execute(
        &self,
        rules: &[Rule],
        watched_folders: &[PathBuf],
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> OrganizeResult {
        let mut pass = Pass {
            storage: &self.storage,
            options: &self.options,
            now,
            cancel,
            result: OrganizeResult {
                dry_run: self.options.dry_run,
                ..OrganizeResult::default()
            },
            claimed: HashSet::new(),
            created_dirs: HashSet::new(),
            failed_walks: HashSet::new(),
        };

        let roots = pass.watched_roots(watched_folders);
        tracing::info!(
            rules = rules.iter().filter(|r| r.active).count(),
            folders = roots.len(),
            dry_run = self.options.dry_run,
            "starting organization pass"
        );

        for rule in rules.iter().filter(|rule| rule.active) {
            if !pass.apply_rule(rule, &roots) {
                break;
            }
        }

        let result = pass.result;
        tracing::info!(
            moved = result.moved_count,
            errors = result.errors.len(),
            cancelled = result.cancelled,
            "organization pass finished"
        );
        self.notify(&result);
        result
    }

    fn notify(&self, result: &OrganizeResult) {
        let event = PassCompleted {
            moved_count: result.moved_count,
            error_count: result.errors.len(),
            cancelled: result.cancelled,
            dry_run: result.dry_run,
        };
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

/// Checks the parts of a rule the matcher cannot fail closed on.
fn validate_rule(rule: &Rule) -> Result<&Path, RuleConfigError> {
    if let RuleKind::Unknown(kind) = &rule.kind {
        return Err(RuleConfigError::UnknownKind {
            rule: rule.name.clone(),
            kind: kind.clone(),
        });
    }
    if rule.destination.as_os_str().is_empty() {
        return Err(RuleConfigError::MissingDestination {
            rule: rule.name.clone(),
        });
    }
    if !rule.destination.is_absolute() {
        return Err(RuleConfigError::RelativeDestination {
            rule: rule.name.clone(),
            destination: rule.destination.clone(),
        });
    }
    Ok(rule.destination.as_path())
}

/// Mutable bookkeeping of a single pass.
struct Pass<'a, S> {
    storage: &'a S,
    options: &'a EngineOptions,
    now: DateTime<Utc>,
    cancel: &'a CancelToken,
    result: OrganizeResult,
    /// Paths already handled this pass: destinations, and in a dry run the
    /// sources that are still physically in place.
    claimed: HashSet<PathBuf>,
    created_dirs: HashSet<PathBuf>,
    failed_walks: HashSet<PathBuf>,
}

impl<S: Storage> Pass<'_, S> {
    /// Absolute, de-duplicated roots; folders nested in another root are dropped.
    fn watched_roots(&mut self, watched_folders: &[PathBuf]) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for folder in watched_folders {
            if folder.is_absolute() {
                roots.push(folder.clone());
            } else {
                let err = RuleConfigError::RelativeWatchedFolder {
                    path: folder.clone(),
                };
                tracing::warn!(error = %err, "skipping watched folder");
                self.result
                    .errors
                    .push(PassError::config(folder.display().to_string(), &err));
            }
        }

        roots.sort();
        roots.dedup();
        let mut kept: Vec<PathBuf> = Vec::new();
        for root in roots {
            if !kept.iter().any(|outer| root.starts_with(outer)) {
                kept.push(root);
            }
        }
        kept
    }

    /// Applies one rule. Returns false if the pass was cancelled.
    fn apply_rule(&mut self, rule: &Rule, roots: &[PathBuf]) -> bool {
        let destination = match validate_rule(rule) {
            Ok(destination) => destination,
            Err(err) => {
                tracing::warn!(rule = %rule.name, error = %err, "skipping rule");
                self.result.errors.push(PassError::config(rule.id.clone(), &err));
                return true;
            }
        };

        let Some(condition) = Condition::parse(&rule.kind, &rule.condition) else {
            tracing::warn!(
                rule = %rule.name,
                condition = %rule.condition,
                "condition not understood, rule matches nothing"
            );
            return true;
        };

        let storage = self.storage;
        for item in walker::walk(storage, roots) {
            if self.cancel.is_cancelled() {
                tracing::info!("organization pass cancelled");
                self.result.cancelled = true;
                return false;
            }

            match item {
                Ok(file) => self.consider(rule, &condition, destination, file),
                Err(err) => self.record_walk_error(&err),
            }
        }
        true
    }

    fn consider(
        &mut self,
        rule: &Rule,
        condition: &Condition,
        destination: &Path,
        file: FileRecord,
    ) {
        if self.claimed.contains(&file.path)
            || !self.options.filters.should_include(&file.path)
            || !condition.evaluate(&file, self.now)
        {
            return;
        }
        if file.path.parent() == Some(destination) {
            tracing::debug!(file = %file.path.display(), "already in destination");
            self.claimed.insert(file.path);
            return;
        }

        match self.move_file(&file.path, destination) {
            Ok(to) => {
                tracing::info!(
                    rule = %rule.name,
                    from = %file.path.display(),
                    to = %to.display(),
                    "moved file"
                );
                if self.options.dry_run {
                    self.claimed.insert(file.path.clone());
                }
                self.claimed.insert(to.clone());
                self.result.moved_count += 1;
                self.result.moves.push(Move {
                    from: file.path,
                    to,
                    rule_name: rule.name.clone(),
                });
            }
            Err(err) => {
                tracing::warn!(file = %file.path.display(), error = %err, "could not move file");
                self.result.errors.push(PassError::moving(&file.path, &err));
            }
        }
    }

    /// Moves `from` into `destination`, returning the final path.
    fn move_file(&mut self, from: &Path, destination: &Path) -> Result<PathBuf, MoveError> {
        let file_name = from.file_name().ok_or_else(|| MoveError::NoFileName {
            path: from.to_path_buf(),
        })?;

        if !self.options.dry_run && !self.created_dirs.contains(destination) {
            self.storage
                .create_dir_all(destination)
                .map_err(|source| MoveError::CreateDirectory {
                    path: destination.to_path_buf(),
                    source,
                })?;
            self.created_dirs.insert(destination.to_path_buf());
        }

        let claimed = &self.claimed;
        let storage = self.storage;
        let dry_run = self.options.dry_run;
        let to = resolver::resolve(destination, file_name, |candidate| {
            storage.exists(candidate) || (dry_run && claimed.contains(candidate))
        });

        if !dry_run {
            self.storage
                .rename(from, &to)
                .map_err(|source| MoveError::Rename {
                    from: from.to_path_buf(),
                    to: to.clone(),
                    source,
                })?;
        }
        Ok(to)
    }

    fn record_walk_error(&mut self, err: &WalkError) {
        if self.failed_walks.insert(err.path().clone()) {
            tracing::warn!(error = %err, "skipping unreadable path");
            self.result.errors.push(PassError::from(err));
        }
    }
}
