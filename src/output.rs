//! Output formatting and styling.
//!
//! All terminal output of the command-line front end goes through
//! [`OutputFormatter`]; diagnostics go through `tracing` instead.

use crate::engine::OrganizeResult;
use crate::history::UndoReport;
use crate::state::AppState;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;

/// Consistent styling for everything printed to the terminal.
///
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - A spinner while a pass runs
/// - Summary tables for passes and undo
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autotidy::output::OutputFormatter;
    /// OutputFormatter::success("Organization complete");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, on stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a spinner shown while a pass is running.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autotidy::output::OutputFormatter;
    /// let spinner = OutputFormatter::create_spinner("Organizing...");
    /// spinner.finish_and_clear();
    /// ```
    pub fn create_spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }

    /// Prints the moves of a pass grouped by rule, followed by any errors.
    pub fn pass_summary(result: &OrganizeResult) {
        for entry in &result.moves {
            let verb = if result.dry_run { "Would move" } else { "Moved" };
            println!(
                " - {} {} → {}",
                verb,
                entry.from.display(),
                entry.to.display().to_string().green()
            );
        }

        let mut per_rule: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in &result.moves {
            *per_rule.entry(entry.rule_name.as_str()).or_insert(0) += 1;
        }
        Self::summary_table(&per_rule, result.moved_count);

        if !result.errors.is_empty() {
            Self::header("ERRORS");
            for err in &result.errors {
                Self::error(&format!("{}: {}", err.path, err.reason));
            }
        }
        if result.cancelled {
            Self::warning("Pass was cancelled before it finished");
        }
    }

    /// Prints a table of file counts per rule.
    pub fn summary_table(rule_counts: &BTreeMap<&str, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_rule_len = rule_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(4);

        println!("{:<width$} | {}", "Rule".bold(), "Files".bold(), width = max_rule_len);
        println!("{}", "-".repeat(max_rule_len + 10));

        for (rule, count) in rule_counts {
            println!(
                "{:<width$} | {} {}",
                rule,
                count.to_string().green(),
                plural(*count),
                width = max_rule_len
            );
        }

        println!("{}", "-".repeat(max_rule_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = max_rule_len
        );
    }

    pub fn undo_summary(report: &UndoReport) {
        Self::success(&format!(
            "Restored {} {}",
            report.restored_files,
            plural(report.restored_files)
        ));

        if !report.skipped_files.is_empty() {
            Self::warning(&format!("Skipped: {}", report.skipped_files.len()));
            for (path, reason) in &report.skipped_files {
                println!("    - {}: {}", path.display(), reason);
            }
        }

        if !report.failed_restores.is_empty() {
            Self::error(&format!("Failed: {}", report.failed_restores.len()));
            for (path, reason) in &report.failed_restores {
                eprintln!("    - {}: {}", path.display(), reason);
            }
            Self::warning("The move journal was kept; fix the issues above and run undo again.");
        }
    }

    pub fn state_summary(state: &AppState) {
        let last_run = state
            .last_run
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        Self::info(&format!(
            "{} files organized so far, last run: {}",
            state.organized_count, last_run
        ));
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}
