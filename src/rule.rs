//! Organization rules and the predicate that matches files against them.
//!
//! A rule's `condition` is free text typed by the user. Its grammar depends on
//! the rule kind:
//!
//! - `extension`: `"doc, docx,PDF"` (comma separated, case-insensitive)
//! - `name`: `"*report*"` (anchored glob where `*` is the only wildcard) or
//!   `"invoice"` (case-insensitive substring)
//! - `date`: `"older than 30 days"` / `"newer than 7 days"`
//! - `size`: `"larger than 100MB"` / `"smaller than 1.5 GB"` (binary units)
//!
//! Conditions that do not fit the grammar never match. Matching is pure: the
//! evaluation instant is passed in and nothing touches the filesystem.
//!
//! # Examples
//!
//! ```
//! use autotidy::rule::{Rule, RuleKind};
//! use autotidy::walker::FileRecord;
//! use chrono::Utc;
//!
//! let rule = Rule::new("1", "Documents", RuleKind::Extension, "doc,pdf", "/home/me/Documents");
//! let now = Utc::now();
//! let file = FileRecord::new("/home/me/Downloads/Report.PDF".into(), 2048, now);
//!
//! assert!(autotidy::rule::matches(&file, &rule, now));
//! ```

use crate::walker::FileRecord;
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

static DATE_CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(older|newer)\s+than\s+(\d+)").expect("valid date condition regex")
});

static SIZE_CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(larger|smaller)\s+than\s+(\d+(?:\.\d+)?)\s*(kb|mb|gb)")
        .expect("valid size condition regex")
});

/// The kind of predicate a rule applies.
///
/// Kinds are stored as plain strings so that a settings file written by a
/// newer version still loads; unrecognised kinds surface as
/// [`RuleKind::Unknown`] and the rule is rejected when a pass starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    Extension,
    Name,
    Date,
    Size,
    Unknown(String),
}

impl From<String> for RuleKind {
    fn from(kind: String) -> Self {
        match kind.trim().to_lowercase().as_str() {
            "extension" => Self::Extension,
            "name" => Self::Name,
            "date" => Self::Date,
            "size" => Self::Size,
            _ => Self::Unknown(kind),
        }
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extension => f.write_str("extension"),
            Self::Name => f.write_str("name"),
            Self::Date => f.write_str("date"),
            Self::Size => f.write_str("size"),
            Self::Unknown(kind) => f.write_str(kind),
        }
    }
}

fn default_active() -> bool {
    true
}

/// A user-defined pairing of a predicate and a destination folder.
///
/// The engine only ever reads rules; edits happen in the settings layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub kind: RuleKind,
    pub condition: String,
    pub destination: PathBuf,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Rule {
    /// Creates an active rule.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: RuleKind,
        condition: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            condition: condition.into(),
            destination: destination.into(),
            active: true,
        }
    }

    /// Returns a copy of this rule with the given active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// A rule condition parsed into an efficient predicate.
///
/// Parsing once per pass avoids recompiling name patterns for every file.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Lower-cased extensions without the leading dot.
    Extensions(HashSet<String>),
    /// Lower-cased substring of the file name.
    NameContains(String),
    /// Anchored, case-insensitive name pattern.
    NamePattern(Regex),
    OlderThan(TimeDelta),
    NewerThan(TimeDelta),
    /// Threshold in bytes.
    LargerThan(f64),
    /// Threshold in bytes.
    SmallerThan(f64),
}

impl Condition {
    /// Parses the condition text of a rule.
    ///
    /// Returns `None` for malformed conditions, blank conditions and unknown
    /// kinds; callers treat that as "matches nothing". Name patterns keep
    /// their surrounding whitespace, since it can be part of a file name.
    pub fn parse(kind: &RuleKind, condition: &str) -> Option<Self> {
        let trimmed = condition.trim();
        if trimmed.is_empty() {
            return None;
        }

        match kind {
            RuleKind::Extension => Self::parse_extensions(trimmed),
            RuleKind::Name => Self::parse_name(condition),
            RuleKind::Date => Self::parse_date(trimmed),
            RuleKind::Size => Self::parse_size(trimmed),
            RuleKind::Unknown(_) => None,
        }
    }

    fn parse_extensions(condition: &str) -> Option<Self> {
        let extensions: HashSet<String> = condition
            .split(',')
            .map(|ext| ext.trim().to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        if extensions.is_empty() {
            None
        } else {
            Some(Self::Extensions(extensions))
        }
    }

    fn parse_name(condition: &str) -> Option<Self> {
        if !condition.contains('*') {
            return Some(Self::NameContains(condition.to_lowercase()));
        }

        let body = condition
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("(?is)^{}$", body))
            .ok()
            .map(Self::NamePattern)
    }

    fn parse_date(condition: &str) -> Option<Self> {
        let captures = DATE_CONDITION.captures(condition)?;
        let days: i64 = captures[2].parse().ok()?;
        let age = TimeDelta::try_days(days)?;

        if captures[1].eq_ignore_ascii_case("older") {
            Some(Self::OlderThan(age))
        } else {
            Some(Self::NewerThan(age))
        }
    }

    fn parse_size(condition: &str) -> Option<Self> {
        let captures = SIZE_CONDITION.captures(condition)?;
        let amount: f64 = captures[2].parse().ok()?;
        let multiplier = match captures[3].to_ascii_uppercase().as_str() {
            "KB" => 1024.0,
            "MB" => 1024.0 * 1024.0,
            "GB" => 1024.0 * 1024.0 * 1024.0,
            _ => return None,
        };
        let threshold = amount * multiplier;

        if captures[1].eq_ignore_ascii_case("larger") {
            Some(Self::LargerThan(threshold))
        } else {
            Some(Self::SmallerThan(threshold))
        }
    }

    /// Evaluates this condition against a file at the instant `now`.
    pub fn evaluate(&self, file: &FileRecord, now: DateTime<Utc>) -> bool {
        match self {
            Self::Extensions(extensions) => file
                .extension
                .as_ref()
                .is_some_and(|ext| extensions.contains(ext)),
            Self::NameContains(needle) => file.name.to_lowercase().contains(needle.as_str()),
            Self::NamePattern(pattern) => pattern.is_match(&file.name),
            Self::OlderThan(age) => now
                .checked_sub_signed(*age)
                .is_some_and(|threshold| file.modified < threshold),
            Self::NewerThan(age) => now
                .checked_sub_signed(*age)
                .is_some_and(|threshold| file.modified > threshold),
            Self::LargerThan(threshold) => file.size as f64 > *threshold,
            Self::SmallerThan(threshold) => (file.size as f64) < *threshold,
        }
    }
}

/// Returns true if `file` satisfies `rule` at the instant `now`.
///
/// Malformed conditions never match.
pub fn matches(file: &FileRecord, rule: &Rule, now: DateTime<Utc>) -> bool {
    Condition::parse(&rule.kind, &rule.condition).is_some_and(|c| c.evaluate(file, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MB: u64 = 1024 * 1024;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn file(name: &str) -> FileRecord {
        FileRecord::new(PathBuf::from("/watched").join(name), 1024, now())
    }

    fn sized(size: u64) -> FileRecord {
        FileRecord::new(PathBuf::from("/watched/blob.bin"), size, now())
    }

    fn aged(modified: DateTime<Utc>) -> FileRecord {
        FileRecord::new(PathBuf::from("/watched/old.txt"), 10, modified)
    }

    fn rule(kind: RuleKind, condition: &str) -> Rule {
        Rule::new("r", "Test", kind, condition, "/dest")
    }

    #[test]
    fn test_rule_kind_from_string() {
        assert_eq!(RuleKind::from("extension".to_string()), RuleKind::Extension);
        assert_eq!(RuleKind::from("Size".to_string()), RuleKind::Size);
        assert_eq!(
            RuleKind::from("colour".to_string()),
            RuleKind::Unknown("colour".to_string())
        );
        assert_eq!(String::from(RuleKind::Date), "date");
    }

    #[test]
    fn test_extension_membership() {
        let r = rule(RuleKind::Extension, "doc, DOCX ,pdf");

        assert!(matches(&file("notes.doc"), &r, now()));
        assert!(matches(&file("notes.docx"), &r, now()));
        assert!(matches(&file("Report.PDF"), &r, now()));
        assert!(!matches(&file("photo.png"), &r, now()));
        assert!(!matches(&file("pdf"), &r, now()));
    }

    #[test]
    fn test_extension_only_last_segment_counts() {
        let r = rule(RuleKind::Extension, "gz");
        assert!(matches(&file("archive.tar.gz"), &r, now()));

        let r = rule(RuleKind::Extension, "tar");
        assert!(!matches(&file("archive.tar.gz"), &r, now()));
    }

    #[test]
    fn test_extension_file_without_extension_never_matches() {
        let r = rule(RuleKind::Extension, "pdf,,");

        assert!(!matches(&file("Makefile"), &r, now()));
        assert!(!matches(&file(".bashrc"), &r, now()));
        assert!(!matches(&file("trailing."), &r, now()));
    }

    #[test]
    fn test_name_wildcard_is_anchored() {
        let r = rule(RuleKind::Name, "report*");

        assert!(matches(&file("Report-Q1.docx"), &r, now()));
        assert!(!matches(&file("Final report.pdf"), &r, now()));
    }

    #[test]
    fn test_name_wildcard_both_sides() {
        let r = rule(RuleKind::Name, "*report*");

        assert!(matches(&file("Final REPORT.pdf"), &r, now()));
        assert!(matches(&file("report"), &r, now()));
        assert!(!matches(&file("summary.pdf"), &r, now()));
    }

    #[test]
    fn test_name_wildcard_treats_other_characters_literally() {
        let r = rule(RuleKind::Name, "*(draft).txt");

        assert!(matches(&file("essay (draft).txt"), &r, now()));
        assert!(!matches(&file("essay draft.txt"), &r, now()));

        let r = rule(RuleKind::Name, "a.c*");
        assert!(!matches(&file("abc.txt"), &r, now()));
    }

    #[test]
    fn test_name_without_wildcard_is_substring() {
        let r = rule(RuleKind::Name, "Screenshot");

        assert!(matches(&file("screenshot_1.png"), &r, now()));
        assert!(matches(&file("My SCREENSHOT.png"), &r, now()));
        assert!(!matches(&file("photo.png"), &r, now()));
    }

    #[test]
    fn test_name_keeps_surrounding_spaces() {
        let r = rule(RuleKind::Name, " copy");

        assert!(matches(&file("notes copy.txt"), &r, now()));
        assert!(!matches(&file("copy of notes.txt"), &r, now()));

        assert!(!matches(&file("anything.txt"), &rule(RuleKind::Name, "   "), now()));
    }

    #[test]
    fn test_date_older_than_boundary() {
        let r = rule(RuleKind::Date, "older than 30 days");
        let just_past = now() - TimeDelta::days(30) - TimeDelta::seconds(1);
        let exactly = now() - TimeDelta::days(30);

        assert!(matches(&aged(just_past), &r, now()));
        assert!(!matches(&aged(exactly), &r, now()));
        assert!(!matches(&aged(now() - TimeDelta::days(29)), &r, now()));
    }

    #[test]
    fn test_date_newer_than() {
        let r = rule(RuleKind::Date, "Newer than 7 days");

        assert!(matches(&aged(now() - TimeDelta::days(6)), &r, now()));
        assert!(!matches(&aged(now() - TimeDelta::days(7)), &r, now()));
        assert!(!matches(&aged(now() - TimeDelta::days(8)), &r, now()));
    }

    #[test]
    fn test_date_other_phrasing_never_matches() {
        let ancient = aged(now() - TimeDelta::days(4000));

        assert!(!matches(&ancient, &rule(RuleKind::Date, "last month"), now()));
        assert!(!matches(&ancient, &rule(RuleKind::Date, "older than"), now()));
        assert!(!matches(
            &ancient,
            &rule(RuleKind::Date, "older than 99999999999999999999 days"),
            now()
        ));
    }

    #[test]
    fn test_size_boundaries() {
        let exactly = sized(100 * MB);

        assert!(!matches(&exactly, &rule(RuleKind::Size, "larger than 100MB"), now()));
        assert!(matches(&exactly, &rule(RuleKind::Size, "larger than 99MB"), now()));
        assert!(!matches(&exactly, &rule(RuleKind::Size, "smaller than 100 mb"), now()));
        assert!(matches(&exactly, &rule(RuleKind::Size, "smaller than 101 MB"), now()));
    }

    #[test]
    fn test_size_units_are_binary() {
        let r = rule(RuleKind::Size, "larger than 1 KB");
        assert!(!matches(&sized(1024), &r, now()));
        assert!(matches(&sized(1025), &r, now()));

        let r = rule(RuleKind::Size, "smaller than 1.5 gb");
        assert!(matches(&sized(1024 * MB), &r, now()));
        assert!(!matches(&sized(2048 * MB), &r, now()));
    }

    #[test]
    fn test_size_other_phrasing_never_matches() {
        let huge = sized(10 * 1024 * MB);

        assert!(!matches(&huge, &rule(RuleKind::Size, "larger than 5"), now()));
        assert!(!matches(&huge, &rule(RuleKind::Size, "bigger than 5 MB"), now()));
        assert!(!matches(&huge, &rule(RuleKind::Size, "larger than 5 TB"), now()));
    }

    #[test]
    fn test_empty_and_unknown_conditions_fail_closed() {
        assert!(!matches(&file("a.txt"), &rule(RuleKind::Name, "   "), now()));
        assert!(!matches(&file("a.txt"), &rule(RuleKind::Extension, ","), now()));
        assert!(!matches(
            &file("a.txt"),
            &rule(RuleKind::Unknown("colour".into()), "red"),
            now()
        ));
    }
}
