//! Settings loading and file exclusion filters.
//!
//! Settings are stored in TOML:
//!
//! ```toml
//! auto_organize = true
//! watched_folders = ["/home/me/Downloads", "/home/me/Desktop"]
//!
//! [schedule]
//! kind = "daily"
//! hour_of_day = 20
//!
//! [[rules]]
//! id = "docs"
//! name = "Documents"
//! kind = "extension"
//! condition = "doc,docx,pdf,txt"
//! destination = "/home/me/Documents"
//!
//! [filters]
//! skip_hidden = true
//! exclude_names = [".DS_Store", "desktop.ini"]
//! exclude_patterns = ["*.part", "*.crdownload"]
//! ```

use crate::error::SettingsError;
use crate::rule::Rule;
use crate::schedule::ScheduleConfig;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const LOCAL_CONFIG: &str = ".autotidy.toml";
const APP_DIR: &str = "autotidy";

/// Everything the organizer needs from the user's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether scheduled passes run at all.
    pub auto_organize: bool,
    pub watched_folders: Vec<PathBuf>,
    /// Where the move journal and run state are kept.
    pub state_dir: Option<PathBuf>,
    pub schedule: ScheduleConfig,
    pub rules: Vec<Rule>,
    pub filters: FilterRules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_organize: true,
            watched_folders: Vec::new(),
            state_dir: None,
            schedule: ScheduleConfig::default(),
            rules: Vec::new(),
            filters: FilterRules::default(),
        }
    }
}

/// Files that no rule should ever see.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Skip files whose name starts with a dot.
    pub skip_hidden: bool,
    /// Exact file names to skip.
    pub exclude_names: Vec<String>,
    /// Glob patterns matched against the file name (case-insensitive).
    pub exclude_patterns: Vec<String>,
}

impl Settings {
    /// Loads settings, falling back through the usual locations.
    ///
    /// 1. `config_path`, if given (must exist)
    /// 2. `.autotidy.toml` in the current directory
    /// 3. `autotidy/config.toml` in the platform config directory
    /// 4. built-in defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(APP_DIR).join("config.toml");
            if user_config.exists() {
                return Self::load_from_file(&user_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|e| SettingsError::Invalid(e.to_string()))
    }

    /// The directory holding the move journal and run state.
    pub fn state_dir(&self) -> Result<PathBuf, SettingsError> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(SettingsError::NoStateDir),
        }
    }

    /// Compiles the exclusion filters.
    pub fn compile_filters(&self) -> Result<CompiledFilters, SettingsError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Exclusion filters ready for matching.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    skip_hidden: bool,
    exclude_names: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, SettingsError> {
        let exclude_patterns = rules
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| SettingsError::InvalidGlobPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            skip_hidden: rules.skip_hidden,
            exclude_names: rules.exclude_names.iter().cloned().collect(),
            exclude_patterns,
        })
    }

    /// Returns true if the file may be considered by rules.
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.skip_hidden && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_names.contains(file_name.as_ref()) {
            return false;
        }

        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        !self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_with(&file_name, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleKind;
    use crate::schedule::{IntervalUnit, ScheduleKind};

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert!(settings.auto_organize);
        assert!(settings.rules.is_empty());
        assert_eq!(settings.schedule.kind, ScheduleKind::Daily);
        assert_eq!(settings.schedule.hour_of_day, 20);
    }

    #[test]
    fn test_parse_full_settings() {
        let settings = Settings::from_toml(
            r#"
auto_organize = false
watched_folders = ["/home/me/Downloads"]
state_dir = "/tmp/autotidy-state"

[schedule]
run_on_startup = true
kind = "custom"
interval = { value = 15, unit = "minutes" }

[[rules]]
id = "1"
name = "Documents"
kind = "extension"
condition = "doc,pdf"
destination = "/home/me/Documents"

[[rules]]
id = "2"
name = "Old downloads"
kind = "date"
condition = "older than 30 days"
destination = "/home/me/Archive"
active = false
"#,
        )
        .unwrap();

        assert!(!settings.auto_organize);
        assert_eq!(settings.watched_folders, vec![PathBuf::from("/home/me/Downloads")]);
        assert_eq!(settings.state_dir().unwrap(), PathBuf::from("/tmp/autotidy-state"));
        assert_eq!(settings.schedule.kind, ScheduleKind::Custom);
        assert_eq!(settings.schedule.interval.value, 15);
        assert_eq!(settings.schedule.interval.unit, IntervalUnit::Minutes);
        assert!(settings.schedule.run_on_startup);
        assert_eq!(settings.rules.len(), 2);
        assert_eq!(settings.rules[0].kind, RuleKind::Extension);
        assert!(settings.rules[0].active);
        assert!(!settings.rules[1].active);
    }

    #[test]
    fn test_unknown_rule_kind_still_loads() {
        let settings = Settings::from_toml(
            r#"
[[rules]]
id = "9"
name = "Mystery"
kind = "colour"
condition = "red"
destination = "/dest"
"#,
        )
        .unwrap();

        assert_eq!(
            settings.rules[0].kind,
            RuleKind::Unknown("colour".to_string())
        );
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let result = Settings::from_toml("watched_folders = 3");
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/non/existent/autotidy.toml")));
        assert!(matches!(result, Err(SettingsError::NotFound(_))));
    }

    #[test]
    fn test_filters_include_everything_by_default() {
        let filters = Settings::default().compile_filters().unwrap();

        assert!(filters.should_include(Path::new("/w/.hidden")));
        assert!(filters.should_include(Path::new("/w/photo.png")));
    }

    #[test]
    fn test_filters_exclude_hidden_names_and_patterns() {
        let filters = CompiledFilters::new(&FilterRules {
            skip_hidden: true,
            exclude_names: vec!["Thumbs.db".to_string()],
            exclude_patterns: vec!["*.part".to_string()],
        })
        .unwrap();

        assert!(!filters.should_include(Path::new("/w/.DS_Store")));
        assert!(!filters.should_include(Path::new("/w/Thumbs.db")));
        assert!(!filters.should_include(Path::new("/w/movie.mp4.PART")));
        assert!(filters.should_include(Path::new("/w/movie.mp4")));
    }

    #[test]
    fn test_invalid_glob_pattern_returns_error() {
        let result = CompiledFilters::new(&FilterRules {
            exclude_patterns: vec!["[invalid".to_string()],
            ..Default::default()
        });

        assert!(matches!(
            result,
            Err(SettingsError::InvalidGlobPattern { .. })
        ));
    }
}
