//! Application settings and name-based ignore rules.
//!
//! Settings are stored in TOML and discovered in this order: an explicit
//! path, `.autosortrc.toml` in the current directory, `config.toml` in the
//! platform configuration directory, then built-in defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [paths]
//! source = "~/Downloads"
//! destination_root = "~/Desktop"
//! categories_file = "~/.config/autosort/file_types.json"
//!
//! [paths.destinations]
//! Programs = "~/Installers"
//!
//! [sorting]
//! ambiguous_category = "Media"
//! secondary_folder = "Memes"
//! ask_secondary = true
//! stable_for_ms = 1000
//! poll_interval_ms = 1000
//!
//! [watch]
//! debounce_ms = 1000
//! recursive = true
//!
//! [filters]
//! enable_hidden_files = true
//!
//! [filters.exclude]
//! filenames = ["desktop.ini", "Thumbs.db"]
//! patterns = ["*.torrent"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use directories::{ProjectDirs, UserDirs};
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the settings file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = ".autosortrc.toml";

/// Name of the category document inside the configuration directory.
pub const CATEGORIES_FILE: &str = "file_types.json";

/// Errors that can occur during configuration loading.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML/JSON syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
    /// A default folder was needed but the home directory is unknown.
    #[error("Could not determine the {0} folder; set it in the configuration")]
    NoDefaultFolder(&'static str),
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub sorting: SortingSettings,
    pub watch: WatchSettings,
    pub filters: FilterRules,
    pub logging: LoggingSettings,
}

/// Where files come from and where they go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Watched inbox directory. Defaults to the user's Downloads folder.
    pub source: Option<PathBuf>,
    /// Parent of the category folders. Defaults to the user's Desktop.
    pub destination_root: Option<PathBuf>,
    /// JSON category document.
    pub categories_file: Option<PathBuf>,
    /// Per-category folder overrides.
    pub destinations: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortingSettings {
    /// Category with a secondary folder and a yes/no prompt.
    pub ambiguous_category: String,
    /// Secondary folder name, nested inside the ambiguous category's folder.
    pub secondary_folder: String,
    /// Whether single-file moves may ask about the secondary folder.
    pub ask_secondary: bool,
    /// How long a file's size must stay unchanged before it is moved.
    pub stable_for_ms: u64,
    pub poll_interval_ms: u64,
    /// Give up on a still-growing file after this long. Unset waits forever.
    pub max_wait_ms: Option<u64>,
    /// Seconds before an unanswered prompt falls back to the primary folder.
    pub prompt_timeout_secs: u64,
}

impl Default for SortingSettings {
    fn default() -> Self {
        Self {
            ambiguous_category: "Media".to_string(),
            secondary_folder: "Memes".to_string(),
            ask_secondary: true,
            stable_for_ms: 1_000,
            poll_interval_ms: 1_000,
            max_wait_ms: None,
            prompt_timeout_secs: 120,
        }
    }
}

impl SortingSettings {
    pub fn stable_for(&self) -> Duration {
        Duration::from_millis(self.stable_for_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Delay before acting on a change notification.
    pub debounce_ms: u64,
    /// Watch subdirectories of the source too.
    pub recursive: bool,
    /// Run a batch sweep every time watching starts.
    pub sweep_on_start: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 1_000,
            recursive: true,
            sweep_on_start: true,
        }
    }
}

impl WatchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Append logs to this file in addition to stderr.
    pub file: Option<PathBuf>,
}

/// Fully resolved folder locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub source: PathBuf,
    pub destination_root: PathBuf,
    pub categories_file: PathBuf,
    pub destinations: BTreeMap<String, PathBuf>,
}

impl Settings {
    /// Load settings from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.autosortrc.toml` in the current directory
    /// 3. Look for `config.toml` in the platform configuration directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but
    /// cannot be read, or if any discovered file is malformed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(dir) = config_dir() {
            let user_config = dir.join("config.toml");
            if user_config.exists() {
                return Self::load_from_file(&user_config);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if TOML parsing fails.
    /// Returns `ConfigError::IoError` if file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Resolves every folder, filling in platform defaults and expanding `~`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NoDefaultFolder` when a folder is not configured
    /// and the platform does not report a default for it.
    pub fn resolve_paths(&self) -> Result<ResolvedPaths, ConfigError> {
        let user_dirs = UserDirs::new();

        let source = match &self.paths.source {
            Some(path) => expand_home(path),
            None => user_dirs
                .as_ref()
                .and_then(|dirs| {
                    dirs.download_dir()
                        .map(Path::to_path_buf)
                        .or_else(|| Some(dirs.home_dir().join("Downloads")))
                })
                .ok_or(ConfigError::NoDefaultFolder("Downloads"))?,
        };

        let destination_root = match &self.paths.destination_root {
            Some(path) => expand_home(path),
            None => user_dirs
                .as_ref()
                .and_then(|dirs| {
                    dirs.desktop_dir()
                        .map(Path::to_path_buf)
                        .or_else(|| Some(dirs.home_dir().join("Desktop")))
                })
                .ok_or(ConfigError::NoDefaultFolder("Desktop"))?,
        };

        let categories_file = match &self.paths.categories_file {
            Some(path) => expand_home(path),
            None => config_dir()
                .map(|dir| dir.join(CATEGORIES_FILE))
                .unwrap_or_else(|| PathBuf::from(CATEGORIES_FILE)),
        };

        let destinations = self
            .paths
            .destinations
            .iter()
            .map(|(category, path)| (category.clone(), expand_home(path)))
            .collect();

        Ok(ResolvedPaths {
            source,
            destination_root,
            categories_file,
            destinations,
        })
    }
}

/// The platform configuration directory for autosort, if known.
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "autosort").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match UserDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

/// Name-based exclusion rules applied on top of the skip list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Whether to sort hidden files (starting with "."). Defaults to true, so
    /// `.notes.pdf` is classified by its extension like any other file.
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    pub include: IncludeRules,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: true,
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

/// Rules for excluding files from sorting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "desktop.ini", "Thumbs.db").
    pub filenames: Vec<String>,

    /// Glob patterns matched against the file name (e.g., "*.torrent").
    pub patterns: Vec<String>,

    /// Regex patterns matched against the file name.
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    pub patterns: Vec<String>,
}

impl FilterRules {
    /// Compile the rules into matchers.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(self)
    }
}

/// Compiled ignore rules, ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Filters that exclude nothing.
    pub fn allow_all() -> Self {
        Self {
            enable_hidden_files: true,
            exclude_filenames: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }

    /// Check if a file name should be considered for sorting.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. Glob pattern match - if matched, exclude
    /// 5. Regex pattern match - if matched, exclude
    /// 6. Default: include
    pub fn should_include(&self, file_name: &str) -> bool {
        if self.include_patterns.iter().any(|p| p.matches(file_name)) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name) {
            return false;
        }

        if self.exclude_patterns.iter().any(|p| p.matches(file_name)) {
            return false;
        }

        !self.exclude_regexes.iter().any(|r| r.is_match(file_name))
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}
