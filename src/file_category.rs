//! Extension-based file categorization.
//!
//! This module holds the [`CategoryTable`], an ordered mapping from category
//! names (e.g. "Docs", "Media") to sets of normalized file extensions, plus the
//! set of skip extensions that mark partial or transient files.
//!
//! # Examples
//!
//! ```
//! use autosort::file_category::{CategoryTable, Classification};
//!
//! let table = CategoryTable::builtin();
//! assert!(matches!(table.classify("report.PDF"), Classification::Category(c) if c.name() == "Docs"));
//! assert_eq!(table.classify("movie.mkv.part"), Classification::Skip);
//! assert_eq!(table.classify("mystery.bin"), Classification::Unclassified);
//! ```

use crate::config::ConfigError;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration key holding the skip list.
pub const SKIP_EXTENSIONS_KEY: &str = "SkipExtensions";

/// Configuration key reserved for metadata; never treated as a category.
pub const META_KEY: &str = "_meta";

/// Extensions skipped when the configuration does not provide a list.
pub const DEFAULT_SKIP_EXTENSIONS: &[&str] =
    &[".tmp", ".crdownload", ".part", ".download", ".!ut", ".ini"];

const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Docs",
        &[
            ".pdf", ".docx", ".xlsx", ".pptx", ".txt", ".csv", ".dotx", ".doc", ".ppt", ".potx",
            ".text",
        ],
    ),
    (
        "Media",
        &[
            ".jpg", ".jpeg", ".png", ".gif", ".mp4", ".mov", ".mp3", ".wav", ".webm", ".svg",
            ".webp", ".ico", ".m4a",
        ],
    ),
    ("Archives", &[".zip", ".rar", ".tar", ".gz", ".7z"]),
    ("Programs", &[".exe", ".msi", ".dmg", ".pkg", ".sh", ".iso"]),
    (
        "Development",
        &[
            ".py", ".js", ".html", ".css", ".cpp", ".java", ".sh", ".ipynb", ".json", ".md", ".m",
            ".drawio", ".ts", ".log", ".apk", ".db", ".sqlite", ".sql",
        ],
    ),
];

/// Normalizes a raw extension string to its canonical form.
///
/// The canonical form is lowercase with exactly one leading dot. Surrounding
/// whitespace is trimmed. Returns `None` for input that carries no extension
/// at all (empty, whitespace, or a lone dot).
///
/// ```
/// use autosort::file_category::normalize_extension;
///
/// assert_eq!(normalize_extension("PDF").as_deref(), Some(".pdf"));
/// assert_eq!(normalize_extension("  .Txt ").as_deref(), Some(".txt"));
/// assert_eq!(normalize_extension(" "), None);
/// ```
pub fn normalize_extension(raw: &str) -> Option<String> {
    let ext = raw.trim().to_lowercase();
    let bare = ext.strip_prefix('.').unwrap_or(&ext);
    if bare.is_empty() {
        return None;
    }
    Some(format!(".{}", bare))
}

/// Returns the normalized extension of a file name, if it has one.
///
/// Only the final suffix counts (`archive.tar.gz` yields `.gz`), and a
/// leading dot does not start an extension (`.bashrc` has none).
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| normalize_extension(&ext.to_string_lossy()))
}

/// A named bucket of extensions that maps to one destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: String,
    extensions: BTreeSet<String>,
}

impl Category {
    /// Creates a category, normalizing and de-duplicating its extensions.
    pub fn new<I, S>(name: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            extensions: extensions
                .into_iter()
                .filter_map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        }
    }

    /// The category name as written in the configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalized extensions of this category.
    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    /// Returns true if the normalized extension belongs to this category.
    pub fn contains(&self, normalized_ext: &str) -> bool {
        self.extensions.contains(normalized_ext)
    }
}

/// Result of classifying a file name against a [`CategoryTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    /// The extension is on the skip list; the file must never be moved.
    Skip,
    /// No category lists the extension; the file stays where it is.
    Unclassified,
    /// The first category (in table order) listing the extension.
    Category(&'a Category),
}

/// An extension listed by more than one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateExtension {
    pub extension: String,
    /// The category that wins classification.
    pub winner: String,
    /// A later category that also lists the extension.
    pub shadowed: String,
}

/// Ordered category definitions plus the skip list.
///
/// Categories keep the order in which they were supplied; classification
/// returns the first match in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    categories: Vec<Category>,
    skip_extensions: BTreeSet<String>,
}

impl CategoryTable {
    /// Builds a table from categories and raw skip extensions.
    ///
    /// Categories with a name already present are merged into the earlier
    /// entry so names stay unique.
    pub fn new<I, S>(categories: Vec<Category>, skip_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut merged: Vec<Category> = Vec::with_capacity(categories.len());
        for category in categories {
            match merged.iter_mut().find(|c| c.name == category.name) {
                Some(existing) => existing.extensions.extend(category.extensions),
                None => merged.push(category),
            }
        }

        Self {
            categories: merged,
            skip_extensions: skip_extensions
                .into_iter()
                .filter_map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        }
    }

    /// The built-in table used when no usable configuration exists.
    pub fn builtin() -> Self {
        Self::new(builtin_categories(), DEFAULT_SKIP_EXTENSIONS.iter())
    }

    /// Parses a JSON category document.
    ///
    /// The root must be an object. Every key other than `SkipExtensions` and
    /// `_meta` whose value is an array becomes a category. A missing skip
    /// list means the default one; a document without any category takes the
    /// built-in categories but keeps its own skip list.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigInvalid` if the JSON cannot be parsed or the
    /// root is not an object.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let root: Value =
            serde_json::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        let object = root.as_object().ok_or_else(|| {
            ConfigError::ConfigInvalid("category document root must be a JSON object".to_string())
        })?;

        let skip_extensions: Vec<String> = match object.get(SKIP_EXTENSIONS_KEY) {
            Some(Value::Array(items)) => items.iter().filter_map(extension_item).collect(),
            Some(_) => {
                return Err(ConfigError::ConfigInvalid(format!(
                    "'{}' must be a list of extensions",
                    SKIP_EXTENSIONS_KEY
                )));
            }
            None => DEFAULT_SKIP_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        };

        let mut categories = Vec::new();
        for (key, value) in object {
            if key == SKIP_EXTENSIONS_KEY || key == META_KEY {
                continue;
            }
            if let Value::Array(items) = value {
                categories.push(Category::new(
                    key.clone(),
                    items.iter().filter_map(extension_item),
                ));
            } else {
                tracing::warn!(category = %key, "ignoring category whose value is not a list");
            }
        }

        if categories.is_empty() {
            tracing::warn!("category document defines no categories, using built-in categories");
            categories = builtin_categories();
        }

        Ok(Self::new(categories, skip_extensions))
    }

    /// Loads a category document from disk, falling back to the built-in
    /// table if the file is missing or malformed.
    ///
    /// This never fails: the engine always receives a non-empty, normalized
    /// table. Problems are logged as warnings, including extensions listed by
    /// more than one category.
    pub fn load_or_builtin(path: &Path) -> Self {
        let table = match Self::load(path) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not load categories, using defaults");
                Self::builtin()
            }
        };

        for duplicate in table.duplicate_extensions() {
            tracing::warn!(
                extension = %duplicate.extension,
                winner = %duplicate.winner,
                shadowed = %duplicate.shadowed,
                "extension is listed by more than one category"
            );
        }
        table
    }

    /// Loads a category document from disk.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if the file does not exist,
    /// `ConfigError::IoError` if it cannot be read, and
    /// `ConfigError::ConfigInvalid` if its content is not a category document.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(PathBuf::from(path)));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json_str(&content)
    }

    /// Categories in classification order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Looks a category up by name.
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// The normalized skip extensions.
    pub fn skip_extensions(&self) -> &BTreeSet<String> {
        &self.skip_extensions
    }

    /// Returns true if the file name carries a skip-listed extension.
    pub fn is_skipped(&self, file_name: &str) -> bool {
        extension_of(file_name).is_some_and(|ext| self.skip_extensions.contains(&ext))
    }

    /// Classifies a file name by its extension.
    ///
    /// The skip list is checked first and dominates category membership.
    pub fn classify(&self, file_name: &str) -> Classification<'_> {
        self.classify_extension(extension_of(file_name).as_deref())
    }

    /// Classifies an already normalized extension.
    pub fn classify_extension(&self, normalized_ext: Option<&str>) -> Classification<'_> {
        let Some(ext) = normalized_ext else {
            return Classification::Unclassified;
        };
        if self.skip_extensions.contains(ext) {
            return Classification::Skip;
        }
        self.categories
            .iter()
            .find(|category| category.contains(ext))
            .map_or(Classification::Unclassified, Classification::Category)
    }

    /// Lists extensions that appear under more than one category.
    pub fn duplicate_extensions(&self) -> Vec<DuplicateExtension> {
        let mut first_owner: HashMap<&str, &str> = HashMap::new();
        let mut duplicates = Vec::new();
        for category in &self.categories {
            for ext in &category.extensions {
                match first_owner.get(ext.as_str()) {
                    Some(winner) => duplicates.push(DuplicateExtension {
                        extension: ext.clone(),
                        winner: winner.to_string(),
                        shadowed: category.name.clone(),
                    }),
                    None => {
                        first_owner.insert(ext, &category.name);
                    }
                }
            }
        }
        duplicates
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, exts)| Category::new(*name, exts.iter()))
        .collect()
}

fn extension_item(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A filesystem entry under consideration for a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Full path of the entry.
    pub path: PathBuf,
    /// Base name of the entry.
    pub name: String,
    /// Normalized extension, if any.
    pub extension: Option<String>,
}

impl Candidate {
    /// Builds a candidate from a path. Returns `None` for paths without a
    /// file name component (e.g. `/` or `..`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        Some(Self {
            path: path.to_path_buf(),
            extension: extension_of(&name),
            name,
        })
    }
}
