//! Destination resolution.
//!
//! The [`Router`] turns a file into a destination folder: it applies the skip
//! list and ignore rules, classifies by extension, and maps the category to a
//! folder. One category may be ambiguous; files in it go either to the
//! category folder or to a secondary folder nested inside it, depending on a
//! yes/no prompt that is only asked when the caller allows it.

use crate::collaborators::{DecisionPrompt, NoPrompt};
use crate::config::CompiledFilters;
use crate::file_category::{Candidate, Category, CategoryTable, Classification};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a file was left where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The entry is a directory or another non-regular file.
    NotAFile,
    /// The extension is on the skip list.
    SkipExtension,
    /// An ignore rule matched the file name.
    Ignored,
    /// No category lists the extension.
    Unclassified,
    /// The file disappeared before it could be moved.
    Vanished,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotAFile => "not a regular file",
            Self::SkipExtension => "skip-listed extension",
            Self::Ignored => "matched an ignore rule",
            Self::Unclassified => "no matching category",
            Self::Vanished => "file no longer exists",
        };
        f.write_str(text)
    }
}

/// A resolved destination for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Category the file was classified into.
    pub category: String,
    /// Folder the file is moved into.
    pub directory: PathBuf,
}

impl Destination {
    /// Short label for status lines: the destination folder's own name.
    pub fn label(&self) -> String {
        self.directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.category.clone())
    }
}

/// Outcome of routing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Skip(SkipReason),
    To(Destination),
}

/// Maps category names to folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    root: PathBuf,
    overrides: BTreeMap<String, PathBuf>,
}

impl FolderLayout {
    /// Every category goes to `root/<category name>`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overrides: BTreeMap::new(),
        }
    }

    /// Sends one category to an explicit folder instead.
    pub fn with_override(mut self, category: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        self.overrides.insert(category.into(), folder.into());
        self
    }

    pub fn folder_for(&self, category: &str) -> PathBuf {
        self.overrides
            .get(category)
            .cloned()
            .unwrap_or_else(|| self.root.join(category))
    }
}

/// The ambiguous category and its secondary folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryRoute {
    /// Category that can be split (e.g. "Media").
    pub category: String,
    /// Folder name nested in the category folder (e.g. "Memes").
    pub folder_name: String,
    /// Feature flag; when off the prompt is never asked.
    pub enabled: bool,
}

/// Resolves files to destination folders.
pub struct Router {
    table: CategoryTable,
    filters: CompiledFilters,
    layout: FolderLayout,
    secondary: Option<SecondaryRoute>,
    prompt: Arc<dyn DecisionPrompt>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("table", &self.table)
            .field("layout", &self.layout)
            .field("secondary", &self.secondary)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// A router with no ignore rules and no ambiguous category.
    pub fn new(table: CategoryTable, layout: FolderLayout) -> Self {
        Self {
            table,
            filters: CompiledFilters::allow_all(),
            layout,
            secondary: None,
            prompt: Arc::new(NoPrompt),
        }
    }

    pub fn with_filters(mut self, filters: CompiledFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Enables the ambiguous-category split, answered by `prompt`.
    pub fn with_secondary(mut self, secondary: SecondaryRoute, prompt: Arc<dyn DecisionPrompt>) -> Self {
        self.secondary = Some(secondary);
        self.prompt = prompt;
        self
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    /// Returns the reason a file must not be touched, judging by name alone.
    ///
    /// The skip list is checked before the ignore rules; include patterns in
    /// the ignore rules never override it.
    pub fn name_filter(&self, file_name: &str) -> Option<SkipReason> {
        if self.table.is_skipped(file_name) {
            return Some(SkipReason::SkipExtension);
        }
        if !self.filters.should_include(file_name) {
            return Some(SkipReason::Ignored);
        }
        None
    }

    /// Picks the folder for a category.
    ///
    /// For the ambiguous category, when `ask_user` is set and the feature is
    /// enabled, this blocks on the decision prompt. A failed or dismissed
    /// prompt resolves to the primary folder.
    pub fn resolve_target(&self, category: &Category, ask_user: bool, file_name: &str) -> PathBuf {
        let primary = self.layout.folder_for(category.name());
        let Some(secondary) = &self.secondary else {
            return primary;
        };
        if !ask_user || !secondary.enabled || secondary.category != category.name() {
            return primary;
        }

        match self.prompt.confirm_secondary(file_name) {
            Ok(true) => primary.join(&secondary.folder_name),
            Ok(false) => primary,
            Err(e) => {
                debug!(file = %file_name, reason = %e, "no answer from prompt, using primary folder");
                primary
            }
        }
    }

    /// Routes a candidate by name: skip list, ignore rules, classification,
    /// then folder resolution.
    pub fn route(&self, candidate: &Candidate, ask_user: bool) -> Route {
        if let Some(reason) = self.name_filter(&candidate.name) {
            return Route::Skip(reason);
        }
        match self.table.classify_extension(candidate.extension.as_deref()) {
            Classification::Skip => Route::Skip(SkipReason::SkipExtension),
            Classification::Unclassified => Route::Skip(SkipReason::Unclassified),
            Classification::Category(category) => Route::To(Destination {
                category: category.name().to_string(),
                directory: self.resolve_target(category, ask_user, &candidate.name),
            }),
        }
    }

    /// Every folder this router can move files into.
    pub fn destination_folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = self
            .table
            .categories()
            .iter()
            .map(|category| self.layout.folder_for(category.name()))
            .collect();
        if let Some(secondary) = &self.secondary {
            folders.push(
                self.layout
                    .folder_for(&secondary.category)
                    .join(&secondary.folder_name),
            );
        }
        folders
    }

    /// Returns true if `path` lies inside one of the destination folders.
    pub fn is_within_destination(&self, path: &Path) -> bool {
        self.destination_folders()
            .iter()
            .any(|folder| path.starts_with(folder))
    }

    /// Warns about configuration that cannot work as intended.
    pub fn check_layout(&self, source: &Path) {
        if let Some(secondary) = &self.secondary
            && self.table.category(&secondary.category).is_none()
        {
            warn!(category = %secondary.category, "ambiguous category is not defined in the category table");
        }
        for folder in self.destination_folders() {
            if source.starts_with(&folder) {
                warn!(source = %source.display(), folder = %folder.display(), "source folder lies inside a destination folder");
            }
        }
    }
}
