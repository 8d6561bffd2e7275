//! Batch sweeps of the inbox folder.
//!
//! A sweep takes one snapshot of the regular files directly inside the
//! source folder, routes them without ever prompting, and moves them one by
//! one. The number of files is fixed when the snapshot is taken; files that
//! appear later are left to the live watcher or the next sweep.

use crate::collaborators::{Notifier, ProgressReporter};
use crate::file_category::Candidate;
use crate::file_organizer::{FileOrganizer, MoveOutcome};
use crate::routing::{Destination, Route, SkipReason};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STATUS_NAME_LIMIT: usize = 25;
const SUMMARY_NAME_LIMIT: usize = 45;
const SUMMARY_MAX_LISTED: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// The source folder does not exist.
    #[error("Source folder {} does not exist", .0.display())]
    SourceMissing(PathBuf),
    #[error("Failed to read directory {}: {source}", .path.display())]
    ReadDir { path: PathBuf, source: io::Error },
}

/// One file the sweep intends to move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub path: PathBuf,
    pub name: String,
    pub destination: Destination,
}

/// The scan phase of a sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepPlan {
    /// Files to move, sorted by name.
    pub moves: Vec<PlannedMove>,
    /// Files that stay in the source folder, and why.
    pub left_in_place: Vec<(String, SkipReason)>,
}

impl SweepPlan {
    pub fn total(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Number of planned moves per category.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for planned in &self.moves {
            *counts.entry(planned.destination.category.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// What a finished sweep did.
#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub started_at: DateTime<Local>,
    /// Files in the work list, fixed at scan time.
    pub total: usize,
    /// Files processed so far; ends equal to `total`.
    pub done: usize,
    /// Final names of moved files, in processing order.
    pub moved: Vec<String>,
    pub skipped: usize,
    pub deferred: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl SweepSummary {
    fn new(total: usize) -> Self {
        Self {
            started_at: Local::now(),
            total,
            done: 0,
            moved: Vec::new(),
            skipped: 0,
            deferred: 0,
            failed: Vec::new(),
        }
    }

    /// Body of the summary notification, or `None` when nothing moved.
    pub fn notification_message(&self) -> Option<String> {
        if self.moved.is_empty() {
            return None;
        }
        let mut listed = self
            .moved
            .iter()
            .take(SUMMARY_MAX_LISTED)
            .map(|name| format!("- {}...", truncate_chars(name, SUMMARY_NAME_LIMIT)))
            .collect::<Vec<_>>()
            .join("\n");
        if self.moved.len() > SUMMARY_MAX_LISTED {
            listed.push_str(&format!(
                "\n...and {} more",
                self.moved.len() - SUMMARY_MAX_LISTED
            ));
        }
        Some(listed)
    }
}

/// Runs sweeps over a source folder.
pub struct BatchCoordinator {
    organizer: Arc<FileOrganizer>,
    progress: Arc<dyn ProgressReporter>,
    notifier: Arc<dyn Notifier>,
}

impl BatchCoordinator {
    pub fn new(
        organizer: Arc<FileOrganizer>,
        progress: Arc<dyn ProgressReporter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            organizer,
            progress,
            notifier,
        }
    }

    /// Lists and routes the files of `source` without touching them.
    ///
    /// # Errors
    ///
    /// Returns `SweepError::SourceMissing` if `source` does not exist and
    /// `SweepError::ReadDir` if it cannot be listed.
    pub fn plan(&self, source: &Path) -> Result<SweepPlan, SweepError> {
        if !source.exists() {
            return Err(SweepError::SourceMissing(source.to_path_buf()));
        }
        let entries = fs::read_dir(source).map_err(|source_error| SweepError::ReadDir {
            path: source.to_path_buf(),
            source: source_error,
        })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| fs::metadata(path).is_ok_and(|m| m.is_file()))
            .collect();
        files.sort();

        let router = self.organizer.router();
        let mut plan = SweepPlan::default();
        for path in files {
            let Some(candidate) = Candidate::from_path(&path) else {
                continue;
            };
            match router.route(&candidate, false) {
                Route::To(destination) => plan.moves.push(PlannedMove {
                    path,
                    name: candidate.name,
                    destination,
                }),
                Route::Skip(reason) => plan.left_in_place.push((candidate.name, reason)),
            }
        }
        Ok(plan)
    }

    /// Moves every eligible file in `source`, reporting progress after each.
    ///
    /// The ambiguous category is never prompted for; its files go to the
    /// primary folder. Failures of individual files are logged and counted.
    ///
    /// # Errors
    ///
    /// Only a failure to list `source` aborts the sweep; see
    /// [`BatchCoordinator::plan`].
    pub fn run_batch_sweep(&self, source: &Path) -> Result<SweepSummary, SweepError> {
        let plan = self.plan(source)?;
        let total = plan.total();
        let mut summary = SweepSummary::new(total);

        if total == 0 {
            debug!(source = %source.display(), "nothing to sort");
            return Ok(summary);
        }

        self.progress.begin("Scanning & sorting…", total);
        self.progress.update(0, total, "Starting…");

        for planned in &plan.moves {
            match self
                .organizer
                .move_file_quietly(&planned.path, Some(&planned.destination))
            {
                MoveOutcome::Moved(final_path) => {
                    let name = final_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| planned.name.clone());
                    summary.moved.push(name);
                }
                MoveOutcome::Skipped(reason) => {
                    debug!(file = %planned.name, %reason, "skipped during sweep");
                    summary.skipped += 1;
                }
                MoveOutcome::Deferred => summary.deferred += 1,
                MoveOutcome::Failed(error) => {
                    summary.failed.push((planned.path.clone(), error.to_string()));
                }
            }
            summary.done += 1;
            let status = format!(
                "{} → {}",
                short_name(&planned.name),
                planned.destination.label()
            );
            self.progress.update(summary.done, total, &status);
        }

        self.progress.complete("Batch complete");
        if let Some(message) = summary.notification_message() {
            self.notifier.notify("Files moved:", &message, None);
        }

        if summary.failed.is_empty() {
            info!(
                moved = summary.moved.len(),
                skipped = summary.skipped,
                deferred = summary.deferred,
                "Batch sweep finished"
            );
        } else {
            warn!(
                moved = summary.moved.len(),
                failed = summary.failed.len(),
                "Batch sweep finished with failures"
            );
        }
        Ok(summary)
    }
}

/// Shortens a file name for progress status lines.
pub fn short_name(name: &str) -> String {
    if name.chars().count() > STATUS_NAME_LIMIT {
        format!("{}…", truncate_chars(name, STATUS_NAME_LIMIT))
    } else {
        name.to_string()
    }
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
