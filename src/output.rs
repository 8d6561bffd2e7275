//! Output formatting and styling module.
//!
//! Provides a centralized interface for all console output, including colored
//! messages, the batch progress bar and summary tables. The console versions of
//! the notifier, progress reporter and control surface live here too.

use crate::batch::SweepSummary;
use crate::collaborators::{Notifier, ProgressReporter, TraySurface, WatchState};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

const PROGRESS_TEMPLATE: &str = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Manages all console output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for sweeps
/// - Summary tables with statistics
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autosort::output::OutputFormatter;
    /// OutputFormatter::success("Sorted 3 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autosort::output::OutputFormatter;
    /// OutputFormatter::error("Failed to move file");
    /// ```
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar for a sweep over `total` files.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autosort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Batch complete");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = match ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            Ok(style) => style.progress_chars("█▓░"),
            Err(_) => ProgressStyle::default_bar(),
        };
        pb.set_style(style);
        pb
    }

    /// Prints a summary table with file counts by category.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autosort::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Docs".to_string(), 15);
    /// counts.insert("Media".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_category_len = category_counts
            .keys()
            .map(|name| name.chars().count())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                file_word(*count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            file_word(total_files),
            width = max_category_len
        );
    }

    /// Prints the outcome of a finished sweep.
    pub fn sweep_summary(summary: &SweepSummary) {
        let started = summary.started_at.format("%H:%M:%S");
        if summary.total == 0 {
            Self::info(&format!("[{started}] Nothing to sort."));
            return;
        }
        Self::success(&format!(
            "[{started}] Sorted {} of {} {}",
            summary.moved.len(),
            summary.total,
            file_word(summary.total)
        ));
        if summary.skipped > 0 {
            Self::plain(&format!("  Skipped: {}", summary.skipped));
        }
        if summary.deferred > 0 {
            Self::warning(&deferred_notice(summary.deferred));
        }
        for (path, reason) in &summary.failed {
            Self::error(&format!("{}: {}", path.display(), reason));
        }
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn deferred_notice(count: usize) -> String {
    format!("{count} {} still downloading; left in place", file_word(count))
}

fn file_word(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Prints notifications to the console.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, message: &str, reveal: Option<&Path>) {
        println!("{} {}", "●".cyan(), title.bold());
        for line in message.lines() {
            println!("  {}", line.trim());
        }
        if let Some(path) = reveal {
            println!("  {}", path.display().to_string().dimmed());
        }
    }
}

/// Shows batch progress as an `indicatif` progress bar.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn begin(&self, status: &str, total: usize) {
        let bar = OutputFormatter::create_progress_bar(total as u64);
        bar.set_message(status.to_string());
        let mut slot = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(bar) {
            previous.abandon();
        }
    }

    fn update(&self, done: usize, total: usize, status: &str) {
        let slot = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = slot.as_ref() {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
            bar.set_message(status.to_string());
        }
    }

    fn complete(&self, message: &str) {
        let mut slot = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = slot.take() {
            bar.finish_with_message(message.to_string());
        }
    }
}

/// The start/stop/quit menu rendered as a console line.
#[derive(Debug, Default)]
pub struct ConsoleSurface;

impl ConsoleSurface {
    /// Menu labels for a state. The active entry is marked and disabled.
    pub fn menu_line(state: WatchState) -> String {
        let (start, stop) = match state {
            WatchState::Watching => ("Start (active)", "Stop"),
            WatchState::Stopped => ("Start", "Stop (active)"),
        };
        format!("[{start}] [{stop}] [Quit]")
    }
}

impl TraySurface for ConsoleSurface {
    fn rebuild_menu(&self, state: WatchState) {
        let label = match state {
            WatchState::Watching => "watching".green(),
            WatchState::Stopped => "stopped".yellow(),
        };
        println!("{} {}", label.bold(), Self::menu_line(state).dimmed());
    }

    fn shutdown(&self) {
        OutputFormatter::info("Goodbye.");
    }
}
