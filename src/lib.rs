//! autosort - keeps a downloads folder tidy
//!
//! This library classifies files by extension against a configurable category
//! table, waits until a download has finished growing, and moves it into its
//! category folder without ever overwriting an existing file. Files are moved
//! by a one-off batch sweep or as they appear, through a filesystem watcher.

pub mod batch;
pub mod cli;
pub mod collaborators;
pub mod collision;
pub mod config;
pub mod controller;
pub mod file_category;
pub mod file_organizer;
pub mod logging;
pub mod output;
pub mod routing;
pub mod stability;
pub mod watcher;

pub use batch::{BatchCoordinator, SweepError, SweepPlan, SweepSummary};
pub use collaborators::{DecisionPrompt, Notifier, ProgressReporter, TraySurface, WatchState};
pub use config::{CompiledFilters, ConfigError, Settings};
pub use controller::{Collaborators, Controller, Engine};
pub use file_category::{Category, CategoryTable, Classification};
pub use file_organizer::{FileOrganizer, MoveError, MoveOutcome};
pub use routing::{Destination, FolderLayout, Router, SkipReason};
pub use stability::StabilityPolicy;
pub use watcher::{LiveEventAdapter, LiveWatcher, WatchError};

pub use cli::{Cli, run_cli};
