//! Application state: the sorting engine, the live watcher and the control
//! surface.

use crate::batch::{BatchCoordinator, SweepError, SweepSummary};
use crate::collaborators::{
    DecisionPrompt, NoPrompt, Notifier, ProgressReporter, SilentNotifier, SilentProgress,
    TraySurface, WatchState,
};
use crate::config::{ConfigError, ResolvedPaths, Settings};
use crate::file_category::CategoryTable;
use crate::file_organizer::{FileOrganizer, MoveOutcome};
use crate::routing::{FolderLayout, Router, SecondaryRoute};
use crate::stability::StabilityPolicy;
use crate::watcher::{LiveEventAdapter, LiveWatcher, WatchError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The user-facing collaborators the engine reports to.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub progress: Arc<dyn ProgressReporter>,
    pub prompt: Arc<dyn DecisionPrompt>,
}

impl Collaborators {
    /// Collaborators that show nothing and never prompt.
    pub fn silent() -> Self {
        Self {
            notifier: Arc::new(SilentNotifier),
            progress: Arc::new(SilentProgress),
            prompt: Arc::new(NoPrompt),
        }
    }
}

/// Everything needed to sort one source folder, built from one snapshot of
/// the configuration.
pub struct Engine {
    source: PathBuf,
    organizer: Arc<FileOrganizer>,
    batch: BatchCoordinator,
    adapter: Arc<LiveEventAdapter>,
    recursive: bool,
    sweep_on_start: bool,
}

impl Engine {
    /// Resolves folders, loads the category document and builds the engine.
    ///
    /// An unusable category document falls back to the built-in table.
    ///
    /// # Errors
    ///
    /// Returns an error if a folder cannot be resolved or an ignore rule
    /// does not compile.
    pub fn load(settings: &Settings, collaborators: &Collaborators) -> Result<Self, ConfigError> {
        let paths = settings.resolve_paths()?;
        let table = CategoryTable::load_or_builtin(&paths.categories_file);
        Self::from_parts(settings, &paths, table, collaborators)
    }

    /// Builds the engine around an already loaded category table.
    pub fn build(
        settings: &Settings,
        table: CategoryTable,
        collaborators: &Collaborators,
    ) -> Result<Self, ConfigError> {
        let paths = settings.resolve_paths()?;
        Self::from_parts(settings, &paths, table, collaborators)
    }

    fn from_parts(
        settings: &Settings,
        paths: &ResolvedPaths,
        table: CategoryTable,
        collaborators: &Collaborators,
    ) -> Result<Self, ConfigError> {
        let filters = settings.filters.compile()?;

        let layout = paths.destinations.iter().fold(
            FolderLayout::new(&paths.destination_root),
            |layout, (category, folder)| layout.with_override(category.clone(), folder.clone()),
        );
        let secondary = SecondaryRoute {
            category: settings.sorting.ambiguous_category.clone(),
            folder_name: settings.sorting.secondary_folder.clone(),
            enabled: settings.sorting.ask_secondary,
        };
        let router = Router::new(table, layout)
            .with_filters(filters)
            .with_secondary(secondary, Arc::clone(&collaborators.prompt));
        router.check_layout(&paths.source);

        let mut stability =
            StabilityPolicy::new(settings.sorting.stable_for(), settings.sorting.poll_interval());
        if let Some(max_wait) = settings.sorting.max_wait() {
            stability = stability.with_max_wait(max_wait);
        }

        let organizer = Arc::new(FileOrganizer::new(
            router,
            stability,
            Arc::clone(&collaborators.notifier),
        ));
        let batch = BatchCoordinator::new(
            Arc::clone(&organizer),
            Arc::clone(&collaborators.progress),
            Arc::clone(&collaborators.notifier),
        );
        let adapter = Arc::new(LiveEventAdapter::new(
            Arc::clone(&organizer),
            settings.watch.debounce(),
        ));

        Ok(Self {
            source: paths.source.clone(),
            organizer,
            batch,
            adapter,
            recursive: settings.watch.recursive,
            sweep_on_start: settings.watch.sweep_on_start,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn organizer(&self) -> &FileOrganizer {
        &self.organizer
    }

    pub fn batch(&self) -> &BatchCoordinator {
        &self.batch
    }
}

/// Owns the engine and reacts to start, stop, quit and change events.
pub struct Controller {
    engine: Engine,
    surface: Arc<dyn TraySurface>,
    watcher: Option<LiveWatcher>,
}

impl Controller {
    pub fn new(engine: Engine, surface: Arc<dyn TraySurface>) -> Self {
        Self {
            engine,
            surface,
            watcher: None,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn state(&self) -> WatchState {
        if self.is_watching() {
            WatchState::Watching
        } else {
            WatchState::Stopped
        }
    }

    /// Starts live watching, then sweeps what is already in the source.
    ///
    /// Does nothing if already watching.
    ///
    /// # Errors
    ///
    /// Returns the watcher error if watching could not start; the menu is
    /// left in the stopped state.
    pub fn on_start(&mut self) -> Result<(), WatchError> {
        if self.watcher.is_some() {
            debug!("already watching");
            return Ok(());
        }

        let started = LiveWatcher::start(
            &self.engine.source,
            Arc::clone(&self.engine.adapter),
            self.engine.recursive,
        );
        let watcher = match started {
            Ok(watcher) => watcher,
            Err(e) => {
                self.surface.rebuild_menu(WatchState::Stopped);
                return Err(e);
            }
        };
        self.watcher = Some(watcher);

        if self.engine.sweep_on_start {
            self.run_sweep();
        }
        self.surface.rebuild_menu(WatchState::Watching);
        Ok(())
    }

    /// Stops live watching. Handlers already running finish on their own.
    pub fn on_stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.surface.rebuild_menu(WatchState::Stopped);
    }

    pub fn on_quit(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
        info!("Shutting down");
        self.surface.shutdown();
    }

    /// Handles one change notification synchronously.
    pub fn on_file_changed(&self, path: &Path, is_directory: bool) -> MoveOutcome {
        self.engine.adapter.on_file_changed(path, is_directory)
    }

    /// Runs a batch sweep of the source folder.
    ///
    /// A missing source folder is logged and yields `None`.
    pub fn run_sweep(&self) -> Option<SweepSummary> {
        match self.engine.batch.run_batch_sweep(&self.engine.source) {
            Ok(summary) => Some(summary),
            Err(SweepError::SourceMissing(path)) => {
                warn!(source = %path.display(), "Source folder does not exist, nothing to sort");
                None
            }
            Err(e) => {
                error!(error = %e, "Batch sweep failed");
                None
            }
        }
    }

    /// Swaps in a freshly built engine, restarting the watcher if it was
    /// running. Handlers already running keep the old engine.
    ///
    /// # Errors
    ///
    /// Returns the watcher error if watching could not restart.
    pub fn reload(&mut self, engine: Engine) -> Result<(), WatchError> {
        let was_watching = self.is_watching();
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.engine = engine;
        info!(source = %self.engine.source.display(), "Configuration reloaded");

        if was_watching {
            self.on_start()
        } else {
            self.surface.rebuild_menu(WatchState::Stopped);
            Ok(())
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
    }
}
