//! Live watching of the inbox folder.
//!
//! [`LiveWatcher`] owns a `notify` watcher and a dispatch thread. Every
//! creation or modification is handed to a [`LiveEventAdapter`] on its own
//! worker thread, so one large download waiting to settle does not hold up
//! the others. Events for a path that already has a running handler are
//! dropped; that handler waits for the file to settle anyway.

use crate::file_organizer::{FileOrganizer, MoveOutcome};
use crate::routing::SkipReason;
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Source folder {} does not exist", .0.display())]
    SourceMissing(PathBuf),
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Failed to start the event dispatcher: {0}")]
    Spawn(#[source] io::Error),
}

/// Turns a filesystem change into a move.
pub struct LiveEventAdapter {
    organizer: Arc<FileOrganizer>,
    debounce: Duration,
}

impl LiveEventAdapter {
    pub fn new(organizer: Arc<FileOrganizer>, debounce: Duration) -> Self {
        Self {
            organizer,
            debounce,
        }
    }

    /// Handles one change notification. Blocks for the debounce delay and,
    /// if the file is moved, for as long as the file keeps growing.
    ///
    /// Directories, files under a destination folder, and files filtered by
    /// name are skipped. The ambiguous category may prompt.
    pub fn on_file_changed(&self, path: &Path, is_directory: bool) -> MoveOutcome {
        if !self.debounce.is_zero() {
            thread::sleep(self.debounce);
        }
        if is_directory {
            return MoveOutcome::Skipped(SkipReason::NotAFile);
        }

        let router = self.organizer.router();
        if router.is_within_destination(path) {
            trace!(path = %path.display(), "change inside a destination folder");
            return MoveOutcome::Skipped(SkipReason::Ignored);
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return MoveOutcome::Skipped(SkipReason::NotAFile);
        };
        if let Some(reason) = router.name_filter(&name) {
            trace!(file = %name, %reason, "skipping change");
            return MoveOutcome::Skipped(reason);
        }

        let outcome = self.organizer.move_file(path, None);
        if let MoveOutcome::Skipped(reason) = &outcome {
            debug!(file = %name, %reason, "file not moved");
        }
        outcome
    }
}

/// A running watcher on the source folder.
///
/// Dropping it stops the watcher and joins the dispatch thread. Handlers
/// that are already running finish on their own.
pub struct LiveWatcher {
    source: PathBuf,
    watcher: Option<RecommendedWatcher>,
    stop_tx: Option<Sender<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl LiveWatcher {
    /// Starts watching `source`.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::SourceMissing` if `source` is not a directory,
    /// or the error from the platform watcher.
    pub fn start(
        source: &Path,
        adapter: Arc<LiveEventAdapter>,
        recursive: bool,
    ) -> Result<Self, WatchError> {
        if !source.is_dir() {
            return Err(WatchError::SourceMissing(source.to_path_buf()));
        }

        let (event_tx, event_rx) = unbounded::<notify::Result<Event>>();
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let mut watcher = RecommendedWatcher::new(
            move |event| {
                let _ = event_tx.send(event);
            },
            notify::Config::default(),
        )?;
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(source, mode)?;

        let dispatcher = thread::Builder::new()
            .name("autosort-dispatch".to_string())
            .spawn(move || dispatch(event_rx, stop_rx, adapter))
            .map_err(WatchError::Spawn)?;

        info!(source = %source.display(), recursive, "Watching for new files");
        Ok(Self {
            source: source.to_path_buf(),
            watcher: Some(watcher),
            stop_tx: Some(stop_tx),
            dispatcher: Some(dispatcher),
        })
    }

    /// Stops watching and waits for the dispatch thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the watcher closes the event channel.
        self.watcher.take();
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                warn!("event dispatcher panicked");
            }
            info!(source = %self.source.display(), "Stopped watching");
        }
    }
}

impl Drop for LiveWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch(
    events: Receiver<notify::Result<Event>>,
    stop: Receiver<()>,
    adapter: Arc<LiveEventAdapter>,
) {
    let in_flight: Arc<Mutex<HashSet<PathBuf>>> = Arc::default();
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(events) -> message => match message {
                Ok(Ok(event)) => {
                    for (path, is_directory) in changed_paths(&event) {
                        spawn_handler(path, is_directory, &adapter, &in_flight);
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "file watcher reported an error"),
                Err(_) => break,
            },
        }
    }
    debug!("event dispatcher exiting");
}

fn spawn_handler(
    path: PathBuf,
    is_directory: bool,
    adapter: &Arc<LiveEventAdapter>,
    in_flight: &Arc<Mutex<HashSet<PathBuf>>>,
) {
    let Some(claim) = InFlightClaim::acquire(in_flight, &path) else {
        trace!(path = %path.display(), "already handling this path");
        return;
    };
    let adapter = Arc::clone(adapter);
    let spawned = thread::Builder::new()
        .name("autosort-event".to_string())
        .spawn(move || {
            let _claim = claim;
            adapter.on_file_changed(&path, is_directory);
        });
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start a handler thread");
    }
}

/// Marks a path as being handled until dropped.
struct InFlightClaim {
    set: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl InFlightClaim {
    fn acquire(set: &Arc<Mutex<HashSet<PathBuf>>>, path: &Path) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf());
        inserted.then(|| Self {
            set: Arc::clone(set),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

/// Paths worth handling in an event, with a directory flag.
fn changed_paths(event: &Event) -> Vec<(PathBuf, bool)> {
    match &event.kind {
        EventKind::Create(kind) => event
            .paths
            .iter()
            .map(|p| (p.clone(), *kind == CreateKind::Folder || p.is_dir()))
            .collect(),
        // The old name of a rename no longer exists.
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .last()
            .map(|p| vec![(p.clone(), p.is_dir())])
            .unwrap_or_default(),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), p.is_dir()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SilentNotifier;
    use crate::file_category::{Category, CategoryTable};
    use crate::routing::{FolderLayout, Router};
    use crate::stability::StabilityPolicy;
    use notify::event::{DataChange, RemoveKind};
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn adapter(root: &Path) -> Arc<LiveEventAdapter> {
        debounced_adapter(root, Duration::ZERO)
    }

    fn debounced_adapter(root: &Path, debounce: Duration) -> Arc<LiveEventAdapter> {
        let table = CategoryTable::new(vec![Category::new("Docs", [".txt"])], [".part"]);
        let organizer = FileOrganizer::new(
            Router::new(table, FolderLayout::new(root)),
            StabilityPolicy::immediate(),
            Arc::new(SilentNotifier),
        );
        Arc::new(LiveEventAdapter::new(Arc::new(organizer), debounce))
    }

    #[test]
    fn test_adapter_moves_new_file() {
        let inbox = TempDir::new().unwrap();
        let sorted = TempDir::new().unwrap();
        let path = inbox.path().join("todo.txt");
        fs::write(&path, "milk").unwrap();

        let outcome = adapter(sorted.path()).on_file_changed(&path, false);

        assert!(outcome.is_moved());
        assert!(sorted.path().join("Docs/todo.txt").exists());
    }

    #[test]
    fn test_adapter_skips_directories_and_partials() {
        let inbox = TempDir::new().unwrap();
        let sorted = TempDir::new().unwrap();
        let adapter = adapter(sorted.path());
        let partial = inbox.path().join("movie.part");
        fs::write(&partial, "half").unwrap();

        assert!(matches!(
            adapter.on_file_changed(inbox.path(), true),
            MoveOutcome::Skipped(SkipReason::NotAFile)
        ));
        assert!(matches!(
            adapter.on_file_changed(&partial, false),
            MoveOutcome::Skipped(SkipReason::SkipExtension)
        ));
        assert!(partial.exists());
    }

    #[test]
    fn test_adapter_vanished_file_is_skipped() {
        let inbox = TempDir::new().unwrap();
        let sorted = TempDir::new().unwrap();

        let outcome = adapter(sorted.path()).on_file_changed(&inbox.path().join("gone.txt"), false);
        assert!(matches!(outcome, MoveOutcome::Skipped(SkipReason::Vanished)));
    }

    #[test]
    fn test_adapter_waits_out_debounce_before_moving() {
        let inbox = TempDir::new().unwrap();
        let sorted = TempDir::new().unwrap();
        let path = inbox.path().join("slow.txt");
        fs::write(&path, "data").unwrap();
        let debounce = Duration::from_millis(100);

        let started = Instant::now();
        let outcome = debounced_adapter(sorted.path(), debounce).on_file_changed(&path, false);

        assert!(started.elapsed() >= debounce);
        assert!(outcome.is_moved());
        assert!(sorted.path().join("Docs/slow.txt").exists());
    }

    #[test]
    fn test_file_removed_during_debounce_is_vanished() {
        let inbox = TempDir::new().unwrap();
        let sorted = TempDir::new().unwrap();
        let path = inbox.path().join("brief.txt");
        fs::write(&path, "here for a moment").unwrap();
        let debounce = Duration::from_millis(100);
        let adapter = debounced_adapter(sorted.path(), debounce);

        let started = Instant::now();
        let handler = {
            let adapter = Arc::clone(&adapter);
            let path = path.clone();
            thread::spawn(move || adapter.on_file_changed(&path, false))
        };
        thread::sleep(Duration::from_millis(20));
        fs::remove_file(&path).unwrap();
        let outcome = handler.join().unwrap();

        assert!(started.elapsed() >= debounce);
        assert!(matches!(outcome, MoveOutcome::Skipped(SkipReason::Vanished)));
        assert!(!sorted.path().join("Docs/brief.txt").exists());
    }

    #[test]
    fn test_adapter_ignores_destination_folders() {
        let sorted = TempDir::new().unwrap();
        let docs = sorted.path().join("Docs");
        fs::create_dir(&docs).unwrap();
        let path = docs.join("already.txt");
        fs::write(&path, "here").unwrap();

        let outcome = adapter(sorted.path()).on_file_changed(&path, false);
        assert!(matches!(outcome, MoveOutcome::Skipped(SkipReason::Ignored)));
        assert!(path.exists());
    }

    #[test]
    fn test_changed_paths() {
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/in/a.txt"));
        assert_eq!(changed_paths(&create), vec![(PathBuf::from("/in/a.txt"), false)]);

        let folder = Event::new(EventKind::Create(CreateKind::Folder)).add_path(PathBuf::from("/in/x"));
        assert_eq!(changed_paths(&folder), vec![(PathBuf::from("/in/x"), true)]);

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/in/a.crdownload"))
            .add_path(PathBuf::from("/in/a.zip"));
        assert_eq!(changed_paths(&rename), vec![(PathBuf::from("/in/a.zip"), false)]);

        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/in/old.txt"));
        assert!(changed_paths(&from).is_empty());

        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/in/b.txt"));
        assert_eq!(changed_paths(&write).len(), 1);

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("/in/c.txt"));
        assert!(changed_paths(&remove).is_empty());
    }

    #[test]
    fn test_in_flight_claims_coalesce() {
        let set: Arc<Mutex<HashSet<PathBuf>>> = Arc::default();
        let path = Path::new("/in/a.txt");

        let first = InFlightClaim::acquire(&set, path);
        assert!(first.is_some());
        assert!(InFlightClaim::acquire(&set, path).is_none());

        drop(first);
        assert!(InFlightClaim::acquire(&set, path).is_some());
    }

    #[test]
    fn test_start_missing_source() {
        let sorted = TempDir::new().unwrap();
        let result = LiveWatcher::start(&sorted.path().join("missing"), adapter(sorted.path()), true);
        assert!(matches!(result, Err(WatchError::SourceMissing(_))));
    }

    #[test]
    fn test_watcher_moves_created_file() {
        let inbox = TempDir::new().unwrap();
        let sorted = TempDir::new().unwrap();
        let watcher = LiveWatcher::start(inbox.path(), adapter(sorted.path()), false).unwrap();

        fs::write(inbox.path().join("live.txt"), "hello").unwrap();

        let target = sorted.path().join("Docs/live.txt");
        let deadline = Instant::now() + Duration::from_secs(10);
        while !target.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        watcher.stop();

        assert!(target.exists());
        assert!(!inbox.path().join("live.txt").exists());
    }
}
