//! Safe single-file moves.
//!
//! The [`FileOrganizer`] moves one file from the inbox into its destination
//! folder. It never overwrites: the destination name is made unique first,
//! and a destination that appears between that check and the move fails the
//! move instead of replacing the file. It also waits for the file to stop
//! growing so partially downloaded files are left alone.

use crate::collaborators::Notifier;
use crate::collision::resolve_name;
use crate::file_category::Candidate;
use crate::routing::{Destination, Route, Router, SkipReason};
use crate::stability::StabilityPolicy;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Errors that can occur while moving a file.
#[derive(Debug, thiserror::Error)]
pub enum MoveError {
    /// Failed to read the metadata of the file.
    #[error("Failed to inspect {}: {source}", .path.display())]
    Inspect { path: PathBuf, source: io::Error },
    /// Failed to create a category directory.
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },
    /// Another file took the destination name after it was chosen.
    #[error("Destination {} already exists", .path.display())]
    DestinationTaken { path: PathBuf },
    /// Failed to move a file to its category directory.
    #[error("Failed to move {} to {}: {source}", .from.display(), .to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    /// The file could not be watched for completion.
    #[error("Failed to check whether {} is complete: {source}", .path.display())]
    StabilityCheck { path: PathBuf, source: io::Error },
}

/// Result of a single move request.
#[derive(Debug)]
pub enum MoveOutcome {
    /// The file now lives at this path.
    Moved(PathBuf),
    /// The file was left alone.
    Skipped(SkipReason),
    /// The file kept changing past the maximum wait; try again later.
    Deferred,
    /// An I/O error stopped the move; the source file is untouched.
    Failed(MoveError),
}

impl MoveOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, Self::Moved(_))
    }

    /// The final path of a moved file.
    pub fn moved_path(&self) -> Option<&Path> {
        match self {
            Self::Moved(path) => Some(path),
            _ => None,
        }
    }
}

/// Moves files from the inbox into their category folders.
pub struct FileOrganizer {
    router: Router,
    stability: StabilityPolicy,
    notifier: Arc<dyn Notifier>,
}

impl FileOrganizer {
    pub fn new(router: Router, stability: StabilityPolicy, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            router,
            stability,
            notifier,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn stability(&self) -> StabilityPolicy {
        self.stability
    }

    /// Moves one file and shows a notification for it.
    ///
    /// With `planned` set the file goes to that destination without being
    /// classified again; otherwise it is routed by name and the ambiguous
    /// category may prompt. Skip-listed and ignored files are never moved.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autosort::collaborators::SilentNotifier;
    /// use autosort::file_category::CategoryTable;
    /// use autosort::file_organizer::{FileOrganizer, MoveOutcome};
    /// use autosort::routing::{FolderLayout, Router};
    /// use autosort::stability::StabilityPolicy;
    /// use std::path::Path;
    /// use std::sync::Arc;
    ///
    /// let router = Router::new(CategoryTable::builtin(), FolderLayout::new("/home/me/Desktop"));
    /// let organizer = FileOrganizer::new(router, StabilityPolicy::default(), Arc::new(SilentNotifier));
    ///
    /// match organizer.move_file(Path::new("/home/me/Downloads/report.pdf"), None) {
    ///     MoveOutcome::Moved(path) => println!("Moved to {}", path.display()),
    ///     other => println!("Not moved: {:?}", other),
    /// }
    /// ```
    pub fn move_file(&self, path: &Path, planned: Option<&Destination>) -> MoveOutcome {
        self.process(path, planned, true)
    }

    /// Same as [`FileOrganizer::move_file`] without the per-file notification.
    pub fn move_file_quietly(&self, path: &Path, planned: Option<&Destination>) -> MoveOutcome {
        self.process(path, planned, false)
    }

    fn process(&self, path: &Path, planned: Option<&Destination>, notify: bool) -> MoveOutcome {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return MoveOutcome::Skipped(SkipReason::Vanished);
            }
            Err(source) => {
                return MoveOutcome::Failed(MoveError::Inspect {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if !metadata.is_file() {
            return MoveOutcome::Skipped(SkipReason::NotAFile);
        }
        let Some(candidate) = Candidate::from_path(path) else {
            return MoveOutcome::Skipped(SkipReason::NotAFile);
        };
        if let Some(reason) = self.router.name_filter(&candidate.name) {
            return MoveOutcome::Skipped(reason);
        }

        let destination = match planned {
            Some(destination) => destination.clone(),
            None => match self.router.route(&candidate, true) {
                Route::To(destination) => destination,
                Route::Skip(reason) => return MoveOutcome::Skipped(reason),
            },
        };

        match self.place(&candidate, &destination.directory) {
            Ok(Some(final_path)) => {
                info!(
                    file = %candidate.name,
                    destination = %destination.directory.display(),
                    "Moved file"
                );
                if notify {
                    let message = format!(
                        "- \"{}\" \n Moved to \n - {}",
                        candidate.name,
                        destination.directory.display()
                    );
                    self.notifier
                        .notify("File moved:", &message, Some(&final_path));
                }
                MoveOutcome::Moved(final_path)
            }
            Ok(None) => MoveOutcome::Deferred,
            Err(Placement::Vanished) => {
                debug!(file = %candidate.name, "file vanished before it could be moved");
                MoveOutcome::Skipped(SkipReason::Vanished)
            }
            Err(Placement::Failed(error)) => {
                error!(file = %candidate.name, error = %error, "Failed to move file");
                MoveOutcome::Failed(error)
            }
        }
    }

    /// Moves the file into `directory` once it has settled. `Ok(None)` means
    /// it was still changing.
    fn place(&self, candidate: &Candidate, directory: &Path) -> Result<Option<PathBuf>, Placement> {
        fs::create_dir_all(directory).map_err(|source| {
            Placement::Failed(MoveError::DirectoryCreationFailed {
                path: directory.to_path_buf(),
                source,
            })
        })?;

        let final_path = resolve_name(directory, &candidate.name);

        match self.stability.wait(&candidate.path) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Placement::Vanished),
            Err(source) => {
                return Err(Placement::Failed(MoveError::StabilityCheck {
                    path: candidate.path.clone(),
                    source,
                }));
            }
        }

        match relocate(&candidate.path, &final_path) {
            Ok(()) => Ok(Some(final_path)),
            Err(error) => Err(Placement::from_move_error(error, &candidate.path)),
        }
    }
}

enum Placement {
    Vanished,
    Failed(MoveError),
}

impl Placement {
    /// A move that failed because another handler took the file first is a
    /// vanished file, not a failure.
    fn from_move_error(error: MoveError, source_path: &Path) -> Self {
        let lost_race = match &error {
            MoveError::FileMoveFailure { source, .. } => source.kind() == io::ErrorKind::NotFound,
            MoveError::DestinationTaken { .. } => true,
            _ => false,
        };
        if lost_race && !source_path.exists() {
            Placement::Vanished
        } else {
            Placement::Failed(error)
        }
    }
}

/// Moves `from` to `to` without replacing an existing file.
///
/// A plain rename is used on the same volume. Across volumes the file is
/// copied into a newly created destination and the source removed once the
/// copy is complete.
pub fn relocate(from: &Path, to: &Path) -> Result<(), MoveError> {
    if to.symlink_metadata().is_ok() {
        return Err(MoveError::DestinationTaken {
            path: to.to_path_buf(),
        });
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), to = %to.display(), "rename crosses devices, copying instead");
            copy_then_remove(from, to).map_err(|source| {
                if source.kind() == io::ErrorKind::AlreadyExists {
                    MoveError::DestinationTaken {
                        path: to.to_path_buf(),
                    }
                } else {
                    MoveError::FileMoveFailure {
                        from: from.to_path_buf(),
                        to: to.to_path_buf(),
                        source,
                    }
                }
            })
        }
        Err(source) => Err(MoveError::FileMoveFailure {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }),
    }
}

fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    let mut reader = File::open(from)?;
    let mut writer = OpenOptions::new().write(true).create_new(true).open(to)?;

    let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    drop(writer);
    discard_on_error(to, copied)?;

    let permissions = reader
        .metadata()
        .and_then(|metadata| fs::set_permissions(to, metadata.permissions()));
    discard_on_error(to, permissions)?;
    discard_on_error(to, fs::remove_file(from))
}

/// Removes the copy at `to` if `result` failed, so a failed move never
/// leaves a second copy of the file behind.
fn discard_on_error<T>(to: &Path, result: io::Result<T>) -> io::Result<T> {
    if result.is_err()
        && let Err(cleanup) = fs::remove_file(to)
    {
        warn!(path = %to.display(), error = %cleanup, "Failed to remove incomplete copy");
    }
    result
}
