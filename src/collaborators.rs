//! Interfaces to the outside world: notifications, batch progress, the
//! yes/no prompt for the ambiguous category, and the control surface.
//!
//! The engine only talks to these traits. Console implementations live in
//! [`crate::output`] and [`crate::cli`]; the `Silent*` types here do nothing
//! and are used for headless runs and tests.

use std::path::Path;

/// Fire-and-forget user notifications.
///
/// Implementations must return promptly; the mover calls this inline.
pub trait Notifier: Send + Sync {
    /// Shows a message. `reveal` is a file the user may want to open.
    fn notify(&self, title: &str, message: &str, reveal: Option<&Path>);
}

/// Receives progress updates from a batch sweep.
pub trait ProgressReporter: Send + Sync {
    fn begin(&self, status: &str, total: usize);
    fn update(&self, done: usize, total: usize, status: &str);
    fn complete(&self, message: &str);
}

/// Why the decision prompt produced no answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("no interactive prompt is available")]
    Unavailable,
    #[error("prompt was dismissed without an answer")]
    Dismissed,
    #[error("prompt timed out")]
    TimedOut,
}

/// Blocking yes/no question asked for files of the ambiguous category.
///
/// `Ok(true)` routes the file to the secondary folder. Any error routes it to
/// the primary folder.
pub trait DecisionPrompt: Send + Sync {
    fn confirm_secondary(&self, file_name: &str) -> Result<bool, PromptError>;
}

/// Whether the live watcher is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Watching,
    Stopped,
}

/// The control surface (tray menu or console) driven by the controller.
pub trait TraySurface: Send + Sync {
    /// Re-renders the start/stop/quit menu for the given state.
    fn rebuild_menu(&self, state: WatchState);
    /// Tears the surface down when the application quits.
    fn shutdown(&self);
}

/// Notifier that drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _title: &str, _message: &str, _reveal: Option<&Path>) {}
}

/// Progress reporter that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn begin(&self, _status: &str, _total: usize) {}
    fn update(&self, _done: usize, _total: usize, _status: &str) {}
    fn complete(&self, _message: &str) {}
}

/// Prompt for sessions without a user; always reports `Unavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl DecisionPrompt for NoPrompt {
    fn confirm_secondary(&self, _file_name: &str) -> Result<bool, PromptError> {
        Err(PromptError::Unavailable)
    }
}

/// Control surface with nothing to render.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSurface;

impl TraySurface for HeadlessSurface {
    fn rebuild_menu(&self, _state: WatchState) {}
    fn shutdown(&self) {}
}
