/// Integration tests for autosort
///
/// These tests simulate real-world usage scenarios, testing the complete
/// end-to-end behavior of sorting a downloads folder.
///
/// Test categories:
/// 1. Single-file moves
/// 2. Batch sweeps and progress reporting
/// 3. The ambiguous category and its prompt
/// 4. Configuration and filtering
/// 5. Controller lifecycle
use autosort::collaborators::{
    DecisionPrompt, HeadlessSurface, NoPrompt, Notifier, ProgressReporter, PromptError,
    SilentNotifier, SilentProgress,
};
use autosort::config::{ExcludeRules, FilterRules, Settings};
use autosort::controller::{Collaborators, Controller, Engine};
use autosort::file_category::{Category, CategoryTable};
use autosort::file_organizer::{FileOrganizer, MoveOutcome};
use autosort::routing::{FolderLayout, Router, SecondaryRoute, SkipReason};
use autosort::stability::StabilityPolicy;
use autosort::BatchCoordinator;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// A test fixture with a source (inbox) folder and a destination root.
struct TestFixture {
    source: TempDir,
    destination: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with two temporary directories.
    fn new() -> Self {
        TestFixture {
            source: TempDir::new().expect("Failed to create temp directory"),
            destination: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    fn source(&self) -> &Path {
        self.source.path()
    }

    fn destination(&self) -> &Path {
        self.destination.path()
    }

    /// Create a file with content in the source directory.
    fn create_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let file_path = self.source().join(name);
        let mut file = File::create(&file_path).expect("Failed to create file");
        file.write_all(content)
            .expect("Failed to write file content");
        file_path
    }

    /// Assert that a file exists under the destination root.
    fn assert_sorted(&self, rel_path: &str) {
        let path = self.destination().join(rel_path);
        assert!(
            path.is_file(),
            "File should exist: {}",
            path.display()
        );
    }

    /// Assert that a file is still in the source directory.
    fn assert_in_source(&self, name: &str) {
        let path = self.source().join(name);
        assert!(path.is_file(), "File should still be in source: {}", path.display());
    }

    fn assert_not_in_source(&self, name: &str) {
        let path = self.source().join(name);
        assert!(!path.exists(), "File should not exist: {}", path.display());
    }

    fn read_sorted(&self, rel_path: &str) -> Vec<u8> {
        fs::read(self.destination().join(rel_path)).expect("Failed to read sorted file")
    }

    /// Names of the folders created under the destination root.
    fn destination_folders(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.destination())
            .expect("Failed to read directory")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn organizer(&self, table: CategoryTable) -> FileOrganizer {
        FileOrganizer::new(
            Router::new(table, FolderLayout::new(self.destination())),
            StabilityPolicy::immediate(),
            Arc::new(SilentNotifier),
        )
    }

    /// Organizer with the Media/Memes split answered by `prompt`.
    fn organizer_with_prompt(
        &self,
        table: CategoryTable,
        prompt: Arc<dyn DecisionPrompt>,
    ) -> FileOrganizer {
        let router = Router::new(table, FolderLayout::new(self.destination())).with_secondary(
            SecondaryRoute {
                category: "Media".to_string(),
                folder_name: "Memes".to_string(),
                enabled: true,
            },
            prompt,
        );
        FileOrganizer::new(router, StabilityPolicy::immediate(), Arc::new(SilentNotifier))
    }

    fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.paths.source = Some(self.source().to_path_buf());
        settings.paths.destination_root = Some(self.destination().to_path_buf());
        settings.sorting.stable_for_ms = 0;
        settings.sorting.poll_interval_ms = 1;
        settings.watch.debounce_ms = 0;
        settings.watch.recursive = false;
        settings
    }
}

fn table(categories: &[(&str, &[&str])], skip: &[&str]) -> CategoryTable {
    CategoryTable::new(
        categories
            .iter()
            .map(|(name, exts)| Category::new(*name, exts.iter()))
            .collect(),
        skip.iter(),
    )
}

#[derive(Debug, Clone, PartialEq)]
enum ProgressEvent {
    Begin(usize),
    Update(usize, usize, String),
    Complete(String),
}

/// Records every progress call. Optionally runs a hook on the first update
/// after a file was processed.
#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl RecordingProgress {
    fn with_hook(hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            events: Mutex::default(),
            hook: Mutex::new(Some(Box::new(hook))),
        }
    }

    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    fn last_update(&self) -> Option<(usize, usize)> {
        self.events().iter().rev().find_map(|event| match event {
            ProgressEvent::Update(done, total, _) => Some((*done, *total)),
            _ => None,
        })
    }
}

impl ProgressReporter for RecordingProgress {
    fn begin(&self, _status: &str, total: usize) {
        self.events.lock().unwrap().push(ProgressEvent::Begin(total));
    }

    fn update(&self, done: usize, total: usize, status: &str) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::Update(done, total, status.to_string()));
        if done == 1
            && let Some(hook) = self.hook.lock().unwrap().take()
        {
            hook();
        }
    }

    fn complete(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::Complete(message.to_string()));
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str, _reveal: Option<&Path>) {
        self.messages
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Prompt stub with a fixed answer that counts how often it was asked.
struct FixedPrompt {
    answer: bool,
    asked: AtomicUsize,
}

impl FixedPrompt {
    fn answering(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            asked: AtomicUsize::new(0),
        })
    }

    fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl DecisionPrompt for FixedPrompt {
    fn confirm_secondary(&self, _file_name: &str) -> Result<bool, PromptError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

fn coordinator(
    organizer: FileOrganizer,
    progress: Arc<dyn ProgressReporter>,
    notifier: Arc<dyn Notifier>,
) -> BatchCoordinator {
    BatchCoordinator::new(Arc::new(organizer), progress, notifier)
}

// ============================================================================
// Single-file moves
// ============================================================================

#[test]
fn test_move_single_file_keeps_bytes() {
    let fixture = TestFixture::new();
    let content = b"first line\nsecond line\n\x00\xff";
    let path = fixture.create_file("note.txt", content);

    let organizer = fixture.organizer(table(&[("Docs", &[".txt"])], &[]));
    let outcome = organizer.move_file(&path, None);

    assert!(outcome.is_moved());
    fixture.assert_not_in_source("note.txt");
    fixture.assert_sorted("Docs/note.txt");
    assert_eq!(fixture.read_sorted("Docs/note.txt"), content);
}

#[test]
fn test_move_into_occupied_name_keeps_both() {
    let fixture = TestFixture::new();
    fs::create_dir(fixture.destination().join("Docs")).unwrap();
    fs::write(fixture.destination().join("Docs/note.txt"), b"already sorted").unwrap();
    let path = fixture.create_file("note.txt", b"fresh download");

    let organizer = fixture.organizer(table(&[("Docs", &[".txt"])], &[]));
    let outcome = organizer.move_file(&path, None);

    assert_eq!(
        outcome.moved_path(),
        Some(fixture.destination().join("Docs/note_(1).txt").as_path())
    );
    fixture.assert_not_in_source("note.txt");
    assert_eq!(fixture.read_sorted("Docs/note.txt"), b"already sorted");
    assert_eq!(fixture.read_sorted("Docs/note_(1).txt"), b"fresh download");
}

#[test]
fn test_secondary_folder_follows_prompt_answer() {
    let fixture = TestFixture::new();
    let media = table(&[("Media", &[".jpg"])], &[]);

    let yes = FixedPrompt::answering(true);
    let path = fixture.create_file("funny.jpg", b"lol");
    let outcome = fixture
        .organizer_with_prompt(media.clone(), yes.clone())
        .move_file(&path, None);
    assert!(outcome.is_moved());
    fixture.assert_sorted("Media/Memes/funny.jpg");
    assert_eq!(yes.times_asked(), 1);

    let no = FixedPrompt::answering(false);
    let path = fixture.create_file("holiday.jpg", b"beach");
    let outcome = fixture
        .organizer_with_prompt(media, no.clone())
        .move_file(&path, None);
    assert!(outcome.is_moved());
    fixture.assert_sorted("Media/holiday.jpg");
    assert!(!fixture.destination().join("Media/Memes/holiday.jpg").exists());
    assert_eq!(no.times_asked(), 1);
}

#[test]
fn test_unavailable_prompt_uses_primary_folder() {
    let fixture = TestFixture::new();
    let path = fixture.create_file("cat.jpg", b"meow");

    let outcome = fixture
        .organizer_with_prompt(table(&[("Media", &[".jpg"])], &[]), Arc::new(NoPrompt))
        .move_file(&path, None);

    assert!(outcome.is_moved());
    fixture.assert_sorted("Media/cat.jpg");
}

#[test]
fn test_unclassified_file_stays_put() {
    let fixture = TestFixture::new();
    let path = fixture.create_file("mystery.xyz", b"???");
    let organizer = fixture.organizer(table(&[("Docs", &[".txt"])], &[]));

    let outcome = organizer.move_file(&path, None);
    assert!(matches!(
        outcome,
        MoveOutcome::Skipped(SkipReason::Unclassified)
    ));

    let summary = coordinator(organizer, Arc::new(SilentProgress), Arc::new(SilentNotifier))
        .run_batch_sweep(fixture.source())
        .unwrap();
    assert_eq!(summary.total, 0);

    fixture.assert_in_source("mystery.xyz");
    assert!(fixture.destination_folders().is_empty());
}

// ============================================================================
// Batch sweeps
// ============================================================================

#[test]
fn test_batch_total_is_fixed_at_scan_time() {
    let fixture = TestFixture::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        fixture.create_file(name, name.as_bytes());
    }

    let late_arrival = fixture.source().join("d.txt");
    let progress = Arc::new(RecordingProgress::with_hook(move || {
        fs::write(&late_arrival, b"too late").unwrap();
    }));
    let summary = coordinator(
        fixture.organizer(table(&[("Docs", &[".txt"])], &[])),
        progress.clone(),
        Arc::new(SilentNotifier),
    )
    .run_batch_sweep(fixture.source())
    .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.done, 3);
    assert_eq!(progress.last_update(), Some((3, 3)));
    fixture.assert_in_source("d.txt");

    let events = progress.events();
    assert_eq!(events.first(), Some(&ProgressEvent::Begin(3)));
    assert_eq!(
        events.get(1),
        Some(&ProgressEvent::Update(0, 3, "Starting…".to_string()))
    );
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Complete("Batch complete".to_string()))
    );
}

#[test]
fn test_batch_never_prompts_for_ambiguous_category() {
    let fixture = TestFixture::new();
    fixture.create_file("one.jpg", b"1");
    fixture.create_file("two.jpg", b"2");
    let prompt = FixedPrompt::answering(true);

    let summary = coordinator(
        fixture.organizer_with_prompt(table(&[("Media", &[".jpg"])], &[]), prompt.clone()),
        Arc::new(SilentProgress),
        Arc::new(SilentNotifier),
    )
    .run_batch_sweep(fixture.source())
    .unwrap();

    assert_eq!(summary.moved.len(), 2);
    assert_eq!(prompt.times_asked(), 0);
    fixture.assert_sorted("Media/one.jpg");
    fixture.assert_sorted("Media/two.jpg");
    assert!(!fixture.destination().join("Media/Memes").exists());
}

#[test]
fn test_batch_leaves_skip_listed_files_untouched() {
    let fixture = TestFixture::new();
    fixture.create_file("movie.mkv.part", b"half a movie");
    fixture.create_file("setup.crdownload", b"in progress");
    fixture.create_file("readme.txt", b"done");

    // ".part" is also listed as a document; the skip list still wins.
    let summary = coordinator(
        fixture.organizer(table(
            &[("Docs", &[".txt", ".part"])],
            &[".part", ".crdownload"],
        )),
        Arc::new(SilentProgress),
        Arc::new(SilentNotifier),
    )
    .run_batch_sweep(fixture.source())
    .unwrap();

    assert_eq!(summary.moved, ["readme.txt"]);
    fixture.assert_in_source("movie.mkv.part");
    fixture.assert_in_source("setup.crdownload");
    assert_eq!(
        fs::read(fixture.source().join("movie.mkv.part")).unwrap(),
        b"half a movie"
    );
}

#[test]
fn test_batch_summary_notification() {
    let fixture = TestFixture::new();
    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        fixture.create_file(name, b"x");
    }
    let notifier = Arc::new(RecordingNotifier::default());

    coordinator(
        fixture.organizer(table(&[("Docs", &[".txt"])], &[])),
        Arc::new(SilentProgress),
        notifier.clone(),
    )
    .run_batch_sweep(fixture.source())
    .unwrap();

    let messages = notifier.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "Files moved:");
    assert_eq!(
        messages[0].1,
        "- a.txt...\n- b.txt...\n- c.txt...\n...and 2 more"
    );
}

#[test]
fn test_batch_ignores_subdirectories() {
    let fixture = TestFixture::new();
    fs::create_dir(fixture.source().join("projects.txt")).unwrap();
    fs::write(fixture.source().join("projects.txt/inner.txt"), b"nested").unwrap();
    fixture.create_file("top.txt", b"top");

    let summary = coordinator(
        fixture.organizer(table(&[("Docs", &[".txt"])], &[])),
        Arc::new(SilentProgress),
        Arc::new(SilentNotifier),
    )
    .run_batch_sweep(fixture.source())
    .unwrap();

    assert_eq!(summary.moved, ["top.txt"]);
    assert!(fixture.source().join("projects.txt/inner.txt").exists());
}

#[test]
fn test_dry_run_plan_moves_nothing() {
    let fixture = TestFixture::new();
    fixture.create_file("report.pdf", b"%PDF");
    fixture.create_file("photo.jpg", b"jpg");
    fixture.create_file("notes.unknown", b"?");

    let batch = coordinator(
        fixture.organizer(table(
            &[("Docs", &[".pdf"]), ("Media", &[".jpg"])],
            &[],
        )),
        Arc::new(SilentProgress),
        Arc::new(SilentNotifier),
    );
    let plan = batch.plan(fixture.source()).unwrap();

    assert_eq!(plan.total(), 2);
    assert_eq!(plan.category_counts().get("Docs"), Some(&1));
    assert_eq!(plan.category_counts().get("Media"), Some(&1));
    assert_eq!(
        plan.left_in_place,
        vec![("notes.unknown".to_string(), SkipReason::Unclassified)]
    );
    fixture.assert_in_source("report.pdf");
    fixture.assert_in_source("photo.jpg");
    assert!(fixture.destination_folders().is_empty());
}

#[test]
fn test_sweep_then_add_files_then_sweep_again() {
    let fixture = TestFixture::new();
    fixture.create_file("first.txt", b"1");
    let batch = coordinator(
        fixture.organizer(table(&[("Docs", &[".txt"])], &[])),
        Arc::new(SilentProgress),
        Arc::new(SilentNotifier),
    );

    batch.run_batch_sweep(fixture.source()).unwrap();
    fixture.create_file("first.txt", b"2");
    let summary = batch.run_batch_sweep(fixture.source()).unwrap();

    assert_eq!(summary.moved, ["first_(1).txt"]);
    assert_eq!(fixture.read_sorted("Docs/first.txt"), b"1");
    assert_eq!(fixture.read_sorted("Docs/first_(1).txt"), b"2");
}

// ============================================================================
// Configuration and filtering
// ============================================================================

#[test]
fn test_engine_loads_category_document() {
    let fixture = TestFixture::new();
    let categories = fixture.destination().join("file_types.json");
    fs::write(
        &categories,
        r#"{
            "_meta": {"version": 2},
            "Books": ["EPUB", ".mobi"],
            "Docs": [".txt"],
            "SkipExtensions": [".tmp"]
        }"#,
    )
    .unwrap();
    fixture.create_file("novel.epub", b"once upon a time");
    fixture.create_file("scratch.tmp", b"temp");

    let mut settings = fixture.settings();
    settings.paths.categories_file = Some(categories);
    let engine = Engine::load(&settings, &Collaborators::silent()).unwrap();
    let summary = engine.batch().run_batch_sweep(engine.source()).unwrap();

    assert_eq!(summary.moved, ["novel.epub"]);
    fixture.assert_sorted("Books/novel.epub");
    fixture.assert_in_source("scratch.tmp");
}

#[test]
fn test_malformed_category_document_uses_builtin_table() {
    let fixture = TestFixture::new();
    let categories = fixture.destination().join("broken.json");
    fs::write(&categories, "{ not json").unwrap();
    fixture.create_file("slides.pptx", b"deck");
    fixture.create_file("installer.exe", b"MZ");

    let mut settings = fixture.settings();
    settings.paths.categories_file = Some(categories);
    let engine = Engine::load(&settings, &Collaborators::silent()).unwrap();
    engine.batch().run_batch_sweep(engine.source()).unwrap();

    fixture.assert_sorted("Docs/slides.pptx");
    fixture.assert_sorted("Programs/installer.exe");
}

#[test]
fn test_ignore_rules_skip_matching_files() {
    let fixture = TestFixture::new();
    fixture.create_file("invoice.pdf", b"pay");
    fixture.create_file("draft-invoice.pdf", b"not yet");
    fixture.create_file(".hidden.pdf", b"secret");

    let mut settings = fixture.settings();
    settings.filters = FilterRules {
        enable_hidden_files: false,
        exclude: ExcludeRules {
            patterns: vec!["draft-*".to_string()],
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = Engine::build(
        &settings,
        table(&[("Docs", &[".pdf"])], &[]),
        &Collaborators::silent(),
    )
    .unwrap();
    let plan = engine.batch().plan(engine.source()).unwrap();
    assert_eq!(
        plan.left_in_place,
        vec![
            (".hidden.pdf".to_string(), SkipReason::Ignored),
            ("draft-invoice.pdf".to_string(), SkipReason::Ignored),
        ]
    );

    engine.batch().run_batch_sweep(engine.source()).unwrap();
    fixture.assert_sorted("Docs/invoice.pdf");
    fixture.assert_in_source("draft-invoice.pdf");
    fixture.assert_in_source(".hidden.pdf");
}

#[test]
fn test_hidden_files_are_sorted_by_default() {
    let fixture = TestFixture::new();
    fixture.create_file(".notes.pdf", b"dotfile");

    let engine = Engine::build(
        &fixture.settings(),
        table(&[("Docs", &[".pdf"])], &[]),
        &Collaborators::silent(),
    )
    .unwrap();
    engine.batch().run_batch_sweep(engine.source()).unwrap();

    fixture.assert_sorted("Docs/.notes.pdf");
    fixture.assert_not_in_source(".notes.pdf");
}

#[test]
fn test_settings_file_drives_destinations() {
    let fixture = TestFixture::new();
    let config_path = fixture.destination().join("autosort.toml");
    let installers = fixture.destination().join("Installers");
    fs::write(
        &config_path,
        format!(
            r#"
[paths]
source = "{}"
destination_root = "{}"

[paths.destinations]
Programs = "{}"

[sorting]
stable_for_ms = 0
poll_interval_ms = 1
"#,
            fixture.source().display(),
            fixture.destination().display(),
            installers.display()
        ),
    )
    .unwrap();
    fixture.create_file("tool.msi", b"msi");

    let settings = Settings::load(Some(&config_path)).unwrap();
    let engine = Engine::build(&settings, CategoryTable::builtin(), &Collaborators::silent())
        .unwrap();
    engine.batch().run_batch_sweep(engine.source()).unwrap();

    assert!(installers.join("tool.msi").exists());
}

// ============================================================================
// Controller lifecycle
// ============================================================================

#[test]
fn test_controller_file_event_moves_file() {
    let fixture = TestFixture::new();
    let mut settings = fixture.settings();
    settings.watch.sweep_on_start = false;
    let prompt = FixedPrompt::answering(true);
    let collaborators = Collaborators {
        notifier: Arc::new(SilentNotifier),
        progress: Arc::new(SilentProgress),
        prompt: prompt.clone(),
    };
    let engine = Engine::build(
        &settings,
        table(&[("Docs", &[".txt"]), ("Media", &[".jpg"])], &[".part"]),
        &collaborators,
    )
    .unwrap();
    let controller = Controller::new(engine, Arc::new(HeadlessSurface));

    let meme = fixture.create_file("meme.jpg", b"haha");
    let partial = fixture.create_file("big.iso.part", b"...");

    assert!(controller.on_file_changed(&meme, false).is_moved());
    assert!(matches!(
        controller.on_file_changed(&partial, false),
        MoveOutcome::Skipped(SkipReason::SkipExtension)
    ));
    assert!(matches!(
        controller.on_file_changed(&fixture.source().join("gone.txt"), false),
        MoveOutcome::Skipped(SkipReason::Vanished)
    ));

    fixture.assert_sorted("Media/Memes/meme.jpg");
    fixture.assert_in_source("big.iso.part");
    assert_eq!(prompt.times_asked(), 1);
}

#[test]
fn test_controller_start_sweeps_existing_files() {
    let fixture = TestFixture::new();
    fixture.create_file("waiting.txt", b"been here a while");
    let swept = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&swept);
    let progress = Arc::new(RecordingProgress::with_hook(move || {
        flag.store(true, Ordering::SeqCst);
    }));
    let collaborators = Collaborators {
        notifier: Arc::new(SilentNotifier),
        progress: progress.clone(),
        prompt: Arc::new(NoPrompt),
    };
    let engine = Engine::build(
        &fixture.settings(),
        table(&[("Docs", &[".txt"])], &[]),
        &collaborators,
    )
    .unwrap();
    let mut controller = Controller::new(engine, Arc::new(HeadlessSurface));

    controller.on_start().unwrap();
    assert!(controller.is_watching());
    assert!(swept.load(Ordering::SeqCst));
    fixture.assert_sorted("Docs/waiting.txt");

    controller.on_stop();
    assert!(!controller.is_watching());
    controller.on_quit();
}
