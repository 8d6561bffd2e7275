//! Command-line interface module for autosort.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing
//! - The interactive watch session and its console commands
//! - One-shot sweeps, with a dry-run plan
//! - Classifying file names without touching anything

use crate::collaborators::{DecisionPrompt, NoPrompt, PromptError};
use crate::config::{ConfigError, Settings};
use crate::controller::{Collaborators, Controller, Engine};
use crate::file_category::Candidate;
use crate::output::{ConsoleNotifier, ConsoleProgress, ConsoleSurface, OutputFormatter};
use crate::routing::Route;
use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use std::io::{self, BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Watch a downloads folder and sort new files into category folders.
#[derive(Debug, Parser)]
#[command(name = "autosort", version, about)]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Category document (JSON), overrides the settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub categories: Option<PathBuf>,

    /// Folder to sort, overrides the settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sort existing files, then keep watching for new ones (default)
    Watch {
        /// Run without console commands or prompts
        #[arg(long)]
        no_input: bool,
    },
    /// Sort the files currently in the folder once
    Sweep {
        /// Show what would be moved without moving anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show where file names would be sorted
    Classify {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },
}

impl Cli {
    /// Loads settings and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit settings file is missing or any
    /// settings file is malformed.
    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(source) = &self.source {
            settings.paths.source = Some(source.clone());
        }
        if let Some(categories) = &self.categories {
            settings.paths.categories_file = Some(categories.clone());
        }
        Ok(settings)
    }
}

/// Runs the parsed command with already loaded settings.
///
/// # Examples
///
/// ```no_run
/// use autosort::cli::{Cli, run_cli};
/// use clap::Parser;
///
/// let cli = Cli::parse_from(["autosort", "sweep", "--dry-run"]);
/// let settings = cli.load_settings().unwrap();
/// if let Err(e) = run_cli(&cli, settings) {
///     eprintln!("Error: {e:#}");
/// }
/// ```
pub fn run_cli(cli: &Cli, settings: Settings) -> anyhow::Result<()> {
    match cli.command.clone().unwrap_or(Command::Watch { no_input: false }) {
        Command::Watch { no_input } => watch(cli, settings, no_input),
        Command::Sweep { dry_run: true } => sweep_dry_run(&settings),
        Command::Sweep { dry_run: false } => sweep(&settings),
        Command::Classify { names } => classify(&settings, &names),
    }
}

fn console_collaborators(prompt: Arc<dyn DecisionPrompt>) -> Collaborators {
    Collaborators {
        notifier: Arc::new(ConsoleNotifier),
        progress: Arc::new(ConsoleProgress::new()),
        prompt,
    }
}

fn watch(cli: &Cli, settings: Settings, no_input: bool) -> anyhow::Result<()> {
    let console = if no_input {
        None
    } else {
        Some(ConsoleInput::start().context("Failed to read console input")?)
    };
    let prompt: Arc<dyn DecisionPrompt> = match &console {
        Some(console) => Arc::new(ConsolePrompt::new(
            console.answers(),
            settings.sorting.secondary_folder.clone(),
            settings.sorting.prompt_timeout(),
        )),
        None => Arc::new(NoPrompt),
    };
    let collaborators = console_collaborators(prompt);

    let engine = Engine::load(&settings, &collaborators).context("Failed to prepare the sorter")?;
    OutputFormatter::info(&format!(
        "Sorting {} into {}",
        engine.source().display(),
        settings
            .paths
            .destination_root
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "the Desktop".to_string())
    ));
    let mut controller = Controller::new(engine, Arc::new(ConsoleSurface));
    start(&mut controller);

    let Some(console) = console else {
        wait_forever();
    };
    print_help();

    loop {
        match console.commands.recv() {
            Ok(ConsoleCommand::Start) => start(&mut controller),
            Ok(ConsoleCommand::Stop) => controller.on_stop(),
            Ok(ConsoleCommand::Sweep) => {
                if let Some(summary) = controller.run_sweep() {
                    OutputFormatter::sweep_summary(&summary);
                }
            }
            Ok(ConsoleCommand::Reload) => reload(cli, &mut controller, &collaborators),
            Ok(ConsoleCommand::Status) => print_status(&controller),
            Ok(ConsoleCommand::Help) => print_help(),
            Ok(ConsoleCommand::Unknown(input)) => {
                OutputFormatter::warning(&format!("Unknown command '{input}'. Type 'help'."));
            }
            Ok(ConsoleCommand::Quit) => break,
            Err(_) => {
                debug!("console input closed, running without commands");
                wait_forever();
            }
        }
    }

    controller.on_quit();
    Ok(())
}

fn start(controller: &mut Controller) {
    if let Err(e) = controller.on_start() {
        error!(error = %e, "Could not start watching");
        OutputFormatter::error(&format!("Could not start watching: {e}"));
    }
}

fn reload(cli: &Cli, controller: &mut Controller, collaborators: &Collaborators) {
    let engine = cli
        .load_settings()
        .map_err(anyhow::Error::from)
        .and_then(|settings| Engine::load(&settings, collaborators).map_err(anyhow::Error::from));
    match engine {
        Ok(engine) => {
            if let Err(e) = controller.reload(engine) {
                OutputFormatter::error(&format!("Reloaded, but could not restart watching: {e}"));
            } else {
                OutputFormatter::success("Configuration reloaded");
            }
        }
        Err(e) => {
            warn!(error = %e, "Reload failed, keeping the current configuration");
            OutputFormatter::error(&format!("Reload failed: {e:#}"));
        }
    }
}

fn print_status(controller: &Controller) {
    let state = if controller.is_watching() {
        "watching".green()
    } else {
        "stopped".yellow()
    };
    OutputFormatter::plain(&format!(
        "{} {}",
        state.bold(),
        controller.engine().source().display()
    ));
    let table = controller.engine().organizer().router().table();
    for category in table.categories() {
        let extensions: Vec<&str> = category.extensions().iter().map(String::as_str).collect();
        OutputFormatter::plain(&format!("  {:<12} {}", category.name(), extensions.join(" ")));
    }
}

fn print_help() {
    OutputFormatter::plain(&format!(
        "{} start | stop | sweep | reload | status | help | quit",
        "Commands:".bold()
    ));
}

fn wait_forever() -> ! {
    loop {
        thread::park();
    }
}

fn sweep(settings: &Settings) -> anyhow::Result<()> {
    let collaborators = console_collaborators(Arc::new(NoPrompt));
    let engine = Engine::load(settings, &collaborators).context("Failed to prepare the sorter")?;
    let summary = engine
        .batch()
        .run_batch_sweep(engine.source())
        .with_context(|| format!("Could not sort {}", engine.source().display()))?;
    OutputFormatter::sweep_summary(&summary);
    Ok(())
}

fn sweep_dry_run(settings: &Settings) -> anyhow::Result<()> {
    let engine = Engine::load(settings, &Collaborators::silent())
        .context("Failed to prepare the sorter")?;
    let source = engine.source();
    OutputFormatter::dry_run_notice(&format!("Analyzing contents of: {}", source.display()));

    let plan = engine
        .batch()
        .plan(source)
        .with_context(|| format!("Could not read {}", source.display()))?;

    if plan.is_empty() {
        OutputFormatter::info("No files found to sort.");
    } else {
        OutputFormatter::header("Files would be sorted as follows:");
        for planned in &plan.moves {
            OutputFormatter::plain(&format!(" - {}", planned.name));
            OutputFormatter::plain(&format!(
                "   → Would move to {}/",
                planned.destination.directory.display()
            ));
        }
    }
    if !plan.left_in_place.is_empty() {
        OutputFormatter::header("Left in place:");
        for (name, reason) in &plan.left_in_place {
            OutputFormatter::plain(&format!(" - {} ({})", name, reason.to_string().dimmed()));
        }
    }

    if !plan.is_empty() {
        OutputFormatter::summary_table(&plan.category_counts(), plan.total());
    }
    OutputFormatter::success("Dry run complete. No files were modified.");
    Ok(())
}

fn classify(settings: &Settings, names: &[String]) -> anyhow::Result<()> {
    let engine = Engine::load(settings, &Collaborators::silent())
        .context("Failed to prepare the sorter")?;
    let router = engine.organizer().router();

    for name in names {
        let Some(candidate) = Candidate::from_path(Path::new(name)) else {
            OutputFormatter::warning(&format!("'{name}' is not a file name"));
            continue;
        };
        match router.route(&candidate, false) {
            Route::To(destination) => OutputFormatter::plain(&format!(
                "{} → {} ({})",
                candidate.name,
                destination.category.green(),
                destination.directory.display()
            )),
            Route::Skip(reason) => OutputFormatter::plain(&format!(
                "{} → {}",
                candidate.name,
                reason.to_string().yellow()
            )),
        }
    }
    Ok(())
}

/// A line typed at the console during a watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Sweep,
    Reload,
    Status,
    Help,
    Quit,
    Unknown(String),
}

impl FromStr for ConsoleCommand {
    type Err = std::convert::Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(match input.trim().to_lowercase().as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "sweep" | "sort" => Self::Sweep,
            "reload" => Self::Reload,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Where the next console line goes when a prompt is waiting for it.
type AnswerSlot = Arc<Mutex<Option<Sender<String>>>>;

/// Reads stdin on a background thread. Lines answer a pending prompt if
/// there is one and are parsed as commands otherwise.
struct ConsoleInput {
    commands: Receiver<ConsoleCommand>,
    answers: AnswerSlot,
}

impl ConsoleInput {
    fn start() -> io::Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let answers: AnswerSlot = Arc::default();
        let slot = Arc::clone(&answers);
        let interactive = io::stdin().is_terminal();

        thread::Builder::new()
            .name("autosort-stdin".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    let waiting = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
                    if let Some(answer_tx) = waiting {
                        let _ = answer_tx.send(line);
                        continue;
                    }
                    if line.trim().is_empty() {
                        continue;
                    }
                    let Ok(command) = line.parse::<ConsoleCommand>();
                    if command_tx.send(command).is_err() {
                        return;
                    }
                }
                // Ctrl-D at a terminal quits; a closed pipe just ends input.
                if interactive {
                    let _ = command_tx.send(ConsoleCommand::Quit);
                }
            })?;

        Ok(Self {
            commands: command_rx,
            answers,
        })
    }

    fn answers(&self) -> AnswerSlot {
        Arc::clone(&self.answers)
    }
}

/// Asks on the console whether a file belongs in the secondary folder.
pub struct ConsolePrompt {
    answers: AnswerSlot,
    folder_name: String,
    timeout: Duration,
    turn: Mutex<()>,
}

impl ConsolePrompt {
    fn new(answers: AnswerSlot, folder_name: String, timeout: Duration) -> Self {
        Self {
            answers,
            folder_name,
            timeout,
            turn: Mutex::new(()),
        }
    }
}

impl DecisionPrompt for ConsolePrompt {
    fn confirm_secondary(&self, file_name: &str) -> Result<bool, PromptError> {
        // One question at a time.
        let _turn = self.turn.lock().unwrap_or_else(PoisonError::into_inner);

        let (answer_tx, answer_rx) = bounded(1);
        *self.answers.lock().unwrap_or_else(PoisonError::into_inner) = Some(answer_tx);
        println!(
            "{} Move \"{}\" to {}? [y/N]",
            "?".yellow().bold(),
            file_name,
            self.folder_name
        );

        let answer = answer_rx.recv_timeout(self.timeout);
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match answer {
            Ok(line) => Ok(is_yes(&line)),
            Err(RecvTimeoutError::Timeout) => Err(PromptError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(PromptError::Dismissed),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_default_command_is_watch() {
        let cli = Cli::try_parse_from(["autosort"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "autosort",
            "sweep",
            "--dry-run",
            "--source",
            "/tmp/inbox",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Command::Sweep { dry_run: true }));
        assert_eq!(cli.source, Some(PathBuf::from("/tmp/inbox")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_classify_requires_names() {
        assert!(Cli::try_parse_from(["autosort", "classify"]).is_err());
        let cli = Cli::try_parse_from(["autosort", "classify", "a.pdf", "b.zip"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Classify {
                names: vec!["a.pdf".to_string(), "b.zip".to_string()]
            })
        );
    }

    #[test]
    fn test_load_settings_applies_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("autosort.toml");
        std::fs::write(&config, "[paths]\nsource = \"/from/file\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "autosort",
            "--config",
            config.to_str().unwrap(),
            "--source",
            "/from/flag",
            "--categories",
            "/etc/types.json",
        ])
        .unwrap();
        let settings = cli.load_settings().unwrap();

        assert_eq!(settings.paths.source, Some(PathBuf::from("/from/flag")));
        assert_eq!(
            settings.paths.categories_file,
            Some(PathBuf::from("/etc/types.json"))
        );
    }

    #[test]
    fn test_console_commands() {
        let parse = |s: &str| s.parse::<ConsoleCommand>().unwrap();
        assert_eq!(parse("start"), ConsoleCommand::Start);
        assert_eq!(parse("  STOP "), ConsoleCommand::Stop);
        assert_eq!(parse("q"), ConsoleCommand::Quit);
        assert_eq!(parse("dance"), ConsoleCommand::Unknown("dance".to_string()));
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES\n"));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
    }

    #[test]
    fn test_prompt_receives_answer() {
        let answers: AnswerSlot = Arc::default();
        let prompt = ConsolePrompt::new(Arc::clone(&answers), "Memes".to_string(), Duration::from_secs(5));

        let responder = thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if let Some(tx) = answers.lock().unwrap().clone() {
                    tx.send("y".to_string()).unwrap();
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
        });

        assert_eq!(prompt.confirm_secondary("funny.jpg"), Ok(true));
        responder.join().unwrap();
    }

    #[test]
    fn test_prompt_times_out() {
        let prompt = ConsolePrompt::new(Arc::default(), "Memes".to_string(), Duration::from_millis(20));
        assert_eq!(
            prompt.confirm_secondary("cat.jpg"),
            Err(PromptError::TimedOut)
        );
        assert!(prompt.answers.lock().unwrap().is_none());
    }
}
