use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use metascribe_contracts::events::{session_id, EventLog};
use metascribe_contracts::markers::{parse_meta_actions, ActionKind};
use metascribe_contracts::settings::{
    load_settings, save_api_key, save_writing_profile, SettingsPaths,
};
use metascribe_engine::{
    DiagnosticsReporter, DocumentStore, FsDocumentStore, GeminiClient, MetaProcessor, Notifier,
    ProcessError,
};

#[derive(Debug, Parser)]
#[command(
    name = "metascribe",
    version,
    about = "Resolve @(type)[instruction] markers in notes with Gemini"
)]
struct Cli {
    /// Root directory of the document store.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store the Gemini API key in the store's key file.
    Configure(ConfigureArgs),
    /// Resolve every marker in a document and save it once.
    Process(DocumentArgs),
    /// Show or change the default writing profile.
    Profile(ProfileArgs),
    /// List the markers of a document without contacting Gemini.
    Scan(DocumentArgs),
}

#[derive(Debug, Parser)]
struct ConfigureArgs {
    /// Key to store; read from stdin when omitted.
    #[arg(long)]
    key: Option<String>,
}

#[derive(Debug, Parser)]
struct DocumentArgs {
    /// Document path, relative to the store root.
    document: String,
}

#[derive(Debug, Parser)]
struct ProfileArgs {
    #[arg(long)]
    set: Option<String>,
}

const EXIT_FAILURE: i32 = 1;
const EXIT_NEEDS_CONFIGURATION: i32 = 2;

struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, message: &str) {
        eprintln!("metascribe: {message}");
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("metascribe error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = SettingsPaths::for_root(&cli.root);
    match cli.command {
        Command::Configure(args) => run_configure(&paths, args),
        Command::Process(args) => run_process(&paths, args),
        Command::Profile(args) => run_profile(&paths, args),
        Command::Scan(args) => run_scan(&paths, args),
    }
}

fn run_configure(paths: &SettingsPaths, args: ConfigureArgs) -> Result<i32> {
    let key = match args.key {
        Some(key) => key,
        None => {
            eprintln!("Paste the Gemini API key and press Enter:");
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed reading API key from stdin")?;
            line
        }
    };
    if key.trim().is_empty() {
        bail!("no API key given");
    }
    save_api_key(paths, &key)?;
    println!("API key saved to {}", paths.key_file.display());
    Ok(0)
}

fn run_process(paths: &SettingsPaths, args: DocumentArgs) -> Result<i32> {
    let settings = load_settings(paths)?;
    let events = EventLog::new(&settings.diagnostics_log, session_id());
    let client = GeminiClient::new(
        &settings,
        settings.api_key.clone().unwrap_or_default(),
        DiagnosticsReporter::new(events.clone()),
    );
    let documents = FsDocumentStore::new(&settings.root);
    let notifier = StderrNotifier;
    let processor =
        MetaProcessor::new(&settings, &documents, &client, &notifier).with_events(events);

    match processor.process_document(&args.document) {
        Ok(outcome) if outcome.markers == 0 => {
            println!("No markers in {}", args.document);
            Ok(0)
        }
        Ok(outcome) => {
            let status = if outcome.saved { "saved" } else { "unchanged" };
            println!(
                "Resolved {} of {} markers in {} ({status})",
                outcome.replaced, outcome.markers, args.document
            );
            Ok(0)
        }
        Err(ProcessError::MissingApiKey) => {
            eprintln!("Run `metascribe configure --key <KEY>` first.");
            Ok(EXIT_NEEDS_CONFIGURATION)
        }
        // Already shown through the notifier; details are in the diagnostics log.
        Err(_) => Ok(EXIT_FAILURE),
    }
}

fn run_profile(paths: &SettingsPaths, args: ProfileArgs) -> Result<i32> {
    if let Some(profile) = args.set {
        if save_writing_profile(paths, &profile)? {
            println!("Writing profile updated");
        } else {
            println!("Writing profile unchanged");
        }
        return Ok(0);
    }
    let settings = load_settings(paths)?;
    println!("{}", settings.writing_profile);
    Ok(0)
}

fn run_scan(paths: &SettingsPaths, args: DocumentArgs) -> Result<i32> {
    let documents = FsDocumentStore::new(&paths.root);
    let text = documents.read(&args.document)?;
    let actions = parse_meta_actions(&text);
    if actions.is_empty() {
        println!("No markers in {}", args.document);
        return Ok(0);
    }
    for (index, action) in actions.iter().enumerate() {
        let kind = match action.kind() {
            ActionKind::Image => "image",
            ActionKind::Text => "text",
        };
        println!(
            "{index}\t{kind}\t{}..{}\t{}\t{}",
            action.start, action.end, action.action_type, action.instruction
        );
    }
    Ok(0)
}
