mod store;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::Result;
use quire_common::telemetry::{self, TelemetryConfig};
use quire_common::{Config, FileStore, QuireError};
use quire_editor_core::{DegradationReport, load, load_with_report, serialize};
use quire_sync::{
    CoordinatorConfig, DocumentId, DraftStore, Driver, FileStorage, OwnerId, UploadOptions,
};

use crate::store::JsonFileStore;

type NotesDriver = Driver<JsonFileStore, FileStorage>;

#[derive(Parser)]
#[command(version, about = "Quire - Markdown notes with a block editor core", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the configuration file (.toml or .json)
    #[arg(long, env = "QUIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding notes and drafts, overriding the configuration
    #[arg(long, env = "QUIRE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a Markdown file in the editor's canonical form
    Fmt {
        file: PathBuf,

        /// Exit with an error instead of printing when the file is not canonical
        #[arg(long)]
        check: bool,
    },
    /// Report constructs the editor cannot represent exactly
    Check { file: PathBuf },
    /// Manage stored notes
    #[command(subcommand)]
    Notes(NotesCommand),
    /// List crash-recovery drafts
    Drafts {
        /// Discard the draft of this note
        #[arg(long)]
        clear: Option<String>,
    },
    /// Store a binary file and print its URL
    Upload {
        file: PathBuf,

        /// Destination path in the store (defaults to the file name)
        #[arg(long)]
        path: Option<String>,

        /// Replace an existing file at the destination
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Subcommand)]
enum NotesCommand {
    /// List notes, most recently updated first
    List,
    /// Create a note
    New {
        #[arg(long)]
        title: Option<String>,

        /// Initial content, read from a Markdown file
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Print a note's content
    Show { id: String },
    /// Change a note's title
    Rename { id: String, title: String },
    /// Delete a note
    Rm { id: String },
    /// Duplicate a note
    Cp { id: String },
    /// Replace a note's content with a Markdown file
    Write { id: String, file: PathBuf },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load_or_default(&FileStore::new(&config_path)).await?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    telemetry::init(TelemetryConfig::from_env("quire").with_filter(config.log_level.clone()));
    tracing::debug!(config = %config_path.display(), data_dir = %config.data_dir().display(), "configuration loaded");

    match cli.command {
        Commands::Fmt { file, check } => format_file(&file, check).await,
        Commands::Check { file } => check_file(&file).await,
        Commands::Notes(command) => notes(&config, command).await,
        Commands::Drafts { clear } => drafts(&config, clear),
        Commands::Upload {
            file,
            path,
            overwrite,
        } => upload(&config, &file, path, overwrite).await,
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quire")
        .join("config.toml")
}

/// The file's content as the editor would save it.
fn canonicalize(src: &str) -> String {
    serialize(&load(src))
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(QuireError::from)
        .map_err(Into::into)
}

async fn format_file(file: &Path, check: bool) -> Result<()> {
    let src = read_file(file).await?;
    let canonical = canonicalize(&src);
    if check {
        if src.trim_end_matches('\n') != canonical {
            return Err(miette::miette!(
                code = "quire::fmt::not_canonical",
                help = "run `quire fmt` on it and save the output",
                "{} is not in canonical form",
                file.display()
            ));
        }
        println!("✓ {}", file.display());
        return Ok(());
    }
    println!("{canonical}");
    Ok(())
}

async fn check_file(file: &Path) -> Result<()> {
    let src = read_file(file).await?;
    let (tree, degradations) = load_with_report(&src);
    let degraded = !degradations.is_empty();
    if degraded {
        let report = DegradationReport::new(file.display().to_string(), src.clone(), degradations);
        eprintln!("{:?}", miette::Report::new(report));
    }

    let once = serialize(&tree);
    let twice = canonicalize(&once);
    if once != twice {
        return Err(miette::miette!(
            code = "quire::check::unstable",
            "{} does not survive a second load; please report this file",
            file.display()
        ));
    }
    if !degraded {
        println!("✓ {} loads exactly", file.display());
    }
    Ok(())
}

// === Notes ===

async fn open_driver(config: &Config) -> Result<NotesDriver> {
    let dir = config.data_dir();
    let storage = FileStorage::open(dir.join("drafts"))?;
    let mut driver = Driver::new(CoordinatorConfig::from(config), JsonFileStore::new(&dir), storage);
    driver.sign_in(OwnerId::new(config.owner.as_str()));
    driver.settle().await;
    finish(&mut driver)?;
    Ok(driver)
}

/// Turn any queued notices into an error.
fn finish(driver: &mut NotesDriver) -> Result<()> {
    let notices = driver.drain_notices();
    if notices.is_empty() {
        return Ok(());
    }
    for notice in &notices {
        tracing::warn!(kind = ?notice.kind, document = ?notice.document, "{}", notice.message);
    }
    let messages: Vec<String> = notices.iter().map(ToString::to_string).collect();
    Err(QuireError::Store(messages.join("; ")).into())
}

/// Accept a full id or a unique prefix of one.
fn resolve(driver: &NotesDriver, query: &str) -> Result<DocumentId> {
    let notes = driver.coordinator().notes();
    if let Some(note) = notes.iter().find(|d| d.id.as_str() == query) {
        return Ok(note.id.clone());
    }
    let mut matches = notes.iter().filter(|d| d.id.as_str().starts_with(query));
    match (matches.next(), matches.next()) {
        (Some(note), None) if !query.is_empty() => Ok(note.id.clone()),
        (Some(_), Some(_)) => Err(miette::miette!(
            help = "use more characters of the id",
            "`{query}` matches more than one note"
        )),
        _ => Err(QuireError::NotFound(query.to_string()).into()),
    }
}

async fn notes(config: &Config, command: NotesCommand) -> Result<()> {
    let mut driver = open_driver(config).await?;
    match command {
        NotesCommand::List => {
            for note in driver.coordinator().notes() {
                println!(
                    "{}  {}  {}",
                    note.id,
                    note.updated_at.format("%Y-%m-%d %H:%M"),
                    note.title
                );
            }
        }
        NotesCommand::New { title, from } => {
            let content = match from {
                Some(path) => canonicalize(&read_file(&path).await?),
                None => String::new(),
            };
            let title = title.unwrap_or_else(|| quire_sync::document::DEFAULT_TITLE.to_string());
            driver.create_with(title.trim(), &content)?;
            driver.settle().await;
            finish(&mut driver)?;
            if let Some(id) = driver.coordinator().active_id() {
                println!("{id}");
            }
        }
        NotesCommand::Show { id } => {
            let id = resolve(&driver, &id)?;
            if let Some(note) = driver.coordinator().note(&id) {
                println!("{}", note.content);
            }
        }
        NotesCommand::Rename { id, title } => {
            let id = resolve(&driver, &id)?;
            let title = title.trim();
            if title.is_empty() {
                return Err(miette::miette!("a title cannot be empty"));
            }
            driver.rename(&id, title)?;
            driver.settle().await;
            finish(&mut driver)?;
        }
        NotesCommand::Rm { id } => {
            let id = resolve(&driver, &id)?;
            driver.delete(&id)?;
            driver.settle().await;
            finish(&mut driver)?;
            println!("✓ deleted {id}");
        }
        NotesCommand::Cp { id } => {
            let id = resolve(&driver, &id)?;
            driver.duplicate(&id)?;
            driver.settle().await;
            finish(&mut driver)?;
            if let Some(copy) = driver.coordinator().active_id() {
                println!("{copy}");
            }
        }
        NotesCommand::Write { id, file } => {
            let id = resolve(&driver, &id)?;
            let content = canonicalize(&read_file(&file).await?);
            driver.switch(&id)?;
            driver.edit(content);
            driver.settle().await;
            finish(&mut driver)?;
            println!("✓ saved {id}");
        }
    }
    Ok(())
}

fn drafts(config: &Config, clear: Option<String>) -> Result<()> {
    let storage = FileStorage::open(config.data_dir().join("drafts"))?;
    let drafts = DraftStore::new(storage);
    if let Some(id) = clear {
        drafts.clear(&DocumentId::new(id.as_str()))?;
        println!("✓ cleared draft of {id}");
        return Ok(());
    }
    let pending = drafts.list()?;
    if pending.is_empty() {
        println!("no drafts");
    }
    for draft in pending {
        let first_line = draft.content.lines().next().unwrap_or_default();
        println!(
            "{}  {}  {}",
            draft.id,
            draft.captured_at.format("%Y-%m-%d %H:%M:%S"),
            first_line
        );
    }
    Ok(())
}

async fn upload(config: &Config, file: &Path, path: Option<String>, overwrite: bool) -> Result<()> {
    let bytes = tokio::fs::read(file).await.map_err(QuireError::from)?;
    let dest = match path {
        Some(path) => path,
        None => file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| miette::miette!("{} has no file name", file.display()))?,
    };
    let dir = config.data_dir();
    let storage = FileStorage::open(dir.join("drafts"))?;
    let mut driver = Driver::new(CoordinatorConfig::from(config), JsonFileStore::new(&dir), storage);
    let url = driver
        .upload(&dest, bytes, UploadOptions { overwrite })
        .await?;
    println!("{url}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_is_stable() {
        let src = "Title\n=====\n\n* one\n* two\n\n```\ncode\n```\n";
        let once = canonicalize(src);
        assert_eq!(once, "# Title\n\n- one\n- two\n\n```\ncode\n```");
        assert_eq!(canonicalize(&once), once);
    }

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from(["quire", "notes", "rename", "abc", "New title"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Notes(NotesCommand::Rename { ref id, ref title }) if id == "abc" && title == "New title"
        ));
        let cli = Cli::try_parse_from(["quire", "fmt", "a.md", "--check"]).unwrap();
        assert!(matches!(cli.command, Commands::Fmt { check: true, .. }));
    }

    #[tokio::test]
    async fn test_notes_round_trip_through_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            debounce_ms: 10,
            ..Config::default()
        };

        let mut driver = open_driver(&config).await.unwrap();
        driver.create_with("Groceries", "- milk").unwrap();
        driver.settle().await;
        let id = driver.coordinator().active_id().cloned().unwrap();
        driver.edit("- milk\n- eggs");
        driver.settle().await;
        finish(&mut driver).unwrap();

        let reopened = open_driver(&config).await.unwrap();
        let note = reopened.coordinator().note(&id).unwrap();
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "- milk\n- eggs");
        assert_eq!(resolve(&reopened, &id.as_str()[..8]).unwrap(), id);
        assert!(resolve(&reopened, "zzz").is_err());
        assert!(DraftStore::new(FileStorage::open(dir.path().join("drafts")).unwrap())
            .list()
            .unwrap()
            .is_empty());
    }
}
