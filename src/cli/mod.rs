pub mod detect;
pub mod mapping;
pub mod output;
pub mod pseudonymize;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::PseudonymizerConfig;
use crate::session::Session;
use crate::storage::SnapshotStore;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "PSEUDONYMIZER_LOG";

/// Replace sensitive text with reversible tokens, and restore it later
#[derive(Debug, Parser)]
#[command(name = "pseudonymizer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ./.pseudonymizer.toml, then the global config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Session file (default: from config)
    #[arg(long, global = true)]
    pub session: Option<PathBuf>,

    /// Log more (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List sensitive spans in a text without changing the mapping
    Detect(detect::DetectArgs),

    /// Detect sensitive spans, extend the mapping, and print pseudonymized text
    Pseudonymize(pseudonymize::PseudonymizeArgs),

    /// Restore original text from pseudonymized text using the saved mapping
    Restore(pseudonymize::RestoreArgs),

    /// Inspect or edit the mapping
    Mapping(mapping::MappingArgs),

    /// Clear the mapping and reset the token counter
    Reset,

    /// List the pattern rules in effect
    Patterns(detect::PatternsArgs),
}

/// Text input shared by several commands
#[derive(Debug, Clone, clap::Args)]
pub struct InputArgs {
    /// Text to process
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,

    /// File to read ("-" for stdin)
    #[arg(long, conflicts_with = "text")]
    pub file: Option<PathBuf>,
}

impl InputArgs {
    pub fn read(&self) -> Result<String> {
        match (&self.text, &self.file) {
            (Some(text), None) => Ok(text.clone()),
            (None, Some(file)) if file.as_os_str() == "-" => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read stdin")?;
                Ok(buf)
            }
            (None, Some(file)) => std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read file: {}", file.display())),
            (None, None) => anyhow::bail!("Either --text or --file is required"),
            (Some(_), Some(_)) => anyhow::bail!("Cannot specify both --text and --file"),
        }
    }
}

/// Loaded config plus the snapshot location, shared by every command
pub struct Host {
    pub config: PseudonymizerConfig,
    pub snapshots: SnapshotStore,
}

impl Host {
    pub fn load(config_path: Option<&Path>, session_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => PseudonymizerConfig::load_from_file(path)?,
            None => PseudonymizerConfig::load(Path::new("."))?,
        };
        let snapshot_path = session_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.session.snapshot_path.clone());

        Ok(Self {
            config,
            snapshots: SnapshotStore::new(snapshot_path),
        })
    }

    /// Build a session from config and resume the saved snapshot, if any
    pub fn open_session(&self) -> Result<Session> {
        let mut session = self.config.build_session()?;
        if let Some(snapshot) = self.snapshots.load()? {
            session.load_snapshot(snapshot);
        }
        Ok(session)
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        self.snapshots.save(&session.snapshot())
    }
}

/// Install the stderr log subscriber
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    // Ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let host = Host::load(cli.config.as_deref(), cli.session.as_deref())?;

    match cli.command {
        Commands::Detect(args) => detect::run(args, &host),
        Commands::Pseudonymize(args) => pseudonymize::run(args, &host),
        Commands::Restore(args) => pseudonymize::run_restore(args, &host),
        Commands::Mapping(args) => mapping::run(args, &host),
        Commands::Reset => mapping::run_reset(&host),
        Commands::Patterns(args) => detect::run_patterns(args, &host),
    }
}
