//! Mapping inspection and editing commands

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use super::output::format_mapping;
use super::{Host, InputArgs};
use crate::mapping::Mapping;
use crate::session::DEFAULT_MANUAL_LABEL;

/// Arguments for the mapping command
#[derive(Debug, clap::Args)]
pub struct MappingArgs {
    #[command(subcommand)]
    pub command: MappingCommand,
}

#[derive(Debug, Subcommand)]
pub enum MappingCommand {
    /// Show the mapping, longest literal first
    Show {
        /// Print the raw mapping document
        #[arg(long)]
        json: bool,
    },

    /// Replace the whole mapping with an edited document
    Set {
        /// Mapping document to load ("-" for stdin)
        #[arg(long)]
        file: PathBuf,
    },

    /// Add or overwrite entries from a document, keeping the rest
    Merge {
        /// Mapping document with the entries to merge ("-" for stdin)
        #[arg(long)]
        file: PathBuf,
    },

    /// Map a literal by hand
    Add {
        /// Literal text to pseudonymize
        literal: String,

        /// Label embedded in the token
        #[arg(long, default_value = DEFAULT_MANUAL_LABEL)]
        label: String,
    },

    /// Move the token counter past every numbered token in the mapping
    Resync,
}

/// Run the mapping command
pub fn run(args: MappingArgs, host: &Host) -> Result<()> {
    let mut session = host.open_session()?;

    match args.command {
        MappingCommand::Show { json } => {
            if json {
                println!("{}", session.mapping_document());
            } else {
                print!(
                    "{}",
                    format_mapping(session.store().mapping(), session.store().counter())
                );
            }
            return Ok(());
        }
        MappingCommand::Set { file } => {
            let document = read_document(file)?;
            session
                .replace_document(&document)
                .context("Mapping was not changed")?;
            println!(
                "{} mapping replaced ({} entries)",
                "✓".green(),
                session.store().len()
            );
            warn_counter_overlap(session.store().mapping(), session.store().counter());
        }
        MappingCommand::Merge { file } => {
            let document = read_document(file)?;
            let incoming = Mapping::parse_document(&document).context("Mapping was not changed")?;
            let count = incoming.len();
            session
                .merge(
                    incoming
                        .iter()
                        .map(|e| (e.literal.clone(), e.token.clone())),
                )
                .context("Mapping was not changed")?;
            println!("{} merged {} entries", "✓".green(), count);
        }
        MappingCommand::Add { literal, label } => {
            let token = session.add_manual_entry(&literal, &label)?;
            println!("{} {} → {}", "✓".green(), literal, token.yellow());
        }
        MappingCommand::Resync => {
            let counter = session.resync_counter();
            println!("{} next sequence number is {}", "✓".green(), counter);
        }
    }

    host.save_session(&session)
}

/// Run the reset command
///
/// The saved session is never parsed, so a corrupt file can still be cleared.
pub fn run_reset(host: &Host) -> Result<()> {
    if !host.snapshots.exists() {
        println!("No saved session at {}.", host.snapshots.path().display());
        return Ok(());
    }
    host.snapshots.delete()?;
    println!(
        "Removed {}; mapping cleared and token counter reset.",
        host.snapshots.path().display()
    );
    Ok(())
}

fn read_document(file: PathBuf) -> Result<String> {
    InputArgs {
        text: None,
        file: Some(file),
    }
    .read()
}

/// Replacing a mapping never resyncs the counter; point out when that matters
fn warn_counter_overlap(mapping: &Mapping, counter: u64) {
    if let Some(highest) = mapping.highest_sequence() {
        if highest >= counter {
            eprintln!(
                "{} mapping contains sequence number {} but the counter is at {}; \
                 run 'pseudonymizer mapping resync' to avoid reusing numbers",
                "Note:".yellow().bold(),
                highest,
                counter
            );
        }
    }
}
