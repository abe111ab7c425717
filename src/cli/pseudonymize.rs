//! Pseudonymize and restore commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use super::output::{format_report, report_json};
use super::{Host, InputArgs};
use crate::mapping::token::token_regex;
use crate::mapping::Mapping;

/// Arguments for the pseudonymize command
#[derive(Debug, clap::Args)]
pub struct PseudonymizeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write the pseudonymized text here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Don't persist the updated mapping
    #[arg(long)]
    pub no_save: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the restore command
#[derive(Debug, clap::Args)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write the restored text here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the pseudonymize command
pub fn run(args: PseudonymizeArgs, host: &Host) -> Result<()> {
    let input = args.input.read()?;
    let mut session = host.open_session()?;

    let report = session.process_plain(&input);
    if !args.no_save {
        host.save_session(&session)?;
    }

    let pseudonymized = session.pseudonymized_text();

    if args.json {
        let json = serde_json::json!({
            "pseudonymized": pseudonymized,
            "report": report_json(&report),
            "mapping_size": session.store().len(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    eprint!("{}", format_report(&report));
    emit(pseudonymized, args.output.as_deref())
}

/// Run the restore command
pub fn run_restore(args: RestoreArgs, host: &Host) -> Result<()> {
    let input = args.input.read()?;
    let mut session = host.open_session()?;

    let unresolved = unresolved_tokens(&input, session.store().mapping());
    let restored = session.restore(&input).to_string();
    host.save_session(&session)?;

    if args.json {
        let json = serde_json::json!({
            "restored": restored,
            "unresolved_tokens": unresolved,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if !unresolved.is_empty() {
        eprintln!(
            "{} {} token(s) not in the mapping were left as-is: {}",
            "Note:".yellow().bold(),
            unresolved.len(),
            unresolved.join(", ")
        );
    }
    emit(&restored, args.output.as_deref())
}

/// Well-formed tokens in `text` the mapping cannot resolve, deduplicated in order of appearance
pub fn unresolved_tokens(text: &str, mapping: &Mapping) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for m in token_regex().find_iter(text) {
        let token = m.as_str();
        if !mapping.contains_token(token) && !seen.iter().any(|s| s == token) {
            seen.push(token.to_string());
        }
    }
    seen
}

fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write output file: {}", path.display())),
        None => {
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
            Ok(())
        }
    }
}
