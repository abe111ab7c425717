//! Detect command for previewing what would be pseudonymized

use anyhow::Result;
use colored::Colorize;

use super::output::format_spans;
use super::{Host, InputArgs};
use crate::config::PatternsConfig;
use crate::detect::SensitiveSpan;
use crate::session::Session;

/// Arguments for the detect command
#[derive(Debug, clap::Args)]
pub struct DetectArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Skip the entity detector
    #[arg(long)]
    pub patterns_only: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the patterns command
#[derive(Debug, clap::Args)]
pub struct PatternsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the detect command
pub fn run(args: DetectArgs, host: &Host) -> Result<()> {
    let input = args.input.read()?;
    let session = host.config.build_session()?;

    let (spans, entity_error) = collect_spans(&session, &input, args.patterns_only);

    if args.json {
        let json = serde_json::json!({
            "input_length": input.len(),
            "match_count": spans.len(),
            "spans": spans,
            "entity_error": entity_error,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print!("{}", format_spans(&spans));
        if let Some(err) = entity_error {
            eprintln!("{} {}", "Warning:".yellow().bold(), err);
        }
    }

    Ok(())
}

/// Pattern spans followed by entity spans; an entity failure is returned, not raised
fn collect_spans(
    session: &Session,
    input: &str,
    patterns_only: bool,
) -> (Vec<SensitiveSpan>, Option<String>) {
    let mut spans = session.pattern_detector().detect(input);
    if patterns_only {
        return (spans, None);
    }

    match session.detect_entities(input) {
        Ok(entities) => {
            spans.extend(entities);
            (spans, None)
        }
        Err(e) => (spans, Some(e.to_string())),
    }
}

/// Run the patterns command
pub fn run_patterns(args: PatternsArgs, host: &Host) -> Result<()> {
    let patterns = &host.config.patterns;
    let builtins = PatternsConfig::available_patterns();

    if args.json {
        let mut rules: Vec<_> = builtins
            .iter()
            .map(|(name, description)| {
                serde_json::json!({
                    "name": name,
                    "description": description,
                    "builtin": true,
                    "enabled": is_builtin_enabled(patterns, name),
                })
            })
            .collect();
        rules.extend(patterns.custom_patterns.iter().map(|custom| {
            serde_json::json!({
                "name": custom.name,
                "description": custom.description,
                "pattern": custom.pattern,
                "builtin": false,
                "enabled": true,
            })
        }));
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    println!("{}", "Pattern Rules".bold());
    println!("{}", "=".repeat(50));
    for (name, description) in builtins {
        let name = if is_builtin_enabled(patterns, name) {
            name.cyan()
        } else {
            name.dimmed().strikethrough()
        };
        println!("{:16} {}", name, description);
    }
    for custom in &patterns.custom_patterns {
        println!(
            "{:16} {}",
            custom.name.cyan(),
            custom.description.as_deref().unwrap_or(&custom.pattern)
        );
    }

    Ok(())
}

fn is_builtin_enabled(patterns: &PatternsConfig, name: &str) -> bool {
    patterns.use_builtin_patterns && !patterns.disabled_patterns.iter().any(|d| d == name)
}
