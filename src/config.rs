//! Configuration for pseudonymizer
//!
//! Supports loading from `.pseudonymizer.toml` (working directory) or
//! `~/.config/pseudonymizer/config.toml` (global).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::detect::patterns::builtin;
use crate::detect::{
    AllowList, CommandDetector, CompositeDetector, EntityDetector, Gazetteer, NoEntities,
    PatternDetector, DEFAULT_ALLOW_LIST,
};
use crate::session::Session;
use crate::storage::snapshot::DEFAULT_SNAPSHOT_PATH;

/// Local config file name
pub const LOCAL_CONFIG_FILE: &str = ".pseudonymizer.toml";

/// Full pseudonymizer configuration file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PseudonymizerConfig {
    /// Pattern rule settings
    pub patterns: PatternsConfig,

    /// Entity recognition settings
    pub entities: EntitiesConfig,

    /// Session persistence settings
    pub session: SessionConfig,
}

/// Pattern rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// Whether to use builtin patterns
    pub use_builtin_patterns: bool,

    /// Custom patterns, applied after the builtins
    pub custom_patterns: Vec<PatternConfig>,

    /// Builtin patterns to disable (by name)
    pub disabled_patterns: Vec<String>,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            use_builtin_patterns: true,
            custom_patterns: Vec::new(),
            disabled_patterns: Vec::new(),
        }
    }
}

/// Custom pattern configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Pattern name; also the label embedded in its tokens
    pub name: String,

    /// Regex pattern
    pub pattern: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Entity recognition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitiesConfig {
    /// Whether entity recognition runs at all
    pub enabled: bool,

    /// Entity labels admitted into the mapping
    pub allow_list: Vec<String>,

    /// Fixed term lists
    pub gazetteer: Vec<GazetteerConfig>,

    /// External recognizer process
    pub command: Option<CommandConfig>,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_list: DEFAULT_ALLOW_LIST.iter().map(|s| s.to_string()).collect(),
            gazetteer: Vec::new(),
            command: None,
        }
    }
}

/// Terms recognized under one label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazetteerConfig {
    pub label: String,
    pub terms: Vec<String>,
}

/// External recognizer invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Session persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the CLI keeps the session between runs
    pub snapshot_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}

impl PseudonymizerConfig {
    /// Load configuration from `root`, falling back to global config
    pub fn load(root: &Path) -> Result<Self> {
        let local_config = Self::local_config_path(root);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::global_config_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get global config path (~/.config/pseudonymizer/config.toml)
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pseudonymizer").join("config.toml"))
    }

    /// Get local config path
    pub fn local_config_path(root: &Path) -> PathBuf {
        root.join(LOCAL_CONFIG_FILE)
    }

    /// Build a session wired to the configured detectors
    pub fn build_session(&self) -> Result<Session> {
        Ok(Session::new(
            self.patterns.build_detector(),
            self.entities.build_detector()?,
            self.entities.build_allow_list(),
        ))
    }
}

impl PatternsConfig {
    /// Build a PatternDetector from this configuration
    ///
    /// Invalid custom patterns are skipped with a warning, as are unknown
    /// disabled pattern names.
    pub fn build_detector(&self) -> PatternDetector {
        let valid_builtin_names: Vec<&str> = builtin::ALL_NAMED.iter().map(|np| np.name).collect();
        for disabled_name in &self.disabled_patterns {
            if !valid_builtin_names.contains(&disabled_name.as_str()) {
                warn!(
                    pattern = %disabled_name,
                    valid = %valid_builtin_names.join(", "),
                    "Disabled pattern is not a builtin pattern name"
                );
            }
        }

        let mut detector = if self.use_builtin_patterns {
            let disabled: Vec<&str> = self.disabled_patterns.iter().map(String::as_str).collect();
            PatternDetector::without_builtins(&disabled)
        } else {
            PatternDetector::none()
        };

        for custom in &self.custom_patterns {
            if let Err(e) = detector.add_named_pattern(&custom.name, &custom.pattern) {
                warn!(pattern = %custom.name, error = %e, "Skipping invalid custom pattern");
            }
        }

        detector
    }

    /// List all available builtin pattern names
    pub fn available_patterns() -> Vec<(&'static str, &'static str)> {
        builtin::ALL_NAMED
            .iter()
            .map(|np| (np.name, np.description))
            .collect()
    }
}

impl EntitiesConfig {
    /// Build the entity detector described by this configuration
    pub fn build_detector(&self) -> Result<Box<dyn EntityDetector>> {
        if !self.enabled {
            return Ok(Box::new(NoEntities));
        }

        let mut composite = CompositeDetector::new();

        if !self.gazetteer.is_empty() {
            let mut gazetteer = Gazetteer::new();
            for group in &self.gazetteer {
                gazetteer
                    .add_terms(&group.label, &group.terms)
                    .with_context(|| format!("Invalid gazetteer terms for '{}'", group.label))?;
            }
            composite.push(Box::new(gazetteer));
        }

        if let Some(command) = &self.command {
            composite.push(Box::new(CommandDetector::new(
                command.program.clone(),
                command.args.clone(),
            )));
        }

        if composite.is_empty() {
            return Ok(Box::new(NoEntities));
        }
        Ok(Box::new(composite))
    }

    pub fn build_allow_list(&self) -> AllowList {
        AllowList::new(self.allow_list.iter().cloned())
    }
}
