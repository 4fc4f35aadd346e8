//! Configuration loaded from `~/.config/streamwatch/config.toml`.
//!
//! Every field is optional; a missing file means defaults.
//!
//! ```toml
//! max_streams = 200
//! scan_interval_ms = 5000
//!
//! [[extra_rules]]
//! class = "hls"
//! pattern = "/playlist\\.php"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::StreamKind;
use crate::error::{Result, WatchError};
use crate::registry::DEFAULT_MAX_STREAMS;
use crate::rules::{PatternRule, RuleClass, RuleSet};
use crate::title::{DEFAULT_LOG_URL_MAX_LEN, DEFAULT_TITLE_MAX_LEN};

/// Default full-sweep period in milliseconds.
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 3000;

/// A user-supplied rule appended after the built-ins of its class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub class: RuleClass,
    pub pattern: String,
    /// Diagnostic name; defaults to `user:<index>`.
    #[serde(default)]
    pub name: Option<String>,
    /// Label override, e.g. `dash` for a `video` rule.
    #[serde(default)]
    pub kind: Option<StreamKind>,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Registry capacity.
    pub max_streams: usize,
    /// Full-sweep period.
    pub scan_interval_ms: u64,
    pub title_max_len: usize,
    pub log_url_max_len: usize,
    pub extra_rules: Vec<RuleConfig>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_streams: DEFAULT_MAX_STREAMS,
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            title_max_len: DEFAULT_TITLE_MAX_LEN,
            log_url_max_len: DEFAULT_LOG_URL_MAX_LEN,
            extra_rules: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Load from the default location, or defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from `path`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Same as [`WatchConfig::load`].
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML or values [`WatchConfig::validate`]
    /// rejects.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and that every extra rule compiles.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Config`] for out-of-range values and
    /// [`WatchError::Rule`] for a pattern that does not compile.
    pub fn validate(&self) -> Result<()> {
        if self.max_streams == 0 {
            return Err(WatchError::Config("max_streams must be at least 1".into()));
        }
        if self.scan_interval_ms == 0 {
            return Err(WatchError::Config("scan_interval_ms must be at least 1".into()));
        }
        if self.title_max_len == 0 {
            return Err(WatchError::Config("title_max_len must be at least 1".into()));
        }
        self.compile_extra_rules().map(drop)
    }

    /// Built-in rules followed by the configured extra rules.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Rule`] if an extra pattern does not compile.
    pub fn rule_set(&self) -> Result<RuleSet> {
        let mut rules = RuleSet::canonical().as_ref().clone();
        let extra = self.compile_extra_rules()?;
        if !extra.is_empty() {
            debug!("Adding {} configured rules", extra.len());
        }
        rules.extend(extra);
        Ok(rules)
    }

    fn compile_extra_rules(&self) -> Result<Vec<PatternRule>> {
        self.extra_rules
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let name = entry
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("user:{index}"));
                let rule = PatternRule::new(name, entry.class, &entry.pattern)?;
                Ok(match entry.kind {
                    Some(kind) => rule.with_kind(kind),
                    None => rule,
                })
            })
            .collect()
    }
}

/// Path of the configuration file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamwatch")
        .join("config.toml")
}
