//! netsweep configuration loading and parsing

use anyhow::{Context, Result};
use netsweep_engine::{CommandKind, CommandTable, Platform};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/netsweep/config.toml";
const CONFIG_ENV: &str = "NETSWEEP_CONFIG";

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct NetsweepConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-kind argv overrides, keyed by command kind (`ping`, `traceroute`, ...)
    #[serde(default)]
    pub commands: BTreeMap<String, CommandOverride>,
    /// File this was loaded from; `None` when running on defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Unset means the engine default
    pub max_parallel: Option<usize>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_grace_millis")]
    pub grace_millis: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            timeout_seconds: default_timeout_seconds(),
            grace_millis: default_grace_millis(),
        }
    }
}

impl RunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_millis)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CommandOverride {
    pub unix: Option<Vec<String>>,
    pub windows: Option<Vec<String>>,
}

fn default_timeout_seconds() -> u64 {
    30
}
fn default_grace_millis() -> u64 {
    2000
}
fn default_log_level() -> String {
    "info".into()
}

impl NetsweepConfig {
    /// Built-in command table with this config's overrides applied
    pub fn command_table(&self) -> Result<CommandTable> {
        let mut table = CommandTable::builtin();
        for (name, entry) in &self.commands {
            let kind: CommandKind = name
                .parse()
                .with_context(|| format!("Invalid [commands.{name}] section"))?;
            if let Some(argv) = &entry.unix {
                table.insert(kind, Platform::Unix, argv.clone());
            }
            if let Some(argv) = &entry.windows {
                table.insert(kind, Platform::Windows, argv.clone());
            }
        }
        Ok(table)
    }
}

/// Load configuration: an explicit path, then `NETSWEEP_CONFIG`, then the
/// system default. Only a missing default file falls back to defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<NetsweepConfig> {
    match explicit {
        Some(path) => load_from(path, true),
        None => match std::env::var(CONFIG_ENV) {
            Ok(path) => load_from(Path::new(&path), true),
            Err(_) => load_from(Path::new(DEFAULT_CONFIG_PATH), false),
        },
    }
}

fn load_from(path: &Path, required: bool) -> Result<NetsweepConfig> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let mut config: NetsweepConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    } else if required {
        anyhow::bail!("Config file not found at {}", path.display())
    } else {
        // Logging is not up yet; the caller reports the fallback
        Ok(NetsweepConfig::default())
    }
}

/// Where the config would be loaded from, for diagnostics
pub fn config_source(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
