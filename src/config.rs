//! Framework configuration
//!
//! A single TOML file carries three things: framework settings, per-unit
//! argument defaults and shortcut definitions.
//!
//! ```toml
//! [settings]
//! log_level = "INFO"
//! temp_dir = "/tmp/wirelab"
//!
//! [units.ble_connect]
//! INTERFACE = "hci1"
//!
//! [shortcuts.sniff_target]
//! units = "ble_discover|ble_sniff"
//! description = "Discover then sniff"
//!
//! [shortcuts.sniff_target.params]
//! TARGET = "ble_discover1.TARGET,ble_sniff2.TARGET(AA:BB:CC:DD:EE:FF)"
//! ```

use crate::pipeline::alias::AliasSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Read access to configuration consumed by the pipeline core.
pub trait ConfigStore {
    /// Whether a default is configured for `arg` of unit `unit`
    fn data_exists(&self, unit: &str, arg: &str) -> bool;

    fn get_data(&self, unit: &str, arg: &str) -> Option<Value>;

    fn shortcuts(&self) -> Result<Vec<AliasSpec>, ConfigError>;
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FrameworkConfig {
    #[serde(default)]
    pub settings: Settings,
    /// Argument defaults keyed by unit name then upper-case argument name
    #[serde(default)]
    pub units: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    pub shortcuts: BTreeMap<String, ShortcutSection>,
    /// File the configuration was loaded from, used by `set`
    #[serde(skip)]
    path: Option<PathBuf>,
}

/// Framework-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_interface")]
    pub default_interface: String,
    /// Directory holding background task output and status files
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// User-defined keys set through `config <key> <value>`
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_mode: false,
            log_level: default_log_level(),
            default_interface: default_interface(),
            temp_dir: default_temp_dir(),
            extra: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_interface() -> String {
    "hci0".to_string()
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("wirelab")
}

/// One `[shortcuts.<name>]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortcutSection {
    /// Pipe-delimited unit chain
    pub units: String,
    #[serde(default)]
    pub description: String,
    /// Exposed parameter name -> `target1,target2(default)`
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid shortcut {name}: {reason}")]
    InvalidShortcut { name: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FrameworkConfig {
    /// Default location: `$HOME/.wirelab/wirelab.toml`
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wirelab")
            .join("wirelab.toml")
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: FrameworkConfig = toml::from_str(content)?;
        config.normalize();

        // Surface malformed shortcuts at load time rather than on first use
        config.shortcuts()?;

        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load `path`, writing a default configuration there first if it is missing
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load_from_file(path);
        }

        let mut config = Self {
            path: Some(path.to_path_buf()),
            ..Default::default()
        };
        config.save()?;
        info!("Created default configuration at {}", path.display());
        Ok(config)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Persist to the backing file, if any
    pub fn save(&self) -> Result<(), ConfigError> {
        match &self.path {
            Some(path) => self.save_to_file(path),
            None => Ok(()),
        }
    }

    /// Look up a `[settings]` key
    pub fn get(&self, key: &str) -> Option<toml::Value> {
        match toml::Value::try_from(&self.settings) {
            Ok(toml::Value::Table(table)) => table.get(key).cloned(),
            _ => None,
        }
    }

    /// Set a `[settings]` key and persist the file.
    ///
    /// The raw value is read as a bool, then an integer, then a string, and
    /// must still type-check against the known settings fields.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let mut table = match toml::Value::try_from(&self.settings)? {
            toml::Value::Table(table) => table,
            _ => return Err(ConfigError::InvalidConfig("settings is not a table".into())),
        };
        table.insert(key.to_string(), parse_setting(raw));

        self.settings = toml::Value::Table(table)
            .try_into()
            .map_err(|e| ConfigError::InvalidConfig(format!("{key}: {e}")))?;
        self.save()
    }

    /// Upper-case every unit argument name
    fn normalize(&mut self) {
        self.units = std::mem::take(&mut self.units)
            .into_iter()
            .map(|(unit, args)| {
                let args = args
                    .into_iter()
                    .map(|(name, value)| (name.to_ascii_uppercase(), value))
                    .collect();
                (unit, args)
            })
            .collect();
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[settings]
log_level = "DEBUG"
temp_dir = "/tmp/wirelab-test"

[units.ble_connect]
interface = "hci1"
TIMEOUT = 5

[shortcuts.sniff_target]
units = "ble_discover|ble_sniff"
description = "Discover a device then sniff it"

[shortcuts.sniff_target.params]
TARGET = "ble_discover1.TARGET,ble_sniff2.TARGET(AA:BB:CC:DD:EE:FF)"
CHANNEL = "ble_sniff2.CHANNEL"
"#;
        Self::from_toml(toml_content).expect("Test config should parse")
    }
}

impl ConfigStore for FrameworkConfig {
    fn data_exists(&self, unit: &str, arg: &str) -> bool {
        self.units
            .get(unit)
            .is_some_and(|args| args.contains_key(arg))
    }

    fn get_data(&self, unit: &str, arg: &str) -> Option<Value> {
        self.units.get(unit).and_then(|args| args.get(arg)).cloned()
    }

    fn shortcuts(&self) -> Result<Vec<AliasSpec>, ConfigError> {
        self.shortcuts
            .iter()
            .map(|(name, section)| AliasSpec::from_section(name, section))
            .collect()
    }
}

/// Interpret a raw CLI value as the most specific TOML scalar (pure function)
fn parse_setting(raw: &str) -> toml::Value {
    if let Ok(flag) = raw.parse::<bool>() {
        toml::Value::Boolean(flag)
    } else if let Ok(number) = raw.parse::<i64>() {
        toml::Value::Integer(number)
    } else {
        toml::Value::String(raw.to_string())
    }
}
