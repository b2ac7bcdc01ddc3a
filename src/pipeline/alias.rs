//! Shortcut (alias) table
//!
//! A shortcut names a sub-pipeline of units and exposes a simplified parameter
//! surface over it. Each exposed parameter fans out to one or more targets
//! inside the chain and may carry a pre-set value:
//!
//! ```text
//! TARGET = "ble_discover1.TARGET,ble_sniff2.TARGET(AA:BB:CC:DD:EE:FF)"
//! ```
//!
//! Targets are addressed the way the sub-pipeline itself is: bare when the
//! chain holds a single unit, `<member><n>.<PARAM>` otherwise.

use crate::config::{ConfigError, ShortcutSection};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

static MAPPING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<targets>[^()]*)(?:\((?P<default>[^)]*)\))?\s*$")
        .expect("mapping pattern is a valid regex")
});

/// What one exposed shortcut parameter controls.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMapping {
    pub targets: Vec<String>,
    pub current_value: Option<Value>,
}

impl ParamMapping {
    /// Parse `target1,target2(default)` or `target1,target2`
    pub fn parse(raw: &str) -> Result<Self, String> {
        let captures = MAPPING_PATTERN
            .captures(raw.trim())
            .ok_or_else(|| format!("malformed mapping '{raw}'"))?;

        let targets: Vec<String> = captures["targets"]
            .split(',')
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .map(str::to_string)
            .collect();
        if targets.is_empty() {
            return Err(format!("mapping '{raw}' names no target parameter"));
        }

        let current_value = captures
            .name("default")
            .map(|m| Value::String(m.as_str().to_string()));

        Ok(Self {
            targets,
            current_value,
        })
    }
}

/// One shortcut definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasSpec {
    pub name: String,
    /// Unit names to instantiate, in order
    pub chain: Vec<String>,
    pub description: String,
    /// Exposed (upper-case) parameter name to its mapping
    pub mapping: BTreeMap<String, ParamMapping>,
}

impl AliasSpec {
    pub fn from_section(name: &str, section: &ShortcutSection) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidShortcut {
            name: name.to_string(),
            reason,
        };

        let chain: Vec<String> = section
            .units
            .split('|')
            .map(|unit| unit.trim().to_string())
            .collect();
        if chain.iter().any(String::is_empty) {
            return Err(invalid(format!("empty unit in chain '{}'", section.units)));
        }

        let mut mapping = BTreeMap::new();
        for (param, raw) in &section.params {
            mapping.insert(param.to_ascii_uppercase(), ParamMapping::parse(raw).map_err(invalid)?);
        }

        Ok(Self {
            name: name.to_string(),
            chain,
            description: section.description.clone(),
            mapping,
        })
    }

    /// Chain in user syntax, e.g. `ble_discover|ble_sniff`
    pub fn chain_spec(&self) -> String {
        self.chain.join("|")
    }
}

/// One row of the shortcut listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortcutSummary {
    pub name: String,
    pub units: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: BTreeMap<String, AliasSpec>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs<I: IntoIterator<Item = AliasSpec>>(specs: I) -> Self {
        Self {
            aliases: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    pub fn insert(&mut self, spec: AliasSpec) {
        self.aliases.insert(spec.name.clone(), spec);
    }

    pub fn resolve(&self, name: &str) -> Option<&AliasSpec> {
        self.aliases.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.aliases.keys().cloned().collect()
    }

    /// Remember the value last set on an exposed parameter so the next load
    /// of this shortcut starts from it.
    pub fn set_current_value(&mut self, alias: &str, param: &str, value: Value) -> bool {
        match self
            .aliases
            .get_mut(alias)
            .and_then(|spec| spec.mapping.get_mut(param))
        {
            Some(mapping) => {
                mapping.current_value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Shortcuts whose name, description or chain contains `pattern`
    pub fn list(&self, pattern: &str) -> Vec<ShortcutSummary> {
        self.aliases
            .values()
            .map(|spec| ShortcutSummary {
                name: spec.name.clone(),
                units: spec.chain_spec(),
                description: spec.description.clone(),
            })
            .filter(|row| {
                row.name.contains(pattern)
                    || row.description.contains(pattern)
                    || row.units.contains(pattern)
            })
            .collect()
    }
}
