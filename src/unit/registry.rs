//! Unit registry
//!
//! Startup-time table mapping a unit name to a factory closure. Every lookup
//! builds a brand-new instance; nothing is cached between calls.

use super::{Unit, UnitInstance};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

pub type UnitFactory = Box<dyn Fn() -> Box<dyn Unit> + Send + Sync>;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Unit not found: {0}")]
    NotFound(String),
    #[error("Unit already registered: {0}")]
    DuplicateUnit(String),
}

/// One row of the unit listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnitSummary {
    pub name: String,
    pub unit_type: String,
    pub description: String,
}

/// Units sharing one technology, as displayed by `list`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitGroup {
    /// Capitalized technology name, e.g. "Ble"
    pub technology: String,
    pub units: Vec<UnitSummary>,
}

#[derive(Default)]
pub struct UnitRegistry {
    factories: BTreeMap<String, UnitFactory>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S, F>(&mut self, name: S, factory: F) -> Result<(), RegistryError>
    where
        S: Into<String>,
        F: Fn() -> Box<dyn Unit> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::DuplicateUnit(name));
        }
        debug!(unit = %name, "Registered unit");
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered unit names, sorted
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn instantiate(&self, name: &str) -> Result<UnitInstance, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(UnitInstance::new(name, factory()))
    }

    /// Group units by technology, keeping those whose name, type, description
    /// or technology contains `pattern` (case-sensitive).
    pub fn list(&self, pattern: &str) -> Vec<UnitGroup> {
        let mut groups: BTreeMap<String, Vec<UnitSummary>> = BTreeMap::new();

        for (name, factory) in &self.factories {
            let descriptor = factory().describe();
            let matches = name.contains(pattern)
                || descriptor.unit_type.contains(pattern)
                || descriptor.description.contains(pattern)
                || descriptor.technology.contains(pattern);
            if !matches {
                continue;
            }

            groups
                .entry(capitalize(&descriptor.technology))
                .or_default()
                .push(UnitSummary {
                    name: name.clone(),
                    unit_type: descriptor.unit_type,
                    description: descriptor.description,
                });
        }

        groups
            .into_iter()
            .map(|(technology, mut units)| {
                units.sort();
                UnitGroup { technology, units }
            })
            .collect()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
