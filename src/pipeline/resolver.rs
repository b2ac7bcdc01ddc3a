//! Pipeline resolution
//!
//! Turns a `|`-delimited name expression into pipeline slots. Each component
//! is looked up in the unit registry first, then in the shortcut table. The
//! result is built in full before it is returned, so a failing component never
//! leaves a partially installed pipeline behind.

use super::alias::AliasSpec;
use super::{display_name, router, AliasSlot, AliasTable, Pipeline, PipelineSlot, UnitSlot};
use crate::config::ConfigStore;
use crate::unit::registry::UnitRegistry;
use crate::unit::UnitInstance;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Unknown unit or shortcut: {0}")]
    NotFound(String),
    #[error("Shortcut {alias} references unknown unit: {unit}")]
    AliasChain { alias: String, unit: String },
}

pub struct PipelineResolver<'a> {
    registry: &'a UnitRegistry,
    aliases: &'a AliasTable,
    config: &'a dyn ConfigStore,
}

impl<'a> PipelineResolver<'a> {
    pub fn new(
        registry: &'a UnitRegistry,
        aliases: &'a AliasTable,
        config: &'a dyn ConfigStore,
    ) -> Self {
        Self {
            registry,
            aliases,
            config,
        }
    }

    pub fn resolve(&self, expression: &str) -> Result<Pipeline, ResolveError> {
        let names: Vec<&str> = expression.split('|').map(str::trim).collect();
        let count = names.len();

        let mut slots = Vec::with_capacity(count);
        for (index, name) in names.iter().enumerate() {
            let display = display_name(name, index, count);

            let slot = if self.registry.contains(name) {
                PipelineSlot::Unit(UnitSlot {
                    display_name: display,
                    unit: self.instantiate(name, || ResolveError::NotFound(name.to_string()))?,
                })
            } else if let Some(spec) = self.aliases.resolve(name) {
                self.expand(spec, display)?
            } else {
                return Err(ResolveError::NotFound(name.to_string()));
            };
            slots.push(slot);
        }

        debug!(expression, slots = slots.len(), "Resolved pipeline");
        Ok(Pipeline::new(expression, slots))
    }

    /// Expand a shortcut into its member units and apply its preset values.
    fn expand(&self, spec: &AliasSpec, display: String) -> Result<PipelineSlot, ResolveError> {
        let count = spec.chain.len();
        let mut members = Vec::with_capacity(count);
        for (index, unit) in spec.chain.iter().enumerate() {
            let chain_error = || ResolveError::AliasChain {
                alias: spec.name.clone(),
                unit: unit.clone(),
            };
            members.push(UnitSlot {
                display_name: display_name(unit, index, count),
                unit: self.instantiate(unit, chain_error)?,
            });
        }

        let mut expanded = PipelineSlot::Alias(AliasSlot {
            display_name: display,
            alias: spec.name.clone(),
            members,
            mapping: spec.mapping.clone(),
        });

        for (param, mapping) in &spec.mapping {
            let Some(value) = &mapping.current_value else {
                continue;
            };
            let slots = std::slice::from_mut(&mut expanded);
            if let Err(e) = router::set_parameter(param, value, slots) {
                warn!(alias = %spec.name, param = %param, "Shortcut preset not applied: {}", e);
            }
        }
        Ok(expanded)
    }

    /// Build a fresh instance and pre-seed its declared arguments from configuration.
    fn instantiate<F>(&self, name: &str, missing: F) -> Result<UnitInstance, ResolveError>
    where
        F: FnOnce() -> ResolveError,
    {
        let mut unit = self.registry.instantiate(name).map_err(|_| missing())?;

        let configured: Vec<String> = unit
            .args()
            .keys()
            .filter(|arg| self.config.data_exists(name, arg))
            .cloned()
            .collect();
        for arg in configured {
            if let Some(value) = self.config.get_data(name, &arg) {
                unit.set_arg(arg, value);
            }
        }
        Ok(unit)
    }
}
