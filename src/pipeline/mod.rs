//! Pipelines of units and shortcuts
//!
//! A pipeline is the ordered list of slots installed by `load`. Each slot is
//! either a bound unit or an expanded shortcut (its own list of units plus the
//! shortcut's parameter mapping).
//!
//! - [`resolver`] turns `a|b|c` into slots
//! - [`router`] maps a (possibly dotted) parameter name onto concrete arguments
//! - [`executor`] runs the slots in order, carrying outputs forward

pub mod alias;
pub mod executor;
pub mod resolver;
pub mod router;

use crate::unit::UnitInstance;
use alias::ParamMapping;
use std::collections::BTreeMap;

pub use alias::{AliasSpec, AliasTable};
pub use executor::{ExecutionError, PipelineExecutor};
pub use resolver::{PipelineResolver, ResolveError};
pub use router::{Assignment, ParameterError};

/// Placeholder shown for shortcut parameters that have no value yet
pub const AUTO_VALUE: &str = "<auto>";

#[derive(Debug)]
pub struct UnitSlot {
    pub display_name: String,
    pub unit: UnitInstance,
}

#[derive(Debug)]
pub struct AliasSlot {
    pub display_name: String,
    /// Name of the shortcut this slot was expanded from
    pub alias: String,
    pub members: Vec<UnitSlot>,
    pub mapping: BTreeMap<String, ParamMapping>,
}

#[derive(Debug)]
pub enum PipelineSlot {
    Unit(UnitSlot),
    Alias(AliasSlot),
}

impl PipelineSlot {
    pub fn display_name(&self) -> &str {
        match self {
            PipelineSlot::Unit(slot) => &slot.display_name,
            PipelineSlot::Alias(slot) => &slot.display_name,
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, PipelineSlot::Alias(_))
    }

    /// Parameter names this slot exposes, in display order
    pub fn parameter_names(&self) -> Vec<String> {
        match self {
            PipelineSlot::Unit(slot) => slot.unit.args().keys().cloned().collect(),
            PipelineSlot::Alias(slot) => slot.mapping.keys().cloned().collect(),
        }
    }
}

/// Display name for the `index`-th (0-based) of `count` components.
pub(crate) fn display_name(name: &str, index: usize, count: usize) -> String {
    if count > 1 {
        format!("{name}{}", index + 1)
    } else {
        name.to_string()
    }
}

#[derive(Debug, Default)]
pub struct Pipeline {
    expression: String,
    slots: Vec<PipelineSlot>,
}

impl Pipeline {
    pub fn new<S: Into<String>>(expression: S, slots: Vec<PipelineSlot>) -> Self {
        Self {
            expression: expression.into(),
            slots,
        }
    }

    /// The name expression this pipeline was loaded from
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn slots(&self) -> &[PipelineSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [PipelineSlot] {
        &mut self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, display_name: &str) -> Option<&PipelineSlot> {
        self.slots
            .iter()
            .find(|slot| slot.display_name() == display_name)
    }

    pub fn display_names(&self) -> Vec<&str> {
        self.slots.iter().map(PipelineSlot::display_name).collect()
    }

    /// Addressable parameter names: bare with one slot, `slot.PARAM` otherwise
    pub fn parameter_names(&self) -> Vec<String> {
        let qualify = self.slots.len() > 1;
        self.slots
            .iter()
            .flat_map(|slot| {
                slot.parameter_names().into_iter().map(move |param| {
                    if qualify {
                        format!("{}.{}", slot.display_name(), param)
                    } else {
                        param
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_suffixing() {
        assert_eq!(display_name("ble_scan", 0, 1), "ble_scan");
        assert_eq!(display_name("ble_scan", 0, 2), "ble_scan1");
        assert_eq!(display_name("ble_scan", 1, 2), "ble_scan2");
    }

    #[test]
    fn test_empty_pipeline() {
        let pipeline = Pipeline::default();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.expression(), "");
        assert!(pipeline.parameter_names().is_empty());
        assert!(pipeline.slot("x").is_none());
    }
}
