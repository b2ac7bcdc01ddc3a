//! Parameter routing
//!
//! Resolves a user-facing parameter name against the loaded slots and writes
//! the value into every concrete argument it controls. Routing is split into
//! a pure planning pass and an apply pass so that a shortcut parameter fanning
//! out to several targets is committed all-or-nothing: if any target fails to
//! resolve, nothing is written.

use super::{AliasSlot, PipelineSlot, UnitSlot};
use crate::unit::device::is_device_parameter;
use crate::unit::UnitInstance;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterError {
    #[error("No unit loaded")]
    NoUnitLoaded,
    #[error("No corresponding parameter: {0}")]
    UnknownParameter(String),
    #[error("Multiple units loaded, prefix the parameter with the slot name: {0}")]
    AmbiguousTarget(String),
}

/// Where a routed value lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Unit argument table entry
    Argument(String),
    /// Wireless unit device-configuration entry
    DeviceConfig(String),
    /// Remembered value of a shortcut's exposed parameter
    AliasValue(String),
}

/// One write of the routing plan. `member` indexes into a shortcut's units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub slot: usize,
    pub member: Option<usize>,
    pub target: Target,
}

/// Route `name` to concrete targets without touching any slot.
pub fn plan(name: &str, slots: &[PipelineSlot]) -> Result<Vec<Assignment>, ParameterError> {
    match slots {
        [] => Err(ParameterError::NoUnitLoaded),
        [slot] => plan_slot(name, slot, 0),
        _ => {
            let (slot_name, param) = name
                .split_once('.')
                .ok_or_else(|| ParameterError::AmbiguousTarget(name.to_string()))?;
            let (index, slot) = slots
                .iter()
                .enumerate()
                .find(|(_, slot)| slot.display_name() == slot_name)
                .ok_or_else(|| ParameterError::UnknownParameter(name.to_string()))?;
            plan_slot(param, slot, index)
        }
    }
}

fn plan_slot(
    name: &str,
    slot: &PipelineSlot,
    index: usize,
) -> Result<Vec<Assignment>, ParameterError> {
    match slot {
        PipelineSlot::Unit(unit_slot) => Ok(vec![Assignment {
            slot: index,
            member: None,
            target: plan_unit(name, &unit_slot.unit)?,
        }]),
        PipelineSlot::Alias(alias_slot) => plan_alias(name, alias_slot, index),
    }
}

fn plan_alias(
    name: &str,
    alias: &AliasSlot,
    index: usize,
) -> Result<Vec<Assignment>, ParameterError> {
    let param = name.to_ascii_uppercase();
    let mapping = alias
        .mapping
        .get(&param)
        .ok_or_else(|| ParameterError::UnknownParameter(name.to_string()))?;

    let mut assignments = Vec::with_capacity(mapping.targets.len() + 1);
    for target in &mapping.targets {
        let (member, target) = plan_members(target, &alias.members)?;
        assignments.push(Assignment {
            slot: index,
            member: Some(member),
            target,
        });
    }
    assignments.push(Assignment {
        slot: index,
        member: None,
        target: Target::AliasValue(param),
    });
    Ok(assignments)
}

/// Route within a shortcut's own units, which follow the same addressing rules.
fn plan_members(name: &str, members: &[UnitSlot]) -> Result<(usize, Target), ParameterError> {
    match members {
        [] => Err(ParameterError::NoUnitLoaded),
        [member] => Ok((0, plan_unit(name, &member.unit)?)),
        _ => {
            let (member_name, param) = name
                .split_once('.')
                .ok_or_else(|| ParameterError::AmbiguousTarget(name.to_string()))?;
            let (index, member) = members
                .iter()
                .enumerate()
                .find(|(_, member)| member.display_name == member_name)
                .ok_or_else(|| ParameterError::UnknownParameter(name.to_string()))?;
            Ok((index, plan_unit(param, &member.unit)?))
        }
    }
}

fn plan_unit(name: &str, unit: &UnitInstance) -> Result<Target, ParameterError> {
    let param = name.to_ascii_uppercase();
    if unit.accepts(&param) {
        Ok(Target::Argument(param))
    } else if unit.descriptor().wireless && is_device_parameter(&param) {
        Ok(Target::DeviceConfig(param))
    } else {
        Err(ParameterError::UnknownParameter(name.to_string()))
    }
}

/// Write `value` into every target of a plan produced by [`plan`].
pub fn apply(assignments: &[Assignment], value: &Value, slots: &mut [PipelineSlot]) {
    for assignment in assignments {
        let Some(slot) = slots.get_mut(assignment.slot) else {
            continue;
        };

        match (slot, assignment.member, &assignment.target) {
            (PipelineSlot::Alias(alias), None, Target::AliasValue(param)) => {
                if let Some(mapping) = alias.mapping.get_mut(param) {
                    mapping.current_value = Some(value.clone());
                }
            }
            (PipelineSlot::Alias(alias), Some(member), target) => {
                if let Some(member) = alias.members.get_mut(member) {
                    write_unit(&mut member.unit, target, value);
                }
            }
            (PipelineSlot::Unit(unit_slot), None, target) => {
                write_unit(&mut unit_slot.unit, target, value);
            }
            _ => {}
        }
    }
}

fn write_unit(unit: &mut UnitInstance, target: &Target, value: &Value) {
    match target {
        Target::Argument(param) => unit.set_arg(param.clone(), value.clone()),
        Target::DeviceConfig(param) => unit.set_device_config(param.clone(), value.clone()),
        Target::AliasValue(_) => {}
    }
}

/// Plan then apply; on error nothing has been written.
pub fn set_parameter(
    name: &str,
    value: &Value,
    slots: &mut [PipelineSlot],
) -> Result<Vec<Assignment>, ParameterError> {
    let assignments = plan(name, slots)?;
    apply(&assignments, value, slots);
    Ok(assignments)
}
