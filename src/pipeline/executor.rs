//! Pipeline execution
//!
//! Runs every slot in declaration order. Output keys of a finished stage are
//! carried forward and written into each later unit that accepts them, right
//! before it executes. The first failing stage stops the run.

use super::{Pipeline, PipelineSlot};
use crate::stage_span;
use crate::unit::device::DeviceCache;
use crate::unit::hooks::ScenarioRegistry;
use crate::unit::{ArgTable, CancelToken, UnitError, UnitInstance, SCENARIO_ARG};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Execution failed at stage {stage}")]
    StageFailed { stage: String },
    #[error("Execution interrupted at stage {stage}")]
    Interrupted { stage: String },
    #[error("Stage {stage} raised an error: {source}")]
    Unit {
        stage: String,
        #[source]
        source: UnitError,
    },
    #[error("Stage {stage} requested unknown scenario: {scenario}")]
    UnknownScenario { stage: String, scenario: String },
}

impl ExecutionError {
    pub fn stage(&self) -> &str {
        match self {
            ExecutionError::StageFailed { stage }
            | ExecutionError::Interrupted { stage }
            | ExecutionError::Unit { stage, .. }
            | ExecutionError::UnknownScenario { stage, .. } => stage,
        }
    }
}

pub struct PipelineExecutor<'a> {
    cancel: &'a CancelToken,
    devices: &'a mut DeviceCache,
    scenarios: &'a ScenarioRegistry,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(
        cancel: &'a CancelToken,
        devices: &'a mut DeviceCache,
        scenarios: &'a ScenarioRegistry,
    ) -> Self {
        Self {
            cancel,
            devices,
            scenarios,
        }
    }

    /// Run the pipeline and return the outputs carried out of the last stage.
    pub fn run(&mut self, pipeline: &mut Pipeline) -> Result<ArgTable, ExecutionError> {
        let mut carried = ArgTable::new();

        for slot in pipeline.slots_mut() {
            match slot {
                PipelineSlot::Unit(slot) => {
                    self.run_stage(&slot.display_name, &mut slot.unit, &mut carried)?;
                }
                PipelineSlot::Alias(alias) => {
                    for member in &mut alias.members {
                        let stage = format!("{}.{}", alias.display_name, member.display_name);
                        self.run_stage(&stage, &mut member.unit, &mut carried)?;
                    }
                }
            }
        }

        info!(stages = pipeline.len(), "Pipeline completed");
        Ok(carried)
    }

    fn run_stage(
        &mut self,
        stage: &str,
        unit: &mut UnitInstance,
        carried: &mut ArgTable,
    ) -> Result<(), ExecutionError> {
        let span = stage_span!(stage = %stage, unit = %unit.name());
        let _enter = span.enter();

        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Interrupted {
                stage: stage.to_string(),
            });
        }

        for (key, value) in carried.iter() {
            if unit.accepts(key) {
                debug!(key = %key, "Carrying output into stage");
                unit.set_arg(key.clone(), value.clone());
            }
        }

        self.attach_scenario(stage, unit)?;

        match unit.execute(self.cancel, self.devices) {
            Ok(outcome) if outcome.success => {
                debug!(outputs = outcome.output.len(), "Stage succeeded");
                carried.extend(outcome.output);
                Ok(())
            }
            Ok(_) => {
                warn!("Stage reported failure");
                Err(ExecutionError::StageFailed {
                    stage: stage.to_string(),
                })
            }
            Err(UnitError::Interrupted) => {
                warn!("Stage interrupted");
                Err(ExecutionError::Interrupted {
                    stage: stage.to_string(),
                })
            }
            Err(source) => Err(ExecutionError::Unit {
                stage: stage.to_string(),
                source,
            }),
        }
    }

    /// Replace the unit's hooks with the scenario named by its SCENARIO argument.
    fn attach_scenario(&self, stage: &str, unit: &mut UnitInstance) -> Result<(), ExecutionError> {
        let name = match unit.arg(SCENARIO_ARG) {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => return Ok(()),
        };

        let scenario = self
            .scenarios
            .get(&name)
            .ok_or_else(|| ExecutionError::UnknownScenario {
                stage: stage.to_string(),
                scenario: name.clone(),
            })?;

        let hooks = unit.hooks_mut();
        hooks.clear();
        scenario.attach(hooks);
        debug!(scenario = %name, "Scenario attached");
        Ok(())
    }
}
