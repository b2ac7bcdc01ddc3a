//! Framework orchestrator
//!
//! Owns everything a session needs: configuration, the unit registry, the
//! shortcut table, the device cache, the installed pipeline and the
//! background task manager. Front ends (the console, the CLI) drive it
//! through the methods below and decide how to present results.

use crate::config::{ConfigStore, FrameworkConfig};
use crate::error::WirelabResult;
use crate::pipeline::alias::ShortcutSummary;
use crate::pipeline::router::{self, Target};
use crate::pipeline::{
    AliasTable, ExecutionError, ParameterError, Pipeline, PipelineExecutor, PipelineResolver,
    PipelineSlot, ResolveError, AUTO_VALUE,
};
use crate::task::TaskManager;
use crate::unit::device::DeviceCache;
use crate::unit::hooks::ScenarioRegistry;
use crate::unit::registry::{UnitGroup, UnitRegistry};
use crate::unit::{ArgTable, CancelToken, UnitDescriptor};
use serde_json::Value;
use tracing::{debug, info};

/// Current parameter values of one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotParameters {
    pub slot: String,
    pub is_alias: bool,
    /// `(name, value)`; names are dotted when more than one slot is loaded
    pub rows: Vec<(String, String)>,
}

/// Description of one loaded slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotInfo {
    Unit {
        slot: String,
        name: String,
        descriptor: UnitDescriptor,
    },
    Shortcut {
        slot: String,
        summary: ShortcutSummary,
    },
}

pub struct Framework {
    config: FrameworkConfig,
    registry: UnitRegistry,
    aliases: AliasTable,
    scenarios: ScenarioRegistry,
    devices: DeviceCache,
    pipeline: Pipeline,
    tasks: TaskManager,
    cancel: CancelToken,
}

impl Framework {
    pub fn new(config: FrameworkConfig, registry: UnitRegistry) -> WirelabResult<Self> {
        let aliases = AliasTable::from_specs(config.shortcuts()?);
        let temp_dir = config.settings.temp_dir.clone();
        std::fs::create_dir_all(&temp_dir)?;

        info!(
            units = registry.names().len(),
            shortcuts = aliases.names().len(),
            temp_dir = %temp_dir.display(),
            "Framework initialized"
        );

        Ok(Self {
            config,
            registry,
            aliases,
            scenarios: ScenarioRegistry::new(),
            devices: DeviceCache::new(),
            pipeline: Pipeline::default(),
            tasks: TaskManager::new(temp_dir),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_scenarios(mut self, scenarios: ScenarioRegistry) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn with_devices(mut self, devices: DeviceCache) -> Self {
        self.devices = devices;
        self
    }

    /// Resolve `expression` and install it, replacing the current pipeline.
    ///
    /// On error the current pipeline is left exactly as it was.
    pub fn load(&mut self, expression: &str) -> Result<&Pipeline, ResolveError> {
        let pipeline =
            PipelineResolver::new(&self.registry, &self.aliases, &self.config).resolve(expression)?;
        info!(expression, slots = pipeline.len(), "Pipeline loaded");
        self.pipeline = pipeline;
        Ok(&self.pipeline)
    }

    /// Route `value` to the argument(s) `name` controls.
    pub fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), ParameterError> {
        let assignments = router::set_parameter(name, &value, self.pipeline.slots_mut())?;

        // Shortcut values persist for the next load of the same shortcut
        for assignment in &assignments {
            let Target::AliasValue(param) = &assignment.target else {
                continue;
            };
            if let Some(PipelineSlot::Alias(slot)) = self.pipeline.slots().get(assignment.slot) {
                self.aliases
                    .set_current_value(&slot.alias, param, value.clone());
            }
        }
        debug!(name, targets = assignments.len(), "Parameter set");
        Ok(())
    }

    /// Run the installed pipeline; returns the outputs carried out of the last stage.
    pub fn run(&mut self) -> Result<ArgTable, ExecutionError> {
        self.cancel.reset();
        PipelineExecutor::new(&self.cancel, &mut self.devices, &self.scenarios)
            .run(&mut self.pipeline)
    }

    /// Current values per slot; unset shortcut parameters show `<auto>`.
    pub fn list_parameters(&self) -> Vec<SlotParameters> {
        let qualify = self.pipeline.len() > 1;
        let qualified = |slot: &str, param: &str| {
            if qualify {
                format!("{slot}.{param}")
            } else {
                param.to_string()
            }
        };

        self.pipeline
            .slots()
            .iter()
            .map(|slot| {
                let rows = match slot {
                    PipelineSlot::Unit(unit) => unit
                        .unit
                        .args()
                        .iter()
                        .map(|(param, value)| {
                            (qualified(&unit.display_name, param), display_value(value))
                        })
                        .collect(),
                    PipelineSlot::Alias(alias) => alias
                        .mapping
                        .iter()
                        .map(|(param, mapping)| {
                            let value = mapping
                                .current_value
                                .as_ref()
                                .map_or_else(|| AUTO_VALUE.to_string(), display_value);
                            (qualified(&alias.display_name, param), value)
                        })
                        .collect(),
                };
                SlotParameters {
                    slot: slot.display_name().to_string(),
                    is_alias: slot.is_alias(),
                    rows,
                }
            })
            .collect()
    }

    pub fn info(&self) -> Vec<SlotInfo> {
        self.pipeline
            .slots()
            .iter()
            .map(|slot| match slot {
                PipelineSlot::Unit(unit) => SlotInfo::Unit {
                    slot: unit.display_name.clone(),
                    name: unit.unit.name().to_string(),
                    descriptor: unit.unit.info(),
                },
                PipelineSlot::Alias(alias) => {
                    let (units, description) = match self.aliases.resolve(&alias.alias) {
                        Some(spec) => (spec.chain_spec(), spec.description.clone()),
                        None => (String::new(), String::new()),
                    };
                    SlotInfo::Shortcut {
                        slot: alias.display_name.clone(),
                        summary: ShortcutSummary {
                            name: alias.alias.clone(),
                            units,
                            description,
                        },
                    }
                }
            })
            .collect()
    }

    pub fn list_units(&self, pattern: &str) -> Vec<UnitGroup> {
        self.registry.list(pattern)
    }

    pub fn list_shortcuts(&self, pattern: &str) -> Vec<ShortcutSummary> {
        self.aliases.list(pattern)
    }

    /// Names `set` accepts for the installed pipeline
    pub fn parameter_names(&self) -> Vec<String> {
        self.pipeline.parameter_names()
    }

    /// Names `load` accepts: units then shortcuts
    pub fn load_candidates(&self) -> Vec<String> {
        let mut names = self.registry.names();
        names.extend(self.aliases.names());
        names
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut FrameworkConfig {
        &mut self.config
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn scenarios_mut(&mut self) -> &mut ScenarioRegistry {
        &mut self.scenarios
    }

    pub fn devices_mut(&mut self) -> &mut DeviceCache {
        &mut self.devices
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut TaskManager {
        &mut self.tasks
    }

    /// Handle for signal handlers; cancelling it interrupts the current run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stop every background task and release every cached device.
    pub fn exit(&mut self) {
        self.tasks.stop_all();
        self.devices.stop_all();
        info!("Framework terminated");
    }
}

/// Strings are shown bare, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
