//! Executable unit contract
//!
//! A unit is an independently loadable component with a keyed argument table
//! and an execute operation. Units are produced fresh by the
//! [`registry::UnitRegistry`] every time a pipeline is resolved and are owned by
//! the pipeline slot that created them.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub mod builtin;
pub mod device;
pub mod hooks;
pub mod registry;

use device::{DeviceCache, DeviceError};
use hooks::Hooks;

/// Argument table of a unit: upper-case parameter name to current value.
pub type ArgTable = BTreeMap<String, Value>;

/// Argument naming the scenario to attach before a unit executes.
pub const SCENARIO_ARG: &str = "SCENARIO";

/// Immutable per-kind metadata, produced once per unit kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitDescriptor {
    #[serde(rename = "type")]
    pub unit_type: String,
    pub technology: String,
    pub description: String,
    pub dependencies: Vec<String>,
    /// Whether the unit takes arguments it never declared
    pub accepts_undeclared_args: bool,
    /// Whether the unit drives a radio device and owns a device-configuration table
    pub wireless: bool,
}

impl Default for UnitDescriptor {
    fn default() -> Self {
        Self {
            unit_type: "unknown".to_string(),
            technology: "generic".to_string(),
            description: String::new(),
            dependencies: Vec::new(),
            accepts_undeclared_args: false,
            wireless: false,
        }
    }
}

impl UnitDescriptor {
    pub fn new<S: Into<String>>(unit_type: S, technology: S, description: S) -> Self {
        Self {
            unit_type: unit_type.into(),
            technology: technology.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn accepting_undeclared_args(mut self) -> Self {
        self.accepts_undeclared_args = true;
        self
    }

    pub fn wireless(mut self) -> Self {
        self.wireless = true;
        self
    }
}

/// Result of a single unit run: a success flag plus output keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOutcome {
    pub success: bool,
    pub output: ArgTable,
}

impl UnitOutcome {
    /// Successful run carrying output keys forward
    pub fn ok(output: ArgTable) -> Self {
        Self {
            success: true,
            output,
        }
    }

    /// Successful run with nothing to carry forward
    pub fn done() -> Self {
        Self::ok(ArgTable::new())
    }

    /// Failed run; output is always empty
    pub fn nok() -> Self {
        Self::default()
    }
}

/// Errors a unit may raise while executing
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("Execution interrupted")]
    Interrupted,
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Unit failed: {0}")]
    Failed(String),
}

impl UnitError {
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed(message.into())
    }
}

/// Shared interruption flag, tripped by signal handlers and polled by units.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Convenience for long-running units: `ctx.cancel.check()?`
    pub fn check(&self) -> Result<(), UnitError> {
        if self.is_cancelled() {
            Err(UnitError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Everything a unit may touch during one execution besides its own arguments.
pub struct RunContext<'a> {
    pub cancel: &'a CancelToken,
    pub devices: &'a mut DeviceCache,
    pub device_config: &'a ArgTable,
    pub hooks: &'a Hooks,
}

impl RunContext<'_> {
    /// Fire a named event; `true` means the unit should run its default behavior.
    pub fn signal(&self, event: &str, payload: &Value) -> bool {
        self.hooks.fire(event, payload)
    }
}

/// The polymorphic surface every loadable unit implements.
pub trait Unit: Send {
    /// Per-kind metadata
    fn describe(&self) -> UnitDescriptor;

    /// Declare the argument table with its default values.
    fn init(&self, args: &mut ArgTable) {
        let _ = args;
    }

    fn prerun(&mut self, args: &ArgTable, ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        let _ = (args, ctx);
        Ok(())
    }

    fn run(&mut self, args: &ArgTable, ctx: &mut RunContext<'_>)
        -> Result<UnitOutcome, UnitError>;

    /// Cleanup hook; runs after `run` even when it was interrupted.
    fn postrun(&mut self, args: &ArgTable, ctx: &mut RunContext<'_>) {
        let _ = (args, ctx);
    }
}

/// A live, stateful unit bound to its argument table.
pub struct UnitInstance {
    name: String,
    descriptor: UnitDescriptor,
    args: ArgTable,
    device_config: ArgTable,
    hooks: Hooks,
    inner: Box<dyn Unit>,
}

impl std::fmt::Debug for UnitInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitInstance")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("args", &self.args)
            .field("device_config", &self.device_config)
            .finish()
    }
}

impl UnitInstance {
    pub fn new<S: Into<String>>(name: S, inner: Box<dyn Unit>) -> Self {
        let descriptor = inner.describe();
        let mut declared = ArgTable::new();
        inner.init(&mut declared);
        let args = declared
            .into_iter()
            .map(|(key, value)| (key.to_ascii_uppercase(), value))
            .collect();

        Self {
            name: name.into(),
            descriptor,
            args,
            device_config: ArgTable::new(),
            hooks: Hooks::default(),
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &UnitDescriptor {
        &self.descriptor
    }

    pub fn args(&self) -> &ArgTable {
        &self.args
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    /// True when `name` may be written into the argument table.
    pub fn accepts(&self, name: &str) -> bool {
        self.descriptor.accepts_undeclared_args || self.declares(name)
    }

    pub fn set_arg<S: Into<String>>(&mut self, name: S, value: Value) {
        self.args.insert(name.into(), value);
    }

    pub fn device_config(&self) -> &ArgTable {
        &self.device_config
    }

    pub fn set_device_config<S: Into<String>>(&mut self, name: S, value: Value) {
        self.device_config.insert(name.into(), value);
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    /// Descriptor snapshot
    pub fn info(&self) -> UnitDescriptor {
        self.descriptor.clone()
    }

    /// Run `prerun`, `run` and `postrun` in order.
    ///
    /// `postrun` is invoked once `prerun` has been attempted, so an interrupted
    /// unit still releases what it acquired before the error propagates.
    pub fn execute(
        &mut self,
        cancel: &CancelToken,
        devices: &mut DeviceCache,
    ) -> Result<UnitOutcome, UnitError> {
        let mut ctx = RunContext {
            cancel,
            devices,
            device_config: &self.device_config,
            hooks: &self.hooks,
        };

        let result = match self.inner.prerun(&self.args, &mut ctx) {
            Ok(()) => self.inner.run(&self.args, &mut ctx),
            Err(e) => Err(e),
        };
        self.inner.postrun(&self.args, &mut ctx);
        result
    }
}
