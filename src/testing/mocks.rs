//! Mock implementations for testing
//!
//! `MockUnit` is a configurable unit whose phases are recorded in a shared
//! [`RunLog`]; `RecordingReporter` captures everything a console reports.

use crate::console::Reporter;
use crate::unit::{ArgTable, RunContext, Unit, UnitDescriptor, UnitError, UnitOutcome};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// One recorded unit phase.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub unit: String,
    pub phase: &'static str,
    /// Argument table as the unit saw it
    pub args: ArgTable,
}

/// Shared, cloneable log of unit phases.
#[derive(Debug, Clone, Default)]
pub struct RunLog(Arc<Mutex<Vec<RunRecord>>>);

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, unit: &str, phase: &'static str, args: &ArgTable) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RunRecord {
                unit: unit.to_string(),
                phase,
                args: args.clone(),
            });
    }

    pub fn records(&self) -> Vec<RunRecord> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Phases recorded for `unit`, in order
    pub fn phases(&self, unit: &str) -> Vec<&'static str> {
        self.records()
            .into_iter()
            .filter(|record| record.unit == unit)
            .map(|record| record.phase)
            .collect()
    }

    /// Units whose `run` phase executed, in order
    pub fn executed(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|record| record.phase == "run")
            .map(|record| record.unit)
            .collect()
    }

    /// Arguments `unit` saw on its most recent run
    pub fn last_args(&self, unit: &str) -> Option<ArgTable> {
        self.records()
            .into_iter()
            .rev()
            .find(|record| record.unit == unit && record.phase == "run")
            .map(|record| record.args)
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail,
    Interrupt,
    Error(String),
}

/// Configurable unit for tests.
///
/// Fires `onRun` before reporting success; a hook overriding it with `false`
/// turns the run into a failure.
#[derive(Debug, Clone)]
pub struct MockUnit {
    label: String,
    descriptor: UnitDescriptor,
    args: ArgTable,
    output: ArgTable,
    behavior: Behavior,
    log: RunLog,
}

impl MockUnit {
    pub fn new<S: Into<String>>(label: S) -> Self {
        let label = label.into();
        Self {
            descriptor: UnitDescriptor::new(
                "mock",
                "generic",
                format!("Mock unit {label}").as_str(),
            ),
            label,
            args: ArgTable::new(),
            output: ArgTable::new(),
            behavior: Behavior::Succeed,
            log: RunLog::new(),
        }
    }

    /// Declare an argument with its default value
    pub fn with_arg<K: Into<String>, V: Into<Value>>(mut self, name: K, value: V) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Add a key to the output of every successful run
    pub fn with_output<K: Into<String>, V: Into<Value>>(mut self, name: K, value: V) -> Self {
        self.output.insert(name.into(), value.into());
        self
    }

    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_technology<S: Into<String>>(mut self, technology: S) -> Self {
        self.descriptor.technology = technology.into();
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.descriptor.description = description.into();
        self
    }

    /// Report `success: false`
    pub fn failing(mut self) -> Self {
        self.behavior = Behavior::Fail;
        self
    }

    /// Raise an interruption from `run`
    pub fn interrupting(mut self) -> Self {
        self.behavior = Behavior::Interrupt;
        self
    }

    /// Raise a unit error from `run`
    pub fn erroring<S: Into<String>>(mut self, message: S) -> Self {
        self.behavior = Behavior::Error(message.into());
        self
    }

    pub fn accepting_undeclared(mut self) -> Self {
        self.descriptor.accepts_undeclared_args = true;
        self
    }

    pub fn wireless(mut self) -> Self {
        self.descriptor.wireless = true;
        self
    }

    pub fn run_log(&self) -> RunLog {
        self.log.clone()
    }

    /// Registry factory producing a fresh copy per call; copies share the log.
    pub fn factory(self) -> impl Fn() -> Box<dyn Unit> + Send + Sync + 'static {
        move || Box::new(self.clone()) as Box<dyn Unit>
    }
}

impl Unit for MockUnit {
    fn describe(&self) -> UnitDescriptor {
        self.descriptor.clone()
    }

    fn init(&self, args: &mut ArgTable) {
        args.extend(self.args.clone());
    }

    fn prerun(&mut self, args: &ArgTable, _ctx: &mut RunContext<'_>) -> Result<(), UnitError> {
        self.log.push(&self.label, "prerun", args);
        Ok(())
    }

    fn run(
        &mut self,
        args: &ArgTable,
        ctx: &mut RunContext<'_>,
    ) -> Result<UnitOutcome, UnitError> {
        self.log.push(&self.label, "run", args);

        match &self.behavior {
            Behavior::Succeed => {}
            Behavior::Fail => return Ok(UnitOutcome::nok()),
            Behavior::Interrupt => return Err(UnitError::Interrupted),
            Behavior::Error(message) => return Err(UnitError::failed(message.clone())),
        }

        if !ctx.signal("onRun", &Value::String(self.label.clone())) {
            return Ok(UnitOutcome::nok());
        }
        Ok(UnitOutcome::ok(self.output.clone()))
    }

    fn postrun(&mut self, args: &ArgTable, _ctx: &mut RunContext<'_>) {
        self.log.push(&self.label, "postrun", args);
    }
}

/// One message captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Success(String),
    Fail(String),
    Info(String),
    Table {
        title: String,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

/// Reporter that keeps everything in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub reports: Vec<Report>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter_map(|report| match report {
                Report::Fail(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter_map(|report| match report {
                Report::Info(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn successes(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter_map(|report| match report {
                Report::Success(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tables as `(title, rows)`
    pub fn tables(&self) -> Vec<(&str, &[Vec<String>])> {
        self.reports
            .iter()
            .filter_map(|report| match report {
                Report::Table { title, rows, .. } => Some((title.as_str(), rows.as_slice())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }
}

impl Reporter for RecordingReporter {
    fn success(&mut self, message: &str) {
        self.reports.push(Report::Success(message.to_string()));
    }

    fn fail(&mut self, message: &str) {
        self.reports.push(Report::Fail(message.to_string()));
    }

    fn info(&mut self, message: &str) {
        self.reports.push(Report::Info(message.to_string()));
    }

    fn table(&mut self, title: &str, headers: &[&str], rows: &[Vec<String>]) {
        self.reports.push(Report::Table {
            title: title.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows.to_vec(),
        });
    }
}
