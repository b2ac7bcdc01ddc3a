//! wirelab - pipeline orchestration core for wireless security tooling
//!
//! Units are small executable components (scanners, sniffers, injectors)
//! registered by name. A user composes them into a pipeline such as
//! `ble_discover|ble_sniff`, sets their parameters and runs it; every stage
//! receives the outputs of the stage before it.
//!
//! # Overview
//!
//! - [`unit`]: the unit contract, registry, hooks, scenarios and device cache
//! - [`pipeline`]: pipeline resolution, parameter routing and execution
//! - [`task`]: background tasks running in forked child processes
//! - [`framework`]: the session orchestrator tying the above together
//! - [`console`]: user-facing commands reporting through a [`Reporter`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wirelab::unit::builtin::register_builtins;
//! use wirelab::{Console, ConsoleReporter, Framework, FrameworkConfig, UnitRegistry};
//!
//! let mut registry = UnitRegistry::new();
//! register_builtins(&mut registry).unwrap();
//!
//! let framework = Framework::new(FrameworkConfig::default(), registry).unwrap();
//! let mut console = Console::new(framework, ConsoleReporter);
//!
//! console.load("echo|wait");
//! console.set("echo1.MESSAGE", "hello");
//! console.set("wait2.SECONDS", "1");
//! console.run();
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod framework;
pub mod observability;
pub mod pipeline;
pub mod task;
pub mod testing;
pub mod unit;

pub use config::{ConfigError, ConfigStore, FrameworkConfig, Settings};
pub use console::{Console, ConsoleReporter, Reporter};
pub use error::{WirelabError, WirelabResult};
pub use framework::Framework;
pub use pipeline::{Pipeline, PipelineSlot};
pub use task::{TaskArgs, TaskManager, TaskState};
pub use unit::registry::UnitRegistry;
pub use unit::{ArgTable, CancelToken, Unit, UnitDescriptor, UnitError, UnitInstance, UnitOutcome};
