//! Testing utilities and mock implementations
//!
//! Mock units and a recording reporter for exercising pipelines and the
//! console without real radio hardware.

pub mod mocks;

pub use mocks::*;
