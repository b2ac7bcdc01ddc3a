//! Builtin units shipped with the framework
//!
//! Protocol-specific units live in their own crates; these are generic
//! building blocks useful in any pipeline.

pub mod echo;
pub mod wait;

pub use echo::EchoUnit;
pub use wait::WaitUnit;

use crate::unit::registry::{RegistryError, UnitRegistry};

/// Register every builtin unit under its canonical name
pub fn register_builtins(registry: &mut UnitRegistry) -> Result<(), RegistryError> {
    registry.register("echo", || Box::new(EchoUnit::new()))?;
    registry.register("wait", || Box::new(WaitUnit::new()))?;
    Ok(())
}
