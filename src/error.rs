//! Crate-level error type
//!
//! Each subsystem keeps its own error enum; `WirelabError` wraps them for
//! callers that drive the whole framework.

use crate::config::ConfigError;
use crate::pipeline::{ExecutionError, ParameterError, ResolveError};
use crate::task::TaskError;
use crate::unit::device::DeviceError;
use crate::unit::registry::RegistryError;
use thiserror::Error;

/// Main error type for framework operations
#[derive(Debug, Error)]
pub enum WirelabError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Load failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("{0}")]
    Execution(#[from] ExecutionError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl WirelabError {
    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// True when the error comes from a user interrupt rather than a failure
    pub fn is_interrupt(&self) -> bool {
        matches!(self, WirelabError::Execution(ExecutionError::Interrupted { .. }))
    }
}

/// Result type for framework operations
pub type WirelabResult<T> = Result<T, WirelabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_constructor() {
        let error = WirelabError::invalid_input("expected NAME=VALUE");
        assert!(matches!(error, WirelabError::InvalidInput { .. }));
        assert_eq!(error.to_string(), "Invalid input: expected NAME=VALUE");
    }

    #[test]
    fn test_internal_error_constructor() {
        let error = WirelabError::internal_error("runtime gone");
        assert_eq!(error.to_string(), "Internal error: runtime gone");
    }

    #[test]
    fn test_subsystem_errors_convert() {
        let error: WirelabError = ResolveError::NotFound("ble_jam".into()).into();
        assert_eq!(error.to_string(), "Load failed: Unknown unit or shortcut: ble_jam");

        let error: WirelabError = ParameterError::NoUnitLoaded.into();
        assert!(matches!(error, WirelabError::Parameter(_)));
    }

    #[test]
    fn test_interrupt_detection() {
        let interrupted: WirelabError = ExecutionError::Interrupted {
            stage: "ble_sniff".into(),
        }
        .into();
        assert!(interrupted.is_interrupt());

        let failed: WirelabError = ExecutionError::StageFailed {
            stage: "ble_sniff".into(),
        }
        .into();
        assert!(!failed.is_interrupt());
    }
}
