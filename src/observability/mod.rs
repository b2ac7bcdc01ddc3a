//! Observability
//!
//! Structured logging setup and the span macros used across the crate.

pub mod logging;

pub use logging::{init_default_logging, init_logging, init_logging_from_env, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{stage_span, task_span};
