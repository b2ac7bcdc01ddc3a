//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that handle log format
//! and level parsing.

use tracing::Level;
use wirelab::observability::logging::{parse_level, LogFormat};

#[test]
fn test_log_format_parse_json() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("JSON"), LogFormat::Json));
}

#[test]
fn test_log_format_parse_pretty() {
    assert!(matches!(LogFormat::parse("pretty"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("Pretty"), LogFormat::Pretty));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_compact() {
    // Terminal users get the compact format unless they ask otherwise
    for input in ["invalid", "", "xml", "123"] {
        assert!(
            matches!(LogFormat::parse(input), LogFormat::Compact),
            "Failed for input: {input}"
        );
    }
}

#[test]
fn test_log_format_parse_whitespace() {
    assert!(matches!(LogFormat::parse("  json  "), LogFormat::Json));
    assert!(matches!(LogFormat::parse("json\n"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("\tpretty"), LogFormat::Pretty));
}

#[test]
fn test_level_follows_configured_names() {
    assert_eq!(parse_level("INFO"), Level::INFO);
    assert_eq!(parse_level("warning"), Level::WARN);
    assert_eq!(parse_level(" debug "), Level::DEBUG);
    assert_eq!(parse_level("CRITICAL"), Level::INFO);
}
