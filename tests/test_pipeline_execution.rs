//! Pipeline execution tests
//!
//! Stages run in order, each seeing the outputs carried from the stages
//! before it. The first failure stops the run.

use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wirelab::pipeline::ExecutionError;
use wirelab::testing::{MockUnit, RunLog};
use wirelab::unit::hooks::{HookDecision, Hooks, Scenario};
use wirelab::{Framework, FrameworkConfig, UnitRegistry, WirelabError};

const CONFIG: &str = r#"
[shortcuts.watch]
units = "discover|sniff"

[shortcuts.watch.params]
TARGET = "sniff2.TARGET"
"#;

struct Harness {
    _dir: TempDir,
    framework: Framework,
    log: RunLog,
}

/// Register `units` sharing one run log; discover and sniff get defaults
/// unless `units` overrides them.
fn harness(units: Vec<(&str, MockUnit)>) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = FrameworkConfig::from_toml(CONFIG).unwrap();
    config.settings.temp_dir = dir.path().to_path_buf();

    let log = RunLog::new();
    let mut registry = UnitRegistry::new();
    let defaults = vec![
        (
            "discover",
            MockUnit::new("discover")
                .with_output("TARGET", "AA:BB:CC:DD:EE:FF")
                .with_output("RSSI", -40),
        ),
        (
            "sniff",
            MockUnit::new("sniff")
                .with_arg("TARGET", "")
                .with_arg("SCENARIO", ""),
        ),
    ];
    for (name, unit) in units.into_iter().chain(defaults) {
        if registry.contains(name) {
            continue;
        }
        registry
            .register(name, unit.with_log(log.clone()).factory())
            .unwrap();
    }

    Harness {
        framework: Framework::new(config, registry).unwrap(),
        log,
        _dir: dir,
    }
}

struct Mute;

impl Scenario for Mute {
    fn attach(&self, hooks: &mut Hooks) {
        hooks.on("onRun", |_| HookDecision::Override(false));
    }
}

#[test]
fn test_outputs_carry_into_accepting_stages() {
    let mut h = harness(vec![]);
    h.framework.load("discover|sniff").unwrap();

    let carried = h.framework.run().unwrap();

    let sniff_args = h.log.last_args("sniff").unwrap();
    assert_eq!(sniff_args.get("TARGET"), Some(&json!("AA:BB:CC:DD:EE:FF")));
    // sniff never declared RSSI
    assert_eq!(sniff_args.get("RSSI"), None);
    assert_eq!(carried.get("RSSI"), Some(&json!(-40)));
}

#[test]
fn test_carried_output_overrides_user_value() {
    let mut h = harness(vec![]);
    h.framework.load("discover|sniff").unwrap();
    h.framework
        .set_parameter("sniff2.TARGET", json!("11:22:33:44:55:66"))
        .unwrap();

    h.framework.run().unwrap();

    assert_eq!(
        h.log.last_args("sniff").unwrap().get("TARGET"),
        Some(&json!("AA:BB:CC:DD:EE:FF"))
    );
}

#[test]
fn test_user_value_used_when_nothing_is_carried() {
    let mut h = harness(vec![]);
    h.framework.load("sniff").unwrap();
    h.framework
        .set_parameter("TARGET", json!("11:22:33:44:55:66"))
        .unwrap();

    h.framework.run().unwrap();

    assert_eq!(
        h.log.last_args("sniff").unwrap().get("TARGET"),
        Some(&json!("11:22:33:44:55:66"))
    );
}

#[test]
fn test_failure_stops_later_stages() {
    let mut h = harness(vec![("jam", MockUnit::new("jam").failing())]);
    h.framework.load("discover|jam|sniff").unwrap();

    let err = h.framework.run().unwrap_err();

    assert!(matches!(err, ExecutionError::StageFailed { .. }));
    assert_eq!(err.stage(), "jam2");
    assert_eq!(h.log.executed(), vec!["discover", "jam"]);
    assert!(h.log.phases("sniff").is_empty());
}

#[test]
fn test_shortcut_members_run_as_stages() {
    let mut h = harness(vec![]);
    h.framework.load("watch").unwrap();

    h.framework.run().unwrap();

    assert_eq!(h.log.executed(), vec!["discover", "sniff"]);
    assert_eq!(
        h.log.last_args("sniff").unwrap().get("TARGET"),
        Some(&json!("AA:BB:CC:DD:EE:FF"))
    );
}

#[test]
fn test_shortcut_member_failure_names_the_member() {
    let mut h = harness(vec![("jam", MockUnit::new("jam").failing())]);
    h.framework.load("jam|watch").unwrap();

    let err = h.framework.run().unwrap_err();
    assert_eq!(err.stage(), "jam1");

    let mut h = harness(vec![("sniff", MockUnit::new("sniff").erroring("radio lost"))]);
    h.framework.load("discover|watch").unwrap();

    let err = h.framework.run().unwrap_err();
    assert!(matches!(err, ExecutionError::Unit { .. }));
    assert_eq!(err.stage(), "watch2.sniff2");
    assert!(err.to_string().contains("radio lost"));
}

#[test]
fn test_interruption_is_reported_as_interrupt() {
    let mut h = harness(vec![("sniff", MockUnit::new("sniff").interrupting())]);
    h.framework.load("discover|sniff").unwrap();

    let err = WirelabError::from(h.framework.run().unwrap_err());

    assert!(err.is_interrupt());
    assert_eq!(h.log.phases("sniff"), vec!["prerun", "run", "postrun"]);
}

#[test]
fn test_scenario_replaces_default_behavior() {
    let mut h = harness(vec![]);
    h.framework
        .scenarios_mut()
        .register("mute", Arc::new(Mute));
    h.framework.load("sniff").unwrap();

    h.framework.run().unwrap();

    h.framework.set_parameter("SCENARIO", json!("mute")).unwrap();
    let err = h.framework.run().unwrap_err();
    assert!(matches!(err, ExecutionError::StageFailed { .. }));
}

#[test]
fn test_unknown_scenario_fails_the_stage() {
    let mut h = harness(vec![]);
    h.framework.load("sniff").unwrap();
    h.framework.set_parameter("SCENARIO", json!("ghost")).unwrap();

    let err = h.framework.run().unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::UnknownScenario { ref scenario, .. } if scenario == "ghost"
    ));
    assert!(h.log.executed().is_empty());
}

#[test]
fn test_rerun_uses_same_instances() {
    let mut h = harness(vec![]);
    h.framework.load("discover|sniff").unwrap();

    h.framework.run().unwrap();
    h.framework.run().unwrap();

    assert_eq!(
        h.log.executed(),
        vec!["discover", "sniff", "discover", "sniff"]
    );
}
