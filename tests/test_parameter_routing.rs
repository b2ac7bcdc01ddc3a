//! Parameter routing tests
//!
//! Covers bare and dotted addressing, shortcut fan-out, device parameters on
//! wireless units, and the all-or-nothing guarantee of a fanned-out set.

use proptest::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;
use wirelab::pipeline::{ParameterError, PipelineSlot};
use wirelab::testing::MockUnit;
use wirelab::{Framework, FrameworkConfig, UnitInstance, UnitRegistry};

fn registry() -> UnitRegistry {
    let mut registry = UnitRegistry::new();
    registry
        .register("probe", MockUnit::new("probe").with_arg("KNOWN", "initial").factory())
        .unwrap();
    registry
        .register(
            "sniff",
            MockUnit::new("sniff")
                .with_arg("TARGET", "")
                .with_arg("CHANNEL", 37)
                .wireless()
                .factory(),
        )
        .unwrap();
    registry
        .register("echo", MockUnit::new("echo").accepting_undeclared().factory())
        .unwrap();
    registry
}

fn framework_with(dir: &TempDir, toml: &str) -> Framework {
    let mut config = FrameworkConfig::from_toml(toml).unwrap();
    config.settings.temp_dir = dir.path().to_path_buf();
    Framework::new(config, registry()).unwrap()
}

fn framework(dir: &TempDir) -> Framework {
    framework_with(
        dir,
        r#"
[shortcuts.watch]
units = "probe|sniff"

[shortcuts.watch.params]
TARGET = "sniff2.TARGET"
BOTH = "probe1.KNOWN,sniff2.TARGET"
"#,
    )
}

/// Unit at `slot`, or member `member` of the shortcut at `slot`
fn unit(framework: &Framework, slot: usize, member: Option<usize>) -> &UnitInstance {
    match (&framework.pipeline().slots()[slot], member) {
        (PipelineSlot::Unit(unit_slot), None) => &unit_slot.unit,
        (PipelineSlot::Alias(alias), Some(member)) => &alias.members[member].unit,
        _ => panic!("slot {slot} does not match member {member:?}"),
    }
}

#[test]
fn test_no_pipeline_loaded() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);

    assert_eq!(
        framework.set_parameter("TARGET", json!("x")),
        Err(ParameterError::NoUnitLoaded)
    );
}

#[test]
fn test_bare_name_with_single_unit_is_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);
    framework.load("sniff").unwrap();

    framework.set_parameter("target", json!("AA:BB")).unwrap();

    assert_eq!(unit(&framework, 0, None).arg("TARGET"), Some(&json!("AA:BB")));
}

#[test]
fn test_bare_name_with_several_units_is_ambiguous() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);
    framework.load("probe|sniff").unwrap();

    assert_eq!(
        framework.set_parameter("KNOWN", json!("x")),
        Err(ParameterError::AmbiguousTarget("KNOWN".to_string()))
    );
}

#[test]
fn test_dotted_name_addresses_one_slot() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);
    framework.load("probe|probe").unwrap();

    framework.set_parameter("probe2.known", json!("second")).unwrap();

    assert_eq!(unit(&framework, 0, None).arg("KNOWN"), Some(&json!("initial")));
    assert_eq!(unit(&framework, 1, None).arg("KNOWN"), Some(&json!("second")));
}

#[test]
fn test_dotted_name_with_unknown_slot() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);
    framework.load("probe|probe").unwrap();

    assert_eq!(
        framework.set_parameter("probe3.KNOWN", json!("x")),
        Err(ParameterError::UnknownParameter("probe3.KNOWN".to_string()))
    );
}

#[test]
fn test_undeclared_argument_rejected_unless_accepted() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);

    framework.load("probe").unwrap();
    assert_eq!(
        framework.set_parameter("EXTRA", json!(1)),
        Err(ParameterError::UnknownParameter("EXTRA".to_string()))
    );

    framework.load("echo").unwrap();
    framework.set_parameter("EXTRA", json!(1)).unwrap();
    assert_eq!(unit(&framework, 0, None).arg("EXTRA"), Some(&json!(1)));
}

#[test]
fn test_device_parameter_goes_to_device_configuration() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);
    framework.load("sniff").unwrap();

    framework.set_parameter("gain", json!(40)).unwrap();

    let sniff = unit(&framework, 0, None);
    assert_eq!(sniff.device_config().get("GAIN"), Some(&json!(40)));
    assert_eq!(sniff.arg("GAIN"), None);
}

#[test]
fn test_device_parameter_rejected_on_non_wireless_unit() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);
    framework.load("probe").unwrap();

    assert!(matches!(
        framework.set_parameter("GAIN", json!(40)),
        Err(ParameterError::UnknownParameter(_))
    ));
}

#[test]
fn test_shortcut_parameter_fans_out() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);
    framework.load("watch").unwrap();

    framework.set_parameter("both", json!("AA:BB")).unwrap();

    assert_eq!(unit(&framework, 0, Some(0)).arg("KNOWN"), Some(&json!("AA:BB")));
    assert_eq!(unit(&framework, 0, Some(1)).arg("TARGET"), Some(&json!("AA:BB")));
}

#[test]
fn test_shortcut_hides_member_parameters() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);
    framework.load("watch").unwrap();

    assert_eq!(
        framework.set_parameter("CHANNEL", json!(38)),
        Err(ParameterError::UnknownParameter("CHANNEL".to_string()))
    );
}

#[test]
fn test_shortcut_inside_longer_pipeline_needs_prefix() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework(&dir);
    framework.load("probe|watch").unwrap();

    framework.set_parameter("watch2.TARGET", json!("CC:DD")).unwrap();

    assert_eq!(unit(&framework, 1, Some(1)).arg("TARGET"), Some(&json!("CC:DD")));
    assert_eq!(unit(&framework, 0, None).arg("KNOWN"), Some(&json!("initial")));
}

#[test]
fn test_bare_target_inside_multi_member_shortcut_is_ambiguous() {
    let dir = TempDir::new().unwrap();
    let mut framework = framework_with(
        &dir,
        r#"
[shortcuts.bad]
units = "probe|sniff"

[shortcuts.bad.params]
TARGET = "TARGET"
"#,
    );
    framework.load("bad").unwrap();

    assert_eq!(
        framework.set_parameter("TARGET", json!("x")),
        Err(ParameterError::AmbiguousTarget("TARGET".to_string()))
    );
}

fn target_strategy() -> impl Strategy<Value = Vec<(usize, bool)>> {
    prop::collection::vec((0usize..3, any::<bool>()), 1..6)
}

proptest! {
    /// A fanned-out set writes every target or none of them.
    #[test]
    fn prop_fan_out_is_all_or_nothing(targets in target_strategy()) {
        let mapping: Vec<String> = targets
            .iter()
            .map(|(member, valid)| {
                let param = if *valid { "KNOWN" } else { "MISSING" };
                format!("probe{}.{}", member + 1, param)
            })
            .collect();
        let toml = format!(
            "[shortcuts.fan]\nunits = \"probe|probe|probe\"\n\n[shortcuts.fan.params]\nX = \"{}\"\n",
            mapping.join(",")
        );

        let dir = TempDir::new().unwrap();
        let mut framework = framework_with(&dir, &toml);
        framework.load("fan").unwrap();

        let result = framework.set_parameter("X", json!("written"));
        let all_valid = targets.iter().all(|(_, valid)| *valid);
        prop_assert_eq!(result.is_ok(), all_valid);

        for member in 0..3 {
            let targeted = targets.iter().any(|(m, _)| *m == member);
            let expected: Value = if all_valid && targeted {
                json!("written")
            } else {
                json!("initial")
            };
            prop_assert_eq!(unit(&framework, 0, Some(member)).arg("KNOWN"), Some(&expected));
        }
    }
}
