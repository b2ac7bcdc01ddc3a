//! Echo unit: forwards its whole argument table as output

use crate::unit::{ArgTable, RunContext, Unit, UnitDescriptor, UnitError, UnitOutcome};
use serde_json::Value;
use tracing::info;

/// Accepts any argument and re-emits every argument it holds, which makes it
/// handy for seeding values at the head of a pipeline.
#[derive(Debug, Default)]
pub struct EchoUnit;

impl EchoUnit {
    pub fn new() -> Self {
        Self
    }

    /// Render one argument for the log line (pure function)
    fn render(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Unit for EchoUnit {
    fn describe(&self) -> UnitDescriptor {
        UnitDescriptor::new(
            "utility",
            "generic",
            "Forward every argument as an output value",
        )
        .accepting_undeclared_args()
    }

    fn run(&mut self, args: &ArgTable, ctx: &mut RunContext<'_>) -> Result<UnitOutcome, UnitError> {
        for (name, value) in args {
            if ctx.signal("onEcho", &Value::String(name.clone())) {
                info!(unit = "echo", "{} = {}", name, Self::render(value));
            }
        }
        Ok(UnitOutcome::ok(args.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::device::DeviceCache;
    use crate::unit::{CancelToken, UnitInstance};
    use serde_json::json;

    #[test]
    fn test_echo_forwards_arguments() {
        let mut unit = UnitInstance::new("echo", Box::new(EchoUnit::new()));
        unit.set_arg("TARGET", json!("AA:BB:CC:DD:EE:FF"));
        unit.set_arg("CHANNEL", json!(37));

        let outcome = unit
            .execute(&CancelToken::new(), &mut DeviceCache::new())
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.output.get("TARGET"), Some(&json!("AA:BB:CC:DD:EE:FF")));
        assert_eq!(outcome.output.get("CHANNEL"), Some(&json!(37)));
    }

    #[test]
    fn test_echo_accepts_anything() {
        let unit = UnitInstance::new("echo", Box::new(EchoUnit::new()));
        assert!(unit.accepts("WHATEVER"));
        assert!(unit.args().is_empty());
    }

    #[test]
    fn test_render() {
        assert_eq!(EchoUnit::render(&json!("hci0")), "hci0");
        assert_eq!(EchoUnit::render(&json!(3)), "3");
    }
}
