//! Wait unit: pauses the pipeline for a number of seconds

use crate::unit::{ArgTable, RunContext, Unit, UnitDescriptor, UnitError, UnitOutcome};
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};

const SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
pub struct WaitUnit;

impl WaitUnit {
    pub fn new() -> Self {
        Self
    }

    /// Parse the SECONDS argument, accepting strings and numbers (pure function)
    fn parse_seconds(value: Option<&Value>) -> Result<f64, String> {
        let seconds = match value {
            None => return Ok(1.0),
            Some(Value::Number(n)) => n.as_f64().ok_or("SECONDS is not a finite number")?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("Invalid SECONDS value: {s}"))?,
            Some(other) => return Err(format!("Invalid SECONDS value: {other}")),
        };

        if seconds.is_sign_negative() || !seconds.is_finite() {
            return Err(format!("Invalid SECONDS value: {seconds}"));
        }
        Ok(seconds)
    }
}

impl Unit for WaitUnit {
    fn describe(&self) -> UnitDescriptor {
        UnitDescriptor::new("utility", "generic", "Pause the pipeline for SECONDS")
    }

    fn init(&self, args: &mut ArgTable) {
        args.insert("SECONDS".to_string(), json!("1"));
    }

    fn run(&mut self, args: &ArgTable, ctx: &mut RunContext<'_>) -> Result<UnitOutcome, UnitError> {
        let seconds = Self::parse_seconds(args.get("SECONDS")).map_err(UnitError::Failed)?;
        let deadline = Instant::now() + Duration::from_secs_f64(seconds);

        while Instant::now() < deadline {
            ctx.cancel.check()?;
            thread::sleep(SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
        Ok(UnitOutcome::done())
    }
}
