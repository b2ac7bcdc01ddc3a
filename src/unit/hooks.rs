//! Event hooks and scenarios
//!
//! A unit fires named events while it runs (`ctx.signal("onKey", ...)`). Each
//! event has an ordered list of handlers; the first handler that does not
//! abstain decides whether the unit keeps its default behavior. A scenario is
//! a named bundle of handlers that attaches itself to a unit's [`Hooks`].

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Answer a hook handler gives for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    /// Let the next handler (or the default behavior) decide
    Abstain,
    /// `true` runs the default behavior, `false` suppresses it
    Override(bool),
}

pub type HookHandler = Box<dyn Fn(&Value) -> HookDecision + Send + Sync>;

#[derive(Default)]
pub struct Hooks {
    handlers: HashMap<String, Vec<HookHandler>>,
}

impl Hooks {
    pub fn on<S, F>(&mut self, event: S, handler: F)
    where
        S: Into<String>,
        F: Fn(&Value) -> HookDecision + Send + Sync + 'static,
    {
        self.handlers
            .entry(event.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Fire `event`; returns whether the default behavior should run.
    pub fn fire(&self, event: &str, payload: &Value) -> bool {
        let Some(handlers) = self.handlers.get(event) else {
            return true;
        };

        for handler in handlers {
            if let HookDecision::Override(run_default) = handler(payload) {
                debug!(event, run_default, "Hook overrode default behavior");
                return run_default;
            }
        }
        true
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

/// A named collection of hook handlers.
pub trait Scenario: Send + Sync {
    fn description(&self) -> &str {
        "A generic collection of callbacks"
    }

    fn attach(&self, hooks: &mut Hooks);
}

#[derive(Default, Clone)]
pub struct ScenarioRegistry {
    scenarios: BTreeMap<String, Arc<dyn Scenario>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: Into<String>>(&mut self, name: S, scenario: Arc<dyn Scenario>) {
        self.scenarios.insert(name.into(), scenario);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Scenario>> {
        self.scenarios.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }
}
