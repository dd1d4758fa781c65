//! Device lifecycle state machines (§4.7 "State machine transitions"):
//! named states, each with a list of timed transitions that, on firing,
//! apply an overlay to the owning context's `oid_overrides` atomically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::context::Context;
use crate::model::{AsnValue, Oid};

/// What causes a transition to fire. Only a fixed dwell time is supported
/// today (§6 `state_machines[].transitions[].after_ms`); event-triggered
/// transitions are left to the Control Surface driving `force_state`
/// directly rather than a second trigger kind here.
#[derive(Debug, Clone)]
pub enum TransitionTrigger {
    After(Duration),
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub to_state: String,
    pub trigger: TransitionTrigger,
    pub overlay: Vec<(Oid, AsnValue)>,
}

impl Transition {
    pub fn after(duration: Duration, to_state: impl Into<String>, overlay: Vec<(Oid, AsnValue)>) -> Self {
        Self {
            to_state: to_state.into(),
            trigger: TransitionTrigger::After(duration),
            overlay,
        }
    }
}

/// One device lifecycle machine (e.g. booting/operational/degraded/
/// maintenance/restarting), bound to the context whose overlay it mutates.
pub struct StateMachine {
    pub name: String,
    context: Arc<Context>,
    /// outgoing transitions, keyed by current state name
    transitions: std::collections::HashMap<String, Vec<Transition>>,
    current_state: RwLock<String>,
    entered_at: RwLock<Instant>,
    /// monotonically incremented on every transition, for event dedup by callers
    revision: AtomicU64,
}

impl StateMachine {
    pub fn new(
        name: impl Into<String>,
        context: Arc<Context>,
        initial_state: impl Into<String>,
        transitions: std::collections::HashMap<String, Vec<Transition>>,
    ) -> Self {
        Self {
            name: name.into(),
            context,
            transitions,
            current_state: RwLock::new(initial_state.into()),
            entered_at: RwLock::new(Instant::now()),
            revision: AtomicU64::new(0),
        }
    }

    pub fn current_state(&self) -> String {
        self.current_state.read().expect("state machine lock poisoned").clone()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Relaxed)
    }

    /// Forces an immediate transition to `state`, applying `overlay` the
    /// same way a timed transition would (Control Surface entry point for
    /// event-driven state changes, e.g. a scenario script).
    pub fn force_state(&self, state: impl Into<String>, overlay: Vec<(Oid, AsnValue)>) {
        self.context.apply_overlay(overlay);
        *self.current_state.write().expect("state machine lock poisoned") = state.into();
        *self.entered_at.write().expect("state machine lock poisoned") = Instant::now();
        self.revision.fetch_add(1, Ordering::Relaxed);
    }

    /// Called once per simulation tick. Returns the new state name if a
    /// timed transition fired, `None` otherwise. Only the first transition
    /// whose dwell time has elapsed fires per tick (§4.7: ticks are frequent
    /// enough, default 100ms, that firing more than one per tick would only
    /// matter for transitions shorter than the tick granularity itself).
    pub fn tick(&self, now: Instant) -> Option<String> {
        let current = self.current_state();
        let outgoing = self.transitions.get(&current)?;
        let entered_at = *self.entered_at.read().expect("state machine lock poisoned");
        for transition in outgoing {
            let TransitionTrigger::After(dwell) = transition.trigger;
            if now.saturating_duration_since(entered_at) >= dwell {
                self.force_state(transition.to_state.clone(), transition.overlay.clone());
                return Some(transition.to_state.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::collections::HashMap;

    fn context() -> Arc<Context> {
        Arc::new(Context::new("lab", Arc::new(Store::new()), vec![], vec![]))
    }

    #[test]
    fn fires_after_dwell_time_and_applies_overlay() {
        let ctx = context();
        let oid = Oid::from_str("1.3.6.1.2.1.2.2.1.8.1").unwrap();
        let mut states = HashMap::new();
        states.insert(
            "booting".to_string(),
            vec![Transition::after(
                Duration::from_millis(10),
                "operational",
                vec![(oid.clone(), AsnValue::Integer32(1))],
            )],
        );
        let machine = StateMachine::new("iface1", Arc::clone(&ctx), "booting", states);

        assert!(machine.tick(Instant::now()).is_none());
        assert!(ctx.overlay_get(&oid).is_none());

        let fired = machine.tick(Instant::now() + Duration::from_millis(20));
        assert_eq!(fired.as_deref(), Some("operational"));
        assert_eq!(ctx.overlay_get(&oid), Some(AsnValue::Integer32(1)));
        assert_eq!(machine.current_state(), "operational");
    }

    #[test]
    fn force_state_bumps_revision() {
        let ctx = context();
        let machine = StateMachine::new("iface1", ctx, "operational", HashMap::new());
        let before = machine.revision();
        machine.force_state("degraded", vec![]);
        assert_eq!(machine.revision(), before + 1);
        assert_eq!(machine.current_state(), "degraded");
    }
}
