//! Scenario executor (§4.7 "Scenario executor"): runs a time-boxed script of
//! config/overlay changes against one context, then restores the
//! pre-scenario snapshot exactly — whether it expires naturally or is
//! stopped early through the Control Surface (§4.8 `stop_scenario`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::context::Context;
use crate::model::{AsnValue, Oid};

/// A scenario to run: apply `overlay` to `context` for `duration`, then undo.
#[derive(Clone)]
pub struct ScenarioSpec {
    pub name: String,
    pub context: Arc<Context>,
    pub duration: Duration,
    pub overlay: Vec<(Oid, AsnValue)>,
}

struct RunningScenario {
    spec: ScenarioSpec,
    started_at: Instant,
    /// Pre-scenario value per overridden OID, `None` meaning "not overlaid
    /// before this scenario" (so restore clears it rather than reinstating
    /// a stale value).
    snapshot: Vec<(Oid, Option<AsnValue>)>,
}

fn restore(running: &RunningScenario) {
    for (oid, previous) in &running.snapshot {
        match previous {
            Some(value) => running.spec.context.apply_overlay([(oid.clone(), value.clone())]),
            None => running.spec.context.clear_overlay(oid),
        }
    }
}

/// Owns every in-flight scenario across all contexts. One instance per
/// simulator process, driven by the tick loop and addressed by ID from the
/// Control Surface.
pub struct ScenarioExecutor {
    next_id: AtomicU64,
    running: RwLock<HashMap<u64, RunningScenario>>,
}

impl ScenarioExecutor {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            running: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshots the pre-scenario overlay state, applies the scenario's
    /// overlay, and registers it for expiry tracking. Returns the scenario
    /// ID callers use with [`ScenarioExecutor::stop`].
    pub fn start(&self, spec: ScenarioSpec) -> u64 {
        let snapshot = spec
            .overlay
            .iter()
            .map(|(oid, _)| (oid.clone(), spec.context.overlay_get(oid)))
            .collect();
        spec.context.apply_overlay(spec.overlay.clone());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let running = RunningScenario {
            spec,
            started_at: Instant::now(),
            snapshot,
        };
        self.running
            .write()
            .expect("scenario table poisoned")
            .insert(id, running);
        id
    }

    /// Stops a scenario before its natural expiry, restoring its snapshot.
    /// Returns `false` if `id` is unknown (already expired or never existed).
    pub fn stop(&self, id: u64) -> bool {
        let mut guard = self.running.write().expect("scenario table poisoned");
        match guard.remove(&id) {
            Some(running) => {
                restore(&running);
                true
            }
            None => false,
        }
    }

    /// Called once per simulation tick (§4.7): restores and removes every
    /// scenario whose `duration` has elapsed. Returns the IDs that expired,
    /// so the caller can publish `ScenarioStopped` events for each.
    pub fn tick(&self, now: Instant) -> Vec<u64> {
        let mut expired = Vec::new();
        let mut guard = self.running.write().expect("scenario table poisoned");
        guard.retain(|id, running| {
            let due = now.saturating_duration_since(running.started_at) >= running.spec.duration;
            if due {
                restore(running);
                expired.push(*id);
            }
            !due
        });
        expired
    }

    pub fn is_running(&self, id: u64) -> bool {
        self.running.read().expect("scenario table poisoned").contains_key(&id)
    }
}

impl Default for ScenarioExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn context() -> Arc<Context> {
        Arc::new(Context::new("lab", Arc::new(Store::new()), vec![], vec![]))
    }

    #[test]
    fn start_applies_overlay_and_stop_restores_prior_state() {
        let ctx = context();
        let oid = Oid::from_str("1.3.6.1.2.1.2.2.1.8.1").unwrap();
        ctx.apply_overlay([(oid.clone(), AsnValue::Integer32(1))]);

        let executor = ScenarioExecutor::new();
        let id = executor.start(ScenarioSpec {
            name: "link-flap".into(),
            context: Arc::clone(&ctx),
            duration: Duration::from_secs(60),
            overlay: vec![(oid.clone(), AsnValue::Integer32(2))],
        });
        assert_eq!(ctx.overlay_get(&oid), Some(AsnValue::Integer32(2)));

        assert!(executor.stop(id));
        assert_eq!(ctx.overlay_get(&oid), Some(AsnValue::Integer32(1)));
        assert!(!executor.is_running(id));
    }

    #[test]
    fn expires_naturally_on_tick_and_clears_oid_with_no_prior_overlay() {
        let ctx = context();
        let oid = Oid::from_str("1.3.6.1.2.1.2.2.1.8.1").unwrap();
        let executor = ScenarioExecutor::new();
        let id = executor.start(ScenarioSpec {
            name: "brief-outage".into(),
            context: Arc::clone(&ctx),
            duration: Duration::from_millis(10),
            overlay: vec![(oid.clone(), AsnValue::Integer32(2))],
        });
        assert!(executor.tick(Instant::now()).is_empty());
        let expired = executor.tick(Instant::now() + Duration::from_millis(20));
        assert_eq!(expired, vec![id]);
        assert!(ctx.overlay_get(&oid).is_none());
    }

    #[test]
    fn stop_of_unknown_id_returns_false() {
        let executor = ScenarioExecutor::new();
        assert!(!executor.stop(999));
    }
}
