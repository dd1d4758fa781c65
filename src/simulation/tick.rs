//! The tick loop itself (§4.7, §5 "Simulation tick: single thread"),
//! grounded on `services/timing.rs`'s `monitor_clock_sources` shape: a
//! `tokio::time::interval` loop gated on a running flag, publishing events
//! over an unbounded `mpsc` channel rather than mutating shared state the
//! caller has to poll.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::producers::CounterProducer;
use crate::simulation::scenario::ScenarioExecutor;
use crate::simulation::state_machine::StateMachine;

/// Events published by the Simulation Engine (§4.7), consumed by the
/// Control Surface's `subscribe(state)`/`subscribe(metrics)` topics (C8).
#[derive(Debug, Clone)]
pub enum SimulationEvent {
    StateTransition { machine: String, to_state: String },
    ScenarioStarted { id: u64, name: String },
    ScenarioStopped { id: u64 },
    CounterWrapped { name: String },
}

/// A counter group watched purely to publish wrap events (§4.7 "Counter
/// producer advancement (purely computed, so tick is only needed to publish
/// events)") — the counter's actual value never depends on this struct.
pub(crate) struct WatchedCounter {
    pub name: String,
    producer: Arc<CounterProducer>,
    last_value: AtomicU64,
}

impl WatchedCounter {
    pub fn new(name: impl Into<String>, producer: Arc<CounterProducer>) -> Self {
        let last_value = producer.value_at(Instant::now());
        Self {
            name: name.into(),
            producer,
            last_value: AtomicU64::new(last_value),
        }
    }

    fn check_wrap(&self, now: Instant) -> bool {
        let value = self.producer.value_at(now);
        let previous = self.last_value.swap(value, Ordering::Relaxed);
        value < previous
    }
}

/// Drives every registered state machine and the scenario executor once per
/// tick, publishing an event for each fired transition, scenario expiry, and
/// counter wrap. Runs until `running` is cleared (by
/// `SimulationEngine::stop`); exits promptly on the next tick boundary
/// rather than mid-tick.
pub(crate) async fn run_tick_loop(
    tick_period: Duration,
    state_machines: Vec<Arc<StateMachine>>,
    scenarios: Arc<ScenarioExecutor>,
    counters: Vec<Arc<WatchedCounter>>,
    event_tx: mpsc::UnboundedSender<SimulationEvent>,
    running: Arc<AtomicBool>,
) {
    let mut interval = tokio::time::interval(tick_period);
    info!(period_ms = tick_period.as_millis() as u64, "simulation tick loop started");

    while running.load(Ordering::Relaxed) {
        interval.tick().await;
        let now = Instant::now();

        for machine in &state_machines {
            if let Some(to_state) = machine.tick(now) {
                debug!(machine = %machine.name, to_state = %to_state, "state machine transitioned");
                let _ = event_tx.send(SimulationEvent::StateTransition {
                    machine: machine.name.clone(),
                    to_state,
                });
            }
        }

        for id in scenarios.tick(now) {
            debug!(scenario_id = id, "scenario expired, snapshot restored");
            let _ = event_tx.send(SimulationEvent::ScenarioStopped { id });
        }

        for counter in &counters {
            if counter.check_wrap(now) {
                let _ = event_tx.send(SimulationEvent::CounterWrapped { name: counter.name.clone() });
            }
        }
    }

    info!("simulation tick loop stopped");
}
