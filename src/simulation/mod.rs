//! Simulation Engine (C7, §4.7): a single cooperative ticking scheduler
//! driving counter-wrap publication, state machine transitions, and the
//! scenario executor. A running flag gates a spawned `tokio::time::interval`
//! loop that recomputes state and publishes events each tick.

pub mod scenario;
pub mod state_machine;
mod tick;

pub use scenario::{ScenarioExecutor, ScenarioSpec};
pub use state_machine::{StateMachine, Transition, TransitionTrigger};
pub use tick::SimulationEvent;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::producers::CounterProducer;
use tick::WatchedCounter;

/// Orchestrates every C7 concern: the tick loop, registered state machines,
/// watched counter groups, and the scenario executor. Constructed once per
/// simulator process and wired into `core::engine::SimulatorEngine`.
pub struct SimulationEngine {
    tick_period: Duration,
    state_machines: Vec<Arc<StateMachine>>,
    counters: Vec<Arc<WatchedCounter>>,
    scenarios: Arc<ScenarioExecutor>,
    running: Arc<AtomicBool>,
    event_tx: mpsc::UnboundedSender<SimulationEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SimulationEvent>>,
}

impl SimulationEngine {
    pub fn new(tick_period: Duration) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            tick_period,
            state_machines: Vec::new(),
            counters: Vec::new(),
            scenarios: Arc::new(ScenarioExecutor::new()),
            running: Arc::new(AtomicBool::new(false)),
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    pub fn register_state_machine(&mut self, machine: Arc<StateMachine>) {
        self.state_machines.push(machine);
    }

    /// Registers a counter group purely for wrap-event publication — the
    /// counter's value is already a pure function of elapsed time (§4.2),
    /// this only drives `SimulationEvent::CounterWrapped`.
    pub fn watch_counter(&mut self, name: impl Into<String>, producer: Arc<CounterProducer>) {
        self.counters.push(Arc::new(WatchedCounter::new(name, producer)));
    }

    pub fn scenarios(&self) -> Arc<ScenarioExecutor> {
        Arc::clone(&self.scenarios)
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SimulationEvent>> {
        self.event_rx.take()
    }

    /// Starts a scenario (§4.8 `start_scenario`) and publishes
    /// `ScenarioStarted`; natural expiry and early `stop_scenario` both
    /// publish `ScenarioStopped` from a single path (the tick loop / `stop`
    /// below), so subscribers never have to distinguish the two.
    pub fn start_scenario(&self, spec: ScenarioSpec) -> u64 {
        let name = spec.name.clone();
        let id = self.scenarios.start(spec);
        let _ = self.event_tx.send(SimulationEvent::ScenarioStarted { id, name });
        id
    }

    pub fn stop_scenario(&self, id: u64) -> bool {
        let stopped = self.scenarios.stop(id);
        if stopped {
            let _ = self.event_tx.send(SimulationEvent::ScenarioStopped { id });
        }
        stopped
    }

    /// Spawns the tick loop task (§5: "Simulation tick: single thread").
    pub fn start(&mut self) {
        self.running.store(true, Ordering::SeqCst);
        tokio::spawn(tick::run_tick_loop(
            self.tick_period,
            self.state_machines.clone(),
            Arc::clone(&self.scenarios),
            self.counters.clone(),
            self.event_tx.clone(),
            Arc::clone(&self.running),
        ));
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
