//! Core orchestrator (§4, §5; SPEC_FULL.md §C): wires the Record Store
//! (C1) through the Control Surface (C8) into one running simulator.
//! Owns the periodic restart task (§6 `restart: {enabled, interval_s,
//! downtime_s, jitter_s}`), since it is the only place holding both the
//! Transport (C6) and Simulation Engine (C7).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::behavior::{
    AgentxDelay, BehaviorChain, ErrorInjector, GlobalDelay, MibBoundaryInjector, PacketDrop,
    ResourceGate, ResourceLimitAction,
};
use crate::config::{BehaviorsConfig, DropSideConfig, SimulatorConfig, StateMachineConfig};
use crate::context::{Context, ContextResolver};
use crate::control::{ControlEvent, ControlSurface};
use crate::model::{AsnValue, DropSide, ErrorStatus, Oid, TypeCode};
use crate::producers::{DelayDistribution, UsmStatsProducer};
use crate::protocol::engine::{EngineIdentity, ProtocolEngine, RegisteredUser, UsmFailure};
use crate::protocol::usm::{AuthProtocol, PrivProtocol};
use crate::simulation::{SimulationEngine, StateMachine, Transition};
use crate::store::loader::{self, LoadContext};
use crate::store::{Record, Store};
use crate::transport::{EndpointSpec, Transport, TransportConfig};
use crate::{Error, Result};

/// Top-level lifecycle events, forwarded from C6/C7's own event channels
/// and published on the Control Surface's unified stream.
#[derive(Debug, Clone)]
pub enum SimulatorEvent {
    Started,
    Stopped,
    ContextLoaded { name: String, record_count: usize },
    ScenarioStarted { id: u64, name: String },
    ScenarioStopped { id: u64 },
    Restarted { engine_boots: i32 },
    Error { message: String },
}

/// Owns every C1–C8 component for one simulator process.
pub struct SimulatorEngine {
    config: SimulatorConfig,
    transport: Arc<Transport>,
    simulation: Arc<SimulationEngine>,
    control: Arc<ControlSurface>,
    is_running: Arc<AtomicBool>,
    start_time: Option<Instant>,
    event_tx: mpsc::UnboundedSender<SimulatorEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SimulatorEvent>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SimulatorEngine {
    /// Builds every component from `config` but starts nothing (§5: startup
    /// is two phases — construct, then `start`). Loads each context's data
    /// file and validates the whole config first, so a bad config never
    /// leaves a half-built engine behind.
    pub async fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;

        let engine_id = derive_engine_id(&config.general.node_id);
        let identity = Arc::new(EngineIdentity::new(engine_id.clone(), 1));
        for user in &config.v3_users {
            identity.register_user(user.username.clone(), build_registered_user(&engine_id, user)?);
        }

        let mut load_ctx = LoadContext::new(Instant::now());
        let mut context_resolver = ContextResolver::new(
            config
                .contexts
                .first()
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "default".to_string()),
        );
        let mut loaded_counts = Vec::new();
        for context_cfg in &config.contexts {
            let contents = std::fs::read_to_string(&context_cfg.store_ref)?;
            let mut records = loader::parse_records(&contents, &mut load_ctx)?;
            loaded_counts.push((context_cfg.name.clone(), records.len()));
            records.extend(usm_stats_records(Arc::clone(&identity)));
            let store = Arc::new(Store::from_records(records));

            let denied_patterns = context_cfg
                .denied_patterns
                .iter()
                .map(|p| regex::Regex::new(p).map_err(|e| Error::parse(format!("denied pattern: {e}"))))
                .collect::<Result<Vec<_>>>()?;

            let context = Context::new(
                context_cfg.name.clone(),
                store,
                context_cfg.allowed_users.clone(),
                denied_patterns,
            );
            for (oid_str, spec) in &context_cfg.oid_overrides {
                let oid = Oid::from_str(oid_str)?;
                context.apply_overlay([(oid, parse_overlay_value(spec)?)]);
            }
            context_resolver.register_context(context);
            context_resolver.map_community(context_cfg.name.clone(), context_cfg.name.clone());
        }
        let context_resolver = Arc::new(context_resolver);

        let behavior_chain = Arc::new(build_behavior_chain(&config.behaviors));

        let protocol_engine = Arc::new(ProtocolEngine::new(
            Arc::clone(&identity),
            Arc::clone(&context_resolver),
            behavior_chain,
            config.limits.max_repetitions_cap,
            config.limits.pdu_max_bytes,
        ));

        let mut simulation = SimulationEngine::new(Duration::from_millis(config.general.tick_ms));
        for machine_cfg in &config.state_machines {
            let context = context_resolver
                .get_context(&machine_cfg.context)
                .ok_or_else(|| Error::invalid_state(format!("state machine {}: unknown context", machine_cfg.id)))?;
            simulation.register_state_machine(Arc::new(build_state_machine(machine_cfg, context)?));
        }
        for counter_cfg in &config.counters {
            let group = Arc::new(crate::producers::CounterGroup::new(
                load_ctx.epoch(),
                counter_cfg.bits,
                counter_cfg.rate,
                counter_cfg.acceleration,
            ));
            for oid_str in &counter_cfg.oids {
                let producer = Arc::new(crate::producers::CounterProducer::new(Arc::clone(&group), 0));
                simulation.watch_counter(oid_str.clone(), producer);
            }
        }
        let simulation_event_rx = simulation.take_event_receiver().expect("event receiver taken exactly once");
        // Started here, before the `Arc` wrap below hands out shared clones
        // (to `Transport`'s restart task and `ControlSurface`), since
        // `SimulationEngine::start` takes `&mut self` and this is the last
        // point at which this engine has unique ownership of it.
        simulation.start();
        let simulation = Arc::new(simulation);

        let mut transport = Transport::new(
            Arc::clone(&protocol_engine),
            Arc::clone(&identity),
            TransportConfig {
                processing_budget: Duration::from_millis(config.limits.per_request_budget_ms),
                ..TransportConfig::default()
            },
        );
        let transport_event_rx = transport.take_event_receiver().expect("event receiver taken exactly once");

        let endpoints = config
            .endpoints
            .iter()
            .map(|e| {
                Ok(EndpointSpec {
                    name: e.name.clone(),
                    bind_addr: e
                        .udp
                        .parse()
                        .map_err(|err| Error::parse(format!("endpoint {}: {err}", e.name)))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        transport.start(endpoints).await?;
        let transport = Arc::new(transport);

        let control = Arc::new(ControlSurface::new(
            config.clone(),
            Arc::clone(&context_resolver),
            Arc::clone(&simulation),
        ));

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        for (name, record_count) in loaded_counts {
            let _ = event_tx.send(SimulatorEvent::ContextLoaded { name, record_count });
        }

        let mut engine = Self {
            config,
            transport,
            simulation,
            control,
            is_running: Arc::new(AtomicBool::new(false)),
            start_time: None,
            event_tx,
            event_rx: Some(event_rx),
            tasks: Vec::new(),
        };
        engine.spawn_event_forwarders(transport_event_rx, simulation_event_rx);
        Ok(engine)
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SimulatorEvent>> {
        self.event_rx.take()
    }

    pub fn control_surface(&self) -> Arc<ControlSurface> {
        Arc::clone(&self.control)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Marks the engine running and, if configured, spawns the periodic
    /// restart task (§6 `restart`). Transport is already listening and the
    /// Simulation Engine's tick loop is already running by the time `new`
    /// returns (§5: both bind/start at construction, while unique owners of
    /// their own `&mut self`, before being handed out as `Arc` clones).
    pub fn start(&mut self) {
        if self.config.restart.enabled {
            let transport = Arc::clone(&self.transport);
            let running = Arc::clone(&self.is_running);
            let event_tx = self.event_tx.clone();
            let interval = Duration::from_secs(self.config.restart.interval_s);
            let downtime = Duration::from_secs(self.config.restart.downtime_s);
            let jitter_s = self.config.restart.jitter_s;
            self.tasks.push(tokio::spawn(async move {
                while running.load(Ordering::Relaxed) {
                    let jitter = if jitter_s > 0 {
                        Duration::from_secs(rand::thread_rng().gen_range(0..=jitter_s))
                    } else {
                        Duration::ZERO
                    };
                    tokio::time::sleep(interval + jitter).await;
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    info!("simulating periodic restart");
                    transport.simulate_restart(downtime).await;
                }
            }));
        }

        self.is_running.store(true, Ordering::SeqCst);
        self.start_time = Some(Instant::now());
        let _ = self.event_tx.send(SimulatorEvent::Started);
    }

    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.simulation.stop();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let _ = self.event_tx.send(SimulatorEvent::Stopped);
        info!("simulator engine stopped");
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Forwards C6/C7 events onto both the `SimulatorEvent` channel (for a
    /// process supervisor) and the Control Surface's unified stream (for
    /// `subscribe`).
    fn spawn_event_forwarders(
        &mut self,
        mut transport_rx: mpsc::UnboundedReceiver<crate::transport::TransportEvent>,
        mut simulation_rx: mpsc::UnboundedReceiver<crate::simulation::SimulationEvent>,
    ) {
        let control = Arc::clone(&self.control);
        let event_tx = self.event_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                if let crate::transport::TransportEvent::Restarted { engine_boots } = &event {
                    let _ = event_tx.send(SimulatorEvent::Restarted { engine_boots: *engine_boots });
                }
                control.publish(ControlEvent::SnmpActivity(event));
            }
        }));

        let control = Arc::clone(&self.control);
        let event_tx = self.event_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = simulation_rx.recv().await {
                match &event {
                    crate::simulation::SimulationEvent::ScenarioStarted { id, name } => {
                        let _ = event_tx.send(SimulatorEvent::ScenarioStarted { id: *id, name: name.clone() });
                    }
                    crate::simulation::SimulationEvent::ScenarioStopped { id } => {
                        let _ = event_tx.send(SimulatorEvent::ScenarioStopped { id: *id });
                    }
                    _ => {}
                }
                control.publish(ControlEvent::State(event));
            }
        }));
    }
}

impl Drop for SimulatorEngine {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Seeds each context with the six `usmStats*` counters (RFC 3414 §5,
/// rooted at `1.3.6.1.6.3.15.1.1`) as producer-backed records, so they are
/// walkable/queryable like any other OID instead of living only inside a
/// USM failure report (SPEC_FULL.md §B).
fn usm_stats_records(identity: Arc<EngineIdentity>) -> Vec<Record> {
    [
        (1u32, UsmFailure::UnsupportedSecLevel),
        (2, UsmFailure::NotInTimeWindow),
        (3, UsmFailure::UnknownUserName),
        (4, UsmFailure::UnknownEngineId),
        (5, UsmFailure::WrongDigest),
        (6, UsmFailure::DecryptionError),
    ]
    .into_iter()
    .map(|(column, failure)| {
        let oid = Oid::new(vec![1, 3, 6, 1, 6, 3, 15, 1, 1, column, 0]);
        Record::new(oid, TypeCode::Counter32, AsnValue::Counter32(0))
            .with_producer(Arc::new(UsmStatsProducer::new(Arc::clone(&identity), failure)))
    })
    .collect()
}

fn derive_engine_id(node_id: &str) -> Vec<u8> {
    let mut id = vec![0x80, 0x00, 0x00, 0x00, 0x05];
    id.extend_from_slice(node_id.as_bytes());
    id.truncate(32);
    id
}

fn build_registered_user(engine_id: &[u8], user: &crate::config::V3UserConfig) -> Result<RegisteredUser> {
    let auth = user
        .auth
        .as_ref()
        .map(|a| Ok::<_, Error>((parse_auth_protocol(&a.proto)?, a.key.as_bytes())))
        .transpose()?;
    let privacy = user
        .privacy
        .as_ref()
        .map(|p| Ok::<_, Error>((parse_priv_protocol(&p.proto)?, p.key.as_bytes())))
        .transpose()?;
    Ok(RegisteredUser::localize(engine_id, auth, privacy))
}

fn parse_auth_protocol(name: &str) -> Result<AuthProtocol> {
    Ok(match name {
        "md5" => AuthProtocol::Md5,
        "sha1" => AuthProtocol::Sha1,
        "sha224" => AuthProtocol::Sha224,
        "sha256" => AuthProtocol::Sha256,
        "sha384" => AuthProtocol::Sha384,
        "sha512" => AuthProtocol::Sha512,
        other => return Err(Error::parse(format!("unknown auth protocol: {other}"))),
    })
}

fn parse_priv_protocol(name: &str) -> Result<PrivProtocol> {
    Ok(match name {
        "des" => PrivProtocol::Des,
        "aes128" => PrivProtocol::Aes128,
        other => return Err(Error::parse(format!("unknown privacy protocol: {other}"))),
    })
}

/// Parses a config-file overlay/seed value in the same `<type-code>|<value>`
/// shape the data file uses for a plain (untagged) record (§6).
fn parse_overlay_value(spec: &str) -> Result<AsnValue> {
    let (code, value) = spec
        .split_once('|')
        .ok_or_else(|| Error::parse(format!("invalid overlay value: {spec}")))?;
    crate::model::TypeCode::from_code(code)?.parse_value(value)
}

fn build_behavior_chain(cfg: &BehaviorsConfig) -> BehaviorChain {
    let resource_gate = ResourceGate::new(
        if cfg.resource.enabled { cfg.resource.max_concurrent } else { usize::MAX },
        ResourceLimitAction::ErrorTooBig,
    );

    let subagent_delays = cfg
        .agentx
        .subagent_delays
        .iter()
        .filter_map(|(prefix, ms)| Oid::from_str(prefix).ok().map(|oid| (oid, *ms)))
        .collect();
    let agentx_delay = AgentxDelay::new(
        subagent_delays,
        if cfg.agentx.enabled { cfg.agentx.reg_timeout_pct } else { 0.0 },
    );

    let view_ends = cfg
        .boundaries
        .mib_view_end
        .iter()
        .filter_map(|(prefix, end)| {
            Some((Oid::from_str(prefix).ok()?, Oid::from_str(end).ok()?))
        })
        .collect();
    let missing_objects = cfg
        .boundaries
        .missing_objects
        .iter()
        .filter_map(|o| Oid::from_str(o).ok())
        .collect();
    let sparse_holes = cfg
        .boundaries
        .sparse_tables
        .values()
        .flatten()
        .filter_map(|o| Oid::from_str(o).ok())
        .collect();
    let boundary_injector = MibBoundaryInjector::new(view_ends, missing_objects, sparse_holes);

    let kinds = cfg
        .errors
        .kinds
        .iter()
        .filter_map(|k| loader::parse_error_status(k).ok())
        .collect();
    let per_oid = cfg
        .errors
        .per_oid
        .iter()
        .filter_map(|(oid, status)| Some((Oid::from_str(oid).ok()?, loader::parse_error_status(status).ok()?)))
        .collect::<HashMap<Oid, ErrorStatus>>();
    let error_injector = ErrorInjector::new(
        if cfg.errors.enabled { cfg.errors.rate_pct } else { 0.0 },
        kinds,
        per_oid,
    );

    let global_delay = GlobalDelay::new(
        if cfg.delay.enabled { cfg.delay.global_ms } else { 0 },
        cfg.delay.deviation_ms,
        DelayDistribution::Uniform,
    );

    let drop_side = match cfg.drops.side {
        DropSideConfig::Request => DropSide::Request,
        DropSideConfig::Response => DropSide::Response,
    };
    let packet_drop = PacketDrop::new(if cfg.drops.enabled { cfg.drops.rate_pct / 100.0 } else { 0.0 }, drop_side);

    BehaviorChain::new(vec![
        Box::new(resource_gate),
        Box::new(agentx_delay),
        Box::new(boundary_injector),
        Box::new(error_injector),
        Box::new(global_delay),
        Box::new(packet_drop),
    ])
}

fn build_state_machine(cfg: &StateMachineConfig, context: Arc<Context>) -> Result<StateMachine> {
    let mut transitions: HashMap<String, Vec<Transition>> = HashMap::new();
    for t in &cfg.transitions {
        let overlay = t
            .overlay
            .iter()
            .map(|(oid, spec)| Ok::<_, Error>((Oid::from_str(oid)?, parse_overlay_value(spec)?)))
            .collect::<Result<Vec<_>>>()?;
        transitions
            .entry(t.from_state.clone())
            .or_default()
            .push(Transition::after(Duration::from_millis(t.after_ms), t.to_state.clone(), overlay));
    }
    Ok(StateMachine::new(cfg.id.clone(), context, cfg.initial_state.clone(), transitions))
}
