//! Control Surface (C8, §4.8): the narrow in-process API an external REST/
//! WebSocket layer marshals to and from (§9: that layer is an external
//! collaborator, never allowed to reach into the Record Store directly).
//! `snapshot_config`/`apply_config_delta` hand out a validated,
//! atomically-swapped config snapshot rather than a mutable reference.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use regex::Regex;
use tokio::sync::broadcast;

use crate::config::SimulatorConfig;
use crate::context::ContextResolver;
use crate::model::{AsnValue, Oid, PduType, ReadOutcome, RequestContext, SnmpVersion, VarBind};
use crate::simulation::{ScenarioSpec, SimulationEngine, SimulationEvent};
use crate::store::GetOutcome;
use crate::transport::TransportEvent;
use crate::{Error, Result};

/// One page of `list_oids` (§4.8 `list_oids(context, pattern, limit, cursor)`).
#[derive(Debug, Clone)]
pub struct OidPage {
    pub oids: Vec<Oid>,
    /// `Some` when more results exist past `limit`; pass back as `cursor`.
    pub next_cursor: Option<Oid>,
}

/// §4.8 `subscribe(topic ∈ {metrics, logs, snmp_activity, state})`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Metrics,
    Logs,
    SnmpActivity,
    State,
}

/// One event on the unified Control Surface stream; subscribers filter by
/// [`ControlEvent::topic`] client-side rather than each topic getting its
/// own channel.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    Metrics(String),
    Log(String),
    SnmpActivity(TransportEvent),
    State(SimulationEvent),
}

impl ControlEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ControlEvent::Metrics(_) => Topic::Metrics,
            ControlEvent::Log(_) => Topic::Logs,
            ControlEvent::SnmpActivity(_) => Topic::SnmpActivity,
            ControlEvent::State(_) => Topic::State,
        }
    }
}

/// Owns the current validated config snapshot and delegates OID inspection
/// and scenario control to the Context Resolver (C3) and Simulation Engine
/// (C7) it was built around. One instance per simulator process.
pub struct ControlSurface {
    config: RwLock<Arc<SimulatorConfig>>,
    context_resolver: Arc<ContextResolver>,
    simulation: Arc<SimulationEngine>,
    events_tx: broadcast::Sender<ControlEvent>,
}

impl ControlSurface {
    pub fn new(
        config: SimulatorConfig,
        context_resolver: Arc<ContextResolver>,
        simulation: Arc<SimulationEngine>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            config: RwLock::new(Arc::new(config)),
            context_resolver,
            simulation,
            events_tx,
        }
    }

    /// §4.8 `subscribe(topic)`: every event is published on one internal
    /// channel (§5 "single writer"); subscribers that only care about one
    /// topic filter on [`ControlEvent::topic`].
    pub fn subscribe(&self, _topic: Topic) -> broadcast::Receiver<ControlEvent> {
        self.events_tx.subscribe()
    }

    /// Called by the core orchestrator's event-forwarding tasks (§4.7
    /// "emits events... consumed by C8 subscribers") to republish a C6/C7
    /// event onto the unified stream. A lagging/absent subscriber never
    /// blocks the publisher — `send` on a full broadcast channel only drops
    /// the oldest buffered event.
    pub fn publish(&self, event: ControlEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn snapshot_config(&self) -> Arc<SimulatorConfig> {
        Arc::clone(&self.config.read().expect("config lock poisoned"))
    }

    /// §4.8/§7: validates the whole replacement config before installing it,
    /// so a reader never observes a half-applied delta — the config-level
    /// analogue of the Record Store's atomic pointer swap (§4.1).
    pub fn apply_config_delta(&self, new_config: SimulatorConfig) -> Result<()> {
        new_config.validate()?;
        let mut guard = self.config.write().expect("config lock poisoned");
        *guard = Arc::new(new_config);
        Ok(())
    }

    /// §4.8 `list_oids`: walks the named context's store from `cursor`
    /// (exclusive) via repeated [`crate::store::Store::next`] calls, the
    /// same lexicographic-successor primitive C5 uses for GetNext, filtering
    /// by an optional regex over the rendered OID string.
    pub fn list_oids(
        &self,
        context: &str,
        pattern: Option<&str>,
        limit: usize,
        cursor: Option<Oid>,
    ) -> Result<OidPage> {
        let ctx = self.resolve_context(context)?;
        let regex = pattern
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::control(format!("invalid pattern: {e}")))?;

        let mut oids = Vec::with_capacity(limit);
        let mut walk_from = cursor.unwrap_or_else(|| Oid::new(vec![]));
        let mut next_cursor = None;
        loop {
            match ctx.store.next(&walk_from) {
                crate::store::NextOutcome::Found(record) => {
                    walk_from = record.oid.clone();
                    let matches = regex.as_ref().map(|re| re.is_match(&record.oid.to_string())).unwrap_or(true);
                    if matches {
                        if oids.len() == limit {
                            next_cursor = Some(record.oid);
                            break;
                        }
                        oids.push(record.oid);
                    }
                }
                crate::store::NextOutcome::EndOfMibView => break,
            }
        }
        Ok(OidPage { oids, next_cursor })
    }

    /// §4.8 `query_oids`: reads straight from the context's overlay/store/
    /// producers, bypassing the Behavior Chain (C4) entirely — no injected
    /// delay, drop, or error ever touches an inspection read.
    pub async fn query_oids(&self, context: &str, oids: &[Oid]) -> Result<Vec<VarBind>> {
        let ctx = self.resolve_context(context)?;
        let mut out = Vec::with_capacity(oids.len());
        for oid in oids {
            let value = if let Some(overridden) = ctx.overlay_get(oid) {
                overridden
            } else {
                match ctx.store.get(oid) {
                    GetOutcome::Found(record) => match &record.producer {
                        Some(producer) => {
                            let mut synthetic = inspection_request_context();
                            match producer.read(&mut synthetic).await? {
                                ReadOutcome::Value(v) => v,
                                ReadOutcome::ErrorOverride(_) => record.raw_value.clone(),
                            }
                        }
                        None => record.raw_value.clone(),
                    },
                    GetOutcome::NoSuchObject => AsnValue::NoSuchObject,
                    GetOutcome::NoSuchInstance => AsnValue::NoSuchInstance,
                }
            };
            out.push(VarBind::new(oid.clone(), value));
        }
        Ok(out)
    }

    /// §4.8 `start_scenario`/`stop_scenario`: thin pass-throughs to C7, kept
    /// on the Control Surface so the external layer never touches
    /// `SimulationEngine` directly.
    pub fn start_scenario(&self, spec: ScenarioSpec) -> u64 {
        self.simulation.start_scenario(spec)
    }

    pub fn stop_scenario(&self, id: u64) -> bool {
        self.simulation.stop_scenario(id)
    }

    fn resolve_context(&self, name: &str) -> Result<Arc<crate::context::Context>> {
        self.context_resolver
            .get_context(name)
            .ok_or_else(|| Error::control(format!("unknown context: {name}")))
    }
}

/// A read-only stand-in `RequestContext` for producer reads triggered by
/// `query_oids` rather than a real decoded PDU (§4.8: inspection never goes
/// through the wire path).
fn inspection_request_context() -> RequestContext {
    RequestContext {
        recv_time: Instant::now(),
        remote_addr: "127.0.0.1:0".parse::<SocketAddr>().expect("valid literal address"),
        version: SnmpVersion::V2c,
        community: None,
        v3_security: None,
        context_name: String::new(),
        pdu_type: PduType::GetRequest,
        var_binds: vec![],
        request_id: 0,
        non_repeaters: 0,
        max_repetitions: 0,
        derived: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::model::TypeCode;
    use crate::store::{Record, Store};

    fn surface_with_records(records: Vec<Record>) -> ControlSurface {
        let store = Arc::new(Store::from_records(records));
        let mut resolver = ContextResolver::new("lab");
        resolver.register_context(Context::new("lab", store, vec![], vec![]));
        ControlSurface::new(
            SimulatorConfig::default_config(),
            Arc::new(resolver),
            Arc::new(SimulationEngine::new(std::time::Duration::from_millis(100))),
        )
    }

    #[test]
    fn list_oids_paginates_with_cursor() {
        let records = vec![
            Record::new(Oid::from_str("1.1").unwrap(), TypeCode::Integer, AsnValue::Integer32(1)),
            Record::new(Oid::from_str("1.2").unwrap(), TypeCode::Integer, AsnValue::Integer32(2)),
            Record::new(Oid::from_str("1.3").unwrap(), TypeCode::Integer, AsnValue::Integer32(3)),
        ];
        let surface = surface_with_records(records);

        let page1 = surface.list_oids("lab", None, 2, None).unwrap();
        assert_eq!(page1.oids.len(), 2);
        assert!(page1.next_cursor.is_some());

        let page2 = surface.list_oids("lab", None, 2, page1.next_cursor).unwrap();
        assert_eq!(page2.oids.len(), 1);
        assert!(page2.next_cursor.is_none());
    }

    #[tokio::test]
    async fn query_oids_prefers_overlay_over_store() {
        let oid = Oid::from_str("1.1").unwrap();
        let records = vec![Record::new(oid.clone(), TypeCode::Integer, AsnValue::Integer32(1))];
        let surface = surface_with_records(records);
        let ctx = surface.resolve_context("lab").unwrap();
        ctx.apply_overlay([(oid.clone(), AsnValue::Integer32(99))]);

        let result = surface.query_oids("lab", &[oid]).await.unwrap();
        assert_eq!(result[0].value, AsnValue::Integer32(99));
    }

    #[tokio::test]
    async fn query_oids_reports_no_such_object_for_unknown_oid() {
        let surface = surface_with_records(vec![]);
        let result = surface.query_oids("lab", &[Oid::from_str("9.9").unwrap()]).await.unwrap();
        assert_eq!(result[0].value, AsnValue::NoSuchObject);
    }

    #[test]
    fn apply_config_delta_rejects_invalid_whole() {
        let surface = surface_with_records(vec![]);
        let mut bad = SimulatorConfig::default_config();
        bad.endpoints.clear();
        assert!(surface.apply_config_delta(bad).is_err());
        assert_eq!(surface.snapshot_config().endpoints.len(), 1);
    }
}
