//! Transport (C6, §4.6/§5): UDP ingress/egress, a bounded worker pool for
//! PDU processing, and a time-ordered send scheduler.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::model::{DerivedState, DropSide, PduBody, PduType, RequestContext, SnmpMessage, SnmpVersion};
use crate::protocol::codec;
use crate::protocol::engine::{EngineIdentity, ProtocolEngine, VerifyOutcome};
use crate::Result;

/// One UDP endpoint to listen on (§6 `endpoints: [{udp: host:port}]`).
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub name: String,
    pub bind_addr: SocketAddr,
}

/// Observability hook covering both per-request activity and the
/// scheduling/restart states this layer adds. Feeds the Control Surface's
/// `subscribe(snmp_activity)` topic (C8).
#[derive(Debug, Clone)]
pub enum TransportEvent {
    RequestReceived { endpoint: String, source: SocketAddr },
    ResponseSent { destination: SocketAddr, bytes: usize },
    Dropped { source: SocketAddr, side: DropSide },
    ProcessingBudgetExceeded { source: SocketAddr },
    Restarted { engine_boots: i32 },
}

/// §5 concurrency knobs: worker pool size, ingress queue depth, the
/// per-PDU processing budget, and how long a simulated restart stays closed.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub processing_budget: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self {
            worker_count: cpus * 2,
            queue_capacity: 1024,
            processing_budget: Duration::from_secs(2),
        }
    }
}

struct Datagram {
    data: Vec<u8>,
    source: SocketAddr,
    socket: Arc<UdpSocket>,
    recv_time: Instant,
}

/// A response queued for a time-ordered send (§4.6 "delay scheduler", §5
/// "single thread/goroutine dequeues due responses; uses a min-heap keyed by
/// time"). `seq` breaks same-`send_at` ties by receive order, per §4.6.
struct ScheduledSend {
    send_at: Instant,
    seq: u64,
    dest: SocketAddr,
    socket: Arc<UdpSocket>,
    bytes: Vec<u8>,
    /// Restart epoch this send was computed under (§5 "cancel pending sends
    /// whose send_at_time lies past the restart instant"): stale sends left
    /// over from before a restart are dropped at pop time rather than sent.
    restart_epoch: u64,
}

impl PartialEq for ScheduledSend {
    fn eq(&self, other: &Self) -> bool {
        self.send_at == other.send_at && self.seq == other.seq
    }
}
impl Eq for ScheduledSend {}
impl PartialOrd for ScheduledSend {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScheduledSend {
    // Reversed so the BinaryHeap (a max-heap) pops the earliest `send_at` first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .send_at
            .cmp(&self.send_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum SchedulerMsg {
    Send(ScheduledSend),
    CancelAll,
}

enum ProcessOutcome {
    Send { encoded: Vec<u8>, delay_ms: u64 },
    Drop { side: DropSide },
    Silent,
}

/// Owns the UDP sockets, worker pool, and send scheduler (C6). One instance
/// per simulator process; the Simulation Engine (C7) drives restart
/// simulation through [`Transport::simulate_restart`].
pub struct Transport {
    engine: Arc<ProtocolEngine>,
    identity: Arc<EngineIdentity>,
    config: TransportConfig,
    quiescing_tx: watch::Sender<bool>,
    quiescing_rx: watch::Receiver<bool>,
    restart_epoch: Arc<AtomicU64>,
    seq: Arc<AtomicU64>,
    scheduler_tx: mpsc::UnboundedSender<SchedulerMsg>,
    scheduler_rx: Option<mpsc::UnboundedReceiver<SchedulerMsg>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl Transport {
    pub fn new(engine: Arc<ProtocolEngine>, identity: Arc<EngineIdentity>, config: TransportConfig) -> Self {
        let (quiescing_tx, quiescing_rx) = watch::channel(false);
        let (scheduler_tx, scheduler_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            identity,
            config,
            quiescing_tx,
            quiescing_rx,
            restart_epoch: Arc::new(AtomicU64::new(0)),
            seq: Arc::new(AtomicU64::new(0)),
            scheduler_tx,
            scheduler_rx: Some(scheduler_rx),
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.event_rx.take()
    }

    /// Binds every endpoint, then spawns the worker pool and send scheduler
    /// (§5: one reader per socket, a fixed worker count, a single scheduler).
    pub async fn start(&mut self, endpoints: Vec<EndpointSpec>) -> Result<()> {
        let (datagram_tx, datagram_rx) = mpsc::channel::<Datagram>(self.config.queue_capacity);
        let datagram_rx = Arc::new(Mutex::new(datagram_rx));

        for endpoint in endpoints {
            let tx = datagram_tx.clone();
            let event_tx = self.event_tx.clone();
            let quiescing = self.quiescing_rx.clone();
            tokio::spawn(run_endpoint(endpoint, quiescing, tx, event_tx));
        }

        for _ in 0..self.config.worker_count.max(1) {
            let rx = Arc::clone(&datagram_rx);
            let engine = Arc::clone(&self.engine);
            let identity = Arc::clone(&self.identity);
            let scheduler_tx = self.scheduler_tx.clone();
            let event_tx = self.event_tx.clone();
            let seq = Arc::clone(&self.seq);
            let restart_epoch = Arc::clone(&self.restart_epoch);
            let budget = self.config.processing_budget;
            tokio::spawn(async move {
                loop {
                    let datagram = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(datagram) = datagram else { break };
                    let epoch_at_recv = restart_epoch.load(Ordering::Acquire);
                    let source = datagram.source;
                    let recv_time = datagram.recv_time;
                    let socket = Arc::clone(&datagram.socket);

                    match tokio::time::timeout(budget, process_datagram(&engine, &identity, datagram)).await {
                        Ok(ProcessOutcome::Send { encoded, delay_ms }) => {
                            let item = ScheduledSend {
                                send_at: recv_time + Duration::from_millis(delay_ms),
                                seq: seq.fetch_add(1, Ordering::Relaxed),
                                dest: source,
                                socket,
                                bytes: encoded,
                                restart_epoch: epoch_at_recv,
                            };
                            let _ = scheduler_tx.send(SchedulerMsg::Send(item));
                        }
                        Ok(ProcessOutcome::Drop { side }) => {
                            let _ = event_tx.send(TransportEvent::Dropped { source, side });
                        }
                        Ok(ProcessOutcome::Silent) => {}
                        Err(_elapsed) => {
                            warn!(%source, "PDU processing budget exceeded, dropping response");
                            let _ = event_tx.send(TransportEvent::ProcessingBudgetExceeded { source });
                        }
                    }
                }
            });
        }

        if let Some(scheduler_rx) = self.scheduler_rx.take() {
            let event_tx = self.event_tx.clone();
            let restart_epoch = Arc::clone(&self.restart_epoch);
            tokio::spawn(run_scheduler(scheduler_rx, event_tx, restart_epoch));
        }

        Ok(())
    }

    /// Simulated restart (§4.6, §4.7): quiesces every endpoint, cancels
    /// in-flight sends, bumps `engineBoots`, then reopens the sockets.
    pub async fn simulate_restart(&self, quiet_for: Duration) {
        let _ = self.quiescing_tx.send(true);
        let _ = self.scheduler_tx.send(SchedulerMsg::CancelAll);
        self.restart_epoch.fetch_add(1, Ordering::AcqRel);
        if !quiet_for.is_zero() {
            tokio::time::sleep(quiet_for).await;
        }
        let boots = self.identity.bump_boots();
        let _ = self.quiescing_tx.send(false);
        let _ = self.event_tx.send(TransportEvent::Restarted { engine_boots: boots });
    }
}

/// Per-endpoint reader (§5 "one task per bound socket"). Truly closes and
/// rebinds the socket across a simulated restart rather than merely ignoring
/// inbound datagrams, so a client probing the port sees connection refusal
/// just as it would against a real restarting agent.
async fn run_endpoint(
    endpoint: EndpointSpec,
    mut quiescing: watch::Receiver<bool>,
    datagram_tx: mpsc::Sender<Datagram>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        while *quiescing.borrow() {
            if quiescing.changed().await.is_err() {
                return;
            }
        }

        let socket = match UdpSocket::bind(endpoint.bind_addr).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!(endpoint = %endpoint.name, error = %e, "failed to bind endpoint, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        info!(endpoint = %endpoint.name, addr = %endpoint.bind_addr, "endpoint listening");

        let mut buf = vec![0u8; 65535];
        loop {
            tokio::select! {
                biased;
                changed = quiescing.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if *quiescing.borrow() {
                        debug!(endpoint = %endpoint.name, "quiescing for simulated restart, closing socket");
                        break;
                    }
                }
                recv = socket.recv_from(&mut buf) => {
                    match recv {
                        Ok((n, source)) => {
                            let _ = event_tx.send(TransportEvent::RequestReceived {
                                endpoint: endpoint.name.clone(),
                                source,
                            });
                            let datagram = Datagram {
                                data: buf[..n].to_vec(),
                                source,
                                socket: Arc::clone(&socket),
                                recv_time: Instant::now(),
                            };
                            if datagram_tx.send(datagram).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!(endpoint = %endpoint.name, error = %e, "recv_from failed"),
                    }
                }
            }
        }
        // `socket` drops here once every in-flight clone is released,
        // closing the fd; the outer loop waits out quiescence before rebinding.
    }
}

/// Decodes, authenticates (v3), and dispatches one datagram to the Protocol
/// Engine, returning the encoded response (or drop/silent-discard outcome).
/// Decode and encode failures are both logged and treated as a silent
/// discard (§4.6 "malformed datagrams never produce a response").
async fn process_datagram(engine: &ProtocolEngine, identity: &EngineIdentity, datagram: Datagram) -> ProcessOutcome {
    let Datagram { data, source, recv_time, .. } = datagram;

    let (mut message, ciphertext) = match codec::decode_message(&data) {
        Ok(v) => v,
        Err(e) => {
            debug!(%source, error = %e, "failed to decode datagram, discarding");
            return ProcessOutcome::Silent;
        }
    };

    let mut pdu_type = message.pdu_type;
    let mut body = message.body.clone();

    if message.version == SnmpVersion::V3 {
        let header = message
            .v3
            .clone()
            .expect("decode_message always populates v3 header for V3 messages");

        let verify = match engine.verify_v3(&message, &header, ciphertext.as_deref()) {
            Ok(v) => v,
            Err(e) => {
                error!(%source, error = %e, "v3 verification failed unexpectedly");
                return ProcessOutcome::Silent;
            }
        };

        match verify {
            VerifyOutcome::Discovery => {
                let report = engine.discovery_report(body.request_id());
                return encode_report(engine, &message, report, source);
            }
            VerifyOutcome::Failed(failure) => {
                identity.record_usm_failure(failure);
                let report = engine.usm_failure_report(body.request_id(), failure);
                return encode_report(engine, &message, report, source);
            }
            VerifyOutcome::Ok { plaintext_scoped_pdu } => {
                if header.msg_flags.priv {
                    let (context_engine_id, context_name, decoded_type, decoded_body) =
                        match codec::decode_scoped_pdu(&plaintext_scoped_pdu) {
                            Ok(v) => v,
                            Err(e) => {
                                debug!(%source, error = %e, "failed to decode decrypted scoped PDU, discarding");
                                return ProcessOutcome::Silent;
                            }
                        };
                    pdu_type = decoded_type;
                    body = decoded_body.clone();
                    if let Some(h) = message.v3.as_mut() {
                        h.context_engine_id = context_engine_id;
                        h.context_name = context_name;
                    }
                    message.pdu_type = decoded_type;
                    message.body = decoded_body;
                }
            }
        }
    }

    let mut ctx = build_request_context(&message, source, recv_time, pdu_type, body);
    let response_body = match engine.handle(&mut ctx).await {
        Ok(Some(body)) => body,
        Ok(None) => return ProcessOutcome::Drop { side: ctx.derived.drop_side },
        Err(e) => {
            error!(%source, error = %e, "request handling failed unexpectedly");
            return ProcessOutcome::Silent;
        }
    };

    match engine.encode_response(&message, PduType::Response, response_body) {
        Ok(encoded) => ProcessOutcome::Send { encoded, delay_ms: ctx.derived.delay_budget_ms },
        Err(e) => {
            error!(%source, error = %e, "failed to encode response, dropping");
            ProcessOutcome::Silent
        }
    }
}

fn encode_report(engine: &ProtocolEngine, request: &SnmpMessage, pdu: crate::model::Pdu, source: SocketAddr) -> ProcessOutcome {
    match engine.encode_response(request, PduType::Report, PduBody::Plain(pdu)) {
        Ok(encoded) => ProcessOutcome::Send { encoded, delay_ms: 0 },
        Err(e) => {
            error!(%source, error = %e, "failed to encode Report PDU, dropping");
            ProcessOutcome::Silent
        }
    }
}

fn build_request_context(
    message: &SnmpMessage,
    source: SocketAddr,
    recv_time: Instant,
    pdu_type: PduType,
    body: PduBody,
) -> RequestContext {
    let (non_repeaters, max_repetitions) = match &body {
        PduBody::Bulk(bulk) => (bulk.non_repeaters, bulk.max_repetitions),
        PduBody::Plain(_) => (0, 0),
    };
    RequestContext {
        recv_time,
        remote_addr: source,
        version: message.version,
        community: message.community.clone(),
        v3_security: message.v3.as_ref().map(|h| h.security_params.clone()),
        context_name: message.context_name().to_string(),
        pdu_type,
        var_binds: body.var_binds().to_vec(),
        request_id: body.request_id(),
        non_repeaters,
        max_repetitions,
        derived: DerivedState::default(),
    }
}

/// Single-task send scheduler (§4.6/§5): pops the earliest-due response off
/// a min-heap (via [`ScheduledSend`]'s reversed `Ord`) and sends it, or
/// drops it silently if it was enqueued under a restart epoch that a
/// subsequent [`Transport::simulate_restart`] has already superseded.
async fn run_scheduler(
    mut rx: mpsc::UnboundedReceiver<SchedulerMsg>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    restart_epoch: Arc<AtomicU64>,
) {
    let mut heap: BinaryHeap<ScheduledSend> = BinaryHeap::new();
    loop {
        let sleep_for = match heap.peek() {
            Some(item) => item.send_at.saturating_duration_since(Instant::now()),
            None => Duration::from_secs(3600),
        };

        tokio::select! {
            biased;
            msg = rx.recv() => {
                match msg {
                    Some(SchedulerMsg::Send(item)) => heap.push(item),
                    Some(SchedulerMsg::CancelAll) => heap.clear(),
                    None => return,
                }
            }
            _ = tokio::time::sleep(sleep_for) => {
                if let Some(item) = heap.peek() {
                    if item.send_at > Instant::now() {
                        continue;
                    }
                    let item = heap.pop().expect("just peeked");
                    if item.restart_epoch != restart_epoch.load(Ordering::Acquire) {
                        continue;
                    }
                    let dest = item.dest;
                    let len = item.bytes.len();
                    match item.socket.send_to(&item.bytes, dest).await {
                        Ok(_) => {
                            let _ = event_tx.send(TransportEvent::ResponseSent { destination: dest, bytes: len });
                        }
                        Err(e) => warn!(%dest, error = %e, "send_to failed"),
                    }
                }
            }
        }
    }
}
