//! Per-request context threaded through the behavior chain and protocol engine.
//!
//! Lifetime: constructed at decode, consumed at final send-or-drop. Never
//! shared between datagrams (§3).

use std::net::SocketAddr;
use std::time::Instant;

use crate::model::oid::Oid;
use crate::model::pdu::{ErrorStatus, PduType, SnmpVersion, UsmSecurityParameters, VarBind};

/// Which side of the exchange a packet-loss decision applies to (§6 `behaviors.drops.side`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DropSide {
    Request,
    #[default]
    Response,
}

/// Fields populated by the behavior chain and consumed by transport/encode.
/// Every interceptor must be idempotent with respect to fields it has already set.
#[derive(Debug, Clone, Default)]
pub struct DerivedState {
    pub selected_context: Option<String>,
    pub delay_budget_ms: u64,
    pub drop_decision: bool,
    pub drop_side: DropSide,
    pub subsystem_latency_ms: u64,
    pub error_override: Option<ErrorStatus>,
    /// 1-based index of the offending varbind, valid when `error_override.is_some()`.
    pub error_index: i32,
    /// Set by the MIB boundary injector to short-circuit the store lookup
    /// for individual varbinds without collapsing the whole PDU to an error.
    pub boundary_overrides: Vec<(usize, crate::model::value::AsnValue)>,
}

impl DerivedState {
    /// First error wins; later interceptors must not clobber an existing override.
    pub fn set_error_once(&mut self, status: ErrorStatus, index: i32) {
        if self.error_override.is_none() {
            self.error_override = Some(status);
            self.error_index = index;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub recv_time: Instant,
    pub remote_addr: SocketAddr,
    pub version: SnmpVersion,
    pub community: Option<String>,
    pub v3_security: Option<UsmSecurityParameters>,
    pub context_name: String,
    pub pdu_type: PduType,
    pub var_binds: Vec<VarBind>,
    pub request_id: i32,
    pub non_repeaters: i32,
    pub max_repetitions: i32,
    pub derived: DerivedState,
}

impl RequestContext {
    pub fn oids(&self) -> impl Iterator<Item = &Oid> {
        self.var_binds.iter().map(|vb| &vb.oid)
    }
}
