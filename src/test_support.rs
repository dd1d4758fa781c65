//! Shared `#[cfg(test)]` fixtures used across unit tests in several modules.

use std::net::SocketAddr;
use std::time::Instant;

use crate::model::{PduType, RequestContext, SnmpVersion};

pub fn test_ctx() -> RequestContext {
    RequestContext {
        recv_time: Instant::now(),
        remote_addr: "127.0.0.1:1024".parse::<SocketAddr>().unwrap(),
        version: SnmpVersion::V2c,
        community: Some("public".into()),
        v3_security: None,
        context_name: String::new(),
        pdu_type: PduType::GetRequest,
        var_binds: vec![],
        request_id: 1,
        non_repeaters: 0,
        max_repetitions: 0,
        derived: Default::default(),
    }
}
