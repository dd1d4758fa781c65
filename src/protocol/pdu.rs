//! Re-export of the wire-independent PDU types under `protocol::pdu`, so
//! callers working at the protocol layer don't need to reach into
//! `crate::model` directly.

pub use crate::model::{
    BulkPdu, ErrorStatus, MsgFlags, Pdu, PduBody, PduType, SnmpMessage, SnmpVersion,
    UsmSecurityParameters, V3Header, VarBind,
};
