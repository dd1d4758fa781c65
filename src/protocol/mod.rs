//! SNMP protocol engine (C5): BER wire codec, USM security, and per-PDU-type
//! request semantics.

mod ber;

pub mod codec;
pub mod engine;
pub mod pdu;
pub mod usm;

pub use engine::ProtocolEngine;
