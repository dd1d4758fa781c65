//! Wire-independent data model shared by the store, producers, behavior
//! chain, and protocol engine (§3).

pub mod oid;
pub mod outcome;
pub mod pdu;
pub mod request;
pub mod value;

pub use oid::Oid;
pub use outcome::{ReadOutcome, SetOutcome};
pub use pdu::{
    BulkPdu, ErrorStatus, MsgFlags, Pdu, PduBody, PduType, SnmpMessage, SnmpVersion,
    UsmSecurityParameters, V3Header, VarBind,
};
pub use request::{DerivedState, DropSide, RequestContext};
pub use value::{AsnValue, TypeCode};
