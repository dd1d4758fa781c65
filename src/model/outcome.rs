//! Shared outcome types returned by producers, the record store, and Set
//! processing.

use crate::model::pdu::ErrorStatus;
use crate::model::value::AsnValue;

/// Result of reading a single OID, whether from a static record or a producer.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Value(AsnValue),
    /// The producer wants the whole PDU collapsed to an error (§4.2 Error producer).
    ErrorOverride(ErrorStatus),
}

/// Result of attempting to write a single OID (§4.1 `set`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Ok,
    WrongType,
    NotWritable,
    NoAccess,
    ResourceUnavailable,
}

impl SetOutcome {
    pub fn to_error_status(self) -> Option<ErrorStatus> {
        match self {
            SetOutcome::Ok => None,
            SetOutcome::WrongType => Some(ErrorStatus::WrongType),
            SetOutcome::NotWritable => Some(ErrorStatus::NotWritable),
            SetOutcome::NoAccess => Some(ErrorStatus::NoAccess),
            SetOutcome::ResourceUnavailable => Some(ErrorStatus::ResourceUnavailable),
        }
    }
}
