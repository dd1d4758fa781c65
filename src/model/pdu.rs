//! PDU-level types: versions, PDU kinds, error statuses, and the decoded
//! message shape shared by v1/v2c/v3.

use crate::model::oid::Oid;
use crate::model::value::AsnValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
    V3,
}

impl SnmpVersion {
    pub fn wire_value(&self) -> i64 {
        match self {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
            SnmpVersion::V3 => 3,
        }
    }

    pub fn from_wire_value(v: i64) -> Option<Self> {
        match v {
            0 => Some(SnmpVersion::V1),
            1 => Some(SnmpVersion::V2c),
            3 => Some(SnmpVersion::V3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest,
    GetNextRequest,
    GetBulkRequest,
    SetRequest,
    Response,
    Report,
}

impl PduType {
    /// BER context-specific application tag for this PDU kind (RFC 3416 §3).
    pub fn ber_tag(&self) -> u8 {
        match self {
            PduType::GetRequest => 0xA0,
            PduType::GetNextRequest => 0xA1,
            PduType::Response => 0xA2,
            PduType::SetRequest => 0xA3,
            PduType::GetBulkRequest => 0xA5,
            PduType::Report => 0xA8,
        }
    }

    pub fn from_ber_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(PduType::GetRequest),
            0xA1 => Some(PduType::GetNextRequest),
            0xA2 => Some(PduType::Response),
            0xA3 => Some(PduType::SetRequest),
            0xA5 => Some(PduType::GetBulkRequest),
            0xA8 => Some(PduType::Report),
            _ => None,
        }
    }
}

/// SNMP error-status codes (§7). Discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NoError = 0,
    TooBig = 1,
    NoSuchName = 2,
    BadValue = 3,
    ReadOnly = 4,
    GenErr = 5,
    NoAccess = 6,
    WrongType = 7,
    WrongLength = 8,
    WrongEncoding = 9,
    WrongValue = 10,
    NoCreation = 11,
    InconsistentValue = 12,
    ResourceUnavailable = 13,
    CommitFailed = 14,
    UndoFailed = 15,
    AuthorizationError = 16,
    NotWritable = 17,
    InconsistentName = 18,
}

impl ErrorStatus {
    pub fn wire_value(&self) -> i64 {
        *self as i64
    }

    pub fn from_wire_value(v: i64) -> Option<Self> {
        Some(match v {
            0 => ErrorStatus::NoError,
            1 => ErrorStatus::TooBig,
            2 => ErrorStatus::NoSuchName,
            3 => ErrorStatus::BadValue,
            4 => ErrorStatus::ReadOnly,
            5 => ErrorStatus::GenErr,
            6 => ErrorStatus::NoAccess,
            7 => ErrorStatus::WrongType,
            8 => ErrorStatus::WrongLength,
            9 => ErrorStatus::WrongEncoding,
            10 => ErrorStatus::WrongValue,
            11 => ErrorStatus::NoCreation,
            12 => ErrorStatus::InconsistentValue,
            13 => ErrorStatus::ResourceUnavailable,
            14 => ErrorStatus::CommitFailed,
            15 => ErrorStatus::UndoFailed,
            16 => ErrorStatus::AuthorizationError,
            17 => ErrorStatus::NotWritable,
            18 => ErrorStatus::InconsistentName,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: AsnValue,
}

impl VarBind {
    pub fn new(oid: Oid, value: AsnValue) -> Self {
        Self { oid, value }
    }
}

/// The ordinary (non-bulk) PDU body shared by Get/GetNext/Set/Response/Report.
#[derive(Debug, Clone)]
pub struct Pdu {
    pub request_id: i32,
    pub error_status: ErrorStatus,
    pub error_index: i32,
    pub var_binds: Vec<VarBind>,
}

impl Pdu {
    pub fn new(request_id: i32, var_binds: Vec<VarBind>) -> Self {
        Self {
            request_id,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            var_binds,
        }
    }

    pub fn error(request_id: i32, status: ErrorStatus, index: i32, var_binds: Vec<VarBind>) -> Self {
        Self {
            request_id,
            error_status: status,
            error_index: index,
            var_binds,
        }
    }
}

/// GetBulkRequest-PDU reuses the error-status/error-index slots for
/// non-repeaters/max-repetitions (RFC 3416 §4.2.3).
#[derive(Debug, Clone)]
pub struct BulkPdu {
    pub request_id: i32,
    pub non_repeaters: i32,
    pub max_repetitions: i32,
    pub var_binds: Vec<VarBind>,
}

#[derive(Debug, Clone)]
pub enum PduBody {
    Plain(Pdu),
    Bulk(BulkPdu),
}

impl PduBody {
    pub fn var_binds(&self) -> &[VarBind] {
        match self {
            PduBody::Plain(p) => &p.var_binds,
            PduBody::Bulk(b) => &b.var_binds,
        }
    }

    pub fn request_id(&self) -> i32 {
        match self {
            PduBody::Plain(p) => p.request_id,
            PduBody::Bulk(b) => b.request_id,
        }
    }
}

/// USM security parameters, present on every v3 message (even unauthenticated
/// discovery requests, where `auth_params`/`priv_params` are empty).
#[derive(Debug, Clone, Default)]
pub struct UsmSecurityParameters {
    pub engine_id: Vec<u8>,
    pub engine_boots: i32,
    pub engine_time: i32,
    pub user_name: String,
    pub auth_params: Vec<u8>,
    pub priv_params: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgFlags {
    pub auth: bool,
    pub priv: bool,
    pub reportable: bool,
}

impl MsgFlags {
    pub fn to_byte(self) -> u8 {
        (self.auth as u8) | ((self.priv as u8) << 1) | ((self.reportable as u8) << 2)
    }

    pub fn from_byte(b: u8) -> Self {
        Self {
            auth: b & 0x1 != 0,
            priv: b & 0x2 != 0,
            reportable: b & 0x4 != 0,
        }
    }
}

/// SNMPv3 message header (outside the encrypted scopedPDU).
#[derive(Debug, Clone)]
pub struct V3Header {
    pub msg_id: i32,
    pub msg_max_size: i32,
    pub msg_flags: MsgFlags,
    pub security_params: UsmSecurityParameters,
    pub context_engine_id: Vec<u8>,
    pub context_name: String,
}

/// A fully decoded SNMP message, normalized across v1/v2c/v3.
#[derive(Debug, Clone)]
pub struct SnmpMessage {
    pub version: SnmpVersion,
    pub pdu_type: PduType,
    /// v1/v2c community string; `None` for v3.
    pub community: Option<String>,
    /// Present only for v3.
    pub v3: Option<V3Header>,
    pub body: PduBody,
}

impl SnmpMessage {
    pub fn context_name(&self) -> &str {
        match &self.v3 {
            Some(hdr) => &hdr.context_name,
            None => "",
        }
    }
}
