//! ASN.1 value types recognized by the record store and protocol engine.

use crate::model::oid::Oid;
use crate::{Error, Result};

/// A concrete SNMP value, or one of the three no-value exception markers.
#[derive(Debug, Clone, PartialEq)]
pub enum AsnValue {
    Integer32(i32),
    OctetString(Vec<u8>),
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    /// Exception value: OID has no meaning under any known subtree.
    NoSuchObject,
    /// Exception value: OID is under a known subtree but absent (sparse hole).
    NoSuchInstance,
    /// Exception value: walk has passed the configured view boundary.
    EndOfMibView,
}

impl AsnValue {
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            AsnValue::NoSuchObject | AsnValue::NoSuchInstance | AsnValue::EndOfMibView
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AsnValue::Integer32(_) => "Integer32",
            AsnValue::OctetString(_) => "OCTET STRING",
            AsnValue::ObjectIdentifier(_) => "OBJECT IDENTIFIER",
            AsnValue::IpAddress(_) => "IpAddress",
            AsnValue::Counter32(_) => "Counter32",
            AsnValue::Gauge32(_) => "Gauge32",
            AsnValue::TimeTicks(_) => "TimeTicks",
            AsnValue::Opaque(_) => "Opaque",
            AsnValue::Counter64(_) => "Counter64",
            AsnValue::NoSuchObject => "NoSuchObject",
            AsnValue::NoSuchInstance => "NoSuchInstance",
            AsnValue::EndOfMibView => "EndOfMibView",
        }
    }
}

/// Type codes used in the `.snmprec`-style data file format (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    Integer,
    OctetString,
    ObjectIdentifier,
    IpAddress,
    Counter32,
    Gauge32,
    TimeTicks,
    Counter64,
}

impl TypeCode {
    pub fn from_code(code: &str) -> Result<Self> {
        Ok(match code {
            "2" => TypeCode::Integer,
            "4" => TypeCode::OctetString,
            "6" => TypeCode::ObjectIdentifier,
            "64" => TypeCode::IpAddress,
            "65" => TypeCode::Counter32,
            "66" => TypeCode::Gauge32,
            "67" => TypeCode::TimeTicks,
            "70" => TypeCode::Counter64,
            other => return Err(Error::parse(format!("unknown type code: {other}"))),
        })
    }

    pub fn code(&self) -> &'static str {
        match self {
            TypeCode::Integer => "2",
            TypeCode::OctetString => "4",
            TypeCode::ObjectIdentifier => "6",
            TypeCode::IpAddress => "64",
            TypeCode::Counter32 => "65",
            TypeCode::Gauge32 => "66",
            TypeCode::TimeTicks => "67",
            TypeCode::Counter64 => "70",
        }
    }

    /// Parse a value in the format's textual representation into an [`AsnValue`].
    pub fn parse_value(&self, raw: &str) -> Result<AsnValue> {
        Ok(match self {
            TypeCode::Integer => AsnValue::Integer32(
                raw.parse()
                    .map_err(|_| Error::parse(format!("invalid Integer32: {raw}")))?,
            ),
            TypeCode::OctetString => AsnValue::OctetString(raw.as_bytes().to_vec()),
            TypeCode::ObjectIdentifier => AsnValue::ObjectIdentifier(Oid::from_str(raw)?),
            TypeCode::IpAddress => {
                let parts: Vec<&str> = raw.split('.').collect();
                if parts.len() != 4 {
                    return Err(Error::parse(format!("invalid IpAddress: {raw}")));
                }
                let mut octets = [0u8; 4];
                for (i, p) in parts.iter().enumerate() {
                    octets[i] = p
                        .parse()
                        .map_err(|_| Error::parse(format!("invalid IpAddress: {raw}")))?;
                }
                AsnValue::IpAddress(octets)
            }
            TypeCode::Counter32 => AsnValue::Counter32(
                raw.parse()
                    .map_err(|_| Error::parse(format!("invalid Counter32: {raw}")))?,
            ),
            TypeCode::Gauge32 => AsnValue::Gauge32(
                raw.parse()
                    .map_err(|_| Error::parse(format!("invalid Gauge32: {raw}")))?,
            ),
            TypeCode::TimeTicks => AsnValue::TimeTicks(
                raw.parse()
                    .map_err(|_| Error::parse(format!("invalid TimeTicks: {raw}")))?,
            ),
            TypeCode::Counter64 => AsnValue::Counter64(
                raw.parse()
                    .map_err(|_| Error::parse(format!("invalid Counter64: {raw}")))?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_type_codes() {
        assert_eq!(TypeCode::from_code("2").unwrap(), TypeCode::Integer);
        assert_eq!(TypeCode::from_code("70").unwrap(), TypeCode::Counter64);
        assert!(TypeCode::from_code("99").is_err());
    }

    #[test]
    fn parses_ip_address() {
        let v = TypeCode::IpAddress.parse_value("192.168.1.1").unwrap();
        assert_eq!(v, AsnValue::IpAddress([192, 168, 1, 1]));
    }

    #[test]
    fn exception_values_are_marked() {
        assert!(AsnValue::NoSuchObject.is_exception());
        assert!(!AsnValue::Counter32(1).is_exception());
    }
}
