//! A single Record Store entry (§3): an OID paired with either a fixed
//! value or a producer that computes one.

use std::sync::Arc;

use crate::model::{AsnValue, Oid, TypeCode};
use crate::producers::ValueProducer;

/// `{ oid, asn1_type, raw_value, producer_ref? }` per §3.
///
/// `raw_value` is always present (the value as loaded from the data file,
/// or a type-appropriate placeholder for pure producers); producer-backed
/// records consult `producer` at read time instead.
#[derive(Clone)]
pub struct Record {
    pub oid: Oid,
    pub asn_type: TypeCode,
    pub raw_value: AsnValue,
    pub producer: Option<Arc<dyn ValueProducer>>,
}

impl Record {
    pub fn new(oid: Oid, asn_type: TypeCode, raw_value: AsnValue) -> Self {
        Self {
            oid,
            asn_type,
            raw_value,
            producer: None,
        }
    }

    pub fn with_producer(mut self, producer: Arc<dyn ValueProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn is_writable(&self) -> bool {
        self.producer.as_ref().map(|p| p.is_writable()).unwrap_or(false)
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("oid", &self.oid)
            .field("asn_type", &self.asn_type)
            .field("raw_value", &self.raw_value)
            .field("has_producer", &self.producer.is_some())
            .finish()
    }
}
