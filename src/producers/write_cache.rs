//! WriteCache producer: last-write-wins persistent value, honors Set (§4.2).
//!
//! Each instance is attached to exactly one OID, so the "per-OID lock" the
//! spec calls for is simply this producer's own lock — no OID-keyed lock
//! table is needed above it.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{AsnValue, ReadOutcome, RequestContext, SetOutcome};
use crate::producers::{ProducerKind, ValueProducer};
use crate::Result;

#[derive(Debug)]
pub struct WriteCacheProducer {
    asn_type: crate::model::TypeCode,
    value: RwLock<AsnValue>,
}

impl WriteCacheProducer {
    pub fn new(asn_type: crate::model::TypeCode, initial: AsnValue) -> Self {
        Self {
            asn_type,
            value: RwLock::new(initial),
        }
    }

    pub async fn current(&self) -> AsnValue {
        self.value.read().await.clone()
    }

    fn type_matches(&self, value: &AsnValue) -> bool {
        std::mem::discriminant(value) == std::mem::discriminant(&self.placeholder())
    }

    fn placeholder(&self) -> AsnValue {
        match self.asn_type {
            crate::model::TypeCode::Integer => AsnValue::Integer32(0),
            crate::model::TypeCode::OctetString => AsnValue::OctetString(Vec::new()),
            crate::model::TypeCode::ObjectIdentifier => {
                AsnValue::ObjectIdentifier(crate::model::Oid::new(vec![]))
            }
            crate::model::TypeCode::IpAddress => AsnValue::IpAddress([0; 4]),
            crate::model::TypeCode::Counter32 => AsnValue::Counter32(0),
            crate::model::TypeCode::Gauge32 => AsnValue::Gauge32(0),
            crate::model::TypeCode::TimeTicks => AsnValue::TimeTicks(0),
            crate::model::TypeCode::Counter64 => AsnValue::Counter64(0),
        }
    }
}

#[async_trait]
impl ValueProducer for WriteCacheProducer {
    async fn read(&self, _ctx: &mut RequestContext) -> Result<ReadOutcome> {
        Ok(ReadOutcome::Value(self.current().await))
    }

    fn is_writable(&self) -> bool {
        true
    }

    async fn write(&self, _ctx: &mut RequestContext, new_value: AsnValue) -> Result<SetOutcome> {
        if !self.type_matches(&new_value) {
            return Ok(SetOutcome::WrongType);
        }
        let mut guard = self.value.write().await;
        *guard = new_value;
        Ok(SetOutcome::Ok)
    }

    fn kind(&self) -> ProducerKind {
        ProducerKind::WriteCache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn honors_set_and_rejects_wrong_type() {
        let p = WriteCacheProducer::new(crate::model::TypeCode::Integer, AsnValue::Integer32(1));
        let mut ctx = test_ctx();

        let status = p.write(&mut ctx, AsnValue::Integer32(9)).await.unwrap();
        assert_eq!(status, SetOutcome::Ok);
        assert_eq!(p.current().await, AsnValue::Integer32(9));

        let status = p
            .write(&mut ctx, AsnValue::OctetString(b"nope".to_vec()))
            .await
            .unwrap();
        assert_eq!(status, SetOutcome::WrongType);
        assert_eq!(p.current().await, AsnValue::Integer32(9));
    }
}
