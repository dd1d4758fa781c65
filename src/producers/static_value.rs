//! Static producer: returns the stored value unchanged (§4.2).

use async_trait::async_trait;

use crate::model::{AsnValue, ReadOutcome, RequestContext};
use crate::producers::{ProducerKind, ValueProducer};
use crate::Result;

#[derive(Debug, Clone)]
pub struct StaticProducer {
    value: AsnValue,
}

impl StaticProducer {
    pub fn new(value: AsnValue) -> Self {
        Self { value }
    }
}

#[async_trait]
impl ValueProducer for StaticProducer {
    async fn read(&self, _ctx: &mut RequestContext) -> Result<ReadOutcome> {
        Ok(ReadOutcome::Value(self.value.clone()))
    }

    fn kind(&self) -> ProducerKind {
        ProducerKind::Static
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn returns_stored_value() {
        let p = StaticProducer::new(AsnValue::Integer32(42));
        let mut c = test_ctx();
        match p.read(&mut c).await.unwrap() {
            ReadOutcome::Value(AsnValue::Integer32(42)) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!p.is_writable());
    }
}
