//! Exposes one `usmStats*` failure counter (RFC 3414 §5) as a read-only
//! record so it can be walked/queried like any other OID (SPEC_FULL.md §B:
//! "no leaked store data" — these counters live in the store, not only in
//! a Report PDU).

use async_trait::async_trait;

use crate::model::{AsnValue, ReadOutcome, RequestContext};
use crate::producers::{ProducerKind, ValueProducer};
use crate::protocol::engine::{EngineIdentity, UsmFailure};
use crate::Result;
use std::sync::Arc;

#[derive(Debug)]
pub struct UsmStatsProducer {
    identity: Arc<EngineIdentity>,
    failure: UsmFailure,
}

impl UsmStatsProducer {
    pub fn new(identity: Arc<EngineIdentity>, failure: UsmFailure) -> Self {
        Self { identity, failure }
    }
}

#[async_trait]
impl ValueProducer for UsmStatsProducer {
    async fn read(&self, _ctx: &mut RequestContext) -> Result<ReadOutcome> {
        let count = self.identity.usm_failure_count(self.failure);
        Ok(ReadOutcome::Value(AsnValue::Counter32(count as u32)))
    }

    fn kind(&self) -> ProducerKind {
        ProducerKind::Counter
    }
}
