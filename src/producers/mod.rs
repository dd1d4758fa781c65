//! Value producers ("variation modules", §4.2): pluggable strategies attached
//! to a [`crate::store::Record`] by tag at load time.

mod counter;
mod delay;
mod dynamic;
mod error;
mod static_value;
mod usm_stats;
mod write_cache;

pub use counter::{CounterGroup, CounterProducer};
pub use delay::{DelayDistribution, DelayProducer};
pub(crate) use delay::sample_delay_ms;
pub use dynamic::{DynamicCurve, DynamicOutputType, DynamicProducer};
pub use error::{ErrorProducer, ErrorTrigger};
pub use static_value::StaticProducer;
pub use usm_stats::UsmStatsProducer;
pub use write_cache::WriteCacheProducer;

use async_trait::async_trait;

use crate::model::{ReadOutcome, RequestContext, SetOutcome};
use crate::Result;

/// Identifies which concrete variation a producer implements, for load-time
/// tag validation and Control Surface introspection (§6: "Unknown tags are a
/// load error").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerKind {
    Static,
    WriteCache,
    Delay,
    Error,
    Counter,
    Dynamic,
}

impl ProducerKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "writecache" => Some(ProducerKind::WriteCache),
            "delay" => Some(ProducerKind::Delay),
            "error" => Some(ProducerKind::Error),
            "counter" => Some(ProducerKind::Counter),
            "dynamic" => Some(ProducerKind::Dynamic),
            _ => None,
        }
    }
}

/// A stateful strategy producing a value on demand. Producers are pure with
/// respect to request state except [`WriteCacheProducer`], [`CounterProducer`]
/// and [`DynamicProducer`], which own mutable state guarded by their own
/// interior locking (§4.2).
#[async_trait]
pub trait ValueProducer: Send + Sync {
    async fn read(&self, ctx: &mut RequestContext) -> Result<ReadOutcome>;

    fn is_writable(&self) -> bool {
        false
    }

    async fn write(&self, _ctx: &mut RequestContext, _value: crate::model::AsnValue) -> Result<SetOutcome> {
        Ok(SetOutcome::NotWritable)
    }

    fn kind(&self) -> ProducerKind;
}
