//! Counter producer: `value = floor(t·rate·acceleration + seed) mod 2^bits` (§4.2).
//!
//! Producers sharing a [`CounterGroup`] share the same `t0`, which is the
//! invariant that keeps related counters (e.g. ifIn/ifOut) in the same
//! rate ratio across independent wraps (§3).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::model::{AsnValue, ReadOutcome, RequestContext};
use crate::producers::{ProducerKind, ValueProducer};
use crate::Result;

#[derive(Debug)]
pub struct CounterGroup {
    pub epoch: Instant,
    pub bits: u8,
    pub rate: f64,
    pub acceleration: f64,
}

impl CounterGroup {
    pub fn new(epoch: Instant, bits: u8, rate: f64, acceleration: f64) -> Self {
        Self {
            epoch,
            bits,
            rate,
            acceleration,
        }
    }
}

#[derive(Debug)]
pub struct CounterProducer {
    group: Arc<CounterGroup>,
    /// Per-producer seed/phase; distinct producers in the same group may
    /// have distinct seeds while still sharing `t0`.
    phase: u64,
}

impl CounterProducer {
    pub fn new(group: Arc<CounterGroup>, phase: u64) -> Self {
        Self { group, phase }
    }

    pub fn value_at(&self, now: Instant) -> u64 {
        let elapsed_ms = now.saturating_duration_since(self.group.epoch).as_secs_f64() * 1000.0;
        let raw = self.phase as f64 + elapsed_ms * self.group.rate * self.group.acceleration;
        let modulus: u128 = 1u128 << self.group.bits;
        (raw.floor().rem_euclid(modulus as f64)) as u64
    }
}

#[async_trait]
impl ValueProducer for CounterProducer {
    async fn read(&self, ctx: &mut RequestContext) -> Result<ReadOutcome> {
        let value = self.value_at(ctx.recv_time);
        let asn = if self.group.bits == 64 {
            AsnValue::Counter64(value)
        } else {
            AsnValue::Counter32(value as u32)
        };
        Ok(ReadOutcome::Value(asn))
    }

    fn kind(&self) -> ProducerKind {
        ProducerKind::Counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn monotonic_until_wrap() {
        let group = Arc::new(CounterGroup::new(Instant::now(), 32, 1.0, 1000.0));
        let producer = CounterProducer::new(Arc::clone(&group), 0);
        let t0 = group.epoch;
        let v1 = producer.value_at(t0 + Duration::from_millis(10));
        let v2 = producer.value_at(t0 + Duration::from_millis(20));
        assert!(v2 > v1);
    }

    #[test]
    fn wraps_modulo_2_pow_bits() {
        let group = Arc::new(CounterGroup::new(Instant::now(), 32, 1.0, 1000.0));
        // seed close to the 32-bit ceiling so a 10ms step at rate*accel=1000
        // ops/ms pushes past 2^32-1 and wraps.
        let producer = CounterProducer::new(Arc::clone(&group), 4_294_967_000);
        let t0 = group.epoch;
        let v1 = producer.value_at(t0 + Duration::from_millis(0));
        let v2 = producer.value_at(t0 + Duration::from_millis(10));
        assert!(v2 < v1, "expected a wrap: v1={v1} v2={v2}");
        assert!(v1 - v2 < u32::MAX && (u32::MAX as u64 - v1) < 20_000);
    }

    #[test]
    fn shared_group_preserves_rate_ratio_across_related_counters() {
        let group = Arc::new(CounterGroup::new(Instant::now(), 32, 2.0, 500.0));
        let in_counter = CounterProducer::new(Arc::clone(&group), 0);
        let out_counter = CounterProducer::new(Arc::clone(&group), 0);
        let t0 = group.epoch;
        for ms in [5, 15, 50] {
            let t = t0 + Duration::from_millis(ms);
            assert_eq!(in_counter.value_at(t), out_counter.value_at(t));
        }
    }
}
