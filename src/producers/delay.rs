//! Delay producer: adds to the request's delay budget without blocking the
//! calling worker (§4.2). The actual wait is realized by the send scheduler
//! in `transport`, never by sleeping in a worker.

use async_trait::async_trait;
use rand::Rng;

use crate::model::{AsnValue, ReadOutcome, RequestContext};
use crate::producers::{ProducerKind, ValueProducer};
use crate::Result;

/// §9 open question: source implies uniform but sometimes treats `deviation`
/// as a standard deviation. We keep both, defaulting to uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DelayDistribution {
    Uniform,
    Normal,
}

impl Default for DelayDistribution {
    fn default() -> Self {
        DelayDistribution::Uniform
    }
}

#[derive(Debug, Clone)]
pub struct DelayProducer {
    base_value: AsnValue,
    delay_ms: u64,
    deviation_ms: u64,
    distribution: DelayDistribution,
}

impl DelayProducer {
    pub fn new(
        base_value: AsnValue,
        delay_ms: u64,
        deviation_ms: u64,
        distribution: DelayDistribution,
    ) -> Self {
        Self {
            base_value,
            delay_ms,
            deviation_ms,
            distribution,
        }
    }

    /// Sample a delay in `[0, +inf)` ms, truncating negative excursions at 0
    /// per §4.4 ("truncated at 0").
    fn sample_ms(&self) -> u64 {
        sample_delay_ms(self.delay_ms, self.deviation_ms, self.distribution)
    }
}

/// Shared by [`DelayProducer`] and the global-delay behavior interceptor
/// (§4.4), which samples from the same distribution over a PDU-wide base
/// delay rather than a single record's.
pub(crate) fn sample_delay_ms(base_ms: u64, deviation_ms: u64, distribution: DelayDistribution) -> u64 {
    if deviation_ms == 0 {
        return base_ms;
    }
    let mut rng = rand::thread_rng();
    let delta: f64 = match distribution {
        DelayDistribution::Uniform => {
            rng.gen_range(-(deviation_ms as f64)..=(deviation_ms as f64))
        }
        DelayDistribution::Normal => {
            let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
            let u2: f64 = rng.gen_range(0.0..1.0);
            let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            z0 * deviation_ms as f64
        }
    };
    (base_ms as f64 + delta).max(0.0) as u64
}

#[async_trait]
impl ValueProducer for DelayProducer {
    async fn read(&self, ctx: &mut RequestContext) -> Result<ReadOutcome> {
        ctx.derived.delay_budget_ms += self.sample_ms();
        Ok(ReadOutcome::Value(self.base_value.clone()))
    }

    fn kind(&self) -> ProducerKind {
        ProducerKind::Delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn adds_to_delay_budget() {
        let p = DelayProducer::new(AsnValue::Integer32(1), 500, 0, DelayDistribution::Uniform);
        let mut ctx = test_ctx();
        p.read(&mut ctx).await.unwrap();
        assert_eq!(ctx.derived.delay_budget_ms, 500);
    }

    #[tokio::test]
    async fn deviation_stays_non_negative() {
        let p = DelayProducer::new(AsnValue::Integer32(1), 10, 1000, DelayDistribution::Uniform);
        for _ in 0..50 {
            let mut ctx = test_ctx();
            p.read(&mut ctx).await.unwrap();
            // budget can't underflow u64; if sample_ms() ever went negative
            // pre-truncation this would have panicked on cast, not merely
            // been wrong, so a clean return is itself the assertion.
            assert!(ctx.derived.delay_budget_ms < u64::MAX);
        }
    }
}
