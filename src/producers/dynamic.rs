//! Dynamic producer: scripted/computed from the global clock and engine
//! state (§4.2), e.g. an interface-utilization curve keyed by hour of day.
//!
//! §9: dynamic variation is a *closed* set of built-in curves selected by
//! tag, not runtime-loaded code — there is no plugin-dispatch surface here.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Timelike;

use crate::model::{AsnValue, ReadOutcome, RequestContext};
use crate::producers::{ProducerKind, ValueProducer};
use crate::Result;

#[derive(Debug, Clone)]
pub enum DynamicCurve {
    /// Smooth diurnal curve peaking at `peak_hour`, scaled to `[min, max]`.
    HourlyUtilization { min: f64, max: f64, peak_hour: u32 },
    /// Plain sine wave, useful for exercising client graphing without a
    /// wall-clock dependency.
    Sine { amplitude: f64, period_s: f64, offset: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicOutputType {
    Gauge32,
    Integer32,
}

#[derive(Debug, Clone)]
pub struct DynamicProducer {
    curve: DynamicCurve,
    epoch: Instant,
    output: DynamicOutputType,
}

impl DynamicProducer {
    pub fn new(curve: DynamicCurve, epoch: Instant, output: DynamicOutputType) -> Self {
        Self {
            curve,
            epoch,
            output,
        }
    }

    fn evaluate(&self, now: Instant) -> f64 {
        match &self.curve {
            DynamicCurve::HourlyUtilization { min, max, peak_hour } => {
                let hour = chrono::Utc::now().hour() as f64
                    + chrono::Utc::now().minute() as f64 / 60.0;
                let phase = (hour - *peak_hour as f64) / 24.0 * std::f64::consts::TAU;
                let unit = (phase.cos() + 1.0) / 2.0;
                min + unit * (max - min)
            }
            DynamicCurve::Sine { amplitude, period_s, offset } => {
                let elapsed = now.saturating_duration_since(self.epoch).as_secs_f64();
                offset + amplitude * (elapsed / period_s * std::f64::consts::TAU).sin()
            }
        }
    }
}

#[async_trait]
impl ValueProducer for DynamicProducer {
    async fn read(&self, ctx: &mut RequestContext) -> Result<ReadOutcome> {
        let value = self.evaluate(ctx.recv_time);
        let asn = match self.output {
            DynamicOutputType::Gauge32 => AsnValue::Gauge32(value.max(0.0) as u32),
            DynamicOutputType::Integer32 => AsnValue::Integer32(value as i32),
        };
        Ok(ReadOutcome::Value(asn))
    }

    fn kind(&self) -> ProducerKind {
        ProducerKind::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;
    use std::time::Duration;

    #[tokio::test]
    async fn sine_curve_stays_within_bounds() {
        let p = DynamicProducer::new(
            DynamicCurve::Sine {
                amplitude: 10.0,
                period_s: 60.0,
                offset: 50.0,
            },
            Instant::now(),
            DynamicOutputType::Gauge32,
        );
        let mut ctx = test_ctx();
        ctx.recv_time = Instant::now() + Duration::from_secs(15);
        match p.read(&mut ctx).await.unwrap() {
            ReadOutcome::Value(AsnValue::Gauge32(v)) => assert!((40..=60).contains(&v)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn hourly_curve_bounded_by_min_max() {
        let p = DynamicProducer::new(
            DynamicCurve::HourlyUtilization {
                min: 5.0,
                max: 95.0,
                peak_hour: 14,
            },
            Instant::now(),
            DynamicOutputType::Gauge32,
        );
        let v = p.evaluate(Instant::now());
        assert!((5.0..=95.0).contains(&v));
    }
}
