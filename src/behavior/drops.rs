//! Packet-loss interceptor (§4.4 step 6): a Bernoulli trial deciding
//! whether the eventual response (or, per config, the request) is dropped.

use async_trait::async_trait;
use rand::Rng;

use crate::behavior::Interceptor;
use crate::model::{DropSide, RequestContext};

pub struct PacketDrop {
    rate_pct: f64,
    side: DropSide,
}

impl PacketDrop {
    pub fn new(rate_pct: f64, side: DropSide) -> Self {
        Self { rate_pct, side }
    }

    /// Convenience for tests: always drops on `side`.
    pub fn always(side: DropSide) -> Self {
        Self::new(1.0, side)
    }
}

#[async_trait]
impl Interceptor for PacketDrop {
    fn name(&self) -> &'static str {
        "packet_drop"
    }

    async fn before_lookup(&self, ctx: &mut RequestContext) {
        if ctx.derived.drop_decision || self.rate_pct <= 0.0 {
            return;
        }
        if rand::thread_rng().gen_bool(self.rate_pct.clamp(0.0, 1.0)) {
            ctx.derived.drop_decision = true;
            ctx.derived.drop_side = self.side;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn zero_rate_never_drops() {
        let interceptor = PacketDrop::new(0.0, DropSide::Response);
        let mut ctx = test_ctx();
        interceptor.before_lookup(&mut ctx).await;
        assert!(!ctx.derived.drop_decision);
    }

    #[tokio::test]
    async fn already_dropped_is_left_alone() {
        let interceptor = PacketDrop::new(1.0, DropSide::Request);
        let mut ctx = test_ctx();
        ctx.derived.drop_decision = true;
        ctx.derived.drop_side = DropSide::Response;
        interceptor.before_lookup(&mut ctx).await;
        assert_eq!(ctx.derived.drop_side, DropSide::Response);
    }
}
