//! Global delay (§4.4 step 5): base delay + deviation, added to the same
//! `delay_budget_ms` that per-record Delay producers contribute to.

use async_trait::async_trait;

use crate::behavior::Interceptor;
use crate::model::RequestContext;
use crate::producers::{sample_delay_ms, DelayDistribution};

pub struct GlobalDelay {
    base_ms: u64,
    deviation_ms: u64,
    distribution: DelayDistribution,
}

impl GlobalDelay {
    pub fn new(base_ms: u64, deviation_ms: u64, distribution: DelayDistribution) -> Self {
        Self {
            base_ms,
            deviation_ms,
            distribution,
        }
    }
}

#[async_trait]
impl Interceptor for GlobalDelay {
    fn name(&self) -> &'static str {
        "global_delay"
    }

    async fn before_lookup(&self, ctx: &mut RequestContext) {
        if self.base_ms == 0 && self.deviation_ms == 0 {
            return;
        }
        ctx.derived.delay_budget_ms += sample_delay_ms(self.base_ms, self.deviation_ms, self.distribution);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn zero_deviation_adds_exact_base() {
        let interceptor = GlobalDelay::new(500, 0, DelayDistribution::Uniform);
        let mut ctx = test_ctx();
        interceptor.before_lookup(&mut ctx).await;
        assert_eq!(ctx.derived.delay_budget_ms, 500);
    }
}
