//! Behavior Chain (C4, §4.4): a fixed-order list of interceptors that
//! annotate a [`RequestContext`]'s `derived` fields before the Protocol
//! Engine consults the Record Store. No interceptor may mutate the store.

pub mod agentx;
pub mod boundary;
pub mod delay;
pub mod drops;
pub mod errors;
pub mod resource;

pub use agentx::AgentxDelay;
pub use boundary::MibBoundaryInjector;
pub use delay::GlobalDelay;
pub use drops::PacketDrop;
pub use errors::ErrorInjector;
pub use resource::{ResourceGate, ResourceLimitAction};

use async_trait::async_trait;

use crate::model::RequestContext;

/// One stage of the chain. `before_lookup` runs ahead of C1; `after_lookup`
/// runs once the response is known, mainly for bookkeeping (e.g. releasing
/// an in-flight slot). Default `after_lookup` is a no-op.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn before_lookup(&self, ctx: &mut RequestContext);

    async fn after_lookup(&self, _ctx: &mut RequestContext) {}
}

/// Fixed ordering per §4.4: resource gate, AgentX subsystem delay, MIB
/// boundary injector, error injector, global delay, packet drop.
pub struct BehaviorChain {
    stages: Vec<Box<dyn Interceptor>>,
}

impl BehaviorChain {
    pub fn new(stages: Vec<Box<dyn Interceptor>>) -> Self {
        Self { stages }
    }

    pub async fn run_before(&self, ctx: &mut RequestContext) {
        for stage in &self.stages {
            stage.before_lookup(ctx).await;
        }
    }

    pub async fn run_after(&self, ctx: &mut RequestContext) {
        for stage in &self.stages {
            stage.after_lookup(ctx).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::drops::PacketDrop;
    use crate::behavior::errors::ErrorInjector;
    use crate::model::{DropSide, ErrorStatus};
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn first_error_wins_across_stages() {
        let chain = BehaviorChain::new(vec![
            Box::new(ErrorInjector::always(ErrorStatus::GenErr)),
            Box::new(ErrorInjector::always(ErrorStatus::TooBig)),
        ]);
        let mut ctx = test_ctx();
        chain.run_before(&mut ctx).await;
        assert_eq!(ctx.derived.error_override, Some(ErrorStatus::GenErr));
    }

    #[tokio::test]
    async fn drop_decision_does_not_clobber_existing_side() {
        let chain = BehaviorChain::new(vec![Box::new(PacketDrop::always(DropSide::Request))]);
        let mut ctx = test_ctx();
        chain.run_before(&mut ctx).await;
        assert!(ctx.derived.drop_decision);
        assert_eq!(ctx.derived.drop_side, DropSide::Request);
    }
}
