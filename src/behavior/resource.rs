//! Resource-limit gate (§4.4 step 1): trips when the concurrent in-flight
//! count exceeds a configured threshold.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::behavior::Interceptor;
use crate::model::{ErrorStatus, RequestContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLimitAction {
    ErrorTooBig,
    Drop,
}

pub struct ResourceGate {
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
    action: ResourceLimitAction,
}

impl ResourceGate {
    pub fn new(max_concurrent: usize, action: ResourceLimitAction) -> Self {
        Self {
            max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
            action,
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interceptor for ResourceGate {
    fn name(&self) -> &'static str {
        "resource_gate"
    }

    async fn before_lookup(&self, ctx: &mut RequestContext) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        if current > self.max_concurrent {
            match self.action {
                ResourceLimitAction::ErrorTooBig => ctx.derived.set_error_once(ErrorStatus::TooBig, 0),
                ResourceLimitAction::Drop => ctx.derived.drop_decision = true,
            }
        }
    }

    async fn after_lookup(&self, _ctx: &mut RequestContext) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn trips_error_once_over_threshold() {
        let gate = ResourceGate::new(1, ResourceLimitAction::ErrorTooBig);
        let mut first = test_ctx();
        gate.before_lookup(&mut first).await;
        assert_eq!(first.derived.error_override, None);

        let mut second = test_ctx();
        gate.before_lookup(&mut second).await;
        assert_eq!(second.derived.error_override, Some(ErrorStatus::TooBig));

        gate.after_lookup(&mut first).await;
        assert_eq!(gate.in_flight_count(), 1);
    }
}
