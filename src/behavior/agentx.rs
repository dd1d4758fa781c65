//! AgentX subsystem delay (§4.4 step 2): simulates a subagent registered
//! under a subtree adding its own latency, with an optional chance of a
//! registration timeout (a full drop rather than a delay).

use async_trait::async_trait;
use rand::Rng;

use crate::behavior::Interceptor;
use crate::model::{Oid, RequestContext};

pub struct AgentxDelay {
    /// `(subtree prefix, added delay ms)`, matched by longest prefix.
    subagent_delays: Vec<(Oid, u64)>,
    reg_timeout_pct: f64,
}

impl AgentxDelay {
    pub fn new(subagent_delays: Vec<(Oid, u64)>, reg_timeout_pct: f64) -> Self {
        Self {
            subagent_delays,
            reg_timeout_pct,
        }
    }

    fn longest_match(&self, oid: &Oid) -> Option<u64> {
        self.subagent_delays
            .iter()
            .filter(|(prefix, _)| oid.is_under(prefix) || oid == prefix)
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, ms)| *ms)
    }
}

#[async_trait]
impl Interceptor for AgentxDelay {
    fn name(&self) -> &'static str {
        "agentx_delay"
    }

    async fn before_lookup(&self, ctx: &mut RequestContext) {
        let Some(first) = ctx.var_binds.first().map(|vb| vb.oid.clone()) else {
            return;
        };
        if let Some(ms) = self.longest_match(&first) {
            ctx.derived.subsystem_latency_ms += ms;
            ctx.derived.delay_budget_ms += ms;
        }
        if self.reg_timeout_pct > 0.0 && rand::thread_rng().gen_bool(self.reg_timeout_pct.clamp(0.0, 1.0)) {
            // §4.4: "a PDU that triggers both registration timeout and a
            // subsystem delay is dropped" — the delay above is harmless
            // once dropped, since transport never sends it.
            ctx.derived.drop_decision = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Oid, VarBind};
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn applies_longest_prefix_match() {
        let interceptor = AgentxDelay::new(
            vec![
                (Oid::from_str("1.3.6.1.4").unwrap(), 10),
                (Oid::from_str("1.3.6.1.4.1.9999").unwrap(), 250),
            ],
            0.0,
        );
        let mut ctx = test_ctx();
        ctx.var_binds.push(VarBind::new(
            Oid::from_str("1.3.6.1.4.1.9999.1.0").unwrap(),
            crate::model::AsnValue::NoSuchObject,
        ));
        interceptor.before_lookup(&mut ctx).await;
        assert_eq!(ctx.derived.delay_budget_ms, 250);
    }

    #[tokio::test]
    async fn always_timeout_drops_request() {
        let interceptor = AgentxDelay::new(vec![], 1.0);
        let mut ctx = test_ctx();
        interceptor.before_lookup(&mut ctx).await;
        assert!(ctx.derived.drop_decision);
    }
}
