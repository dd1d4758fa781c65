//! Error injector (§4.4 step 4): with probability `p`, or for a configured
//! OID, forces a specific error status.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::behavior::Interceptor;
use crate::model::{ErrorStatus, Oid, RequestContext};

pub struct ErrorInjector {
    rate_pct: f64,
    kinds: Vec<ErrorStatus>,
    per_oid: HashMap<Oid, ErrorStatus>,
}

impl ErrorInjector {
    pub fn new(rate_pct: f64, kinds: Vec<ErrorStatus>, per_oid: HashMap<Oid, ErrorStatus>) -> Self {
        Self {
            rate_pct,
            kinds,
            per_oid,
        }
    }

    /// Convenience for tests: always injects `status` on the first varbind.
    pub fn always(status: ErrorStatus) -> Self {
        Self::new(1.0, vec![status], HashMap::new())
    }
}

#[async_trait]
impl Interceptor for ErrorInjector {
    fn name(&self) -> &'static str {
        "error_injector"
    }

    async fn before_lookup(&self, ctx: &mut RequestContext) {
        for (index, vb) in ctx.var_binds.iter().enumerate() {
            if let Some(status) = self.per_oid.get(&vb.oid) {
                ctx.derived.set_error_once(*status, (index + 1) as i32);
                return;
            }
        }
        if self.kinds.is_empty() || self.rate_pct <= 0.0 {
            return;
        }
        if rand::thread_rng().gen_bool(self.rate_pct.clamp(0.0, 1.0)) {
            if let Some(status) = self.kinds.choose(&mut rand::thread_rng()) {
                ctx.derived.set_error_once(*status, 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VarBind;
    use crate::test_support::test_ctx;

    #[tokio::test]
    async fn per_oid_override_wins_over_random_draw() {
        let oid = Oid::from_str("1.3.6.1.2.1.1.1.0").unwrap();
        let mut per_oid = HashMap::new();
        per_oid.insert(oid.clone(), ErrorStatus::NoAccess);
        let injector = ErrorInjector::new(0.0, vec![], per_oid);
        let mut ctx = test_ctx();
        ctx.var_binds.push(VarBind::new(oid, crate::model::AsnValue::NoSuchObject));
        injector.before_lookup(&mut ctx).await;
        assert_eq!(ctx.derived.error_override, Some(ErrorStatus::NoAccess));
        assert_eq!(ctx.derived.error_index, 1);
    }

    #[tokio::test]
    async fn zero_rate_never_injects() {
        let injector = ErrorInjector::new(0.0, vec![ErrorStatus::GenErr], HashMap::new());
        let mut ctx = test_ctx();
        injector.before_lookup(&mut ctx).await;
        assert_eq!(ctx.derived.error_override, None);
    }
}
