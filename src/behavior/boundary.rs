//! MIB boundary injector (§4.4 step 3): for configured OIDs/patterns,
//! overrides the eventual lookup result before it ever reaches C1.

use async_trait::async_trait;

use crate::behavior::Interceptor;
use crate::model::{AsnValue, Oid, RequestContext};

pub struct MibBoundaryInjector {
    /// `(subtree prefix, oid_end)`: a GetNext/GetBulk walk at or past
    /// `oid_end` within `prefix` yields `EndOfMibView` (§4.1 "Walk boundary").
    view_ends: Vec<(Oid, Oid)>,
    /// Exact OIDs configured as absent entirely (§4.1 "Missing objects list").
    missing_objects: Vec<Oid>,
    /// Exact OIDs configured as sparse-table holes (§4.1 "Sparse table holes").
    sparse_holes: Vec<Oid>,
}

impl MibBoundaryInjector {
    pub fn new(view_ends: Vec<(Oid, Oid)>, missing_objects: Vec<Oid>, sparse_holes: Vec<Oid>) -> Self {
        Self {
            view_ends,
            missing_objects,
            sparse_holes,
        }
    }

    fn past_view_end(&self, oid: &Oid) -> bool {
        self.view_ends
            .iter()
            .any(|(prefix, oid_end)| (oid.is_under(prefix) || oid == prefix) && oid >= oid_end)
    }
}

#[async_trait]
impl Interceptor for MibBoundaryInjector {
    fn name(&self) -> &'static str {
        "mib_boundary_injector"
    }

    async fn before_lookup(&self, ctx: &mut RequestContext) {
        use crate::model::PduType;
        let is_walk = matches!(ctx.pdu_type, PduType::GetNextRequest | PduType::GetBulkRequest);
        let oids: Vec<Oid> = ctx.var_binds.iter().map(|vb| vb.oid.clone()).collect();
        for (index, oid) in oids.iter().enumerate() {
            if self.missing_objects.contains(oid) {
                ctx.derived.boundary_overrides.push((index, AsnValue::NoSuchObject));
            } else if self.sparse_holes.contains(oid) {
                ctx.derived.boundary_overrides.push((index, AsnValue::NoSuchInstance));
            } else if is_walk && self.past_view_end(oid) {
                ctx.derived.boundary_overrides.push((index, AsnValue::EndOfMibView));
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
    async fn walk_past_view_end_yields_end_of_mib_view() {
        let injector = MibBoundaryInjector::new(
            vec![(
                Oid::from_str("1.3.6.1.2.1.1").unwrap(),
                Oid::from_str("1.3.6.1.2.1.1.9.0").unwrap(),
            )],
            vec![],
            vec![],
        );
        let mut ctx = test_ctx();
        ctx.pdu_type = crate::model::PduType::GetNextRequest;
        ctx.var_binds.push(VarBind::new(
            Oid::from_str("1.3.6.1.2.1.1.9.0").unwrap(),
            AsnValue::NoSuchObject,
        ));
        injector.before_lookup(&mut ctx).await;
        assert_eq!(ctx.derived.boundary_overrides, vec![(0, AsnValue::EndOfMibView)]);
    }

    #[tokio::test]
    async fn missing_object_overrides_get() {
        let target = Oid::from_str("1.3.6.1.2.1.99.0").unwrap();
        let injector = MibBoundaryInjector::new(vec![], vec![target.clone()], vec![]);
        let mut ctx = test_ctx();
        ctx.var_binds.push(VarBind::new(target, AsnValue::NoSuchObject));
        injector.before_lookup(&mut ctx).await;
        assert_eq!(ctx.derived.boundary_overrides, vec![(0, AsnValue::NoSuchObject)]);
    }
}
