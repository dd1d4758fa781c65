//! Record Store (C1, §4.1): an ordered, per-context mapping of OID to
//! [`Record`], published copy-on-write so in-flight reads never observe a
//! torn update (§5 "Shared resources").

pub mod loader;
pub mod record;

pub use loader::LoadContext;
pub use record::Record;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use crate::model::{AsnValue, Oid, SetOutcome, TypeCode};
use crate::Result;

#[derive(Debug, Clone)]
pub enum GetOutcome {
    Found(Record),
    NoSuchObject,
    NoSuchInstance,
}

#[derive(Debug, Clone)]
pub enum NextOutcome {
    Found(Record),
    EndOfMibView,
}

/// Ordered OID → Record mapping for a single context, per §3/§4.1.
pub struct Store {
    snapshot: RwLock<Arc<BTreeMap<Oid, Record>>>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(BTreeMap::new())),
        }
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        let store = Self::new();
        store.load(records);
        store
    }

    /// Atomic replacement (§4.1): the new map is built off to the side and
    /// installed with a single pointer swap, so a reader either sees the
    /// old snapshot in full or the new one in full.
    pub fn load(&self, records: Vec<Record>) {
        let mut map = BTreeMap::new();
        for record in records {
            map.insert(record.oid.clone(), record);
        }
        let mut guard = self.snapshot.write().expect("store lock poisoned");
        *guard = Arc::new(map);
    }

    fn current(&self) -> Arc<BTreeMap<Oid, Record>> {
        Arc::clone(&self.snapshot.read().expect("store lock poisoned"))
    }

    /// Exact-match lookup. Distinguishes "not under any known subtree"
    /// (NoSuchObject) from "under a known table but this index is absent"
    /// (NoSuchInstance), per the sparse-table policy in §4.1.
    pub fn get(&self, oid: &Oid) -> GetOutcome {
        let snapshot = self.current();
        if let Some(record) = snapshot.get(oid) {
            return GetOutcome::Found(record.clone());
        }
        // A "known subtree" is the column/table the parent OID names: if any
        // loaded record sits under `oid`'s immediate parent, that table
        // exists and this particular index is a sparse hole rather than an
        // entirely unknown object.
        let under_known_subtree = match oid.parent() {
            Some(parent) => snapshot
                .range((Bound::Excluded(parent.clone()), Bound::Unbounded))
                .next()
                .map(|(k, _)| k.is_under(&parent))
                .unwrap_or(false),
            None => false,
        };
        if under_known_subtree {
            GetOutcome::NoSuchInstance
        } else {
            GetOutcome::NoSuchObject
        }
    }

    /// Lexicographic successor strictly greater than `oid` (§4.1, §8.1).
    pub fn next(&self, oid: &Oid) -> NextOutcome {
        let snapshot = self.current();
        match snapshot
            .range((Bound::Excluded(oid.clone()), Bound::Unbounded))
            .next()
        {
            Some((_, record)) => NextOutcome::Found(record.clone()),
            None => NextOutcome::EndOfMibView,
        }
    }

    /// Walks `non_repeaters` + `max_repetitions` times from the preceding
    /// OID per varbind, per §4.5's GetBulk semantics. Stops early on
    /// `EndOfMibView` rather than padding (§9 open-question resolution) —
    /// callers that need PDU-byte-cap clamping do that on top of this.
    pub fn bulk_walk(&self, start: &Oid, max_steps: u32) -> Vec<NextOutcome> {
        let mut out = Vec::with_capacity(max_steps as usize);
        let mut cursor = start.clone();
        for _ in 0..max_steps.max(1) {
            match self.next(&cursor) {
                NextOutcome::Found(record) => {
                    cursor = record.oid.clone();
                    out.push(NextOutcome::Found(record));
                }
                NextOutcome::EndOfMibView => {
                    out.push(NextOutcome::EndOfMibView);
                    break;
                }
            }
        }
        out
    }

    /// Phase 1 of a two-phase Set (§4.5): validate without mutating.
    pub fn validate_set(&self, oid: &Oid, value: &AsnValue) -> SetOutcome {
        let snapshot = self.current();
        match snapshot.get(oid) {
            None => SetOutcome::NoAccess,
            Some(record) => {
                if !record.is_writable() {
                    return SetOutcome::NotWritable;
                }
                if !type_matches(record.asn_type, value) {
                    return SetOutcome::WrongType;
                }
                SetOutcome::Ok
            }
        }
    }

    /// Phase 2 of a two-phase Set: commit a single varbind whose validation
    /// already passed. Returns the pre-commit value so the caller can roll
    /// back in reverse order on a later failure (§4.5).
    pub async fn commit_set(
        &self,
        ctx: &mut crate::model::RequestContext,
        oid: &Oid,
        value: AsnValue,
    ) -> Result<AsnValue> {
        let snapshot = self.current();
        let record = snapshot
            .get(oid)
            .ok_or_else(|| crate::Error::store(format!("set target vanished: {oid}")))?;
        let producer = record
            .producer
            .as_ref()
            .ok_or_else(|| crate::Error::store(format!("oid not writable: {oid}")))?;
        let previous = match producer.read(ctx).await? {
            crate::model::ReadOutcome::Value(v) => v,
            crate::model::ReadOutcome::ErrorOverride(_) => record.raw_value.clone(),
        };
        let outcome = producer.write(ctx, value).await?;
        if outcome != SetOutcome::Ok {
            return Err(crate::Error::store(format!("commit rejected for {oid}: {outcome:?}")));
        }
        Ok(previous)
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn type_matches(asn_type: TypeCode, value: &AsnValue) -> bool {
    use AsnValue::*;
    matches!(
        (asn_type, value),
        (TypeCode::Integer, Integer32(_))
            | (TypeCode::OctetString, OctetString(_))
            | (TypeCode::ObjectIdentifier, ObjectIdentifier(_))
            | (TypeCode::IpAddress, IpAddress(_))
            | (TypeCode::Counter32, Counter32(_))
            | (TypeCode::Gauge32, Gauge32(_))
            | (TypeCode::TimeTicks, TimeTicks(_))
            | (TypeCode::Counter64, Counter64(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Oid;

    fn rec(oid: &str, value: AsnValue, ty: TypeCode) -> Record {
        Record::new(Oid::from_str(oid).unwrap(), ty, value)
    }

    fn sample_store() -> Store {
        Store::from_records(vec![
            rec("1.3.6.1.2.1.1.1.0", AsnValue::OctetString(b"sysDescr".to_vec()), TypeCode::OctetString),
            rec("1.3.6.1.2.1.2.2.1.2.1", AsnValue::OctetString(b"eth0".to_vec()), TypeCode::OctetString),
            rec("1.3.6.1.2.1.2.2.1.2.3", AsnValue::OctetString(b"eth2".to_vec()), TypeCode::OctetString),
        ])
    }

    #[test]
    fn get_exact_hit() {
        let store = sample_store();
        match store.get(&Oid::from_str("1.3.6.1.2.1.1.1.0").unwrap()) {
            GetOutcome::Found(_) => {}
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn get_sparse_hole_is_no_such_instance() {
        let store = sample_store();
        // .2 is missing from the table whose .1 and .3 siblings exist.
        match store.get(&Oid::from_str("1.3.6.1.2.1.2.2.1.2.2").unwrap()) {
            GetOutcome::NoSuchInstance => {}
            other => panic!("expected NoSuchInstance, got {other:?}"),
        }
    }

    #[test]
    fn get_outside_any_subtree_is_no_such_object() {
        let store = sample_store();
        match store.get(&Oid::from_str("1.9.9.9").unwrap()) {
            GetOutcome::NoSuchObject => {}
            other => panic!("expected NoSuchObject, got {other:?}"),
        }
    }

    #[test]
    fn next_is_strictly_greater_and_lexicographic() {
        let store = sample_store();
        match store.next(&Oid::from_str("1.3.6.1.2.1.1.1.0").unwrap()) {
            NextOutcome::Found(r) => assert_eq!(r.oid, Oid::from_str("1.3.6.1.2.1.2.2.1.2.1").unwrap()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn next_past_everything_is_end_of_mib_view() {
        let store = sample_store();
        match store.next(&Oid::from_str("1.3.6.1.2.1.2.2.1.2.3").unwrap()) {
            NextOutcome::EndOfMibView => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bulk_walk_stops_early_at_end_of_mib_view() {
        let store = sample_store();
        let steps = store.bulk_walk(&Oid::from_str("1.3.6.1.2.1.1.1.0").unwrap(), 10);
        assert!(matches!(steps.last(), Some(NextOutcome::EndOfMibView)));
        assert!(steps.len() < 10, "must not pad past EndOfMibView");
    }

    #[test]
    fn load_is_atomic_replacement() {
        let store = sample_store();
        assert_eq!(store.len(), 3);
        store.load(vec![rec("1.1", AsnValue::Integer32(1), TypeCode::Integer)]);
        assert_eq!(store.len(), 1);
    }
}
