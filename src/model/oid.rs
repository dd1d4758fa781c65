//! Object Identifier type and lexicographic ordering.

use std::fmt;

use crate::{Error, Result};

/// Immutable, lexicographically-ordered sequence of non-negative integers.
///
/// `Vec<u32>`'s derived `Ord` already compares element-wise and falls back to
/// length, which is exactly OID lexicographic order, so `Oid` derives `Ord`
/// directly rather than hand-rolling a comparator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Oid(pub Vec<u32>);

impl Oid {
    pub fn new(components: Vec<u32>) -> Self {
        Self(components)
    }

    pub fn from_str(s: &str) -> Result<Self> {
        let components: std::result::Result<Vec<u32>, _> = s
            .trim()
            .trim_start_matches('.')
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u32>())
            .collect();

        components
            .map(Oid)
            .map_err(|_| Error::parse(format!("invalid OID: {s}")))
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    pub fn append(&self, component: u32) -> Self {
        let mut components = self.0.clone();
        components.push(component);
        Self(components)
    }

    pub fn parent(&self) -> Option<Oid> {
        if self.0.is_empty() {
            None
        } else {
            Some(Oid(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// True if `self` is strictly under the `parent` subtree.
    pub fn is_under(&self, parent: &Oid) -> bool {
        self.0.len() > parent.0.len() && self.0[..parent.0.len()] == parent.0[..]
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl From<Vec<u32>> for Oid {
    fn from(v: Vec<u32>) -> Self {
        Oid(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_round_trips() {
        let oid = Oid::from_str("1.3.6.1.2.1.1.1.0").unwrap();
        assert_eq!(oid.components(), &[1, 3, 6, 1, 2, 1, 1, 1, 0]);
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.1.0");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Oid::from_str("1.3.x.1").is_err());
    }

    #[test]
    fn lexicographic_ordering_matches_snmp_semantics() {
        let a = Oid::from_str("1.3.6.1.2.1.1.1").unwrap();
        let b = Oid::from_str("1.3.6.1.2.1.1.1.0").unwrap();
        let c = Oid::from_str("1.3.6.1.2.1.1.2").unwrap();
        // shorter prefix sorts before its own extension
        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
    }

    #[test]
    fn is_under_requires_strict_descendant() {
        let parent = Oid::from_str("1.3.6.1.2.1.2.2").unwrap();
        let child = Oid::from_str("1.3.6.1.2.1.2.2.1.10.1").unwrap();
        assert!(child.is_under(&parent));
        assert!(!parent.is_under(&parent));
        assert!(!parent.is_under(&child));
    }
}
