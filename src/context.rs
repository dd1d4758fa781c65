//! Context Resolver (C3, §4.3): maps an incoming request to a named
//! context, enforces its ACL, and exposes the `oid_overrides` overlay that
//! the protocol engine consults before falling through to the Record Store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;

use crate::model::{AsnValue, Oid, RequestContext, SnmpVersion};
use crate::store::Store;
use crate::{Error, Result};

/// A single named context (§3): its backing store, ACL, and overlay.
pub struct Context {
    pub name: String,
    pub store: Arc<Store>,
    pub allowed_users: Vec<String>,
    pub denied_oid_patterns: Vec<Regex>,
    oid_overrides: RwLock<HashMap<Oid, AsnValue>>,
}

impl Context {
    pub fn new(
        name: impl Into<String>,
        store: Arc<Store>,
        allowed_users: Vec<String>,
        denied_oid_patterns: Vec<Regex>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            allowed_users,
            denied_oid_patterns,
            oid_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Consulted before the underlying Record Store (§4.3): present only
    /// for OIDs the Simulation Engine has overlaid (e.g. a state-machine
    /// transition forcing `ifOperStatus=down`).
    pub fn overlay_get(&self, oid: &Oid) -> Option<AsnValue> {
        self.oid_overrides
            .read()
            .expect("overlay lock poisoned")
            .get(oid)
            .cloned()
    }

    /// Applied atomically by the Simulation Engine (§4.7) when a state
    /// machine transition fires.
    pub fn apply_overlay(&self, entries: impl IntoIterator<Item = (Oid, AsnValue)>) {
        let mut guard = self.oid_overrides.write().expect("overlay lock poisoned");
        guard.extend(entries);
    }

    pub fn clear_overlay(&self, oid: &Oid) {
        self.oid_overrides
            .write()
            .expect("overlay lock poisoned")
            .remove(oid);
    }

    pub fn is_oid_denied(&self, oid: &Oid) -> bool {
        let rendered = oid.to_string();
        self.denied_oid_patterns.iter().any(|re| re.is_match(&rendered))
    }
}

/// Outcome of resolving a request's identity against a context's ACL (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclOutcome {
    Allowed,
    /// v3: respond with a Report PDU carrying `authorizationError`.
    AuthorizationError,
    /// v1/v2c policy default: drop the datagram without a response.
    SilentDrop,
}

/// Resolves `context_name` for v3, or `community → context` for v1/v2c,
/// and enforces each context's ACL (§4.3).
pub struct ContextResolver {
    contexts: HashMap<String, Arc<Context>>,
    community_map: HashMap<String, String>,
    default_context: String,
}

impl ContextResolver {
    pub fn new(default_context: impl Into<String>) -> Self {
        Self {
            contexts: HashMap::new(),
            community_map: HashMap::new(),
            default_context: default_context.into(),
        }
    }

    pub fn register_context(&mut self, context: Context) {
        self.contexts.insert(context.name.clone(), Arc::new(context));
    }

    pub fn map_community(&mut self, community: impl Into<String>, context_name: impl Into<String>) {
        self.community_map.insert(community.into(), context_name.into());
    }

    /// §4.3: v3 uses the PDU's `contextName`; v1/v2c map community to a
    /// context, falling back to the default context for an unmapped community.
    pub fn resolve_context_name(&self, req: &RequestContext) -> String {
        match req.version {
            SnmpVersion::V3 => req.context_name.clone(),
            _ => req
                .community
                .as_deref()
                .and_then(|c| self.community_map.get(c))
                .cloned()
                .unwrap_or_else(|| self.default_context.clone()),
        }
    }

    pub fn get_context(&self, name: &str) -> Option<Arc<Context>> {
        self.contexts.get(name).cloned()
    }

    pub fn resolve(&self, req: &RequestContext) -> Result<Arc<Context>> {
        let name = self.resolve_context_name(req);
        self.get_context(&name)
            .ok_or_else(|| Error::store(format!("unknown context: {name}")))
    }

    /// §4.3 ACL enforcement: user not in `allowed_users` short-circuits with
    /// `authorizationError` (v3) or a silent drop (v1/v2c). An empty
    /// `allowed_users` list means "no restriction".
    pub fn authorize(&self, context: &Context, req: &RequestContext) -> AclOutcome {
        if context.allowed_users.is_empty() {
            return AclOutcome::Allowed;
        }
        let identity = match req.version {
            SnmpVersion::V3 => req.v3_security.as_ref().map(|s| s.user_name.as_str()),
            _ => req.community.as_deref(),
        };
        let allowed = identity
            .map(|id| context.allowed_users.iter().any(|u| u == id))
            .unwrap_or(false);
        if allowed {
            AclOutcome::Allowed
        } else if req.version == SnmpVersion::V3 {
            AclOutcome::AuthorizationError
        } else {
            AclOutcome::SilentDrop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_ctx;

    fn resolver_with(name: &str, allowed_users: Vec<String>) -> ContextResolver {
        let mut resolver = ContextResolver::new("default");
        let store = Arc::new(Store::new());
        resolver.register_context(Context::new(name, store, allowed_users, vec![]));
        resolver
    }

    #[test]
    fn v1v2c_resolves_via_community_map() {
        let mut resolver = resolver_with("lab", vec![]);
        resolver.map_community("public", "lab");
        let mut ctx = test_ctx();
        ctx.community = Some("public".into());
        assert_eq!(resolver.resolve_context_name(&ctx), "lab");
    }

    #[test]
    fn unmapped_community_falls_back_to_default() {
        let resolver = resolver_with("lab", vec![]);
        let mut ctx = test_ctx();
        ctx.community = Some("unknown".into());
        assert_eq!(resolver.resolve_context_name(&ctx), "default");
    }

    #[test]
    fn empty_allowed_users_permits_everyone() {
        let resolver = resolver_with("lab", vec![]);
        let context = resolver.get_context("lab").unwrap();
        let ctx = test_ctx();
        assert_eq!(resolver.authorize(&context, &ctx), AclOutcome::Allowed);
    }

    #[test]
    fn v1v2c_acl_denial_is_silent_drop() {
        let resolver = resolver_with("lab", vec!["trusted".into()]);
        let context = resolver.get_context("lab").unwrap();
        let mut ctx = test_ctx();
        ctx.community = Some("public".into());
        assert_eq!(resolver.authorize(&context, &ctx), AclOutcome::SilentDrop);
    }

    #[test]
    fn denied_oid_pattern_matches_prefix() {
        let store = Arc::new(Store::new());
        let context = Context::new(
            "lab",
            store,
            vec![],
            vec![Regex::new(r"^1\.3\.6\.1\.2\.1\.2\.").unwrap()],
        );
        assert!(context.is_oid_denied(&Oid::from_str("1.3.6.1.2.1.2.2.1.1.1").unwrap()));
        assert!(!context.is_oid_denied(&Oid::from_str("1.3.6.1.2.1.1.1.0").unwrap()));
    }

    #[test]
    fn overlay_takes_precedence_before_store() {
        let store = Arc::new(Store::new());
        let context = Context::new("lab", store, vec![], vec![]);
        let oid = Oid::from_str("1.3.6.1.2.1.2.2.1.8.1").unwrap();
        assert!(context.overlay_get(&oid).is_none());
        context.apply_overlay([(oid.clone(), AsnValue::Integer32(2))]);
        assert_eq!(context.overlay_get(&oid), Some(AsnValue::Integer32(2)));
        context.clear_overlay(&oid);
        assert!(context.overlay_get(&oid).is_none());
    }
}
