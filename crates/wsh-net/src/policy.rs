//! Scope-to-capability policy engine.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wsh_core::{Cap, CapabilitySet};

/// The outcome of a policy callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// A policy callback: given the capability and optional address being
/// checked, returns an authoritative allow/deny decision.
pub type PolicyCallback = Arc<dyn Fn(Cap, Option<&str>) -> Decision + Send + Sync>;

struct Scope {
    capabilities: CapabilitySet,
    callback: Option<PolicyCallback>,
}

/// An opaque scope identifier, monotonic per engine.
pub type ScopeId = u64;

/// Binds capability tags (and an optional override callback) to scope ids,
/// and answers capability checks against them.
#[derive(Default)]
pub struct PolicyEngine {
    scopes: DashMap<ScopeId, Scope>,
    next_id: AtomicU64,
}

impl PolicyEngine {
    /// Creates a new, empty engine.
    pub fn new() -> Self {
        Self {
            scopes: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a scope with the given capabilities and optional callback,
    /// returning its id.
    pub fn create_scope(&self, capabilities: CapabilitySet, callback: Option<PolicyCallback>) -> ScopeId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.scopes.insert(id, Scope { capabilities, callback });
        id
    }

    /// Removes a scope. Further checks against it deny.
    pub fn remove_scope(&self, scope_id: ScopeId) {
        self.scopes.remove(&scope_id);
    }

    /// Checks whether `capability` is permitted for `scope_id`, optionally
    /// scoped to `address`.
    ///
    /// 1. Unknown scope denies.
    /// 2. A callback, if set, is authoritative.
    /// 3. Otherwise: `Cap::All` in the scope's set allows everything; an
    ///    exact match allows; anything else denies.
    pub fn check(&self, scope_id: ScopeId, capability: Cap, address: Option<&str>) -> bool {
        let scope = match self.scopes.get(&scope_id) {
            Some(s) => s,
            None => return false,
        };
        if let Some(cb) = &scope.callback {
            return cb(capability, address) == Decision::Allow;
        }
        scope.capabilities.has(capability)
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("scope_count", &self.scopes.len())
            .finish()
    }
}
