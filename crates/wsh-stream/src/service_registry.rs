//! Named service registry with lookup-miss hooks.

use crate::error::{StreamError, StreamResult};
use crate::socket::StreamSocket;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What a registered service does with a freshly paired connection.
pub enum ServiceListener {
    /// Takes ownership of one socket end directly (preferred when both
    /// variants are available on an entry).
    HandleConnection(Arc<dyn Fn(StreamSocket) + Send + Sync>),
    /// Accepts connections through a bounded queue, mirroring `Listener`.
    Enqueue(Arc<dyn Fn(StreamSocket) + Send + Sync>),
}

/// A registered service's listener plus bookkeeping metadata.
pub struct ServiceEntry {
    pub listener: ServiceListener,
    pub metadata: serde_json::Value,
    pub owner: Option<String>,
}

type LookupMissHook = dyn Fn(&str) -> Option<Arc<ServiceEntry>> + Send + Sync;
type RegisterHook = dyn Fn(&str) + Send + Sync;

/// A named directory of service listeners, consulted by `svc://` addresses.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: DashMap<String, Arc<ServiceEntry>>,
    miss_hooks: Mutex<Vec<Box<LookupMissHook>>>,
    on_register: Mutex<Vec<Box<RegisterHook>>>,
    on_unregister: Mutex<Vec<Box<RegisterHook>>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`. Fails with `EALREADY` on a duplicate name.
    pub fn register(
        &self,
        name: &str,
        listener: ServiceListener,
        metadata: serde_json::Value,
        owner: Option<String>,
    ) -> StreamResult<()> {
        let entry = Arc::new(ServiceEntry {
            listener,
            metadata,
            owner,
        });
        match self.entries.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StreamError::Already(format!("service '{name}' already registered")))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(entry);
            }
        }
        for hook in self.on_register.lock().iter() {
            let _ = catch_unwind(AssertUnwindSafe(|| hook(name)));
        }
        Ok(())
    }

    /// Removes `name`. Fails with `ENOTFOUND` if it was never registered.
    pub fn unregister(&self, name: &str) -> StreamResult<()> {
        if self.entries.remove(name).is_none() {
            return Err(StreamError::NotFound(format!("service '{name}' not found")));
        }
        for hook in self.on_unregister.lock().iter() {
            let _ = catch_unwind(AssertUnwindSafe(|| hook(name)));
        }
        Ok(())
    }

    /// Looks up `name`. On a miss, tries each registered lookup-miss hook in
    /// order and returns the first non-`None` result.
    pub fn lookup(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        if let Some(entry) = self.entries.get(name) {
            return Some(entry.clone());
        }
        for hook in self.miss_hooks.lock().iter() {
            if let Ok(Some(entry)) = catch_unwind(AssertUnwindSafe(|| hook(name))) {
                return Some(entry);
            }
        }
        None
    }

    /// Registers a lookup-miss hook, consulted in registration order.
    pub fn on_lookup_miss(&self, hook: impl Fn(&str) -> Option<Arc<ServiceEntry>> + Send + Sync + 'static) {
        self.miss_hooks.lock().push(Box::new(hook));
    }

    /// Registers a callback fired after a successful `register`.
    pub fn on_register(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.on_register.lock().push(Box::new(hook));
    }

    /// Registers a callback fired after a successful `unregister`.
    pub fn on_unregister(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.on_unregister.lock().push(Box::new(hook));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_register_fails_already() {
        let registry = ServiceRegistry::new();
        registry
            .register("echo", ServiceListener::Enqueue(Arc::new(|_| {})), serde_json::Value::Null, None)
            .unwrap();
        let err = registry
            .register("echo", ServiceListener::Enqueue(Arc::new(|_| {})), serde_json::Value::Null, None)
            .unwrap_err();
        assert_eq!(err.code(), "EALREADY");
    }

    #[test]
    fn unregister_missing_fails_not_found() {
        let registry = ServiceRegistry::new();
        let err = registry.unregister("nope").unwrap_err();
        assert_eq!(err.code(), "ENOTFOUND");
    }

    #[test]
    fn lookup_miss_falls_back_to_first_non_null_hook() {
        let registry = ServiceRegistry::new();
        registry.on_lookup_miss(|name| if name == "a" { None } else { None });
        registry.on_lookup_miss(|name| {
            if name == "dynamic" {
                Some(Arc::new(ServiceEntry {
                    listener: ServiceListener::Enqueue(Arc::new(|_| {})),
                    metadata: serde_json::Value::Null,
                    owner: None,
                }))
            } else {
                None
            }
        });
        assert!(registry.lookup("dynamic").is_some());
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn panicking_hook_is_swallowed() {
        let registry = ServiceRegistry::new();
        registry.on_register(|_name| panic!("boom"));
        let result = registry.register("svc", ServiceListener::Enqueue(Arc::new(|_| {})), serde_json::Value::Null, None);
        assert!(result.is_ok());
    }
}
