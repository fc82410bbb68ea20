//! Named signals (TERM, INT, HUP, ...) with a revocable abort token per
//! name and a composite shutdown signal.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// A revocable cancellation token for one signal name. `fire` wakes every
/// waiter exactly once; `reset` discards the token so a fresh one can be
/// obtained by the next call to [`SignalController::abort_signal`].
#[derive(Debug, Default)]
pub struct AbortSignal {
    notify: Notify,
    fired: std::sync::atomic::AtomicBool,
}

impl AbortSignal {
    fn fire(&self) {
        if !self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// `true` once this token's signal has fired.
    pub fn is_aborted(&self) -> bool {
        self.fired.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Suspends until this token's signal fires.
    pub async fn aborted(&self) {
        if self.is_aborted() {
            return;
        }
        self.notify.notified().await;
    }
}

type Listener = Box<dyn Fn() + Send + Sync>;

/// Controls a fixed set of named signals for one tenant (or the kernel).
#[derive(Default)]
pub struct SignalController {
    fired: DashMap<String, bool>,
    listeners: DashMap<String, Mutex<Vec<Listener>>>,
    tokens: DashMap<String, Arc<AbortSignal>>,
}

impl std::fmt::Debug for SignalController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalController")
            .field("fired", &self.fired)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl SignalController {
    /// Creates a controller with no signals fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener invoked every time `name` fires.
    pub fn on_signal(&self, name: &str, listener: impl Fn() + Send + Sync + 'static) {
        self.listeners
            .entry(name.to_string())
            .or_default()
            .lock()
            .push(Box::new(listener));
    }

    /// Fires `name`: marks it fired, runs listeners, and aborts its token.
    pub fn signal(&self, name: &str) {
        self.fired.insert(name.to_string(), true);
        if let Some(listeners) = self.listeners.get(name) {
            for listener in listeners.lock().iter() {
                listener();
            }
        }
        if let Some(token) = self.tokens.get(name) {
            token.fire();
        }
    }

    /// `true` if `name` has fired and has not since been reset.
    pub fn has_fired(&self, name: &str) -> bool {
        self.fired.get(name).map(|v| *v).unwrap_or(false)
    }

    /// Clears the fired flag for `name` and discards its abort token.
    pub fn reset(&self, name: &str) {
        self.fired.remove(name);
        self.tokens.remove(name);
    }

    /// Returns the (lazily created) abort token for `name`.
    pub fn abort_signal(&self, name: &str) -> Arc<AbortSignal> {
        self.tokens
            .entry(name.to_string())
            .or_insert_with(|| {
                let token = Arc::new(AbortSignal::default());
                if self.has_fired(name) {
                    token.fire();
                }
                token
            })
            .clone()
    }

    /// A composite token aborted by firing either `TERM` or `INT`.
    pub fn shutdown_signal(&self) -> Arc<AbortSignal> {
        let composite = Arc::new(AbortSignal::default());
        for name in ["TERM", "INT"] {
            if self.has_fired(name) {
                composite.fire();
            }
        }
        let term = self.abort_signal("TERM");
        let int = self.abort_signal("INT");
        let c1 = composite.clone();
        let c2 = composite.clone();
        tokio::spawn(async move {
            term.aborted().await;
            c1.fire();
        });
        tokio::spawn(async move {
            int.aborted().await;
            c2.fire();
        });
        composite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn signal_fires_listeners_and_marks_fired() {
        let ctrl = SignalController::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        ctrl.on_signal("TERM", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!ctrl.has_fired("TERM"));
        ctrl.signal("TERM");
        assert!(ctrl.has_fired("TERM"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_signal_wakes_waiters() {
        let ctrl = SignalController::new();
        let token = ctrl.abort_signal("HUP");
        let waited = tokio::spawn({
            let token = token.clone();
            async move {
                token.aborted().await;
            }
        });
        tokio::task::yield_now().await;
        ctrl.signal("HUP");
        waited.await.unwrap();
        assert!(token.is_aborted());
    }

    #[test]
    fn reset_discards_abort_token() {
        let ctrl = SignalController::new();
        let token1 = ctrl.abort_signal("TERM");
        ctrl.signal("TERM");
        assert!(token1.is_aborted());
        ctrl.reset("TERM");
        let token2 = ctrl.abort_signal("TERM");
        assert!(!token2.is_aborted());
    }

    #[tokio::test]
    async fn shutdown_signal_fires_on_either_term_or_int() {
        let ctrl = SignalController::new();
        let shutdown = ctrl.shutdown_signal();
        ctrl.signal("INT");
        tokio::time::timeout(std::time::Duration::from_millis(200), shutdown.aborted())
            .await
            .expect("shutdown signal should fire on INT");
    }
}
