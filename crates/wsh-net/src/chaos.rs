//! Fault injection and a backend wrapper that applies it transparently
//! to any other [`Backend`].

use crate::backend::Backend;
use crate::error::NetResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Duration;
use wsh_core::Rng;
use wsh_stream::{DatagramSocket, Listener, StreamSocket};

/// Fault-injection knobs for one scope (or the global default).
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Probability in `[0, 1]` that a connect or datagram send is dropped.
    pub drop_rate: f64,
    /// Probability in `[0, 1]` that a connect is refused as a disconnect.
    pub disconnect_rate: f64,
    /// Artificial latency applied before delegating, in milliseconds.
    pub latency_ms: u64,
    /// `host:port` targets that are always partitioned (connect refused).
    pub partition_targets: HashSet<String>,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            disconnect_rate: 0.0,
            latency_ms: 0,
            partition_targets: HashSet::new(),
        }
    }
}

/// Decides, via a configurable (and optionally seeded) RNG, whether an
/// operation should be dropped, disconnected, delayed, or partitioned.
/// A disabled engine (default config, no scopes) always yields neutral
/// answers.
pub struct ChaosEngine {
    rng: Arc<dyn Rng>,
    global: parking_lot::RwLock<ChaosConfig>,
    scoped: DashMap<u64, ChaosConfig>,
}

impl ChaosEngine {
    /// Creates a disabled engine backed by `rng`.
    pub fn new(rng: Arc<dyn Rng>) -> Self {
        Self {
            rng,
            global: parking_lot::RwLock::new(ChaosConfig::default()),
            scoped: DashMap::new(),
        }
    }

    /// Replaces the global configuration.
    pub fn configure(&self, config: ChaosConfig) {
        *self.global.write() = config;
    }

    /// Replaces the configuration for one scope.
    pub fn configure_scope(&self, scope_id: u64, config: ChaosConfig) {
        self.scoped.insert(scope_id, config);
    }

    fn config_for(&self, scope_id: Option<u64>) -> ChaosConfig {
        if let Some(id) = scope_id {
            if let Some(cfg) = self.scoped.get(&id) {
                return cfg.clone();
            }
        }
        self.global.read().clone()
    }

    /// `true` if this call should be dropped, per `drop_rate`.
    pub fn should_drop(&self, scope_id: Option<u64>) -> bool {
        let cfg = self.config_for(scope_id);
        cfg.drop_rate > 0.0 && self.rng.next_f64() < cfg.drop_rate
    }

    /// `true` if this call should be disconnected, per `disconnect_rate`.
    pub fn should_disconnect(&self, scope_id: Option<u64>) -> bool {
        let cfg = self.config_for(scope_id);
        cfg.disconnect_rate > 0.0 && self.rng.next_f64() < cfg.disconnect_rate
    }

    /// `true` if `addr` (`host:port`) is a configured partition target.
    pub fn is_partitioned(&self, addr: &str, scope_id: Option<u64>) -> bool {
        self.config_for(scope_id).partition_targets.contains(addr)
    }

    /// Sleeps for the configured latency, if any.
    pub async fn maybe_delay(&self, scope_id: Option<u64>) {
        let ms = self.config_for(scope_id).latency_ms;
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl std::fmt::Debug for ChaosEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosEngine")
            .field("scoped_count", &self.scoped.len())
            .finish()
    }
}

/// Wraps any [`Backend`], routing `connect` and `send_datagram` through a
/// [`ChaosEngine`] before delegating. `listen`, `bind_datagram`, `resolve`
/// and `close` pass through untouched.
pub struct ChaosBackendWrapper {
    inner: Arc<dyn Backend>,
    chaos: Arc<ChaosEngine>,
    scope_id: Option<u64>,
}

impl ChaosBackendWrapper {
    /// Wraps `inner`, applying `chaos`'s global config unless `scope_id` is
    /// set, in which case that scope's config (if any) is used.
    pub fn new(inner: Arc<dyn Backend>, chaos: Arc<ChaosEngine>, scope_id: Option<u64>) -> Self {
        Self {
            inner,
            chaos,
            scope_id,
        }
    }
}

#[async_trait]
impl Backend for ChaosBackendWrapper {
    async fn connect(&self, host: &str, port: u16) -> NetResult<StreamSocket> {
        let addr = format!("{host}:{port}");
        if self.chaos.is_partitioned(&addr, self.scope_id) {
            return Err(crate::error::NetError::ConnRefused(format!("{addr} is partitioned")));
        }
        self.chaos.maybe_delay(self.scope_id).await;
        if self.chaos.should_drop(self.scope_id) {
            return Err(crate::error::NetError::ConnRefused(format!("{addr} dropped by chaos")));
        }
        self.inner.connect(host, port).await
    }

    async fn listen(&self, port: u16) -> NetResult<Listener> {
        self.inner.listen(port).await
    }

    async fn send_datagram(&self, host: &str, port: u16, data: &[u8]) -> NetResult<()> {
        if self.chaos.should_drop(self.scope_id) {
            return Ok(());
        }
        self.chaos.maybe_delay(self.scope_id).await;
        self.inner.send_datagram(host, port, data).await
    }

    async fn bind_datagram(&self, port: u16) -> NetResult<DatagramSocket> {
        self.inner.bind_datagram(port).await
    }

    async fn resolve(&self, name: &str) -> NetResult<Vec<String>> {
        self.inner.resolve(name).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

impl std::fmt::Debug for ChaosBackendWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosBackendWrapper")
            .field("scope_id", &self.scope_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackBackend;
    use wsh_core::rng::seeded;

    #[test]
    fn disabled_engine_is_neutral() {
        let engine = ChaosEngine::new(Arc::new(seeded(1)));
        assert!(!engine.should_drop(None));
        assert!(!engine.should_disconnect(None));
        assert!(!engine.is_partitioned("host:1", None));
    }

    #[test]
    fn seeded_drop_sequence_is_reproducible() {
        let engine_a = ChaosEngine::new(Arc::new(seeded(999)));
        engine_a.configure(ChaosConfig {
            drop_rate: 0.5,
            ..ChaosConfig::default()
        });
        let engine_b = ChaosEngine::new(Arc::new(seeded(999)));
        engine_b.configure(ChaosConfig {
            drop_rate: 0.5,
            ..ChaosConfig::default()
        });
        let seq_a: Vec<bool> = (0..10).map(|_| engine_a.should_drop(None)).collect();
        let seq_b: Vec<bool> = (0..10).map(|_| engine_b.should_drop(None)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[tokio::test]
    async fn partitioned_target_refuses_connect() {
        let loopback = Arc::new(LoopbackBackend::new());
        loopback.listen(7000).await.unwrap();
        let engine = Arc::new(ChaosEngine::new(Arc::new(seeded(1))));
        engine.configure(ChaosConfig {
            partition_targets: ["localhost:7000".to_string()].into_iter().collect(),
            ..ChaosConfig::default()
        });
        let wrapped = ChaosBackendWrapper::new(loopback, engine, None);
        let err = wrapped.connect("localhost", 7000).await.unwrap_err();
        assert_eq!(err.code(), "ECONNREFUSED");
    }
}
