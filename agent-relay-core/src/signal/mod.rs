//! Stop-signal store
//!
//! A shared key-value store used to publish and observe cancellation
//! requests keyed by conversation identity. Signals carry a bounded TTL
//! so that a stop nobody listens for eventually disappears, and reading a
//! signal never clears it.

mod memory;
mod redis_store;

pub use memory::MemorySignalStore;
pub use redis_store::RedisSignalStore;

use crate::config::{SignalBackend, SignalConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Store for out-of-band stop requests
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Record a stop request for a conversation (idempotent)
    async fn set_stop(&self, chat_id: &str) -> crate::Result<()>;

    /// Whether a stop request is pending; does not consume it
    async fn check_stop(&self, chat_id: &str) -> crate::Result<bool>;

    /// Remove a pending stop request, if any
    async fn clear_stop(&self, chat_id: &str) -> crate::Result<()>;

    /// Whether the store is reachable
    async fn ping(&self) -> bool;

    /// Short backend name for health reports and logs
    fn backend_name(&self) -> &'static str;
}

/// Build the signal store selected by configuration.
///
/// Redis connections are opened lazily, so an unreachable server does not
/// prevent startup; operations fail until it becomes reachable.
pub fn build_signal_store(config: &SignalConfig) -> crate::Result<Arc<dyn SignalStore>> {
    match config.backend {
        SignalBackend::Redis => Ok(Arc::new(RedisSignalStore::new(config)?)),
        SignalBackend::Memory => Ok(Arc::new(MemorySignalStore::new(config.ttl()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_memory_store() {
        let config = SignalConfig {
            backend: SignalBackend::Memory,
            ..SignalConfig::default()
        };
        let store = build_signal_store(&config).unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert!(store.ping().await);
    }

    #[test]
    fn test_build_redis_store_is_lazy() {
        // Nothing listens here; construction must still succeed.
        let config = SignalConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..SignalConfig::default()
        };
        let store = build_signal_store(&config).unwrap();
        assert_eq!(store.backend_name(), "redis");
    }
}
