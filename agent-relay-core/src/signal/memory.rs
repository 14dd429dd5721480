//! In-process signal store

use super::SignalStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Signal store backed by a process-local map.
///
/// Only visible inside this process; useful for tests and single-instance
/// development. Entries expire after the configured TTL like Redis keys do.
#[derive(Debug)]
pub struct MemorySignalStore {
    ttl: Duration,
    signals: Mutex<HashMap<String, Instant>>,
}

impl MemorySignalStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            signals: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) signals
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.signals
            .lock()
            .values()
            .filter(|expires| **expires > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySignalStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn set_stop(&self, chat_id: &str) -> crate::Result<()> {
        let now = Instant::now();
        let mut signals = self.signals.lock();
        // Signals nobody checked again would otherwise pile up
        signals.retain(|_, expires| *expires > now);
        signals.insert(chat_id.to_string(), now + self.ttl);
        Ok(())
    }

    async fn check_stop(&self, chat_id: &str) -> crate::Result<bool> {
        let mut signals = self.signals.lock();
        match signals.get(chat_id) {
            Some(expires) if *expires > Instant::now() => Ok(true),
            Some(_) => {
                signals.remove(chat_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn clear_stop(&self, chat_id: &str) -> crate::Result<()> {
        self.signals.lock().remove(chat_id);
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
