// warden-core/src/application/cancellation.rs

// Cooperative cancellation. Executions check their tokens between steps
// (translate -> execute -> classify); nothing is interrupted mid-query.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct Registry {
    tokens: HashMap<String, CancellationToken>,
    disabled: HashSet<String>,
}

/// One token per data source. Disabling a source cancels everything in flight against it.
#[derive(Default, Clone)]
pub struct SourceCancellation {
    inner: Arc<Mutex<Registry>>,
}

impl SourceCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hold for an execution that starts now. Already cancelled if the source is disabled.
    pub fn token(&self, source_id: &str) -> CancellationToken {
        let Ok(mut reg) = self.inner.lock() else {
            // Poisoned registry: refuse to run.
            let token = CancellationToken::new();
            token.cancel();
            return token;
        };
        if reg.disabled.contains(source_id) {
            let token = CancellationToken::new();
            token.cancel();
            return token;
        }
        reg.tokens.entry(source_id.to_string()).or_default().clone()
    }

    pub fn disable(&self, source_id: &str) {
        if let Ok(mut reg) = self.inner.lock() {
            reg.disabled.insert(source_id.to_string());
            if let Some(token) = reg.tokens.remove(source_id) {
                token.cancel();
            }
            info!(source = %source_id, "Data source disabled, in-flight executions cancelled");
        }
    }

    pub fn enable(&self, source_id: &str) {
        if let Ok(mut reg) = self.inner.lock() {
            reg.disabled.remove(source_id);
        }
    }

    pub fn is_disabled(&self, source_id: &str) -> bool {
        self.inner
            .lock()
            .map(|reg| reg.disabled.contains(source_id))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_cancels_outstanding_tokens() {
        let registry = SourceCancellation::new();
        let in_flight = registry.token("wh");
        let other = registry.token("crm");

        registry.disable("wh");
        assert!(in_flight.is_cancelled());
        assert!(!other.is_cancelled());
        assert!(registry.token("wh").is_cancelled());

        registry.enable("wh");
        assert!(!registry.token("wh").is_cancelled());
        assert!(!registry.is_disabled("wh"));
    }
}
