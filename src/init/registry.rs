use super::{InitAssembler, InitId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Session-scoped store of init assemblers.
///
/// Whichever stream names an init first creates its assembler; every later
/// lookup observes the same instance. Entries live as long as the session.
#[derive(Debug, Default)]
pub struct InitRegistry {
    assemblers: DashMap<InitId, Arc<InitAssembler>>,
    closed: AtomicBool,
}

impl InitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the assembler for `id`, creating it if absent.
    pub fn get_or_create(&self, id: InitId) -> Arc<InitAssembler> {
        let assembler = self
            .assemblers
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(init_id = %id, "Created init assembler");
                Arc::new(InitAssembler::new(id))
            })
            .clone();

        // Late lookups after close must not hang their callers.
        if self.closed.load(Ordering::SeqCst) {
            assembler.cancel();
        }

        assembler
    }

    pub fn get(&self, id: InitId) -> Option<Arc<InitAssembler>> {
        self.assemblers.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.assemblers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assemblers.is_empty()
    }

    /// Cancel every unresolved assembler.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let assemblers: Vec<_> = self
            .assemblers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for assembler in assemblers {
            assembler.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = InitRegistry::new();
        let a = registry.get_or_create(InitId(1));
        let b = registry.get_or_create(InitId(1));
        let c = registry.get_or_create(InitId(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_close_cancels_pending_and_late_lookups() {
        let registry = InitRegistry::new();
        let pending = registry.get_or_create(InitId(1));

        registry.close();
        assert!(matches!(pending.ready().await, Err(Error::Cancelled)));

        let late = registry.get_or_create(InitId(7));
        assert!(matches!(late.ready().await, Err(Error::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_reference() {
        let registry = Arc::new(InitRegistry::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(InitId(3)) })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }

        assert_eq!(registry.len(), 1);
        assert!(seen.iter().all(|a| Arc::ptr_eq(a, &seen[0])));
    }
}
