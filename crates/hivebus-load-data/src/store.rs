/// Replicated load-view store abstraction
/// A typed key->value view of cluster telemetry. The in-memory implementation
/// backs tests and single-process deployments; replicated backends implement
/// the same trait over their transport.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("load data store unavailable: {0}")]
    Unavailable(String),
}

/// Change listener invoked with the key and the freshly pushed value
pub type Listener<T> = Box<dyn Fn(&str, &T) + Send + Sync>;

/// Key->value store of load telemetry
///
/// `push` replaces the existing value wholesale; the store never merges.
/// `for_each` visits a consistent (possibly slightly stale) snapshot: entries
/// added mid-iteration are not visited and no entry is visited twice.
/// Listeners observe changes per key in arrival order; cross-key ordering is
/// unspecified. Every operation fails with [`StoreError::Unavailable`] once
/// the store is closed or its backing transport is down.
#[async_trait]
pub trait LoadDataStore<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    fn push(&self, key: &str, value: T) -> Result<(), StoreError>;

    async fn push_async(&self, key: &str, value: T) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<T>, StoreError>;

    async fn get_async(&self, key: &str) -> Result<Option<T>, StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn remove_async(&self, key: &str) -> Result<(), StoreError>;

    fn for_each(&self, visit: &mut dyn FnMut(&str, &T)) -> Result<(), StoreError>;

    /// Register a change listener; lives as long as the store
    fn listen(&self, listener: Listener<T>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the store; subsequent operations fail with `Unavailable`
    fn close(&self);
}

/// In-process store backed by a concurrent map
pub struct InMemoryLoadStore<T> {
    entries: DashMap<String, T>,
    listeners: RwLock<Vec<Listener<T>>>,
    closed: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> InMemoryLoadStore<T> {
    pub fn new() -> Self {
        InMemoryLoadStore {
            entries: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store is closed".to_string()));
        }
        Ok(())
    }

    fn notify(&self, key: &str, value: &T) {
        for listener in self.listeners.read().iter() {
            listener(key, value);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for InMemoryLoadStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> LoadDataStore<T> for InMemoryLoadStore<T> {
    fn push(&self, key: &str, value: T) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.entries.insert(key.to_string(), value.clone());
        self.notify(key, &value);
        Ok(())
    }

    async fn push_async(&self, key: &str, value: T) -> Result<(), StoreError> {
        self.push(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.ensure_open()?;
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn get_async(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn remove_async(&self, key: &str) -> Result<(), StoreError> {
        self.remove(key)
    }

    fn for_each(&self, visit: &mut dyn FnMut(&str, &T)) -> Result<(), StoreError> {
        self.ensure_open()?;
        // Snapshot first so mutation during the walk cannot be observed
        let snapshot: Vec<(String, T)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (key, value) in &snapshot {
            visit(key, value);
        }
        Ok(())
    }

    fn listen(&self, listener: Listener<T>) {
        self.listeners.write().push(listener);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_push_replaces_existing_value() {
        let store = InMemoryLoadStore::new();
        store.push("broker-1", 1u64).unwrap();
        store.push("broker-1", 2u64).unwrap();
        assert_eq!(store.get("broker-1").unwrap(), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_and_missing_get() {
        let store = InMemoryLoadStore::new();
        store.push("broker-1", 7u64).unwrap();
        store.remove("broker-1").unwrap();
        assert_eq!(store.get("broker-1").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_for_each_iterates_a_snapshot() {
        let store = Arc::new(InMemoryLoadStore::new());
        store.push("a", 1u64).unwrap();
        store.push("b", 2u64).unwrap();

        let inner = Arc::clone(&store);
        let mut seen = Vec::new();
        store
            .for_each(&mut |key, value| {
                // Entries pushed mid-iteration must not be visited
                inner.push("c", 3u64).unwrap();
                seen.push((key.to_string(), *value));
            })
            .unwrap();

        seen.sort();
        assert_eq!(seen, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_listener_sees_pushes_in_arrival_order() {
        let store = InMemoryLoadStore::new();
        let events: Arc<Mutex<Vec<(String, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.listen(Box::new(move |key, value| {
            sink.lock().push((key.to_string(), *value));
        }));

        store.push("broker-1", 1u64).unwrap();
        store.push("broker-1", 2u64).unwrap();
        store.push("broker-2", 9u64).unwrap();

        let seen = events.lock();
        assert_eq!(
            *seen,
            vec![
                ("broker-1".to_string(), 1),
                ("broker-1".to_string(), 2),
                ("broker-2".to_string(), 9),
            ]
        );
    }

    #[test]
    fn test_closed_store_fails_every_operation() {
        let store = InMemoryLoadStore::new();
        store.push("broker-1", 1u64).unwrap();
        store.close();

        assert!(matches!(
            store.push("broker-1", 2u64),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get("broker-1").is_err());
        assert!(store.remove("broker-1").is_err());
        assert!(store.for_each(&mut |_, _| {}).is_err());
    }

    #[tokio::test]
    async fn test_async_variants_mirror_sync_behavior() {
        let store = InMemoryLoadStore::new();
        store.push_async("broker-1", 5u64).await.unwrap();
        assert_eq!(store.get_async("broker-1").await.unwrap(), Some(5));
        store.remove_async("broker-1").await.unwrap();
        assert_eq!(store.get_async("broker-1").await.unwrap(), None);
    }
}
