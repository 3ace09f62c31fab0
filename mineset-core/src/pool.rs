use mineset_remote::MiningConnection;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use uuid::Uuid;

struct PoolEntry {
    /// Distinguishes successive connections of the same miner
    generation: u64,
    connection: Arc<dyn MiningConnection>,
}

/// Live connections by miner id, at most one per miner.
///
/// Removal hands the connection to exactly one caller, who is then the only one
/// allowed to close it.
#[derive(Default)]
pub struct ConnectionPool {
    entries: Mutex<HashMap<Uuid, PoolEntry>>,
    next_generation: AtomicU64,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the miner already has a connection, in which case the
    /// rejected connection is handed back
    pub(crate) fn insert(
        &self,
        id: Uuid,
        connection: Arc<dyn MiningConnection>,
    ) -> Result<u64, Arc<dyn MiningConnection>> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return Err(connection);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        entries.insert(id, PoolEntry { generation, connection });
        Ok(generation)
    }

    pub(crate) fn take(&self, id: Uuid) -> Option<Arc<dyn MiningConnection>> {
        self.entries.lock().remove(&id).map(|entry| entry.connection)
    }

    /// Remove only if the entry is still the one inserted with `generation`
    pub(crate) fn take_if_generation(&self, id: Uuid, generation: u64) -> Option<Arc<dyn MiningConnection>> {
        let mut entries = self.entries.lock();
        match entries.get(&id) {
            Some(entry) if entry.generation == generation => entries.remove(&id).map(|entry| entry.connection),
            _ => None,
        }
    }

    /// Remove only if the entry still holds `connection`
    pub(crate) fn take_if_same(
        &self,
        id: Uuid,
        connection: &Arc<dyn MiningConnection>,
    ) -> Option<Arc<dyn MiningConnection>> {
        let mut entries = self.entries.lock();
        match entries.get(&id) {
            Some(entry) if same_connection(&entry.connection, connection) => {
                entries.remove(&id).map(|entry| entry.connection)
            }
            _ => None,
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.entries.lock().keys().copied().collect()
    }

    pub fn connections(&self) -> Vec<(Uuid, Arc<dyn MiningConnection>)> {
        self.entries
            .lock()
            .iter()
            .map(|(id, entry)| (*id, entry.connection.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn same_connection(a: &Arc<dyn MiningConnection>, b: &Arc<dyn MiningConnection>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mineset_remote::{CloseCallback, Result};
    use num_bigint::BigUint;
    use std::time::Duration;

    struct Dummy;

    #[async_trait]
    impl MiningConnection for Dummy {
        async fn get_balance(&self, _: &str, _: &str, _: Duration) -> Result<Option<BigUint>> {
            Ok(None)
        }
        async fn close(&self) {}
        fn on_close(&self, _callback: CloseCallback) {}
        fn is_closed(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_single_connection_per_miner() {
        let pool = ConnectionPool::new();
        let id = Uuid::new_v4();

        assert!(pool.insert(id, Arc::new(Dummy)).is_ok());
        assert!(pool.insert(id, Arc::new(Dummy)).is_err());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_stale_generation_does_not_remove_newer_entry() {
        let pool = ConnectionPool::new();
        let id = Uuid::new_v4();

        let old = pool.insert(id, Arc::new(Dummy)).ok().unwrap();
        assert!(pool.take(id).is_some());
        let new = pool.insert(id, Arc::new(Dummy)).ok().unwrap();

        assert!(pool.take_if_generation(id, old).is_none());
        assert!(pool.contains(id));
        assert!(pool.take_if_generation(id, new).is_some());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_take_if_same_ignores_replacement() {
        let pool = ConnectionPool::new();
        let id = Uuid::new_v4();
        let first: Arc<dyn MiningConnection> = Arc::new(Dummy);
        pool.insert(id, first.clone()).ok().unwrap();
        pool.take(id);
        pool.insert(id, Arc::new(Dummy)).ok().unwrap();

        assert!(pool.take_if_same(id, &first).is_none());
        assert!(pool.contains(id));
    }

    #[test]
    fn test_take_hands_out_once() {
        let pool = ConnectionPool::new();
        let id = Uuid::new_v4();
        pool.insert(id, Arc::new(Dummy)).ok().unwrap();

        assert!(pool.take(id).is_some());
        assert!(pool.take(id).is_none());
    }
}
