use arc_swap::ArcSwap;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{CoreError, Result},
    model::{now_millis, Miner, MinerStatus},
    record::{parse_record, MinerRecord},
    store::RegistryStore,
};

/// What to do with a persisted record that cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Log and skip it, keeping every other miner
    #[default]
    SkipMalformed,

    /// Abort the whole load
    Strict,
}

/// Change notifications published after a committed mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(Uuid),
    Removed(Uuid),
    PlotReady(Uuid),
    Switched { id: Uuid, on: bool },
    BalanceUpdated { id: Uuid, balance: BigUint },
    Reloaded { count: usize },
}

/// A miner and its status
#[derive(Debug, Clone)]
pub struct MinerEntry {
    pub miner: Miner,
    pub status: MinerStatus,
}

/// Immutable point-in-time view, sorted by the miner ordering
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    entries: Vec<MinerEntry>,
}

impl RegistrySnapshot {
    fn from_map(map: &HashMap<Uuid, MinerEntry>) -> Self {
        let mut entries: Vec<MinerEntry> = map.values().cloned().collect();
        entries.sort_by(|a, b| a.miner.cmp(&b.miner));
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MinerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&MinerEntry> {
        self.entries.iter().find(|entry| entry.miner.id() == id)
    }

    /// Entries that should hold a live connection
    pub fn desired(&self) -> impl Iterator<Item = &MinerEntry> {
        self.entries.iter().filter(|entry| entry.status.is_desired())
    }

    pub fn is_desired(&self, id: Uuid) -> bool {
        self.get(id).map_or(false, |entry| entry.status.is_desired())
    }
}

/// Authoritative map of miners, persisted after every observable change.
///
/// Mutations are serialized by an async writer lock held across the store write, so
/// each write reflects the whole registry at the moment of its mutation. Readers go
/// through a published snapshot and never wait for writers.
pub struct MinerRegistry {
    store: Arc<dyn RegistryStore>,
    load_policy: LoadPolicy,
    entries: Mutex<HashMap<Uuid, MinerEntry>>,
    published: ArcSwap<RegistrySnapshot>,
    events: broadcast::Sender<RegistryEvent>,
}

impl MinerRegistry {
    pub fn new(store: Arc<dyn RegistryStore>, load_policy: LoadPolicy) -> Self {
        let (events, _) = broadcast::channel(256);

        Self {
            store,
            load_policy,
            entries: Mutex::new(HashMap::new()),
            published: ArcSwap::from_pointee(RegistrySnapshot::default()),
            events,
        }
    }

    /// Replace the in-memory state with the content of the store
    pub async fn load(&self) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.publish(&entries);

        let values = self.store.read().await?;
        let mut loaded = HashMap::with_capacity(values.len());

        for (index, value) in values.into_iter().enumerate() {
            match parse_record(value) {
                Ok((miner, status)) => {
                    if loaded.contains_key(&miner.id()) {
                        warn!("Duplicate record for miner {}, keeping the last one", miner.id());
                    }
                    loaded.insert(miner.id(), MinerEntry { miner, status });
                }
                Err(reason) => match self.load_policy {
                    LoadPolicy::Strict => {
                        return Err(CoreError::MalformedRecord { index, reason });
                    }
                    LoadPolicy::SkipMalformed => {
                        warn!("Skipping malformed record #{}: {}", index, reason);
                    }
                },
            }
        }

        *entries = loaded;
        self.publish(&entries);

        let count = entries.len();
        info!("Loaded {} miners", count);
        let _ = self.events.send(RegistryEvent::Reloaded { count });
        Ok(count)
    }

    /// Insert or replace the entry of `miner`
    pub async fn add(&self, miner: Miner, status: MinerStatus) -> Result<()> {
        let id = miner.id();
        let mut entries = self.entries.lock().await;
        entries.insert(id, MinerEntry { miner, status });

        self.commit(&entries).await?;
        info!("Added miner {}", id);
        let _ = self.events.send(RegistryEvent::Added(id));
        Ok(())
    }

    pub async fn remove(&self, id: Uuid) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if entries.remove(&id).is_none() {
            return Ok(false);
        }

        self.commit(&entries).await?;
        info!("Removed miner {}", id);
        let _ = self.events.send(RegistryEvent::Removed(id));
        Ok(true)
    }

    /// True only on the false → true transition
    pub async fn mark_plot_ready(&self, id: Uuid) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&id) {
            Some(entry) if !entry.status.has_plot_ready => {
                entry.status.has_plot_ready = true;
                entry.status.last_updated = Some(now_millis());
            }
            _ => return Ok(false),
        }

        self.commit(&entries).await?;
        info!("Plot of miner {} is ready", id);
        let _ = self.events.send(RegistryEvent::PlotReady(id));
        Ok(true)
    }

    /// True only if the toggle actually changed
    pub async fn set_on(&self, id: Uuid, on: bool) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&id) {
            Some(entry) if entry.status.is_on != on => {
                entry.status.is_on = on;
                entry.status.last_updated = Some(now_millis());
            }
            _ => return Ok(false),
        }

        self.commit(&entries).await?;
        info!("Miner {} turned {}", id, if on { "on" } else { "off" });
        let _ = self.events.send(RegistryEvent::Switched { id, on });
        Ok(true)
    }

    /// Record a freshly fetched balance. `last_updated` tracks the last check, so an
    /// unchanged balance is still persisted. False only for an unknown miner.
    pub async fn set_balance(&self, id: Uuid, balance: BigUint) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let changed = match entries.get_mut(&id) {
            Some(entry) => {
                let changed = entry.status.balance != balance;
                entry.status.balance = balance.clone();
                entry.status.last_updated = Some(now_millis());
                changed
            }
            None => return Ok(false),
        };

        self.commit(&entries).await?;
        if changed {
            debug!("Balance of miner {} is now {}", id, balance);
            let _ = self.events.send(RegistryEvent::BalanceUpdated { id, balance });
        }
        Ok(true)
    }

    pub fn get(&self, id: Uuid) -> Option<Miner> {
        self.published.load().get(id).map(|entry| entry.miner.clone())
    }

    pub fn status(&self, id: Uuid) -> Option<MinerStatus> {
        self.published.load().get(id).map(|entry| entry.status.clone())
    }

    /// Consistent, ordered view that can be iterated without holding any lock
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.published.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, entries: &HashMap<Uuid, MinerEntry>) {
        self.published.store(Arc::new(RegistrySnapshot::from_map(entries)));
    }

    /// Publish the mutation, then rewrite the store. On failure the mutation stays
    /// visible in memory and is persisted by the next successful write.
    async fn commit(&self, entries: &HashMap<Uuid, MinerEntry>) -> Result<()> {
        self.publish(entries);

        let records = self
            .published
            .load_full()
            .iter()
            .map(|entry| MinerRecord::new(&entry.miner, &entry.status))
            .collect();

        self.store.write(records).await.map_err(|e| {
            warn!("Failed to persist registry: {}", e);
            e
        })
    }
}
