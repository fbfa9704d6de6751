use crate::error::{NeoError, Result};
use crate::member::Snapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache key for a member's last synced snapshot.
pub fn snapshot_key(member_id: u64) -> String {
    format!("neo_consumer_{}", member_id)
}

/// Short-lived store of the remote-tracked fields last seen for each member
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, member_id: u64) -> Result<Option<Snapshot>>;
    async fn set(&self, member_id: u64, snapshot: &Snapshot, ttl: Duration) -> Result<()>;
    async fn delete(&self, member_id: u64) -> Result<()>;
}

/// Links local members to Neo consumer ids
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn consumer_id_for(&self, member_id: u64) -> Result<Option<String>>;
    async fn member_id_for(&self, consumer_id: &str) -> Result<Option<u64>>;
    async fn link(&self, member_id: u64, consumer_id: &str) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| NeoError::Storage(format!("lock poisoned: {}", e)))
}

/// In-memory snapshot cache with per-entry expiry
pub struct InMemorySnapshotCache {
    entries: Arc<Mutex<HashMap<String, (Snapshot, Instant)>>>,
}

impl Default for InMemorySnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySnapshotCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SnapshotCache for InMemorySnapshotCache {
    async fn get(&self, member_id: u64) -> Result<Option<Snapshot>> {
        let key = snapshot_key(member_id);
        let mut entries = lock(&self.entries)?;
        match entries.get(&key) {
            Some((snapshot, expires_at)) if *expires_at > Instant::now() => Ok(Some(snapshot.clone())),
            Some(_) => {
                entries.remove(&key);
                debug!("Expired cached snapshot {}", key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, member_id: u64, snapshot: &Snapshot, ttl: Duration) -> Result<()> {
        let key = snapshot_key(member_id);
        let mut entries = lock(&self.entries)?;
        debug!("Caching snapshot {} for {:?}", key, ttl);
        entries.insert(key, (snapshot.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, member_id: u64) -> Result<()> {
        lock(&self.entries)?.remove(&snapshot_key(member_id));
        Ok(())
    }
}

/// In-memory profile links for development/testing
pub struct InMemoryProfileStore {
    consumers: Arc<Mutex<HashMap<u64, String>>>,
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            consumers: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn consumer_id_for(&self, member_id: u64) -> Result<Option<String>> {
        Ok(lock(&self.consumers)?.get(&member_id).cloned())
    }

    async fn member_id_for(&self, consumer_id: &str) -> Result<Option<u64>> {
        let consumers = lock(&self.consumers)?;
        Ok(consumers
            .iter()
            .find(|(_, c)| c.as_str() == consumer_id)
            .map(|(m, _)| *m))
    }

    async fn link(&self, member_id: u64, consumer_id: &str) -> Result<()> {
        let mut consumers = lock(&self.consumers)?;
        // A consumer id belongs to exactly one member
        if let Some(owner) = consumers
            .iter()
            .find(|(m, c)| c.as_str() == consumer_id && **m != member_id)
            .map(|(m, _)| *m)
        {
            return Err(NeoError::Storage(format!(
                "consumer {} is already linked to member {}",
                consumer_id, owner
            )));
        }
        consumers.insert(member_id, consumer_id.to_string());
        debug!("Linked member {} to consumer {}", member_id, consumer_id);
        Ok(())
    }
}
