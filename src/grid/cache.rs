//! Partitioned key-value cache with per-key atomic invoke
//!
//! Each partition is guarded by its own mutex, which serialises every mutation
//! of the keys it holds. Entry events are computed under that lock but
//! delivered after it is released.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::core::sync::{handle_mutex_poison, handle_rwlock_read, handle_rwlock_write};
use crate::grid::error::{GridError, GridResult};
use crate::grid::event::{CacheEvent, CacheListener, EntryEventKind};
use crate::grid::partition::{PartitionAware, PartitionId};

#[derive(Debug)]
struct PartitionStore<K, V> {
    owned: bool,
    entries: HashMap<K, V>,
}

/// A named cache split into a fixed number of partitions
pub struct PartitionedCache<K, V> {
    name: String,
    partition_count: u32,
    partitions: Vec<Mutex<PartitionStore<K, V>>>,
    listeners: RwLock<Vec<Arc<dyn CacheListener<K, V>>>>,
}

impl<K, V> PartitionedCache<K, V>
where
    K: PartitionAware + Eq + Hash + Clone + Debug + Send + Sync,
    V: Clone + PartialEq + Send + Sync,
{
    /// Create a cache owning every partition
    pub fn new(name: impl Into<String>, partition_count: u32) -> Self {
        let partition_count = partition_count.max(1);
        let partitions = (0..partition_count)
            .map(|_| {
                Mutex::new(PartitionStore {
                    owned: true,
                    entries: HashMap::new(),
                })
            })
            .collect();

        Self {
            name: name.into(),
            partition_count,
            partitions,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    pub fn partition_of(&self, key: &K) -> PartitionId {
        key.partition(self.partition_count)
    }

    pub fn add_listener(&self, listener: Arc<dyn CacheListener<K, V>>) -> GridResult<()> {
        let mut listeners = handle_rwlock_write(self.listeners.write(), |message| {
            GridError::Poisoned { message }
        })?;
        listeners.push(listener);
        Ok(())
    }

    fn lock_partition(&self, partition: PartitionId) -> GridResult<MutexGuard<'_, PartitionStore<K, V>>> {
        let store = usize::try_from(partition)
            .ok()
            .and_then(|index| self.partitions.get(index))
            .ok_or_else(|| GridError::InvalidPartition {
                cache: self.name.clone(),
                partition,
                partition_count: self.partition_count,
            })?;
        handle_mutex_poison(store.lock(), |message| GridError::Poisoned { message })
    }

    fn lock_owned_partition(
        &self,
        partition: PartitionId,
    ) -> GridResult<MutexGuard<'_, PartitionStore<K, V>>> {
        let store = self.lock_partition(partition)?;
        if !store.owned {
            return Err(GridError::PartitionNotOwned {
                cache: self.name.clone(),
                partition,
            });
        }
        Ok(store)
    }

    fn dispatch(&self, events: &[CacheEvent<K, V>]) -> GridResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let listeners: Vec<Arc<dyn CacheListener<K, V>>> = {
            let guard = handle_rwlock_read(self.listeners.read(), |message| {
                GridError::Poisoned { message }
            })?;
            guard.clone()
        };
        for event in events {
            log::trace!(
                "Cache '{}' partition {} {} {:?}",
                self.name,
                event.partition,
                event.kind,
                event.key
            );
            for listener in &listeners {
                listener.on_event(event);
            }
        }
        Ok(())
    }

    /// Atomically apply `f` to the entry for `key`
    ///
    /// `f` sees `None` for an absent entry; leaving `Some` stores the value,
    /// leaving `None` removes it. `f` must not touch any cache.
    pub fn invoke<R>(&self, key: &K, f: impl FnOnce(&mut Option<V>) -> R) -> GridResult<R> {
        let partition = self.partition_of(key);
        let (result, event) = {
            let mut store = self.lock_owned_partition(partition)?;
            let old_value = store.entries.get(key).cloned();
            let mut slot = old_value.clone();
            let result = f(&mut slot);

            let kind = match (&old_value, &slot) {
                (None, None) => None,
                (None, Some(_)) => Some(EntryEventKind::Inserted),
                (Some(old), Some(new)) if old != new => Some(EntryEventKind::Updated),
                (Some(_), Some(_)) => None,
                (Some(_), None) => Some(EntryEventKind::Removed),
            };

            match &slot {
                Some(value) if kind.is_some() => {
                    store.entries.insert(key.clone(), value.clone());
                }
                None if kind.is_some() => {
                    store.entries.remove(key);
                }
                _ => {}
            }

            let event = kind.map(|kind| CacheEvent {
                kind,
                partition,
                key: key.clone(),
                old_value,
                new_value: slot,
            });
            (result, event)
        };

        if let Some(event) = event {
            self.dispatch(std::slice::from_ref(&event))?;
        }
        Ok(result)
    }

    /// Apply `f` to every key, one atomic invoke per key
    pub fn invoke_all<R>(
        &self,
        keys: &[K],
        f: impl Fn(&K, &mut Option<V>) -> R,
    ) -> GridResult<Vec<R>> {
        keys.iter()
            .map(|key| self.invoke(key, |entry| f(key, entry)))
            .collect()
    }

    pub fn get(&self, key: &K) -> GridResult<Option<V>> {
        let store = self.lock_owned_partition(self.partition_of(key))?;
        Ok(store.entries.get(key).cloned())
    }

    pub fn contains_key(&self, key: &K) -> GridResult<bool> {
        let store = self.lock_owned_partition(self.partition_of(key))?;
        Ok(store.entries.contains_key(key))
    }

    pub fn put(&self, key: K, value: V) -> GridResult<Option<V>> {
        self.invoke(&key, |entry| entry.replace(value))
    }

    pub fn remove(&self, key: &K) -> GridResult<Option<V>> {
        self.invoke(key, |entry| entry.take())
    }

    /// Keys held in every owned partition
    pub fn keys(&self) -> GridResult<Vec<K>> {
        let mut keys = Vec::new();
        for partition in 0..self.partition_count as PartitionId {
            let store = self.lock_partition(partition)?;
            if store.owned {
                keys.extend(store.entries.keys().cloned());
            }
        }
        Ok(keys)
    }

    /// Number of entries held in owned partitions
    pub fn len(&self) -> GridResult<usize> {
        let mut total = 0;
        for partition in 0..self.partition_count as PartitionId {
            let store = self.lock_partition(partition)?;
            if store.owned {
                total += store.entries.len();
            }
        }
        Ok(total)
    }

    pub fn is_empty(&self) -> GridResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn owns_partition(&self, partition: PartitionId) -> GridResult<bool> {
        Ok(self.lock_partition(partition)?.owned)
    }

    pub fn entries_in_partition(&self, partition: PartitionId) -> GridResult<Vec<(K, V)>> {
        let store = self.lock_owned_partition(partition)?;
        Ok(store
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Give up ownership of a partition, returning its entries
    ///
    /// Fires one `Departed` event per entry.
    pub fn depart_partition(&self, partition: PartitionId) -> GridResult<Vec<(K, V)>> {
        let entries: Vec<(K, V)> = {
            let mut store = self.lock_owned_partition(partition)?;
            store.owned = false;
            store.entries.drain().collect()
        };

        let events: Vec<CacheEvent<K, V>> = entries
            .iter()
            .map(|(key, value)| CacheEvent {
                kind: EntryEventKind::Departed,
                partition,
                key: key.clone(),
                old_value: Some(value.clone()),
                new_value: None,
            })
            .collect();
        self.dispatch(&events)?;
        Ok(entries)
    }

    /// Take ownership of a partition and install the transferred entries
    ///
    /// Fires one `Arrived` event per entry, in the order given.
    pub fn arrive_partition(&self, partition: PartitionId, entries: Vec<(K, V)>) -> GridResult<()> {
        if let Some((key, _)) = entries.iter().find(|(k, _)| self.partition_of(k) != partition) {
            return Err(GridError::PartitionMismatch {
                cache: self.name.clone(),
                expected: partition,
                actual: self.partition_of(key),
            });
        }

        {
            let mut store = self.lock_partition(partition)?;
            store.owned = true;
            for (key, value) in &entries {
                store.entries.insert(key.clone(), value.clone());
            }
        }

        let events: Vec<CacheEvent<K, V>> = entries
            .into_iter()
            .map(|(key, value)| CacheEvent {
                kind: EntryEventKind::Arrived,
                partition,
                key,
                old_value: None,
                new_value: Some(value),
            })
            .collect();
        self.dispatch(&events)
    }
}
