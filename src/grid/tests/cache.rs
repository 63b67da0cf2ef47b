//! Tests for partitioned cache invoke semantics and partition transfer

#[cfg(test)]
mod tests {
    use crate::grid::api::{
        CacheEvent, CacheListener, EntryEventKind, GridError, PartitionAware, PartitionId,
        PartitionedCache,
    };
    use std::sync::{Arc, Mutex};

    /// Key pinned to an explicit partition, like a message key
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    struct PinnedKey {
        partition: PartitionId,
        name: &'static str,
    }

    impl PartitionAware for PinnedKey {
        fn partition(&self, partition_count: u32) -> PartitionId {
            self.partition % partition_count as PartitionId
        }
    }

    fn key(partition: PartitionId, name: &'static str) -> PinnedKey {
        PinnedKey { partition, name }
    }

    #[derive(Default)]
    struct EventRecorder {
        events: Mutex<Vec<(EntryEventKind, PartitionId, &'static str)>>,
    }

    impl CacheListener<PinnedKey, u64> for EventRecorder {
        fn on_event(&self, event: &CacheEvent<PinnedKey, u64>) {
            self.events
                .lock()
                .unwrap()
                .push((event.kind, event.partition, event.key.name));
        }
    }

    fn cache_with_recorder() -> (PartitionedCache<PinnedKey, u64>, Arc<EventRecorder>) {
        let cache = PartitionedCache::new("test", 4);
        let recorder = Arc::new(EventRecorder::default());
        cache.add_listener(recorder.clone()).unwrap();
        (cache, recorder)
    }

    #[test]
    fn test_invoke_insert_update_remove_events() {
        let (cache, recorder) = cache_with_recorder();
        let k = key(1, "a");

        cache.invoke(&k, |entry| *entry = Some(1)).unwrap();
        cache
            .invoke(&k, |entry| {
                if let Some(value) = entry.as_mut() {
                    *value += 1;
                }
            })
            .unwrap();
        cache.invoke(&k, |entry| *entry = None).unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (EntryEventKind::Inserted, 1, "a"),
                (EntryEventKind::Updated, 1, "a"),
                (EntryEventKind::Removed, 1, "a"),
            ]
        );
    }

    #[test]
    fn test_unchanged_invoke_fires_no_event() {
        let (cache, recorder) = cache_with_recorder();
        let k = key(2, "b");

        cache.put(k.clone(), 5).unwrap();
        let seen = cache.invoke(&k, |entry| *entry).unwrap();
        let missing = cache.invoke(&key(2, "missing"), |entry| entry.is_some()).unwrap();

        assert_eq!(seen, Some(5));
        assert!(!missing);
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_invoke_all_returns_one_result_per_key() {
        let cache: PartitionedCache<PinnedKey, u64> = PartitionedCache::new("test", 4);
        let keys = vec![key(0, "x"), key(1, "y"), key(2, "z")];

        let results = cache
            .invoke_all(&keys, |k, entry| {
                *entry = Some(k.partition as u64 * 10);
                k.name
            })
            .unwrap();

        assert_eq!(results, vec!["x", "y", "z"]);
        assert_eq!(cache.get(&key(2, "z")).unwrap(), Some(20));
        assert_eq!(cache.len().unwrap(), 3);
    }

    #[test]
    fn test_depart_and_arrive_partition() {
        let (cache, recorder) = cache_with_recorder();
        cache.put(key(3, "m1"), 1).unwrap();
        cache.put(key(3, "m2"), 2).unwrap();
        cache.put(key(0, "other"), 9).unwrap();

        let mut departed = cache.depart_partition(3).unwrap();
        departed.sort_by_key(|(k, _)| k.name);
        assert_eq!(departed.len(), 2);
        assert!(!cache.owns_partition(3).unwrap());
        assert_eq!(cache.len().unwrap(), 1);

        match cache.get(&key(3, "m1")) {
            Err(GridError::PartitionNotOwned { partition, .. }) => assert_eq!(partition, 3),
            other => panic!("Expected PartitionNotOwned, got {:?}", other),
        }

        departed.reverse();
        cache.arrive_partition(3, departed).unwrap();
        assert!(cache.owns_partition(3).unwrap());
        assert_eq!(cache.get(&key(3, "m1")).unwrap(), Some(1));

        let events = recorder.events.lock().unwrap();
        let arrived: Vec<&str> = events
            .iter()
            .filter(|(kind, _, _)| *kind == EntryEventKind::Arrived)
            .map(|(_, _, name)| *name)
            .collect();
        assert_eq!(arrived, vec!["m2", "m1"]);
        assert_eq!(
            events
                .iter()
                .filter(|(kind, _, _)| *kind == EntryEventKind::Departed)
                .count(),
            2
        );
    }

    #[test]
    fn test_arrive_rejects_foreign_entries() {
        let cache: PartitionedCache<PinnedKey, u64> = PartitionedCache::new("test", 4);
        let result = cache.arrive_partition(1, vec![(key(2, "wrong"), 1)]);

        assert!(matches!(
            result,
            Err(GridError::PartitionMismatch {
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_listener_can_invoke_during_dispatch() {
        // Listeners run after the partition lock is released
        struct Mirror {
            cache: Arc<PartitionedCache<PinnedKey, u64>>,
        }

        impl CacheListener<PinnedKey, u64> for Mirror {
            fn on_event(&self, event: &CacheEvent<PinnedKey, u64>) {
                if event.kind == EntryEventKind::Inserted && event.key.name == "source" {
                    let _ = self.cache.put(key(event.partition, "mirror"), 99);
                }
            }
        }

        let cache = Arc::new(PartitionedCache::new("test", 2));
        cache
            .add_listener(Arc::new(Mirror {
                cache: Arc::clone(&cache),
            }))
            .unwrap();

        cache.put(key(1, "source"), 1).unwrap();
        assert_eq!(cache.get(&key(1, "mirror")).unwrap(), Some(99));
    }
}
