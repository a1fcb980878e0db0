use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Serializes transitions per entity. Different entities never contend.
#[derive(Debug, Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<i64, Arc<Mutex<()>>>> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_for(&self, entity_id: i64) -> Arc<Mutex<()>> {
        self.table().entry(entity_id).or_default().clone()
    }

    /// Drops the entry once only the table and `lock` still reference it.
    fn release(&self, entity_id: i64, lock: Arc<Mutex<()>>) {
        let mut locks = self.table();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&entity_id);
        }
    }

    /// Runs `f` while holding the entity's lock.
    pub fn with_entity<R>(&self, entity_id: i64, f: impl FnOnce() -> R) -> R {
        let lock = self.lock_for(entity_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        self.release(entity_id, lock);
        result
    }

    /// Entities with a transition in flight or waiting.
    pub fn tracked(&self) -> usize {
        self.table().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_entity_sections_do_not_overlap() {
        let locks = Arc::new(EntityLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    locks.with_entity(7, || {
                        if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(20));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn idle_entities_are_forgotten() {
        let locks = EntityLocks::new();
        for entity_id in 0..100 {
            locks.with_entity(entity_id, || {
                assert_eq!(locks.tracked(), 1);
            });
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn returns_the_closure_result() {
        let locks = EntityLocks::new();
        assert_eq!(locks.with_entity(1, || 41 + 1), 42);
    }
}
