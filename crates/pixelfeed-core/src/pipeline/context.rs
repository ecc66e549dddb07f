//! Per-thread reusable contexts.
//!
//! Some stage state (random sources for augmentation, scratch state that is
//! costly to build) must not be shared between threads that run the same
//! pipeline concurrently. [`ThreadCache`] hands every thread its own lazily
//! created instance and keeps it for reuse on later calls from that thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

/// Map from thread identity to a lazily constructed context.
pub struct ThreadCache<T> {
    slots: Mutex<HashMap<ThreadId, Arc<Mutex<T>>>>,
    next_ordinal: AtomicUsize,
}

impl<T> Default for ThreadCache<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_ordinal: AtomicUsize::new(0),
        }
    }
}

impl<T> ThreadCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the calling thread's context, creating it with
    /// `init(ordinal)` on first use. `ordinal` counts contexts in creation
    /// order and is never reused, even after [`ThreadCache::release`].
    pub fn with<R>(&self, init: impl FnOnce(usize) -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(thread::current().id()).or_insert_with(|| {
                let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
                Arc::new(Mutex::new(init(ordinal)))
            }))
        };
        let mut context = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut context)
    }

    /// Number of threads that currently own a context.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the calling thread's context. Threads that exit should call
    /// this so their slot does not outlive them.
    pub fn release(&self) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&thread::current().id())
            .is_some()
    }

    /// Drop every cached context; they are rebuilt on next use.
    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_reused_within_thread() {
        let cache = ThreadCache::<u32>::new();
        cache.with(|_| 0, |n| *n += 1);
        cache.with(|_| 100, |n| *n += 1);
        assert_eq!(cache.with(|_| 100, |n| *n), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_each_thread_gets_own_context() {
        let cache = Arc::new(ThreadCache::<Vec<usize>>::new());
        cache.with(|ordinal| vec![ordinal], |v| v.push(1));

        let worker_cache = Arc::clone(&cache);
        let seen = thread::spawn(move || worker_cache.with(|ordinal| vec![ordinal], |v| v.clone()))
            .join()
            .unwrap();

        assert_eq!(seen, vec![1]);
        assert_eq!(cache.with(|_| vec![], |v| v.clone()), vec![0, 1]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_released_slot_is_not_reused() {
        let cache = Arc::new(ThreadCache::<usize>::new());
        cache.with(|ordinal| ordinal, |_| ());

        let worker_cache = Arc::clone(&cache);
        let released = thread::spawn(move || {
            worker_cache.with(|ordinal| ordinal, |_| ());
            worker_cache.release()
        })
        .join()
        .unwrap();
        assert!(released);
        assert_eq!(cache.len(), 1);

        let worker_cache = Arc::clone(&cache);
        let ordinal = thread::spawn(move || worker_cache.with(|ordinal| ordinal, |n| *n))
            .join()
            .unwrap();
        assert_eq!(ordinal, 2);
        assert!(!ThreadCache::<u8>::new().release());
    }

    #[test]
    fn test_clear_rebuilds() {
        let cache = ThreadCache::<u8>::new();
        cache.with(|_| 5, |_| ());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.with(|_| 9, |n| *n), 9);
    }
}
