//! Lazily-initialized per-worker state.
//!
//! Each worker in the routing pool owns a connection-router instance (a
//! large stateful expander) and a statistics struct. Slots are keyed by the
//! pool's thread index and populated on first use from an exemplar
//! constructor, so nothing is allocated per task. A spare slot backs calls
//! from outside the pool (single-threaded tests, the controller itself).

use std::sync::Mutex;

/// A fixed array of per-worker slots, created on demand.
#[derive(Debug)]
pub struct WorkerLocal<T> {
    slots: Vec<Mutex<Option<T>>>,
}

impl<T> WorkerLocal<T> {
    /// Creates empty slots for `num_workers` pool threads plus one spare
    /// for callers outside the pool.
    pub fn new(num_workers: usize) -> Self {
        Self {
            slots: (0..num_workers + 1).map(|_| Mutex::new(None)).collect(),
        }
    }

    fn slot_index(&self) -> usize {
        rayon::current_thread_index().unwrap_or(self.slots.len() - 1)
    }

    /// Runs `f` with the calling worker's slot, constructing it from
    /// `init` on first use.
    ///
    /// The slot mutex is uncontended in steady state (each pool thread
    /// only ever touches its own slot); it exists so the container is
    /// shareable across the routing tasks.
    pub fn with<R>(&self, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.slots[self.slot_index()].lock().unwrap();
        f(guard.get_or_insert_with(init))
    }

    /// Drains every initialized slot, for end-of-iteration reduction.
    pub fn drain(&mut self) -> Vec<T> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.get_mut().unwrap().take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_on_first_use() {
        let local: WorkerLocal<Vec<u32>> = WorkerLocal::new(2);
        let len = local.with(|| vec![1, 2, 3], |v| v.len());
        assert_eq!(len, 3);
        // Second access sees the same instance, not a fresh one.
        local.with(Vec::new, |v| v.push(4));
        let len = local.with(Vec::new, |v| v.len());
        assert_eq!(len, 4);
    }

    #[test]
    fn drain_collects_initialized_slots() {
        let mut local: WorkerLocal<u32> = WorkerLocal::new(3);
        local.with(|| 7, |_| ());
        let drained = local.drain();
        assert_eq!(drained, vec![7]);
        // Slots are empty again after draining.
        assert!(local.drain().is_empty());
    }

    #[test]
    fn pool_threads_get_distinct_slots() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        let local: WorkerLocal<usize> = WorkerLocal::new(4);
        pool.install(|| {
            rayon::scope(|s| {
                for _ in 0..16 {
                    s.spawn(|_| {
                        local.with(|| 0, |count| *count += 1);
                    });
                }
            });
        });
        // All 16 increments landed somewhere, split across worker slots.
        let mut local = local;
        let total: usize = local.drain().into_iter().sum();
        assert_eq!(total, 16);
    }
}
