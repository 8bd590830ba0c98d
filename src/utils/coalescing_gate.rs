use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Quiet period used when none is configured.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_millis(200);

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Slots<K> {
    next_generation: u64,
    pending: HashMap<K, Slot>,
}

/// Per-key debounce: of a burst of triggers on one key, only the last
/// action runs, once the key has been quiet for the settle interval.
///
/// Keys are independent of each other. A key only occupies the map while
/// it has a scheduled action, so the map never outgrows the number of keys
/// with work in flight.
pub struct CoalescingGate<K> {
    settle: Duration,
    slots: Arc<Mutex<Slots<K>>>,
}

impl<K> Clone for CoalescingGate<K> {
    fn clone(&self) -> Self {
        CoalescingGate {
            settle: self.settle,
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K> Default for CoalescingGate<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_INTERVAL)
    }
}

impl<K> CoalescingGate<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(settle: Duration) -> Self {
        CoalescingGate {
            settle,
            slots: Arc::new(Mutex::new(Slots {
                next_generation: 0,
                pending: HashMap::new(),
            })),
        }
    }

    pub fn settle_interval(&self) -> Duration {
        self.settle
    }

    /// Schedule `action` to run once `key` has been quiet for the settle
    /// interval, replacing whatever was scheduled for `key` before. The
    /// replaced action is dropped without running.
    ///
    /// Returns immediately. Must be called from within a Tokio runtime.
    pub fn trigger<F>(&self, key: K, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.slots.lock();
        slots.next_generation += 1;
        let generation = slots.next_generation;

        let registry = Arc::clone(&self.slots);
        let settle = self.settle;
        let owned_key = key.clone();
        // The map lock is held until the slot is inserted, so the task can
        // never look for its slot before it exists.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(settle).await;

            let claimed = {
                let mut slots = registry.lock();
                let current = slots.pending.get(&owned_key).map(|slot| slot.generation);
                if current == Some(generation) {
                    slots.pending.remove(&owned_key);
                    true
                } else {
                    false
                }
            };
            if claimed {
                action.await;
            }
        });

        if let Some(previous) = slots.pending.insert(key, Slot { generation, handle }) {
            previous.handle.abort();
            trace!(generation = previous.generation, "superseded pending action");
        }
    }

    /// Number of keys with an action waiting to run.
    pub fn pending(&self) -> usize {
        self.slots.lock().pending.len()
    }
}
