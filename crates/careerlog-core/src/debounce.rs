use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

type Action = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Pending {
    generation: u64,
    action: Action,
    timer: JoinHandle<()>,
}

struct Slots<K> {
    next_generation: u64,
    pending: HashMap<K, Pending>,
    running: HashMap<u64, JoinHandle<()>>,
}

/// Coalesces repeated actions per key into one delayed run.
///
/// Scheduling a key that already has a pending timer replaces both the timer
/// and the action, so only the last action runs once the key has been quiet
/// for the full delay. Keys never interfere with each other.
///
/// An action that has started is no longer pending: cancelling its key does
/// not stop it, but [`Debouncer::flush`] still waits for it.
pub struct Debouncer<K> {
    delay: Duration,
    slots: Arc<Mutex<Slots<K>>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slots: Arc::new(Mutex::new(Slots {
                next_generation: 0,
                pending: HashMap::new(),
                running: HashMap::new(),
            })),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, key: K, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.slots.lock();
        slots.next_generation += 1;
        let generation = slots.next_generation;

        if let Some(previous) = slots.pending.remove(&key) {
            previous.timer.abort();
            trace!(?key, "replaced pending action");
        }

        let shared = Arc::clone(&self.slots);
        let delay = self.delay;
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let due = {
                let mut slots = shared.lock();
                let current = slots
                    .pending
                    .get(&timer_key)
                    .is_some_and(|pending| pending.generation == generation);
                if !current {
                    None
                } else if let Some(pending) = slots.pending.remove(&timer_key) {
                    slots.running.insert(generation, pending.timer);
                    Some(pending.action)
                } else {
                    None
                }
            };

            if let Some(action) = due {
                debug!(key = ?timer_key, "running debounced action");
                action.await;
                shared.lock().running.remove(&generation);
            }
        });

        slots.pending.insert(
            key,
            Pending {
                generation,
                action: Box::pin(action),
                timer,
            },
        );
    }

    /// Drops the pending action for `key` without running it.
    pub fn cancel(&self, key: &K) -> bool {
        let removed = self.slots.lock().pending.remove(key);
        match removed {
            Some(pending) => {
                pending.timer.abort();
                trace!(?key, "cancelled pending action");
                true
            }
            None => false,
        }
    }

    pub fn cancel_where(&self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let mut slots = self.slots.lock();
        let keys: Vec<K> = slots.pending.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &keys {
            if let Some(pending) = slots.pending.remove(key) {
                pending.timer.abort();
            }
        }
        keys.len()
    }

    pub fn cancel_all(&self) -> usize {
        self.cancel_where(|_| true)
    }

    /// Runs every pending action now, in no particular order, and waits for
    /// them and for any action already running to finish. Returns how many
    /// actions it ran or waited on.
    pub async fn flush(&self) -> usize {
        let (due, running): (Vec<(K, Action)>, Vec<JoinHandle<()>>) = {
            let mut slots = self.slots.lock();
            let due = slots
                .pending
                .drain()
                .map(|(key, pending)| {
                    pending.timer.abort();
                    (key, pending.action)
                })
                .collect();
            let running = slots.running.drain().map(|(_, handle)| handle).collect();
            (due, running)
        };

        let count = due.len() + running.len();
        for (key, action) in due {
            debug!(?key, "flushing debounced action");
            action.await;
        }
        for handle in running {
            if let Err(err) = handle.await {
                warn!(error = %err, "debounced action did not finish");
            }
        }
        count
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.slots.lock().pending.contains_key(key)
    }

    pub fn pending_len(&self) -> usize {
        self.slots.lock().pending.len()
    }
}
