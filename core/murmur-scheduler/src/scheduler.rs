use crate::SchedulerError;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::debug;

type Subscriber<T, E> = oneshot::Sender<Result<T, E>>;

struct State<K, T, E> {
    current_loads: usize,
    /// Leaders waiting for a slot, in arrival order. A send hands the
    /// caller's slot over without touching `current_loads`.
    queue: VecDeque<oneshot::Sender<()>>,
    /// Keys with a load in flight (or queued), and the callers waiting on it.
    pending: HashMap<K, Vec<Subscriber<T, E>>>,
}

impl<K, T, E> State<K, T, E> {
    /// Returns one slot: hands it to the next live waiter, or frees it.
    fn release_slot(&mut self) {
        while let Some(waiter) = self.queue.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
        }
        self.current_loads = self.current_loads.saturating_sub(1);
    }
}

/// Bounds concurrent loads and merges duplicate requests.
///
/// At most `max_concurrent_loads` loads run at once; the rest wait in FIFO
/// order. A request for a key that already has a load pending subscribes
/// to that load and receives a clone of its outcome, so each key costs one
/// round trip no matter how many callers ask for it. Failures are shared
/// the same way and clear the pending entry, so the next request retries.
///
/// Clones share state.
pub struct LoadScheduler<K, T, E> {
    state: Arc<Mutex<State<K, T, E>>>,
    max_concurrent_loads: usize,
}

impl<K, T, E> Clone for LoadScheduler<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            max_concurrent_loads: self.max_concurrent_loads,
        }
    }
}

impl<K, T, E> Debug for LoadScheduler<K, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadScheduler")
            .field("max_concurrent_loads", &self.max_concurrent_loads)
            .finish_non_exhaustive()
    }
}

enum Entry<T, E> {
    Subscribed(oneshot::Receiver<Result<T, E>>),
    Lead(Admission),
}

enum Admission {
    Admitted,
    Waiting(oneshot::Receiver<()>),
}

impl<K, T, E> LoadScheduler<K, T, E>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone,
    E: Clone + From<SchedulerError>,
{
    /// Creates a scheduler. A limit of 0 is treated as 1.
    pub fn new(max_concurrent_loads: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                current_loads: 0,
                queue: VecDeque::new(),
                pending: HashMap::new(),
            })),
            max_concurrent_loads: max_concurrent_loads.max(1),
        }
    }

    pub fn max_concurrent_loads(&self) -> usize {
        self.max_concurrent_loads
    }

    /// Loads currently holding a slot.
    pub fn current_loads(&self) -> usize {
        self.lock().current_loads
    }

    /// Loads waiting for a slot.
    pub fn queued(&self) -> usize {
        self.lock().queue.iter().filter(|w| !w.is_closed()).count()
    }

    /// True if a load for `key` is queued or running.
    pub fn is_pending(&self, key: &K) -> bool {
        self.lock().pending.contains_key(key)
    }

    /// Runs `load` for `key` under the concurrency limit, or joins the load
    /// already pending for `key`. `load` is only polled if this call leads.
    pub async fn schedule<F>(&self, key: K, load: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let entry = {
            let mut state = self.lock();
            if let Some(subscribers) = state.pending.get_mut(&key) {
                let (tx, rx) = oneshot::channel();
                subscribers.push(tx);
                debug!("Coalesced load for {:?}", key);
                Entry::Subscribed(rx)
            } else {
                state.pending.insert(key.clone(), Vec::new());
                if state.current_loads < self.max_concurrent_loads {
                    state.current_loads += 1;
                    Entry::Lead(Admission::Admitted)
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.queue.push_back(tx);
                    debug!("Queued load for {:?} ({} waiting)", key, state.queue.len());
                    Entry::Lead(Admission::Waiting(rx))
                }
            }
        };

        match entry {
            Entry::Subscribed(rx) => rx
                .await
                .unwrap_or_else(|_| Err(E::from(SchedulerError::Abandoned))),
            Entry::Lead(admission) => {
                let mut lead = Lead {
                    scheduler: self,
                    key,
                    admission,
                    settled: false,
                };
                lead.admitted().await?;
                let result = load.await;
                lead.settle(&result);
                result
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K, T, E>> {
        // State stays consistent across a panic: every critical section is
        // a handful of non-panicking collection operations.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ownership of one pending load. Dropping it before [`Lead::settle`]
/// returns the slot and rejects subscribers.
struct Lead<'a, K, T, E>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone,
    E: Clone + From<SchedulerError>,
{
    scheduler: &'a LoadScheduler<K, T, E>,
    key: K,
    admission: Admission,
    settled: bool,
}

impl<K, T, E> Lead<'_, K, T, E>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone,
    E: Clone + From<SchedulerError>,
{
    async fn admitted(&mut self) -> Result<(), SchedulerError> {
        if let Admission::Waiting(rx) = &mut self.admission {
            rx.await.map_err(|_| SchedulerError::Abandoned)?;
            self.admission = Admission::Admitted;
        }
        Ok(())
    }

    fn settle(&mut self, result: &Result<T, E>) {
        let subscribers = {
            let mut state = self.scheduler.lock();
            state.release_slot();
            state.pending.remove(&self.key).unwrap_or_default()
        };
        self.settled = true;
        if !subscribers.is_empty() {
            debug!("Sharing load for {:?} with {} subscribers", self.key, subscribers.len());
        }
        for subscriber in subscribers {
            let _ = subscriber.send(result.clone());
        }
    }
}

impl<K, T, E> Drop for Lead<'_, K, T, E>
where
    K: Eq + Hash + Clone + Debug,
    T: Clone,
    E: Clone + From<SchedulerError>,
{
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let holds_slot = match &mut self.admission {
            Admission::Admitted => true,
            // A slot may have been handed over after the caller stopped
            // polling.
            Admission::Waiting(rx) => rx.try_recv().is_ok(),
        };
        let subscribers = {
            let mut state = self.scheduler.lock();
            if holds_slot {
                state.release_slot();
            }
            state.pending.remove(&self.key).unwrap_or_default()
        };
        debug!("Load for {:?} abandoned", self.key);
        for subscriber in subscribers {
            let _ = subscriber.send(Err(E::from(SchedulerError::Abandoned)));
        }
    }
}
