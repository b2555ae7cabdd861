//! Latest-value cache for polled chain reads
//!
//! The scheduler is the only writer. Each slot is replaced wholesale under
//! a short write lock, so readers see either the previous or the next value
//! and never a mix. Slots are reference counted: every `register` must be
//! paired with one `unregister`, and the slot lives until the last one.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use alloy_primitives::U256;
use tokio::sync::Notify;
use vault_model::{ReconcileInputs, VaultView};

use crate::chain::ChainError;
use crate::queries::{PollClass, QueryKey, QueryValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult<T> {
    /// Not fetched yet, or disabled
    Loading,
    Success { value: T, fetched_at: Instant },
    Error(ChainError),
}

impl<T> QueryResult<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            QueryResult::Success { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, QueryResult::Loading)
    }

    /// Age of the value relative to `now`
    pub fn age(&self, now: Instant) -> Option<Duration> {
        match self {
            QueryResult::Success { fetched_at, .. } => Some(now.saturating_duration_since(*fetched_at)),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Slot {
    class: PollClass,
    result: QueryResult<QueryValue>,
    /// Live registrations
    refs: usize,
    /// Registered but not read yet
    awaiting_first: bool,
}

pub struct ReadCache {
    slots: RwLock<HashMap<QueryKey, Slot>>,
    /// New keys to read on mount
    mounted: Notify,
    /// Everything to re-read now
    refresh: Notify,
    staleness: Duration,
}

impl ReadCache {
    pub fn new(staleness: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            mounted: Notify::new(),
            refresh: Notify::new(),
            staleness,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<QueryKey, Slot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<QueryKey, Slot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a key at its default poll class
    pub fn register(&self, key: QueryKey) {
        let class = key.poll_class();
        self.register_with(key, class);
    }

    /// Start tracking a key at `class`. A key that is already tracked
    /// keeps its class and value and only gains a reference.
    pub fn register_with(&self, key: QueryKey, class: PollClass) {
        let mut slots = self.write();
        if let Some(slot) = slots.get_mut(&key) {
            slot.refs += 1;
            return;
        }
        slots.insert(
            key,
            Slot {
                class,
                result: QueryResult::Loading,
                refs: 1,
                awaiting_first: true,
            },
        );
        drop(slots);
        // Read the new key now rather than at the next tick
        self.mounted.notify_one();
    }

    /// Drop one registration; the slot goes with the last one
    pub fn unregister(&self, key: &QueryKey) {
        let mut slots = self.write();
        if let Some(slot) = slots.get_mut(key) {
            slot.refs = slot.refs.saturating_sub(1);
            if slot.refs == 0 {
                slots.remove(key);
            }
        }
    }

    /// Live registrations of `key`
    pub fn registrations(&self, key: &QueryKey) -> usize {
        self.read().get(key).map_or(0, |slot| slot.refs)
    }

    pub fn latest(&self, key: &QueryKey) -> QueryResult<QueryValue> {
        self.read()
            .get(key)
            .map(|slot| slot.result.clone())
            .unwrap_or(QueryResult::Loading)
    }

    pub fn is_stale(&self, key: &QueryKey, now: Instant) -> bool {
        match self.latest(key).age(now) {
            Some(age) => age > self.staleness,
            None => true,
        }
    }

    /// Enabled keys due for a fetch in `class`. `Once` keys are due only
    /// until their first success.
    pub fn due(&self, class: PollClass) -> Vec<QueryKey> {
        self.read()
            .iter()
            .filter(|(key, slot)| slot.class == class && key.enabled())
            .filter(|(_, slot)| class != PollClass::Once || slot.result.value().is_none())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Enabled keys registered since the last read, whatever their class
    pub fn awaiting_first(&self) -> Vec<QueryKey> {
        self.read()
            .iter()
            .filter(|(key, slot)| slot.awaiting_first && key.enabled())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Record a fetch outcome. A failure keeps the previous success.
    pub fn store(&self, key: &QueryKey, outcome: Result<QueryValue, ChainError>, now: Instant) {
        let mut slots = self.write();
        // Unregistered while the fetch was in flight
        let Some(slot) = slots.get_mut(key) else {
            return;
        };
        slot.awaiting_first = false;
        match outcome {
            Ok(value) => {
                slot.result = QueryResult::Success { value, fetched_at: now };
            }
            Err(e) => {
                if slot.result.value().is_none() {
                    slot.result = QueryResult::Error(e);
                }
            }
        }
    }

    /// Ask the scheduler to re-read every enabled key now
    pub fn invalidate(&self) {
        self.refresh.notify_one();
    }

    pub(crate) async fn refresh_requested(&self) {
        self.refresh.notified().await;
    }

    pub(crate) async fn mount_requested(&self) {
        self.mounted.notified().await;
    }

    pub fn uint(&self, key: &QueryKey) -> QueryResult<U256> {
        match self.latest(key) {
            QueryResult::Success { value: QueryValue::Uint(v), fetched_at } => {
                QueryResult::Success { value: v, fetched_at }
            }
            QueryResult::Success { .. } => QueryResult::Error(ChainError::UnexpectedReturn {
                selector: "cache",
                expected: "uint256",
            }),
            QueryResult::Loading => QueryResult::Loading,
            QueryResult::Error(e) => QueryResult::Error(e),
        }
    }

    pub fn view(&self, key: &QueryKey) -> QueryResult<VaultView> {
        match self.latest(key) {
            QueryResult::Success { value: QueryValue::View(v), fetched_at } => {
                QueryResult::Success { value: v, fetched_at }
            }
            QueryResult::Success { .. } => QueryResult::Error(ChainError::UnexpectedReturn {
                selector: "cache",
                expected: "VaultView",
            }),
            QueryResult::Loading => QueryResult::Loading,
            QueryResult::Error(e) => QueryResult::Error(e),
        }
    }

    /// Reconciliation inputs from a batched view; unknown until loaded
    pub fn reconcile_inputs(&self, key: &QueryKey) -> ReconcileInputs {
        self.view(key)
            .value()
            .map(ReconcileInputs::from)
            .unwrap_or_default()
    }
}
