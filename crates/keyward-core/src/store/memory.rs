// In-process lock state store
// One table per store instance; a single mutex serializes lock, unlock and expiry

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use keyward_common::StorageMode;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::timer::{ExpiryTimer, TimerIds};
use super::{StateStore, plan_expire, plan_lock, plan_unlock};
use crate::error::LockError;
use crate::model::{LockState, LockToken};

/// A key's state together with the timer guarding its current lease
#[derive(Default)]
struct Entry {
    state: LockState,
    timer: Option<ExpiryTimer>,
}

struct MemoryInner {
    table: Mutex<HashMap<String, Entry>>,
    timer_ids: TimerIds,
    default_lease: Duration,
}

/// Lock state store backed by process memory
#[derive(Clone)]
pub struct MemoryStateStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStateStore {
    pub fn new(default_lease: Duration) -> Self {
        info!(
            default_lease_ms = default_lease.as_millis() as u64,
            "In-memory lock store initialized"
        );
        Self {
            inner: Arc::new(MemoryInner {
                table: Mutex::new(HashMap::new()),
                timer_ids: TimerIds::default(),
                default_lease,
            }),
        }
    }

    fn lock_keys(
        &self,
        holder: &str,
        keys: &[String],
        lease: Duration,
    ) -> Result<Vec<LockToken>, LockError> {
        let mut table = self.inner.table.lock();

        let states: Vec<LockState> = keys
            .iter()
            .map(|key| table.get(key).map(|e| e.state.clone()).unwrap_or_default())
            .collect();
        let plan = plan_lock(holder, keys, &states)?;

        for (key, state) in plan.writes {
            table.entry(key).or_default().state = state;
        }
        for key in keys {
            let timer = schedule_expiry(&self.inner, holder, key, lease);
            // replacing the handle cancels the previous lease's timer
            table.entry(key.clone()).or_default().timer = Some(timer);
        }

        debug!(holder = %holder, count = keys.len(), "Keys locked");
        Ok(plan.tokens)
    }

    fn unlock_tokens(&self, holder: &str, tokens: &[LockToken]) -> Vec<String> {
        let mut table = self.inner.table.lock();

        let states: Vec<LockState> = tokens
            .iter()
            .map(|t| table.get(&t.key).map(|e| e.state.clone()).unwrap_or_default())
            .collect();

        let mut released = Vec::new();
        for (key, state) in plan_unlock(holder, tokens, &states) {
            let entry = table.entry(key.clone()).or_default();
            entry.state = state;
            entry.timer = None;
            released.push(key);
        }

        debug!(holder = %holder, count = released.len(), "Keys unlocked");
        released
    }

    fn snapshot(&self, keys: &[String]) -> Vec<LockState> {
        let table = self.inner.table.lock();
        keys.iter()
            .map(|key| table.get(key).map(|e| e.state.clone()).unwrap_or_default())
            .collect()
    }
}

impl MemoryInner {
    fn expire(&self, holder: &str, key: &str, timer_id: u64) {
        let mut table = self.table.lock();
        let Some(entry) = table.get_mut(key) else {
            return;
        };

        // a newer lease or a release has replaced this timer
        if entry.timer.as_ref().map(ExpiryTimer::id) != Some(timer_id) {
            return;
        }
        if let Some(timer) = entry.timer.take() {
            timer.disarm();
        }

        if let Some(next) = plan_expire(holder, &entry.state) {
            debug!(key = %key, holder = %holder, version = next.version, "Lease expired");
            entry.state = next;
        }
    }
}

fn schedule_expiry(
    inner: &Arc<MemoryInner>,
    holder: &str,
    key: &str,
    lease: Duration,
) -> ExpiryTimer {
    let id = inner.timer_ids.next();
    let store: Weak<MemoryInner> = Arc::downgrade(inner);
    let holder = holder.to_string();
    let key = key.to_string();

    ExpiryTimer::schedule(id, lease, async move {
        if let Some(inner) = store.upgrade() {
            inner.expire(&holder, &key, id);
        }
    })
}

#[async_trait]
impl StateStore for MemoryStateStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Memory
    }

    fn default_lease(&self) -> Duration {
        self.inner.default_lease
    }

    async fn lock(
        &self,
        holder: &str,
        keys: &[String],
        lease: Option<Duration>,
    ) -> Result<Vec<LockToken>, LockError> {
        self.lock_keys(holder, keys, lease.unwrap_or(self.inner.default_lease))
    }

    async fn unlock(&self, holder: &str, tokens: &[LockToken]) -> Result<Vec<String>, LockError> {
        Ok(self.unlock_tokens(holder, tokens))
    }

    async fn check(&self, keys: &[String]) -> Result<bool, LockError> {
        Ok(self.snapshot(keys).iter().any(|state| state.locked))
    }

    async fn states(&self, keys: &[String]) -> Result<Vec<LockState>, LockError> {
        Ok(self.snapshot(keys))
    }

    async fn health_check(&self) -> Result<(), LockError> {
        Ok(())
    }
}
