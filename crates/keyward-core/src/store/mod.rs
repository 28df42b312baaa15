//! State store contract and its backends
//!
//! Every backend answers the same three operations. The validation rules that
//! decide what a `lock`, `unlock` or expiry writes live here as pure functions
//! so both backends apply them identically; a backend only supplies the
//! batched read, the atomic commit and the expiry timers.

use std::time::Duration;

use async_trait::async_trait;
use keyward_common::StorageMode;

use crate::error::LockError;
use crate::model::{LockState, LockToken};

pub mod memory;
pub mod redis;
mod timer;

pub use memory::MemoryStateStore;
pub use redis::{RedisStateStore, RedisStoreConfig};

/// Contract shared by the in-process and the Redis backends
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Backend kind, for logging and diagnostics
    fn storage_mode(&self) -> StorageMode;

    /// Lease used when a request does not carry one
    fn default_lease(&self) -> Duration;

    /// Acquire or extend every key for `holder`, or none of them.
    ///
    /// Returns one token per key, in request order. Extended keys keep the
    /// version they were first granted with.
    async fn lock(
        &self,
        holder: &str,
        keys: &[String],
        lease: Option<Duration>,
    ) -> Result<Vec<LockToken>, LockError>;

    /// Release the keys whose token is still current for `holder`.
    ///
    /// Returns the keys actually released; stale tokens are skipped silently.
    async fn unlock(&self, holder: &str, tokens: &[LockToken]) -> Result<Vec<String>, LockError>;

    /// Whether any of `keys` is currently locked. Never mutates state or timers.
    async fn check(&self, keys: &[String]) -> Result<bool, LockError>;

    /// Current state of each key, absent keys reading as the default state
    async fn states(&self, keys: &[String]) -> Result<Vec<LockState>, LockError>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> Result<(), LockError>;
}

/// Outcome of validating a lock request against the current states
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct LockPlan {
    pub tokens: Vec<LockToken>,
    /// New state of every requested key; extended keys are rewritten unchanged
    /// so the commit still runs under the watch
    pub writes: Vec<(String, LockState)>,
}

/// Validate a lock request; `states[i]` is the current state of `keys[i]`.
pub(crate) fn plan_lock(
    holder: &str,
    keys: &[String],
    states: &[LockState],
) -> Result<LockPlan, LockError> {
    debug_assert_eq!(keys.len(), states.len());

    if !states.iter().all(|state| state.is_acquirable_by(holder)) {
        return Err(LockError::AlreadyLocked);
    }

    let mut plan = LockPlan::default();
    for (key, state) in keys.iter().zip(states) {
        plan.writes.push((key.clone(), state.acquired(holder)));
        plan.tokens.push(LockToken::new(key.as_str(), state.version));
    }
    Ok(plan)
}

/// Released states for the tokens that are still current; `states[i]` belongs to `tokens[i]`.
pub(crate) fn plan_unlock(
    holder: &str,
    tokens: &[LockToken],
    states: &[LockState],
) -> Vec<(String, LockState)> {
    debug_assert_eq!(tokens.len(), states.len());

    let mut writes: Vec<(String, LockState)> = Vec::new();
    for (token, state) in tokens.iter().zip(states) {
        // the same key twice in one request releases once
        if writes.iter().any(|(key, _)| key == &token.key) {
            continue;
        }
        if state.accepts_release(holder, token.version) {
            writes.push((token.key.clone(), state.released()));
        }
    }
    writes
}

/// Released state if the lease captured for `holder` is still the live one
pub(crate) fn plan_expire(holder: &str, state: &LockState) -> Option<LockState> {
    state.is_held_by(holder).then(|| state.released())
}
