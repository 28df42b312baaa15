//! Lock state data model
//!
//! A key that has never been written reads as [`LockState::default`]:
//! unlocked, no holder, version 1.

use serde::{Deserialize, Serialize};

/// Version assigned to a key that has never been locked
pub const INITIAL_VERSION: u64 = 1;

/// Per-key lock record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub locked: bool,
    pub holder: Option<String>,
    /// Fencing token. Bumped on every locked -> unlocked transition, never on acquisition.
    pub version: u64,
}

impl Default for LockState {
    fn default() -> Self {
        Self {
            locked: false,
            holder: None,
            version: INITIAL_VERSION,
        }
    }
}

impl LockState {
    /// Whether `holder` currently holds this key
    pub fn is_held_by(&self, holder: &str) -> bool {
        self.locked && self.holder.as_deref() == Some(holder)
    }

    /// A key can be taken when it is free or already held by the same holder
    pub fn is_acquirable_by(&self, holder: &str) -> bool {
        !self.locked || self.is_held_by(holder)
    }

    /// A release is honored only for the current holder presenting the current version
    pub fn accepts_release(&self, holder: &str, version: u64) -> bool {
        self.is_held_by(holder) && self.version == version
    }

    /// State after `holder` takes the key; the version is kept
    pub fn acquired(&self, holder: &str) -> LockState {
        LockState {
            locked: true,
            holder: Some(holder.to_string()),
            version: self.version,
        }
    }

    /// State after the key is released, either by its holder or by expiry
    pub fn released(&self) -> LockState {
        LockState {
            locked: false,
            holder: None,
            version: self.version + 1,
        }
    }
}

/// Fencing token handed to a caller for each granted key
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken {
    pub key: String,
    pub version: u64,
}

impl LockToken {
    pub fn new(key: impl Into<String>, version: u64) -> Self {
        Self {
            key: key.into(),
            version,
        }
    }
}
