//! Request and response bodies of the lock API

use keyward_core::LockToken;
use serde::{Deserialize, Serialize};

/// `keys` accepts either a single key or a list of keys
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeyList {
    One(String),
    Many(Vec<String>),
}

impl KeyList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            KeyList::One(key) => vec![key],
            KeyList::Many(keys) => keys,
        }
    }
}

/// Body of `POST /api/lock`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LockRequest {
    pub uid: Option<String>,
    pub keys: Option<KeyList>,
    /// Lease in milliseconds; a number or a numeric string
    pub exp: Option<serde_json::Value>,
}

/// One `{key, version}` entry of an unlock request
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenParam {
    pub key: Option<String>,
    pub version: Option<u64>,
}

/// Body of `POST /api/unlock`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UnlockRequest {
    pub uid: Option<String>,
    pub keys: Option<Vec<TokenParam>>,
}

/// Body of `POST /api/check`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CheckRequest {
    pub keys: Option<KeyList>,
}

/// Outcome of a lock request
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum LockOutcome {
    Granted { tokens: Vec<LockToken> },
    Refused { error: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct LockResponse {
    pub lock: LockOutcome,
}

#[derive(Clone, Debug, Serialize)]
pub struct UnlockResponse {
    pub unlocked: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckResponse {
    pub locked: bool,
}
