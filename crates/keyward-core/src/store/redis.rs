//! Redis-backed lock state store
//!
//! Lock state is shared by every Keyward instance pointed at the same Redis.
//! Each key is stored as a hash:
//!
//! | Field     | Encoding                      |
//! |-----------|-------------------------------|
//! | `locked`  | `"true"` / `"false"`          |
//! | `holder`  | holder id, empty when free    |
//! | `version` | decimal fencing token         |
//!
//! Missing or unreadable fields decode to the default state, so an absent key
//! reads as unlocked at version 1.
//!
//! `lock`, `unlock` and expiry run as optimistic transactions: `WATCH` the key
//! set, read it, validate, then `MULTI`/`EXEC`. A nil `EXEC` reply means
//! another writer touched a watched key and the operation fails with
//! [`LockError::Conflict`]. Client operations are never retried here.
//!
//! `WATCH` is scoped to a connection, so every transaction opens its own
//! connection instead of sharing a multiplexed one.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use keyward_common::{DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT, StorageMode};
use redis::aio::MultiplexedConnection;
use tracing::{debug, info, warn};

use super::timer::{ExpiryTimer, TimerIds};
use super::{StateStore, plan_expire, plan_lock, plan_unlock};
use crate::error::LockError;
use crate::model::{INITIAL_VERSION, LockState, LockToken};

pub const FIELD_LOCKED: &str = "locked";
pub const FIELD_HOLDER: &str = "holder";
pub const FIELD_VERSION: &str = "version";

/// Attempts an expiry makes before giving up on a contended key
const EXPIRE_MAX_ATTEMPTS: usize = 3;

/// Connection settings for the Redis store
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`
    pub url: String,
    /// Prefix prepended to every lock key on the wire
    pub key_prefix: String,
    pub default_lease: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: format!("redis://{}:{}", DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT),
            key_prefix: String::new(),
            default_lease: Duration::from_millis(keyward_common::DEFAULT_EXPIRY_MS),
        }
    }
}

struct RedisInner {
    client: redis::Client,
    key_prefix: String,
    default_lease: Duration,
    /// Expiry timers for leases granted by this instance
    timers: DashMap<String, ExpiryTimer>,
    timer_ids: TimerIds,
    /// Runs once between the watched read and `EXEC`
    #[cfg(test)]
    before_commit: parking_lot::Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// Lock state store shared across processes through Redis
#[derive(Clone)]
pub struct RedisStateStore {
    inner: Arc<RedisInner>,
}

impl RedisStateStore {
    /// Create a store; no connection is made until the first operation
    pub fn new(config: &RedisStoreConfig) -> Result<Self, LockError> {
        let client = redis::Client::open(config.url.as_str())?;
        info!(
            url = %config.url,
            key_prefix = %config.key_prefix,
            default_lease_ms = config.default_lease.as_millis() as u64,
            "Redis lock store initialized"
        );
        Ok(Self {
            inner: Arc::new(RedisInner {
                client,
                key_prefix: config.key_prefix.clone(),
                default_lease: config.default_lease,
                timers: DashMap::new(),
                timer_ids: TimerIds::default(),
                #[cfg(test)]
                before_commit: parking_lot::Mutex::new(None),
            }),
        })
    }

    fn schedule_expiry(&self, holder: &str, key: &str, lease: Duration) {
        let id = self.inner.timer_ids.next();
        let store: Weak<RedisInner> = Arc::downgrade(&self.inner);
        let holder_owned = holder.to_string();
        let key_owned = key.to_string();

        let timer = ExpiryTimer::schedule(id, lease, async move {
            if let Some(inner) = store.upgrade() {
                inner.expire(&holder_owned, &key_owned, id).await;
            }
        });
        // replacing the handle cancels the previous lease's timer
        self.inner.timers.insert(key.to_string(), timer);
    }
}

impl RedisInner {
    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, LockError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn watch(&self, con: &mut MultiplexedConnection, keys: &[&str]) -> Result<(), LockError> {
        if keys.is_empty() {
            return Ok(());
        }
        let storage_keys: Vec<String> = keys.iter().map(|k| self.storage_key(k)).collect();
        let _: () = redis::cmd("WATCH").arg(&storage_keys).query_async(con).await?;
        Ok(())
    }

    /// Read every key in one pipeline
    async fn read(
        &self,
        con: &mut MultiplexedConnection,
        keys: &[&str],
    ) -> Result<Vec<LockState>, LockError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HMGET")
                .arg(self.storage_key(key))
                .arg(FIELD_LOCKED)
                .arg(FIELD_HOLDER)
                .arg(FIELD_VERSION);
        }
        let rows: Vec<Vec<Option<String>>> = pipe.query_async(con).await?;

        Ok(rows.iter().map(|row| decode_state(row)).collect())
    }

    /// Commit `writes` in a `MULTI`/`EXEC` block guarded by the current `WATCH`
    async fn commit(
        &self,
        con: &mut MultiplexedConnection,
        writes: &[(String, LockState)],
    ) -> Result<(), LockError> {
        #[cfg(test)]
        {
            let hook = self.before_commit.lock().take();
            if let Some(hook) = hook {
                hook();
            }
        }

        let mut tx = redis::pipe();
        tx.atomic();
        for (key, state) in writes {
            tx.hset_multiple(self.storage_key(key), &encode_state(state))
                .ignore();
        }

        let committed: Option<Vec<redis::Value>> = tx.query_async(con).await?;
        match committed {
            Some(_) => Ok(()),
            None => Err(LockError::Conflict),
        }
    }

    fn is_current_timer(&self, key: &str, timer_id: u64) -> bool {
        self.timers.get(key).is_some_and(|t| t.id() == timer_id)
    }

    async fn expire(&self, holder: &str, key: &str, timer_id: u64) {
        for attempt in 1..=EXPIRE_MAX_ATTEMPTS {
            // a newer lease or a release has replaced this timer
            if !self.is_current_timer(key, timer_id) {
                return;
            }
            match self.expire_once(holder, key).await {
                Ok(Some(version)) => {
                    debug!(key = %key, holder = %holder, version, "Lease expired");
                    break;
                }
                Ok(None) => break,
                Err(LockError::Conflict) if attempt < EXPIRE_MAX_ATTEMPTS => {
                    debug!(key = %key, attempt, "Expiry raced a concurrent writer, re-reading");
                }
                Err(e) => {
                    warn!(key = %key, holder = %holder, error = %e, "Failed to expire lease");
                    break;
                }
            }
        }

        if let Some((_, timer)) = self.timers.remove_if(key, |_, t| t.id() == timer_id) {
            timer.disarm();
        }
    }

    /// Returns the new version when the lease was still live and got released
    async fn expire_once(&self, holder: &str, key: &str) -> Result<Option<u64>, LockError> {
        let mut con = self.connection().await?;
        self.watch(&mut con, &[key]).await?;

        let states = self.read(&mut con, &[key]).await?;
        let Some(next) = states.first().and_then(|state| plan_expire(holder, state)) else {
            return Ok(None);
        };

        let version = next.version;
        self.commit(&mut con, &[(key.to_string(), next)]).await?;
        Ok(Some(version))
    }
}

/// Decode an `HMGET locked holder version` reply
fn decode_state(row: &[Option<String>]) -> LockState {
    let field = |i: usize| row.get(i).and_then(|v| v.as_deref());

    LockState {
        locked: field(0).is_some_and(|v| v == "true"),
        holder: field(1).filter(|v| !v.is_empty()).map(str::to_string),
        version: field(2)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(INITIAL_VERSION),
    }
}

fn encode_state(state: &LockState) -> [(&'static str, String); 3] {
    [
        (FIELD_LOCKED, state.locked.to_string()),
        (FIELD_HOLDER, state.holder.clone().unwrap_or_default()),
        (FIELD_VERSION, state.version.to_string()),
    ]
}

fn as_strs(keys: &[String]) -> Vec<&str> {
    keys.iter().map(String::as_str).collect()
}

#[async_trait]
impl StateStore for RedisStateStore {
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Redis
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
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let lease = lease.unwrap_or(self.inner.default_lease);
        let key_refs = as_strs(keys);

        let mut con = self.inner.connection().await?;
        self.inner.watch(&mut con, &key_refs).await?;
        let states = self.inner.read(&mut con, &key_refs).await?;

        let plan = plan_lock(holder, keys, &states)?;
        self.inner.commit(&mut con, &plan.writes).await?;

        for key in keys {
            self.schedule_expiry(holder, key, lease);
        }

        debug!(holder = %holder, count = keys.len(), "Keys locked");
        Ok(plan.tokens)
    }

    async fn unlock(&self, holder: &str, tokens: &[LockToken]) -> Result<Vec<String>, LockError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let key_refs: Vec<&str> = tokens.iter().map(|t| t.key.as_str()).collect();

        let mut con = self.inner.connection().await?;
        self.inner.watch(&mut con, &key_refs).await?;
        let states = self.inner.read(&mut con, &key_refs).await?;

        let writes = plan_unlock(holder, tokens, &states);
        if writes.is_empty() {
            return Ok(Vec::new());
        }
        self.inner.commit(&mut con, &writes).await?;

        let released: Vec<String> = writes.into_iter().map(|(key, _)| key).collect();
        for key in &released {
            self.inner.timers.remove(key);
        }

        debug!(holder = %holder, count = released.len(), "Keys unlocked");
        Ok(released)
    }

    async fn check(&self, keys: &[String]) -> Result<bool, LockError> {
        Ok(self.states(keys).await?.iter().any(|state| state.locked))
    }

    async fn states(&self, keys: &[String]) -> Result<Vec<LockState>, LockError> {
        let mut con = self.inner.connection().await?;
        self.inner.read(&mut con, &as_strs(keys)).await
    }

    async fn health_check(&self) -> Result<(), LockError> {
        let mut con = self.inner.connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut con).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(LockError::StoreUnavailable(format!(
                "unexpected PING reply: {}",
                pong
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn row(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_decode_absent_key() {
        let state = decode_state(&row(&[None, None, None]));
        assert_eq!(state, LockState::default());
    }

    #[test]
    fn test_decode_locked_key() {
        let state = decode_state(&row(&[Some("true"), Some("client-1"), Some("4")]));
        assert!(state.locked);
        assert_eq!(state.holder.as_deref(), Some("client-1"));
        assert_eq!(state.version, 4);
    }

    #[test]
    fn test_decode_released_key() {
        let state = decode_state(&row(&[Some("false"), Some(""), Some("2")]));
        assert!(!state.locked);
        assert_eq!(state.holder, None);
        assert_eq!(state.version, 2);
    }

    #[test]
    fn test_decode_garbage_falls_back_per_field() {
        let state = decode_state(&row(&[Some("yes"), Some("c"), Some("NaN")]));
        assert!(!state.locked);
        assert_eq!(state.holder.as_deref(), Some("c"));
        assert_eq!(state.version, INITIAL_VERSION);

        let state = decode_state(&row(&[Some("true")]));
        assert!(state.locked);
        assert_eq!(state.version, INITIAL_VERSION);
    }

    #[test]
    fn test_encode_state() {
        let fields = encode_state(&LockState::default().acquired("c1"));
        assert_eq!(fields[0], (FIELD_LOCKED, "true".to_string()));
        assert_eq!(fields[1], (FIELD_HOLDER, "c1".to_string()));
        assert_eq!(fields[2], (FIELD_VERSION, "1".to_string()));

        let fields = encode_state(&LockState::default().acquired("c1").released());
        assert_eq!(fields[1], (FIELD_HOLDER, String::new()));
        assert_eq!(fields[2], (FIELD_VERSION, "2".to_string()));
    }

    #[test]
    fn test_encode_decode_agree() {
        let state = LockState {
            locked: true,
            holder: Some("h".to_string()),
            version: 9,
        };
        let fields = encode_state(&state);
        let row: Vec<Option<String>> = fields.iter().map(|(_, v)| Some(v.clone())).collect();
        let decoded = decode_state(&row);
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_default_config() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert!(config.key_prefix.is_empty());
        assert_eq!(config.default_lease, Duration::from_millis(1000));
    }

    #[test]
    fn test_invalid_url_is_store_unavailable() {
        let config = RedisStoreConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        let result = RedisStateStore::new(&config);
        assert!(matches!(result, Err(LockError::StoreUnavailable(_))));
    }

    #[test]
    fn test_storage_key_prefix() {
        let config = RedisStoreConfig {
            key_prefix: "keyward:".to_string(),
            ..Default::default()
        };
        let store = RedisStateStore::new(&config).unwrap();
        assert_eq!(store.inner.storage_key("k1"), "keyward:k1");
    }

    fn live_config() -> RedisStoreConfig {
        let url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        RedisStoreConfig {
            url,
            key_prefix: format!("keyward-unit:{}:{}:", std::process::id(), nanos),
            default_lease: Duration::from_secs(10),
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|k| k.to_string()).collect()
    }

    /// Overwrite `key` from a second connection after the store has read it
    fn write_before_commit(store: &RedisStateStore, key: &str, state: LockState) {
        let client = store.inner.client.clone();
        let storage_key = store.inner.storage_key(key);
        *store.inner.before_commit.lock() = Some(Box::new(move || {
            let mut con = client.get_connection().unwrap();
            let mut cmd = redis::cmd("HSET");
            cmd.arg(&storage_key);
            for (field, value) in encode_state(&state) {
                cmd.arg(field).arg(value);
            }
            let _: () = cmd.query(&mut con).unwrap();
        }));
    }

    #[tokio::test]
    #[ignore = "requires running redis"]
    async fn test_lock_conflict_writes_nothing() {
        let store = RedisStateStore::new(&live_config()).unwrap();
        let taken = LockState::default().acquired("intruder");
        write_before_commit(&store, "k1", taken.clone());

        let result = store.lock("a", &keys(&["k1", "k2"]), None).await;
        assert_eq!(result, Err(LockError::Conflict));

        let states = store.states(&keys(&["k1", "k2"])).await.unwrap();
        assert_eq!(states, vec![taken, LockState::default()]);
        assert!(store.inner.timers.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires running redis"]
    async fn test_extension_conflicts_with_concurrent_expiry() {
        let store = RedisStateStore::new(&live_config()).unwrap();
        let tokens = store.lock("a", &keys(&["k"]), None).await.unwrap();

        // another instance expires the lease while the extension is in flight
        let expired = LockState::default().acquired("a").released();
        write_before_commit(&store, "k", expired.clone());

        let result = store.lock("a", &keys(&["k"]), None).await;
        assert_eq!(result, Err(LockError::Conflict));

        let states = store.states(&keys(&["k"])).await.unwrap();
        assert_eq!(states, vec![expired]);
        assert!(store.unlock("a", &tokens).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires running redis"]
    async fn test_unlock_conflict_releases_nothing() {
        let store = RedisStateStore::new(&live_config()).unwrap();
        let tokens = store.lock("a", &keys(&["k"]), None).await.unwrap();

        let relocked = LockState::default().acquired("a").released().acquired("b");
        write_before_commit(&store, "k", relocked.clone());

        let result = store.unlock("a", &tokens).await;
        assert_eq!(result, Err(LockError::Conflict));

        let states = store.states(&keys(&["k"])).await.unwrap();
        assert_eq!(states, vec![relocked]);
    }
}
