//! In-memory connection implementation.
//!
//! [`MemoryConnection`] implements [`KeyspaceConnection`] over a process-local
//! map so the client's prefixing and fallback logic can be exercised without
//! a running store.
//!
//! # Features
//!
//! - **Thread-safe**: [`parking_lot::RwLock`] around the data
//! - **Redis semantics**: strings, counters, lists and hashes, `WRONGTYPE` errors, glob `KEYS`,
//!   `TTL` replies of `-2`/`-1`
//! - **TTL support**: expiry is checked lazily on access against [`tokio::time::Instant`], so
//!   tests can drive it with a paused clock
//! - **Outage simulation**: [`set_available(false)`](MemoryConnection::set_available) makes every
//!   command fail with a connection error; [`set_loading(true)`](MemoryConnection::set_loading)
//!   makes it answer `LOADING` like a server still restoring its dataset
//! - **Call counting**: per-command counters reveal which connection served a read
//!
//! # Sharing Data
//!
//! Clones share everything. [`with_role`](MemoryConnection::with_role) shares
//! only the data, giving a second handle with its own role, availability
//! switch and counters; that is how a replica that mirrors the primary is
//! modelled. Two independent [`MemoryConnection::new`] handles model a replica
//! that has not caught up.
//!
//! # Example
//!
//! ```
//! use keyspace_common::{ConnectionRole, KeyspaceConnection, MemoryConnection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let primary = MemoryConnection::new(ConnectionRole::Primary);
//!     let replica = primary.with_role(ConnectionRole::Replica);
//!
//!     primary.set("DEV|SE|greeting", "hello").await.unwrap();
//!     assert_eq!(replica.get("DEV|SE|greeting").await.unwrap().as_deref(), Some("hello"));
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::{
    connection::{ConnectionRole, KeyspaceConnection},
    error::{KeyspaceError, KeyspaceResult},
    glob,
};

const NOT_AN_INTEGER: &str = "ERR value is not an integer or out of range";
const HASH_NOT_AN_INTEGER: &str = "ERR hash value is not an integer";
const OVERFLOW: &str = "ERR increment or decrement would overflow";

#[derive(Debug, Clone)]
enum Value {
    String(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self { value, expires_at: None }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

type Data = BTreeMap<String, Entry>;

/// In-memory implementation of [`KeyspaceConnection`].
#[derive(Clone)]
pub struct MemoryConnection {
    role: ConnectionRole,
    data: Arc<RwLock<Data>>,
    available: Arc<AtomicBool>,
    loading: Arc<AtomicBool>,
    calls: Arc<Mutex<HashMap<&'static str, u64>>>,
}

impl MemoryConnection {
    /// Creates a connection over a fresh, empty store.
    #[must_use]
    pub fn new(role: ConnectionRole) -> Self {
        Self {
            role,
            data: Arc::new(RwLock::new(BTreeMap::new())),
            available: Arc::new(AtomicBool::new(true)),
            loading: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a handle over the same data with its own role, availability
    /// switch and call counters.
    #[must_use]
    pub fn with_role(&self, role: ConnectionRole) -> Self {
        Self {
            role,
            data: Arc::clone(&self.data),
            available: Arc::new(AtomicBool::new(true)),
            loading: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Simulates the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Simulates the store restoring its dataset (`true`) or having finished
    /// (`false`). While loading, commands fail with
    /// [`KeyspaceError::Unavailable`].
    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
    }

    /// Returns whether commands currently succeed.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of times `command` (e.g. `"GET"`) was issued on this handle,
    /// including attempts that failed because the handle was unavailable.
    #[must_use]
    pub fn calls(&self, command: &str) -> u64 {
        self.calls.lock().get(command).copied().unwrap_or(0)
    }

    /// Total commands issued on this handle.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.calls.lock().values().sum()
    }

    /// Zeroes the call counters of this handle.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Number of live keys in the underlying store.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.read().values().filter(|entry| entry.is_live(now)).count()
    }

    /// Returns `true` if the underlying store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts the command and fails it if the handle is down or loading.
    fn begin(&self, command: &'static str) -> KeyspaceResult<()> {
        *self.calls.lock().entry(command).or_insert(0) += 1;
        if !self.is_available() {
            return Err(KeyspaceError::connection(format!(
                "{} memory connection unavailable ({command})",
                self.role
            )));
        }
        if self.loading.load(Ordering::SeqCst) {
            return Err(KeyspaceError::unavailable(
                "LOADING Redis is loading the dataset in memory",
            ));
        }
        Ok(())
    }

    /// Runs `f` on the live entry for `key`, if any.
    fn read<T>(&self, key: &str, f: impl FnOnce(Option<&Value>) -> T) -> T {
        let now = Instant::now();
        let data = self.data.read();
        f(data.get(key).filter(|entry| entry.is_live(now)).map(|entry| &entry.value))
    }

    /// Runs `f` with exclusive access after dropping `key` if it has expired.
    fn write<T>(&self, key: &str, f: impl FnOnce(&mut Data) -> T) -> T {
        let now = Instant::now();
        let mut data = self.data.write();
        if data.get(key).is_some_and(|entry| !entry.is_live(now)) {
            data.remove(key);
        }
        f(&mut data)
    }

    fn add_to_counter(&self, key: &str, delta: i64) -> KeyspaceResult<i64> {
        self.write(key, |data| {
            let entry = data
                .entry(key.to_owned())
                .or_insert_with(|| Entry::persistent(Value::String("0".to_owned())));
            let Value::String(current) = &mut entry.value else {
                return Err(KeyspaceError::wrong_type(key));
            };
            let parsed: i64 = current.parse().map_err(|_| KeyspaceError::command(NOT_AN_INTEGER))?;
            let next = parsed.checked_add(delta).ok_or_else(|| KeyspaceError::command(OVERFLOW))?;
            *current = next.to_string();
            Ok(next)
        })
    }
}

/// Resolves an inclusive `[start, stop]` range with negative indexes into a
/// half-open slice range over a list of `len` elements.
fn list_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()? + 1))
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new(ConnectionRole::Primary)
    }
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("role", &self.role)
            .field("available", &self.is_available())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyspaceConnection for MemoryConnection {
    fn role(&self) -> ConnectionRole {
        self.role
    }

    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> KeyspaceResult<Option<String>> {
        self.begin("GET")?;
        self.read(key, |value| match value {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(KeyspaceError::wrong_type(key)),
        })
    }

    async fn set(&self, key: &str, value: &str) -> KeyspaceResult<()> {
        self.begin("SET")?;
        self.write(key, |data| {
            data.insert(key.to_owned(), Entry::persistent(Value::String(value.to_owned())));
        });
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KeyspaceResult<()> {
        self.begin("SETEX")?;
        if ttl_secs == 0 {
            return Err(KeyspaceError::command("ERR invalid expire time in 'setex' command"));
        }
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        self.write(key, |data| {
            data.insert(
                key.to_owned(),
                Entry { value: Value::String(value.to_owned()), expires_at: Some(expires_at) },
            );
        });
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> KeyspaceResult<Vec<String>> {
        self.begin("KEYS")?;
        let now = Instant::now();
        let data = self.data.read();
        Ok(data
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob::matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn del(&self, key: &str) -> KeyspaceResult<u64> {
        self.begin("DEL")?;
        Ok(self.write(key, |data| u64::from(data.remove(key).is_some())))
    }

    async fn lpush(&self, key: &str, value: &str) -> KeyspaceResult<i64> {
        self.begin("LPUSH")?;
        self.write(key, |data| {
            let entry = data
                .entry(key.to_owned())
                .or_insert_with(|| Entry::persistent(Value::List(VecDeque::new())));
            let Value::List(list) = &mut entry.value else {
                return Err(KeyspaceError::wrong_type(key));
            };
            list.push_front(value.to_owned());
            Ok(i64::try_from(list.len()).unwrap_or(i64::MAX))
        })
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> KeyspaceResult<i64> {
        self.begin("LREM")?;
        self.write(key, |data| {
            let Some(entry) = data.get_mut(key) else {
                return Ok(0);
            };
            let Value::List(list) = &mut entry.value else {
                return Err(KeyspaceError::wrong_type(key));
            };

            let limit = match count {
                0 => usize::MAX,
                _ => usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX),
            };
            let positions: Vec<usize> = if count < 0 {
                list.iter().enumerate().rev().filter(|(_, v)| *v == value).map(|(i, _)| i).collect()
            } else {
                list.iter().enumerate().filter(|(_, v)| *v == value).map(|(i, _)| i).collect()
            };

            let mut doomed: Vec<usize> = positions.into_iter().take(limit).collect();
            doomed.sort_unstable_by(|a, b| b.cmp(a));
            for index in &doomed {
                list.remove(*index);
            }
            if list.is_empty() {
                data.remove(key);
            }
            Ok(i64::try_from(doomed.len()).unwrap_or(i64::MAX))
        })
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> KeyspaceResult<Vec<String>> {
        self.begin("LRANGE")?;
        self.read(key, |value| match value {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(list_bounds(list.len(), start, stop)
                .map(|(from, to)| list.range(from..to).cloned().collect())
                .unwrap_or_default()),
            Some(_) => Err(KeyspaceError::wrong_type(key)),
        })
    }

    async fn incr_by(&self, key: &str, delta: i64) -> KeyspaceResult<i64> {
        self.begin("INCRBY")?;
        self.add_to_counter(key, delta)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> KeyspaceResult<i64> {
        self.begin("DECRBY")?;
        let delta = delta.checked_neg().ok_or_else(|| KeyspaceError::command(OVERFLOW))?;
        self.add_to_counter(key, delta)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> KeyspaceResult<i64> {
        self.begin("HSET")?;
        self.write(key, |data| {
            let entry = data
                .entry(key.to_owned())
                .or_insert_with(|| Entry::persistent(Value::Hash(HashMap::new())));
            let Value::Hash(hash) = &mut entry.value else {
                return Err(KeyspaceError::wrong_type(key));
            };
            Ok(i64::from(hash.insert(field.to_owned(), value.to_owned()).is_none()))
        })
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> KeyspaceResult<i64> {
        self.begin("HINCRBY")?;
        self.write(key, |data| {
            let entry = data
                .entry(key.to_owned())
                .or_insert_with(|| Entry::persistent(Value::Hash(HashMap::new())));
            let Value::Hash(hash) = &mut entry.value else {
                return Err(KeyspaceError::wrong_type(key));
            };
            let current = hash.entry(field.to_owned()).or_insert_with(|| "0".to_owned());
            let parsed: i64 =
                current.parse().map_err(|_| KeyspaceError::command(HASH_NOT_AN_INTEGER))?;
            let next = parsed.checked_add(delta).ok_or_else(|| KeyspaceError::command(OVERFLOW))?;
            *current = next.to_string();
            Ok(next)
        })
    }

    async fn hdel(&self, key: &str, field: &str) -> KeyspaceResult<i64> {
        self.begin("HDEL")?;
        self.write(key, |data| {
            let Some(entry) = data.get_mut(key) else {
                return Ok(0);
            };
            let Value::Hash(hash) = &mut entry.value else {
                return Err(KeyspaceError::wrong_type(key));
            };
            let removed = i64::from(hash.remove(field).is_some());
            if hash.is_empty() {
                data.remove(key);
            }
            Ok(removed)
        })
    }

    async fn hgetall(&self, key: &str) -> KeyspaceResult<HashMap<String, String>> {
        self.begin("HGETALL")?;
        self.read(key, |value| match value {
            None => Ok(HashMap::new()),
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(KeyspaceError::wrong_type(key)),
        })
    }

    async fn ttl(&self, key: &str) -> KeyspaceResult<i64> {
        self.begin("TTL")?;
        let now = Instant::now();
        let data = self.data.read();
        Ok(match data.get(key).filter(|entry| entry.is_live(now)) {
            None => -2,
            Some(Entry { expires_at: None, .. }) => -1,
            Some(Entry { expires_at: Some(at), .. }) => {
                let remaining_ms = at.saturating_duration_since(now).as_millis();
                i64::try_from((remaining_ms + 500) / 1000).unwrap_or(i64::MAX)
            },
        })
    }

    async fn ping(&self) -> KeyspaceResult<()> {
        self.begin("PING")
    }
}
