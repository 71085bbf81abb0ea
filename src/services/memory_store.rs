use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::services::store::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local store for single-node deployments and tests
///
/// Every operation runs under one mutex, which makes the compound
/// operations (`set_nx_ex`, `compare_and_delete`) trivially atomic. Expired
/// keys are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the backend were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| entries.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::Unavailable(format!("WRONGTYPE operation against key {}", key))
    }
}

fn expiry(ttl_secs: u64) -> Option<Instant> {
    Some(Instant::now() + Duration::from_secs(ttl_secs.max(1)))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        match Self::live(&mut entries, key, Instant::now()) {
            Some(Entry { value: Value::Text(text), .. }) => Ok(Some(text.clone())),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        Ok(keys
            .iter()
            .map(|key| match Self::live(&mut entries, key, now) {
                Some(Entry { value: Value::Text(text), .. }) => Some(text.clone()),
                _ => None,
            })
            .collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: expiry(ttl_secs),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        if Self::live(&mut entries, key, Instant::now()).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: expiry(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        let matches = matches!(
            Self::live(&mut entries, key, Instant::now()),
            Some(Entry { value: Value::Text(text), .. }) if text.as_str() == expected
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let mut deleted = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired(now) {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        match Self::live(&mut entries, key, Instant::now()) {
            Some(entry) => {
                entry.expires_at = expiry(ttl_secs);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        if Self::live(&mut entries, key, now).is_none() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Set(BTreeSet::new()),
                    expires_at: None,
                },
            );
        }
        match entries.get_mut(key) {
            Some(Entry { value: Value::Set(set), .. }) => {
                Ok(members.iter().filter(|m| set.insert((*m).clone())).count() as u64)
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        let (removed, now_empty) = match Self::live(&mut entries, key, Instant::now()) {
            Some(Entry { value: Value::Set(set), .. }) => {
                let removed = members.iter().filter(|m| set.remove(m.as_str())).count() as u64;
                (removed, set.is_empty())
            }
            Some(_) => return Err(Self::wrong_type(key)),
            None => return Ok(0),
        };
        // Redis drops a set once its last member goes.
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.lock()?;
        match Self::live(&mut entries, key, Instant::now()) {
            Some(Entry { value: Value::Set(set), .. }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        match Self::live(&mut entries, key, Instant::now()) {
            Some(Entry { value: Value::Set(set), .. }) => Ok(set.contains(member)),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(false),
        }
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        match Self::live(&mut entries, key, Instant::now()) {
            Some(Entry { value: Value::Set(set), .. }) => Ok(set.len() as u64),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
