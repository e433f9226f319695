use glob_match::glob_match;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::commands::CommandError;
use crate::value::{Data, Hash, List, Set, Value};
use crate::zset::SortedSet;

pub const DATABASES: usize = 16;

/// The Store holds every database together with the runtime configuration behind a single lock.
/// Commands run one at a time while holding it, which is what makes multi-key commands atomic.
/// The store is cheap to clone and can be shared across connections.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<State>>,
}

impl Store {
    pub fn new() -> Store {
        Store {
            inner: Arc::new(Mutex::new(State::new())),
        }
    }

    /// A command that panicked must not take the server down with it, so a poisoned lock is
    /// recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

pub struct State {
    dbs: Vec<Db>,
    config: RuntimeConfig,
}

impl State {
    fn new() -> State {
        State {
            dbs: (0..DATABASES).map(|_| Db::default()).collect(),
            config: RuntimeConfig::default(),
        }
    }

    pub fn db(&mut self, index: usize) -> Result<&mut Db, CommandError> {
        self.dbs
            .get_mut(index)
            .ok_or(CommandError::InvalidDbIndex)
    }

    /// Two distinct databases borrowed at once, as needed by `MOVE` and `COPY ... DB`.
    pub fn db_pair(&mut self, a: usize, b: usize) -> Result<(&mut Db, &mut Db), CommandError> {
        if a == b || a >= DATABASES || b >= DATABASES {
            return Err(CommandError::InvalidDbIndex);
        }
        if a < b {
            let (left, right) = self.dbs.split_at_mut(b);
            Ok((&mut left[a], &mut right[0]))
        } else {
            let (left, right) = self.dbs.split_at_mut(a);
            Ok((&mut right[0], &mut left[b]))
        }
    }

    pub fn swap(&mut self, a: usize, b: usize) -> Result<(), CommandError> {
        if a >= DATABASES || b >= DATABASES {
            return Err(CommandError::InvalidDbIndex);
        }
        self.dbs.swap(a, b);
        Ok(())
    }

    pub fn flush_all(&mut self) {
        for db in &mut self.dbs {
            db.clear();
        }
    }

    /// Databases holding at least one live key, with their key and expiring-key counts.
    pub fn keyspace(&mut self) -> Vec<(usize, usize, usize)> {
        self.dbs
            .iter_mut()
            .enumerate()
            .filter_map(|(index, db)| {
                let keys = db.len();
                (keys > 0).then(|| (index, keys, db.expiring()))
            })
            .collect()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }
}

/// A single key namespace. Every accessor drops keys whose expiry has passed before looking at
/// them, so callers never observe an expired key.
#[derive(Default)]
pub struct Db {
    keys: HashMap<String, Value>,
}

impl Db {
    fn purge(&mut self, key: &str) {
        let now = now_millis();
        if self.keys.get(key).is_some_and(|v| v.is_expired(now)) {
            self.keys.remove(key);
        }
    }

    fn purge_all(&mut self) {
        let now = now_millis();
        self.keys.retain(|_, value| !value.is_expired(now));
    }

    pub fn get(&mut self, key: &str) -> Option<&Value> {
        self.purge(key);
        self.keys.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.purge(key);
        self.keys.get_mut(key)
    }

    pub fn insert(&mut self, key: String, value: Value) -> Option<Value> {
        let now = now_millis();
        self.keys
            .insert(key, value)
            .filter(|previous| !previous.is_expired(now))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.purge(key);
        self.keys.remove(key)
    }

    pub fn contains(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&mut self) -> usize {
        self.purge_all();
        self.keys.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn expiring(&self) -> usize {
        self.keys.values().filter(|v| v.expires_at.is_some()).count()
    }

    pub fn keys(&mut self) -> Vec<String> {
        self.purge_all();
        self.keys.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Atomic read-modify-write of one key.
    ///
    /// `f` receives the current value, or `None` when the key is absent, and leaves behind the
    /// next value. Leaving `None`, or a container without elements, deletes the key. Handlers
    /// validate their input before mutating so an error leaves the key as it was.
    pub fn compute<R>(
        &mut self,
        key: &str,
        f: impl FnOnce(&mut Option<Value>) -> crate::Result<R>,
    ) -> crate::Result<R> {
        let now = now_millis();
        let mut slot = self.keys.remove(key).filter(|v| !v.is_expired(now));

        let result = f(&mut slot);

        if let Some(value) = slot {
            if !value.is_empty_container() {
                self.keys.insert(key.to_string(), value);
            }
        }

        result
    }

    /// Runs `f` against the container stored at `key`, creating an empty one when the key is
    /// absent. A container left empty by `f` is removed.
    pub fn modify<C, R>(
        &mut self,
        key: &str,
        f: impl FnOnce(&mut C) -> crate::Result<R>,
    ) -> crate::Result<R>
    where
        C: Container,
    {
        self.compute(key, |slot| {
            let value = slot.get_or_insert_with(|| Value::new(C::default().into_data()));
            f(C::from_value_mut(value)?)
        })
    }

    /// Like [`Db::modify`] but never creates the key; returns `None` when it does not exist.
    pub fn modify_existing<C, R>(
        &mut self,
        key: &str,
        f: impl FnOnce(&mut C) -> crate::Result<R>,
    ) -> crate::Result<Option<R>>
    where
        C: Container,
    {
        self.compute(key, |slot| match slot {
            Some(value) => f(C::from_value_mut(value)?).map(Some),
            None => Ok(None),
        })
    }

    /// Read only access to the container at `key`. Absent keys read as `None`, keys of another
    /// type as a WRONGTYPE error.
    pub fn read<C: Container>(&mut self, key: &str) -> Result<Option<&C>, CommandError> {
        match self.get(key) {
            Some(value) => C::from_value(value).map(Some),
            None => Ok(None),
        }
    }
}

/// A value variant holding a collection of elements.
pub trait Container: Default {
    fn into_data(self) -> Data;
    fn from_value(value: &Value) -> Result<&Self, CommandError>;
    fn from_value_mut(value: &mut Value) -> Result<&mut Self, CommandError>;
}

macro_rules! container {
    ($ty:ty, $variant:ident, $get:ident, $get_mut:ident) => {
        impl Container for $ty {
            fn into_data(self) -> Data {
                Data::$variant(self)
            }

            fn from_value(value: &Value) -> Result<&Self, CommandError> {
                value.$get()
            }

            fn from_value_mut(value: &mut Value) -> Result<&mut Self, CommandError> {
                value.$get_mut()
            }
        }
    };
}

container!(List, List, as_list, as_list_mut);
container!(Hash, Hash, as_hash, as_hash_mut);
container!(Set, Set, as_set, as_set_mut);
container!(SortedSet, ZSet, as_zset, as_zset_mut);

/// String keyed runtime settings read and written by `CONFIG GET` / `CONFIG SET`. Names are
/// case-insensitive and stored lowercase.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    entries: HashMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let entries = [
            ("save", ""),
            ("appendonly", "no"),
            ("databases", "16"),
            ("port", "6379"),
            ("bind", "127.0.0.1"),
            ("maxclients", "10000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        RuntimeConfig { entries }
    }
}

impl RuntimeConfig {
    /// Entries whose name matches the glob `pattern`, sorted by name.
    pub fn get(&self, pattern: &str) -> Vec<(String, String)> {
        let pattern = pattern.to_lowercase();
        let mut matches: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|(name, _)| glob_match(&pattern, name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        matches.sort();
        matches
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.entries.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), CommandError> {
        let name = name.to_lowercase();
        match self.entries.get_mut(&name) {
            Some(entry) => {
                *entry = value.to_string();
                Ok(())
            }
            None => Err(CommandError::Custom(format!(
                "ERR Unknown option or number of arguments for CONFIG SET - '{}'",
                name
            ))),
        }
    }
}

/// Wall clock in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
