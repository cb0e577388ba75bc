//! The concurrent, string-indexed keyspace.
//!
//! A table-level `RwLock` guards insertion, deletion, and lookup of entry
//! references; each entry then carries its own `RwLock<Value>` so that
//! reads and read-modify-write operations on distinct keys never contend on
//! the table lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::EngineError;
use crate::value::Value;

struct Entry {
    value: RwLock<Value>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Entry {
            value: RwLock::new(value),
        }
    }
}

pub struct Keyspace {
    table: RwLock<HashMap<String, Arc<Entry>>>,
}

impl Keyspace {
    pub fn new() -> Self {
        Keyspace {
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Shared read of the entry's current value.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entry = {
            let table = self.table.read().expect("keyspace table lock poisoned");
            table.get(key).cloned()
        }?;
        let value = entry.value.read().expect("entry lock poisoned").clone();
        Some(value)
    }

    /// Present and holding a non-nil value.
    pub fn has(&self, key: &str) -> bool {
        match self.get(key) {
            Some(v) => !v.is_nil(),
            None => false,
        }
    }

    /// Creates the entry if absent, otherwise overwrites it in place.
    pub fn set(&self, key: &str, value: Value) {
        {
            let table = self.table.read().expect("keyspace table lock poisoned");
            if let Some(entry) = table.get(key) {
                *entry.value.write().expect("entry lock poisoned") = value;
                return;
            }
        }

        let mut table = self.table.write().expect("keyspace table lock poisoned");
        match table.get(key) {
            Some(entry) => *entry.value.write().expect("entry lock poisoned") = value,
            None => {
                table.insert(key.to_string(), Arc::new(Entry::new(value)));
            }
        }
    }

    pub fn delete(&self, key: &str) {
        self.table
            .write()
            .expect("keyspace table lock poisoned")
            .remove(key);
    }

    /// If `key` is absent, installs `f(None)` as its value (invoking `f`
    /// exactly once). Otherwise replaces the stored value with
    /// `f(Some(current))`, with `f` running under the entry's exclusive
    /// lock so read-modify-write sequences on the same key are linearizable.
    pub fn map<F>(&self, key: &str, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(Option<&Value>) -> Result<Value, EngineError>,
    {
        let existing = {
            let table = self.table.read().expect("keyspace table lock poisoned");
            table.get(key).cloned()
        };

        if let Some(entry) = existing {
            let mut guard = entry.value.write().expect("entry lock poisoned");
            let next = f(Some(&guard))?;
            *guard = next;
            return Ok(());
        }

        // Cold path: re-check under the table write lock so a concurrent
        // `map` on the same fresh key cannot install the value twice.
        let mut table = self.table.write().expect("keyspace table lock poisoned");
        match table.get(key) {
            Some(entry) => {
                let mut guard = entry.value.write().expect("entry lock poisoned");
                let next = f(Some(&guard))?;
                *guard = next;
            }
            None => {
                let next = f(None)?;
                table.insert(key.to_string(), Arc::new(Entry::new(next)));
            }
        }
        Ok(())
    }

    /// If `key` is absent, installs `ctor()` as its value. Either way, runs
    /// `g` against the (now-guaranteed-present) stored value under the
    /// entry's exclusive lock and returns `g`'s result.
    pub fn mutate<C, G>(&self, key: &str, ctor: C, g: G) -> Result<Value, EngineError>
    where
        C: FnOnce() -> Value,
        G: FnOnce(&mut Value) -> Result<Value, EngineError>,
    {
        let existing = {
            let table = self.table.read().expect("keyspace table lock poisoned");
            table.get(key).cloned()
        };

        let entry = match existing {
            Some(entry) => entry,
            None => {
                let mut table = self.table.write().expect("keyspace table lock poisoned");
                table
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Entry::new(ctor())))
                    .clone()
            }
        };

        let mut guard = entry.value.write().expect("entry lock poisoned");
        g(&mut guard)
    }

    /// A snapshot of every (key, value) pair, used only by persistence.
    /// Holds the table lock for the whole call, stalling writers — fine
    /// because SAVE is infrequent.
    pub fn iter(&self) -> Vec<(String, Value)> {
        let table = self.table.read().expect("keyspace table lock poisoned");
        table
            .iter()
            .map(|(k, entry)| {
                let v = entry.value.read().expect("entry lock poisoned").clone();
                (k.clone(), v)
            })
            .collect()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}
