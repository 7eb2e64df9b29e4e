//! In-process key-value store.
//!
//! All state sits behind one mutex. `commit` checks every precondition and
//! applies every mutation while holding the lock and without awaiting, so a
//! batch is either fully visible or not visible at all, and dropping the
//! caller's future can never interrupt it halfway.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::ports::{AtomicBatch, KeyValueStore, Mutation, Precondition, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, Vec<u8>>,
    sequences: HashMap<String, i64>,
}

/// Key-value store kept entirely in process memory.
///
/// Suitable for tests and single-process deployments; state is lost when
/// the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored entry, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the state lock is poisoned.
    pub fn snapshot(&self) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        Ok(self.lock()?.entries.clone())
    }

    /// Keys that start with `prefix`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the state lock is poisoned.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .entries
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }
}

fn holds(entries: &BTreeMap<String, Vec<u8>>, precondition: &Precondition) -> bool {
    match precondition {
        Precondition::Absent { key } => !entries.contains_key(key),
        Precondition::Equals { key, value } => entries.get(key) == Some(value),
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.entries.get(key).cloned())
    }

    async fn next_id(&self, sequence: &str) -> Result<i64, StoreError> {
        let mut state = self.lock()?;
        let counter = state.sequences.entry(sequence.to_owned()).or_insert(0);
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| StoreError::backend(format!("sequence {sequence} exhausted")))?;
        Ok(*counter)
    }

    async fn commit(&self, batch: AtomicBatch) -> Result<(), StoreError> {
        let (preconditions, mutations) = batch.into_parts();
        let mut state = self.lock()?;

        if let Some(failed) = preconditions
            .iter()
            .find(|precondition| !holds(&state.entries, precondition))
        {
            return Err(StoreError::precondition_failed(failed.key()));
        }

        for mutation in mutations {
            match mutation {
                Mutation::Put { key, value } => {
                    state.entries.insert(key, value);
                }
                Mutation::Delete { key } => {
                    state.entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}
