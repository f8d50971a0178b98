//! In-memory record store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::record::{Record, RecordStore};

/// Ordered map under a lock. Clones share the same map.
#[derive(Clone)]
pub struct MemoryStore<R> {
    records: Arc<RwLock<BTreeMap<String, R>>>,
}

impl<R> MemoryStore<R> {
    pub fn new() -> Self {
        Self { records: Arc::new(RwLock::new(BTreeMap::new())) }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn save(&self, record: &R) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if records.contains_key(record.key()) {
            return Err(StoreError::Conflict(record.key().to_string()));
        }
        records.insert(record.key().to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<R>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn update(&self, record: &R) -> Result<(), StoreError> {
        match self.records.write().get_mut(record.key()) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.key().to_string())),
        }
    }

    async fn get_all(&self) -> Result<Vec<R>, StoreError> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
