//! The persistence contract services are written against.

use async_trait::async_trait;

use crate::error::StoreError;

/// An entity with a natural key.
pub trait Record: Clone + Send + Sync + 'static {
    fn key(&self) -> &str;
}

#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Insert a new record. `Conflict` if the key is taken.
    async fn save(&self, record: &R) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<R>, StoreError>;

    /// Replace an existing record. `NotFound` if the key is absent.
    async fn update(&self, record: &R) -> Result<(), StoreError>;

    async fn get_all(&self) -> Result<Vec<R>, StoreError>;

    /// Remove a record. `NotFound` if the key is absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
