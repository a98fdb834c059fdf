use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    models::store::Store,
    storage::{BatchOperation, Collection, Document, DocumentStore, Filter, StorageError},
};

/// Process-local store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    store: Mutex<Store>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Store {
        self.store.lock().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(
        &self,
        collection: Collection,
        fields: Document,
    ) -> Result<Uuid, StorageError> {
        let id = self.new_document_id();
        self.store
            .lock()
            .await
            .insert(collection, id, fields, Timestamp::now());
        Ok(id)
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Document, StorageError> {
        self.store.lock().await.get(collection, id).cloned()
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: Uuid,
        fields: Document,
    ) -> Result<(), StorageError> {
        self.store
            .lock()
            .await
            .merge(collection, id, fields, Timestamp::now())
    }

    async fn query_documents(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Vec<Document>, StorageError> {
        Ok(self.store.lock().await.query(collection, filters))
    }

    async fn run_atomic_batch(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        self.store
            .lock()
            .await
            .apply_batch(operations, Timestamp::now())
    }
}
