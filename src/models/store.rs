use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::storage::{BatchOperation, Collection, Document, Filter, StorageError};

/// Current schema version
pub const CURRENT_VERSION: u32 = 1;

/// Fields the store owns; callers cannot overwrite them through updates.
const RESERVED_FIELDS: [&str; 2] = ["id", "createdAt"];

/// Every document of both collections, keyed by id. This is the unit a
/// store adapter loads, mutates and writes back.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Store {
    pub version: u32,
    pub projects: BTreeMap<Uuid, Document>,
    pub tasks: BTreeMap<Uuid, Document>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            projects: BTreeMap::new(),
            tasks: BTreeMap::new(),
        }
    }
}

impl Store {
    pub fn documents(&self, collection: Collection) -> &BTreeMap<Uuid, Document> {
        match collection {
            Collection::Projects => &self.projects,
            Collection::Tasks => &self.tasks,
        }
    }

    fn documents_mut(&mut self, collection: Collection) -> &mut BTreeMap<Uuid, Document> {
        match collection {
            Collection::Projects => &mut self.projects,
            Collection::Tasks => &mut self.tasks,
        }
    }

    pub fn get(&self, collection: Collection, id: Uuid) -> Result<&Document, StorageError> {
        self.documents(collection)
            .get(&id)
            .ok_or(StorageError::NotFound { collection, id })
    }

    pub fn insert(
        &mut self,
        collection: Collection,
        id: Uuid,
        mut fields: Document,
        now: Timestamp,
    ) {
        let stamp = Value::String(now.to_string());
        fields.insert("id".to_string(), Value::String(id.to_string()));
        fields.insert("createdAt".to_string(), stamp.clone());
        fields.insert("updatedAt".to_string(), stamp);
        self.documents_mut(collection).insert(id, fields);
    }

    pub fn merge(
        &mut self,
        collection: Collection,
        id: Uuid,
        fields: Document,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        let document = self
            .documents_mut(collection)
            .get_mut(&id)
            .ok_or(StorageError::NotFound { collection, id })?;

        for (key, value) in fields {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            document.insert(key, value);
        }
        document.insert("updatedAt".to_string(), Value::String(now.to_string()));
        Ok(())
    }

    pub fn remove(&mut self, collection: Collection, id: Uuid) -> Option<Document> {
        self.documents_mut(collection).remove(&id)
    }

    /// Documents matching every filter, ordered by creation time then id.
    pub fn query(&self, collection: Collection, filters: &[Filter]) -> Vec<Document> {
        let mut matching: Vec<(Option<Timestamp>, Uuid, &Document)> = self
            .documents(collection)
            .iter()
            .filter(|(_, document)| filters.iter().all(|filter| filter.matches(document)))
            .map(|(id, document)| (created_at(document), *id, document))
            .collect();

        matching.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        matching
            .into_iter()
            .map(|(_, _, document)| document.clone())
            .collect()
    }

    /// Apply every operation or none of them.
    pub fn apply_batch(
        &mut self,
        operations: Vec<BatchOperation>,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        let mut staged = self.clone();
        for operation in operations {
            match operation {
                BatchOperation::Create {
                    collection,
                    id,
                    fields,
                } => staged.insert(collection, id, fields, now),
                BatchOperation::Update {
                    collection,
                    id,
                    fields,
                    precondition,
                } => {
                    let current = staged.get(collection, id)?;
                    if precondition.is_some_and(|filter| !filter.matches(current)) {
                        return Err(StorageError::Conflict { collection, id });
                    }
                    staged.merge(collection, id, fields, now)?;
                }
                BatchOperation::Delete { collection, id } => {
                    staged.remove(collection, id);
                }
            }
        }
        *self = staged;
        Ok(())
    }
}

fn created_at(document: &Document) -> Option<Timestamp> {
    document
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}
