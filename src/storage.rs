use std::{fmt, path::PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorKind;

pub mod json;
pub mod memory;
pub mod migrations;

/// A stored record: a JSON object whose `id`, `createdAt` and `updatedAt`
/// fields are owned by the store.
pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Projects,
    Tasks,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Tasks => "tasks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Equals(String, Value),
    /// `field` is an array holding `value`
    ArrayContains(String, Value),
}

impl Filter {
    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        Filter::Equals(field.to_string(), value.into())
    }

    pub fn array_contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::ArrayContains(field.to_string(), value.into())
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::Equals(field, value) => document.get(field) == Some(value),
            Filter::ArrayContains(field, value) => document
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    Create {
        collection: Collection,
        id: Uuid,
        fields: Document,
    },
    /// Merge `fields` into an existing document. When `precondition` is set
    /// and the stored document does not match it, the batch fails with
    /// [`StorageError::Conflict`].
    Update {
        collection: Collection,
        id: Uuid,
        fields: Document,
        precondition: Option<Filter>,
    },
    Delete {
        collection: Collection,
        id: Uuid,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Document '{id}' not found in '{collection}'")]
    NotFound { collection: Collection, id: Uuid },

    #[error("Document '{id}' in '{collection}' changed while the batch was prepared")]
    Conflict { collection: Collection, id: Uuid },

    #[error("Document '{id}' in '{collection}' is malformed: {source}")]
    DecodeFailed {
        collection: Collection,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Fields must serialize to a JSON object")]
    NotAnObject,

    #[error("Failed to load store from '{path}': {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON from '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store file has a malformed version field: {0}")]
    InvalidVersion(String),

    #[error("Failed to save store to '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize to JSON: {source}")]
    SerializeFailed {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create backup at '{path}': {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to cleanup old backups in '{dir}': {source}")]
    CleanupFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Store file was created by a newer version of classwork (version {0}). Please upgrade classwork to open this file."
    )]
    FutureVersion(u32),

    #[error(
        "Store file has unsupported version {0}. This version of classwork cannot read this file."
    )]
    UnsupportedVersion(u32),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::NotAnObject => ErrorKind::ValidationFailure,
            StorageError::Conflict { .. }
            | StorageError::DecodeFailed { .. }
            | StorageError::LoadFailed { .. }
            | StorageError::ParseFailed { .. }
            | StorageError::InvalidVersion(_)
            | StorageError::SaveFailed { .. }
            | StorageError::SerializeFailed { .. }
            | StorageError::BackupFailed { .. }
            | StorageError::CleanupFailed { .. }
            | StorageError::FutureVersion(_)
            | StorageError::UnsupportedVersion(_) => ErrorKind::TransportFailure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

/// Persistence gateway over the `projects` and `tasks` collections.
///
/// Stores assign document ids and the `createdAt`/`updatedAt` timestamps.
/// [`DocumentStore::run_atomic_batch`] is the only multi-document primitive:
/// every operation in the batch commits or none does. An `Update` against a
/// missing document fails the whole batch; a `Delete` of a missing document
/// is a no-op.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reserve an id for a document created later inside a batch.
    fn new_document_id(&self) -> Uuid {
        Uuid::new_v4()
    }

    async fn create_document(
        &self,
        collection: Collection,
        fields: Document,
    ) -> Result<Uuid, StorageError>;

    async fn get_document(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Document, StorageError>;

    /// Merge `fields` into an existing document.
    async fn update_document(
        &self,
        collection: Collection,
        id: Uuid,
        fields: Document,
    ) -> Result<(), StorageError>;

    /// Documents matching every filter, oldest first.
    async fn query_documents(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Vec<Document>, StorageError>;

    async fn run_atomic_batch(&self, operations: Vec<BatchOperation>)
    -> Result<(), StorageError>;
}

/// Serialize a value into the field map of a document.
pub fn to_document(value: &impl Serialize) -> Result<Document, StorageError> {
    let value =
        serde_json::to_value(value).map_err(|e| StorageError::SerializeFailed { source: e })?;
    match value {
        Value::Object(fields) => Ok(fields),
        _ => Err(StorageError::NotAnObject),
    }
}

/// Decode a stored document into an entity. Unknown enum values (status,
/// role) are rejected here rather than where they are used.
pub fn from_document<T: DeserializeOwned>(
    collection: Collection,
    document: Document,
) -> Result<T, StorageError> {
    let id = document
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string();
    serde_json::from_value(Value::Object(document)).map_err(|e| StorageError::DecodeFailed {
        collection,
        id,
        source: e,
    })
}
