//! Fixtures shared by the unit tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use jiff::{Timestamp, ToSpan};
use tokio::sync::Barrier;
use uuid::Uuid;

use crate::{
    models::{project::Project, status::Status, user::Actor},
    services::{
        projects::{
            CreateProjectParameters, UpdateProjectStatusParameters, create_project, get_project,
            update_project_status,
        },
        tasks::{CreateTaskParameters, create_task},
    },
    storage::{
        BatchOperation, Collection, Document, DocumentStore, Filter, StorageError,
        memory::MemoryStore,
    },
};

pub fn lecturer() -> Actor {
    Actor::lecturer("l1")
}

pub fn student() -> Actor {
    Actor::student("s1")
}

/// "Essay", due in a week, assigned to `s1` by `l1`.
pub fn essay_parameters() -> CreateProjectParameters {
    CreateProjectParameters {
        title: String::from("Essay"),
        description: String::from("Write a 2000-word essay"),
        deadline: Timestamp::now().checked_add(168.hours()).unwrap(),
        assigned_to: vec![String::from("s1")],
    }
}

pub async fn new_essay<S: DocumentStore + ?Sized>(storage: &S) -> Project {
    create_project(storage, &lecturer(), essay_parameters())
        .await
        .unwrap()
}

/// Drives a project to Completed through the regular lifecycle.
pub async fn complete<S: DocumentStore + ?Sized>(storage: &S, project_id: Uuid) {
    let project = get_project(storage, project_id).await.unwrap();
    if project.status == Status::Pending {
        create_task(
            storage,
            &student(),
            CreateTaskParameters::new(project_id, "Kick-off"),
        )
        .await
        .unwrap();
    }
    update_project_status(
        storage,
        &lecturer(),
        UpdateProjectStatusParameters {
            project_id,
            status: Status::Completed,
        },
    )
    .await
    .unwrap();
}

/// Memory store that lets a test wedge other writers' work into the middle
/// of an operation.
#[derive(Default)]
pub struct InterleavingStore {
    pub inner: MemoryStore,
    next_batch: Mutex<Option<Vec<BatchOperation>>>,
    gate: Mutex<Option<Arc<Barrier>>>,
    gated_reads: AtomicUsize,
}

impl InterleavingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `operations` are committed right before the next batch runs.
    pub fn run_before_next_batch(&self, operations: Vec<BatchOperation>) {
        *self.next_batch.lock().unwrap() = Some(operations);
    }

    /// The next `readers` project reads each return only once all of them
    /// have read.
    pub fn gate_project_reads(&self, readers: usize) {
        *self.gate.lock().unwrap() = Some(Arc::new(Barrier::new(readers)));
        self.gated_reads.store(readers, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for InterleavingStore {
    async fn create_document(
        &self,
        collection: Collection,
        fields: Document,
    ) -> Result<Uuid, StorageError> {
        self.inner.create_document(collection, fields).await
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Document, StorageError> {
        let document = self.inner.get_document(collection, id).await;
        let gated = collection == Collection::Projects
            && self
                .gated_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if gated {
            let barrier = self.gate.lock().unwrap().clone();
            if let Some(barrier) = barrier {
                barrier.wait().await;
            }
        }
        document
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: Uuid,
        fields: Document,
    ) -> Result<(), StorageError> {
        self.inner.update_document(collection, id, fields).await
    }

    async fn query_documents(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Vec<Document>, StorageError> {
        self.inner.query_documents(collection, filters).await
    }

    async fn run_atomic_batch(
        &self,
        operations: Vec<BatchOperation>,
    ) -> Result<(), StorageError> {
        let interleaved = self.next_batch.lock().unwrap().take();
        if let Some(interleaved) = interleaved {
            self.inner.run_atomic_batch(interleaved).await.unwrap();
        }
        self.inner.run_atomic_batch(operations).await
    }
}
