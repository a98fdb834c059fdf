use std::{
    fs::{self, File, OpenOptions, rename, write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use fs2::FileExt;
use jiff::Timestamp;
use serde_json::to_string_pretty;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{
    models::store::{CURRENT_VERSION, Store},
    storage::{
        BatchOperation, Collection, Document, DocumentStore, Filter, StorageError,
        migrations::{apply_migrations, detect_version},
    },
};

const KEPT_BACKUPS: usize = 5;

/// Keeps every document in one JSON file. Each write rewrites the whole file
/// through a temp file and a rename, so a batch becomes visible to readers all
/// at once.
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process; the file lock
    /// covers other processes.
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Store, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Store::default()),
            Err(e) => {
                return Err(StorageError::LoadFailed {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let mut data: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| StorageError::ParseFailed {
                path: self.path.clone(),
                source: e,
            })?;

        let file_version = detect_version(&data)?;
        if file_version > CURRENT_VERSION {
            return Err(StorageError::FutureVersion(file_version));
        }

        if file_version < CURRENT_VERSION {
            debug!(from = file_version, to = CURRENT_VERSION, "migrating store");
            data = apply_migrations(data, file_version, CURRENT_VERSION)?;
        }

        if let Some(obj) = data.as_object_mut() {
            obj.insert("version".to_string(), serde_json::json!(CURRENT_VERSION));
        }

        serde_json::from_value(data).map_err(|e| StorageError::ParseFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Writes `store` under the exclusive file lock.
    pub fn save(&self, store: &Store) -> Result<(), StorageError> {
        let lock_file = self.lock(<File as FileExt>::lock_exclusive)?;
        let result = self.write(store);
        self.unlock(lock_file)?;
        result
    }

    /// Opens the lock file next to the store and locks it with `lock`. Other
    /// processes sharing the store block here until the holder unlocks.
    fn lock(&self, lock: fn(&File) -> std::io::Result<()>) -> Result<File, StorageError> {
        let lock_file_path = self.path.with_extension("lock");
        if let Some(parent) = lock_file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::SaveFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_file_path)
            .map_err(|e| StorageError::SaveFailed {
                path: lock_file_path.clone(),
                source: e,
            })?;
        lock(&lock_file).map_err(|e| StorageError::SaveFailed {
            path: lock_file_path,
            source: e,
        })?;
        Ok(lock_file)
    }

    fn unlock(&self, lock_file: File) -> Result<(), StorageError> {
        <File as FileExt>::unlock(&lock_file).map_err(|e| StorageError::SaveFailed {
            path: self.path.with_extension("lock"),
            source: e,
        })
    }

    fn write(&self, store: &Store) -> Result<(), StorageError> {
        let json =
            to_string_pretty(store).map_err(|e| StorageError::SerializeFailed { source: e })?;

        let unique_temp = format!("{}.tmp.{}", self.path.display(), Uuid::new_v4());
        let temp_path = PathBuf::from(&unique_temp);
        write(&temp_path, json).map_err(|e| StorageError::SaveFailed {
            path: temp_path.clone(),
            source: e,
        })?;

        self.create_backup()?;
        self.cleanup_old_backups()?;

        rename(&temp_path, &self.path).map_err(|e| StorageError::SaveFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    fn create_backup_dir(&self) -> Result<(), StorageError> {
        let backups_dir = self.get_backup_dir();
        fs::create_dir_all(&backups_dir).map_err(|e| StorageError::BackupFailed {
            path: backups_dir,
            source: e,
        })
    }

    fn create_backup(&self) -> Result<u64, StorageError> {
        let file_exists = fs::exists(&self.path).map_err(|e| StorageError::BackupFailed {
            path: self.path.clone(),
            source: e,
        })?;
        if !file_exists {
            return Ok(0);
        }

        self.create_backup_dir()?;
        let backup_path = self.get_backup_path();
        fs::copy(&self.path, &backup_path).map_err(|e| StorageError::BackupFailed {
            path: backup_path,
            source: e,
        })
    }

    fn cleanup_old_backups(&self) -> Result<(), StorageError> {
        let backup_dir = self.get_backup_dir();
        let backup_dir_exists =
            fs::exists(&backup_dir).map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?;
        if !backup_dir_exists {
            return Ok(());
        }

        let mut file_entries = fs::read_dir(&backup_dir)
            .map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?
            .flatten()
            .filter(|entry| entry.metadata().map(|m| m.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();

        file_entries.sort();

        let number_of_files_to_delete = file_entries.len().saturating_sub(KEPT_BACKUPS);

        for file_path in file_entries.iter().take(number_of_files_to_delete) {
            fs::remove_file(file_path).map_err(|e| StorageError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?;
        }

        Ok(())
    }

    fn get_backup_dir(&self) -> PathBuf {
        let parent_store_path = self.path.parent().unwrap_or(Path::new("."));
        parent_store_path.join("backups")
    }

    fn get_backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("store"));
        // Nanoseconds keep names sortable and free of ':'.
        let timestamp = Timestamp::now().as_nanosecond();
        self.get_backup_dir().join(format!("{stem}-{timestamp}"))
    }

    /// Load, mutate and write back. The in-process guard and the exclusive
    /// file lock are both held for the whole cycle, so no other writer can
    /// slip in between the load and the rename.
    async fn modify<T>(
        &self,
        mutation: impl FnOnce(&mut Store) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _guard = self.guard.lock().await;
        let lock_file = self.lock(<File as FileExt>::lock_exclusive)?;
        let result = self.load().and_then(|mut store| {
            let output = mutation(&mut store)?;
            self.write(&store)?;
            Ok(output)
        });
        self.unlock(lock_file)?;
        result
    }

    async fn read<T>(&self, view: impl FnOnce(&Store) -> T) -> Result<T, StorageError> {
        let _guard = self.guard.lock().await;
        let lock_file = self.lock(<File as FileExt>::lock_shared)?;
        let result = self.load().map(|store| view(&store));
        self.unlock(lock_file)?;
        result
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn create_document(
        &self,
        collection: Collection,
        fields: Document,
    ) -> Result<Uuid, StorageError> {
        let id = self.new_document_id();
        self.modify(|store| {
            store.insert(collection, id, fields, Timestamp::now());
            Ok(id)
        })
        .await
    }

    async fn get_document(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Document, StorageError> {
        self.read(|store| store.get(collection, id).cloned()).await?
    }

    async fn update_document(
        &self,
        collection: Collection,
        id: Uuid,
        fields: Document,
    ) -> Result<(), StorageError> {
        self.modify(|store| store.merge(collection, id, fields, Timestamp::now()))
            .await
    }

    async fn query_documents(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Vec<Document>, StorageError> {
        self.read(|store| store.query(collection, filters)).await
    }

    async fn run_atomic_batch(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        self.modify(|store| store.apply_batch(operations, Timestamp::now()))
            .await
    }
}
