use chrono::Utc;
use fd_lock::RwLock as FileLock;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::StoreError;
use crate::model::{ArtifactMetadata, NewArtifact};

/// Backing store for artifact metadata records
///
/// `insert` must be a compare-and-insert: a record is only accepted when its version is
/// exactly one above the highest stored version for its (form, owner) pair. This keeps
/// the version sequence gapless even when several processes share one store.
///
/// Record ids are never reused, not even after the newest record is deleted.
pub trait MetadataStore: Send + Sync {
    /// Highest-version record for the pair, if any
    fn latest(&self, form_id: u64, owner_id: u64) -> Result<Option<ArtifactMetadata>, StoreError>;

    fn insert(&self, artifact: NewArtifact) -> Result<ArtifactMetadata, StoreError>;

    fn get(&self, id: u64) -> Result<Option<ArtifactMetadata>, StoreError>;

    /// Every record owned by `owner_id`, newest first
    fn list_for_owner(&self, owner_id: u64) -> Result<Vec<ArtifactMetadata>, StoreError>;

    /// Remove a record, returning it if it existed
    fn delete(&self, id: u64) -> Result<Option<ArtifactMetadata>, StoreError>;
}

/// Records plus the id counter, as persisted
#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    records: Vec<ArtifactMetadata>,
}

impl Ledger {
    fn latest(&self, form_id: u64, owner_id: u64) -> Option<&ArtifactMetadata> {
        self.records
            .iter()
            .filter(|r| r.form_id == form_id && r.owner_id == owner_id)
            .max_by_key(|r| r.version)
    }

    fn get(&self, id: u64) -> Option<&ArtifactMetadata> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Validate the version and append a new record
    fn append_checked(&mut self, artifact: NewArtifact) -> Result<ArtifactMetadata, StoreError> {
        let expected = self
            .latest(artifact.form_id, artifact.owner_id)
            .map(|r| r.version + 1)
            .unwrap_or(1);
        if artifact.version != expected {
            return Err(StoreError::VersionConflict {
                form_id: artifact.form_id,
                owner_id: artifact.owner_id,
                expected,
                got: artifact.version,
            });
        }

        // the counter may lag behind ids written before it existed
        let id = self
            .records
            .iter()
            .map(|r| r.id + 1)
            .fold(self.next_id.max(1), u64::max);
        self.next_id = id + 1;

        let record = ArtifactMetadata {
            id,
            file_name: artifact.file_name,
            storage_locator: artifact.storage_locator,
            owner_id: artifact.owner_id,
            form_id: artifact.form_id,
            version: artifact.version,
            row_count: artifact.row_count,
            created_at: Utc::now(),
        };
        self.records.push(record.clone());
        Ok(record)
    }

    fn remove(&mut self, id: u64) -> Option<ArtifactMetadata> {
        let position = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(position))
    }

    fn owned_newest_first(&self, owner_id: u64) -> Vec<ArtifactMetadata> {
        let mut owned: Vec<ArtifactMetadata> = self
            .records
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        owned
    }
}

/// In-process store, used for tests and for stateless hosting
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    ledger: RwLock<Ledger>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn latest(&self, form_id: u64, owner_id: u64) -> Result<Option<ArtifactMetadata>, StoreError> {
        let ledger = self.ledger.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ledger.latest(form_id, owner_id).cloned())
    }

    fn insert(&self, artifact: NewArtifact) -> Result<ArtifactMetadata, StoreError> {
        let mut ledger = self.ledger.write().map_err(|_| StoreError::Poisoned)?;
        ledger.append_checked(artifact)
    }

    fn get(&self, id: u64) -> Result<Option<ArtifactMetadata>, StoreError> {
        let ledger = self.ledger.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ledger.get(id).cloned())
    }

    fn list_for_owner(&self, owner_id: u64) -> Result<Vec<ArtifactMetadata>, StoreError> {
        let ledger = self.ledger.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ledger.owned_newest_first(owner_id))
    }

    fn delete(&self, id: u64) -> Result<Option<ArtifactMetadata>, StoreError> {
        let mut ledger = self.ledger.write().map_err(|_| StoreError::Poisoned)?;
        Ok(ledger.remove(id))
    }
}

/// Store kept as a single JSON document on disk
///
/// Every call holds an exclusive lock on a sidecar `<file>.lock` from load to save, so
/// handles in different processes see each other's writes. Mutations rewrite the
/// document through a temporary file in the same directory followed by a rename, so
/// readers never observe a half-written file.
#[derive(Debug)]
pub struct JsonMetadataStore {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

impl JsonMetadataStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                create_dir_all(parent)?;
            }
        }

        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Ok(JsonMetadataStore {
            path,
            lock_path,
            guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Ledger, StoreError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Ledger::default()),
            Err(e) => return Err(e.into()),
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(Ledger::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(ledger)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn with_ledger<T>(
        &self,
        f: impl FnOnce(&mut Ledger) -> Result<(T, bool), StoreError>,
    ) -> Result<T, StoreError> {
        let _local = self.guard.lock().map_err(|_| StoreError::Poisoned)?;
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        let mut file_lock = FileLock::new(lock_file);
        let _exclusive = file_lock.write()?;

        let mut ledger = self.load()?;
        let (value, dirty) = f(&mut ledger)?;
        if dirty {
            self.save(&ledger)?;
        }
        Ok(value)
    }
}

impl MetadataStore for JsonMetadataStore {
    fn latest(&self, form_id: u64, owner_id: u64) -> Result<Option<ArtifactMetadata>, StoreError> {
        self.with_ledger(|ledger| Ok((ledger.latest(form_id, owner_id).cloned(), false)))
    }

    fn insert(&self, artifact: NewArtifact) -> Result<ArtifactMetadata, StoreError> {
        self.with_ledger(|ledger| ledger.append_checked(artifact).map(|r| (r, true)))
    }

    fn get(&self, id: u64) -> Result<Option<ArtifactMetadata>, StoreError> {
        self.with_ledger(|ledger| Ok((ledger.get(id).cloned(), false)))
    }

    fn list_for_owner(&self, owner_id: u64) -> Result<Vec<ArtifactMetadata>, StoreError> {
        self.with_ledger(|ledger| Ok((ledger.owned_newest_first(owner_id), false)))
    }

    fn delete(&self, id: u64) -> Result<Option<ArtifactMetadata>, StoreError> {
        self.with_ledger(|ledger| {
            let removed = ledger.remove(id);
            let dirty = removed.is_some();
            Ok((removed, dirty))
        })
    }
}
