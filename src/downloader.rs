use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::error::StoreError;
use crate::model::{ArtifactMetadata, StorageLocator};
use crate::store::MetadataStore;

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("artifact {0} not found")]
    NotFound(u64),

    #[error("artifact {artifact_id} belongs to another owner")]
    NotOwner { artifact_id: u64 },

    #[error("artifact file `{0}` is missing")]
    FileMissing(PathBuf),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not remove artifact file: {0}")]
    Io(#[from] std::io::Error),
}

/// How a download request for an existing artifact is served
#[derive(Clone, Debug, PartialEq)]
pub enum Download {
    /// Serve the stored file under its original name
    File { path: PathBuf, file_name: String },

    /// Buffer-mode artifact: nothing was kept, so the caller must run the export again
    /// with the submissions it originally selected
    Rerender { form_id: u64, version: u32 },
}

fn owned_record(
    store: &dyn MetadataStore,
    artifact_id: u64,
    owner_id: u64,
) -> Result<ArtifactMetadata, RecordsError> {
    let record = store
        .get(artifact_id)?
        .ok_or(RecordsError::NotFound(artifact_id))?;
    if record.owner_id != owner_id {
        return Err(RecordsError::NotOwner { artifact_id });
    }
    Ok(record)
}

/// List an owner's artifacts, newest first
///
/// # Arguments
/// * `store` - Metadata store
/// * `owner_id` - Owner whose artifacts are listed
///
/// # Returns
/// * `Result<Vec<ArtifactMetadata>, RecordsError>` - Records, newest first
pub fn list_artifacts(
    store: &dyn MetadataStore,
    owner_id: u64,
) -> Result<Vec<ArtifactMetadata>, RecordsError> {
    Ok(store.list_for_owner(owner_id)?)
}

/// Resolve a download request for an artifact
///
/// File-mode artifacts resolve to their stored path, which must still exist. Buffer-mode
/// artifacts resolve to [`Download::Rerender`].
///
/// # Arguments
/// * `store` - Metadata store
/// * `artifact_id` - Artifact to download
/// * `owner_id` - Requesting owner; must match the record
///
/// # Returns
/// * `Result<Download, RecordsError>` - How to serve the request
pub fn resolve_download(
    store: &dyn MetadataStore,
    artifact_id: u64,
    owner_id: u64,
) -> Result<Download, RecordsError> {
    let record = owned_record(store, artifact_id, owner_id)?;

    match record.storage_locator {
        StorageLocator::Path(path) => {
            if !path.exists() {
                warn!("artifact {} points at missing file {}", artifact_id, path.display());
                return Err(RecordsError::FileMissing(path));
            }
            Ok(Download::File {
                path,
                file_name: record.file_name,
            })
        }
        StorageLocator::Memory(_) => Ok(Download::Rerender {
            form_id: record.form_id,
            version: record.version,
        }),
    }
}

/// Delete an artifact: its file first (when there is one), then its record
///
/// A file that is already gone is not an error.
///
/// # Returns
/// * `Result<ArtifactMetadata, RecordsError>` - The removed record
pub fn delete_artifact(
    store: &dyn MetadataStore,
    artifact_id: u64,
    owner_id: u64,
) -> Result<ArtifactMetadata, RecordsError> {
    let record = owned_record(store, artifact_id, owner_id)?;

    if let Some(path) = record.storage_locator.as_path() {
        match fs::remove_file(path) {
            Ok(()) => info!("removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    store
        .delete(artifact_id)?
        .ok_or(RecordsError::NotFound(artifact_id))
}
