//! Error types crossing the materializer boundary.

use thiserror::Error;

/// Failure of a materialization call.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The candidate submission set was empty. Nothing was rendered or recorded.
    #[error("no submissions to export for form {form_id}")]
    NoDataToExport { form_id: u64 },

    /// Encoding the workbook or writing it to durable storage failed.
    #[error("failed to render artifact: {0}")]
    RenderFailure(#[from] RenderError),

    /// The metadata store could not be read or written.
    #[error("failed to record artifact metadata: {0}")]
    MetadataPersistFailure(#[from] StoreError),
}

impl MaterializeError {
    /// True for the recoverable "nothing to export" outcome
    pub fn is_no_data(&self) -> bool {
        matches!(self, MaterializeError::NoDataToExport { .. })
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("workbook encoding failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("storage write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metadata store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata store is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "version conflict for form {form_id}, owner {owner_id}: expected v{expected}, got v{got}"
    )]
    VersionConflict {
        form_id: u64,
        owner_id: u64,
        expected: u32,
        got: u32,
    },

    #[error("metadata store lock poisoned")]
    Poisoned,

    #[error("metadata store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
