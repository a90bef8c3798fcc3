use calamine::{Data, Reader, Xlsx, open_workbook};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::{MaterializerConfig, ReconcileMode, SchemaDriftPolicy};
use crate::model::{
    ArtifactMetadata, FieldSpec, FormDefinition, OrderedRows, Provenance, ResolvedRow,
    StorageLocator, SubmissionRecord,
};
use crate::writer::sheet_name_for;

/// Why a prior artifact could not be read back.
///
/// Never leaves the reconciler: every variant degrades the run to "no prior artifact".
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("prior artifact `{0}` does not exist")]
    Missing(PathBuf),

    #[error("prior artifact `{0}` was never written to durable storage")]
    NotOnDisk(String),

    #[error("prior artifact could not be opened: {0}")]
    Open(#[from] calamine::XlsxError),

    #[error("prior artifact has no worksheets")]
    NoSheet,

    #[error("reading the prior artifact took longer than {0:?}")]
    TimedOut(Duration),

    #[error("prior artifact reader failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Contents of a previously exported sheet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredSheet {
    /// Header labels as they appear in the old file, at least one per current field;
    /// blank labels past the current field count are trimmed
    pub header: Vec<String>,
    /// Data rows, one value per current field, by column position
    pub rows: Vec<Vec<String>>,
}

/// Project a submission into a row of strings in field order.
///
/// Missing keys become empty strings.
pub fn project_submission(fields: &[&FieldSpec], submission: &SubmissionRecord) -> Vec<String> {
    fields
        .iter()
        .map(|field| {
            submission
                .data
                .get(&field.data_key())
                .cloned()
                .unwrap_or_default()
        })
        .collect()
}

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        None | Some(Data::Empty) => String::new(),
        Some(Data::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Read a prior artifact back from disk.
///
/// Looks for the sheet named after the form and falls back to the first sheet. Row 0 is
/// the header; every later row is cut down (or padded) to `field_count` cells. At least
/// `expected_rows` data rows are returned, so rows that were written completely blank
/// are not lost.
pub fn read_prior_sheet(
    path: &Path,
    sheet_name: &str,
    field_count: usize,
    expected_rows: usize,
) -> Result<RecoveredSheet, RecoveryError> {
    if !path.exists() {
        return Err(RecoveryError::Missing(path.to_path_buf()));
    }

    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let names = workbook.sheet_names().to_owned();
    let target = names
        .iter()
        .find(|name| name.as_str() == sheet_name)
        .or_else(|| names.first())
        .cloned()
        .ok_or(RecoveryError::NoSheet)?;

    let range = workbook.worksheet_range(&target)?;
    let (last_row, last_col) = range.end().unwrap_or((0, 0));

    let width = (last_col as usize + 1).max(field_count);
    let mut header: Vec<String> = (0..width as u32)
        .map(|col| cell_text(range.get_value((0, col))))
        .collect();
    while header.len() > field_count && header.last().is_some_and(|label| label.is_empty()) {
        header.pop();
    }

    let row_total = (last_row as usize).max(expected_rows);
    let rows = (1..=row_total as u32)
        .map(|row| {
            (0..field_count as u32)
                .map(|col| cell_text(range.get_value((row, col))))
                .collect()
        })
        .collect();

    Ok(RecoveredSheet { header, rows })
}

/// Row Reconciler: decides which rows a new artifact holds, and in which order
#[derive(Clone, Debug)]
pub struct Reconciler {
    mode: ReconcileMode,
    schema_drift: SchemaDriftPolicy,
    read_timeout: Duration,
}

impl Reconciler {
    pub fn new(mode: ReconcileMode, schema_drift: SchemaDriftPolicy, read_timeout: Duration) -> Self {
        Reconciler {
            mode,
            schema_drift,
            read_timeout,
        }
    }

    pub fn from_config(config: &MaterializerConfig) -> Self {
        Self::new(
            config.reconcile_mode,
            config.schema_drift,
            config.prior_read_timeout,
        )
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    /// Build the ordered rows for a new artifact.
    ///
    /// New submissions always come first. In history-preserving mode the rows of `prior`
    /// follow in their original order; if `prior` cannot be read the run continues as if
    /// there were no prior artifact.
    pub async fn reconcile(
        &self,
        form: &FormDefinition,
        submissions: &[SubmissionRecord],
        prior: Option<&ArtifactMetadata>,
    ) -> OrderedRows {
        let fields = form.ordered_fields();
        let mut rows: Vec<ResolvedRow> = submissions
            .iter()
            .map(|submission| ResolvedRow {
                values: project_submission(&fields, submission),
                provenance: Provenance::New,
            })
            .collect();

        if self.mode == ReconcileMode::Replace {
            return OrderedRows::new(rows);
        }

        let Some(prior) = prior else {
            return OrderedRows::new(rows);
        };

        match self.recover(form, prior).await {
            Ok(sheet) => {
                let current = form.header_labels();
                if sheet.header != current {
                    match self.schema_drift {
                        SchemaDriftPolicy::Positional => warn!(
                            "form {} header changed since v{} ({:?} -> {:?}); mapping old rows by position",
                            form.id, prior.version, sheet.header, current
                        ),
                        SchemaDriftPolicy::RefuseMerge => {
                            warn!(
                                "form {} header changed since v{} ({:?} -> {:?}); not merging old rows",
                                form.id, prior.version, sheet.header, current
                            );
                            return OrderedRows::new(rows);
                        }
                    }
                }

                debug!(
                    "recovered {} rows from v{} of form {}",
                    sheet.rows.len(),
                    prior.version,
                    form.id
                );
                rows.extend(sheet.rows.into_iter().map(|values| ResolvedRow {
                    values,
                    provenance: Provenance::CarriedOver,
                }));
            }
            Err(e) => {
                warn!(
                    "prior artifact v{} of form {} is unreadable, exporting new rows only: {}",
                    prior.version, form.id, e
                );
            }
        }

        OrderedRows::new(rows)
    }

    async fn recover(
        &self,
        form: &FormDefinition,
        prior: &ArtifactMetadata,
    ) -> Result<RecoveredSheet, RecoveryError> {
        let path = match &prior.storage_locator {
            StorageLocator::Path(path) => path.clone(),
            StorageLocator::Memory(marker) => {
                info!("v{} of form {} only existed in memory", prior.version, form.id);
                return Err(RecoveryError::NotOnDisk(marker.clone()));
            }
        };

        let sheet_name = sheet_name_for(&form.name);
        let field_count = form.fields.len();
        let expected_rows = prior.row_count;
        let task = tokio::task::spawn_blocking(move || {
            read_prior_sheet(&path, &sheet_name, field_count, expected_rows)
        });

        match tokio::time::timeout(self.read_timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(RecoveryError::TimedOut(self.read_timeout)),
        }
    }
}
