use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Kind of input a form field collects
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    /// Single line of text
    Text,

    /// Free text spanning several lines
    #[serde(alias = "textarea")]
    MultilineText,
}

/// One column of a form
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: u64,
    pub label: String,
    pub kind: FieldKind,
    pub order: i32,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    /// Key under which submissions store this field's value
    pub fn data_key(&self) -> String {
        self.id.to_string()
    }
}

/// A form and its fields, as handed over by the forms collaborator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub id: u64,
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl FormDefinition {
    /// Fields in column order.
    ///
    /// Sorted by `order`; fields sharing an order keep the sequence they were supplied in.
    pub fn ordered_fields(&self) -> Vec<&FieldSpec> {
        let mut fields: Vec<&FieldSpec> = self.fields.iter().collect();
        fields.sort_by_key(|field| field.order);
        fields
    }

    /// Header labels in column order
    pub fn header_labels(&self) -> Vec<String> {
        self.ordered_fields()
            .into_iter()
            .map(|field| field.label.clone())
            .collect()
    }
}

/// A single filled-in form
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: u64,
    pub form_id: u64,
    pub submitter_id: u64,
    /// Field id (as a string) to submitted value
    #[serde(default)]
    pub data: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// The user an export is attributed to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: u64,
    pub email: String,
}

/// Where the bytes of an artifact live
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StorageLocator {
    /// Written to durable storage at this path
    Path(PathBuf),

    /// Never written anywhere; holds a `buffer://<file name>` marker
    Memory(String),
}

impl StorageLocator {
    pub const MEMORY_SCHEME: &'static str = "buffer://";

    pub fn memory(file_name: &str) -> Self {
        StorageLocator::Memory(format!("{}{}", Self::MEMORY_SCHEME, file_name))
    }

    /// Filesystem path, if the artifact was written to disk
    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            StorageLocator::Path(path) => Some(path),
            StorageLocator::Memory(_) => None,
        }
    }
}

impl fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocator::Path(path) => write!(f, "{}", path.display()),
            StorageLocator::Memory(marker) => f.write_str(marker),
        }
    }
}

/// Persisted description of one rendered artifact
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub id: u64,
    pub file_name: String,
    pub storage_locator: StorageLocator,
    pub owner_id: u64,
    pub form_id: u64,
    pub version: u32,
    pub row_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Metadata for an artifact that has not been stored yet.
///
/// The store assigns `id` and `created_at`.
#[derive(Clone, Debug, PartialEq)]
pub struct NewArtifact {
    pub file_name: String,
    pub storage_locator: StorageLocator,
    pub owner_id: u64,
    pub form_id: u64,
    pub version: u32,
    pub row_count: usize,
}

/// Where a row came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    New,
    CarriedOver,
}

/// One row of cell values in column order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRow {
    pub values: Vec<String>,
    pub provenance: Provenance,
}

/// The rows that go into an artifact, in emission order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderedRows {
    rows: Vec<ResolvedRow>,
}

impl OrderedRows {
    pub fn new(rows: Vec<ResolvedRow>) -> Self {
        OrderedRows { rows }
    }

    pub fn rows(&self) -> &[ResolvedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn new_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.provenance == Provenance::New)
            .count()
    }

    pub fn carried_over_count(&self) -> usize {
        self.len() - self.new_count()
    }
}

/// Rendered artifact contents handed back to the caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactPayload {
    /// In-memory workbook for one-shot delivery
    Buffer(Vec<u8>),

    /// Workbook written to durable storage
    File(PathBuf),
}

/// Outcome of one materialization call
#[derive(Clone, Debug, PartialEq)]
pub struct MaterializationResult {
    pub metadata: ArtifactMetadata,
    pub payload: ArtifactPayload,
    pub is_new_version: bool,
    pub previous_version: u32,
    pub new_entries_count: usize,
    pub total_entries_count: usize,
}
