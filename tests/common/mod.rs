#![allow(dead_code)]

use chrono::Utc;
use formsheet::reconciler::{RecoveredSheet, read_prior_sheet};
use formsheet::{
    FieldKind, FieldSpec, FormDefinition, HostingProfile, MaterializerConfig, Owner,
    SubmissionRecord,
};
use std::collections::HashMap;
use std::path::Path;

pub const NAME: u64 = 11;
pub const EMAIL: u64 = 12;

pub fn field(id: u64, label: &str, order: i32) -> FieldSpec {
    FieldSpec {
        id,
        label: label.to_string(),
        kind: FieldKind::Text,
        order,
        required: false,
    }
}

/// Form with `[Name, Email]`
pub fn contacts_form() -> FormDefinition {
    FormDefinition {
        id: 1,
        name: "Contacts".to_string(),
        fields: vec![field(NAME, "Name", 1), field(EMAIL, "Email", 2)],
    }
}

pub fn submission(id: u64, values: &[(u64, &str)]) -> SubmissionRecord {
    SubmissionRecord {
        id,
        form_id: 1,
        submitter_id: 42,
        data: values
            .iter()
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>(),
        created_at: Utc::now(),
    }
}

pub fn contact(id: u64, name: &str, email: &str) -> SubmissionRecord {
    submission(id, &[(NAME, name), (EMAIL, email)])
}

pub fn owner() -> Owner {
    Owner {
        id: 42,
        email: "owner@x.com".to_string(),
    }
}

pub fn config(profile: HostingProfile, uploads: &Path) -> MaterializerConfig {
    let mut config = MaterializerConfig::for_profile(profile);
    config.uploads_dir = uploads.to_path_buf();
    config.database_path = uploads.join("artifacts.json");
    config
}

pub fn read_sheet(path: &Path, fields: usize) -> RecoveredSheet {
    read_prior_sheet(path, "Contacts", fields, 0).expect("workbook should read back")
}

pub fn read_buffer(bytes: &[u8], fields: usize) -> RecoveredSheet {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buffer.xlsx");
    std::fs::write(&path, bytes).unwrap();
    read_sheet(&path, fields)
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
