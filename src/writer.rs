use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};
use std::fs::create_dir_all;
use std::io::Write;
use std::path::Path;

use crate::config::OutputMode;
use crate::error::RenderError;
use crate::model::{ArtifactPayload, FormDefinition, OrderedRows, Provenance, StorageLocator};

lazy_static! {
    static ref SHEET_NAME_FORBIDDEN: Regex = Regex::new(r"[\[\]:*?/\\]").unwrap();
    static ref FILE_NAME_FORBIDDEN: Regex = Regex::new(r#"[\\/:*?"<>|\x00-\x1F]"#).unwrap();
}

const MAX_SHEET_NAME_CHARS: usize = 31;
// keeps the whole file name well under the common 255-byte limit
const MAX_FILE_STEM_BYTES: usize = 100;
const COLUMN_WIDTH: f64 = 25.0;
const HEADER_HEIGHT: f64 = 25.0;
const ROW_HEIGHT: f64 = 20.0;
const HEADER_FILL: u32 = 0x4472C4;
const NEW_ROW_FILL: u32 = 0xE8F5E8;

/// A workbook encoded in memory, not yet handed to storage
#[derive(Clone, Debug)]
pub struct RenderedArtifact {
    pub file_name: String,
    pub sheet_name: String,
    pub bytes: Vec<u8>,
}

/// Convert a form name into a legal worksheet name
///
/// Excel limits sheet names to 31 characters and forbids `[ ] : * ? / \`, as well as a
/// leading or trailing apostrophe.
///
/// # Examples
/// ```
/// use formsheet::writer::sheet_name_for;
///
/// assert_eq!(sheet_name_for("Q1/Q2 survey"), "Q1_Q2 survey");
/// assert_eq!(sheet_name_for(""), "Sheet1");
/// ```
pub fn sheet_name_for(form_name: &str) -> String {
    let cleaned = SHEET_NAME_FORBIDDEN.replace_all(form_name, "_");
    let trimmed: String = cleaned
        .trim()
        .trim_matches('\'')
        .chars()
        .take(MAX_SHEET_NAME_CHARS)
        .collect();
    let trimmed = trimmed.trim_end_matches('\'').trim_end().to_string();

    if trimmed.is_empty() {
        "Sheet1".to_string()
    } else {
        trimmed
    }
}

/// Build the file name of an artifact
///
/// Encodes form name, version, row total and a UTC timestamp (ISO-8601 with `:` and `.`
/// replaced by `-`), followed by a random suffix so that two renders of the same
/// version within the same millisecond still get distinct names.
///
/// # Arguments
/// * `form_name` - Name of the form; characters unsafe on common filesystems become `_`
///   and the result is cut to at most 100 bytes on a character boundary
/// * `version` - Artifact version
/// * `total_entries` - Number of data rows in the artifact
/// * `now` - Render time
pub fn file_name_for(
    form_name: &str,
    version: u32,
    total_entries: usize,
    now: DateTime<Utc>,
) -> String {
    let cleaned = FILE_NAME_FORBIDDEN.replace_all(form_name.trim(), "_");
    let mut end = cleaned.len().min(MAX_FILE_STEM_BYTES);
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    let stem = match cleaned[..end].trim_end() {
        "" => "form",
        stem => stem,
    };
    let timestamp = now.format("%Y-%m-%dT%H-%M-%S-%3fZ");
    let nonce = uuid::Uuid::new_v4().simple().to_string();

    format!(
        "{}_v{}_{}_entries_{}_{}.xlsx",
        stem,
        version,
        total_entries,
        timestamp,
        &nonce[..8]
    )
}

/// Render the ordered rows into an XLSX workbook held in memory
///
/// One sheet named after the form, one column per field in field order with the field
/// label as header. The header row is bold white on blue with thick borders; data rows
/// have thin borders and rows tagged [`Provenance::New`] get a light green fill.
///
/// # Arguments
/// * `form` - Form whose fields define the columns
/// * `rows` - Rows in emission order, values already in field order
/// * `version` - Version the artifact will be recorded under
///
/// # Returns
/// * `Result<RenderedArtifact, RenderError>` - File name, sheet name and workbook bytes
pub fn render(
    form: &FormDefinition,
    rows: &OrderedRows,
    version: u32,
) -> Result<RenderedArtifact, RenderError> {
    let sheet_name = sheet_name_for(&form.name);
    let labels = form.header_labels();

    let header_format = Format::new()
        .set_bold()
        .set_font_size(11.0)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thick);
    let carried_format = Format::new()
        .set_font_size(10.0)
        .set_align(FormatAlign::Left)
        .set_align(FormatAlign::VerticalCenter)
        .set_border(FormatBorder::Thin);
    let new_format = carried_format
        .clone()
        .set_background_color(Color::RGB(NEW_ROW_FILL));

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&sheet_name)?;

    for (col, label) in labels.iter().enumerate() {
        let col = col as u16;
        worksheet.set_column_width(col, COLUMN_WIDTH)?;
        worksheet.write_string_with_format(0, col, label, &header_format)?;
    }
    worksheet.set_row_height(0, HEADER_HEIGHT)?;

    for (index, row) in rows.rows().iter().enumerate() {
        let row_num = (index + 1) as u32;
        let format = match row.provenance {
            Provenance::New => &new_format,
            Provenance::CarriedOver => &carried_format,
        };

        for col in 0..labels.len() {
            let value = row.values.get(col).map(String::as_str).unwrap_or("");
            if value.is_empty() {
                worksheet.write_blank(row_num, col as u16, format)?;
            } else {
                worksheet.write_string_with_format(row_num, col as u16, value, format)?;
            }
        }
        worksheet.set_row_height(row_num, ROW_HEIGHT)?;
    }

    let bytes = workbook.save_to_buffer()?;
    let file_name = file_name_for(&form.name, version, rows.len(), Utc::now());
    debug!(
        "rendered {} ({} rows, {} bytes)",
        file_name,
        rows.len(),
        bytes.len()
    );

    Ok(RenderedArtifact {
        file_name,
        sheet_name,
        bytes,
    })
}

/// Hand a rendered workbook to its destination
///
/// In buffer mode the bytes are returned as-is with a `buffer://` locator. In file mode
/// they are written to a temporary file inside `uploads_dir` and renamed to the artifact's
/// file name; an existing file with that name is never replaced. On error nothing is left
/// behind.
///
/// # Returns
/// * `Result<(ArtifactPayload, StorageLocator), RenderError>` - Payload for the caller and
///   the locator to record
pub fn emit(
    mode: OutputMode,
    uploads_dir: &Path,
    rendered: RenderedArtifact,
) -> Result<(ArtifactPayload, StorageLocator), RenderError> {
    match mode {
        OutputMode::Buffer => {
            let locator = StorageLocator::memory(&rendered.file_name);
            Ok((ArtifactPayload::Buffer(rendered.bytes), locator))
        }
        OutputMode::File => {
            if !uploads_dir.exists() {
                info!("creating uploads directory {}", uploads_dir.display());
                create_dir_all(uploads_dir)?;
            }

            let path = uploads_dir.join(&rendered.file_name);
            let mut tmp = tempfile::NamedTempFile::new_in(uploads_dir)?;
            tmp.write_all(&rendered.bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist_noclobber(&path).map_err(|e| RenderError::Io(e.error))?;

            info!("wrote {}", path.display());
            Ok((
                ArtifactPayload::File(path.clone()),
                StorageLocator::Path(path),
            ))
        }
    }
}
