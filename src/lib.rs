/*!
# Form Sheet Materializer

Turns the submissions of a form into versioned XLSX exports, built in Rust.

## Overview

Every export of a form for a given owner becomes a new version of that form's
spreadsheet. Depending on how the application is hosted, a new version either replaces
the previous one outright or carries every row of the previous file forward underneath
the newly submitted rows.

## Architecture

One component, the **Sheet Materializer**, runs three steps per export while holding a
lease for the (form, owner) pair:

- **Version Resolver** (`version`) - reads the highest recorded version for the pair and
  picks the next one
- **Row Reconciler** (`reconciler`) - projects submissions into rows in field order and,
  when history is preserved, reads the previous workbook back and appends its rows
- **Artifact Writer** (`writer`) - renders the styled workbook and keeps it in memory or
  writes it under the uploads directory

The metadata record is written last, through a store whose insert refuses any version
that is not exactly one above the latest.

## Hosting profiles

| Profile     | Output | Reconciliation              |
|-------------|--------|-----------------------------|
| `durable`   | file   | append-preserving-history   |
| `ephemeral` | buffer | replace                     |

## Modules

- **model**: forms, submissions, artifact records and results
- **config**: modes, profiles and `FORMSHEET_*` environment settings
- **store**: metadata store trait with in-memory and JSON file implementations
- **lease**: per-(form, owner) exclusive leases
- **version**: next-version resolution
- **reconciler**: row ordering and prior artifact recovery
- **writer**: XLSX rendering and output
- **materializer**: the end-to-end export
- **downloader**: listing, download resolution and deletion of artifacts
*/

pub mod config;
pub mod downloader;
pub mod error;
pub mod lease;
pub mod materializer;
pub mod model;
pub mod reconciler;
pub mod store;
pub mod version;
pub mod writer;

pub use config::{HostingProfile, MaterializerConfig, OutputMode, ReconcileMode, SchemaDriftPolicy};
pub use downloader::{Download, RecordsError};
pub use error::{MaterializeError, RenderError, StoreError};
pub use materializer::SheetMaterializer;
pub use model::*;
pub use store::{JsonMetadataStore, MemoryMetadataStore, MetadataStore};
