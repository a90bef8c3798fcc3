use log::{error, info};
use std::sync::Arc;

use crate::config::MaterializerConfig;
use crate::error::{MaterializeError, StoreError};
use crate::lease::PairLeases;
use crate::model::{FormDefinition, MaterializationResult, NewArtifact, Owner, SubmissionRecord};
use crate::reconciler::Reconciler;
use crate::store::MetadataStore;
use crate::{version, writer};

/// Sheet Materializer: turns a form's submissions into a versioned XLSX artifact
///
/// Output and reconciliation modes come from the configuration and are fixed for the
/// lifetime of the materializer.
pub struct SheetMaterializer {
    config: MaterializerConfig,
    store: Arc<dyn MetadataStore>,
    reconciler: Reconciler,
    leases: PairLeases,
}

impl SheetMaterializer {
    pub fn new(config: MaterializerConfig, store: Arc<dyn MetadataStore>) -> Self {
        let reconciler = Reconciler::from_config(&config);
        SheetMaterializer {
            config,
            store,
            reconciler,
            leases: PairLeases::new(),
        }
    }

    pub fn config(&self) -> &MaterializerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Run a store operation on the blocking pool; stores may do file I/O and fsync
    async fn on_store<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MetadataStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&*store)).await?
    }

    /// Export `submissions` as the next version of `form` for `owner`.
    ///
    /// The caller decides which submissions are new; nothing is filtered here. Runs for
    /// the same (form, owner) pair are serialised, and the metadata record is written
    /// last so a failed render never leaves a record behind.
    ///
    /// # Errors
    /// * `NoDataToExport` when `submissions` is empty (no version is consumed)
    /// * `RenderFailure` when encoding or the durable write fails
    /// * `MetadataPersistFailure` when the metadata store cannot be read or written
    pub async fn materialize(
        &self,
        form: &FormDefinition,
        submissions: &[SubmissionRecord],
        owner: &Owner,
    ) -> Result<MaterializationResult, MaterializeError> {
        if submissions.is_empty() {
            info!("form {}: nothing to export for {}", form.id, owner.email);
            return Err(MaterializeError::NoDataToExport { form_id: form.id });
        }

        info!(
            "exporting {} submission(s) of form {} ({}) for {}",
            submissions.len(),
            form.id,
            form.name,
            owner.email
        );

        let _lease = self.leases.acquire(form.id, owner.id).await;

        let (form_id, owner_id) = (form.id, owner.id);
        let resolution = self
            .on_store(move |store| version::resolve(store, form_id, owner_id))
            .await?;
        let rows = self
            .reconciler
            .reconcile(form, submissions, resolution.prior.as_ref())
            .await;

        let rendered = writer::render(form, &rows, resolution.next_version)?;
        let file_name = rendered.file_name.clone();
        let (payload, storage_locator) =
            writer::emit(self.config.output_mode, &self.config.uploads_dir, rendered)?;

        let artifact = NewArtifact {
            file_name,
            storage_locator,
            owner_id: owner.id,
            form_id: form.id,
            version: resolution.next_version,
            row_count: rows.len(),
        };
        let metadata = self
            .on_store(move |store| store.insert(artifact))
            .await
            .map_err(|e| {
                error!(
                    "form {}: rendered v{} but could not record it: {}",
                    form.id, resolution.next_version, e
                );
                MaterializeError::MetadataPersistFailure(e)
            })?;

        info!(
            "form {}: v{} recorded as {} ({} new, {} carried over)",
            form.id,
            metadata.version,
            metadata.storage_locator,
            rows.new_count(),
            rows.carried_over_count()
        );

        Ok(MaterializationResult {
            is_new_version: resolution.prior.is_some(),
            previous_version: resolution.previous_version(),
            new_entries_count: rows.new_count(),
            total_entries_count: rows.len(),
            metadata,
            payload,
        })
    }
}
