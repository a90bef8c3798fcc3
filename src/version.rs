use log::debug;

use crate::error::StoreError;
use crate::model::ArtifactMetadata;
use crate::store::MetadataStore;

/// Next version for a (form, owner) pair and the artifact it supersedes
#[derive(Clone, Debug, PartialEq)]
pub struct VersionResolution {
    pub next_version: u32,
    pub prior: Option<ArtifactMetadata>,
}

impl VersionResolution {
    pub fn previous_version(&self) -> u32 {
        self.prior.as_ref().map(|p| p.version).unwrap_or(0)
    }
}

/// Work out which version the next artifact for the pair gets.
///
/// Version 1 with no prior when nothing has been exported yet, otherwise one above the
/// highest recorded version. Callers hold the pair's lease while using the result.
pub fn resolve(
    store: &dyn MetadataStore,
    form_id: u64,
    owner_id: u64,
) -> Result<VersionResolution, StoreError> {
    let prior = store.latest(form_id, owner_id)?;
    let next_version = prior.as_ref().map(|p| p.version + 1).unwrap_or(1);

    debug!(
        "form {} owner {}: prior {:?}, next v{}",
        form_id,
        owner_id,
        prior.as_ref().map(|p| p.version),
        next_version
    );

    Ok(VersionResolution {
        next_version,
        prior,
    })
}
