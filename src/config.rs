use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// Defaults
const UPLOADS_DIR: &str = "uploads";
const DATABASE_FILE: &str = "database/artifacts.json";
const PRIOR_READ_TIMEOUT_MS: u64 = 10_000;

/// How a rendered workbook leaves the writer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Bytes only, nothing touches disk
    Buffer,

    /// Bytes are also written under the uploads directory
    File,
}

/// Which rows a new artifact contains
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileMode {
    /// Only the new submissions
    Replace,

    /// New submissions first, then every row of the prior artifact
    AppendPreservingHistory,
}

/// What to do when the prior artifact's header no longer matches the form
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaDriftPolicy {
    /// Map recovered cells by column position anyway (logged)
    Positional,

    /// Drop the recovered rows and export only the new submissions
    RefuseMerge,
}

/// Deployment shape that fixes output and reconciliation modes together
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostingProfile {
    /// No durable file storage: buffer output, replace reconciliation
    Ephemeral,

    /// Durable file storage: file output, history-preserving reconciliation
    Durable,
}

impl HostingProfile {
    pub fn modes(self) -> (OutputMode, ReconcileMode) {
        match self {
            HostingProfile::Ephemeral => (OutputMode::Buffer, ReconcileMode::Replace),
            HostingProfile::Durable => (OutputMode::File, ReconcileMode::AppendPreservingHistory),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Materializer settings, chosen once per deployment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterializerConfig {
    pub output_mode: OutputMode,
    pub reconcile_mode: ReconcileMode,
    /// Directory that receives artifacts in file mode
    pub uploads_dir: PathBuf,
    /// JSON document backing the metadata store
    pub database_path: PathBuf,
    /// Upper bound on reading a prior artifact back
    #[serde(with = "millis")]
    pub prior_read_timeout: Duration,
    pub schema_drift: SchemaDriftPolicy,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self::for_profile(HostingProfile::Durable)
    }
}

impl MaterializerConfig {
    pub fn for_profile(profile: HostingProfile) -> Self {
        let (output_mode, reconcile_mode) = profile.modes();
        MaterializerConfig {
            output_mode,
            reconcile_mode,
            uploads_dir: PathBuf::from(UPLOADS_DIR),
            database_path: PathBuf::from(DATABASE_FILE),
            prior_read_timeout: Duration::from_millis(PRIOR_READ_TIMEOUT_MS),
            schema_drift: SchemaDriftPolicy::Positional,
        }
    }

    /// Build the configuration from `FORMSHEET_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    ///
    /// `FORMSHEET_PROFILE` picks the base modes; `FORMSHEET_OUTPUT_MODE` and
    /// `FORMSHEET_RECONCILE_MODE` override them individually.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = parse_var(&lookup, "FORMSHEET_PROFILE")?.unwrap_or(HostingProfile::Durable);
        let mut config = Self::for_profile(profile);

        if let Some(mode) = parse_var(&lookup, "FORMSHEET_OUTPUT_MODE")? {
            config.output_mode = mode;
        }
        if let Some(mode) = parse_var(&lookup, "FORMSHEET_RECONCILE_MODE")? {
            config.reconcile_mode = mode;
        }
        if let Some(policy) = parse_var(&lookup, "FORMSHEET_SCHEMA_DRIFT")? {
            config.schema_drift = policy;
        }
        if let Some(dir) = lookup("FORMSHEET_UPLOADS_DIR") {
            config.uploads_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("FORMSHEET_DATABASE") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(value) = lookup("FORMSHEET_READ_TIMEOUT_MS") {
            let Ok(ms) = value.trim().parse::<u64>() else {
                return Err(ConfigError::InvalidValue {
                    key: "FORMSHEET_READ_TIMEOUT_MS",
                    value,
                });
            };
            config.prior_read_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

/// Parse a kebab-case enum value through its serde names
fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: DeserializeOwned,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    let name = serde_json::Value::String(value.trim().to_ascii_lowercase());
    serde_json::from_value(name)
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_is_durable_profile() {
        let config = MaterializerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.output_mode, OutputMode::File);
        assert_eq!(config.reconcile_mode, ReconcileMode::AppendPreservingHistory);
        assert_eq!(config.schema_drift, SchemaDriftPolicy::Positional);
        assert_eq!(config.prior_read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn ephemeral_profile_with_override() {
        let config = MaterializerConfig::from_lookup(lookup_from(&[
            ("FORMSHEET_PROFILE", "ephemeral"),
            ("FORMSHEET_RECONCILE_MODE", "append-preserving-history"),
            ("FORMSHEET_READ_TIMEOUT_MS", "250"),
            ("FORMSHEET_UPLOADS_DIR", "/tmp/exports"),
        ]))
        .unwrap();

        assert_eq!(config.output_mode, OutputMode::Buffer);
        assert_eq!(config.reconcile_mode, ReconcileMode::AppendPreservingHistory);
        assert_eq!(config.prior_read_timeout, Duration::from_millis(250));
        assert_eq!(config.uploads_dir, PathBuf::from("/tmp/exports"));
    }

    #[test]
    fn enum_values_use_serde_names() {
        let config = MaterializerConfig::from_lookup(lookup_from(&[
            ("FORMSHEET_PROFILE", " Durable "),
            ("FORMSHEET_OUTPUT_MODE", "buffer"),
            ("FORMSHEET_SCHEMA_DRIFT", "refuse-merge"),
        ]))
        .unwrap();

        assert_eq!(config.output_mode, OutputMode::Buffer);
        assert_eq!(config.reconcile_mode, ReconcileMode::AppendPreservingHistory);
        assert_eq!(config.schema_drift, SchemaDriftPolicy::RefuseMerge);

        let err = MaterializerConfig::from_lookup(lookup_from(&[("FORMSHEET_READ_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("FORMSHEET_READ_TIMEOUT_MS"));
    }

    #[test]
    fn rejects_unknown_values() {
        let err = MaterializerConfig::from_lookup(lookup_from(&[("FORMSHEET_OUTPUT_MODE", "s3")]))
            .unwrap_err();
        assert!(err.to_string().contains("FORMSHEET_OUTPUT_MODE"));
    }
}
