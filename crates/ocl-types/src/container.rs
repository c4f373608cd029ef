//! Container version types.
//!
//! A container version is a snapshot of a repository. Exactly one version per
//! repository carries the [`HEAD`](crate::well_known::HEAD) label and is mutable;
//! every other version is frozen once cut, apart from a small set of
//! administrative fields (see [`VersionAdminUpdate`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{well_known, ContainerVersionKey, RepoKey};

/// Descriptive fields supplied when cutting a version.
///
/// Fields left `None` are copied from HEAD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionMetadata {
    /// Display name.
    pub name: Option<String>,
    /// Release notes or description.
    pub description: Option<String>,
    /// Whether the version is released for consumption.
    pub released: bool,
    /// External identifier.
    pub external_id: Option<String>,
    /// Default locale override.
    pub default_locale: Option<String>,
    /// Supported locales override.
    pub supported_locales: Option<Vec<String>>,
    /// Canonical URL override.
    pub canonical_url: Option<String>,
    /// Extensible attributes merged over HEAD's.
    pub extras: serde_json::Map<String, serde_json::Value>,
}

/// The administrative fields that may change on a frozen version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionAdminUpdate {
    /// New external id (`Some(None)` clears it).
    pub external_id: Option<Option<String>>,
    /// New released flag.
    pub released: Option<bool>,
}

/// A snapshot of a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerVersion {
    /// Arena key.
    pub key: ContainerVersionKey,
    /// Owning repository.
    pub repository: RepoKey,
    /// `HEAD` or an immutable label.
    pub label: String,
    /// Versioned URI (versionless for HEAD).
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Description or release notes.
    pub description: Option<String>,
    /// Retired flag.
    pub retired: bool,
    /// Released flag.
    pub released: bool,
    /// True for the most recently created version of the repository.
    pub is_latest_version: bool,
    /// Default locale.
    pub default_locale: String,
    /// Supported locales.
    pub supported_locales: Vec<String>,
    /// Canonical URL.
    pub canonical_url: Option<String>,
    /// External identifier.
    pub external_id: Option<String>,
    /// Validation schema in force when the version was created.
    pub custom_validation_schema: Option<String>,
    /// Extensible attributes.
    pub extras: serde_json::Map<String, serde_json::Value>,
    /// Creation order within the repository (HEAD is 0).
    pub sequence: u32,
    /// Actor that created the version.
    pub created_by: String,
    /// Actor that last changed an administrative field.
    pub updated_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last administrative change.
    pub updated_at: DateTime<Utc>,
}

impl ContainerVersion {
    /// Returns true for the mutable working copy.
    pub fn is_head(&self) -> bool {
        self.label == well_known::HEAD
    }

    /// Returns true when the version is frozen.
    pub fn is_frozen(&self) -> bool {
        !self.is_head()
    }
}
