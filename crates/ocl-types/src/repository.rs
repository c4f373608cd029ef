//! Repository types.
//!
//! A repository is either a Source (an ontology that owns its content) or a
//! Collection (a curated subset described by references). Its identity is the
//! owner plus a mnemonic that is unique within that owner's scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{well_known, ContainerVersionKey, OwnerKind, RepoKey, RepositoryKind};

/// Identity of a repository: owner kind, owner id, repository kind and mnemonic.
///
/// # Examples
///
/// ```
/// use ocl_types::{OwnerKind, RepositoryIdentity};
///
/// let identity = RepositoryIdentity::source(OwnerKind::Organization, "CIEL", "CIEL");
/// assert_eq!(identity.uri(), "/orgs/CIEL/sources/CIEL/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryIdentity {
    /// Whether the owner is a user or an organization.
    pub owner_kind: OwnerKind,
    /// Owner id (username or organization mnemonic).
    pub owner: String,
    /// Source or Collection.
    pub kind: RepositoryKind,
    /// Repository mnemonic.
    pub mnemonic: String,
}

impl RepositoryIdentity {
    /// Creates the identity of a source.
    pub fn source(owner_kind: OwnerKind, owner: impl Into<String>, mnemonic: impl Into<String>) -> Self {
        Self {
            owner_kind,
            owner: owner.into(),
            kind: RepositoryKind::Source,
            mnemonic: mnemonic.into(),
        }
    }

    /// Creates the identity of a collection.
    pub fn collection(
        owner_kind: OwnerKind,
        owner: impl Into<String>,
        mnemonic: impl Into<String>,
    ) -> Self {
        Self {
            owner_kind,
            owner: owner.into(),
            kind: RepositoryKind::Collection,
            mnemonic: mnemonic.into(),
        }
    }

    /// URI of the owner, e.g. `/orgs/CIEL/`.
    pub fn owner_uri(&self) -> String {
        format!("/{}/{}/", self.owner_kind.segment(), self.owner)
    }

    /// Versionless repository URI, e.g. `/orgs/CIEL/sources/CIEL/`.
    pub fn uri(&self) -> String {
        format!(
            "/{}/{}/{}/{}/",
            self.owner_kind.segment(),
            self.owner,
            self.kind.segment(),
            self.mnemonic
        )
    }

    /// URI of a version of this repository. HEAD maps to the versionless URI.
    pub fn version_uri(&self, label: &str) -> String {
        if label == well_known::HEAD {
            self.uri()
        } else {
            format!("{}{}/", self.uri(), label)
        }
    }

    /// Returns true for sources.
    pub fn is_source(&self) -> bool {
        self.kind == RepositoryKind::Source
    }

    /// Returns true for collections.
    pub fn is_collection(&self) -> bool {
        self.kind == RepositoryKind::Collection
    }
}

impl std::fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Descriptive metadata supplied when a repository is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryMetadata {
    /// Display name (required).
    pub name: String,
    /// Longer display name.
    pub full_name: Option<String>,
    /// Free text description.
    pub description: Option<String>,
    /// Default locale for content.
    pub default_locale: String,
    /// Additional locales content may use.
    pub supported_locales: Vec<String>,
    /// Canonical URL (e.g. `http://loinc.org`), resolvable like the URI.
    pub canonical_url: Option<String>,
    /// External identifier.
    pub external_id: Option<String>,
    /// Public website.
    pub website: Option<String>,
    /// Name of an attached stricter validation schema.
    pub custom_validation_schema: Option<String>,
    /// Collections only: keep a default expansion on HEAD up to date.
    pub autoexpand_head: bool,
    /// Arbitrary extensible attributes.
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl Default for RepositoryMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            full_name: None,
            description: None,
            default_locale: well_known::DEFAULT_LOCALE.to_string(),
            supported_locales: vec![],
            canonical_url: None,
            external_id: None,
            website: None,
            custom_validation_schema: None,
            autoexpand_head: true,
            extras: serde_json::Map::new(),
        }
    }
}

impl RepositoryMetadata {
    /// Metadata with only a display name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A repository record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Arena key.
    pub key: RepoKey,
    /// Owner and mnemonic.
    pub identity: RepositoryIdentity,
    /// Descriptive metadata.
    pub metadata: RepositoryMetadata,
    /// Key of the HEAD container version.
    pub head: ContainerVersionKey,
    /// All container versions, in creation order (HEAD first).
    pub versions: Vec<ContainerVersionKey>,
    /// Actor that created the repository.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Repository {
    /// Versionless URI.
    pub fn uri(&self) -> String {
        self.identity.uri()
    }

    /// Name of the attached stricter validation schema, if any.
    pub fn validation_schema(&self) -> Option<&str> {
        self.metadata
            .custom_validation_schema
            .as_deref()
            .filter(|schema| *schema != well_known::SCHEMA_NONE)
    }
}
