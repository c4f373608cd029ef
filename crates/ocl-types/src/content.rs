//! Content items and their immutable versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ConceptPayload, ContentKind, ContentVersionKey, ItemKey, MappingPayload, RepoKey,
};

/// Versioned body of a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPayload {
    /// A concept body.
    Concept(ConceptPayload),
    /// A mapping body.
    Mapping(MappingPayload),
}

impl ContentPayload {
    /// Concept or Mapping.
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Concept(_) => ContentKind::Concept,
            Self::Mapping(_) => ContentKind::Mapping,
        }
    }

    /// Mnemonic of the item.
    pub fn mnemonic(&self) -> &str {
        match self {
            Self::Concept(concept) => &concept.mnemonic,
            Self::Mapping(mapping) => &mapping.mnemonic,
        }
    }

    /// Retired flag.
    pub fn retired(&self) -> bool {
        match self {
            Self::Concept(concept) => concept.retired,
            Self::Mapping(mapping) => mapping.retired,
        }
    }

    /// Sets the retired flag.
    pub fn set_retired(&mut self, retired: bool) {
        match self {
            Self::Concept(concept) => concept.retired = retired,
            Self::Mapping(mapping) => mapping.retired = retired,
        }
    }

    /// Returns the concept body, if this is a concept.
    pub fn as_concept(&self) -> Option<&ConceptPayload> {
        match self {
            Self::Concept(concept) => Some(concept),
            Self::Mapping(_) => None,
        }
    }

    /// Returns the mapping body, if this is a mapping.
    pub fn as_mapping(&self) -> Option<&MappingPayload> {
        match self {
            Self::Mapping(mapping) => Some(mapping),
            Self::Concept(_) => None,
        }
    }
}

impl From<ConceptPayload> for ContentPayload {
    fn from(concept: ConceptPayload) -> Self {
        Self::Concept(concept)
    }
}

impl From<MappingPayload> for ContentPayload {
    fn from(mapping: MappingPayload) -> Self {
        Self::Mapping(mapping)
    }
}

/// Root record of a concept or mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Arena key.
    pub key: ItemKey,
    /// Owning source.
    pub repository: RepoKey,
    /// Concept or Mapping.
    pub kind: ContentKind,
    /// Mnemonic, unique per repository and kind.
    pub mnemonic: String,
    /// Version chain, oldest first.
    pub versions: Vec<ContentVersionKey>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    /// Most recent version in the chain.
    pub fn latest(&self) -> Option<ContentVersionKey> {
        self.versions.last().copied()
    }
}

/// Fingerprints stored on every content version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksums {
    /// Includes identifying and volatile fields.
    pub standard: String,
    /// Content-only fingerprint.
    pub smart: String,
}

/// An immutable version of a concept or mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentVersion {
    /// Arena key.
    pub key: ContentVersionKey,
    /// Owning item.
    pub item: ItemKey,
    /// Owning source.
    pub repository: RepoKey,
    /// Version label, unique within the chain.
    pub label: String,
    /// Versioned URI.
    pub uri: String,
    /// Body.
    pub payload: ContentPayload,
    /// True for the newest version in the chain.
    pub is_latest_version: bool,
    /// Fingerprints of `payload`.
    pub checksums: Checksums,
    /// Previous version in the chain.
    pub previous: Option<ContentVersionKey>,
    /// Optional update comment.
    pub comment: Option<String>,
    /// Actor that wrote the version.
    pub created_by: String,
    /// Write timestamp.
    pub created_at: DateTime<Utc>,
}

impl ContentVersion {
    /// Concept or Mapping.
    pub fn kind(&self) -> ContentKind {
        self.payload.kind()
    }

    /// Mnemonic of the owning item.
    pub fn mnemonic(&self) -> &str {
        self.payload.mnemonic()
    }

    /// Retired flag.
    pub fn retired(&self) -> bool {
        self.payload.retired()
    }
}
