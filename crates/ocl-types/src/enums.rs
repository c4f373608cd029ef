//! Terminology enumeration types.
//!
//! This module provides enum representations for the coded values that appear in
//! repository URIs and concept payloads: owner kinds, repository kinds, content
//! kinds and name types.

use serde::{Deserialize, Serialize};

/// Kind of owner a repository belongs to.
///
/// # Examples
///
/// ```
/// use ocl_types::OwnerKind;
///
/// assert_eq!(OwnerKind::from_segment("orgs"), Some(OwnerKind::Organization));
/// assert_eq!(OwnerKind::User.segment(), "users");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OwnerKind {
    /// Repository owned by an individual user.
    User,
    /// Repository owned by an organization.
    Organization,
}

impl OwnerKind {
    /// URI path segment for user-owned repositories.
    pub const USER_SEGMENT: &'static str = "users";
    /// URI path segment for organization-owned repositories.
    pub const ORGANIZATION_SEGMENT: &'static str = "orgs";

    /// Creates an OwnerKind from its URI path segment.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            Self::USER_SEGMENT => Some(Self::User),
            Self::ORGANIZATION_SEGMENT => Some(Self::Organization),
            _ => None,
        }
    }

    /// Returns the URI path segment for this owner kind.
    pub fn segment(self) -> &'static str {
        match self {
            Self::User => Self::USER_SEGMENT,
            Self::Organization => Self::ORGANIZATION_SEGMENT,
        }
    }
}

/// Kind of repository.
///
/// A Source is an ontology that owns its content; a Collection is a curated
/// subset whose content is described by references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RepositoryKind {
    /// Ontology that owns concepts and mappings.
    Source,
    /// Curated subset built from references.
    Collection,
}

impl RepositoryKind {
    /// URI path segment for sources.
    pub const SOURCE_SEGMENT: &'static str = "sources";
    /// URI path segment for collections.
    pub const COLLECTION_SEGMENT: &'static str = "collections";

    /// Creates a RepositoryKind from its URI path segment.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            Self::SOURCE_SEGMENT => Some(Self::Source),
            Self::COLLECTION_SEGMENT => Some(Self::Collection),
            _ => None,
        }
    }

    /// Returns the URI path segment for this repository kind.
    pub fn segment(self) -> &'static str {
        match self {
            Self::Source => Self::SOURCE_SEGMENT,
            Self::Collection => Self::COLLECTION_SEGMENT,
        }
    }
}

/// Kind of content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentKind {
    /// An atomic concept.
    Concept,
    /// A typed directed relation between two concepts.
    Mapping,
}

impl ContentKind {
    /// URI path segment for concepts.
    pub const CONCEPT_SEGMENT: &'static str = "concepts";
    /// URI path segment for mappings.
    pub const MAPPING_SEGMENT: &'static str = "mappings";

    /// Creates a ContentKind from its URI path segment.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            Self::CONCEPT_SEGMENT => Some(Self::Concept),
            Self::MAPPING_SEGMENT => Some(Self::Mapping),
            _ => None,
        }
    }

    /// Returns the URI path segment for this content kind.
    pub fn segment(self) -> &'static str {
        match self {
            Self::Concept => Self::CONCEPT_SEGMENT,
            Self::Mapping => Self::MAPPING_SEGMENT,
        }
    }

    /// Human-readable label used in messages ("Concept" / "Mapping").
    pub fn label(self) -> &'static str {
        match self {
            Self::Concept => "Concept",
            Self::Mapping => "Mapping",
        }
    }
}

/// Classification of a concept name's `name_type`.
///
/// Name types are free text in payloads. Several spellings are in circulation
/// for the same type, so classification is lenient.
///
/// # Examples
///
/// ```
/// use ocl_types::NameType;
///
/// assert_eq!(NameType::classify(Some("FULLY_SPECIFIED")), NameType::FullySpecified);
/// assert_eq!(NameType::classify(Some("Fully Specified")), NameType::FullySpecified);
/// assert_eq!(NameType::classify(Some("SHORT")), NameType::Short);
/// assert_eq!(NameType::classify(None), NameType::Other);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameType {
    /// Fully specified name.
    FullySpecified,
    /// Short name.
    Short,
    /// Index term (search synonym).
    IndexTerm,
    /// Anything else, including a missing name type.
    Other,
}

impl NameType {
    /// Canonical spelling of the fully specified name type.
    pub const FULLY_SPECIFIED: &'static str = "FULLY_SPECIFIED";
    /// Canonical spelling of the short name type.
    pub const SHORT: &'static str = "SHORT";
    /// Canonical spelling of the index term name type.
    pub const INDEX_TERM: &'static str = "INDEX_TERM";

    /// Classifies a raw name type, ignoring case, spaces, dashes and underscores.
    pub fn classify(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Other;
        };
        let normalized: String = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "fullyspecified" => Self::FullySpecified,
            "short" => Self::Short,
            "indexterm" => Self::IndexTerm,
            _ => Self::Other,
        }
    }

    /// Returns true for fully specified names.
    pub fn is_fully_specified(self) -> bool {
        self == Self::FullySpecified
    }

    /// Returns true for short names.
    pub fn is_short(self) -> bool {
        self == Self::Short
    }
}
