//! Collection references.
//!
//! A reference is a small declarative pointer stored against a collection
//! version. References say what a collection conceptually includes; the
//! expansion holds what it concretely contains.
//!
//! # Example
//!
//! ```
//! use ocl_types::{CascadeDirective, ReferenceExpression};
//!
//! let uri = ReferenceExpression::uri("/orgs/CIEL/sources/CIEL/concepts/1234/");
//! assert_eq!(uri.to_string(), "/orgs/CIEL/sources/CIEL/concepts/1234/");
//!
//! assert_eq!(
//!     CascadeDirective::from_name("sourcemappings"),
//!     Some(CascadeDirective::SourceMappings)
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{well_known, ContainerVersionKey, ContentKind, ContentVersionKey, ReferenceKey};

/// Cascade directive attached to a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CascadeDirective {
    /// The resolved concept plus its qualifying mappings.
    #[serde(rename = "sourcemappings")]
    SourceMappings,
    /// Mappings plus the concepts they reach, to a fixed point.
    #[serde(rename = "sourcetoconcepts")]
    SourceToConcepts,
}

impl CascadeDirective {
    /// Parses a directive name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            well_known::CASCADE_SOURCE_MAPPINGS => Some(Self::SourceMappings),
            well_known::CASCADE_SOURCE_TO_CONCEPTS => Some(Self::SourceToConcepts),
            _ => None,
        }
    }

    /// Directive name as sent by clients.
    pub fn name(self) -> &'static str {
        match self {
            Self::SourceMappings => well_known::CASCADE_SOURCE_MAPPINGS,
            Self::SourceToConcepts => well_known::CASCADE_SOURCE_TO_CONCEPTS,
        }
    }
}

/// Structured reference form.
///
/// `system` is a repository URI or canonical URL; `version` selects a
/// container version of it; `code` selects one concept or mapping;
/// `resource_version` pins a version of that item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredReference {
    /// Repository URI or canonical URL.
    pub system: String,
    /// Container version label.
    pub version: Option<String>,
    /// Concept or mapping code.
    pub code: Option<String>,
    /// Content version label.
    pub resource_version: Option<String>,
    /// Kind of content referenced (concepts when a code is given and this is unset).
    pub reference_type: Option<ContentKind>,
    /// Cascade directive.
    pub cascade: Option<CascadeDirective>,
}

/// A reference expression as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReferenceExpression {
    /// Relative URI: a repository root, a container version, or one item.
    Uri(String),
    /// Structured form.
    Structured(StructuredReference),
}

impl ReferenceExpression {
    /// Creates a URI expression.
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }

    /// Cascade directive carried by the expression itself.
    pub fn cascade(&self) -> Option<CascadeDirective> {
        match self {
            Self::Uri(_) => None,
            Self::Structured(structured) => structured.cascade,
        }
    }
}

impl std::fmt::Display for ReferenceExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uri(uri) => f.write_str(uri),
            Self::Structured(structured) => {
                write!(f, "{}", structured.system)?;
                if let Some(version) = &structured.version {
                    write!(f, "|{version}")?;
                }
                if let Some(code) = &structured.code {
                    write!(f, "#{code}")?;
                }
                if let Some(resource_version) = &structured.resource_version {
                    write!(f, "@{resource_version}")?;
                }
                Ok(())
            }
        }
    }
}

/// A persisted reference on a collection version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReference {
    /// Arena key.
    pub key: ReferenceKey,
    /// Collection version holding the reference.
    pub collection_version: ContainerVersionKey,
    /// The stored expression (pinned when transformed to latest).
    pub expression: ReferenceExpression,
    /// Versionless form of the expression, used for uniqueness.
    pub versionless: String,
    /// Include (true) or exclude (false).
    pub include: bool,
    /// Cascade directive applied during resolution.
    pub cascade: Option<CascadeDirective>,
    /// Kind and mnemonic when the reference targets a single item.
    pub target: Option<(ContentKind, String)>,
    /// Concrete versions the reference resolved to when last resolved.
    pub resolved: Vec<ContentVersionKey>,
    /// Reference this one was derived from by a cascade directive.
    pub derived_from: Option<ReferenceKey>,
    /// Actor that added the reference.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Outcome classification of one expression in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceOutcomeKind {
    /// Persisted as an include reference.
    Included,
    /// Persisted as an exclude reference.
    Excluded,
    /// Not persisted.
    Rejected,
}

/// Per-expression result of `add_references`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceOutcome {
    /// The expression as submitted.
    pub expression: String,
    /// Whether the reference was added to the collection.
    pub added: bool,
    /// Included, excluded or rejected.
    pub kind: ReferenceOutcomeKind,
    /// Diagnostic message.
    pub message: Option<String>,
    /// Concrete versions resolved (including cascade-derived ones).
    pub members: Vec<ContentVersionKey>,
}
