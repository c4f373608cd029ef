//! Mapping payload types.
//!
//! A mapping is a typed, directed edge between two concept references. Either
//! end may point at a concept that does not exist yet; such ends stay
//! unresolved until a concept with that code is written to the named source.

use serde::{Deserialize, Serialize};

/// One end of a mapping.
///
/// # Examples
///
/// ```
/// use ocl_types::ConceptRef;
///
/// let target = ConceptRef::new("/orgs/WHO/sources/ICD-10/", "A00");
/// assert_eq!(target.concept_uri(), "/orgs/WHO/sources/ICD-10/concepts/A00/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptRef {
    /// URI or canonical URL of the owning source.
    pub source_url: String,
    /// Concept code within that source.
    pub code: String,
    /// Display name, used while the end is unresolved.
    #[serde(default)]
    pub name: Option<String>,
    /// Source version label the end is pinned to.
    #[serde(default)]
    pub source_version: Option<String>,
}

impl ConceptRef {
    /// Creates a reference without a display name.
    pub fn new(source_url: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            code: code.into(),
            name: None,
            source_version: None,
        }
    }

    /// Pins the end to a source version.
    pub fn with_source_version(mut self, label: impl Into<String>) -> Self {
        self.source_version = Some(label.into());
        self
    }

    /// URI of the referenced concept.
    pub fn concept_uri(&self) -> String {
        let base = self.source_url.trim_end_matches('/');
        format!("{base}/concepts/{}/", self.code)
    }
}

/// The body of a mapping version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingPayload {
    /// Mapping id within its source. Empty means "assign one".
    #[serde(default)]
    pub mnemonic: String,
    /// Relation type, e.g. `SAME-AS`.
    pub map_type: String,
    /// Origin concept.
    pub from: ConceptRef,
    /// Target concept.
    pub to: ConceptRef,
    /// Retired flag.
    #[serde(default)]
    pub retired: bool,
    /// External identifier.
    #[serde(default)]
    pub external_id: Option<String>,
    /// Optional ordering weight among sibling mappings.
    #[serde(default)]
    pub sort_weight: Option<f64>,
    /// Arbitrary extensible attributes.
    #[serde(default)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl MappingPayload {
    /// Creates a mapping with only the required fields set.
    pub fn new(map_type: impl Into<String>, from: ConceptRef, to: ConceptRef) -> Self {
        Self {
            mnemonic: String::new(),
            map_type: map_type.into(),
            from,
            to,
            retired: false,
            external_id: None,
            sort_weight: None,
            extras: serde_json::Map::new(),
        }
    }

    /// Sets the mnemonic.
    pub fn with_mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.mnemonic = mnemonic.into();
        self
    }
}
