//! Concept payload types.
//!
//! This module provides `ConceptPayload`, the versioned body of a concept,
//! together with its localized names and descriptions.

use serde::{Deserialize, Serialize};

use crate::NameType;

/// A localized name of a concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptName {
    /// The name text.
    pub name: String,
    /// Locale code, e.g. `en`.
    pub locale: String,
    /// Whether this is the preferred name in its locale.
    #[serde(default)]
    pub locale_preferred: bool,
    /// Free-text name type (see [`NameType`]).
    #[serde(default)]
    pub name_type: Option<String>,
    /// External identifier.
    #[serde(default)]
    pub external_id: Option<String>,
}

impl ConceptName {
    /// Creates a fully specified, locale preferred name.
    pub fn fully_specified(name: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locale: locale.into(),
            locale_preferred: true,
            name_type: Some(NameType::FULLY_SPECIFIED.to_string()),
            external_id: None,
        }
    }

    /// Classifies the name type.
    pub fn kind(&self) -> NameType {
        NameType::classify(self.name_type.as_deref())
    }
}

/// A localized description of a concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptDescription {
    /// The description text.
    pub description: String,
    /// Locale code.
    pub locale: String,
    /// Whether this is the preferred description in its locale.
    #[serde(default)]
    pub locale_preferred: bool,
    /// Free-text description type.
    #[serde(default)]
    pub description_type: Option<String>,
    /// External identifier.
    #[serde(default)]
    pub external_id: Option<String>,
}

/// The body of a concept version.
///
/// # Examples
///
/// ```
/// use ocl_types::{ConceptName, ConceptPayload};
///
/// let concept = ConceptPayload {
///     mnemonic: "1234".to_string(),
///     concept_class: "Diagnosis".to_string(),
///     datatype: Some("N/A".to_string()),
///     names: vec![ConceptName::fully_specified("Malaria", "en")],
///     ..Default::default()
/// };
///
/// assert_eq!(concept.display_name(Some("en")), Some("Malaria"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptPayload {
    /// Concept code, unique within its source.
    pub mnemonic: String,
    /// Concept class, e.g. `Diagnosis`.
    pub concept_class: String,
    /// Datatype, e.g. `Numeric`.
    pub datatype: Option<String>,
    /// Retired flag.
    pub retired: bool,
    /// External identifier.
    pub external_id: Option<String>,
    /// Localized names.
    pub names: Vec<ConceptName>,
    /// Localized descriptions.
    pub descriptions: Vec<ConceptDescription>,
    /// URIs of parent concepts in the hierarchy.
    pub parent_concept_urls: Vec<String>,
    /// Arbitrary extensible attributes.
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl ConceptPayload {
    /// Creates a concept with one fully specified English name.
    pub fn new(
        mnemonic: impl Into<String>,
        concept_class: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            concept_class: concept_class.into(),
            names: vec![ConceptName::fully_specified(name, crate::well_known::DEFAULT_LOCALE)],
            ..Default::default()
        }
    }

    /// Adds a parent concept URI.
    pub fn with_parent(mut self, parent_url: impl Into<String>) -> Self {
        self.parent_concept_urls.push(parent_url.into());
        self
    }

    /// Returns the fully specified names.
    pub fn fully_specified_names(&self) -> impl Iterator<Item = &ConceptName> {
        self.names.iter().filter(|n| n.kind().is_fully_specified())
    }

    /// Best display name: preferred in `locale`, then any preferred, then the first name.
    pub fn display_name(&self, locale: Option<&str>) -> Option<&str> {
        let preferred_in_locale = locale.and_then(|locale| {
            self.names
                .iter()
                .find(|n| n.locale_preferred && n.locale == locale)
        });
        preferred_in_locale
            .or_else(|| self.names.iter().find(|n| n.locale_preferred))
            .or_else(|| self.names.first())
            .map(|n| n.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_name(name: &str, locale: &str, preferred: bool, name_type: Option<&str>) -> ConceptName {
        ConceptName {
            name: name.to_string(),
            locale: locale.to_string(),
            locale_preferred: preferred,
            name_type: name_type.map(str::to_string),
            external_id: None,
        }
    }

    #[test]
    fn test_display_name_prefers_locale() {
        let concept = ConceptPayload {
            mnemonic: "c1".to_string(),
            names: vec![
                make_name("Paludisme", "fr", true, None),
                make_name("Malaria", "en", true, Some("FULLY_SPECIFIED")),
                make_name("Marsh fever", "en", false, None),
            ],
            ..Default::default()
        };
        assert_eq!(concept.display_name(Some("en")), Some("Malaria"));
        assert_eq!(concept.display_name(Some("fr")), Some("Paludisme"));
        assert_eq!(concept.display_name(Some("es")), Some("Paludisme"));
        assert_eq!(concept.fully_specified_names().count(), 1);
    }

    #[test]
    fn test_display_name_falls_back_to_first() {
        let concept = ConceptPayload {
            names: vec![make_name("Only", "en", false, None)],
            ..Default::default()
        };
        assert_eq!(concept.display_name(None), Some("Only"));
        assert_eq!(ConceptPayload::default().display_name(None), None);
    }
}
