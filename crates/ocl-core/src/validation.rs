//! Payload validation and pluggable repository validation schemas.
//!
//! Every write runs the basic payload checks. A repository may additionally
//! attach a named schema; the [`SchemaProvider`] maps that name to a
//! [`ConceptValidator`]. Schema validation runs over the whole set of
//! HEAD-active concepts so that repository-wide rules (unique fully specified
//! names per locale, for example) can be enforced, and all failures are
//! reported together.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use ocl_types::well_known::{self, messages};
use ocl_types::{ConceptPayload, MappingPayload, NameType, RepositoryIdentity, RepositoryMetadata};

use crate::types::{FieldErrors, SchemaFailure};

static NAMESPACE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static CONTENT_MNEMONIC_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|regex| regex.is_match(value))
}

/// Returns true when `mnemonic` is a valid repository mnemonic.
pub fn is_valid_repository_mnemonic(mnemonic: &str) -> bool {
    matches(&NAMESPACE_REGEX, well_known::NAMESPACE_PATTERN, mnemonic)
}

/// Returns true when `mnemonic` is a valid concept or mapping mnemonic.
pub fn is_valid_content_mnemonic(mnemonic: &str) -> bool {
    matches(&CONTENT_MNEMONIC_REGEX, well_known::CONTENT_MNEMONIC_PATTERN, mnemonic)
}

/// Checks the identity and metadata of a repository being created.
pub fn validate_repository(identity: &RepositoryIdentity, metadata: &RepositoryMetadata) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if identity.mnemonic.trim().is_empty() {
        errors.add("mnemonic", messages::REQUIRED);
    } else if !is_valid_repository_mnemonic(&identity.mnemonic) {
        errors.add("mnemonic", messages::INVALID_MNEMONIC);
    }
    if identity.owner.trim().is_empty() {
        errors.add("owner", messages::REQUIRED);
    }
    if metadata.name.trim().is_empty() {
        errors.add("name", messages::REQUIRED);
    }
    if metadata.default_locale.trim().is_empty() {
        errors.add("default_locale", messages::REQUIRED);
    }
    errors
}

/// Basic checks every concept must pass.
pub fn validate_concept(concept: &ConceptPayload) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if concept.mnemonic.trim().is_empty() {
        errors.add("mnemonic", messages::REQUIRED);
    } else if !is_valid_content_mnemonic(&concept.mnemonic) {
        errors.add("mnemonic", messages::INVALID_MNEMONIC);
    }
    if concept.concept_class.trim().is_empty() {
        errors.add("concept_class", messages::REQUIRED);
    }
    if concept.names.is_empty() {
        errors.add("names", messages::NAMES_CANNOT_BE_EMPTY);
    }
    if concept.names.len() > well_known::MAX_LOCALES
        || concept.descriptions.len() > well_known::MAX_LOCALES
    {
        errors.add("names", messages::TOO_MANY_LOCALES);
    }
    for name in &concept.names {
        if name.name.trim().is_empty() {
            errors.add("names", format!("name: {}", messages::REQUIRED));
        }
        if name.locale.trim().is_empty() {
            errors.add("names", format!("locale: {}", messages::REQUIRED));
        }
    }
    for description in &concept.descriptions {
        if description.locale.trim().is_empty() {
            errors.add("descriptions", format!("locale: {}", messages::REQUIRED));
        }
    }
    errors
}

/// Basic checks every mapping must pass.
pub fn validate_mapping(mapping: &MappingPayload) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if !mapping.mnemonic.is_empty() && !is_valid_content_mnemonic(&mapping.mnemonic) {
        errors.add("mnemonic", messages::INVALID_MNEMONIC);
    }
    if mapping.map_type.trim().is_empty() {
        errors.add("map_type", messages::REQUIRED);
    }
    for (field, end) in [("from", &mapping.from), ("to", &mapping.to)] {
        if end.source_url.trim().is_empty() {
            errors.add(format!("{field}_source_url"), messages::REQUIRED);
        }
        if end.code.trim().is_empty() {
            errors.add(format!("{field}_concept_code"), messages::REQUIRED);
        }
    }
    errors
}

/// A concept under schema validation.
#[derive(Debug, Clone, Copy)]
pub struct SchemaSubject<'a> {
    /// URI reported on failure.
    pub url: &'a str,
    /// The concept body.
    pub concept: &'a ConceptPayload,
}

/// A validation schema.
pub trait ConceptValidator: Send + Sync {
    /// Schema name.
    fn name(&self) -> &str;

    /// Checks one concept on its own.
    fn validate(&self, concept: &ConceptPayload) -> FieldErrors;

    /// Checks a set of concepts, including rules spanning several of them.
    ///
    /// Returns one failure per failing concept.
    fn validate_set(&self, subjects: &[SchemaSubject<'_>]) -> Vec<SchemaFailure> {
        subjects
            .iter()
            .filter_map(|subject| {
                let errors = self.validate(subject.concept);
                (!errors.is_empty()).then(|| SchemaFailure {
                    mnemonic: subject.concept.mnemonic.clone(),
                    url: subject.url.to_string(),
                    errors,
                })
            })
            .collect()
    }
}

/// Maps schema names to validators.
pub trait SchemaProvider: Send + Sync {
    /// Validator for a schema name, or `None` when the name is unknown.
    fn validator_for(&self, schema: &str) -> Option<Arc<dyn ConceptValidator>>;
}

/// The permissive default schema: basic checks only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

impl ConceptValidator for BasicValidator {
    fn name(&self) -> &str {
        well_known::SCHEMA_NONE
    }

    fn validate(&self, concept: &ConceptPayload) -> FieldErrors {
        validate_concept(concept)
    }
}

/// Dictionary rules used by OpenMRS.
///
/// Retired concepts are exempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenMrsValidator;

impl ConceptValidator for OpenMrsValidator {
    fn name(&self) -> &str {
        well_known::SCHEMA_OPENMRS
    }

    fn validate(&self, concept: &ConceptPayload) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if concept.retired {
            return errors;
        }

        if concept
            .external_id
            .as_ref()
            .is_some_and(|id| id.chars().count() > well_known::OPENMRS_EXTERNAL_ID_LENGTH)
        {
            errors.add("external_id", messages::OPENMRS_EXTERNAL_ID_LENGTH);
        }

        let mut preferred: HashMap<&str, usize> = HashMap::new();
        let mut fully_specified: HashMap<&str, usize> = HashMap::new();
        let mut short: HashMap<&str, usize> = HashMap::new();
        let mut seen: HashSet<(&str, &str)> = HashSet::new();

        for name in &concept.names {
            let kind = name.kind();
            if name.locale_preferred {
                *preferred.entry(name.locale.as_str()).or_default() += 1;
            }
            match kind {
                NameType::FullySpecified => *fully_specified.entry(name.locale.as_str()).or_default() += 1,
                NameType::Short => {
                    *short.entry(name.locale.as_str()).or_default() += 1;
                    if name.locale_preferred {
                        errors.add("names", messages::OPENMRS_SHORT_NAME_CANNOT_BE_PREFERRED);
                    }
                }
                NameType::IndexTerm | NameType::Other => {}
            }
            if !kind.is_short() && !seen.insert((name.locale.as_str(), name.name.as_str())) {
                errors.add("names", messages::OPENMRS_NAMES_EXCEPT_SHORT_MUST_BE_UNIQUE);
            }
        }

        if fully_specified.is_empty() {
            errors.add("names", messages::OPENMRS_AT_LEAST_ONE_FULLY_SPECIFIED_NAME);
        }
        if fully_specified.values().any(|count| *count > 1) {
            errors.add("names", messages::OPENMRS_ONE_FULLY_SPECIFIED_NAME_PER_LOCALE);
        }
        if short.values().any(|count| *count > 1) {
            errors.add("names", messages::OPENMRS_NO_MORE_THAN_ONE_SHORT_NAME_PER_LOCALE);
        }
        if preferred.values().any(|count| *count > 1) {
            errors.add("names", messages::OPENMRS_NO_MORE_THAN_ONE_PREFERRED_NAME_PER_LOCALE);
        }
        errors
    }

    fn validate_set(&self, subjects: &[SchemaSubject<'_>]) -> Vec<SchemaFailure> {
        let mut per_subject: BTreeMap<usize, FieldErrors> = BTreeMap::new();
        for (index, subject) in subjects.iter().enumerate() {
            let errors = self.validate(subject.concept);
            if !errors.is_empty() {
                per_subject.insert(index, errors);
            }
        }

        // (locale, name) -> subjects using it, per rule
        let mut fully_specified: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
        let mut preferred: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
        for (index, subject) in subjects.iter().enumerate() {
            if subject.concept.retired {
                continue;
            }
            for name in &subject.concept.names {
                let key = (name.locale.as_str(), name.name.as_str());
                if name.kind().is_fully_specified() {
                    fully_specified.entry(key).or_default().push(index);
                }
                if name.locale_preferred {
                    preferred.entry(key).or_default().push(index);
                }
            }
        }
        for (groups, message) in [
            (&fully_specified, messages::OPENMRS_FULLY_SPECIFIED_NAME_UNIQUE_PER_SOURCE_LOCALE),
            (&preferred, messages::OPENMRS_PREFERRED_NAME_UNIQUE_PER_SOURCE_LOCALE),
        ] {
            for indexes in groups.values().filter(|indexes| indexes.len() > 1) {
                for index in indexes {
                    per_subject.entry(*index).or_default().add("names", message);
                }
            }
        }

        per_subject
            .into_iter()
            .map(|(index, errors)| SchemaFailure {
                mnemonic: subjects[index].concept.mnemonic.clone(),
                url: subjects[index].url.to_string(),
                errors,
            })
            .collect()
    }
}

/// Provider knowing the built-in schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinSchemas;

impl SchemaProvider for BuiltinSchemas {
    fn validator_for(&self, schema: &str) -> Option<Arc<dyn ConceptValidator>> {
        match schema {
            well_known::SCHEMA_NONE => Some(Arc::new(BasicValidator)),
            well_known::SCHEMA_OPENMRS => Some(Arc::new(OpenMrsValidator)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocl_types::{ConceptName, ConceptRef, OwnerKind};

    fn make_name(name: &str, locale: &str, preferred: bool, name_type: Option<&str>) -> ConceptName {
        ConceptName {
            name: name.to_string(),
            locale: locale.to_string(),
            locale_preferred: preferred,
            name_type: name_type.map(str::to_string),
            external_id: None,
        }
    }

    fn make_concept(mnemonic: &str, names: Vec<ConceptName>) -> ConceptPayload {
        ConceptPayload {
            mnemonic: mnemonic.to_string(),
            concept_class: "Diagnosis".to_string(),
            names,
            ..Default::default()
        }
    }

    #[test]
    fn test_mnemonic_patterns() {
        assert!(is_valid_repository_mnemonic("CIEL-2.0_x@y"));
        assert!(!is_valid_repository_mnemonic("with space"));
        assert!(is_valid_content_mnemonic("with space+%"));
        assert!(!is_valid_content_mnemonic("slash/not"));
    }

    #[test]
    fn test_validate_repository() {
        let identity = RepositoryIdentity::source(OwnerKind::Organization, "", "bad name");
        let errors = validate_repository(&identity, &RepositoryMetadata::default());
        assert!(errors.get("mnemonic").is_some());
        assert!(errors.get("owner").is_some());
        assert!(errors.get("name").is_some());
    }

    #[test]
    fn test_basic_concept_needs_a_name() {
        let errors = validate_concept(&make_concept("c1", vec![]));
        assert_eq!(
            errors.get("names"),
            Some(&[messages::NAMES_CANNOT_BE_EMPTY.to_string()][..])
        );
    }

    #[test]
    fn test_basic_mapping_requires_ends() {
        let mapping = MappingPayload::new("", ConceptRef::new("", "c1"), ConceptRef::new("/s/", ""));
        let errors = validate_mapping(&mapping);
        assert!(errors.get("map_type").is_some());
        assert!(errors.get("from_source_url").is_some());
        assert!(errors.get("to_concept_code").is_some());
    }

    #[test]
    fn test_openmrs_requires_fully_specified_name() {
        let concept = make_concept("c1", vec![make_name("Malaria", "en", true, None)]);
        let errors = OpenMrsValidator.validate(&concept);
        assert!(errors
            .get("names")
            .unwrap()
            .contains(&messages::OPENMRS_AT_LEAST_ONE_FULLY_SPECIFIED_NAME.to_string()));
    }

    #[test]
    fn test_openmrs_short_name_rules() {
        let concept = make_concept(
            "c1",
            vec![
                make_name("Malaria", "en", false, Some("FULLY_SPECIFIED")),
                make_name("MAL", "en", true, Some("SHORT")),
                make_name("ML", "en", false, Some("SHORT")),
            ],
        );
        let names = OpenMrsValidator.validate(&concept).get("names").unwrap().to_vec();
        assert!(names.contains(&messages::OPENMRS_SHORT_NAME_CANNOT_BE_PREFERRED.to_string()));
        assert!(names.contains(&messages::OPENMRS_NO_MORE_THAN_ONE_SHORT_NAME_PER_LOCALE.to_string()));
    }

    #[test]
    fn test_openmrs_external_id_length() {
        let mut concept = make_concept("c1", vec![ConceptName::fully_specified("Malaria", "en")]);
        concept.external_id = Some("x".repeat(37));
        let errors = OpenMrsValidator.validate(&concept);
        assert!(errors.get("external_id").is_some());

        concept.retired = true;
        assert!(OpenMrsValidator.validate(&concept).is_empty());
    }

    #[test]
    fn test_openmrs_unique_fully_specified_name_across_concepts() {
        let a = make_concept("a", vec![ConceptName::fully_specified("Malaria", "en")]);
        let b = make_concept("b", vec![ConceptName::fully_specified("Malaria", "en")]);
        let c = make_concept("c", vec![ConceptName::fully_specified("Fever", "en")]);
        let subjects = [
            SchemaSubject { url: "/a/", concept: &a },
            SchemaSubject { url: "/b/", concept: &b },
            SchemaSubject { url: "/c/", concept: &c },
        ];
        let failures = OpenMrsValidator.validate_set(&subjects);
        let failed: Vec<&str> = failures.iter().map(|f| f.mnemonic.as_str()).collect();
        assert_eq!(failed, vec!["a", "b"]);
    }

    #[test]
    fn test_builtin_provider() {
        assert!(BuiltinSchemas.validator_for("OpenMRS").is_some());
        assert_eq!(BuiltinSchemas.validator_for("None").unwrap().name(), "None");
        assert!(BuiltinSchemas.validator_for("Unknown").is_none());
    }
}
