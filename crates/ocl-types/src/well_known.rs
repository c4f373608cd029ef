//! Well-known labels, directives, limits and messages.
//!
//! These values are part of the observable contract of the store: clients match
//! on the messages and send the directive names verbatim.

/// Label of the mutable working copy of every repository.
pub const HEAD: &str = "HEAD";

/// Default locale assigned to new repositories.
pub const DEFAULT_LOCALE: &str = "en";

/// Cascade directive: the resolved concept plus its outgoing mappings.
pub const CASCADE_SOURCE_MAPPINGS: &str = "sourcemappings";

/// Cascade directive: mappings plus the concepts they reach, to a fixed point.
pub const CASCADE_SOURCE_TO_CONCEPTS: &str = "sourcetoconcepts";

/// Prefix of the expansion mnemonic created automatically for a collection version.
pub const AUTO_EXPANSION_PREFIX: &str = "autoexpand-";

/// Built-in validation schema name for the permissive default.
pub const SCHEMA_NONE: &str = "None";

/// Built-in validation schema name for OpenMRS dictionaries.
pub const SCHEMA_OPENMRS: &str = "OpenMRS";

/// Maximum number of names or descriptions on one concept.
pub const MAX_LOCALES: usize = 500;

/// Maximum length of a concept external id under the OpenMRS schema.
pub const OPENMRS_EXTERNAL_ID_LENGTH: usize = 36;

/// Default cap on cascade bundle size.
pub const DEFAULT_CASCADE_MAX_RESULTS: usize = 1000;

/// Characters allowed in repository mnemonics.
pub const NAMESPACE_PATTERN: &str = r"^[a-zA-Z0-9\-\.\_\@]+$";

/// Characters allowed in concept and mapping mnemonics.
pub const CONTENT_MNEMONIC_PATTERN: &str = r"^[a-zA-Z0-9\-\.\_\@\+\%\s]+$";

/// Messages reported to callers.
pub mod messages {
    /// A collection already has a reference with the same expression or code.
    pub const REFERENCE_ALREADY_EXISTS: &str =
        "Concept or Mapping reference name must be unique in a collection.";
    /// The expression did not resolve to any content.
    pub const REFERENCE_NOT_FOUND: &str = "Concept or Mapping not found.";
    /// The expression could not be parsed.
    pub const REFERENCE_INVALID: &str = "Invalid reference expression.";
    /// The expression was recorded as an exclusion.
    pub const REFERENCE_EXCLUDED: &str = "Excluded from the collection.";
    /// A concept needs at least one name.
    pub const NAMES_CANNOT_BE_EMPTY: &str = "A concept must have at least one name";
    /// Concept mnemonics are unique within a source.
    pub const CONCEPT_ALREADY_EXISTS: &str = "Concept ID must be unique within a source.";
    /// Mapping mnemonics are unique within a source.
    pub const MAPPING_ALREADY_EXISTS: &str = "Mapping ID must be unique within a source.";
    /// Writes must be based on the latest version of an item.
    pub const PARENT_NOT_LATEST: &str = "Parent version is not the latest. Cannot update content.";
    /// Retiring an already retired item.
    pub const ALREADY_RETIRED: &str = "Content is already retired";
    /// Unretiring an item that is not retired.
    pub const NOT_RETIRED: &str = "Content is already not retired";
    /// Too many names or descriptions.
    pub const TOO_MANY_LOCALES: &str = "Concept cannot have more than 500 names or descriptions.";
    /// Mnemonic contains disallowed characters.
    pub const INVALID_MNEMONIC: &str = "Mnemonic contains characters that are not allowed.";
    /// Field may not be blank.
    pub const REQUIRED: &str = "This field is required.";

    /// OpenMRS: at least one fully specified name.
    pub const OPENMRS_AT_LEAST_ONE_FULLY_SPECIFIED_NAME: &str =
        "A concept must have at least one fully specified name";
    /// OpenMRS: one fully specified name per locale.
    pub const OPENMRS_ONE_FULLY_SPECIFIED_NAME_PER_LOCALE: &str =
        "A concept may not have more than one fully specified name in any locale";
    /// OpenMRS: at most one short name per locale.
    pub const OPENMRS_NO_MORE_THAN_ONE_SHORT_NAME_PER_LOCALE: &str =
        "A concept cannot have more than one short name in a locale";
    /// OpenMRS: short names cannot be preferred.
    pub const OPENMRS_SHORT_NAME_CANNOT_BE_PREFERRED: &str =
        "A short name cannot be marked as locale preferred";
    /// OpenMRS: one preferred name per locale.
    pub const OPENMRS_NO_MORE_THAN_ONE_PREFERRED_NAME_PER_LOCALE: &str =
        "A concept may not have more than one preferred name in a single locale";
    /// OpenMRS: non-short names unique per locale within a concept.
    pub const OPENMRS_NAMES_EXCEPT_SHORT_MUST_BE_UNIQUE: &str =
        "All names except short names must be unique for a concept and locale";
    /// OpenMRS: fully specified names unique per source and locale.
    pub const OPENMRS_FULLY_SPECIFIED_NAME_UNIQUE_PER_SOURCE_LOCALE: &str =
        "Concept fully specified name must be unique for same source and locale";
    /// OpenMRS: preferred names unique per source and locale.
    pub const OPENMRS_PREFERRED_NAME_UNIQUE_PER_SOURCE_LOCALE: &str =
        "Concept preferred name must be unique for same source and locale";
    /// OpenMRS: external id length.
    pub const OPENMRS_EXTERNAL_ID_LENGTH: &str =
        "Concept External ID cannot be more than 36 characters.";
}

/// Formats the conflict message for a duplicate container version label.
pub fn version_already_exists(label: &str) -> String {
    format!("Version '{label}' already exists.")
}

/// Returns the mnemonic of the automatic expansion for a version label.
pub fn auto_expansion_mnemonic(version_label: &str) -> String {
    format!("{AUTO_EXPANSION_PREFIX}{version_label}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_expansion_mnemonic() {
        assert_eq!(auto_expansion_mnemonic(HEAD), "autoexpand-HEAD");
        assert_eq!(auto_expansion_mnemonic("v1"), "autoexpand-v1");
    }

    #[test]
    fn test_version_conflict_message() {
        assert_eq!(version_already_exists("v1"), "Version 'v1' already exists.");
    }
}
