//! # ocl-types
//!
//! Type definitions for versioned terminology content.
//!
//! This crate provides the plain data model shared by the content store and its
//! callers: repositories (Sources and Collections), their container versions,
//! concept and mapping payloads, content items with their version chains,
//! collection references and expansions.
//!
//! Every record is addressed by a stable arena key ([`RepoKey`],
//! [`ContainerVersionKey`], [`ItemKey`], [`ContentVersionKey`],
//! [`ReferenceKey`], [`ExpansionKey`]). Relations between records are stored
//! as keys, never as embedded lists of other records.
//!
//! ## Usage
//!
//! ```rust
//! use ocl_types::{ConceptName, ConceptPayload, ContentPayload, OwnerKind, RepositoryIdentity};
//! use ocl_types::well_known;
//!
//! let source = RepositoryIdentity::source(OwnerKind::Organization, "CIEL", "CIEL");
//! assert_eq!(source.version_uri(well_known::HEAD), "/orgs/CIEL/sources/CIEL/");
//!
//! let payload = ContentPayload::from(ConceptPayload {
//!     mnemonic: "1234".to_string(),
//!     concept_class: "Diagnosis".to_string(),
//!     names: vec![ConceptName::fully_specified("Malaria", "en")],
//!     ..Default::default()
//! });
//! assert_eq!(payload.mnemonic(), "1234");
//! ```

#![warn(missing_docs)]

mod concept;
mod container;
mod content;
mod enums;
mod expansion;
mod keys;
mod mapping;
pub mod reference;
mod repository;
pub mod well_known;

// Re-export all public types at crate root
pub use concept::{ConceptDescription, ConceptName, ConceptPayload};
pub use container::{ContainerVersion, VersionAdminUpdate, VersionMetadata};
pub use content::{Checksums, ContentItem, ContentPayload, ContentVersion};
pub use enums::{ContentKind, NameType, OwnerKind, RepositoryKind};
pub use expansion::{Expansion, ExpansionParameters};
pub use keys::{
    ContainerVersionKey, ContentVersionKey, ExpansionKey, ItemKey, ReferenceKey, RepoKey,
};
pub use mapping::{ConceptRef, MappingPayload};
pub use reference::{
    CascadeDirective, CollectionReference, ReferenceExpression, ReferenceOutcome,
    ReferenceOutcomeKind, StructuredReference,
};
pub use repository::{Repository, RepositoryIdentity, RepositoryMetadata};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_are_exported() {
        // Verify all types are accessible from crate root
        let _kind = ContentKind::Concept;
        let _owner = OwnerKind::Organization;
        let _repo = RepositoryKind::Collection;
        let _key = ContentVersionKey(1);
        let _directive = CascadeDirective::SourceToConcepts;
        let _name_type = NameType::Short;
    }

    #[test]
    fn test_well_known_accessible() {
        assert_eq!(well_known::HEAD, "HEAD");
        assert_eq!(well_known::MAX_LOCALES, 500);
    }

    #[test]
    fn test_serde_roundtrip() {
        let concept = ConceptPayload {
            mnemonic: "c1".to_string(),
            concept_class: "Misc".to_string(),
            names: vec![ConceptName::fully_specified("Thing", "en")],
            ..Default::default()
        };

        let json = serde_json::to_string(&concept).unwrap();
        let parsed: ConceptPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(concept, parsed);
    }
}
