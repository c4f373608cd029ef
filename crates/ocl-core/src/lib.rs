//! # ocl-core
//!
//! Versioned content graph store with cascade and reference resolution.
//!
//! Content lives on two version axes. Each content item (a concept or a
//! mapping) has a chain of immutable content versions, and each repository (a
//! Source or a Collection) has a mutable `HEAD` plus frozen container versions
//! that snapshot which content versions belonged to it when they were cut.
//!
//! On top of the store sit:
//!
//! - the cascade engine, a level-bounded traversal over mappings and the
//!   concept hierarchy that produces export bundles;
//! - collection references, declarative expressions resolved into concrete
//!   content versions and materialized as expansions;
//! - checksum based deduplication and version diffs;
//! - CSV export and serializable snapshots of the whole graph.
//!
//! ## Usage
//!
//! ```rust
//! use ocl_core::{CascadeParams, ReferenceOptions, TerminologyStore, WriteContext};
//! use ocl_types::{
//!     ConceptPayload, ConceptRef, MappingPayload, OwnerKind, ReferenceExpression,
//!     RepositoryIdentity, RepositoryMetadata,
//! };
//!
//! let mut store = TerminologyStore::new();
//! let ctx = WriteContext::new("admin");
//! let source = RepositoryIdentity::source(OwnerKind::Organization, "CIEL", "CIEL");
//! store.create_repository(&ctx, source.clone(), RepositoryMetadata::named("CIEL")).unwrap();
//!
//! let malaria = store
//!     .write_content(&ctx, &source, ConceptPayload::new("116128", "Diagnosis", "Malaria"), None)
//!     .unwrap();
//! store
//!     .write_content(&ctx, &source, ConceptPayload::new("160148", "Diagnosis", "Malaria, confirmed"), None)
//!     .unwrap();
//! let narrower = MappingPayload::new(
//!     "NARROWER-THAN",
//!     ConceptRef::new("/orgs/CIEL/sources/CIEL/", "116128"),
//!     ConceptRef::new("/orgs/CIEL/sources/CIEL/", "160148"),
//! );
//! store.write_content(&ctx, &source, narrower, None).unwrap();
//!
//! let head = store.head_key(&source).unwrap();
//! let bundle = store.cascade(head, malaria, &CascadeParams::default()).unwrap();
//! assert_eq!(bundle.concepts().count(), 2);
//! assert_eq!(bundle.mappings().count(), 1);
//!
//! let collection = RepositoryIdentity::collection(OwnerKind::User, "jane", "malaria");
//! store.create_repository(&ctx, collection.clone(), RepositoryMetadata::named("Malaria")).unwrap();
//! let collection_head = store.head_key(&collection).unwrap();
//! let outcomes = store
//!     .add_references(
//!         &ctx,
//!         collection_head,
//!         &[ReferenceExpression::uri("/orgs/CIEL/sources/CIEL/concepts/116128/")],
//!         &ReferenceOptions::default(),
//!     )
//!     .unwrap();
//! assert!(outcomes[0].added);
//! assert_eq!(store.graph().context_members(collection_head).len(), 1);
//! ```

pub mod cancel;
pub mod cascade;
pub mod checksum;
pub mod diff;
pub mod export;
pub mod expression;
pub mod graph;
pub mod hooks;
pub mod membership;
pub mod reference;
pub mod snapshot;
mod store;
mod types;
pub mod validation;
mod versioning;
mod writes;

// Re-export ocl-types for convenience
pub use ocl_types;

pub use cancel::CancelFlag;
pub use cascade::{
    Bundle, BundleEntry, CascadeLevels, CascadeMethod, CascadeNode, CascadeParams, MapTypeFilter,
    ReturnMapTypes,
};
pub use checksum::{ChecksumEngine, ChecksumPolicy, ChecksumVariant};
pub use diff::VersionDiff;
pub use graph::ContentGraph;
pub use hooks::{AnyOwner, ContentEvent, EventHook, OwnershipResolver};
pub use membership::MembershipIndex;
pub use reference::{ExpansionPlan, ExpansionRequest, ReferenceOptions, RemoveSelector, Resolution};
pub use snapshot::GraphSnapshot;
pub use store::TerminologyStore;
pub use types::{
    CoreError, CoreResult, EngineConfig, FieldErrors, SchemaFailure, StoreStats, WriteContext,
};
pub use validation::{BuiltinSchemas, ConceptValidator, SchemaProvider};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_are_exported() {
        let _store = TerminologyStore::new();
        let _params = CascadeParams::default();
        let _request = ExpansionRequest::default();
        let _options = ReferenceOptions::default();
        let _flag = CancelFlag::new();
        let _ctx = WriteContext::system();
    }
}
