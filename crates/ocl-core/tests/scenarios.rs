//! End-to-end properties of the content store.

use std::collections::BTreeSet;

use ocl_core::{
    CascadeLevels, CascadeParams, ChecksumEngine, CoreError, ExpansionRequest, ReferenceOptions,
    RemoveSelector, TerminologyStore, WriteContext,
};
use ocl_types::well_known::{self, messages};
use ocl_types::{
    CascadeDirective, ConceptPayload, ConceptRef, ContainerVersionKey, ContentVersionKey, MappingPayload, OwnerKind,
    ReferenceExpression, ReferenceOutcomeKind, RepositoryIdentity, RepositoryMetadata,
    StructuredReference, VersionMetadata,
};
use serde_json::json;

const SOURCE_URI: &str = "/orgs/org/sources/S/";

fn source_identity() -> RepositoryIdentity {
    RepositoryIdentity::source(OwnerKind::Organization, "org", "S")
}

fn collection_identity() -> RepositoryIdentity {
    RepositoryIdentity::collection(OwnerKind::Organization, "org", "Coll")
}

fn concept_uri(code: &str) -> ReferenceExpression {
    ReferenceExpression::uri(format!("{SOURCE_URI}concepts/{code}/"))
}

fn mapping(mnemonic: &str, from: &str, to: &str) -> MappingPayload {
    MappingPayload::new(
        "SAME-AS",
        ConceptRef::new(SOURCE_URI, from),
        ConceptRef::new(SOURCE_URI, to),
    )
    .with_mnemonic(mnemonic)
}

enum Step {
    Add(ReferenceExpression, ReferenceOptions),
    /// Expression or versionless form, and how many references it removes.
    Remove(String, usize),
}

struct Scenario {
    store: TerminologyStore,
    ctx: WriteContext,
    concepts: Vec<ContentVersionKey>,
    mappings: Vec<ContentVersionKey>,
}

impl Scenario {
    /// Source S with the given concepts and SAME-AS mappings.
    fn new(codes: &[&str], edges: &[(&str, &str, &str)]) -> Self {
        let mut store = TerminologyStore::new();
        let ctx = WriteContext::new("curator");
        store
            .create_repository(&ctx, source_identity(), RepositoryMetadata::named("S"))
            .unwrap();
        let concepts = codes
            .iter()
            .map(|code| {
                store
                    .write_content(&ctx, &source_identity(), ConceptPayload::new(*code, "Misc", *code), None)
                    .unwrap()
            })
            .collect();
        let mappings = edges
            .iter()
            .map(|(mnemonic, from, to)| {
                store
                    .write_content(&ctx, &source_identity(), mapping(mnemonic, from, to), None)
                    .unwrap()
            })
            .collect();
        Self {
            store,
            ctx,
            concepts,
            mappings,
        }
    }

    fn source_head(&self) -> ContainerVersionKey {
        self.store.head_key(&source_identity()).unwrap()
    }

    fn collection_head(&mut self) -> ContainerVersionKey {
        if let Ok(head) = self.store.head_key(&collection_identity()) {
            return head;
        }
        self.store
            .create_repository(&self.ctx, collection_identity(), RepositoryMetadata::named("Coll"))
            .unwrap();
        self.store.head_key(&collection_identity()).unwrap()
    }

    fn members(&self, version: ContainerVersionKey) -> BTreeSet<ContentVersionKey> {
        self.store.graph().context_members(version)
    }

    /// Applies each step and checks the maintained membership against a full
    /// recomputation after every one of them.
    fn run_against_full_expansion(&mut self, head: ContainerVersionKey, steps: Vec<Step>) {
        for (index, step) in steps.into_iter().enumerate() {
            match step {
                Step::Add(expression, options) => {
                    let outcomes = self
                        .store
                        .add_references(&self.ctx, head, &[expression], &options)
                        .unwrap();
                    assert!(outcomes[0].added || options.exclude, "step {index}: {outcomes:?}");
                }
                Step::Remove(expression, expected) => {
                    let removed = self
                        .store
                        .remove_references(&self.ctx, head, &RemoveSelector::Expressions(vec![expression]))
                        .unwrap();
                    assert_eq!(removed, expected, "step {index}");
                }
            }
            let incremental = self.members(head);
            let plan = self.store.plan_expansion(head, &ExpansionRequest::default()).unwrap();
            assert_eq!(plan.members, incremental, "step {index}");
        }
    }
}

#[test]
fn test_exactly_one_head_per_repository() {
    let mut s = Scenario::new(&["c1"], &[]);
    s.collection_head();
    for label in ["v1", "v2"] {
        s.store
            .cut_version(&s.ctx, &source_identity(), label, VersionMetadata::default())
            .unwrap();
    }
    assert!(matches!(
        s.store
            .cut_version(&s.ctx, &source_identity(), well_known::HEAD, VersionMetadata::default()),
        Err(CoreError::Conflict { .. })
    ));
    assert!(matches!(
        s.store
            .cut_version(&s.ctx, &source_identity(), "v1", VersionMetadata::default()),
        Err(CoreError::Conflict { .. })
    ));

    for repo in s.store.graph().repositories() {
        let heads = s
            .store
            .graph()
            .versions_of(repo.key)
            .into_iter()
            .filter(|version| version.label == well_known::HEAD)
            .count();
        assert_eq!(heads, 1, "{}", repo.uri());
    }
}

#[test]
fn test_cut_version_seeds_membership_from_head() {
    let mut s = Scenario::new(&["c1", "c2"], &[("m1", "c1", "c2")]);
    let before = s.members(s.source_head());
    s.store
        .cut_version(&s.ctx, &source_identity(), "v1", VersionMetadata::default())
        .unwrap();
    let v1 = s.store.version_key(&source_identity(), "v1").unwrap();
    assert_eq!(s.members(v1), before);

    s.store
        .write_content(&s.ctx, &source_identity(), ConceptPayload::new("c3", "Misc", "c3"), None)
        .unwrap();
    assert_eq!(s.members(v1), before);
    assert_eq!(s.members(s.source_head()).len(), before.len() + 1);
}

#[test]
fn test_add_references_is_idempotent() {
    let mut s = Scenario::new(&["c1", "c2"], &[]);
    let head = s.collection_head();
    let expressions = [concept_uri("c1"), concept_uri("c2")];
    let first = s
        .store
        .add_references(&s.ctx, head, &expressions, &ReferenceOptions::default())
        .unwrap();
    assert!(first.iter().all(|outcome| outcome.added));
    let after_first = s.members(head);

    let second = s
        .store
        .add_references(&s.ctx, head, &expressions, &ReferenceOptions::default())
        .unwrap();
    assert!(second.iter().all(|outcome| !outcome.added));
    assert_eq!(s.members(head), after_first);
    assert_eq!(after_first.len(), 2);
}

#[test]
fn test_incremental_matches_full_expansion() {
    let mut s = Scenario::new(&["c1", "c2", "c3", "c4"], &[("m1", "c1", "c2"), ("m2", "c3", "c4")]);
    let head = s.collection_head();
    let include = ReferenceOptions::default();
    let exclude = ReferenceOptions {
        exclude: true,
        ..ReferenceOptions::default()
    };
    let cascade = ReferenceOptions {
        cascade: Some(CascadeDirective::SourceToConcepts),
        ..ReferenceOptions::default()
    };
    let steps = vec![
        Step::Add(ReferenceExpression::uri(SOURCE_URI), include.clone()),
        Step::Add(concept_uri("c2"), exclude),
        Step::Add(concept_uri("c3"), include),
        Step::Remove(SOURCE_URI.to_string(), 1),
        Step::Add(concept_uri("c1"), cascade),
        Step::Remove(concept_uri("c3").to_string(), 1),
    ];
    s.run_against_full_expansion(head, steps);
    assert_eq!(s.members(head), BTreeSet::from([s.concepts[0], s.mappings[0]]));
}

#[test]
fn test_incremental_matches_full_expansion_with_cascades() {
    let mut s = Scenario::new(&["c1", "c2", "c3"], &[("m1", "c1", "c2"), ("m2", "c2", "c3")]);
    let c2_revised = s
        .store
        .write_content(
            &s.ctx,
            &source_identity(),
            ConceptPayload::new("c2", "Misc", "c2 revised"),
            Some(s.concepts[1]),
        )
        .unwrap();
    let head = s.collection_head();
    let structured = ReferenceExpression::Structured(StructuredReference {
        system: SOURCE_URI.to_string(),
        code: Some("c1".to_string()),
        cascade: Some(CascadeDirective::SourceToConcepts),
        ..StructuredReference::default()
    });
    let exclude_with_mappings = ReferenceOptions {
        exclude: true,
        cascade: Some(CascadeDirective::SourceMappings),
        ..ReferenceOptions::default()
    };
    let mappings = ReferenceOptions {
        cascade: Some(CascadeDirective::SourceMappings),
        ..ReferenceOptions::default()
    };
    let steps = vec![
        // pinned to the first version of c2
        Step::Add(ReferenceExpression::uri(format!("{SOURCE_URI}concepts/c2/1/")), ReferenceOptions::default()),
        // cascade reaches c2 at its latest version, which is already referenced
        Step::Add(structured, ReferenceOptions::default()),
        Step::Add(concept_uri("c2"), exclude_with_mappings),
        Step::Remove(concept_uri("c1").to_string(), 1),
        Step::Add(concept_uri("c1"), mappings),
        // the pinned c2 reference and the exclusion share a versionless form
        Step::Remove(concept_uri("c2").to_string(), 2),
    ];
    s.run_against_full_expansion(head, steps);

    let members = s.members(head);
    assert!(!members.contains(&c2_revised));
    assert_eq!(
        members,
        BTreeSet::from([s.concepts[0], s.concepts[2], s.mappings[0], s.mappings[1]])
    );
}

#[test]
fn test_cascade_terminates_on_cycle() {
    let s = Scenario::new(&["A", "B"], &[("ab", "A", "B"), ("ba", "B", "A")]);
    let bundle = s
        .store
        .cascade(s.source_head(), s.concepts[0], &CascadeParams::default())
        .unwrap();
    assert_eq!(bundle.keys(), vec![s.concepts[0], s.concepts[1], s.mappings[0], s.mappings[1]]);
    let unique: BTreeSet<ContentVersionKey> = bundle.keys().into_iter().collect();
    assert_eq!(unique.len(), bundle.total);
}

#[test]
fn test_cascade_level_bound() {
    let s = Scenario::new(&["X", "Y", "Z"], &[("xy", "X", "Y"), ("yz", "Y", "Z")]);
    let params = CascadeParams::default().with_levels(CascadeLevels::Depth(0));
    let bundle = s.store.cascade(s.source_head(), s.concepts[0], &params).unwrap();
    assert_eq!(bundle.keys(), vec![s.concepts[0], s.mappings[0]]);
    assert_eq!(bundle.total, 2);
}

#[test]
fn test_checksum_canonicalization() {
    let engine = ChecksumEngine::default();
    assert_eq!(
        engine.checksum_value(&json!({"a": 1, "b": 2})),
        engine.checksum_value(&json!({"b": 2, "a": 1}))
    );
    assert_eq!(
        engine.checksum_value(&json!([1, 2, 3])),
        engine.checksum_value(&json!([2, 1, 3]))
    );
    assert_ne!(
        engine.checksum_value(&json!({"a": 1})),
        engine.checksum_value(&json!({"a": 1.0}))
    );
}

#[test]
fn test_scenario_a_cascade_bundles() {
    let s = Scenario::new(&["c1", "c2"], &[("m1", "c1", "c2")]);
    let (c1, c2, m1) = (s.concepts[0], s.concepts[1], s.mappings[0]);

    let mappings_only = s
        .store
        .cascade(s.source_head(), c1, &CascadeParams::mappings_only())
        .unwrap();
    assert_eq!(mappings_only.keys(), vec![c1, m1]);
    assert_eq!(mappings_only.total, 2);

    let full = s
        .store
        .cascade(
            s.source_head(),
            c1,
            &CascadeParams::default().with_levels("*".parse().unwrap()),
        )
        .unwrap();
    assert_eq!(full.keys(), vec![c1, c2, m1]);
    assert_eq!(full.total, 3);
}

#[test]
fn test_scenario_b_duplicate_reference_is_rejected() {
    let mut s = Scenario::new(&["c1", "c2"], &[]);
    let head = s.collection_head();
    let options = ReferenceOptions {
        transform_to_latest: true,
        ..ReferenceOptions::default()
    };
    let outcomes = s
        .store
        .add_references(&s.ctx, head, &[concept_uri("c1")], &options)
        .unwrap();
    assert!(outcomes[0].added);
    assert_eq!(outcomes[0].expression, "/orgs/org/sources/S/concepts/c1/");
    let pinned = s.store.graph().references_of(head).next().unwrap();
    assert_eq!(pinned.expression.to_string(), "/orgs/org/sources/S/concepts/c1/1/");

    s.store
        .write_content(
            &s.ctx,
            &source_identity(),
            ConceptPayload::new("c1", "Misc", "renamed"),
            Some(s.concepts[0]),
        )
        .unwrap();
    let before = s.members(head);

    let duplicate = ReferenceExpression::uri(format!("{SOURCE_URI}concepts/c1/2/"));
    let outcomes = s
        .store
        .add_references(&s.ctx, head, &[duplicate], &ReferenceOptions::default())
        .unwrap();
    assert!(!outcomes[0].added);
    assert_eq!(outcomes[0].kind, ReferenceOutcomeKind::Rejected);
    assert_eq!(outcomes[0].message.as_deref(), Some(messages::REFERENCE_ALREADY_EXISTS));
    assert_eq!(s.members(head), before);
}

#[test]
fn test_frozen_collection_versions_reject_reference_changes() {
    let mut s = Scenario::new(&["c1"], &[]);
    let head = s.collection_head();
    s.store
        .add_references(&s.ctx, head, &[concept_uri("c1")], &ReferenceOptions::default())
        .unwrap();
    s.store
        .cut_version(&s.ctx, &collection_identity(), "v1", VersionMetadata::default())
        .unwrap();
    let v1 = s.store.version_key(&collection_identity(), "v1").unwrap();
    assert_eq!(s.members(v1), s.members(head));
    assert_eq!(s.store.graph().references_of(v1).count(), 1);

    assert!(matches!(
        s.store
            .add_references(&s.ctx, v1, &[concept_uri("c1")], &ReferenceOptions::default()),
        Err(CoreError::Immutable { .. })
    ));
    assert!(matches!(
        s.store.remove_references(&s.ctx, v1, &RemoveSelector::All),
        Err(CoreError::Immutable { .. })
    ));
}
