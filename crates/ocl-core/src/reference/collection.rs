use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ocl_types::well_known::messages;
use ocl_types::{
    CascadeDirective, CollectionReference, ContainerVersionKey, ContentKind, ContentVersionKey,
    ReferenceExpression, ReferenceKey, ReferenceOutcome, ReferenceOutcomeKind,
};

use crate::expression::item_uri;
use crate::hooks::ContentEvent;
use crate::store::TerminologyStore;
use crate::types::{CoreResult, WriteContext};

/// Options for [`TerminologyStore::add_references`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceOptions {
    /// Store each single-item reference pinned to the version it resolved to.
    pub transform_to_latest: bool,
    /// Cascade directive applied to every expression.
    pub cascade: Option<CascadeDirective>,
    /// Store the expressions as exclusions.
    pub exclude: bool,
}

/// Which references [`TerminologyStore::remove_references`] removes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoveSelector {
    /// Every reference (`"*"`).
    All,
    /// References whose expression or versionless form matches.
    Expressions(Vec<String>),
}

impl RemoveSelector {
    fn matches(&self, reference: &CollectionReference) -> bool {
        match self {
            Self::All => true,
            Self::Expressions(expressions) => expressions.iter().any(|expression| {
                *expression == reference.expression.to_string() || *expression == reference.versionless
            }),
        }
    }
}

impl TerminologyStore {
    /// Adds references to a collection's HEAD version.
    ///
    /// Each expression gets its own outcome; a duplicate or unresolvable
    /// expression never fails the batch. The default expansion, when there is
    /// one, gains exactly the newly resolved versions.
    pub fn add_references(
        &mut self,
        ctx: &WriteContext,
        collection_version: ContainerVersionKey,
        expressions: &[ReferenceExpression],
        options: &ReferenceOptions,
    ) -> CoreResult<Vec<ReferenceOutcome>> {
        self.require_collection_head(collection_version)?;

        let mut outcomes = Vec::with_capacity(expressions.len());
        let mut added = 0;
        for expression in expressions {
            let outcome = self.add_reference(ctx, collection_version, expression, options);
            if outcome.added || outcome.kind == ReferenceOutcomeKind::Excluded {
                added += 1;
            }
            outcomes.push(outcome);
        }

        if added > 0 {
            *self
                .graph
                .reference_revisions
                .entry(collection_version)
                .or_default() += 1;
            self.sync_head_membership(collection_version);
            info!(version = %collection_version, added, "Added collection references");
            self.emit(ContentEvent::ReferencesChanged {
                collection_version,
                added,
                removed: 0,
            });
        }
        Ok(outcomes)
    }

    fn add_reference(
        &mut self,
        ctx: &WriteContext,
        collection_version: ContainerVersionKey,
        expression: &ReferenceExpression,
        options: &ReferenceOptions,
    ) -> ReferenceOutcome {
        let rendered = expression.to_string();
        let rejected = |message: String| ReferenceOutcome {
            expression: rendered.clone(),
            added: false,
            kind: ReferenceOutcomeKind::Rejected,
            message: Some(message),
            members: Vec::new(),
        };

        let cascade = options.cascade.or(expression.cascade());
        let resolution = match self.resolve(expression, cascade) {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(expression = %rendered, error = %err, "Invalid reference expression");
                return rejected(format!("{} {err}", messages::REFERENCE_INVALID));
            }
        };
        if resolution.is_empty() {
            warn!(expression = %rendered, "Reference resolved to nothing");
            return rejected(messages::REFERENCE_NOT_FOUND.to_string());
        }

        if options.exclude {
            let members: Vec<ContentVersionKey> = resolution
                .members
                .iter()
                .chain(&resolution.derived)
                .copied()
                .collect();
            self.store_reference(
                ctx,
                collection_version,
                expression.clone(),
                &resolution.versionless,
                false,
                cascade,
                resolution.target.clone(),
                members.clone(),
                None,
            );
            if let Some(expansion) = self.graph.default_expansions.get(&collection_version).copied() {
                for member in &members {
                    self.graph.expansion_members.detach(expansion, *member);
                }
            }
            return ReferenceOutcome {
                expression: rendered,
                added: false,
                kind: ReferenceOutcomeKind::Excluded,
                message: Some(messages::REFERENCE_EXCLUDED.to_string()),
                members,
            };
        }

        let duplicate = self.graph.references_of(collection_version).any(|existing| {
            existing.include
                && (existing.versionless == resolution.versionless
                    || (resolution.target.is_some() && existing.target == resolution.target))
        });
        if duplicate {
            return rejected(messages::REFERENCE_ALREADY_EXISTS.to_string());
        }

        let stored = match (&resolution.pinned, options.transform_to_latest) {
            (Some(pinned), true) => ReferenceExpression::Uri(pinned.clone()),
            _ => expression.clone(),
        };
        let parent = self.store_reference(
            ctx,
            collection_version,
            stored,
            &resolution.versionless,
            true,
            cascade,
            resolution.target.clone(),
            resolution.members.clone(),
            None,
        );

        let mut members = resolution.members.clone();
        for derived in &resolution.derived {
            let Some(version) = self.graph.content_version(*derived) else {
                continue;
            };
            let target = Some((version.kind(), version.mnemonic().to_string()));
            let taken = self
                .graph
                .references_of(collection_version)
                .any(|existing| existing.include && existing.target == target);
            if taken {
                continue;
            }
            let owner_uri = self
                .graph
                .repository(version.repository)
                .map(|repo| repo.uri())
                .unwrap_or_default();
            let versionless = item_uri(&owner_uri, version.kind(), version.mnemonic(), None);
            let expression = ReferenceExpression::Uri(version.uri.clone());
            self.store_reference(
                ctx,
                collection_version,
                expression,
                &versionless,
                true,
                None,
                target,
                vec![*derived],
                Some(parent),
            );
            members.push(*derived);
        }

        if let Some(expansion) = self.graph.default_expansions.get(&collection_version).copied() {
            let excluded = self.excluded_members(collection_version);
            let include_retired = self
                .graph
                .expansion(expansion)
                .is_some_and(|record| record.parameters.include_retired);
            for member in &members {
                if excluded.contains(member) || !self.admits(*member, include_retired) {
                    continue;
                }
                self.graph.expansion_members.attach(expansion, *member);
            }
        }

        ReferenceOutcome {
            expression: rendered,
            added: true,
            kind: ReferenceOutcomeKind::Included,
            message: None,
            members,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn store_reference(
        &mut self,
        ctx: &WriteContext,
        collection_version: ContainerVersionKey,
        expression: ReferenceExpression,
        versionless: &str,
        include: bool,
        cascade: Option<CascadeDirective>,
        target: Option<(ContentKind, String)>,
        resolved: Vec<ContentVersionKey>,
        derived_from: Option<ReferenceKey>,
    ) -> ReferenceKey {
        let key = ReferenceKey(self.graph.allocate());
        self.graph.references.insert(
            key,
            CollectionReference {
                key,
                collection_version,
                expression,
                versionless: versionless.to_string(),
                include,
                cascade,
                target,
                resolved,
                derived_from,
                created_by: ctx.actor.clone(),
                created_at: Utc::now(),
            },
        );
        self.graph
            .references_by_version
            .entry(collection_version)
            .or_default()
            .push(key);
        key
    }

    /// Removes references from a collection's HEAD version and re-derives its
    /// default expansion from the remaining ones.
    pub fn remove_references(
        &mut self,
        ctx: &WriteContext,
        collection_version: ContainerVersionKey,
        selector: &RemoveSelector,
    ) -> CoreResult<usize> {
        self.require_collection_head(collection_version)?;

        let doomed: Vec<ReferenceKey> = self
            .graph
            .references_of(collection_version)
            .filter(|reference| selector.matches(reference))
            .map(|reference| reference.key)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        for key in &doomed {
            self.graph.references.remove(key);
        }
        if let Some(keys) = self.graph.references_by_version.get_mut(&collection_version) {
            keys.retain(|key| !doomed.contains(key));
        }
        *self
            .graph
            .reference_revisions
            .entry(collection_version)
            .or_default() += 1;

        self.rederive_default_expansion(ctx, collection_version);
        info!(version = %collection_version, removed = doomed.len(), "Removed collection references");
        self.emit(ContentEvent::ReferencesChanged {
            collection_version,
            added: 0,
            removed: doomed.len(),
        });
        Ok(doomed.len())
    }

    /// Copies references to a newly cut version.
    pub(crate) fn seed_references(
        &mut self,
        ctx: &WriteContext,
        from: ContainerVersionKey,
        to: ContainerVersionKey,
    ) {
        let originals: Vec<CollectionReference> = self.graph.references_of(from).cloned().collect();
        let mut renumbered: HashMap<ReferenceKey, ReferenceKey> = HashMap::new();
        for original in originals {
            let key = self.store_reference(
                ctx,
                to,
                original.expression,
                &original.versionless,
                original.include,
                original.cascade,
                original.target,
                original.resolved,
                original.derived_from.and_then(|parent| renumbered.get(&parent).copied()),
            );
            renumbered.insert(original.key, key);
        }
    }

    /// Union of the stored exclusion sets of a collection version.
    pub(crate) fn excluded_members(&self, collection_version: ContainerVersionKey) -> BTreeSet<ContentVersionKey> {
        self.graph
            .references_of(collection_version)
            .filter(|reference| !reference.include)
            .flat_map(|reference| reference.resolved.iter().copied())
            .collect()
    }

    pub(crate) fn admits(&self, member: ContentVersionKey, include_retired: bool) -> bool {
        include_retired
            || self
                .graph
                .content_version(member)
                .is_some_and(|version| !version.retired())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoreError;
    use ocl_types::{
        ConceptPayload, ConceptRef, MappingPayload, OwnerKind, RepositoryIdentity, RepositoryMetadata,
        StructuredReference, VersionMetadata,
    };

    const SOURCE: &str = "/orgs/org/sources/src/";

    struct Fixture {
        store: TerminologyStore,
        ctx: WriteContext,
        source: RepositoryIdentity,
        collection: RepositoryIdentity,
    }

    impl Fixture {
        fn new() -> Self {
            let mut store = TerminologyStore::new();
            let ctx = WriteContext::new("curator");
            let source = RepositoryIdentity::source(OwnerKind::Organization, "org", "src");
            let collection = RepositoryIdentity::collection(OwnerKind::Organization, "org", "coll");
            store
                .create_repository(&ctx, source.clone(), RepositoryMetadata::named("Source"))
                .unwrap();
            store
                .create_repository(&ctx, collection.clone(), RepositoryMetadata::named("Collection"))
                .unwrap();
            for code in ["c1", "c2", "c3"] {
                store
                    .write_content(&ctx, &source, ConceptPayload::new(code, "Misc", code), None)
                    .unwrap();
            }
            let mapping = MappingPayload::new("SAME-AS", ConceptRef::new(SOURCE, "c1"), ConceptRef::new(SOURCE, "c2"))
                .with_mnemonic("m1");
            store.write_content(&ctx, &source, mapping, None).unwrap();
            Self {
                store,
                ctx,
                source,
                collection,
            }
        }

        fn head(&self) -> ContainerVersionKey {
            self.store.head_key(&self.collection).unwrap()
        }

        fn add(&mut self, uris: &[&str], options: &ReferenceOptions) -> Vec<ReferenceOutcome> {
            let head = self.head();
            let expressions: Vec<ReferenceExpression> = uris.iter().map(|uri| ReferenceExpression::uri(*uri)).collect();
            self.store.add_references(&self.ctx, head, &expressions, options).unwrap()
        }

        fn members(&self) -> BTreeSet<ContentVersionKey> {
            self.store.graph().context_members(self.head())
        }
    }

    #[test]
    fn test_add_reference_updates_default_expansion_and_membership() {
        let mut f = Fixture::new();
        let outcomes = f.add(&["/orgs/org/sources/src/concepts/c1/"], &ReferenceOptions::default());
        assert!(outcomes[0].added);
        assert_eq!(outcomes[0].kind, ReferenceOutcomeKind::Included);
        assert_eq!(f.members().len(), 1);
        assert_eq!(f.store.graph().membership().member_set(f.head()), f.members());
    }

    #[test]
    fn test_duplicate_and_missing_references_are_per_item() {
        let mut f = Fixture::new();
        let outcomes = f.add(
            &[
                "/orgs/org/sources/src/concepts/c1/",
                "/orgs/org/sources/src/concepts/c1/",
                "/orgs/org/sources/src/concepts/missing/",
                "/orgs/org/sources/src/concepts/c2/",
            ],
            &ReferenceOptions::default(),
        );
        let added: Vec<bool> = outcomes.iter().map(|o| o.added).collect();
        assert_eq!(added, vec![true, false, false, true]);
        assert_eq!(outcomes[1].message.as_deref(), Some(messages::REFERENCE_ALREADY_EXISTS));
        assert_eq!(outcomes[2].message.as_deref(), Some(messages::REFERENCE_NOT_FOUND));
        assert_eq!(f.members().len(), 2);
        assert_eq!(f.store.graph().references_of(f.head()).count(), 2);
    }

    #[test]
    fn test_same_code_other_version_is_a_duplicate() {
        let mut f = Fixture::new();
        f.add(&["/orgs/org/sources/src/concepts/c1/"], &ReferenceOptions::default());
        let outcomes = f.add(&["/orgs/org/sources/src/concepts/c1/1/"], &ReferenceOptions::default());
        assert!(!outcomes[0].added);
        assert_eq!(outcomes[0].message.as_deref(), Some(messages::REFERENCE_ALREADY_EXISTS));
    }

    #[test]
    fn test_transform_to_latest_pins_expression() {
        let mut f = Fixture::new();
        let options = ReferenceOptions {
            transform_to_latest: true,
            ..ReferenceOptions::default()
        };
        f.add(&["/orgs/org/sources/src/concepts/c1/"], &options);
        let stored: Vec<String> = f
            .store
            .graph()
            .references_of(f.head())
            .map(|r| r.expression.to_string())
            .collect();
        assert_eq!(stored, vec!["/orgs/org/sources/src/concepts/c1/1/"]);
    }

    #[test]
    fn test_cascade_stores_derived_references() {
        let mut f = Fixture::new();
        let options = ReferenceOptions {
            cascade: Some(CascadeDirective::SourceToConcepts),
            ..ReferenceOptions::default()
        };
        let outcomes = f.add(&["/orgs/org/sources/src/concepts/c1/"], &options);
        assert_eq!(outcomes[0].members.len(), 3);
        let references: Vec<&CollectionReference> = f.store.graph().references_of(f.head()).collect();
        assert_eq!(references.len(), 3);
        assert!(references[1..].iter().all(|r| r.derived_from == Some(references[0].key)));
        assert_eq!(f.members().len(), 3);
    }

    #[test]
    fn test_exclusions_win_over_inclusions() {
        let mut f = Fixture::new();
        f.add(&[SOURCE], &ReferenceOptions::default());
        assert_eq!(f.members().len(), 4);

        let exclude = ReferenceOptions {
            exclude: true,
            ..ReferenceOptions::default()
        };
        let outcomes = f.add(&["/orgs/org/sources/src/concepts/c3/"], &exclude);
        assert_eq!(outcomes[0].kind, ReferenceOutcomeKind::Excluded);
        assert!(!outcomes[0].added);
        assert_eq!(f.members().len(), 3);

        let outcomes = f.add(&["/orgs/org/sources/src/concepts/c3/"], &ReferenceOptions::default());
        assert!(outcomes[0].added);
        assert_eq!(f.members().len(), 3);
    }

    #[test]
    fn test_remove_rederives_shared_members() {
        let mut f = Fixture::new();
        f.add(
            &["/orgs/org/sources/src/concepts/", "/orgs/org/sources/src/mappings/m1/"],
            &ReferenceOptions::default(),
        );
        assert_eq!(f.members().len(), 4);

        let head = f.head();
        let ctx = f.ctx.clone();
        let removed = f
            .store
            .remove_references(&ctx, head, &RemoveSelector::Expressions(vec!["/orgs/org/sources/src/concepts/".to_string()]))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(f.members().len(), 1);

        assert_eq!(f.store.remove_references(&ctx, head, &RemoveSelector::All).unwrap(), 1);
        assert!(f.members().is_empty());
        assert_eq!(f.store.remove_references(&ctx, head, &RemoveSelector::All).unwrap(), 0);
    }

    #[test]
    fn test_structured_reference() {
        let mut f = Fixture::new();
        let head = f.head();
        let ctx = f.ctx.clone();
        let expression = ReferenceExpression::Structured(StructuredReference {
            system: SOURCE.to_string(),
            code: Some("m1".to_string()),
            reference_type: Some(ContentKind::Mapping),
            ..Default::default()
        });
        let outcomes = f
            .store
            .add_references(&ctx, head, &[expression], &ReferenceOptions::default())
            .unwrap();
        assert!(outcomes[0].added);
        assert_eq!(f.members().len(), 1);
    }

    #[test]
    fn test_structured_reference_applies_its_own_cascade() {
        let mut f = Fixture::new();
        let head = f.head();
        let ctx = f.ctx.clone();
        let expression = ReferenceExpression::Structured(StructuredReference {
            system: SOURCE.to_string(),
            code: Some("c1".to_string()),
            cascade: Some(CascadeDirective::SourceToConcepts),
            ..Default::default()
        });
        let outcomes = f
            .store
            .add_references(&ctx, head, &[expression], &ReferenceOptions::default())
            .unwrap();
        assert!(outcomes[0].added);
        // c1 plus the cascaded m1 and c2
        assert_eq!(outcomes[0].members.len(), 3);
        assert_eq!(f.store.graph().references_of(head).count(), 3);

        let plan = f
            .store
            .plan_expansion(head, &crate::reference::ExpansionRequest::default())
            .unwrap();
        assert_eq!(plan.members, f.members());
    }

    #[test]
    fn test_frozen_collection_versions_are_immutable() {
        let mut f = Fixture::new();
        let ctx = f.ctx.clone();
        let collection = f.collection.clone();
        f.add(&["/orgs/org/sources/src/concepts/c1/"], &ReferenceOptions::default());
        let v1 = f
            .store
            .cut_version(&ctx, &collection, "v1", VersionMetadata::default())
            .unwrap();
        assert_eq!(f.store.graph().references_of(v1).count(), 1);
        assert_eq!(f.store.graph().context_members(v1), f.members());

        let err = f
            .store
            .add_references(&ctx, v1, &[ReferenceExpression::uri(SOURCE)], &ReferenceOptions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::Immutable { label } if label == "v1"));
        assert!(f.store.remove_references(&ctx, v1, &RemoveSelector::All).is_err());

        let source_head = f.store.head_key(&f.source).unwrap();
        assert!(f
            .store
            .add_references(&ctx, source_head, &[], &ReferenceOptions::default())
            .is_err());
    }
}
