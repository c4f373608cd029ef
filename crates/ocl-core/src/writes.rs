//! Content writes.
//!
//! A write validates the payload, runs the repository's validation schema over
//! the HEAD-active concepts with the new payload substituted in, and then
//! appends an immutable version to the item's chain. HEAD membership moves
//! from the previous version to the new one.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use ocl_types::well_known::messages;
use ocl_types::{
    ContentItem, ContentKind, ContentPayload, ContentVersion, ContentVersionKey, ItemKey, RepoKey,
    RepositoryIdentity,
};

use crate::expression::item_uri;
use crate::hooks::ContentEvent;
use crate::store::TerminologyStore;
use crate::types::{CoreError, CoreResult, FieldErrors, SchemaFailure, WriteContext};
use crate::validation::{validate_concept, validate_mapping, ConceptValidator, SchemaSubject};

impl TerminologyStore {
    // ═══════════════════════════════════════════════════════════════════════════
    // WRITES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Writes a concept or mapping into a source's HEAD.
    ///
    /// The first write of a mnemonic creates the item and takes no
    /// `base_version`. Later writes must name the latest version in the chain
    /// as their base; anything else is a `Conflict`. When the payload's standard checksum equals the base's and
    /// `skip_unchanged_writes` is on, nothing is written and the base key is
    /// returned.
    pub fn write_content(
        &mut self,
        ctx: &WriteContext,
        identity: &RepositoryIdentity,
        payload: impl Into<ContentPayload>,
        base_version: Option<ContentVersionKey>,
    ) -> CoreResult<ContentVersionKey> {
        let repo = self.repository_key(identity)?;
        self.write_into(ctx, repo, payload.into(), base_version, None)
    }

    /// Writes a new version with the retired flag set.
    pub fn retire_content(
        &mut self,
        ctx: &WriteContext,
        identity: &RepositoryIdentity,
        kind: ContentKind,
        mnemonic: &str,
        comment: Option<String>,
    ) -> CoreResult<ContentVersionKey> {
        self.flip_retired(ctx, identity, kind, mnemonic, true, comment)
    }

    /// Writes a new version with the retired flag cleared.
    pub fn unretire_content(
        &mut self,
        ctx: &WriteContext,
        identity: &RepositoryIdentity,
        kind: ContentKind,
        mnemonic: &str,
        comment: Option<String>,
    ) -> CoreResult<ContentVersionKey> {
        self.flip_retired(ctx, identity, kind, mnemonic, false, comment)
    }

    fn flip_retired(
        &mut self,
        ctx: &WriteContext,
        identity: &RepositoryIdentity,
        kind: ContentKind,
        mnemonic: &str,
        retired: bool,
        comment: Option<String>,
    ) -> CoreResult<ContentVersionKey> {
        let repo = self.repository_key(identity)?;
        let item = self
            .graph
            .item_by_mnemonic(repo, kind, mnemonic)
            .ok_or_else(|| CoreError::not_found(format!("{} {mnemonic} in {identity}", kind.label())))?;
        let latest = self
            .graph
            .latest_version_of(item.key)
            .ok_or_else(|| CoreError::integrity(format!("{} {mnemonic} has no versions", kind.label())))?;
        if latest.retired() == retired {
            let message = if retired {
                messages::ALREADY_RETIRED
            } else {
                messages::NOT_RETIRED
            };
            return Err(CoreError::invalid("retired", message));
        }

        let base = latest.key;
        let mut payload = latest.payload.clone();
        payload.set_retired(retired);
        self.write_into(ctx, repo, payload, Some(base), comment)
    }

    fn write_into(
        &mut self,
        ctx: &WriteContext,
        repo: RepoKey,
        mut payload: ContentPayload,
        base_version: Option<ContentVersionKey>,
        comment: Option<String>,
    ) -> CoreResult<ContentVersionKey> {
        let repository = self
            .graph
            .repository(repo)
            .ok_or_else(|| CoreError::not_found(format!("repository {repo}")))?;
        if !repository.identity.is_source() {
            return Err(CoreError::invalid(
                "repository",
                format!("{} is a collection; content is owned by sources.", repository.uri()),
            ));
        }
        let repo_uri = repository.uri();
        let schema = repository.validation_schema().map(str::to_string);
        let head = repository.head;

        if let ContentPayload::Mapping(mapping) = &mut payload {
            if mapping.mnemonic.trim().is_empty() {
                mapping.mnemonic = self.next_mapping_mnemonic(repo);
            }
        }
        let errors = match &payload {
            ContentPayload::Concept(concept) => validate_concept(concept),
            ContentPayload::Mapping(mapping) => validate_mapping(mapping),
        };
        errors.into_result()?;

        let kind = payload.kind();
        let mnemonic = payload.mnemonic().to_string();
        let existing = self.graph.item_by_mnemonic(repo, kind, &mnemonic).map(|item| item.key);
        let latest = existing.and_then(|item| self.graph.latest_version_of(item)).map(|v| v.key);
        let base = match base_version {
            Some(requested) if Some(requested) != latest => {
                return Err(CoreError::conflict(messages::PARENT_NOT_LATEST));
            }
            Some(requested) => Some(requested),
            None if latest.is_some() => {
                let message = match kind {
                    ContentKind::Concept => messages::CONCEPT_ALREADY_EXISTS,
                    ContentKind::Mapping => messages::MAPPING_ALREADY_EXISTS,
                };
                return Err(CoreError::conflict(message));
            }
            None => None,
        };

        if let (Some(schema), ContentPayload::Concept(_)) = (&schema, &payload) {
            let validator = self.validator(schema)?;
            let failures = self.validate_head_concepts(&*validator, repo, head, existing, Some(&payload));
            if !failures.is_empty() {
                return Err(CoreError::SchemaValidation(failures));
            }
        }

        let checksums = self.checksums.checksums(&payload);
        if let Some(base) = base.and_then(|key| self.graph.content_version(key)) {
            if self.config.skip_unchanged_writes && base.checksums.standard == checksums.standard {
                debug!(uri = %base.uri, "Unchanged write skipped");
                return Ok(base.key);
            }
        }

        let now = Utc::now();
        let item_key = match existing {
            Some(key) => key,
            None => {
                let key = ItemKey(self.graph.allocate());
                self.graph.items.insert(
                    key,
                    ContentItem {
                        key,
                        repository: repo,
                        kind,
                        mnemonic: mnemonic.clone(),
                        versions: Vec::new(),
                        created_at: now,
                    },
                );
                self.graph
                    .item_by_mnemonic
                    .insert((repo, kind, mnemonic.clone()), key);
                key
            }
        };
        let chain_length = self.graph.item(item_key).map_or(0, |item| item.versions.len());
        let label = (chain_length + 1).to_string();
        let key = ContentVersionKey(self.graph.allocate());
        let uri = item_uri(&repo_uri, kind, &mnemonic, Some(&label));

        if let Some(previous) = latest {
            if let Some(record) = self.graph.content_versions.get_mut(&previous) {
                record.is_latest_version = false;
            }
            self.graph.membership.detach(head, previous);
        }
        self.graph.content_versions.insert(
            key,
            ContentVersion {
                key,
                item: item_key,
                repository: repo,
                label,
                uri: uri.clone(),
                payload,
                is_latest_version: true,
                checksums,
                previous: latest,
                comment,
                created_by: ctx.actor.clone(),
                created_at: now,
            },
        );
        if let Some(item) = self.graph.items.get_mut(&item_key) {
            item.versions.push(key);
        }
        self.graph.membership.attach(head, key);
        self.graph.index_content_version(key);
        if existing.is_none() && kind == ContentKind::Concept {
            let linked = self.graph.resolve_pending_for(item_key);
            if linked > 0 {
                debug!(%uri, linked, "Resolved pending references");
            }
        }

        debug!(%uri, actor = %ctx.actor, "Wrote content version");
        self.emit(ContentEvent::ContentWritten {
            repository: repo,
            version: key,
            kind,
            uri,
        });
        Ok(key)
    }

    fn next_mapping_mnemonic(&self, repo: RepoKey) -> String {
        let mut next = self
            .graph
            .items_of(repo)
            .filter(|item| item.kind == ContentKind::Mapping)
            .count()
            + 1;
        while self
            .graph
            .item_by_mnemonic(repo, ContentKind::Mapping, &next.to_string())
            .is_some()
        {
            next += 1;
        }
        next.to_string()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION SCHEMAS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Attaches a validation schema to a source, or detaches it with `None`.
    ///
    /// Every HEAD-active concept is validated first; the change is refused
    /// with all failures when any concept does not pass.
    pub fn set_validation_schema(
        &mut self,
        ctx: &WriteContext,
        identity: &RepositoryIdentity,
        schema: Option<&str>,
    ) -> CoreResult<()> {
        let repo = self.repository_key(identity)?;
        let head = self.head_key(identity)?;
        if let Some(schema) = schema {
            let validator = self.validator(schema)?;
            let failures = self.validate_head_concepts(&*validator, repo, head, None, None);
            if !failures.is_empty() {
                return Err(CoreError::SchemaValidation(failures));
            }
        }

        let schema = schema.map(str::to_string);
        if let Some(record) = self.graph.repositories.get_mut(&repo) {
            record.metadata.custom_validation_schema = schema.clone();
        }
        if let Some(record) = self.graph.container_versions.get_mut(&head) {
            record.custom_validation_schema = schema;
            record.updated_by = ctx.actor.clone();
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    fn validator(&self, schema: &str) -> CoreResult<Arc<dyn ConceptValidator>> {
        self.schemas.validator_for(schema).ok_or_else(|| {
            CoreError::Validation(FieldErrors::single(
                "custom_validation_schema",
                format!("Unknown validation schema '{schema}'."),
            ))
        })
    }

    /// Validates HEAD's concepts, with `replaced` swapped for `candidate`.
    fn validate_head_concepts(
        &self,
        validator: &dyn ConceptValidator,
        repo: RepoKey,
        head: ocl_types::ContainerVersionKey,
        replaced: Option<ItemKey>,
        candidate: Option<&ContentPayload>,
    ) -> Vec<SchemaFailure> {
        let candidate_url = candidate.and_then(|payload| {
            let repository = self.graph.repository(repo)?;
            Some(item_uri(&repository.uri(), payload.kind(), payload.mnemonic(), None))
        });
        let mut subjects: Vec<SchemaSubject<'_>> = self
            .graph
            .membership
            .members(head)
            .filter_map(|key| self.graph.content_version(key))
            .filter(|version| Some(version.item) != replaced)
            .filter_map(|version| {
                version.payload.as_concept().map(|concept| SchemaSubject {
                    url: version.uri.as_str(),
                    concept,
                })
            })
            .collect();
        if let (Some(concept), Some(url)) = (candidate.and_then(ContentPayload::as_concept), &candidate_url) {
            subjects.push(SchemaSubject { url: url.as_str(), concept });
        }
        validator.validate_set(&subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::testing::RecordingHook;
    use ocl_types::{
        ConceptName, ConceptPayload, ConceptRef, MappingPayload, OwnerKind, RepositoryMetadata,
    };

    const SOURCE: &str = "/orgs/org/sources/src/";

    fn make_store() -> (TerminologyStore, RepositoryIdentity) {
        let mut store = TerminologyStore::new();
        let identity = RepositoryIdentity::source(OwnerKind::Organization, "org", "src");
        store
            .create_repository(&WriteContext::new("admin"), identity.clone(), RepositoryMetadata::named("Source"))
            .unwrap();
        (store, identity)
    }

    fn make_concept(code: &str, name: &str) -> ConceptPayload {
        ConceptPayload::new(code, "Diagnosis", name)
    }

    fn make_mapping(from: &str, to: &str) -> MappingPayload {
        MappingPayload::new("SAME-AS", ConceptRef::new(SOURCE, from), ConceptRef::new(SOURCE, to))
    }

    #[test]
    fn test_first_write_creates_version_one() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let key = store.write_content(&ctx, &identity, make_concept("c1", "One"), None).unwrap();

        let version = store.graph().content_version(key).unwrap();
        assert_eq!(version.label, "1");
        assert_eq!(version.uri, "/orgs/org/sources/src/concepts/c1/1/");
        assert!(version.is_latest_version);
        assert_eq!(version.created_by, "author");
        assert_eq!(version.checksums.standard.len(), 64);
        let head = store.head_key(&identity).unwrap();
        assert!(store.graph().membership().contains(head, key));
    }

    #[test]
    fn test_second_write_swaps_head_membership() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let v1 = store.write_content(&ctx, &identity, make_concept("c1", "One"), None).unwrap();
        let v2 = store
            .write_content(&ctx, &identity, make_concept("c1", "Uno"), Some(v1))
            .unwrap();

        let head = store.head_key(&identity).unwrap();
        assert!(!store.graph().membership().contains(head, v1));
        assert!(store.graph().membership().contains(head, v2));
        assert!(!store.graph().content_version(v1).unwrap().is_latest_version);
        let second = store.graph().content_version(v2).unwrap();
        assert_eq!(second.label, "2");
        assert_eq!(second.previous, Some(v1));
    }

    #[test]
    fn test_stale_base_version_conflicts() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let v1 = store.write_content(&ctx, &identity, make_concept("c1", "One"), None).unwrap();
        store.write_content(&ctx, &identity, make_concept("c1", "Two"), Some(v1)).unwrap();

        let err = store
            .write_content(&ctx, &identity, make_concept("c1", "Three"), Some(v1))
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict { message } if message == messages::PARENT_NOT_LATEST));
    }

    #[test]
    fn test_unchanged_write_is_noop() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let v1 = store.write_content(&ctx, &identity, make_concept("c1", "One"), None).unwrap();
        let again = store
            .write_content(&ctx, &identity, make_concept("c1", "One"), Some(v1))
            .unwrap();
        assert_eq!(again, v1);
        assert_eq!(store.stats().content_versions, 1);
    }

    #[test]
    fn test_rewrite_without_base_version_conflicts() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let v1 = store.write_content(&ctx, &identity, make_concept("c1", "One"), None).unwrap();

        let err = store
            .write_content(&ctx, &identity, make_concept("c1", "Two"), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict { message } if message == messages::CONCEPT_ALREADY_EXISTS));

        let mapping = store
            .write_content(&ctx, &identity, make_mapping("c1", "c2").with_mnemonic("m1"), None)
            .unwrap();
        let err = store
            .write_content(&ctx, &identity, make_mapping("c2", "c1").with_mnemonic("m1"), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict { message } if message == messages::MAPPING_ALREADY_EXISTS));

        assert_eq!(store.stats().content_versions, 2);
        let latest = store.graph().content_version(v1).unwrap();
        assert!(latest.is_latest_version);
        assert!(store.graph().content_version(mapping).unwrap().is_latest_version);
    }

    #[test]
    fn test_invalid_payload_writes_nothing() {
        let (mut store, identity) = make_store();
        let mut concept = make_concept("c1", "One");
        concept.names.clear();
        let Err(CoreError::Validation(errors)) =
            store.write_content(&WriteContext::new("a"), &identity, concept, None)
        else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("names"), Some(&[messages::NAMES_CANNOT_BE_EMPTY.to_string()][..]));
        assert_eq!(store.stats().items, 0);
    }

    #[test]
    fn test_collections_do_not_own_content() {
        let mut store = TerminologyStore::new();
        let identity = RepositoryIdentity::collection(OwnerKind::User, "jane", "coll");
        store
            .create_repository(&WriteContext::new("jane"), identity.clone(), RepositoryMetadata::named("C"))
            .unwrap();
        assert!(matches!(
            store.write_content(&WriteContext::new("jane"), &identity, make_concept("c1", "One"), None),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_mapping_mnemonic_is_assigned() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let first = store.write_content(&ctx, &identity, make_mapping("c1", "c2"), None).unwrap();
        let second = store.write_content(&ctx, &identity, make_mapping("c2", "c3"), None).unwrap();
        assert_eq!(store.graph().content_version(first).unwrap().mnemonic(), "1");
        assert_eq!(store.graph().content_version(second).unwrap().mnemonic(), "2");
    }

    #[test]
    fn test_pending_mapping_end_resolves_on_concept_creation() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let c1 = store.write_content(&ctx, &identity, make_concept("c1", "One"), None).unwrap();
        let mapping = store
            .write_content(&ctx, &identity, make_mapping("c1", "c2").with_mnemonic("m1"), None)
            .unwrap();
        assert_eq!(store.graph().pending_count(), 1);
        assert!(store.graph().mapping_endpoints(mapping).to.is_none());

        store.write_content(&ctx, &identity, make_concept("c2", "Two"), None).unwrap();
        let c1_item = store.graph().content_version(c1).unwrap().item;
        let endpoints = store.graph().mapping_endpoints(mapping);
        assert_eq!(endpoints.from, Some(c1_item));
        assert!(endpoints.to.is_some());
        assert_eq!(store.graph().pending_count(), 0);
    }

    #[test]
    fn test_parent_urls_build_hierarchy() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let child = store
            .write_content(
                &ctx,
                &identity,
                make_concept("child", "Child").with_parent("/orgs/org/sources/src/concepts/root/"),
                None,
            )
            .unwrap();
        let root = store.write_content(&ctx, &identity, make_concept("root", "Root"), None).unwrap();
        let root_item = store.graph().content_version(root).unwrap().item;
        assert_eq!(store.graph().parent_items(child), &[root_item]);
        assert_eq!(store.graph().child_versions(root_item).collect::<Vec<_>>(), vec![child]);
    }

    #[test]
    fn test_retire_and_unretire() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        store.write_content(&ctx, &identity, make_concept("c1", "One"), None).unwrap();

        let retired = store
            .retire_content(&ctx, &identity, ContentKind::Concept, "c1", Some("obsolete".to_string()))
            .unwrap();
        let record = store.graph().content_version(retired).unwrap();
        assert!(record.retired());
        assert_eq!(record.comment.as_deref(), Some("obsolete"));

        assert!(matches!(
            store.retire_content(&ctx, &identity, ContentKind::Concept, "c1", None),
            Err(CoreError::Validation(errors)) if errors.get("retired") == Some(&[messages::ALREADY_RETIRED.to_string()][..])
        ));
        let restored = store
            .unretire_content(&ctx, &identity, ContentKind::Concept, "c1", None)
            .unwrap();
        assert!(!store.graph().content_version(restored).unwrap().retired());
        assert!(matches!(
            store.retire_content(&ctx, &identity, ContentKind::Concept, "missing", None),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_schema_failures_are_aggregated() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        store.write_content(&ctx, &identity, make_concept("c1", "Fever"), None).unwrap();
        store.set_validation_schema(&ctx, &identity, Some("OpenMRS")).unwrap();

        let err = store
            .write_content(&ctx, &identity, make_concept("c2", "Fever"), None)
            .unwrap_err();
        let CoreError::SchemaValidation(failures) = err else {
            panic!("expected schema validation failure");
        };
        let mnemonics: Vec<&str> = failures.iter().map(|f| f.mnemonic.as_str()).collect();
        assert_eq!(mnemonics, vec!["c1", "c2"]);
        assert_eq!(store.stats().items, 1);
    }

    #[test]
    fn test_schema_allows_editing_the_same_concept() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let v1 = store.write_content(&ctx, &identity, make_concept("c1", "Fever"), None).unwrap();
        store.set_validation_schema(&ctx, &identity, Some("OpenMRS")).unwrap();

        let mut edited = make_concept("c1", "Fever");
        edited.datatype = Some("N/A".to_string());
        assert!(store.write_content(&ctx, &identity, edited, Some(v1)).is_ok());
    }

    #[test]
    fn test_set_validation_schema_refuses_failing_content() {
        let (mut store, identity) = make_store();
        let ctx = WriteContext::new("author");
        let mut concept = make_concept("c1", "Fever");
        concept.names.push(ConceptName::fully_specified("Pyrexia", "en"));
        store.write_content(&ctx, &identity, concept, None).unwrap();

        assert!(matches!(
            store.set_validation_schema(&ctx, &identity, Some("OpenMRS")),
            Err(CoreError::SchemaValidation(failures)) if failures.len() == 1
        ));
        assert!(store.set_validation_schema(&ctx, &identity, Some("Unknown")).is_err());
        let repo = store.repository_key(&identity).unwrap();
        assert!(store.graph().repository(repo).unwrap().validation_schema().is_none());
    }

    #[test]
    fn test_write_emits_event() {
        let (mut store, identity) = make_store();
        let hook = Arc::new(RecordingHook::default());
        store.add_event_hook(hook.clone());
        let key = store
            .write_content(&WriteContext::new("a"), &identity, make_concept("c1", "One"), None)
            .unwrap();
        let events = hook.events.lock().unwrap();
        assert!(matches!(
            events.as_slice(),
            [ContentEvent::ContentWritten { version, kind: ContentKind::Concept, .. }] if *version == key
        ));
    }
}
