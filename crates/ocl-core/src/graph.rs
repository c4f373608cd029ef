//! Arena and indexes of the versioned content graph.
//!
//! Every record lives in a key-ordered arena. Relations are kept in explicit
//! indexes: container membership and expansion membership as key-pair sets,
//! mapping endpoints and concept hierarchy as item-keyed adjacency sets.
//!
//! Mapping ends and parent concept URLs may name a concept that does not exist
//! yet. Such ends are parked in a pending index keyed by the owning
//! repository's URL and the concept code, and are linked as soon as a concept
//! with that code is first written to that repository.
//!
//! The graph performs no validation. [`TerminologyStore`](crate::TerminologyStore)
//! validates and then mutates the graph through crate-private methods.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use ocl_types::{
    CollectionReference, ContainerVersion, ContainerVersionKey, ContentItem, ContentKind,
    ContentPayload, ContentVersion, ContentVersionKey, Expansion, ExpansionKey, ItemKey,
    ReferenceKey, RepoKey, Repository, RepositoryIdentity, RepositoryKind,
};

use crate::expression::ParsedUri;
use crate::membership::MembershipIndex;

/// Resolved ends of a mapping version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEndpoints {
    /// Origin concept item, when resolved.
    pub from: Option<ItemKey>,
    /// Target concept item, when resolved.
    pub to: Option<ItemKey>,
}

/// Which end of a content version waits for a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingSide {
    From,
    To,
    Parent,
}

/// Normalizes a repository URL for index lookups.
///
/// Relative URIs are parsed and reduced to the versionless repository URI;
/// absolute canonical URLs lose their trailing slash.
pub fn normalize_repository_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.starts_with('/') {
        match ParsedUri::parse(trimmed) {
            Ok(parsed) => parsed.repository.uri(),
            Err(_) => format!("{}/", trimmed.trim_end_matches('/')),
        }
    } else {
        trimmed.trim_end_matches('/').to_string()
    }
}

/// In-memory content graph.
#[derive(Default)]
pub struct ContentGraph {
    pub(crate) next_key: u64,
    pub(crate) repositories: BTreeMap<RepoKey, Repository>,
    pub(crate) container_versions: BTreeMap<ContainerVersionKey, ContainerVersion>,
    pub(crate) items: BTreeMap<ItemKey, ContentItem>,
    pub(crate) content_versions: BTreeMap<ContentVersionKey, ContentVersion>,
    pub(crate) membership: MembershipIndex<ContainerVersionKey>,
    pub(crate) references: BTreeMap<ReferenceKey, CollectionReference>,
    pub(crate) reference_revisions: HashMap<ContainerVersionKey, u64>,
    pub(crate) expansions: BTreeMap<ExpansionKey, Expansion>,
    pub(crate) default_expansions: BTreeMap<ContainerVersionKey, ExpansionKey>,
    pub(crate) expansion_members: MembershipIndex<ExpansionKey>,

    // Derived indexes, rebuilt by `rebuild_indexes`.
    pub(crate) repo_by_url: HashMap<String, RepoKey>,
    pub(crate) version_by_label: HashMap<(RepoKey, String), ContainerVersionKey>,
    pub(crate) item_by_mnemonic: HashMap<(RepoKey, ContentKind, String), ItemKey>,
    pub(crate) endpoints: HashMap<ContentVersionKey, MappingEndpoints>,
    pub(crate) outgoing: HashMap<ItemKey, BTreeSet<ContentVersionKey>>,
    pub(crate) incoming: HashMap<ItemKey, BTreeSet<ContentVersionKey>>,
    pub(crate) parents: HashMap<ContentVersionKey, Vec<ItemKey>>,
    pub(crate) children: HashMap<ItemKey, BTreeSet<ContentVersionKey>>,
    pub(crate) pending: HashMap<(String, String), Vec<(ContentVersionKey, PendingSide)>>,
    pub(crate) references_by_version: HashMap<ContainerVersionKey, Vec<ReferenceKey>>,
    pub(crate) expansions_by_version: HashMap<ContainerVersionKey, Vec<ExpansionKey>>,
}

impl std::fmt::Debug for ContentGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentGraph")
            .field("repositories", &self.repositories.len())
            .field("container_versions", &self.container_versions.len())
            .field("items", &self.items.len())
            .field("content_versions", &self.content_versions.len())
            .field("references", &self.references.len())
            .field("expansions", &self.expansions.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ContentGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate(&mut self) -> u64 {
        self.next_key += 1;
        self.next_key
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REPOSITORIES AND CONTAINER VERSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns a repository by key.
    pub fn repository(&self, key: RepoKey) -> Option<&Repository> {
        self.repositories.get(&key)
    }

    /// Returns a repository by identity.
    pub fn repository_by_identity(&self, identity: &RepositoryIdentity) -> Option<&Repository> {
        self.repo_by_url
            .get(&identity.uri())
            .and_then(|key| self.repositories.get(key))
            .filter(|repo| &repo.identity == identity)
    }

    /// Returns a repository by URI or canonical URL.
    pub fn repository_by_url(&self, url: &str) -> Option<&Repository> {
        self.repo_by_url
            .get(&normalize_repository_url(url))
            .and_then(|key| self.repositories.get(key))
    }

    /// Iterates over all repositories.
    pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.values()
    }

    /// Returns a container version by key.
    pub fn container_version(&self, key: ContainerVersionKey) -> Option<&ContainerVersion> {
        self.container_versions.get(&key)
    }

    /// Returns a container version by repository and label.
    pub fn version_by_label(&self, repo: RepoKey, label: &str) -> Option<&ContainerVersion> {
        self.version_by_label
            .get(&(repo, label.to_string()))
            .and_then(|key| self.container_versions.get(key))
    }

    /// Returns the HEAD version of a repository.
    pub fn head_of(&self, repo: RepoKey) -> Option<&ContainerVersion> {
        self.repositories
            .get(&repo)
            .and_then(|r| self.container_versions.get(&r.head))
    }

    /// Iterates over all container versions.
    pub fn container_versions(&self) -> impl Iterator<Item = &ContainerVersion> {
        self.container_versions.values()
    }

    /// Versions of a repository, newest first.
    pub fn versions_of(&self, repo: RepoKey) -> Vec<&ContainerVersion> {
        let mut versions: Vec<&ContainerVersion> = self
            .repositories
            .get(&repo)
            .map(|r| {
                r.versions
                    .iter()
                    .filter_map(|key| self.container_versions.get(key))
                    .collect()
            })
            .unwrap_or_default();
        versions.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        versions
    }

    /// Kind of the repository owning a container version.
    pub fn repository_kind_of(&self, version: ContainerVersionKey) -> Option<RepositoryKind> {
        self.container_versions
            .get(&version)
            .and_then(|v| self.repositories.get(&v.repository))
            .map(|r| r.identity.kind)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONTENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns a content item by key.
    pub fn item(&self, key: ItemKey) -> Option<&ContentItem> {
        self.items.get(&key)
    }

    /// Returns a content item by repository, kind and mnemonic.
    pub fn item_by_mnemonic(&self, repo: RepoKey, kind: ContentKind, mnemonic: &str) -> Option<&ContentItem> {
        self.item_by_mnemonic
            .get(&(repo, kind, mnemonic.to_string()))
            .and_then(|key| self.items.get(key))
    }

    /// Items owned by a repository.
    pub fn items_of(&self, repo: RepoKey) -> impl Iterator<Item = &ContentItem> {
        self.items.values().filter(move |item| item.repository == repo)
    }

    /// Returns a content version by key.
    pub fn content_version(&self, key: ContentVersionKey) -> Option<&ContentVersion> {
        self.content_versions.get(&key)
    }

    /// Returns the version of an item with a given label.
    pub fn content_version_by_label(&self, item: ItemKey, label: &str) -> Option<&ContentVersion> {
        self.items.get(&item).and_then(|item| {
            item.versions
                .iter()
                .filter_map(|key| self.content_versions.get(key))
                .find(|version| version.label == label)
        })
    }

    /// Latest version in an item's chain.
    pub fn latest_version_of(&self, item: ItemKey) -> Option<&ContentVersion> {
        self.items
            .get(&item)
            .and_then(ContentItem::latest)
            .and_then(|key| self.content_versions.get(&key))
    }

    /// Container membership index.
    pub fn membership(&self) -> &MembershipIndex<ContainerVersionKey> {
        &self.membership
    }

    /// Resolved ends of a mapping version.
    pub fn mapping_endpoints(&self, version: ContentVersionKey) -> MappingEndpoints {
        self.endpoints.get(&version).copied().unwrap_or_default()
    }

    /// Mapping versions whose origin is `concept`.
    pub fn outgoing_mappings(&self, concept: ItemKey) -> impl Iterator<Item = ContentVersionKey> + '_ {
        self.outgoing
            .get(&concept)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Mapping versions whose target is `concept`.
    pub fn incoming_mappings(&self, concept: ItemKey) -> impl Iterator<Item = ContentVersionKey> + '_ {
        self.incoming
            .get(&concept)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Concept versions that name `concept` as a parent.
    pub fn child_versions(&self, concept: ItemKey) -> impl Iterator<Item = ContentVersionKey> + '_ {
        self.children
            .get(&concept)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Resolved parent items of a concept version.
    pub fn parent_items(&self, version: ContentVersionKey) -> &[ItemKey] {
        self.parents.get(&version).map_or(&[][..], Vec::as_slice)
    }

    /// Number of unresolved mapping ends and parent URLs.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Resolves a concept by its owning repository URL and code.
    pub fn resolve_concept(&self, repository_url: &str, code: &str) -> Option<ItemKey> {
        let repo = self.repository_by_url(repository_url)?;
        self.item_by_mnemonic
            .get(&(repo.key, ContentKind::Concept, code.to_string()))
            .copied()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REFERENCES AND EXPANSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns a reference by key.
    pub fn reference(&self, key: ReferenceKey) -> Option<&CollectionReference> {
        self.references.get(&key)
    }

    /// References of a collection version, in insertion order.
    pub fn references_of(&self, version: ContainerVersionKey) -> impl Iterator<Item = &CollectionReference> {
        self.references_by_version
            .get(&version)
            .into_iter()
            .flat_map(|keys| keys.iter())
            .filter_map(|key| self.references.get(key))
    }

    /// Returns an expansion by key.
    pub fn expansion(&self, key: ExpansionKey) -> Option<&Expansion> {
        self.expansions.get(&key)
    }

    /// Expansions of a collection version.
    pub fn expansions_of(&self, version: ContainerVersionKey) -> impl Iterator<Item = &Expansion> {
        self.expansions_by_version
            .get(&version)
            .into_iter()
            .flat_map(|keys| keys.iter())
            .filter_map(|key| self.expansions.get(key))
    }

    /// Default expansion of a collection version.
    pub fn default_expansion_of(&self, version: ContainerVersionKey) -> Option<&Expansion> {
        self.default_expansions
            .get(&version)
            .and_then(|key| self.expansions.get(key))
    }

    /// Expansion membership index.
    pub fn expansion_members(&self) -> &MembershipIndex<ExpansionKey> {
        &self.expansion_members
    }

    /// Content versions visible in a container version.
    ///
    /// Sources expose their membership; collections expose their default
    /// expansion (empty when there is none).
    pub fn context_members(&self, version: ContainerVersionKey) -> BTreeSet<ContentVersionKey> {
        match self.repository_kind_of(version) {
            Some(RepositoryKind::Source) => self.membership.member_set(version),
            Some(RepositoryKind::Collection) => self
                .default_expansions
                .get(&version)
                .map(|key| self.expansion_members.member_set(*key))
                .unwrap_or_default(),
            None => BTreeSet::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INDEX MAINTENANCE
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn index_repository(&mut self, repo: &Repository) {
        self.repo_by_url.insert(repo.identity.uri(), repo.key);
        if let Some(canonical) = &repo.metadata.canonical_url {
            self.repo_by_url
                .insert(normalize_repository_url(canonical), repo.key);
        }
    }

    /// Links a concept version's parents and a mapping version's ends.
    pub(crate) fn index_content_version(&mut self, version: ContentVersionKey) {
        let Some(payload) = self.content_versions.get(&version).map(|v| v.payload.clone()) else {
            return;
        };
        match payload {
            ContentPayload::Concept(concept) => {
                for url in concept.parent_concept_urls {
                    let Ok(parsed) = ParsedUri::parse(&url) else {
                        continue;
                    };
                    let Some(code) = parsed.code else {
                        continue;
                    };
                    let repo_url = parsed.repository.uri();
                    match self.resolve_concept(&repo_url, &code) {
                        Some(parent) => self.link(version, parent, PendingSide::Parent),
                        None => self.park(repo_url, code, version, PendingSide::Parent),
                    }
                }
            }
            ContentPayload::Mapping(mapping) => {
                let ends = [(mapping.from, PendingSide::From), (mapping.to, PendingSide::To)];
                self.endpoints.entry(version).or_default();
                for (end, side) in ends {
                    match self.resolve_concept(&end.source_url, &end.code) {
                        Some(concept) => self.link(version, concept, side),
                        None => self.park(
                            normalize_repository_url(&end.source_url),
                            end.code,
                            version,
                            side,
                        ),
                    }
                }
            }
        }
    }

    /// Links everything that waited for a newly created concept item.
    pub(crate) fn resolve_pending_for(&mut self, concept: ItemKey) -> usize {
        let Some(item) = self.items.get(&concept) else {
            return 0;
        };
        let code = item.mnemonic.clone();
        let Some(repo) = self.repositories.get(&item.repository) else {
            return 0;
        };
        let mut urls = vec![repo.identity.uri()];
        if let Some(canonical) = &repo.metadata.canonical_url {
            urls.push(normalize_repository_url(canonical));
        }

        let mut resolved = 0;
        for url in urls {
            if let Some(waiting) = self.pending.remove(&(url, code.clone())) {
                for (version, side) in waiting {
                    self.link(version, concept, side);
                    resolved += 1;
                }
            }
        }
        resolved
    }

    fn link(&mut self, version: ContentVersionKey, concept: ItemKey, side: PendingSide) {
        match side {
            PendingSide::From => {
                self.endpoints.entry(version).or_default().from = Some(concept);
                self.outgoing.entry(concept).or_default().insert(version);
            }
            PendingSide::To => {
                self.endpoints.entry(version).or_default().to = Some(concept);
                self.incoming.entry(concept).or_default().insert(version);
            }
            PendingSide::Parent => {
                let parents = self.parents.entry(version).or_default();
                if !parents.contains(&concept) {
                    parents.push(concept);
                }
                self.children.entry(concept).or_default().insert(version);
            }
        }
    }

    fn park(&mut self, repo_url: String, code: String, version: ContentVersionKey, side: PendingSide) {
        self.pending
            .entry((repo_url, code))
            .or_default()
            .push((version, side));
    }

    /// Rebuilds every derived index from the arenas.
    pub(crate) fn rebuild_indexes(&mut self) {
        self.repo_by_url.clear();
        self.version_by_label.clear();
        self.item_by_mnemonic.clear();
        self.endpoints.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.parents.clear();
        self.children.clear();
        self.pending.clear();
        self.references_by_version.clear();
        self.expansions_by_version.clear();

        let repositories: Vec<Repository> = self.repositories.values().cloned().collect();
        for repo in &repositories {
            self.index_repository(repo);
        }
        for version in self.container_versions.values() {
            self.version_by_label
                .insert((version.repository, version.label.clone()), version.key);
        }
        for item in self.items.values() {
            self.item_by_mnemonic
                .insert((item.repository, item.kind, item.mnemonic.clone()), item.key);
        }
        let content_keys: Vec<ContentVersionKey> = self.content_versions.keys().copied().collect();
        for key in content_keys {
            self.index_content_version(key);
        }
        for reference in self.references.values() {
            self.references_by_version
                .entry(reference.collection_version)
                .or_default()
                .push(reference.key);
        }
        for expansion in self.expansions.values() {
            self.expansions_by_version
                .entry(expansion.collection_version)
                .or_default()
                .push(expansion.key);
        }
    }

    /// Removes a repository and everything it owns, then rebuilds indexes.
    pub(crate) fn purge_repository(&mut self, repo: RepoKey) {
        let versions: Vec<ContainerVersionKey> = self
            .container_versions
            .values()
            .filter(|v| v.repository == repo)
            .map(|v| v.key)
            .collect();
        let contents: Vec<ContentVersionKey> = self
            .content_versions
            .values()
            .filter(|v| v.repository == repo)
            .map(|v| v.key)
            .collect();

        for version in &versions {
            self.membership.clear(*version);
            self.container_versions.remove(version);
            self.reference_revisions.remove(version);
            self.default_expansions.remove(version);
        }
        let expansions: Vec<ExpansionKey> = self
            .expansions
            .values()
            .filter(|e| versions.contains(&e.collection_version))
            .map(|e| e.key)
            .collect();
        for expansion in expansions {
            self.expansion_members.clear(expansion);
            self.expansions.remove(&expansion);
        }
        self.references
            .retain(|_, reference| !versions.contains(&reference.collection_version));

        for content in &contents {
            self.membership.forget_member(*content);
            self.expansion_members.forget_member(*content);
            self.content_versions.remove(content);
        }
        for reference in self.references.values_mut() {
            reference.resolved.retain(|key| !contents.contains(key));
        }
        self.items.retain(|_, item| item.repository != repo);
        self.repositories.remove(&repo);
        self.rebuild_indexes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_repository_url() {
        assert_eq!(
            normalize_repository_url("/orgs/a/sources/s/v1/"),
            "/orgs/a/sources/s/"
        );
        assert_eq!(normalize_repository_url("/orgs/a/sources/s"), "/orgs/a/sources/s/");
        assert_eq!(normalize_repository_url("http://loinc.org/"), "http://loinc.org");
    }

    #[test]
    fn test_empty_graph_lookups() {
        let graph = ContentGraph::new();
        assert!(graph.repository(RepoKey(1)).is_none());
        assert!(graph.repository_by_url("/orgs/a/sources/s/").is_none());
        assert_eq!(graph.mapping_endpoints(ContentVersionKey(1)), MappingEndpoints::default());
        assert!(graph.parent_items(ContentVersionKey(1)).is_empty());
        assert_eq!(graph.pending_count(), 0);
        assert!(graph.context_members(ContainerVersionKey(1)).is_empty());
    }
}
