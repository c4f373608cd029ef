//! The terminology content store.
//!
//! `TerminologyStore` owns the [`ContentGraph`] plus the collaborators it calls
//! out to. Its operations are spread over several modules by concern:
//!
//! - [`versioning`](crate::versioning): repositories and container versions;
//! - [`writes`](crate::writes): content writes, retirement, schemas;
//! - [`cascade`](crate::cascade): graph traversal;
//! - [`reference`](crate::reference): collection references and expansions;
//! - [`diff`](crate::diff): comparisons between container versions.
//!
//! Every mutating operation takes `&mut self`. Exclusive access is the
//! transaction boundary: seeding a version from HEAD cannot interleave with a
//! HEAD write, and single-object operations validate everything before they
//! touch the graph, so a failed call leaves no partial state.
//!
//! ```
//! use ocl_core::{TerminologyStore, WriteContext};
//! use ocl_types::{OwnerKind, RepositoryIdentity, RepositoryMetadata};
//!
//! let mut store = TerminologyStore::new();
//! let ctx = WriteContext::new("admin");
//! let identity = RepositoryIdentity::source(OwnerKind::Organization, "CIEL", "CIEL");
//! let repo = store.create_repository(&ctx, identity, RepositoryMetadata::named("CIEL")).unwrap();
//! assert!(store.graph().head_of(repo).is_some());
//! ```

use std::sync::Arc;

use ocl_types::{ContainerVersionKey, RepoKey, RepositoryIdentity, RepositoryKind};

use crate::checksum::ChecksumEngine;
use crate::graph::ContentGraph;
use crate::hooks::{dispatch, AnyOwner, ContentEvent, EventHook, OwnershipResolver};
use crate::types::{CoreError, CoreResult, EngineConfig, StoreStats};
use crate::validation::{BuiltinSchemas, SchemaProvider};

/// In-memory versioned content store.
pub struct TerminologyStore {
    pub(crate) graph: ContentGraph,
    pub(crate) config: EngineConfig,
    pub(crate) checksums: ChecksumEngine,
    pub(crate) schemas: Arc<dyn SchemaProvider>,
    pub(crate) owners: Arc<dyn OwnershipResolver>,
    pub(crate) hooks: Vec<Arc<dyn EventHook>>,
}

impl Default for TerminologyStore {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl std::fmt::Debug for TerminologyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminologyStore")
            .field("graph", &self.graph)
            .field("config", &self.config)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl TerminologyStore {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with a configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::from_graph(ContentGraph::new(), config)
    }

    /// Wraps an existing graph, e.g. one restored from a snapshot.
    pub fn from_graph(graph: ContentGraph, config: EngineConfig) -> Self {
        Self {
            graph,
            checksums: ChecksumEngine::new(config.checksum_policy.clone()),
            config,
            schemas: Arc::new(BuiltinSchemas),
            owners: Arc::new(AnyOwner),
            hooks: Vec::new(),
        }
    }

    /// Replaces the validation schema provider.
    pub fn with_schema_provider(mut self, provider: Arc<dyn SchemaProvider>) -> Self {
        self.schemas = provider;
        self
    }

    /// Replaces the ownership resolver.
    pub fn with_ownership_resolver(mut self, resolver: Arc<dyn OwnershipResolver>) -> Self {
        self.owners = resolver;
        self
    }

    /// Registers a post-write event hook.
    pub fn add_event_hook(&mut self, hook: Arc<dyn EventHook>) {
        self.hooks.push(hook);
    }

    /// Read access to the graph.
    pub fn graph(&self) -> &ContentGraph {
        &self.graph
    }

    /// Consumes the store and returns its graph.
    pub fn into_graph(self) -> ContentGraph {
        self.graph
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Checksum engine configured with the active policy.
    pub fn checksum_engine(&self) -> &ChecksumEngine {
        &self.checksums
    }

    /// Record counts.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            repositories: self.graph.repositories.len(),
            container_versions: self.graph.container_versions.len(),
            items: self.graph.items.len(),
            content_versions: self.graph.content_versions.len(),
            references: self.graph.references.len(),
            expansions: self.graph.expansions.len(),
        }
    }

    pub(crate) fn emit(&self, event: ContentEvent) {
        dispatch(&self.hooks, &event);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOOKUP HELPERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Key of a repository by identity.
    pub fn repository_key(&self, identity: &RepositoryIdentity) -> CoreResult<RepoKey> {
        self.graph
            .repository_by_identity(identity)
            .map(|repo| repo.key)
            .ok_or_else(|| CoreError::not_found(format!("repository {identity}")))
    }

    /// Key of a container version by repository identity and label.
    pub fn version_key(&self, identity: &RepositoryIdentity, label: &str) -> CoreResult<ContainerVersionKey> {
        let repo = self.repository_key(identity)?;
        self.graph
            .version_by_label(repo, label)
            .map(|version| version.key)
            .ok_or_else(|| CoreError::not_found(format!("version '{label}' of {identity}")))
    }

    /// Key of a repository's HEAD version.
    pub fn head_key(&self, identity: &RepositoryIdentity) -> CoreResult<ContainerVersionKey> {
        self.repository_key(identity)
            .and_then(|repo| self.graph.repository(repo).map(|r| r.head).ok_or_else(|| {
                CoreError::integrity(format!("repository {identity} has no HEAD"))
            }))
    }

    pub(crate) fn require_version(
        &self,
        version: ContainerVersionKey,
    ) -> CoreResult<&ocl_types::ContainerVersion> {
        self.graph
            .container_version(version)
            .ok_or_else(|| CoreError::not_found(format!("container version {version}")))
    }

    /// Checks that a container version is a collection's HEAD.
    pub(crate) fn require_collection_head(&self, version: ContainerVersionKey) -> CoreResult<()> {
        let record = self.require_version(version)?;
        if self.graph.repository_kind_of(version) != Some(RepositoryKind::Collection) {
            return Err(CoreError::invalid(
                "collection_version",
                format!("{} is not a collection version", record.uri),
            ));
        }
        if !record.is_head() {
            return Err(CoreError::Immutable {
                label: record.label.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WriteContext;
    use ocl_types::{OwnerKind, RepositoryMetadata};

    #[test]
    fn test_new_store_is_empty() {
        let store = TerminologyStore::new();
        assert_eq!(store.stats(), StoreStats::default());
        assert_eq!(store.config().cascade_max_results, Some(1000));
    }

    #[test]
    fn test_lookup_helpers() {
        let mut store = TerminologyStore::new();
        let ctx = WriteContext::new("admin");
        let identity = RepositoryIdentity::source(OwnerKind::Organization, "org", "src");
        let repo = store
            .create_repository(&ctx, identity.clone(), RepositoryMetadata::named("Source"))
            .unwrap();

        assert_eq!(store.repository_key(&identity).unwrap(), repo);
        let head = store.head_key(&identity).unwrap();
        assert_eq!(store.version_key(&identity, "HEAD").unwrap(), head);
        assert!(matches!(
            store.version_key(&identity, "v9"),
            Err(CoreError::NotFound { .. })
        ));
        assert!(store.require_collection_head(head).is_err());
    }

    #[test]
    fn test_debug_is_compact() {
        let store = TerminologyStore::new();
        let rendered = format!("{store:?}");
        assert!(rendered.contains("TerminologyStore"));
        assert!(rendered.contains("hooks: 0"));
    }
}
