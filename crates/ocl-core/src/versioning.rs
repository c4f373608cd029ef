//! Repository and container version lifecycle.
//!
//! A repository is created together with its HEAD version. Frozen versions are
//! cut from HEAD and start with a point-in-time copy of HEAD's membership;
//! afterwards only [`VersionAdminUpdate`] fields may change on them.

use chrono::Utc;
use tracing::info;

use ocl_types::well_known::{self, messages};
use ocl_types::{
    ContainerVersion, ContainerVersionKey, RepoKey, Repository, RepositoryIdentity,
    RepositoryKind, RepositoryMetadata, VersionAdminUpdate, VersionMetadata,
};

use crate::hooks::ContentEvent;
use crate::store::TerminologyStore;
use crate::types::{CoreError, CoreResult, WriteContext};
use crate::validation::{is_valid_repository_mnemonic, validate_repository};

impl TerminologyStore {
    // ═══════════════════════════════════════════════════════════════════════════
    // REPOSITORIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Creates a repository and its HEAD version.
    ///
    /// Collections with `autoexpand_head` also get an empty default expansion
    /// on HEAD. Nothing is written when validation fails.
    pub fn create_repository(
        &mut self,
        ctx: &WriteContext,
        identity: RepositoryIdentity,
        metadata: RepositoryMetadata,
    ) -> CoreResult<RepoKey> {
        let mut errors = validate_repository(&identity, &metadata);
        if !identity.owner.trim().is_empty() && !self.owners.owner_exists(identity.owner_kind, &identity.owner) {
            errors.add("owner", format!("Owner {} does not exist.", identity.owner_uri()));
        }
        let taken = self.graph.repositories().any(|repo| {
            repo.identity.owner_kind == identity.owner_kind
                && repo.identity.owner == identity.owner
                && repo.identity.mnemonic == identity.mnemonic
        });
        if taken {
            errors.add(
                "mnemonic",
                format!(
                    "Repository with mnemonic {} already exists for {}.",
                    identity.mnemonic,
                    identity.owner_uri()
                ),
            );
        }
        if let Some(canonical) = &metadata.canonical_url {
            if self.graph.repository_by_url(canonical).is_some() {
                errors.add("canonical_url", format!("Canonical URL {canonical} is already in use."));
            }
        }
        if let Some(schema) = &metadata.custom_validation_schema {
            if self.schemas.validator_for(schema).is_none() {
                errors.add("custom_validation_schema", format!("Unknown validation schema '{schema}'."));
            }
        }
        errors.into_result()?;

        let now = Utc::now();
        let key = RepoKey(self.graph.allocate());
        let head_key = ContainerVersionKey(self.graph.allocate());
        let head = ContainerVersion {
            key: head_key,
            repository: key,
            label: well_known::HEAD.to_string(),
            uri: identity.uri(),
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            retired: false,
            released: false,
            is_latest_version: true,
            default_locale: metadata.default_locale.clone(),
            supported_locales: metadata.supported_locales.clone(),
            canonical_url: metadata.canonical_url.clone(),
            external_id: metadata.external_id.clone(),
            custom_validation_schema: metadata.custom_validation_schema.clone(),
            extras: metadata.extras.clone(),
            sequence: 0,
            created_by: ctx.actor.clone(),
            updated_by: ctx.actor.clone(),
            created_at: now,
            updated_at: now,
        };
        let autoexpand = identity.is_collection() && metadata.autoexpand_head;
        let repository = Repository {
            key,
            identity,
            metadata,
            head: head_key,
            versions: vec![head_key],
            created_by: ctx.actor.clone(),
            created_at: now,
        };
        let uri = repository.uri();

        self.graph.index_repository(&repository);
        self.graph
            .version_by_label
            .insert((key, well_known::HEAD.to_string()), head_key);
        self.graph.container_versions.insert(head_key, head);
        self.graph.repositories.insert(key, repository);
        if autoexpand {
            self.install_default_expansion(ctx, head_key);
        }

        info!(%uri, actor = %ctx.actor, "Created repository");
        self.emit(ContentEvent::RepositoryCreated { repository: key, uri });
        Ok(key)
    }

    /// Deletes a repository with all its versions, content, references and
    /// expansions.
    ///
    /// Collections that referenced the deleted content keep their references;
    /// the deleted versions simply drop out of their resolved sets.
    pub fn delete_repository(&mut self, ctx: &WriteContext, identity: &RepositoryIdentity) -> CoreResult<()> {
        let key = self.repository_key(identity)?;
        let uri = identity.uri();
        self.graph.purge_repository(key);
        info!(%uri, actor = %ctx.actor, "Deleted repository");
        self.emit(ContentEvent::RepositoryDeleted {
            repository: key,
            uri,
            actor: ctx.actor.clone(),
        });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONTAINER VERSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cuts a frozen version from HEAD.
    ///
    /// The new version's membership is the membership HEAD has right now.
    /// Collections also copy their references and default expansion. Fails
    /// with `Conflict` when the label exists, `HEAD` included.
    pub fn cut_version(
        &mut self,
        ctx: &WriteContext,
        identity: &RepositoryIdentity,
        label: &str,
        metadata: VersionMetadata,
    ) -> CoreResult<ContainerVersionKey> {
        let repo = self.repository_key(identity)?;
        if label.trim().is_empty() {
            return Err(CoreError::invalid("version", messages::REQUIRED));
        }
        if label == well_known::HEAD || self.graph.version_by_label(repo, label).is_some() {
            return Err(CoreError::conflict(well_known::version_already_exists(label)));
        }
        if !is_valid_repository_mnemonic(label) {
            return Err(CoreError::invalid("version", messages::INVALID_MNEMONIC));
        }

        let head = self
            .graph
            .head_of(repo)
            .cloned()
            .ok_or_else(|| CoreError::integrity(format!("repository {identity} has no HEAD")))?;
        let sequence = self
            .graph
            .versions_of(repo)
            .first()
            .map_or(0, |newest| newest.sequence)
            + 1;

        let now = Utc::now();
        let key = ContainerVersionKey(self.graph.allocate());
        let version = ContainerVersion {
            key,
            repository: repo,
            label: label.to_string(),
            uri: identity.version_uri(label),
            name: metadata.name.unwrap_or_else(|| head.name.clone()),
            description: metadata.description.or_else(|| head.description.clone()),
            retired: false,
            released: metadata.released,
            is_latest_version: true,
            default_locale: metadata.default_locale.unwrap_or_else(|| head.default_locale.clone()),
            supported_locales: metadata
                .supported_locales
                .unwrap_or_else(|| head.supported_locales.clone()),
            canonical_url: metadata.canonical_url.or_else(|| head.canonical_url.clone()),
            external_id: metadata.external_id.or_else(|| head.external_id.clone()),
            custom_validation_schema: head.custom_validation_schema.clone(),
            extras: if metadata.extras.is_empty() {
                head.extras.clone()
            } else {
                metadata.extras
            },
            sequence,
            created_by: ctx.actor.clone(),
            updated_by: ctx.actor.clone(),
            created_at: now,
            updated_at: now,
        };

        let siblings: Vec<ContainerVersionKey> = self
            .graph
            .repository(repo)
            .map(|r| r.versions.clone())
            .unwrap_or_default();
        for sibling in siblings {
            if let Some(record) = self.graph.container_versions.get_mut(&sibling) {
                record.is_latest_version = false;
            }
        }
        self.graph.container_versions.insert(key, version);
        self.graph.version_by_label.insert((repo, label.to_string()), key);
        if let Some(record) = self.graph.repositories.get_mut(&repo) {
            record.versions.push(key);
        }

        let seeded = self.graph.membership.seed(head.key, key);
        if identity.is_collection() {
            self.seed_references(ctx, head.key, key);
            self.seed_default_expansion(ctx, head.key, key);
        }

        info!(uri = %identity.version_uri(label), members = seeded, "Cut version");
        self.emit(ContentEvent::VersionCut {
            repository: repo,
            version: key,
            label: label.to_string(),
        });
        Ok(key)
    }

    /// Applies an administrative update. The only change frozen versions accept.
    pub fn update_version_admin(
        &mut self,
        ctx: &WriteContext,
        version: ContainerVersionKey,
        update: VersionAdminUpdate,
    ) -> CoreResult<()> {
        let record = self
            .graph
            .container_versions
            .get_mut(&version)
            .ok_or_else(|| CoreError::not_found(format!("container version {version}")))?;
        if let Some(external_id) = update.external_id {
            record.external_id = external_id;
        }
        if let Some(released) = update.released {
            record.released = released;
        }
        record.updated_by = ctx.actor.clone();
        record.updated_at = Utc::now();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOOKUPS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Newest released frozen version of a repository.
    pub fn latest_released_version(&self, repo: RepoKey) -> Option<&ContainerVersion> {
        self.graph
            .versions_of(repo)
            .into_iter()
            .find(|version| version.released && version.is_frozen())
    }

    /// The version flagged as most recently created.
    pub fn latest_version(&self, repo: RepoKey) -> Option<&ContainerVersion> {
        self.graph
            .versions_of(repo)
            .into_iter()
            .find(|version| version.is_latest_version)
    }

    /// Collection versions, for maintenance jobs.
    pub fn collection_versions(&self) -> impl Iterator<Item = &ContainerVersion> {
        self.graph
            .container_versions()
            .filter(|version| self.graph.repository_kind_of(version.key) == Some(RepositoryKind::Collection))
    }
}
