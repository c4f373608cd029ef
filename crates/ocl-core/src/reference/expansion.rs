use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ocl_types::well_known;
use ocl_types::{
    ContainerVersionKey, ContentVersionKey, Expansion, ExpansionKey, ExpansionParameters,
    ReferenceKey, RepositoryKind,
};

use crate::cancel::CancelFlag;
use crate::hooks::ContentEvent;
use crate::store::TerminologyStore;
use crate::types::{CoreError, CoreResult, WriteContext};

/// Parameters for computing an expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionRequest {
    /// Expansion name; the version's auto-expansion name when `None`.
    pub mnemonic: Option<String>,
    pub parameters: ExpansionParameters,
    /// Mark the expansion as the version's default.
    pub make_default: bool,
    #[serde(skip)]
    pub cancel: Option<CancelFlag>,
}

impl Default for ExpansionRequest {
    fn default() -> Self {
        Self {
            mnemonic: None,
            parameters: default_parameters(),
            make_default: true,
            cancel: None,
        }
    }
}

impl ExpansionRequest {
    /// Attaches a cancellation flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Default expansions keep retired members that references name explicitly.
fn default_parameters() -> ExpansionParameters {
    ExpansionParameters { include_retired: true }
}

/// A computed, not yet applied expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionPlan {
    pub collection_version: ContainerVersionKey,
    /// Reference revision the plan was computed against.
    pub revision: u64,
    pub members: BTreeSet<ContentVersionKey>,
    /// Fresh resolution of every reference.
    pub resolved: Vec<(ReferenceKey, Vec<ContentVersionKey>)>,
    pub unresolved: Vec<ReferenceKey>,
}

impl TerminologyStore {
    // ═══════════════════════════════════════════════════════════════════════════
    // FULL EXPANSION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Resolves every reference of a collection version into a fresh member set.
    ///
    /// Cascade output is already stored as derived references, so references
    /// are resolved without re-running their cascade. Read-only; cancellation
    /// is checked between references.
    pub fn plan_expansion(
        &self,
        collection_version: ContainerVersionKey,
        request: &ExpansionRequest,
    ) -> CoreResult<ExpansionPlan> {
        self.require_version(collection_version)?;
        if self.graph.repository_kind_of(collection_version) != Some(RepositoryKind::Collection) {
            return Err(CoreError::invalid(
                "collection_version",
                format!("{collection_version} is not a collection version"),
            ));
        }

        let mut included = BTreeSet::new();
        let mut excluded = BTreeSet::new();
        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();
        for reference in self.graph.references_of(collection_version) {
            if let Some(cancel) = &request.cancel {
                cancel.check()?;
            }
            // exclusions keep their cascade; include cascades live on as derived references
            let cascade = if reference.include { None } else { reference.cascade };
            let members: Vec<ContentVersionKey> = self
                .resolve(&reference.expression, cascade)
                .map(|resolution| resolution.members.into_iter().chain(resolution.derived).collect())
                .unwrap_or_default();
            if members.is_empty() {
                unresolved.push(reference.key);
            }
            if reference.include {
                included.extend(members.iter().copied());
            } else {
                excluded.extend(members.iter().copied());
            }
            resolved.push((reference.key, members));
        }

        let members = included
            .difference(&excluded)
            .copied()
            .filter(|member| self.admits(*member, request.parameters.include_retired))
            .collect();
        Ok(ExpansionPlan {
            collection_version,
            revision: self.reference_revision(collection_version),
            members,
            resolved,
            unresolved,
        })
    }

    /// Swaps a plan's members into the target expansion.
    ///
    /// Fails with `Conflict` when the references changed after planning; the
    /// previous membership is untouched in that case.
    pub fn apply_expansion(
        &mut self,
        ctx: &WriteContext,
        plan: ExpansionPlan,
        request: &ExpansionRequest,
    ) -> CoreResult<ExpansionKey> {
        let collection_version = plan.collection_version;
        let label = self.require_version(collection_version)?.label.clone();
        if self.reference_revision(collection_version) != plan.revision {
            return Err(CoreError::conflict(format!(
                "References of version '{label}' changed while the expansion was computed."
            )));
        }

        let mnemonic = request
            .mnemonic
            .clone()
            .unwrap_or_else(|| well_known::auto_expansion_mnemonic(&label));
        let now = Utc::now();
        let existing = self
            .graph
            .expansions_of(collection_version)
            .find(|expansion| expansion.mnemonic == mnemonic)
            .map(|expansion| expansion.key);
        let key = match existing {
            Some(key) => key,
            None => self.insert_expansion(ctx, collection_version, mnemonic, request.parameters.clone()),
        };
        if let Some(record) = self.graph.expansions.get_mut(&key) {
            record.parameters = request.parameters.clone();
            record.unresolved_references = plan.unresolved;
            record.updated_by = ctx.actor.clone();
            record.updated_at = now;
        }
        let count = plan.members.len();
        self.graph.expansion_members.replace(key, plan.members);
        if request.make_default {
            self.graph.default_expansions.insert(collection_version, key);
        }
        if self.graph.default_expansions.get(&collection_version) == Some(&key) {
            for (reference, members) in plan.resolved {
                if let Some(record) = self.graph.references.get_mut(&reference) {
                    record.resolved = members;
                }
            }
            self.sync_head_membership(collection_version);
        }

        info!(version = %collection_version, expansion = %key, members = count, "Computed expansion");
        self.emit(ContentEvent::ExpansionComputed {
            collection_version,
            expansion: key,
            members: count,
        });
        Ok(key)
    }

    /// Plans and applies an expansion.
    pub fn expand(
        &mut self,
        ctx: &WriteContext,
        collection_version: ContainerVersionKey,
        request: &ExpansionRequest,
    ) -> CoreResult<ExpansionKey> {
        let plan = self.plan_expansion(collection_version, request)?;
        self.apply_expansion(ctx, plan, request)
    }

    /// Computes several expansions, in parallel when the `parallel` feature is
    /// on, and applies them one by one.
    pub fn expand_many(
        &mut self,
        ctx: &WriteContext,
        requests: &[(ContainerVersionKey, ExpansionRequest)],
    ) -> Vec<CoreResult<ExpansionKey>> {
        let plans = self.plan_many(requests);
        plans
            .into_iter()
            .zip(requests)
            .map(|(plan, (_, request))| plan.and_then(|plan| self.apply_expansion(ctx, plan, request)))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn plan_many(&self, requests: &[(ContainerVersionKey, ExpansionRequest)]) -> Vec<CoreResult<ExpansionPlan>> {
        use rayon::prelude::*;

        requests
            .par_iter()
            .map(|(version, request)| self.plan_expansion(*version, request))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn plan_many(&self, requests: &[(ContainerVersionKey, ExpansionRequest)]) -> Vec<CoreResult<ExpansionPlan>> {
        requests
            .iter()
            .map(|(version, request)| self.plan_expansion(*version, request))
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MAINTENANCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Auto-expanding collection versions without a default expansion.
    pub fn collections_missing_default_expansion(&self) -> Vec<ContainerVersionKey> {
        self.collection_versions()
            .filter(|version| {
                self.graph
                    .repository(version.repository)
                    .is_some_and(|repo| repo.metadata.autoexpand_head)
            })
            .filter(|version| !self.graph.default_expansions.contains_key(&version.key))
            .map(|version| version.key)
            .collect()
    }

    /// Creates the missing default expansions.
    pub fn ensure_default_expansions(
        &mut self,
        ctx: &WriteContext,
        cancel: Option<&CancelFlag>,
    ) -> CoreResult<Vec<ExpansionKey>> {
        let request = ExpansionRequest {
            cancel: cancel.cloned(),
            ..ExpansionRequest::default()
        };
        let requests: Vec<(ContainerVersionKey, ExpansionRequest)> = self
            .collections_missing_default_expansion()
            .into_iter()
            .map(|version| (version, request.clone()))
            .collect();
        debug!(count = requests.len(), "Creating missing default expansions");
        self.expand_many(ctx, &requests).into_iter().collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════════════════════════════════════

    fn reference_revision(&self, collection_version: ContainerVersionKey) -> u64 {
        self.graph
            .reference_revisions
            .get(&collection_version)
            .copied()
            .unwrap_or(0)
    }

    fn insert_expansion(
        &mut self,
        ctx: &WriteContext,
        collection_version: ContainerVersionKey,
        mnemonic: String,
        parameters: ExpansionParameters,
    ) -> ExpansionKey {
        let now = Utc::now();
        let key = ExpansionKey(self.graph.allocate());
        self.graph.expansions.insert(
            key,
            Expansion {
                key,
                collection_version,
                mnemonic,
                parameters,
                unresolved_references: Vec::new(),
                updated_by: ctx.actor.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        self.graph
            .expansions_by_version
            .entry(collection_version)
            .or_default()
            .push(key);
        key
    }

    /// Creates an empty default expansion for a new collection HEAD.
    pub(crate) fn install_default_expansion(&mut self, ctx: &WriteContext, collection_version: ContainerVersionKey) -> ExpansionKey {
        let label = self
            .graph
            .container_version(collection_version)
            .map(|version| version.label.clone())
            .unwrap_or_else(|| well_known::HEAD.to_string());
        let key = self.insert_expansion(
            ctx,
            collection_version,
            well_known::auto_expansion_mnemonic(&label),
            default_parameters(),
        );
        self.graph.default_expansions.insert(collection_version, key);
        key
    }

    /// Gives a newly cut version a copy of HEAD's default expansion.
    pub(crate) fn seed_default_expansion(
        &mut self,
        ctx: &WriteContext,
        from: ContainerVersionKey,
        to: ContainerVersionKey,
    ) {
        let Some(source) = self.graph.default_expansion_of(from).cloned() else {
            return;
        };
        let key = self.install_default_expansion(ctx, to);
        self.graph.expansion_members.seed(source.key, key);
        if let Some(record) = self.graph.expansions.get_mut(&key) {
            record.parameters = source.parameters;
            record.unresolved_references = Vec::new();
        }
    }

    /// Recomputes the default expansion from the stored resolutions.
    pub(crate) fn rederive_default_expansion(&mut self, ctx: &WriteContext, collection_version: ContainerVersionKey) {
        let Some(expansion) = self.graph.default_expansion_of(collection_version).cloned() else {
            return;
        };
        let excluded = self.excluded_members(collection_version);
        let mut unresolved = Vec::new();
        let mut included = BTreeSet::new();
        for reference in self.graph.references_of(collection_version) {
            if reference.resolved.is_empty() {
                unresolved.push(reference.key);
            }
            if reference.include {
                included.extend(reference.resolved.iter().copied());
            }
        }
        let members: BTreeSet<ContentVersionKey> = included
            .difference(&excluded)
            .copied()
            .filter(|member| self.admits(*member, expansion.parameters.include_retired))
            .collect();

        self.graph.expansion_members.replace(expansion.key, members);
        if let Some(record) = self.graph.expansions.get_mut(&expansion.key) {
            record.unresolved_references = unresolved;
            record.updated_by = ctx.actor.clone();
            record.updated_at = Utc::now();
        }
        self.sync_head_membership(collection_version);
    }

    /// Mirrors HEAD's default expansion into HEAD's membership.
    pub(crate) fn sync_head_membership(&mut self, collection_version: ContainerVersionKey) {
        let is_head = self
            .graph
            .container_version(collection_version)
            .is_some_and(|version| version.is_head());
        if !is_head {
            return;
        }
        let members = self.graph.context_members(collection_version);
        self.graph.membership.replace(collection_version, members);
    }
}
