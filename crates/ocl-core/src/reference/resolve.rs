use std::collections::BTreeSet;

use tracing::debug;

use ocl_types::{
    CascadeDirective, ContainerVersionKey, ContentKind, ContentVersionKey, ItemKey,
    ReferenceExpression, RepoKey, RepositoryKind,
};

use crate::cascade::CascadeParams;
use crate::expression::{item_uri, ReferenceTarget, RepositoryLocator};
use crate::store::TerminologyStore;
use crate::types::CoreResult;

/// What one expression resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Repository the expression points into, when it exists.
    pub repository: Option<RepoKey>,
    /// Container version the expression was resolved against.
    pub context: Option<ContainerVersionKey>,
    /// Versionless form used for duplicate detection.
    pub versionless: String,
    /// Kind and code of a single-item expression.
    pub target: Option<(ContentKind, String)>,
    /// Versions the expression itself names.
    pub members: Vec<ContentVersionKey>,
    /// Further versions reached by the cascade directive, excluding `members`.
    pub derived: Vec<ContentVersionKey>,
    /// Version-specific URI of a single-item resolution.
    pub pinned: Option<String>,
}

impl Resolution {
    /// Returns true when nothing was found.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl TerminologyStore {
    /// Resolves an expression against the current state of its repository.
    ///
    /// Pinning order: an explicit resource version, then an explicit
    /// repository version, then HEAD. A missing repository, version or item
    /// yields an empty resolution; only a malformed expression is an error.
    ///
    /// Only `cascade` is applied. A directive embedded in a structured
    /// expression is the caller's to pass on, see [`ReferenceExpression::cascade`].
    pub fn resolve(
        &self,
        expression: &ReferenceExpression,
        cascade: Option<CascadeDirective>,
    ) -> CoreResult<Resolution> {
        let target = ReferenceTarget::from_expression(expression)?;
        let repository = match &target.repository {
            RepositoryLocator::Identity(identity) => self.graph.repository_by_identity(identity),
            RepositoryLocator::CanonicalUrl(url) => self.graph.repository_by_url(url),
        };
        let Some(repository) = repository else {
            let base = match &target.repository {
                RepositoryLocator::Identity(identity) => identity.uri(),
                RepositoryLocator::CanonicalUrl(url) => format!("{url}/"),
            };
            debug!(%expression, "Reference points to an unknown repository");
            return Ok(Resolution {
                versionless: target.versionless(&base),
                target: target.code.clone().map(|code| (target.kind.unwrap_or(ContentKind::Concept), code)),
                ..Resolution::default()
            });
        };

        let repo_uri = repository.uri();
        let mut resolution = Resolution {
            repository: Some(repository.key),
            versionless: target.versionless(&repo_uri),
            target: target.code.clone().map(|code| (target.kind.unwrap_or(ContentKind::Concept), code)),
            ..Resolution::default()
        };
        let context = match &target.version {
            Some(label) => self.graph.version_by_label(repository.key, label).map(|v| v.key),
            None => Some(repository.head),
        };
        let Some(context) = context else {
            return Ok(resolution);
        };
        resolution.context = Some(context);
        let visible = self.graph.context_members(context);

        match &resolution.target {
            Some((kind, code)) => {
                let item = match repository.identity.kind {
                    RepositoryKind::Source => self.graph.item_by_mnemonic(repository.key, *kind, code).map(|i| i.key),
                    RepositoryKind::Collection => self.item_among(&visible, *kind, code),
                };
                let version = item.and_then(|item| match &target.resource_version {
                    Some(label) => self.graph.content_version_by_label(item, label),
                    None => self.version_in_context(item, &visible),
                });
                if let Some(version) = version {
                    resolution.members.push(version.key);
                    let owner_uri = self
                        .graph
                        .repository(version.repository)
                        .map_or_else(|| repo_uri.clone(), |owner| owner.uri());
                    resolution.pinned = Some(item_uri(&owner_uri, *kind, code, Some(&version.label)));
                }
            }
            None => {
                resolution.members = visible
                    .iter()
                    .filter_map(|key| self.graph.content_version(*key))
                    .filter(|version| !version.retired())
                    .filter(|version| target.kind.map_or(true, |kind| version.kind() == kind))
                    .map(|version| version.key)
                    .collect();
            }
        }

        if let Some(directive) = cascade {
            resolution.derived = self.cascade_members(context, &resolution.members, directive)?;
        }
        Ok(resolution)
    }

    fn item_among(&self, visible: &BTreeSet<ContentVersionKey>, kind: ContentKind, code: &str) -> Option<ItemKey> {
        visible
            .iter()
            .filter_map(|key| self.graph.content_version(*key))
            .find(|version| version.kind() == kind && version.mnemonic() == code)
            .map(|version| version.item)
    }

    fn cascade_members(
        &self,
        context: ContainerVersionKey,
        roots: &[ContentVersionKey],
        directive: CascadeDirective,
    ) -> CoreResult<Vec<ContentVersionKey>> {
        let params = CascadeParams::for_directive(directive);
        let mut seen: BTreeSet<ContentVersionKey> = roots.iter().copied().collect();
        let mut derived = Vec::new();
        for root in roots {
            let is_concept = self
                .graph
                .content_version(*root)
                .is_some_and(|version| version.kind() == ContentKind::Concept);
            if !is_concept {
                continue;
            }
            let bundle = self.cascade(context, *root, &params)?;
            for key in bundle.keys() {
                if seen.insert(key) {
                    derived.push(key);
                }
            }
        }
        Ok(derived)
    }
}
