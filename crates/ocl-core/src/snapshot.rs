//! Serializable form of the content graph.
//!
//! A snapshot holds the arenas and the two membership relations. Derived
//! indexes (URL lookups, mapping adjacency, hierarchy, pending ends) are not
//! stored; they are rebuilt on restore.

use serde::{Deserialize, Serialize};

use ocl_types::{
    CollectionReference, ContainerVersion, ContainerVersionKey, ContentItem, ContentVersion,
    ContentVersionKey, Expansion, ExpansionKey, Repository,
};

use crate::graph::ContentGraph;
use crate::membership::MembershipIndex;
use crate::types::{CoreError, CoreResult};

/// Snapshot layout version.
pub const SNAPSHOT_FORMAT: u32 = 1;

/// Owned, serializable copy of a [`ContentGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub format: u32,
    pub next_key: u64,
    pub repositories: Vec<Repository>,
    pub container_versions: Vec<ContainerVersion>,
    pub items: Vec<ContentItem>,
    pub content_versions: Vec<ContentVersion>,
    pub membership: Vec<(ContainerVersionKey, ContentVersionKey)>,
    pub references: Vec<CollectionReference>,
    pub reference_revisions: Vec<(ContainerVersionKey, u64)>,
    pub expansions: Vec<Expansion>,
    pub default_expansions: Vec<(ContainerVersionKey, ExpansionKey)>,
    pub expansion_members: Vec<(ExpansionKey, ContentVersionKey)>,
}

impl ContentGraph {
    /// Copies the graph into a snapshot.
    pub fn to_snapshot(&self) -> GraphSnapshot {
        let mut reference_revisions: Vec<(ContainerVersionKey, u64)> = self
            .reference_revisions
            .iter()
            .map(|(version, revision)| (*version, *revision))
            .collect();
        reference_revisions.sort();

        GraphSnapshot {
            format: SNAPSHOT_FORMAT,
            next_key: self.next_key,
            repositories: self.repositories.values().cloned().collect(),
            container_versions: self.container_versions.values().cloned().collect(),
            items: self.items.values().cloned().collect(),
            content_versions: self.content_versions.values().cloned().collect(),
            membership: self.membership.pairs(),
            references: self.references.values().cloned().collect(),
            reference_revisions,
            expansions: self.expansions.values().cloned().collect(),
            default_expansions: self
                .default_expansions
                .iter()
                .map(|(version, expansion)| (*version, *expansion))
                .collect(),
            expansion_members: self.expansion_members.pairs(),
        }
    }

    /// Restores a graph and rebuilds its indexes.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> CoreResult<Self> {
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(CoreError::integrity(format!(
                "Unsupported snapshot format {} (expected {SNAPSHOT_FORMAT})",
                snapshot.format
            )));
        }
        let mut graph = ContentGraph {
            next_key: snapshot.next_key,
            repositories: snapshot.repositories.into_iter().map(|r| (r.key, r)).collect(),
            container_versions: snapshot
                .container_versions
                .into_iter()
                .map(|v| (v.key, v))
                .collect(),
            items: snapshot.items.into_iter().map(|i| (i.key, i)).collect(),
            content_versions: snapshot
                .content_versions
                .into_iter()
                .map(|v| (v.key, v))
                .collect(),
            membership: MembershipIndex::from_pairs(snapshot.membership),
            references: snapshot.references.into_iter().map(|r| (r.key, r)).collect(),
            reference_revisions: snapshot.reference_revisions.into_iter().collect(),
            expansions: snapshot.expansions.into_iter().map(|e| (e.key, e)).collect(),
            default_expansions: snapshot.default_expansions.into_iter().collect(),
            expansion_members: MembershipIndex::from_pairs(snapshot.expansion_members),
            ..ContentGraph::default()
        };
        let highest = graph
            .repositories
            .keys()
            .map(|k| k.0)
            .chain(graph.container_versions.keys().map(|k| k.0))
            .chain(graph.items.keys().map(|k| k.0))
            .chain(graph.content_versions.keys().map(|k| k.0))
            .chain(graph.references.keys().map(|k| k.0))
            .chain(graph.expansions.keys().map(|k| k.0))
            .max()
            .unwrap_or(0);
        if highest > graph.next_key {
            return Err(CoreError::integrity(format!(
                "Snapshot key counter {} is behind key {highest}",
                graph.next_key
            )));
        }
        graph.rebuild_indexes();
        Ok(graph)
    }
}
