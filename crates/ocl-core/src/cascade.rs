//! Cascade resolution: breadth-first traversal from a root concept over
//! mapping edges and, optionally, the concept hierarchy.
//!
//! The traversal runs inside a container version context. Sources resolve
//! concepts and mappings through their membership; collections through their
//! default expansion. A concept is visited at most once, so cyclic graphs
//! terminate. Concepts at depth `d` contribute their edges for every
//! `d <= levels`; concepts first reached at depth `levels + 1` are left out.
//!
//! Entries come out root first, then the other concepts in discovery order,
//! then the mappings in discovery order.

use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ocl_types::{
    CascadeDirective, ContainerVersionKey, ContentKind, ContentVersion, ContentVersionKey, ItemKey,
};

use crate::cancel::CancelFlag;
use crate::store::TerminologyStore;
use crate::types::{CoreError, CoreResult};

/// What a cascade collects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CascadeMethod {
    /// Root plus its qualifying edges. Never advances past the root.
    MappingsOnly,
    /// Edges and the concepts on their other side, level by level.
    #[default]
    MappingsAndConcepts,
}

/// How deep a cascade goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CascadeLevels {
    /// Stop after this depth. `0` is the root and its direct edges.
    Depth(u32),
    /// Run to a fixed point (`"*"`).
    #[default]
    All,
}

impl CascadeLevels {
    fn allows(self, depth: u32) -> bool {
        match self {
            Self::Depth(limit) => depth <= limit,
            Self::All => true,
        }
    }
}

impl FromStr for CascadeLevels {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(Self::All);
        }
        raw.parse::<u32>()
            .map(Self::Depth)
            .map_err(|_| CoreError::invalid("cascade_levels", format!("'{raw}' is not a level count or '*'")))
    }
}

/// Allow/deny lists of map types selecting which edges are traversed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTypeFilter {
    /// When set, only these map types pass.
    pub allow: Option<BTreeSet<String>>,
    /// These map types never pass.
    pub deny: BTreeSet<String>,
}

impl MapTypeFilter {
    /// A filter passing only the given map types.
    pub fn allow<I, S>(map_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: Some(map_types.into_iter().map(Into::into).collect()),
            deny: BTreeSet::new(),
        }
    }

    /// A filter rejecting the given map types.
    pub fn deny<I, S>(map_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: None,
            deny: map_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true when `map_type` passes both lists.
    pub fn passes(&self, map_type: &str) -> bool {
        self.allow.as_ref().map_or(true, |allow| allow.contains(map_type)) && !self.deny.contains(map_type)
    }
}

/// Which traversed edges appear in the bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnMapTypes {
    /// Every traversed edge.
    #[default]
    All,
    /// No edges.
    None,
    /// Traversed edges of these map types.
    Only(BTreeSet<String>),
}

impl ReturnMapTypes {
    fn selects(&self, map_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Only(map_types) => map_types.contains(map_type),
        }
    }
}

/// Cascade parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeParams {
    pub method: CascadeMethod,
    pub levels: CascadeLevels,
    pub map_types: MapTypeFilter,
    pub return_map_types: ReturnMapTypes,
    /// Put mappings in the bundle at all.
    pub include_mappings: bool,
    /// Collect mapping edges. When off, only hierarchy traversal advances.
    pub cascade_mappings: bool,
    /// Advance to the concepts on the other side of edges and to hierarchy
    /// children (parents when `reverse`).
    pub cascade_hierarchy: bool,
    /// Also follow incoming mappings.
    pub reverse: bool,
    pub include_retired: bool,
    /// Members of this container version are dropped from the bundle. The root
    /// always stays.
    pub omit_if_exists_in: Option<ContainerVersionKey>,
    /// Bundle cap; the store default applies when `None`.
    pub max_results: Option<usize>,
    #[serde(skip)]
    pub cancel: Option<CancelFlag>,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            method: CascadeMethod::MappingsAndConcepts,
            levels: CascadeLevels::All,
            map_types: MapTypeFilter::default(),
            return_map_types: ReturnMapTypes::All,
            include_mappings: true,
            cascade_mappings: true,
            cascade_hierarchy: true,
            reverse: false,
            include_retired: false,
            omit_if_exists_in: None,
            max_results: None,
            cancel: None,
        }
    }
}

impl CascadeParams {
    /// `MappingsOnly` at level 0.
    pub fn mappings_only() -> Self {
        Self {
            method: CascadeMethod::MappingsOnly,
            levels: CascadeLevels::Depth(0),
            ..Self::default()
        }
    }

    /// Parameters implied by a reference's cascade directive.
    ///
    /// These are uncapped: a reference must resolve to its whole traversal.
    pub fn for_directive(directive: CascadeDirective) -> Self {
        let base = match directive {
            CascadeDirective::SourceMappings => Self::mappings_only(),
            CascadeDirective::SourceToConcepts => Self::default(),
        };
        Self {
            max_results: Some(usize::MAX),
            ..base
        }
    }

    /// Sets the level bound.
    pub fn with_levels(mut self, levels: CascadeLevels) -> Self {
        self.levels = levels;
        self
    }

    /// Attaches a cancellation flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// One entry of a cascade bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleEntry {
    pub version: ContentVersionKey,
    pub kind: ContentKind,
    /// Depth of the concept, or of the concept that contributed the mapping.
    pub depth: u32,
}

/// Result of a cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub entries: Vec<BundleEntry>,
    pub total: usize,
}

impl Bundle {
    /// Entry keys in bundle order.
    pub fn keys(&self) -> Vec<ContentVersionKey> {
        self.entries.iter().map(|entry| entry.version).collect()
    }

    /// Concept entries.
    pub fn concepts(&self) -> impl Iterator<Item = ContentVersionKey> + '_ {
        self.of_kind(ContentKind::Concept)
    }

    /// Mapping entries.
    pub fn mappings(&self) -> impl Iterator<Item = ContentVersionKey> + '_ {
        self.of_kind(ContentKind::Mapping)
    }

    fn of_kind(&self, kind: ContentKind) -> impl Iterator<Item = ContentVersionKey> + '_ {
        self.entries
            .iter()
            .filter(move |entry| entry.kind == kind)
            .map(|entry| entry.version)
    }
}

/// A concept in a nested cascade result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeNode {
    pub concept: ContentVersionKey,
    /// Bundle mappings contributed by this concept.
    pub mappings: Vec<ContentVersionKey>,
    /// Concepts first reached from this one.
    pub children: Vec<CascadeNode>,
    /// The traversal stopped here: the level bound was reached or the concept
    /// has no qualifying edges.
    pub terminal: bool,
}

struct FlatNode {
    version: ContentVersionKey,
    depth: u32,
    parent: Option<usize>,
    mappings: Vec<ContentVersionKey>,
    expanded: bool,
}

struct Traversal {
    nodes: Vec<FlatNode>,
    /// (mapping, depth) in discovery order.
    mappings: Vec<(ContentVersionKey, u32)>,
}

impl TerminologyStore {
    /// Runs a cascade from `root` within `context`.
    pub fn cascade(
        &self,
        context: ContainerVersionKey,
        root: ContentVersionKey,
        params: &CascadeParams,
    ) -> CoreResult<Bundle> {
        let traversal = self.traverse(context, root, params)?;
        let omitted = params
            .omit_if_exists_in
            .map(|other| self.graph.context_members(other))
            .unwrap_or_default();

        let concepts = traversal.nodes.iter().map(|node| BundleEntry {
            version: node.version,
            kind: ContentKind::Concept,
            depth: node.depth,
        });
        let mappings = traversal.mappings.iter().map(|(version, depth)| BundleEntry {
            version: *version,
            kind: ContentKind::Mapping,
            depth: *depth,
        });
        let mut entries: Vec<BundleEntry> = concepts
            .chain(mappings)
            .enumerate()
            .filter(|(index, entry)| *index == 0 || !omitted.contains(&entry.version))
            .map(|(_, entry)| entry)
            .collect();
        if let Some(cap) = self.cascade_cap(params) {
            entries.truncate(cap.max(1));
        }

        let total = entries.len();
        Ok(Bundle { entries, total })
    }

    /// Runs a cascade and returns it as a tree rooted at `root`.
    pub fn cascade_tree(
        &self,
        context: ContainerVersionKey,
        root: ContentVersionKey,
        params: &CascadeParams,
    ) -> CoreResult<CascadeNode> {
        let traversal = self.traverse(context, root, params)?;
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); traversal.nodes.len()];
        for (index, node) in traversal.nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                children[parent].push(index);
            }
        }
        Ok(build_node(&traversal.nodes, &children, 0))
    }

    fn cascade_cap(&self, params: &CascadeParams) -> Option<usize> {
        params.max_results.or(self.config.cascade_max_results)
    }

    fn traverse(
        &self,
        context: ContainerVersionKey,
        root: ContentVersionKey,
        params: &CascadeParams,
    ) -> CoreResult<Traversal> {
        self.require_version(context)?;
        let root_version = self
            .graph
            .content_version(root)
            .ok_or_else(|| CoreError::not_found(format!("content version {root}")))?;
        if root_version.kind() != ContentKind::Concept {
            return Err(CoreError::invalid("root", format!("{} is not a concept", root_version.uri)));
        }

        let members = self.graph.context_members(context);
        let cap = self.cascade_cap(params);
        let mut visited: HashSet<ItemKey> = HashSet::from([root_version.item]);
        let mut seen_mappings: HashSet<ContentVersionKey> = HashSet::new();
        let mut traversal = Traversal {
            nodes: vec![FlatNode {
                version: root,
                depth: 0,
                parent: None,
                mappings: Vec::new(),
                expanded: false,
            }],
            mappings: Vec::new(),
        };
        let mut frontier: Vec<usize> = vec![0];
        let mut depth: u32 = 0;

        while !frontier.is_empty() && params.levels.allows(depth) {
            if let Some(cancel) = &params.cancel {
                cancel.check()?;
            }
            let advance = params.method == CascadeMethod::MappingsAndConcepts
                && params.cascade_hierarchy
                && params.levels.allows(depth + 1);
            let mut next = Vec::new();

            for index in frontier {
                traversal.nodes[index].expanded = true;
                let version = traversal.nodes[index].version;
                let Some(item) = self.graph.content_version(version).map(|v| v.item) else {
                    continue;
                };

                let mut discovered: Vec<ItemKey> = Vec::new();
                if params.cascade_mappings {
                    for (mapping, other) in self.edges(item, params.reverse) {
                        let Some(record) = self.graph.content_version(mapping) else {
                            continue;
                        };
                        if !members.contains(&mapping) || !self.qualifies(record, params) {
                            continue;
                        }
                        let map_type = record.payload.as_mapping().map_or("", |m| m.map_type.as_str());
                        if params.include_mappings
                            && params.return_map_types.selects(map_type)
                            && seen_mappings.insert(mapping)
                        {
                            traversal.mappings.push((mapping, depth));
                            traversal.nodes[index].mappings.push(mapping);
                        }
                        discovered.extend(other);
                    }
                }
                if !advance {
                    continue;
                }
                discovered.extend(self.hierarchy_neighbours(item, version, params.reverse, &members));

                for neighbour in discovered {
                    if visited.contains(&neighbour) {
                        continue;
                    }
                    let Some(found) = self.version_in_context(neighbour, &members) else {
                        continue;
                    };
                    if !self.qualifies(found, params) {
                        continue;
                    }
                    visited.insert(neighbour);
                    traversal.nodes.push(FlatNode {
                        version: found.key,
                        depth: depth + 1,
                        parent: Some(index),
                        mappings: Vec::new(),
                        expanded: false,
                    });
                    next.push(traversal.nodes.len() - 1);
                }
            }

            debug!(depth, concepts = traversal.nodes.len(), mappings = traversal.mappings.len(), "Cascade level done");
            if params.method == CascadeMethod::MappingsOnly {
                break;
            }
            if cap.is_some_and(|cap| traversal.nodes.len() + traversal.mappings.len() >= cap) {
                break;
            }
            frontier = next;
            depth += 1;
        }
        Ok(traversal)
    }

    /// Mapping edges incident to a concept item with their other side.
    fn edges(&self, item: ItemKey, reverse: bool) -> Vec<(ContentVersionKey, Option<ItemKey>)> {
        let mut edges: Vec<(ContentVersionKey, Option<ItemKey>)> = self
            .graph
            .outgoing_mappings(item)
            .map(|mapping| (mapping, self.graph.mapping_endpoints(mapping).to))
            .collect();
        if reverse {
            edges.extend(
                self.graph
                    .incoming_mappings(item)
                    .map(|mapping| (mapping, self.graph.mapping_endpoints(mapping).from)),
            );
        }
        edges
    }

    fn hierarchy_neighbours(
        &self,
        item: ItemKey,
        version: ContentVersionKey,
        reverse: bool,
        members: &BTreeSet<ContentVersionKey>,
    ) -> Vec<ItemKey> {
        if reverse {
            self.graph.parent_items(version).to_vec()
        } else {
            self.graph
                .child_versions(item)
                .filter(|child| members.contains(child))
                .filter_map(|child| self.graph.content_version(child).map(|v| v.item))
                .collect()
        }
    }

    fn qualifies(&self, version: &ContentVersion, params: &CascadeParams) -> bool {
        if !params.include_retired && version.retired() {
            return false;
        }
        match version.payload.as_mapping() {
            Some(mapping) => params.map_types.passes(&mapping.map_type),
            None => true,
        }
    }

    /// The version of an item visible in a context, newest first.
    pub(crate) fn version_in_context(
        &self,
        item: ItemKey,
        members: &BTreeSet<ContentVersionKey>,
    ) -> Option<&ContentVersion> {
        self.graph
            .item(item)?
            .versions
            .iter()
            .rev()
            .find(|key| members.contains(key))
            .and_then(|key| self.graph.content_version(*key))
    }
}

fn build_node(nodes: &[FlatNode], children: &[Vec<usize>], index: usize) -> CascadeNode {
    let node = &nodes[index];
    let nested: Vec<CascadeNode> = children[index]
        .iter()
        .map(|child| build_node(nodes, children, *child))
        .collect();
    CascadeNode {
        concept: node.version,
        mappings: node.mappings.clone(),
        terminal: !node.expanded || (node.mappings.is_empty() && nested.is_empty()),
        children: nested,
    }
}
