//! Many-to-many links between containers and content versions.
//!
//! The same index type backs two relations: container version membership
//! (which content versions belong to a snapshot) and expansion membership
//! (which content versions a materialized expansion contains). Links are
//! explicit key pairs held in a forward and a reverse index, so seeding a new
//! container copies keys, never payloads.

use std::collections::{BTreeMap, BTreeSet};

use ocl_types::ContentVersionKey;

/// Forward and reverse membership index keyed by container `C`.
#[derive(Debug, Clone)]
pub struct MembershipIndex<C: Ord + Copy> {
    forward: BTreeMap<C, BTreeSet<ContentVersionKey>>,
    reverse: BTreeMap<ContentVersionKey, BTreeSet<C>>,
}

impl<C: Ord + Copy> Default for MembershipIndex<C> {
    fn default() -> Self {
        Self {
            forward: BTreeMap::new(),
            reverse: BTreeMap::new(),
        }
    }
}

impl<C: Ord + Copy> MembershipIndex<C> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Links a content version to a container. Returns false if already linked.
    pub fn attach(&mut self, container: C, member: ContentVersionKey) -> bool {
        let added = self.forward.entry(container).or_default().insert(member);
        if added {
            self.reverse.entry(member).or_default().insert(container);
        }
        added
    }

    /// Unlinks a content version from a container. Returns false if not linked.
    pub fn detach(&mut self, container: C, member: ContentVersionKey) -> bool {
        let removed = self
            .forward
            .get_mut(&container)
            .is_some_and(|members| members.remove(&member));
        if removed {
            if let Some(containers) = self.reverse.get_mut(&member) {
                containers.remove(&container);
                if containers.is_empty() {
                    self.reverse.remove(&member);
                }
            }
        }
        removed
    }

    /// Returns true if the content version belongs to the container.
    pub fn contains(&self, container: C, member: ContentVersionKey) -> bool {
        self.forward
            .get(&container)
            .is_some_and(|members| members.contains(&member))
    }

    /// Members of a container, in key order.
    pub fn members(&self, container: C) -> impl Iterator<Item = ContentVersionKey> + '_ {
        self.forward
            .get(&container)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    /// Members of a container as an owned set.
    pub fn member_set(&self, container: C) -> BTreeSet<ContentVersionKey> {
        self.forward.get(&container).cloned().unwrap_or_default()
    }

    /// Number of members of a container.
    pub fn len(&self, container: C) -> usize {
        self.forward.get(&container).map_or(0, BTreeSet::len)
    }

    /// Returns true when the container has no members.
    pub fn is_empty(&self, container: C) -> bool {
        self.len(container) == 0
    }

    /// Containers a content version belongs to.
    pub fn containers_of(&self, member: ContentVersionKey) -> impl Iterator<Item = C> + '_ {
        self.reverse
            .get(&member)
            .into_iter()
            .flat_map(|containers| containers.iter().copied())
    }

    /// Copies the current members of `from` into `to`. Returns the number copied.
    pub fn seed(&mut self, from: C, to: C) -> usize {
        let members = self.member_set(from);
        let count = members.len();
        for member in members {
            self.attach(to, member);
        }
        count
    }

    /// Replaces the members of a container with `members`.
    pub fn replace(&mut self, container: C, members: BTreeSet<ContentVersionKey>) {
        self.clear(container);
        for member in members {
            self.attach(container, member);
        }
    }

    /// Removes every link of a container.
    pub fn clear(&mut self, container: C) {
        for member in self.member_set(container) {
            self.detach(container, member);
        }
        self.forward.remove(&container);
    }

    /// Removes every link of a content version.
    pub fn forget_member(&mut self, member: ContentVersionKey) {
        let containers: Vec<C> = self.containers_of(member).collect();
        for container in containers {
            self.detach(container, member);
        }
    }

    /// All links as `(container, member)` pairs.
    pub fn pairs(&self) -> Vec<(C, ContentVersionKey)> {
        self.forward
            .iter()
            .flat_map(|(container, members)| members.iter().map(move |member| (*container, *member)))
            .collect()
    }

    /// Rebuilds an index from pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (C, ContentVersionKey)>) -> Self {
        let mut index = Self::new();
        for (container, member) in pairs {
            index.attach(container, member);
        }
        index
    }
}
