//! Collaborators the store calls out to: ownership resolution and post-write
//! event hooks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ocl_types::{
    ContainerVersionKey, ContentKind, ContentVersionKey, ExpansionKey, OwnerKind, RepoKey,
};

/// Answers whether an owner exists and may own repositories.
pub trait OwnershipResolver: Send + Sync {
    /// Returns true when `owner` of `kind` exists.
    fn owner_exists(&self, kind: OwnerKind, owner: &str) -> bool;
}

/// Accepts every owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyOwner;

impl OwnershipResolver for AnyOwner {
    fn owner_exists(&self, _kind: OwnerKind, _owner: &str) -> bool {
        true
    }
}

/// Something that happened in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContentEvent {
    /// A repository and its HEAD were created.
    RepositoryCreated {
        /// Repository.
        repository: RepoKey,
        /// Versionless URI.
        uri: String,
    },
    /// A repository was deleted.
    RepositoryDeleted {
        /// Repository.
        repository: RepoKey,
        /// Versionless URI.
        uri: String,
        /// Acting user.
        actor: String,
    },
    /// A frozen container version was cut.
    VersionCut {
        /// Repository.
        repository: RepoKey,
        /// New version.
        version: ContainerVersionKey,
        /// Its label.
        label: String,
    },
    /// A content version was written.
    ContentWritten {
        /// Repository.
        repository: RepoKey,
        /// New content version.
        version: ContentVersionKey,
        /// Concept or Mapping.
        kind: ContentKind,
        /// Versioned URI.
        uri: String,
    },
    /// Collection references changed.
    ReferencesChanged {
        /// Collection version.
        collection_version: ContainerVersionKey,
        /// References added.
        added: usize,
        /// References removed.
        removed: usize,
    },
    /// An expansion was (re)computed.
    ExpansionComputed {
        /// Collection version.
        collection_version: ContainerVersionKey,
        /// Expansion.
        expansion: ExpansionKey,
        /// Member count.
        members: usize,
    },
}

/// Receives events after successful writes.
///
/// Implementations must return promptly; the store never waits on them and
/// never sees their failures.
pub trait EventHook: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &ContentEvent);
}

/// Delivers an event to every hook, swallowing hook panics.
pub(crate) fn dispatch(hooks: &[Arc<dyn EventHook>], event: &ContentEvent) {
    for hook in hooks {
        if catch_unwind(AssertUnwindSafe(|| hook.on_event(event))).is_err() {
            tracing::warn!(?event, "event hook panicked; event dropped for this hook");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Hook that records every event.
    #[derive(Default)]
    pub struct RecordingHook {
        pub events: Mutex<Vec<ContentEvent>>,
    }

    impl EventHook for RecordingHook {
        fn on_event(&self, event: &ContentEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
