//! Stable arena keys.
//!
//! Every record in the content graph is addressed by a small `Copy` key rather
//! than by pointer or embedded list. Keys are allocated from a single monotonic
//! counter, so a key is never reused, even after the record it named is deleted.

use serde::{Deserialize, Serialize};

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw numeric value of this key.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_key!(
    /// Key of a Repository (Source or Collection).
    RepoKey,
    "repo"
);

arena_key!(
    /// Key of a Container Version (HEAD or a frozen snapshot).
    ContainerVersionKey,
    "container-version"
);

arena_key!(
    /// Key of a Content Item (the root record of a concept or mapping).
    ItemKey,
    "item"
);

arena_key!(
    /// Key of an immutable Content Version.
    ContentVersionKey,
    "content-version"
);

arena_key!(
    /// Key of a Collection Reference.
    ReferenceKey,
    "reference"
);

arena_key!(
    /// Key of a materialized Expansion.
    ExpansionKey,
    "expansion"
);
