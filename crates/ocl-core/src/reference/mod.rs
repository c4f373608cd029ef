//! Collection references and expansions.
//!
//! References say what a collection conceptually includes. Expansions hold the
//! concrete content versions those references resolve to right now. Each
//! stored reference keeps the versions it resolved to when it was added, so
//! that removing a reference can re-derive the default expansion from the
//! remaining references without resolving them again:
//!
//! ```text
//! expansion = ⋃ resolved(include refs) − ⋃ resolved(exclude refs)
//! ```
//!
//! The default expansion of a collection's HEAD is mirrored into HEAD's
//! container membership.

mod collection;
mod expansion;
mod resolve;

pub use collection::{ReferenceOptions, RemoveSelector};
pub use expansion::{ExpansionPlan, ExpansionRequest};
pub use resolve::Resolution;
