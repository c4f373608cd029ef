//! Expansion records.
//!
//! An expansion is a named, materialized snapshot of the concrete content
//! versions a collection version's references resolve to. The membership
//! itself lives in the store's expansion index; this record carries identity
//! and bookkeeping only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContainerVersionKey, ExpansionKey, ReferenceKey};

/// Parameters an expansion was computed with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionParameters {
    /// Keep retired content versions that references resolve to.
    pub include_retired: bool,
}

/// A materialized expansion of a collection version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    /// Arena key.
    pub key: ExpansionKey,
    /// Collection version the expansion belongs to.
    pub collection_version: ContainerVersionKey,
    /// Mnemonic, unique per collection version.
    pub mnemonic: String,
    /// Parameters used for the last full computation.
    pub parameters: ExpansionParameters,
    /// References that resolved to nothing in the last computation.
    pub unresolved_references: Vec<ReferenceKey>,
    /// Actor that last recomputed the expansion.
    pub updated_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last recomputation.
    pub updated_at: DateTime<Utc>,
}
