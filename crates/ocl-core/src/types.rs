//! Engine-specific types: errors, write context and configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ocl_types::well_known;

use crate::checksum::ChecksumPolicy;

/// Field name → messages, in field order.
///
/// # Example
///
/// ```
/// use ocl_core::FieldErrors;
///
/// let mut errors = FieldErrors::new();
/// errors.add("mnemonic", "This field is required.");
/// assert!(!errors.is_empty());
/// assert_eq!(errors.get("mnemonic"), Some(&["This field is required.".to_string()][..]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Creates an empty error map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map holding a single message.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Appends a message for a field, skipping exact duplicates.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let messages = self.0.entry(field.into()).or_default();
        let message = message.into();
        if !messages.contains(&message) {
            messages.push(message);
        }
    }

    /// Merges another map into this one.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            for message in messages {
                self.add(field.clone(), message);
            }
        }
    }

    /// Messages recorded for a field.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Returns true when no message was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over fields and their messages.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// `Ok(())` when empty, otherwise a validation error.
    pub fn into_result(self) -> CoreResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(self))
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(" "))?;
        }
        Ok(())
    }
}

/// One content item that failed a repository's validation schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFailure {
    /// Mnemonic of the failing item.
    pub mnemonic: String,
    /// Versioned URI of the failing item.
    pub url: String,
    /// What failed.
    pub errors: FieldErrors,
}

/// Errors raised by the content store.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Field-level validation failure. Nothing was written.
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// Duplicate version label, duplicate reference, or stale base version.
    #[error("Conflict: {message}")]
    Conflict {
        /// What collided.
        message: String,
    },

    /// A directly addressed object does not exist.
    #[error("Not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Aggregated failures against a repository's validation schema.
    #[error("Schema validation failed for {} item(s)", .0.len())]
    SchemaValidation(Vec<SchemaFailure>),

    /// A low-level uniqueness or consistency violation.
    #[error("Integrity error: {message}")]
    Integrity {
        /// Verbatim description.
        message: String,
    },

    /// Attempt to change a frozen container version.
    #[error("Version '{label}' is frozen and cannot be modified")]
    Immutable {
        /// Label of the frozen version.
        label: String,
    },

    /// The operation observed a cancellation request.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error while exporting.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl CoreError {
    /// Creates a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a `Conflict` error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an `Integrity` error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Creates a validation error for a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }
}

/// Result type for store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Audit context passed explicitly to every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteContext {
    /// Acting user.
    pub actor: String,
    /// URL of the request that triggered the write, if any.
    pub request_url: Option<String>,
}

impl WriteContext {
    /// Context for an actor without a request URL.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            request_url: None,
        }
    }

    /// Context for background maintenance jobs.
    pub fn system() -> Self {
        Self::new("system")
    }

    /// Attaches the request URL.
    pub fn with_request_url(mut self, url: impl Into<String>) -> Self {
        self.request_url = Some(url.into());
        self
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Field lists for checksum computation.
    pub checksum_policy: ChecksumPolicy,
    /// Default cap on cascade bundle size (`None` = unbounded).
    pub cascade_max_results: Option<usize>,
    /// Skip creating a new content version when the checksum is unchanged.
    pub skip_unchanged_writes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checksum_policy: ChecksumPolicy::default(),
            cascade_max_results: Some(well_known::DEFAULT_CASCADE_MAX_RESULTS),
            skip_unchanged_writes: true,
        }
    }
}

impl EngineConfig {
    /// A configuration without bundle caps, for bulk exports.
    pub fn unbounded() -> Self {
        Self {
            cascade_max_results: None,
            ..Self::default()
        }
    }
}

/// Counts of records held by a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Repositories.
    pub repositories: usize,
    /// Container versions.
    pub container_versions: usize,
    /// Content items.
    pub items: usize,
    /// Content versions.
    pub content_versions: usize,
    /// Collection references.
    pub references: usize,
    /// Expansions.
    pub expansions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_dedupe_and_merge() {
        let mut errors = FieldErrors::single("names", "A concept must have at least one name");
        errors.add("names", "A concept must have at least one name");
        let mut other = FieldErrors::new();
        other.add("mnemonic", "This field is required.");
        errors.merge(other);

        assert_eq!(errors.get("names").map(<[String]>::len), Some(1));
        assert_eq!(errors.iter().count(), 2);
        assert!(errors.clone().into_result().is_err());
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_field_errors_display() {
        let mut errors = FieldErrors::new();
        errors.add("a", "bad");
        errors.add("b", "worse");
        assert_eq!(errors.to_string(), "a: bad; b: worse");
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.cascade_max_results, Some(1000));
        assert!(config.skip_unchanged_writes);
        assert_eq!(EngineConfig::unbounded().cascade_max_results, None);
    }

    #[test]
    fn test_write_context() {
        let ctx = WriteContext::new("admin").with_request_url("/orgs/CIEL/sources/CIEL/");
        assert_eq!(ctx.actor, "admin");
        assert_eq!(ctx.request_url.as_deref(), Some("/orgs/CIEL/sources/CIEL/"));
        assert_eq!(WriteContext::system().actor, "system");
    }
}
