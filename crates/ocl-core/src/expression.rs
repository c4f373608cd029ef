//! Parsing of repository, concept and mapping URIs and reference expressions.
//!
//! URIs are relative and slash-delimited:
//!
//! ```text
//! /{orgs|users}/{owner}/{sources|collections}/{repo}/[{version}/]
//!     [{concepts|mappings}/[{code}/[{resource_version}/]]]
//! ```
//!
//! Structured references name their repository through `system`, which may be
//! such a URI or a canonical URL.

use ocl_types::{
    well_known, CascadeDirective, ContentKind, OwnerKind, ReferenceExpression, RepositoryIdentity,
    RepositoryKind,
};

use crate::types::{CoreError, CoreResult};

/// Components of a parsed relative URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
    /// Owning repository.
    pub repository: RepositoryIdentity,
    /// Container version label, if present.
    pub version: Option<String>,
    /// Content kind segment, if present.
    pub kind: Option<ContentKind>,
    /// Concept or mapping code, if present.
    pub code: Option<String>,
    /// Content version label, if present.
    pub resource_version: Option<String>,
}

impl ParsedUri {
    /// Parses a relative URI.
    ///
    /// # Example
    ///
    /// ```
    /// use ocl_core::expression::ParsedUri;
    /// use ocl_types::ContentKind;
    ///
    /// let parsed = ParsedUri::parse("/orgs/CIEL/sources/CIEL/v1/concepts/1234/").unwrap();
    /// assert_eq!(parsed.repository.mnemonic, "CIEL");
    /// assert_eq!(parsed.version.as_deref(), Some("v1"));
    /// assert_eq!(parsed.kind, Some(ContentKind::Concept));
    /// assert_eq!(parsed.code.as_deref(), Some("1234"));
    /// ```
    pub fn parse(uri: &str) -> CoreResult<Self> {
        let invalid = || CoreError::invalid("expression", format!("Invalid URI: {uri}"));
        let segments: Vec<&str> = uri
            .split('?')
            .next()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 4 {
            return Err(invalid());
        }

        let owner_kind = OwnerKind::from_segment(segments[0]).ok_or_else(invalid)?;
        let repo_kind = RepositoryKind::from_segment(segments[2]).ok_or_else(invalid)?;
        let repository = RepositoryIdentity {
            owner_kind,
            owner: segments[1].to_string(),
            kind: repo_kind,
            mnemonic: segments[3].to_string(),
        };

        let mut rest = segments[4..].iter();
        let mut version = None;
        let mut kind = None;
        if let Some(segment) = rest.next() {
            match ContentKind::from_segment(segment) {
                Some(found) => kind = Some(found),
                None => {
                    version = Some(segment.to_string());
                    if let Some(segment) = rest.next() {
                        kind = Some(ContentKind::from_segment(segment).ok_or_else(invalid)?);
                    }
                }
            }
        }
        let code = rest.next().map(|s| s.to_string());
        let resource_version = rest.next().map(|s| s.to_string());
        if rest.next().is_some() || (code.is_some() && kind.is_none()) {
            return Err(invalid());
        }

        Ok(Self {
            repository,
            version: version.filter(|v| v != well_known::HEAD),
            kind,
            code,
            resource_version,
        })
    }

    /// Returns true when the URI names a single concept or mapping.
    pub fn is_item(&self) -> bool {
        self.code.is_some()
    }
}

/// How a reference names its target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryLocator {
    /// By owner and mnemonic.
    Identity(RepositoryIdentity),
    /// By canonical URL.
    CanonicalUrl(String),
}

/// A reference expression normalized to its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTarget {
    /// Target repository.
    pub repository: RepositoryLocator,
    /// Container version label (HEAD when `None`).
    pub version: Option<String>,
    /// Content kind (both kinds when `None` and no code is given).
    pub kind: Option<ContentKind>,
    /// Single item code.
    pub code: Option<String>,
    /// Content version label.
    pub resource_version: Option<String>,
    /// Cascade directive carried by the expression.
    pub cascade: Option<CascadeDirective>,
}

impl ReferenceTarget {
    /// Normalizes an expression.
    pub fn from_expression(expression: &ReferenceExpression) -> CoreResult<Self> {
        match expression {
            ReferenceExpression::Uri(uri) => {
                let parsed = ParsedUri::parse(uri)?;
                Ok(Self {
                    repository: RepositoryLocator::Identity(parsed.repository),
                    version: parsed.version,
                    kind: parsed.kind,
                    code: parsed.code,
                    resource_version: parsed.resource_version,
                    cascade: None,
                })
            }
            ReferenceExpression::Structured(structured) => {
                if structured.system.trim().is_empty() {
                    return Err(CoreError::invalid("system", well_known::messages::REQUIRED));
                }
                let (repository, uri_version) = if structured.system.starts_with('/') {
                    let parsed = ParsedUri::parse(&structured.system)?;
                    (RepositoryLocator::Identity(parsed.repository), parsed.version)
                } else {
                    (
                        RepositoryLocator::CanonicalUrl(
                            structured.system.trim_end_matches('/').to_string(),
                        ),
                        None,
                    )
                };
                let kind = match (&structured.code, structured.reference_type) {
                    (_, Some(kind)) => Some(kind),
                    (Some(_), None) => Some(ContentKind::Concept),
                    (None, None) => None,
                };
                Ok(Self {
                    repository,
                    version: structured
                        .version
                        .clone()
                        .or(uri_version)
                        .filter(|v| v != well_known::HEAD),
                    kind,
                    code: structured.code.clone(),
                    resource_version: structured.resource_version.clone(),
                    cascade: structured.cascade,
                })
            }
        }
    }

    /// Returns true when the target is a single item.
    pub fn is_item(&self) -> bool {
        self.code.is_some()
    }

    /// Versionless key of the target once its repository URI is known.
    pub fn versionless(&self, repository_uri: &str) -> String {
        let mut key = repository_uri.to_string();
        if let Some(kind) = self.kind {
            key.push_str(kind.segment());
            key.push('/');
            if let Some(code) = &self.code {
                key.push_str(code);
                key.push('/');
            }
        }
        key
    }
}

/// URI of a content item, optionally pinned to a content version.
pub fn item_uri(repository_uri: &str, kind: ContentKind, code: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{repository_uri}{}/{code}/{label}/", kind.segment()),
        None => format!("{repository_uri}{}/{code}/", kind.segment()),
    }
}
