//! Canonical content fingerprints.
//!
//! A checksum is the hex-encoded SHA-256 of a canonical serialization of a
//! payload. Canonicalization:
//!
//! - object keys are sorted recursively;
//! - lists are order-insensitive (each element is canonicalized, then the
//!   element strings are sorted) unless the list sits under a field listed in
//!   [`ChecksumPolicy::ordered_fields`];
//! - a single-element list canonicalizes to its element when
//!   [`ChecksumPolicy::collapse_single_element_lists`] is set;
//! - numbers keep their type (`1` and `1.0` differ) but textual variants of the
//!   same float collapse (`1.1` and `1.10` parse to the same value).
//!
//! Which payload fields take part in the `standard` and `smart` variants is
//! policy, not algorithm, so the field lists live in [`ChecksumPolicy`] and can
//! be loaded from configuration.
//!
//! ```
//! use ocl_core::checksum::ChecksumEngine;
//! use serde_json::json;
//!
//! let engine = ChecksumEngine::default();
//! assert_eq!(
//!     engine.checksum_value(&json!({"a": 1, "b": 2})),
//!     engine.checksum_value(&json!({"b": 2, "a": 1})),
//! );
//! assert_ne!(
//!     engine.checksum_value(&json!({"a": 1})),
//!     engine.checksum_value(&json!({"a": 1.0})),
//! );
//! ```

use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use ocl_types::{Checksums, ContentKind, ContentPayload, NameType};

/// Which fingerprint to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumVariant {
    /// Identifying and volatile fields included.
    Standard,
    /// Pure content, for duplicate detection across provenance.
    Smart,
}

/// Fields selected for one resource kind and variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSelection {
    /// Top-level fields that take part.
    pub fields: Vec<String>,
    /// For list-of-object fields, the keys kept on each element.
    pub subfields: BTreeMap<String, Vec<String>>,
    /// Keep only fully specified names in the `names` list.
    pub fully_specified_names_only: bool,
}

impl FieldSelection {
    fn of(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    fn with_subfields(mut self, field: &str, keys: &[&str]) -> Self {
        self.subfields
            .insert(field.to_string(), keys.iter().map(|k| k.to_string()).collect());
        self
    }
}

/// Field lists and canonicalization switches for checksums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumPolicy {
    /// Concept fields for the standard variant.
    pub concept_standard: FieldSelection,
    /// Concept fields for the smart variant.
    pub concept_smart: FieldSelection,
    /// Mapping fields for the standard variant.
    pub mapping_standard: FieldSelection,
    /// Mapping fields for the smart variant.
    pub mapping_smart: FieldSelection,
    /// Fields dropped when they are empty, `false` or zero-length.
    pub drop_if_empty: Vec<String>,
    /// Fields whose lists keep their order.
    pub ordered_fields: Vec<String>,
    /// `[x]` canonicalizes like `x`.
    pub collapse_single_element_lists: bool,
    /// Extras keys with this prefix are internal and never hashed.
    pub hidden_extras_prefix: String,
}

const NAME_KEYS: &[&str] = &["locale", "locale_preferred", "name", "name_type", "external_id"];
const DESCRIPTION_KEYS: &[&str] = &[
    "locale",
    "locale_preferred",
    "description",
    "description_type",
    "external_id",
];
const MAPPING_SMART_FIELDS: &[&str] = &[
    "map_type",
    "from_concept_code",
    "to_concept_code",
    "from_concept_name",
    "to_concept_name",
    "retired",
];

impl Default for ChecksumPolicy {
    fn default() -> Self {
        let mut mapping_standard: Vec<&str> = MAPPING_SMART_FIELDS.to_vec();
        mapping_standard.extend([
            "sort_weight",
            "extras",
            "external_id",
            "from_source_url",
            "from_source_version",
            "to_source_url",
            "to_source_version",
        ]);

        Self {
            concept_standard: FieldSelection::of(&[
                "concept_class",
                "datatype",
                "retired",
                "external_id",
                "extras",
                "names",
                "descriptions",
                "parent_concept_urls",
            ])
            .with_subfields("names", NAME_KEYS)
            .with_subfields("descriptions", DESCRIPTION_KEYS),
            concept_smart: FieldSelection {
                fully_specified_names_only: true,
                ..FieldSelection::of(&["concept_class", "datatype", "retired", "names"])
                    .with_subfields("names", NAME_KEYS)
            },
            mapping_standard: FieldSelection::of(&mapping_standard),
            mapping_smart: FieldSelection::of(MAPPING_SMART_FIELDS),
            drop_if_empty: [
                "retired",
                "parent_concept_urls",
                "descriptions",
                "extras",
                "names",
            ]
            .iter()
            .map(|f| f.to_string())
            .collect(),
            ordered_fields: vec![],
            collapse_single_element_lists: true,
            hidden_extras_prefix: "__".to_string(),
        }
    }
}

impl ChecksumPolicy {
    /// Field selection for a kind and variant.
    pub fn selection(&self, kind: ContentKind, variant: ChecksumVariant) -> &FieldSelection {
        match (kind, variant) {
            (ContentKind::Concept, ChecksumVariant::Standard) => &self.concept_standard,
            (ContentKind::Concept, ChecksumVariant::Smart) => &self.concept_smart,
            (ContentKind::Mapping, ChecksumVariant::Standard) => &self.mapping_standard,
            (ContentKind::Mapping, ChecksumVariant::Smart) => &self.mapping_smart,
        }
    }
}

/// Stateless checksum calculator configured by a [`ChecksumPolicy`].
#[derive(Debug, Clone, Default)]
pub struct ChecksumEngine {
    policy: ChecksumPolicy,
}

impl ChecksumEngine {
    /// Creates an engine for a policy.
    pub fn new(policy: ChecksumPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    pub fn policy(&self) -> &ChecksumPolicy {
        &self.policy
    }

    /// Checksum of a typed payload.
    pub fn checksum(&self, payload: &ContentPayload, variant: ChecksumVariant) -> String {
        let view = checksum_view(payload);
        self.checksum_json(Some(payload.kind()), &Value::Object(view), variant)
    }

    /// Both checksums of a typed payload.
    pub fn checksums(&self, payload: &ContentPayload) -> Checksums {
        Checksums {
            standard: self.checksum(payload, ChecksumVariant::Standard),
            smart: self.checksum(payload, ChecksumVariant::Smart),
        }
    }

    /// Checksum of a JSON payload.
    ///
    /// With a kind, `value` must use the flat field names of the checksum view
    /// (see [`checksum_view`]) and only the policy's fields are hashed. Without
    /// a kind, the whole value is hashed after cleanup.
    pub fn checksum_json(
        &self,
        kind: Option<ContentKind>,
        value: &Value,
        variant: ChecksumVariant,
    ) -> String {
        let selected = match (kind, value) {
            (Some(kind), Value::Object(map)) => {
                Value::Object(self.select(map, self.policy.selection(kind, variant)))
            }
            _ => value.clone(),
        };
        self.checksum_value(&selected)
    }

    /// Checksum of an arbitrary JSON value after cleanup.
    pub fn checksum_value(&self, value: &Value) -> String {
        let cleaned = self.cleanup(value);
        digest(&self.canonical_form(&cleaned, None))
    }

    /// Checksum over several checksums, independent of their order.
    pub fn combine(&self, checksums: &[String]) -> String {
        let mut sorted: Vec<&str> = checksums.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        digest(&sorted.join(","))
    }

    /// Computes one variant for many payloads in parallel.
    #[cfg(feature = "parallel")]
    pub fn checksum_many(&self, payloads: &[ContentPayload], variant: ChecksumVariant) -> Vec<String> {
        payloads
            .par_iter()
            .map(|payload| self.checksum(payload, variant))
            .collect()
    }

    /// Computes one variant for many payloads.
    #[cfg(not(feature = "parallel"))]
    pub fn checksum_many(&self, payloads: &[ContentPayload], variant: ChecksumVariant) -> Vec<String> {
        payloads
            .iter()
            .map(|payload| self.checksum(payload, variant))
            .collect()
    }

    /// Canonical string form of a value.
    pub fn canonical_form(&self, value: &Value, field: Option<&str>) -> String {
        match value {
            Value::Array(items) => {
                let mut parts: Vec<String> = items
                    .iter()
                    .map(|item| self.canonical_form(item, None))
                    .collect();
                if self.policy.collapse_single_element_lists && parts.len() == 1 {
                    return parts.remove(0);
                }
                let ordered = field.is_some_and(|f| self.policy.ordered_fields.iter().any(|o| o == f));
                if !ordered {
                    parts.sort_unstable();
                }
                format!("[{}]", parts.join(","))
            }
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort_unstable();
                let parts: Vec<String> = keys
                    .into_iter()
                    .map(|key| {
                        let encoded_key = Value::String(key.clone()).to_string();
                        format!("{encoded_key}:{}", self.canonical_form(&map[key], Some(key)))
                    })
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
            // serde_json prints integers without a fraction and floats with one,
            // so `1` and `1.0` stay distinct.
            other => other.to_string(),
        }
    }

    fn select(&self, map: &Map<String, Value>, selection: &FieldSelection) -> Map<String, Value> {
        let mut selected = Map::new();
        for field in &selection.fields {
            let Some(value) = map.get(field) else {
                continue;
            };
            let mut value = value.clone();
            if field == "names" && selection.fully_specified_names_only {
                if let Value::Array(names) = &mut value {
                    names.retain(|name| {
                        NameType::classify(name.get("name_type").and_then(Value::as_str))
                            .is_fully_specified()
                    });
                }
            }
            if let (Some(keys), Value::Array(items)) = (selection.subfields.get(field), &mut value) {
                for item in items.iter_mut() {
                    if let Value::Object(object) = item {
                        object.retain(|key, _| keys.contains(key));
                    }
                }
            }
            selected.insert(field.clone(), value);
        }
        selected
    }

    fn cleanup(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut cleaned = Map::new();
                for (key, value) in map {
                    if value.is_null() {
                        continue;
                    }
                    let value = if key == "extras" {
                        self.strip_hidden_extras(value)
                    } else {
                        self.cleanup(value)
                    };
                    if self.policy.drop_if_empty.contains(key) && is_empty_value(&value) {
                        continue;
                    }
                    cleaned.insert(key.clone(), value);
                }
                Value::Object(cleaned)
            }
            Value::Array(items) => Value::Array(items.iter().map(|item| self.cleanup(item)).collect()),
            other => other.clone(),
        }
    }

    fn strip_hidden_extras(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(key, _)| !key.starts_with(&self.policy.hidden_extras_prefix))
                    .map(|(key, value)| (key.clone(), self.cleanup(value)))
                    .collect(),
            ),
            other => self.cleanup(other),
        }
    }
}

/// Flat field view of a payload used for checksums.
///
/// Concepts use their serialized field names. Mappings are flattened to
/// `from_concept_code`, `from_concept_name`, `from_source_url`,
/// `from_source_version` and the matching `to_*` fields.
pub fn checksum_view(payload: &ContentPayload) -> Map<String, Value> {
    match payload {
        ContentPayload::Concept(concept) => match serde_json::to_value(concept) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        ContentPayload::Mapping(mapping) => {
            let mut map = Map::new();
            map.insert("map_type".into(), Value::String(mapping.map_type.clone()));
            map.insert("from_concept_code".into(), Value::String(mapping.from.code.clone()));
            map.insert("to_concept_code".into(), Value::String(mapping.to.code.clone()));
            map.insert("from_concept_name".into(), optional_string(&mapping.from.name));
            map.insert("to_concept_name".into(), optional_string(&mapping.to.name));
            map.insert("from_source_url".into(), Value::String(mapping.from.source_url.clone()));
            map.insert("to_source_url".into(), Value::String(mapping.to.source_url.clone()));
            map.insert("from_source_version".into(), optional_string(&mapping.from.source_version));
            map.insert("to_source_version".into(), optional_string(&mapping.to.source_version));
            map.insert("retired".into(), Value::Bool(mapping.retired));
            map.insert("external_id".into(), optional_string(&mapping.external_id));
            map.insert(
                "sort_weight".into(),
                mapping
                    .sort_weight
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number),
            );
            map.insert("extras".into(), Value::Object(mapping.extras.clone()));
            map
        }
    }
}

fn optional_string(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::String)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

fn digest(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
