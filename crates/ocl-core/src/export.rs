//! CSV export of cascade bundles and expansions.

use std::io;

use serde::Serialize;

use ocl_types::{ContentPayload, ContentVersion, ContentVersionKey, ExpansionKey};

use crate::cascade::Bundle;
use crate::graph::ContentGraph;
use crate::types::{CoreError, CoreResult};

/// One exported content version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub kind: String,
    pub mnemonic: String,
    pub version: String,
    pub repository: String,
    pub retired: bool,
    pub map_type: String,
    pub from: String,
    pub to: String,
}

impl ExportRow {
    fn new(graph: &ContentGraph, version: &ContentVersion) -> Self {
        let repository = graph
            .repository(version.repository)
            .map(|repo| repo.uri())
            .unwrap_or_default();
        let (map_type, from, to) = match &version.payload {
            ContentPayload::Mapping(mapping) => (
                mapping.map_type.clone(),
                mapping.from.code.clone(),
                mapping.to.code.clone(),
            ),
            ContentPayload::Concept(_) => Default::default(),
        };
        Self {
            kind: version.kind().label().to_string(),
            mnemonic: version.mnemonic().to_string(),
            version: version.label.clone(),
            repository,
            retired: version.retired(),
            map_type,
            from,
            to,
        }
    }
}

/// Writes a cascade bundle in bundle order. Returns the number of rows.
pub fn write_bundle_csv<W: io::Write>(graph: &ContentGraph, bundle: &Bundle, writer: W) -> CoreResult<usize> {
    write_rows(graph, bundle.keys(), writer)
}

/// Writes the members of an expansion in key order. Returns the number of rows.
pub fn write_expansion_csv<W: io::Write>(
    graph: &ContentGraph,
    expansion: ExpansionKey,
    writer: W,
) -> CoreResult<usize> {
    if graph.expansion(expansion).is_none() {
        return Err(CoreError::not_found(format!("expansion {expansion}")));
    }
    write_rows(graph, graph.expansion_members().members(expansion), writer)
}

fn write_rows<W: io::Write>(
    graph: &ContentGraph,
    keys: impl IntoIterator<Item = ContentVersionKey>,
    writer: W,
) -> CoreResult<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut count = 0;
    for key in keys {
        let Some(version) = graph.content_version(key) else {
            continue;
        };
        csv_writer.serialize(ExportRow::new(graph, version))?;
        count += 1;
    }
    csv_writer.flush()?;
    Ok(count)
}
