//! JSON persistence of the content graph.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ocl_core::{ContentGraph, GraphSnapshot};
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Loads a graph from `path`. Returns `None` when the file does not exist.
pub fn load(path: &Path) -> WorkerResult<Option<ContentGraph>> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    let snapshot: GraphSnapshot = serde_json::from_reader(reader).map_err(|source| WorkerError::Snapshot {
        path: path.to_path_buf(),
        source,
    })?;
    let graph = ContentGraph::from_snapshot(snapshot)?;
    info!(path = %path.display(), ?graph, "Loaded snapshot");
    Ok(Some(graph))
}

/// Saves a graph to `path`, replacing the previous file only once the new
/// one is fully written.
pub fn save(graph: &ContentGraph, path: &Path) -> WorkerResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let staging = path.with_extension("json.partial");
    {
        let mut writer = BufWriter::new(File::create(&staging)?);
        serde_json::to_writer(&mut writer, &graph.to_snapshot()).map_err(|source| WorkerError::Snapshot {
            path: staging.clone(),
            source,
        })?;
        writer.flush()?;
    }
    fs::rename(&staging, path)?;
    info!(path = %path.display(), "Saved snapshot");
    Ok(())
}
