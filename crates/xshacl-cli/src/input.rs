//! Loading violation records and graphs from disk

use serde::Deserialize;
use std::path::Path;
use xshacl_core::{RdfFormat, TripleGraph, ViolationRecord, ViolationType};

use crate::error::{CliError, Result};

/// Accepted layouts of a violations file
#[derive(Deserialize)]
#[serde(untagged)]
enum ViolationsFile {
    List(Vec<ViolationRecord>),
    Wrapped { violations: Vec<ViolationRecord> },
    Single(ViolationRecord),
}

/// Read violation records from a JSON file
pub fn load_violations(path: &Path) -> Result<Vec<ViolationRecord>> {
    let content = read(path, "violations")?;
    parse_violations(&content)
}

/// Parse a JSON array, a `{"violations": [...]}` object, or a single record.
///
/// Records without a violation type are classified from their constraint
/// component.
pub fn parse_violations(content: &str) -> Result<Vec<ViolationRecord>> {
    let records = match serde_json::from_str::<ViolationsFile>(content)? {
        ViolationsFile::List(records) | ViolationsFile::Wrapped { violations: records } => records,
        ViolationsFile::Single(record) => vec![record],
    };

    Ok(records
        .into_iter()
        .map(|mut record| {
            if record.violation_type == ViolationType::Other {
                record.violation_type =
                    ViolationType::from_constraint_component(&record.constraint_id);
            }
            record
        })
        .collect())
}

/// Read a graph, or an empty graph when no path is given.
///
/// `.nt` files are read as N-Triples, anything else as Turtle.
pub fn load_graph(path: Option<&Path>) -> Result<TripleGraph> {
    match path {
        Some(path) => {
            let content = read(path, "graph")?;
            let format = RdfFormat::from_path(path);
            let graph = TripleGraph::parse(&content, format).map_err(|e| {
                CliError::parse_error(format!("{}: {}", path.display(), e))
            })?;
            tracing::debug!(
                path = %path.display(),
                format = %format,
                triples = graph.len(),
                "Loaded graph"
            );
            Ok(graph)
        }
        None => Ok(TripleGraph::new()),
    }
}

fn read(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        CliError::file_error(format!(
            "Failed to read {} file '{}': {}",
            what,
            path.display(),
            e
        ))
    })
}
