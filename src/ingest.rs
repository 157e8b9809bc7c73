// src/ingest.rs
// CSV ingestion: BCI exports come with slightly different header spellings
// per extract, so the row struct carries serde aliases and the reader is
// tolerant per row. One malformed line is logged and skipped, never fatal
// to the batch.

use anyhow::{Context, Result};
use log::{info, warn};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::models::{ImportRow, ProjectRecord};

pub fn read_import_file(path: &Path) -> Result<Vec<ImportRow>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open import file {:?}", path))?;
    let rows = read_import_rows(file)?;
    info!("Ingested {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

pub fn read_import_rows<R: Read>(reader: R) -> Result<Vec<ImportRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (line, record) in csv_reader.deserialize::<ImportRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!("Skipping unreadable row {}: {}", line + 2, e);
            }
        }
    }
    Ok(rows)
}

/// One `ProjectRecord` per distinct `bci_project_id`, first appearance wins
/// (BCI repeats the project metadata on every company row).
pub fn distinct_projects(rows: &[ImportRow]) -> Vec<ProjectRecord> {
    let mut seen = std::collections::HashSet::new();
    let mut projects = Vec::new();
    for row in rows {
        if row.bci_project_id.trim().is_empty() {
            continue;
        }
        if seen.insert(row.bci_project_id.clone()) {
            projects.push(ProjectRecord::from_row(row));
        }
    }
    projects
}
