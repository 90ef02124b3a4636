// src/load.rs

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use std::{fs::File, io::Read, path::Path};
use tracing::{debug, info};

use crate::config::DEFAULT_MAX_ROWS;
use crate::table::RawTable;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Stop after this many data rows.
    pub max_rows: usize,
    /// Treat the first column as a row label rather than data.
    pub index_col: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            index_col: true,
        }
    }
}

/// Read at most `opts.max_rows` sessions from the CSV at `path`.
///
/// Cells are kept as text, so identifiers such as `fullVisitorId` keep
/// their leading zeros.
#[tracing::instrument(level = "info", skip(path, opts), fields(path = %path.as_ref().display()))]
pub fn load_sessions<P: AsRef<Path>>(path: P, opts: &LoadOptions) -> Result<RawTable> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open session file: {:?}", path.as_ref()))?;
    let table = read_sessions(file, opts)
        .with_context(|| format!("Failed to read sessions from {:?}", path.as_ref()))?;
    info!(rows = table.num_rows(), columns = table.headers.len(), "loaded sessions");
    Ok(table)
}

/// Same as [`load_sessions`] over any reader.
pub fn read_sessions<R: Read>(reader: R, opts: &LoadOptions) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let mut headers: Vec<String> = rdr
        .headers()
        .context("CSV has no header row")?
        .iter()
        .map(|s| s.to_string())
        .collect();
    if opts.index_col {
        if headers.is_empty() {
            bail!("CSV header is empty, cannot take an index column");
        }
        headers.remove(0);
    }

    let mut index = Vec::new();
    let mut rows = Vec::new();
    for (idx, result) in rdr.records().take(opts.max_rows).enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        let mut cells = record.iter().map(|s| s.to_string());
        if opts.index_col {
            index.push(cells.next().unwrap_or_default());
        } else {
            index.push(idx.to_string());
        }
        rows.push(cells.collect::<Vec<String>>());
    }
    debug!(rows = rows.len(), cap = opts.max_rows, "read csv records");

    Ok(RawTable {
        headers,
        index,
        rows,
    })
}
