// src/table.rs

use anyhow::{Context, Result};
use arrow::{
    array::{Array, Float64Array, StringArray},
    record_batch::RecordBatch,
    util::display::array_value_to_string,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{fs::File, path::Path};
use tracing::info;

/// Session rows exactly as read from the CSV: every cell is text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column names from the header row, without the index column.
    pub headers: Vec<String>,
    /// Row labels taken from the index column (row numbers if there was none).
    pub index: Vec<String>,
    /// One entry per session, one cell per header. An empty cell is missing.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at (`row`, `col`), `None` when empty.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// The normalized (flattened) session table handed to aggregation and rendering.
///
/// Text columns are nullable `Utf8`, numeric targets are non-null `Float64`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTable {
    batch: RecordBatch,
    index: Vec<String>,
}

fn row_numbers(n: usize) -> Vec<String> {
    (0..n).map(|i| i.to_string()).collect()
}

impl SessionTable {
    /// Rows labelled by position.
    pub fn new(batch: RecordBatch) -> Self {
        let index = row_numbers(batch.num_rows());
        Self { batch, index }
    }

    /// Rows labelled by `index`, e.g. the labels read from the CSV.
    /// Falls back to positions when the lengths disagree.
    pub fn with_index(batch: RecordBatch, index: Vec<String>) -> Self {
        if index.len() != batch.num_rows() {
            return Self::new(batch);
        }
        Self { batch, index }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// `Utf8` column by name; `None` if absent or not text.
    pub fn text_column(&self, name: &str) -> Option<&StringArray> {
        self.batch
            .column_by_name(name)
            .and_then(|a| a.as_any().downcast_ref::<StringArray>())
    }

    /// `Float64` column by name; `None` if absent or not numeric.
    pub fn numeric_column(&self, name: &str) -> Option<&Float64Array> {
        self.batch
            .column_by_name(name)
            .and_then(|a| a.as_any().downcast_ref::<Float64Array>())
    }

    /// First `n` rows (fewer if the table is shorter).
    pub fn head(&self, n: usize) -> SessionTable {
        let len = n.min(self.batch.num_rows());
        SessionTable {
            batch: self.batch.slice(0, len),
            index: self.index[..len].to_vec(),
        }
    }

    /// Render every cell back to text, so the table can be fed to the normalizer again.
    pub fn to_raw(&self) -> Result<RawTable> {
        let mut rows = vec![Vec::with_capacity(self.batch.num_columns()); self.batch.num_rows()];
        for col in self.batch.columns() {
            for (i, row) in rows.iter_mut().enumerate() {
                let cell = if col.is_null(i) {
                    String::new()
                } else {
                    array_value_to_string(col.as_ref(), i).context("rendering cell as text")?
                };
                row.push(cell);
            }
        }

        Ok(RawTable {
            headers: self.column_names(),
            index: self.index.clone(),
            rows,
        })
    }

    /// Write the table to a SNAPPY-compressed parquet file.
    pub fn write_parquet(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, self.batch.schema(), Some(props))
            .context("creating Arrow writer for session table")?;
        writer.write(&self.batch).context("writing session batch")?;
        writer.close().context("closing session writer")?;
        info!(path = %path.display(), rows = self.num_rows(), "wrote parquet");
        Ok(())
    }
}
