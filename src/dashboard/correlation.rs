// src/dashboard/correlation.rs

use arrow::{
    array::{Array, Float64Array, StringArray},
    datatypes::DataType,
};
use serde::Serialize;

use crate::config::VISITOR_ID_COLUMN;
use crate::table::SessionTable;

/// Pearson correlation between every pair of numeric columns.
/// A column with no variance correlates as `NaN` (JSON `null`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[i][j])
    }
}

/// Correlates the `Float64` columns plus every text column whose present
/// cells all read as numbers or booleans (`true` → 1, `false` → 0).
/// Pairs only use rows where both sides are present.
pub fn correlation(table: &SessionTable) -> CorrelationMatrix {
    let batch = table.batch();
    let mut columns = Vec::new();
    let mut data: Vec<Vec<Option<f64>>> = Vec::new();
    for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
        if field.name() == VISITOR_ID_COLUMN {
            continue;
        }
        let values = match field.data_type() {
            DataType::Float64 => array
                .as_any()
                .downcast_ref::<Float64Array>()
                .map(|arr| arr.iter().collect::<Vec<_>>()),
            DataType::Utf8 => array
                .as_any()
                .downcast_ref::<StringArray>()
                .and_then(numeric_text),
            _ => None,
        };
        if let Some(values) = values {
            columns.push(field.name().clone());
            data.push(values);
        }
    }

    let values = data
        .iter()
        .map(|x| data.iter().map(|y| pearson(x, y)).collect())
        .collect();

    CorrelationMatrix { columns, values }
}

/// `None` unless at least one cell is present and every present cell is numeric.
fn numeric_text(arr: &StringArray) -> Option<Vec<Option<f64>>> {
    let mut values = Vec::with_capacity(arr.len());
    for cell in arr.iter() {
        match cell {
            None => values.push(None),
            Some(s) => values.push(Some(text_to_f64(s)?)),
        }
    }
    values.iter().any(Option::is_some).then_some(values)
}

fn text_to_f64(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(1.0)
    } else if s.eq_ignore_ascii_case("false") {
        Some(0.0)
    } else {
        s.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.is_empty() {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let my = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;
    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let (da, db) = (a - mx, b - my);
        cov += da * db;
        vx += da * da;
        vy += db * db;
    }
    if vx == 0.0 || vy == 0.0 {
        return f64::NAN;
    }
    cov / (vx.sqrt() * vy.sqrt())
}
