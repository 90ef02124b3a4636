// src/aggregate/mod.rs

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::normalize::{NormalizeError, NormalizeResult};
use crate::table::SessionTable;

/// What a group's value measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Sessions in the group.
    Count,
    /// Sessions in the group whose value is above zero (purchases).
    NonZeroCount,
    /// Mean value over the group.
    Mean,
}

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Count => "count",
            Metric::NonZeroCount => "non zero count",
            Metric::Mean => "mean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Largest value first, ties by key.
    ValueDesc,
    KeyAsc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStat {
    pub key: String,
    pub value: f64,
}

/// `(group key, metric)` rows for one grouping dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub dimension: String,
    pub value_column: String,
    pub metric: Metric,
    pub rows: Vec<GroupStat>,
}

impl AggregateTable {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.rows.iter().find(|r| r.key == key).map(|r| r.value)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.key.as_str()).collect()
    }

    pub fn sorted(mut self, order: SortOrder) -> Self {
        match order {
            SortOrder::ValueDesc => self.rows.sort_by(|a, b| {
                b.value
                    .total_cmp(&a.value)
                    .then_with(|| a.key.cmp(&b.key))
            }),
            SortOrder::KeyAsc => self.rows.sort_by(|a, b| a.key.cmp(&b.key)),
        }
        self
    }
}

#[derive(Default)]
struct Acc {
    count: usize,
    nonzero: usize,
    sum: f64,
}

/// Group `value_column` by `dimension` and reduce each group to `metric`.
///
/// Rows without a group key are left out. Groups come back in key order.
pub fn aggregate(
    table: &SessionTable,
    dimension: &str,
    value_column: &str,
    metric: Metric,
) -> NormalizeResult<AggregateTable> {
    let keys = table
        .text_column(dimension)
        .ok_or_else(|| NormalizeError::missing_column(dimension))?;
    let values = table
        .numeric_column(value_column)
        .ok_or_else(|| NormalizeError::missing_column(value_column))?;

    let mut groups: HashMap<&str, Acc> = HashMap::new();
    for (key, value) in keys.iter().zip(values.iter()) {
        let Some(key) = key else { continue };
        let value = value.unwrap_or(0.0);
        let acc = groups.entry(key).or_default();
        acc.count += 1;
        acc.sum += value;
        if value > 0.0 {
            acc.nonzero += 1;
        }
    }

    let rows: Vec<GroupStat> = groups
        .into_iter()
        .filter_map(|(key, acc)| {
            let value = match metric {
                Metric::Count => acc.count as f64,
                Metric::NonZeroCount if acc.nonzero == 0 => return None,
                Metric::NonZeroCount => acc.nonzero as f64,
                Metric::Mean => acc.sum / acc.count as f64,
            };
            Some(GroupStat {
                key: key.to_string(),
                value,
            })
        })
        .collect();
    debug!(dimension, metric = metric.label(), groups = rows.len(), "aggregated");

    Ok(AggregateTable {
        dimension: dimension.to_string(),
        value_column: value_column.to_string(),
        metric,
        rows,
    }
    .sorted(SortOrder::KeyAsc))
}

pub fn count_by(
    table: &SessionTable,
    dimension: &str,
    value_column: &str,
) -> NormalizeResult<AggregateTable> {
    aggregate(table, dimension, value_column, Metric::Count)
}

pub fn nonzero_count_by(
    table: &SessionTable,
    dimension: &str,
    value_column: &str,
) -> NormalizeResult<AggregateTable> {
    aggregate(table, dimension, value_column, Metric::NonZeroCount)
}

pub fn mean_by(
    table: &SessionTable,
    dimension: &str,
    value_column: &str,
) -> NormalizeResult<AggregateTable> {
    aggregate(table, dimension, value_column, Metric::Mean)
}
