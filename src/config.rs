// src/config.rs

use crate::load::LoadOptions;

/// Columns of the Google Store export that hold JSON object literals.
pub const JSON_ATTRIBUTES: [&str; 4] = ["trafficSource", "geoNetwork", "device", "totals"];

/// Flattened `totals.*` columns coerced to numbers, missing → 0.
pub const NUMERIC_COLUMNS: [&str; 5] = [
    "totals.hits",
    "totals.pageviews",
    "totals.bounces",
    "totals.newVisits",
    "totals.transactionRevenue",
];

pub const DATE_COLUMN: &str = "date";
/// Digits, but an identifier: kept as text and never correlated.
pub const VISITOR_ID_COLUMN: &str = "fullVisitorId";
pub const REVENUE_COLUMN: &str = "totals.transactionRevenue";

/// Rows read from the input; the dashboard is not meant for more.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// Everything a single run needs to know about the input layout.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub load: LoadOptions,
    pub json_attributes: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub date_column: String,
    pub revenue_column: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            load: LoadOptions::default(),
            json_attributes: JSON_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
            numeric_columns: NUMERIC_COLUMNS.iter().map(|s| s.to_string()).collect(),
            date_column: DATE_COLUMN.to_string(),
            revenue_column: REVENUE_COLUMN.to_string(),
        }
    }
}
