// src/normalize/mod.rs

pub mod coerce;
pub mod error;
pub mod flatten;

pub use error::{NormalizeError, NormalizeResult};
pub use flatten::{AttributeSchema, FlattenSchema};

use arrow::{
    array::{ArrayRef, Float64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::table::{RawTable, SessionTable};

/// Turns raw session rows into the flat, typed session table.
///
/// Holds only the column lists; `normalize` never touches its input.
#[derive(Debug, Clone)]
pub struct Normalizer {
    json_attributes: Vec<String>,
    numeric_columns: Vec<String>,
    date_column: String,
}

/// One designated attribute after parsing: flattened object per row.
struct ParsedAttribute {
    attribute: String,
    column: usize,
    objects: Vec<Map<String, Value>>,
}

impl Normalizer {
    pub fn new(
        json_attributes: Vec<String>,
        numeric_columns: Vec<String>,
        date_column: impl Into<String>,
    ) -> Self {
        Self {
            json_attributes,
            numeric_columns,
            date_column: date_column.into(),
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(
            cfg.json_attributes.clone(),
            cfg.numeric_columns.clone(),
            cfg.date_column.clone(),
        )
    }

    /// Parse, flatten, coerce numerics and rewrite the date, deriving the
    /// flattened layout from the data itself.
    #[tracing::instrument(level = "info", skip_all, fields(rows = raw.num_rows()))]
    pub fn normalize(&self, raw: &RawTable) -> NormalizeResult<SessionTable> {
        let parsed = self.parse_attributes(raw)?;
        let schema = derive_schema(&parsed);
        self.build(raw, &parsed, &schema)
    }

    /// Layout `normalize` would use for `raw`, for callers that want to fix it up front.
    pub fn derive_schema(&self, raw: &RawTable) -> NormalizeResult<FlattenSchema> {
        let parsed = self.parse_attributes(raw)?;
        Ok(derive_schema(&parsed))
    }

    /// Like [`Normalizer::normalize`] but with a fixed layout: keys outside
    /// `schema` are dropped, keys it names but the data lacks come out missing.
    pub fn normalize_with_schema(
        &self,
        raw: &RawTable,
        schema: &FlattenSchema,
    ) -> NormalizeResult<SessionTable> {
        let parsed = self.parse_attributes(raw)?;
        self.build(raw, &parsed, schema)
    }

    fn is_numeric(&self, name: &str) -> bool {
        self.numeric_columns.iter().any(|c| c == name)
    }

    /// A table with none of the designated attributes but with their
    /// flattened or numeric columns has been through `normalize` already.
    fn is_flattened(&self, raw: &RawTable) -> bool {
        if self
            .json_attributes
            .iter()
            .any(|a| raw.column_index(a).is_some())
        {
            return false;
        }
        raw.headers.iter().any(|h| {
            self.is_numeric(h) || self.json_attributes.iter().any(|a| is_flattened_from(h, a))
        })
    }

    /// Parse every designated attribute present in `raw`.
    fn parse_attributes(&self, raw: &RawTable) -> NormalizeResult<Vec<ParsedAttribute>> {
        if self.is_flattened(raw) {
            debug!("no designated attributes left, already flattened");
            return Ok(Vec::new());
        }

        let mut parsed = Vec::with_capacity(self.json_attributes.len());
        for attribute in &self.json_attributes {
            let Some(column) = raw.column_index(attribute) else {
                if raw.headers.iter().any(|h| is_flattened_from(h, attribute)) {
                    debug!(attribute = %attribute, "already flattened, skipping");
                    continue;
                }
                return Err(NormalizeError::missing_column(attribute.as_str()));
            };

            let objects = (0..raw.num_rows())
                .into_par_iter()
                .map(|row| parse_object(attribute, row, raw.cell(row, column)))
                .collect::<NormalizeResult<Vec<_>>>()?;
            parsed.push(ParsedAttribute {
                attribute: attribute.clone(),
                column,
                objects,
            });
        }
        Ok(parsed)
    }

    fn build(
        &self,
        raw: &RawTable,
        parsed: &[ParsedAttribute],
        schema: &FlattenSchema,
    ) -> NormalizeResult<SessionTable> {
        let n = raw.num_rows();
        let mut text_columns: Vec<(String, Vec<Option<String>>)> = Vec::new();

        // Untouched columns first, in their original order.
        for (col, name) in raw.headers.iter().enumerate() {
            if parsed.iter().any(|p| p.column == col) {
                continue;
            }
            let cells = (0..n)
                .map(|row| raw.cell(row, col).map(str::to_string))
                .collect();
            text_columns.push((name.clone(), cells));
        }

        // Then one column per flattened key, attribute by attribute.
        for p in parsed {
            let Some(attr_schema) = schema.get(&p.attribute) else {
                continue;
            };
            for key in &attr_schema.keys {
                let cells = p
                    .objects
                    .iter()
                    .map(|obj| obj.get(key).and_then(flatten::leaf_to_text))
                    .collect();
                text_columns.push((attr_schema.column_name(key), cells));
            }
            debug!(
                attribute = %p.attribute,
                columns = attr_schema.keys.len(),
                "flattened attribute"
            );
        }

        let mut names = HashSet::with_capacity(text_columns.len());
        for (name, _) in &text_columns {
            if !names.insert(name.as_str()) {
                return Err(NormalizeError::DuplicateColumn(name.clone()));
            }
        }

        if !text_columns.iter().any(|(name, _)| *name == self.date_column) {
            return Err(NormalizeError::missing_column(self.date_column.as_str()));
        }

        let mut fields = Vec::with_capacity(text_columns.len() + self.numeric_columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());

        for (name, cells) in &text_columns {
            if self.is_numeric(name) {
                let values = to_numeric(name, cells)?;
                fields.push(Field::new(name, DataType::Float64, false));
                arrays.push(Arc::new(Float64Array::from(values)));
            } else if *name == self.date_column {
                let dates = to_iso_dates(name, cells)?;
                fields.push(Field::new(name, DataType::Utf8, false));
                arrays.push(Arc::new(StringArray::from(dates)));
            } else {
                fields.push(Field::new(name, DataType::Utf8, true));
                arrays.push(Arc::new(StringArray::from(cells.clone())));
            }
        }

        // Numeric targets nobody reported still have to exist.
        for name in &self.numeric_columns {
            if !text_columns.iter().any(|(c, _)| c == name) {
                debug!(column = %name, "numeric column absent, filling with zeros");
                fields.push(Field::new(name, DataType::Float64, false));
                arrays.push(Arc::new(Float64Array::from(vec![0.0; n])));
            }
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
        info!(
            rows = batch.num_rows(),
            columns = batch.num_columns(),
            "normalized sessions"
        );
        Ok(SessionTable::with_index(batch, raw.index.clone()))
    }
}

/// `device.browser` came from `device`.
fn is_flattened_from(column: &str, attribute: &str) -> bool {
    column
        .strip_prefix(attribute)
        .is_some_and(|rest| rest.len() > 1 && rest.starts_with('.'))
}

fn derive_schema(parsed: &[ParsedAttribute]) -> FlattenSchema {
    FlattenSchema {
        attributes: parsed
            .iter()
            .map(|p| AttributeSchema::derive(&p.attribute, &p.objects))
            .collect(),
    }
}

/// A missing cell reads as `{}`.
fn parse_object(
    column: &str,
    row: usize,
    cell: Option<&str>,
) -> NormalizeResult<Map<String, Value>> {
    let Some(text) = cell else {
        return Ok(Map::new());
    };
    let parse_err = |message: String| NormalizeError::Parse {
        column: column.to_string(),
        row,
        message,
    };
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => flatten::flatten_object(&obj)
            .map_err(|key| parse_err(format!("key `{}` appears twice once flattened", key))),
        Ok(other) => Err(parse_err(format!("expected an object, found `{}`", other))),
        Err(e) => Err(parse_err(e.to_string())),
    }
}

fn to_numeric(column: &str, cells: &[Option<String>]) -> NormalizeResult<Vec<f64>> {
    cells
        .iter()
        .enumerate()
        .map(|(row, cell)| match cell {
            None => Ok(0.0),
            Some(s) => coerce::parse_numeric(s).ok_or_else(|| NormalizeError::Conversion {
                column: column.to_string(),
                row,
                value: s.clone(),
            }),
        })
        .collect()
}

fn to_iso_dates(column: &str, cells: &[Option<String>]) -> NormalizeResult<Vec<String>> {
    cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            cell.as_deref()
                .and_then(coerce::to_iso_date)
                .ok_or_else(|| NormalizeError::DateFormat {
                    column: column.to_string(),
                    row,
                    value: cell.clone().unwrap_or_default(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use anyhow::Result;
    use arrow::array::Array;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,gadash::normalize=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn normalizer() -> Normalizer {
        Normalizer::from_config(&PipelineConfig::default())
    }

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            index: (0..rows.len()).map(|i| i.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    const HEADERS: [&str; 7] = [
        "channelGrouping",
        "date",
        "device",
        "fullVisitorId",
        "geoNetwork",
        "totals",
        "trafficSource",
    ];

    fn sessions() -> RawTable {
        raw(
            &HEADERS,
            &[
                &[
                    "Organic Search",
                    "20170615",
                    r#"{"browser": "Chrome", "deviceCategory": "desktop"}"#,
                    "0001",
                    r#"{"continent": "Americas"}"#,
                    r#"{"hits": "3", "transactionRevenue": null}"#,
                    r#"{"source": "google", "adwordsClickInfo": {"page": "1"}}"#,
                ],
                &[
                    "Direct",
                    "20161231",
                    r#"{"browser": "Chrome", "deviceCategory": "mobile"}"#,
                    "0002",
                    r#"{"continent": "Europe", "subContinent": "Western Europe"}"#,
                    r#"{"hits": "7", "pageviews": "5", "transactionRevenue": "25000000"}"#,
                    r#"{"source": "(direct)"}"#,
                ],
                &[
                    "Referral",
                    "20170101",
                    r#"{"browser": "Firefox", "deviceCategory": "desktop"}"#,
                    "0003",
                    r#"{"continent": "Asia"}"#,
                    "",
                    r#"{"source": "t.co"}"#,
                ],
            ],
        )
    }

    #[test]
    fn preserves_row_count() -> Result<()> {
        init_test_logging();
        let out = normalizer().normalize(&sessions())?;
        assert_eq!(out.num_rows(), 3);
        Ok(())
    }

    #[test]
    fn flattens_and_drops_json_columns() -> Result<()> {
        let out = normalizer().normalize(&sessions())?;
        let names = out.column_names();
        for gone in ["device", "geoNetwork", "totals", "trafficSource"] {
            assert!(!names.iter().any(|n| n == gone), "{} still present", gone);
        }
        assert_eq!(
            &names[..3],
            &["channelGrouping", "date", "fullVisitorId"]
        );
        let device: Vec<&String> = names.iter().filter(|n| n.starts_with("device.")).collect();
        assert_eq!(device, vec!["device.browser", "device.deviceCategory"]);
        assert!(names.iter().any(|n| n == "trafficSource.adwordsClickInfo.page"));

        let sub = out.text_column("geoNetwork.subContinent").unwrap();
        assert!(sub.is_null(0));
        assert_eq!(sub.value(1), "Western Europe");
        Ok(())
    }

    #[test]
    fn numeric_targets_are_present_and_filled() -> Result<()> {
        let out = normalizer().normalize(&sessions())?;
        for name in &PipelineConfig::default().numeric_columns {
            let col = out
                .numeric_column(name)
                .unwrap_or_else(|| panic!("{} missing or not numeric", name));
            assert_eq!(col.null_count(), 0);
            assert_eq!(col.len(), 3);
        }
        let hits = out.numeric_column("totals.hits").unwrap();
        assert_eq!(hits.values().to_vec(), vec![3.0, 7.0, 0.0]);
        let revenue = out.numeric_column("totals.transactionRevenue").unwrap();
        assert_eq!(revenue.values().to_vec(), vec![0.0, 25_000_000.0, 0.0]);
        // never reported by any row
        let bounces = out.numeric_column("totals.bounces").unwrap();
        assert!(bounces.values().iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn dates_become_iso() -> Result<()> {
        let out = normalizer().normalize(&sessions())?;
        let dates = out.text_column("date").unwrap();
        let got: Vec<&str> = dates.iter().flatten().collect();
        assert_eq!(got, vec!["2017-06-15", "2016-12-31", "2017-01-01"]);
        Ok(())
    }

    #[test]
    fn visitor_ids_keep_leading_zeros() -> Result<()> {
        let out = normalizer().normalize(&sessions())?;
        assert_eq!(out.text_column("fullVisitorId").unwrap().value(0), "0001");
        Ok(())
    }

    #[test]
    fn totals_example_row() -> Result<()> {
        let input = raw(
            &["date", "totals"],
            &[&["20170615", r#"{"hits": "3", "transactionRevenue": null}"#]],
        );
        let n = Normalizer::new(
            vec!["totals".into()],
            PipelineConfig::default().numeric_columns,
            "date",
        );
        let out = n.normalize(&input)?;
        assert_eq!(out.numeric_column("totals.hits").unwrap().value(0), 3.0);
        assert_eq!(
            out.numeric_column("totals.transactionRevenue").unwrap().value(0),
            0.0
        );
        assert_eq!(out.text_column("date").unwrap().value(0), "2017-06-15");
        Ok(())
    }

    #[test]
    fn exact_columns_for_key_set() -> Result<()> {
        let input = raw(
            &["date", "blob"],
            &[&["20170615", r#"{"a": 1}"#], &["20170616", r#"{"b": "x"}"#]],
        );
        let out = Normalizer::new(vec!["blob".into()], vec![], "date").normalize(&input)?;
        assert_eq!(out.column_names(), vec!["date", "blob.a", "blob.b"]);
        Ok(())
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut input = sessions();
        input.rows[1][2] = "{invalid}".into();
        let err = normalizer().normalize(&input).unwrap_err();
        assert!(
            matches!(err, NormalizeError::Parse { ref column, row: 1, .. } if column == "device"),
            "got {:?}",
            err
        );
    }

    #[test]
    fn non_object_json_is_a_parse_error() {
        let mut input = sessions();
        input.rows[0][5] = "[1, 2]".into();
        assert!(matches!(
            normalizer().normalize(&input),
            Err(NormalizeError::Parse { .. })
        ));
    }

    #[test]
    fn non_numeric_target_is_a_conversion_error() {
        let mut input = sessions();
        input.rows[2][5] = r#"{"pageviews": "lots"}"#.into();
        let err = normalizer().normalize(&input).unwrap_err();
        assert!(
            matches!(err, NormalizeError::Conversion { ref column, row: 2, ref value }
                if column == "totals.pageviews" && value == "lots"),
            "got {:?}",
            err
        );
    }

    #[test]
    fn bad_date_is_a_date_format_error() {
        let mut input = sessions();
        input.rows[0][1] = "2017/06/15".into();
        assert!(matches!(
            normalizer().normalize(&input),
            Err(NormalizeError::DateFormat { row: 0, .. })
        ));

        input.rows[0][1] = "".into();
        assert!(matches!(
            normalizer().normalize(&input),
            Err(NormalizeError::DateFormat { .. })
        ));
    }

    #[test]
    fn missing_designated_columns() {
        let mut input = sessions();
        input.headers[4] = "geo".into();
        assert!(matches!(
            normalizer().normalize(&input),
            Err(NormalizeError::MissingColumn(ref c)) if c == "geoNetwork"
        ));

        let mut input = sessions();
        input.headers[1] = "day".into();
        assert!(matches!(
            normalizer().normalize(&input),
            Err(NormalizeError::MissingColumn(ref c)) if c == "date"
        ));
    }

    #[test]
    fn second_pass_is_a_no_op() -> Result<()> {
        let first = normalizer().normalize(&sessions())?;
        let second = normalizer().normalize(&first.to_raw()?)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn second_pass_is_a_no_op_when_an_attribute_has_no_keys() -> Result<()> {
        let mut input = sessions();
        for row in &mut input.rows {
            row[6] = "{}".into();
        }
        let first = normalizer().normalize(&input)?;
        assert!(!first.column_names().iter().any(|c| c.starts_with("trafficSource")));

        let second = normalizer().normalize(&first.to_raw()?)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn flattened_names_clashing_with_existing_columns_are_rejected() {
        let input = raw(
            &["date", "device.browser", "device"],
            &[&["20170615", "Safari", r#"{"browser": "Chrome"}"#]],
        );
        let n = Normalizer::new(vec!["device".into()], vec![], "date");
        assert!(matches!(
            n.normalize(&input),
            Err(NormalizeError::DuplicateColumn(ref c)) if c == "device.browser"
        ));
    }

    #[test]
    fn nested_and_dotted_key_clash_is_a_parse_error() {
        let mut input = sessions();
        input.rows[1][2] = r#"{"a": {"b": 1}, "a.b": 2}"#.into();
        let err = normalizer().normalize(&input).unwrap_err();
        assert!(
            matches!(err, NormalizeError::Parse { ref column, row: 1, ref message }
                if column == "device" && message.contains("a.b")),
            "got {:?}",
            err
        );
    }

    #[test]
    fn index_labels_are_kept() -> Result<()> {
        let mut input = sessions();
        input.index = vec!["10".into(), "20".into(), "30".into()];
        let out = normalizer().normalize(&input)?;
        assert_eq!(out.index(), ["10", "20", "30"]);
        assert_eq!(out.to_raw()?.index, input.index);
        Ok(())
    }

    #[test]
    fn fixed_schema_drops_and_fills_keys() -> Result<()> {
        let n = normalizer();
        let mut schema = n.derive_schema(&sessions())?;
        let device = schema
            .attributes
            .iter_mut()
            .find(|a| a.attribute == "device")
            .unwrap();
        device.keys = vec!["browser".into(), "operatingSystem".into()];

        let out = n.normalize_with_schema(&sessions(), &schema)?;
        let names = out.column_names();
        assert!(!names.iter().any(|c| c == "device.deviceCategory"));
        let os = out.text_column("device.operatingSystem").unwrap();
        assert_eq!(os.null_count(), 3);
        Ok(())
    }

    #[test]
    fn does_not_mutate_input() -> Result<()> {
        let input = sessions();
        let before = input.clone();
        normalizer().normalize(&input)?;
        assert_eq!(input, before);
        Ok(())
    }
}
