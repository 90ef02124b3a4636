// src/dashboard/render.rs

use anyhow::{Context, Result};
use prettytable::{format, Cell, Row, Table};
use std::io::Write;

use super::{Chart, CorrelationMatrix, Dashboard, PanelItem, TablePreview};

/// Hands a finished dashboard to some display.
pub trait Renderer {
    fn render(&self, dashboard: &Dashboard, out: &mut dyn Write) -> Result<()>;
}

/// Plain terminal output: one boxed table per chart.
#[derive(Debug, Clone)]
pub struct TextRenderer {
    /// Width of the longest bar.
    pub bar_width: usize,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self { bar_width: 40 }
    }
}

/// The whole dashboard as one JSON document, for an external charting front-end.
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer {
    pub pretty: bool,
}

impl Renderer for JsonRenderer {
    fn render(&self, dashboard: &Dashboard, out: &mut dyn Write) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *out, dashboard)
        } else {
            serde_json::to_writer(&mut *out, dashboard)
        }
        .context("serializing dashboard")?;
        writeln!(out)?;
        Ok(())
    }
}

impl Renderer for TextRenderer {
    fn render(&self, dashboard: &Dashboard, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "# {}\n", dashboard.title)?;
        writeln!(out, "{}\n", dashboard.intro)?;

        if let Some(raw) = &dashboard.raw_preview {
            writeln!(out, "## Raw data")?;
            preview_table(raw).print(&mut *out)?;
            writeln!(out)?;
        }
        if let Some(clean) = &dashboard.clean_preview {
            writeln!(out, "## Clean data")?;
            preview_table(clean).print(&mut *out)?;
            writeln!(out)?;
        }
        if let Some(corr) = &dashboard.correlation {
            writeln!(out, "## Correlation")?;
            correlation_table(corr).print(&mut *out)?;
            writeln!(out)?;
        }

        for panel in &dashboard.panels {
            writeln!(out, "=== {} ===\n", panel.title)?;
            for item in &panel.items {
                match item {
                    PanelItem::Chart(chart) => {
                        self.chart_table(chart).print(&mut *out)?;
                        writeln!(out)?;
                    }
                    PanelItem::Narrative { text } => writeln!(out, "{}\n", text)?,
                }
            }
        }
        Ok(())
    }
}

impl TextRenderer {
    fn chart_table(&self, chart: &Chart) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);
        table.set_titles(Row::new(vec![
            Cell::new(&chart.title).with_hspan(3).style_spec("bFg"),
        ]));
        table.add_row(Row::new(vec![
            Cell::new(&chart.data.dimension).style_spec("b"),
            Cell::new(chart.data.metric.label()).style_spec("b"),
            Cell::new(""),
        ]));

        let max = chart
            .data
            .rows
            .iter()
            .map(|r| r.value)
            .fold(0.0_f64, f64::max);
        for stat in &chart.data.rows {
            let len = if max > 0.0 {
                ((stat.value / max) * self.bar_width as f64).round() as usize
            } else {
                0
            };
            table.add_row(Row::new(vec![
                Cell::new(&stat.key),
                Cell::new(&format_value(stat.value)).style_spec("r"),
                Cell::new(&"█".repeat(len)),
            ]));
        }
        table
    }
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:.2}", v)
    }
}

fn preview_table(preview: &TablePreview) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    table.set_titles(Row::new(
        preview
            .headers
            .iter()
            .map(|h| Cell::new(h).style_spec("bFg"))
            .collect(),
    ));
    for row in &preview.rows {
        table.add_row(Row::new(row.iter().map(|c| Cell::new(c)).collect()));
    }
    table
}

fn correlation_table(corr: &CorrelationMatrix) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    let mut titles = vec![Cell::new("")];
    titles.extend(corr.columns.iter().map(|c| Cell::new(c).style_spec("bFg")));
    table.set_titles(Row::new(titles));
    for (name, values) in corr.columns.iter().zip(&corr.values) {
        let mut cells = vec![Cell::new(name).style_spec("b")];
        cells.extend(
            values
                .iter()
                .map(|v| Cell::new(&format!("{:.3}", v)).style_spec("r")),
        );
        table.add_row(Row::new(cells));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregateTable, GroupStat, Metric};
    use crate::dashboard::{ChartKind, Panel};

    fn dashboard() -> Dashboard {
        Dashboard {
            title: "Google Analytics Dashboard".into(),
            intro: "intro".into(),
            raw_preview: None,
            clean_preview: None,
            correlation: Some(CorrelationMatrix {
                columns: vec!["totals.hits".into()],
                values: vec![vec![f64::NAN]],
            }),
            panels: vec![Panel {
                title: "Device Plots".into(),
                items: vec![
                    PanelItem::Chart(Chart {
                        title: "Count by Internet Browser".into(),
                        kind: ChartKind::Bar,
                        color: "#4285F4",
                        vertical_labels: true,
                        data: AggregateTable {
                            dimension: "device.browser".into(),
                            value_column: "totals.transactionRevenue".into(),
                            metric: Metric::Count,
                            rows: vec![
                                GroupStat { key: "Chrome".into(), value: 2.0 },
                                GroupStat { key: "Firefox".into(), value: 1.0 },
                            ],
                        },
                    }),
                    PanelItem::Narrative {
                        text: "Chrome users buy.".into(),
                    },
                ],
            }],
        }
    }

    #[test]
    fn text_output_has_panels_charts_and_narrative() -> Result<()> {
        let mut buf = Vec::new();
        TextRenderer::default().render(&dashboard(), &mut buf)?;
        let text = String::from_utf8(buf)?;
        assert!(text.contains("=== Device Plots ==="));
        assert!(text.contains("Count by Internet Browser"));
        assert!(text.contains("Chrome"));
        assert!(text.contains("Chrome users buy."));
        assert!(text.contains("NaN"));
        Ok(())
    }

    #[test]
    fn json_output_is_structured() -> Result<()> {
        let mut buf = Vec::new();
        JsonRenderer::default().render(&dashboard(), &mut buf)?;
        let v: serde_json::Value = serde_json::from_slice(&buf)?;
        let item = &v["panels"][0]["items"][0];
        assert_eq!(item["type"], "chart");
        assert_eq!(item["kind"], "bar");
        assert_eq!(item["data"]["metric"], "count");
        assert_eq!(item["data"]["rows"][0]["key"], "Chrome");
        assert_eq!(v["panels"][0]["items"][1]["type"], "narrative");
        assert!(v["correlation"]["values"][0][0].is_null());
        assert!(v.get("raw_preview").is_none());
        Ok(())
    }

    #[test]
    fn whole_numbers_print_without_decimals() {
        assert_eq!(format_value(2.0), "2");
        assert_eq!(format_value(12.345), "12.35");
    }
}
