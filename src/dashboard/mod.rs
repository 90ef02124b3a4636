// src/dashboard/mod.rs

pub mod correlation;
pub mod render;

pub use correlation::{correlation, CorrelationMatrix};
pub use render::{JsonRenderer, Renderer, TextRenderer};

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{count_by, mean_by, nonzero_count_by, AggregateTable, SortOrder};
use crate::table::{RawTable, SessionTable};

const BLUE: &str = "#4285F4";
const RED: &str = "#DB4437";
const YELLOW: &str = "#F4B400";
const GREEN: &str = "#0F9D58";

/// Rows shown by the raw / clean previews.
pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
}

/// A chart description for the rendering side; no layout or styling beyond this.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub title: String,
    pub kind: ChartKind,
    pub color: &'static str,
    pub vertical_labels: bool,
    pub data: AggregateTable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PanelItem {
    Chart(Chart),
    Narrative { text: String },
}

/// One tab of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub title: String,
    pub items: Vec<PanelItem>,
}

impl Panel {
    pub fn charts(&self) -> impl Iterator<Item = &Chart> {
        self.items.iter().filter_map(|i| match i {
            PanelItem::Chart(c) => Some(c),
            PanelItem::Narrative { .. } => None,
        })
    }
}

/// First rows of a table, as text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePreview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TablePreview {
    pub fn from_raw(raw: &RawTable, n: usize) -> Self {
        let mut headers = Vec::with_capacity(raw.headers.len() + 1);
        headers.push(String::new());
        headers.extend(raw.headers.iter().cloned());
        let rows = raw
            .rows
            .iter()
            .zip(&raw.index)
            .take(n)
            .map(|(row, label)| {
                let mut out = Vec::with_capacity(row.len() + 1);
                out.push(label.clone());
                out.extend(row.iter().cloned());
                out
            })
            .collect();
        Self { headers, rows }
    }

    pub fn from_sessions(table: &SessionTable, n: usize) -> Result<Self> {
        let raw = table.head(n).to_raw()?;
        Ok(Self::from_raw(&raw, n))
    }
}

/// The checkbox-style extras of the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardOptions {
    pub show_raw: bool,
    pub show_clean: bool,
    pub correlation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub title: String,
    pub intro: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_preview: Option<TablePreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_preview: Option<TablePreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationMatrix>,
    pub panels: Vec<Panel>,
}

const INTRO: &str = "Revenue indicators for the Google Store, from Google Analytics \
session data. A small share of customers produces most of the revenue; \
the panels below break sessions and purchases down by device, date and geography.";

const BROWSER_TEXT: &str = "Nearly all revenue comes from Chrome users, \
and Chrome also dominates the overall customer base. Chrome users are the obvious target.";

const DEVICE_TEXT: &str = "Desktop and laptop visitors are far more likely to buy \
than mobile or tablet visitors. Campaigns should aim at computer users.";

const DATE_TEXT: &str = "Sessions and purchases both follow the holiday season. \
Page views drop between September 2016 and January 2017 while the number of purchases holds steady, \
so holiday ad campaigns reach the paying customers.";

const CONTINENT_TEXT: &str = "At continent level only the Americas generate revenue, \
though a continental view may be too coarse.";

const SUBCONTINENT_TEXT: &str = "Broken down by sub continent, revenue concentrates in \
Northern America and the Caribbean. South America would be wasted ad spend.";

/// Dimension, axis label, the three chart colors and whether labels are rotated.
struct Breakdown {
    dimension: &'static str,
    label: &'static str,
    colors: [&'static str; 3],
    vertical_labels: bool,
}

fn breakdown_charts(
    table: &SessionTable,
    revenue: &str,
    b: &Breakdown,
) -> Result<Vec<PanelItem>> {
    let count = count_by(table, b.dimension, revenue)?.sorted(SortOrder::ValueDesc);
    let buyers = nonzero_count_by(table, b.dimension, revenue)?.sorted(SortOrder::ValueDesc);
    let mean = mean_by(table, b.dimension, revenue)?.sorted(SortOrder::ValueDesc);

    let titles = [
        format!("Count of Customers who Accessed Google Store by {}", b.label),
        format!(
            "Count of Customers who Made a Purchase at Google Store by {}",
            b.label
        ),
        format!("Average Revenue Generated by {}", b.label),
    ];

    Ok([count, buyers, mean]
        .into_iter()
        .zip(titles)
        .zip(b.colors)
        .map(|((data, title), color)| {
            PanelItem::Chart(Chart {
                title,
                kind: ChartKind::Bar,
                color,
                vertical_labels: b.vertical_labels,
                data,
            })
        })
        .collect())
}

fn narrative(text: &str) -> PanelItem {
    PanelItem::Narrative {
        text: text.to_string(),
    }
}

pub fn device_panel(table: &SessionTable, revenue: &str) -> Result<Panel> {
    let mut items = breakdown_charts(
        table,
        revenue,
        &Breakdown {
            dimension: "device.browser",
            label: "Internet Browser",
            colors: [BLUE, RED, YELLOW],
            vertical_labels: true,
        },
    )?;
    items.push(narrative(BROWSER_TEXT));
    items.extend(breakdown_charts(
        table,
        revenue,
        &Breakdown {
            dimension: "device.deviceCategory",
            label: "Device Category",
            colors: [BLUE, GREEN, RED],
            vertical_labels: false,
        },
    )?);
    items.push(narrative(DEVICE_TEXT));

    Ok(Panel {
        title: "Device Plots".into(),
        items,
    })
}

/// Sessions and purchases over time, in date order.
pub fn date_panel(table: &SessionTable, revenue: &str) -> Result<Panel> {
    let count = count_by(table, "date", revenue)?;
    let buyers = nonzero_count_by(table, "date", revenue)?;

    let line = |title: &str, color, data| {
        PanelItem::Chart(Chart {
            title: title.to_string(),
            kind: ChartKind::Line,
            color,
            vertical_labels: false,
            data,
        })
    };

    Ok(Panel {
        title: "Date Plots".into(),
        items: vec![
            line(
                "Count of Customers who Accessed Google Store by Date",
                BLUE,
                count,
            ),
            line(
                "Count of Customers who Made a Purchase at Google Store by Date",
                RED,
                buyers,
            ),
            narrative(DATE_TEXT),
        ],
    })
}

pub fn geography_panel(table: &SessionTable, revenue: &str) -> Result<Panel> {
    let mut items = breakdown_charts(
        table,
        revenue,
        &Breakdown {
            dimension: "geoNetwork.continent",
            label: "Continent",
            colors: [BLUE, RED, YELLOW],
            vertical_labels: false,
        },
    )?;
    items.push(narrative(CONTINENT_TEXT));
    items.extend(breakdown_charts(
        table,
        revenue,
        &Breakdown {
            dimension: "geoNetwork.subContinent",
            label: "Sub Continent",
            colors: [BLUE, GREEN, RED],
            vertical_labels: true,
        },
    )?);
    items.push(narrative(SUBCONTINENT_TEXT));

    Ok(Panel {
        title: "Geographic Plots".into(),
        items,
    })
}

/// Assemble the three tabs plus whichever extras `opts` asks for.
pub fn build_dashboard(
    raw: &RawTable,
    sessions: &SessionTable,
    revenue: &str,
    opts: &DashboardOptions,
) -> Result<Dashboard> {
    let panels = vec![
        device_panel(sessions, revenue)?,
        date_panel(sessions, revenue)?,
        geography_panel(sessions, revenue)?,
    ];
    info!(panels = panels.len(), "built dashboard");

    Ok(Dashboard {
        title: "Google Analytics Dashboard".into(),
        intro: INTRO.into(),
        raw_preview: opts
            .show_raw
            .then(|| TablePreview::from_raw(raw, PREVIEW_ROWS)),
        clean_preview: if opts.show_clean {
            Some(TablePreview::from_sessions(sessions, PREVIEW_ROWS)?)
        } else {
            None
        },
        correlation: opts.correlation.then(|| correlation(sessions)),
        panels,
    })
}
