use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gadash::{
    dashboard::{build_dashboard, DashboardOptions, JsonRenderer, Renderer, TextRenderer},
    load::load_sessions,
    Normalizer, PipelineConfig,
};
use std::{io, path::PathBuf, time::Instant};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Google Analytics session dashboard: flatten, aggregate, render"
)]
struct Args {
    /// Session export (CSV with JSON-encoded columns).
    #[arg(long, default_value = "data.csv")]
    data: PathBuf,
    /// Read at most this many sessions.
    #[arg(long, default_value_t = gadash::config::DEFAULT_MAX_ROWS)]
    max_rows: usize,
    /// The first column is data, not a row index.
    #[arg(long)]
    no_index_col: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Include the first rows of the raw input.
    #[arg(long)]
    show_raw: bool,
    /// Include the first rows of the normalized table.
    #[arg(long)]
    show_clean: bool,
    /// Include the correlation matrix of the numeric columns.
    #[arg(long)]
    correlation: bool,
    /// Also write the normalized table to this parquet file.
    #[arg(long)]
    parquet_out: Option<PathBuf>,
}

fn main() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("run aborted: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let start = Instant::now();
    let mut cfg = PipelineConfig::default();
    cfg.load.max_rows = args.max_rows;
    cfg.load.index_col = !args.no_index_col;

    // ─── 1) load ─────────────────────────────────────────────────────
    let raw = load_sessions(&args.data, &cfg.load)?;

    // ─── 2) normalize ────────────────────────────────────────────────
    let sessions = Normalizer::from_config(&cfg)
        .normalize(&raw)
        .with_context(|| format!("normalizing {}", args.data.display()))?;

    if let Some(path) = &args.parquet_out {
        sessions.write_parquet(path)?;
    }

    // ─── 3) aggregate + assemble ─────────────────────────────────────
    let opts = DashboardOptions {
        show_raw: args.show_raw,
        show_clean: args.show_clean,
        correlation: args.correlation,
    };
    let dashboard = build_dashboard(&raw, &sessions, &cfg.revenue_column, &opts)?;

    // ─── 4) render ───────────────────────────────────────────────────
    let renderer: Box<dyn Renderer> = match args.format {
        OutputFormat::Text => Box::new(TextRenderer::default()),
        OutputFormat::Json => Box::new(JsonRenderer { pretty: true }),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    renderer.render(&dashboard, &mut out)?;

    info!(
        rows = sessions.num_rows(),
        elapsed = ?start.elapsed(),
        "all done"
    );
    Ok(())
}
