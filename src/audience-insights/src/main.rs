//! Audience Insights: customer segmentation and target promotion suggestions.
//!
//! Reads a JSON array of customer/transaction records, runs the requested
//! segment groups, and prints the enriched table, per-rule outcomes,
//! data-quality warnings and promotion suggestions as JSON on stdout.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use audience_core::{AppConfig, Recommendation, RecordTable, SegmentGroup};
use audience_promotions::RecommendationEngine;
use audience_segmentation::{RuleReport, SegmentationEngine};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "audience-insights")]
#[command(about = "Customer segmentation and target promotion suggestions")]
#[command(version)]
struct Cli {
    /// JSON file with an array of records ("-" reads stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Optional TOML config file
    #[arg(short, long, env = "AUDIENCE_INSIGHTS_CONFIG")]
    config: Option<PathBuf>,

    /// Segment groups to run (overrides config)
    #[arg(short, long, value_delimiter = ',')]
    groups: Vec<SegmentGroup>,

    /// Churn window in days (overrides config)
    #[arg(long)]
    churn_window_days: Option<i64>,

    /// Skip promotion suggestions
    #[arg(long, default_value_t = false)]
    no_recommendations: bool,

    /// Include the first N enriched rows as a preview instead of the full table
    #[arg(long)]
    preview: Option<usize>,

    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Serialize)]
struct Output {
    run_id: String,
    generated_at: String,
    rows: usize,
    applied: Vec<String>,
    outcomes: Vec<RuleReport>,
    warnings: Vec<audience_core::DataQualityWarning>,
    recommendations: Vec<Recommendation>,
    table: Vec<serde_json::Map<String, serde_json::Value>>,
}

fn read_input(path: &PathBuf) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading records from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "audience_insights=info,audience_segmentation=info,audience_promotions=info"
                    .into()
            }),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if !cli.groups.is_empty() {
        config.segmentation.groups = cli.groups.clone();
    }
    if let Some(days) = cli.churn_window_days {
        config.segmentation.churn_window_days = days;
    }
    if cli.no_recommendations {
        config.recommendations.enabled = false;
    }
    config
        .segmentation
        .validate()
        .context("invalid segmentation settings")?;

    info!(
        groups = ?config.segmentation.groups,
        churn_window_days = config.segmentation.churn_window_days,
        recommendations = config.recommendations.enabled,
        "Configuration loaded"
    );

    let raw = read_input(&cli.input)?;
    let table = RecordTable::from_json_str(&raw).context("parsing input records")?;
    info!(rows = table.len(), columns = table.columns().len(), "Dataset loaded");

    let groups = config.segmentation.groups.clone();
    let engine = SegmentationEngine::new(config.segmentation);
    let report = engine.run(&table, &groups);

    let recommendations = if config.recommendations.enabled {
        RecommendationEngine::new().recommend(&report.table, &groups)
    } else {
        Vec::new()
    };

    let shown = match cli.preview {
        Some(n) => report.table.head(n),
        None => report.table.clone(),
    };

    let output = Output {
        run_id: report.run_id.to_string(),
        generated_at: report.generated_at.to_rfc3339(),
        rows: report.table.len(),
        applied: report.applied,
        outcomes: report.outcomes,
        warnings: report.warnings,
        recommendations,
        table: shown.to_records()?,
    };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{json}");

    Ok(())
}
