use super::ui;
use crate::core::collect::collect;
use crate::core::config::AppConfig;
use crate::core::metrics::{IntoMetrics, Metric};
use crate::providers::{RakutenClient, SbiClient};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::fmt;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Source {
    Rakuten,
    Sbi,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Rakuten => write!(f, "rakuten"),
            Source::Sbi => write!(f, "sbi"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    /// InfluxDB line protocol
    Line,
}

/// Sources with a config section, optionally narrowed to one.
pub fn enabled_sources(config: &AppConfig, only: Option<Source>) -> Result<Vec<Source>> {
    let configured: Vec<Source> = [
        config.rakuten.as_ref().map(|_| Source::Rakuten),
        config.sbi.as_ref().map(|_| Source::Sbi),
    ]
    .into_iter()
    .flatten()
    .collect();

    match only {
        Some(source) if !configured.contains(&source) => {
            bail!("Source {source} is not configured")
        }
        Some(source) => Ok(vec![source]),
        None => Ok(configured),
    }
}

/// Logs in if needed, fetches the export and flattens it into metrics. Each
/// call builds its own client, so sources never share cookies.
pub async fn collect_source(
    source: Source,
    config: &AppConfig,
    timestamp: DateTime<Utc>,
) -> Result<Vec<Metric>> {
    let deadline = config.collection_deadline();
    let metrics = match source {
        Source::Rakuten => {
            let rakuten = config.rakuten.as_ref().context("rakuten is not configured")?;
            let mut client = RakutenClient::new(rakuten, config.timeout())?;
            let snapshot = tokio::time::timeout(
                deadline,
                collect(&mut client, &rakuten.credentials, config.max_reauth),
            )
            .await
            .with_context(|| format!("rakuten: collection timed out after {deadline:?}"))??;
            snapshot.to_metrics(timestamp)
        }
        Source::Sbi => {
            let sbi = config.sbi.as_ref().context("sbi is not configured")?;
            let mut client = SbiClient::new(sbi, config.timeout())?;
            let assets = tokio::time::timeout(
                deadline,
                collect(&mut client, &sbi.credentials, config.max_reauth),
            )
            .await
            .with_context(|| format!("sbi: collection timed out after {deadline:?}"))??;
            assets.to_metrics(timestamp)
        }
    };
    info!(%source, count = metrics.len(), "Collected metrics");
    Ok(metrics)
}

pub fn render_table(metrics: &[Metric]) -> String {
    let mut measurements: Vec<&str> = Vec::new();
    for metric in metrics {
        if !measurements.contains(&metric.measurement) {
            measurements.push(metric.measurement);
        }
    }

    let mut sections = Vec::with_capacity(measurements.len());
    for measurement in measurements {
        let group: Vec<&Metric> = metrics
            .iter()
            .filter(|m| m.measurement == measurement)
            .collect();
        sections.push(format!(
            "{}\n\n{}",
            ui::style_text(measurement, ui::StyleType::Title),
            ui::metrics_table(&group)
        ));
    }
    sections.join("\n\n")
}

pub fn render_lines(metrics: &[Metric]) -> String {
    metrics
        .iter()
        .map(Metric::to_line_protocol)
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn run(config: &AppConfig, only: Option<Source>, format: OutputFormat) -> Result<()> {
    let sources = enabled_sources(config, only)?;
    let timestamp = Utc::now();

    let pb = ui::new_spinner(&format!("Collecting from {} source(s)...", sources.len()));
    let futures = sources.iter().map(|source| async move {
        (*source, collect_source(*source, config, timestamp).await)
    });
    let results = join_all(futures).await;
    pb.finish_and_clear();

    let mut failures = 0;
    let mut outputs = Vec::new();
    for (source, result) in results {
        match result {
            Ok(metrics) => outputs.push((source, metrics)),
            Err(e) => {
                failures += 1;
                let message = format!("{e:#}");
                error!(%source, error = %message, "Collection failed");
                eprintln!(
                    "{}",
                    ui::style_text(&format!("{source}: {message}"), ui::StyleType::Error)
                );
            }
        }
    }

    let num_outputs = outputs.len();
    for (i, (source, metrics)) in outputs.into_iter().enumerate() {
        match format {
            OutputFormat::Line => println!("{}", render_lines(&metrics)),
            OutputFormat::Table => {
                println!(
                    "Source: {}\n\n{}",
                    ui::style_text(&source.to_string(), ui::StyleType::Title),
                    render_table(&metrics)
                );
                if metrics.is_empty() {
                    println!("{}", ui::style_text("No records", ui::StyleType::Subtle));
                }
                if i + 1 < num_outputs {
                    ui::print_separator();
                }
            }
        }
    }

    if failures > 0 && failures == sources.len() {
        bail!("All {failures} source(s) failed");
    }
    Ok(())
}
