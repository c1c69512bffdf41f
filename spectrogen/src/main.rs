use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use log::{info, warn};
use seiscore::figure::register_label_font;
use seiscore::prelude::TimeWindow;
use std::fs;
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::{Runner, Sources};

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Renders waveform and spectrogram figures for every station group")]
struct Args {
    /// Load the workflow config from YAML
    #[arg(long, default_value = "spectrogen.yaml")]
    config: PathBuf,
    /// Force the window end (RFC 3339); aligned down to a 10 minute mark
    #[arg(long, value_parser = parse_end)]
    end: Option<DateTime<Utc>>,
    /// Use the synthetic generator instead of the wave server and metadata service
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Write a JSON run summary to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_end(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| format!("{text:?} is not an RFC 3339 time: {err}"))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = WorkflowConfig::load(&args.config)?;
    if let Some(font) = &workflow_config.output.font {
        register_label_font(font).with_context(|| format!("loading label font {}", font.display()))?;
    }
    let pipeline_config = workflow_config.to_pipeline_config()?;

    let window = TimeWindow::ending_at(args.end.unwrap_or_else(Utc::now), workflow_config.window_minutes);
    let groups = workflow_config.location_groups();
    if groups.is_empty() {
        warn!("no locations configured in {}", args.config.display());
    }
    info!(
        "rendering {} locations for {} .. {}",
        groups.len(),
        window.start.format("%Y-%m-%dT%H:%M:%SZ"),
        window.end.format("%Y-%m-%dT%H:%M:%SZ")
    );

    let sources = if args.offline {
        Sources::synthetic(workflow_config.synthetic.clone())
    } else {
        Sources::remote(&workflow_config)?
    };
    let runner = Runner::new(
        pipeline_config,
        sources,
        workflow_config.output.plot_root.clone(),
        workflow_config.worker_count(),
    );
    let summary = runner.execute(groups, window)?;

    let metrics = &summary.metrics;
    info!(
        "locations ok {} failed {}, stations rendered {} skipped {}, csv files {}",
        metrics.locations_succeeded,
        metrics.locations_failed,
        metrics.stations_rendered,
        metrics.stations_skipped,
        metrics.csv_written
    );

    if let Some(path) = args.report {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&summary).context("serializing run summary")?;
        fs::write(&path, json).with_context(|| format!("writing report {}", path.display()))?;
    }

    Ok(())
}
