use crate::generator::{GeneratorConfig, SyntheticSource};
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use log::{error, info};
use seiscore::config::PipelineConfig;
use seiscore::pipeline::{LocationPipeline, LocationReport};
use seiscore::prelude::{LocationGroup, TimeWindow};
use seiscore::sources::{FdsnMetadataClient, MetadataSource, WaveformSource, WinstonClient};
use seiscore::telemetry::{MetricsRecorder, MetricsSnapshot};
use serde::Serialize;
use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;

/// Upstream services shared by every worker.
#[derive(Clone)]
pub struct Sources {
    pub waveforms: Arc<dyn WaveformSource>,
    pub metadata: Arc<dyn MetadataSource>,
}

impl Sources {
    pub fn remote(config: &WorkflowConfig) -> anyhow::Result<Self> {
        let metadata = FdsnMetadataClient::new(&config.metadata_url).context("building metadata client")?;
        let waveforms = WinstonClient::new(&config.winston.host, config.winston.port);
        Ok(Self {
            waveforms: Arc::new(waveforms),
            metadata: Arc::new(metadata),
        })
    }

    pub fn synthetic(config: GeneratorConfig) -> Self {
        let source = Arc::new(SyntheticSource::new(config));
        Self {
            waveforms: source.clone(),
            metadata: source,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationOutcome {
    pub location: String,
    pub report: Option<LocationReport>,
    pub error: Option<String>,
}

impl LocationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub window: TimeWindow,
    pub locations: Vec<LocationOutcome>,
    pub metrics: MetricsSnapshot,
}

/// `<root>/<location>/<year>/<month>/<day>/<end as YYYYmmddTHHMMSS>.png`
pub fn image_path(root: &Path, location: &str, window: &TimeWindow) -> PathBuf {
    let end = window.end;
    root.join(location)
        .join(end.format("%Y").to_string())
        .join(end.format("%-m").to_string())
        .join(end.format("%-d").to_string())
        .join(format!("{}.png", end.format("%Y%m%dT%H%M%S")))
}

/// Fans location groups out over a bounded pool of blocking workers.
#[derive(Clone)]
pub struct Runner {
    config: Arc<PipelineConfig>,
    sources: Sources,
    plot_root: PathBuf,
    workers: usize,
    metrics: Arc<MetricsRecorder>,
}

impl Runner {
    pub fn new(config: PipelineConfig, sources: Sources, plot_root: PathBuf, workers: usize) -> Self {
        Self {
            config: Arc::new(config),
            sources,
            plot_root,
            workers: workers.max(1),
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    /// Runs every group to completion. A failing or panicking group is
    /// recorded in the summary and never stops its siblings.
    pub fn execute(&self, groups: Vec<LocationGroup>, window: TimeWindow) -> anyhow::Result<RunSummary> {
        let runtime = TokioBuilder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(self.workers)
            .build()
            .context("creating worker runtime")?;

        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| {
                let location = group.name.clone();
                let job = self.clone();
                let handle = runtime.spawn_blocking(move || job.run_location(&group, &window));
                (location, handle)
            })
            .collect();

        let mut locations = Vec::with_capacity(handles.len());
        for (location, handle) in handles {
            let result = match runtime.block_on(handle) {
                Ok(result) => result.map_err(|err| format!("{err:#}")),
                Err(join) if join.is_panic() => Err(format!("worker panicked: {}", panic_message(join.into_panic()))),
                Err(join) => Err(format!("worker cancelled: {join}")),
            };
            let outcome = match result {
                Ok(report) => {
                    self.metrics
                        .record_location(report.rendered(), report.skipped(), report.csv_files().len());
                    info!("{}: {}", location, report.image.display());
                    LocationOutcome {
                        location,
                        report: Some(report),
                        error: None,
                    }
                }
                Err(message) => {
                    self.metrics.record_failure();
                    error!("{}: {}", location, message);
                    LocationOutcome {
                        location,
                        report: None,
                        error: Some(message),
                    }
                }
            };
            locations.push(outcome);
        }

        Ok(RunSummary {
            window,
            locations,
            metrics: self.metrics.snapshot(),
        })
    }

    fn run_location(&self, group: &LocationGroup, window: &TimeWindow) -> anyhow::Result<LocationReport> {
        let path = image_path(&self.plot_root, &group.name, window);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let pipeline = LocationPipeline::new(
            &self.config,
            self.sources.waveforms.as_ref(),
            self.sources.metadata.as_ref(),
        );
        pipeline
            .run(group, window, &path)
            .with_context(|| format!("rendering {}", group.name))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".into()
    }
}
