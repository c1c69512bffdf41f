//! One location, one window: fetch every station, preprocess, export the
//! three-component CSVs and render the figure with its thumbnail.

pub mod export;
pub mod station;

pub use station::{AbsentReason, Acquisition, StationAcquirer, StationData};

use crate::config::PipelineConfig;
use crate::figure::{FigureComposer, FigureError, PlotContent, StationPlot};
use crate::prelude::{LocationGroup, StageError, TimeWindow};
use crate::processing::{Preprocessor, SpectrogramEngine};
use crate::sources::{MetadataSource, SourceError, WaveformSource};
use crate::telemetry::LogManager;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("location {0} has no stations")]
    EmptyGroup(String),
    #[error("station {station}: {source}")]
    Source {
        station: String,
        #[source]
        source: SourceError,
    },
    #[error("processing failed: {0}")]
    Stage(#[from] StageError),
    #[error("figure failed: {0}")]
    Figure(#[from] FigureError),
    #[error("writing {path:?} failed: {message}")]
    Export { path: PathBuf, message: String },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StationOutcome {
    Complete,
    VerticalOnly,
    Absent { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationStatus {
    pub station: String,
    #[serde(flatten)]
    pub outcome: StationOutcome,
    /// Waveform and spectrogram were drawn for this station.
    pub plotted: bool,
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationReport {
    pub location: String,
    pub image: PathBuf,
    pub thumbnail: PathBuf,
    pub panel_rows: usize,
    pub stations: Vec<StationStatus>,
}

impl LocationReport {
    pub fn rendered(&self) -> usize {
        self.stations
            .iter()
            .filter(|status| !matches!(status.outcome, StationOutcome::Absent { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.stations.len() - self.rendered()
    }

    pub fn csv_files(&self) -> Vec<&Path> {
        self.stations
            .iter()
            .filter_map(|status| status.csv.as_deref())
            .collect()
    }
}

/// `small_<name>` next to the full-size image.
pub fn thumbnail_path(image: &Path) -> PathBuf {
    let name = image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    image.with_file_name(format!("small_{name}"))
}

pub struct LocationPipeline<'a> {
    config: &'a PipelineConfig,
    waveforms: &'a dyn WaveformSource,
    metadata: &'a dyn MetadataSource,
}

impl<'a> LocationPipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        waveforms: &'a dyn WaveformSource,
        metadata: &'a dyn MetadataSource,
    ) -> Self {
        Self {
            config,
            waveforms,
            metadata,
        }
    }

    /// Processes the group's stations in order and always writes the figure,
    /// even when every station came back empty.
    pub fn run(
        &self,
        group: &LocationGroup,
        window: &TimeWindow,
        image_path: &Path,
    ) -> Result<LocationReport, PipelineError> {
        if group.stations.is_empty() {
            return Err(PipelineError::EmptyGroup(group.name.clone()));
        }
        self.config.validate()?;
        let log = LogManager::new(&group.name);
        let mut engine = SpectrogramEngine::new(&self.config.spectrogram)?;
        let acquirer = StationAcquirer::new(
            self.waveforms,
            self.metadata,
            Preprocessor::new(self.config.filter.clone()),
            engine.window_size(),
            &log,
        );

        let mut plots = Vec::with_capacity(group.stations.len());
        let mut statuses = Vec::with_capacity(group.stations.len());
        for station in &group.stations {
            let label = station.label();
            let acquisition = acquirer.acquire(station, window)?;
            let spectral_rate = acquisition.spectral_rate();

            let csv = match &acquisition.data {
                StationData::Complete { z, n, e } => Some(export::write_station_csv(
                    &self.config.csv_dir,
                    &station.station,
                    z,
                    n,
                    e,
                )?),
                _ => None,
            };

            let outcome = match &acquisition.data {
                StationData::Complete { .. } => StationOutcome::Complete,
                StationData::VerticalOnly { .. } => {
                    log.warn(&format!("{label}: horizontal components missing, no CSV"));
                    StationOutcome::VerticalOnly
                }
                StationData::Absent { reason } => {
                    log.warn(&format!("{label}: skipped, {reason}"));
                    StationOutcome::Absent {
                        reason: reason.to_string(),
                    }
                }
            };

            let plot = match (acquisition.data.vertical(), spectral_rate) {
                (Some(z), Some(rate)) => {
                    let spectrogram = engine.compute(z, rate)?;
                    StationPlot::with_content(
                        &label,
                        PlotContent {
                            times: z.sample_times(),
                            amplitudes: z.samples.clone(),
                            spectrogram,
                        },
                    )
                }
                _ => StationPlot::empty(&label),
            };
            statuses.push(StationStatus {
                station: label,
                outcome,
                plotted: plot.content.is_some(),
                csv,
            });
            plots.push(plot);
        }

        let composer = FigureComposer::new(*window, &self.config.display, &self.config.colors);
        let figure = composer.compose(&plots)?;
        figure.save(image_path)?;
        let thumbnail = thumbnail_path(image_path);
        composer
            .thumbnail(&plots)?
            .save(&thumbnail)
            .map_err(FigureError::from)?;

        let report = LocationReport {
            location: group.name.clone(),
            image: image_path.to_path_buf(),
            thumbnail,
            panel_rows: figure.panels.len(),
            stations: statuses,
        };
        log.record(&format!(
            "{} written, {} of {} stations with data, {} CSV files",
            image_path.display(),
            report.rendered(),
            report.stations.len(),
            report.csv_files().len()
        ));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::{StationSpec, WaveformTrace};
    use crate::sources::{ChannelMetadata, SourceResult};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::f64::consts::PI;

    const RATE: f64 = 50.0;

    /// Serves three components for the listed stations and nothing for others.
    struct FakeWaveforms {
        stations: HashMap<String, usize>,
    }

    impl WaveformSource for FakeWaveforms {
        fn fetch(
            &self,
            station: &StationSpec,
            channel: &str,
            window: &TimeWindow,
        ) -> SourceResult<Vec<WaveformTrace>> {
            assert_eq!(channel, "BH*");
            let Some(&len) = self.stations.get(&station.station) else {
                return Ok(Vec::new());
            };
            Ok(["BHZ", "BHN", "BHE"]
                .iter()
                .enumerate()
                .map(|(offset, code)| {
                    let samples = (0..len)
                        .map(|i| {
                            let t = i as f64 / RATE;
                            4000.0 * (2.0 * PI * (1.0 + offset as f64) * t).sin() + 100.0
                        })
                        .collect();
                    WaveformTrace::new(code, samples, RATE, window.start)
                })
                .collect())
        }
    }

    struct FakeMetadata;

    impl MetadataSource for FakeMetadata {
        fn fetch(&self, station: &StationSpec, _: &str, _: &TimeWindow) -> SourceResult<ChannelMetadata> {
            let rows: String = ["BHZ", "BHN", "BHE"]
                .iter()
                .map(|code| format!("AV|{}||{}|400000000|50\n", station.station, code))
                .collect();
            ChannelMetadata::parse(&format!("#Network|Station|Location|Channel|Scale|SampleRate\n{rows}"))
        }
    }

    /// Full calibration except `BHE` for the listed stations.
    struct NoEastMetadata {
        stations: Vec<&'static str>,
    }

    impl MetadataSource for NoEastMetadata {
        fn fetch(&self, station: &StationSpec, channel: &str, window: &TimeWindow) -> SourceResult<ChannelMetadata> {
            let full = FakeMetadata.fetch(station, channel, window)?;
            if !self.stations.contains(&station.station.as_str()) {
                return Ok(full);
            }
            let rows: String = ["BHZ", "BHN"]
                .iter()
                .map(|code| format!("AV|{}||{}|400000000|50\n", station.station, code))
                .collect();
            ChannelMetadata::parse(&format!("#Network|Station|Location|Channel|Scale|SampleRate\n{rows}"))
        }
    }

    struct BrokenMetadata;

    impl MetadataSource for BrokenMetadata {
        fn fetch(&self, _: &StationSpec, _: &str, _: &TimeWindow) -> SourceResult<ChannelMetadata> {
            Err(SourceError::Protocol("service unavailable".into()))
        }
    }

    fn window() -> TimeWindow {
        let end = Utc.with_ymd_and_hms(2021, 6, 3, 14, 50, 0).unwrap();
        TimeWindow::ending_at(end, 10)
    }

    fn group() -> LocationGroup {
        LocationGroup::new(
            "Spurr",
            vec![StationSpec::new("AV", "SPCP", "BHZ"), StationSpec::new("AV", "SPBG", "BHZ")],
        )
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            csv_dir: dir.join("CSVFiles"),
            ..PipelineConfig::default()
        }
    }

    fn full_length() -> usize {
        620 * RATE as usize
    }

    #[test]
    fn complete_station_and_empty_station() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let waveforms = FakeWaveforms {
            stations: HashMap::from([("SPCP".to_string(), full_length())]),
        };
        let pipeline = LocationPipeline::new(&config, &waveforms, &FakeMetadata);
        let image = dir.path().join("Spurr/2021/6/3/20210603T145000.png");

        let report = pipeline.run(&group(), &window(), &image).unwrap();

        assert_eq!(report.panel_rows, 4);
        assert_eq!(report.stations[0].outcome, StationOutcome::Complete);
        assert_eq!(
            report.stations[1].outcome,
            StationOutcome::Absent {
                reason: AbsentReason::NoData.to_string()
            }
        );
        assert_eq!(report.rendered(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(report.stations[0].plotted);
        assert!(!report.stations[1].plotted);

        let csv_files: Vec<_> = std::fs::read_dir(dir.path().join("CSVFiles")).unwrap().collect();
        assert_eq!(csv_files.len(), 1);
        let csv = report.csv_files()[0].to_path_buf();
        assert!(csv.file_name().unwrap().to_string_lossy().starts_with("SPCP_"));
        let rows = std::fs::read_to_string(&csv).unwrap().lines().count();
        assert_eq!(rows, full_length());

        let full = image::open(&image).unwrap();
        assert_eq!((full.width(), full.height()), (576, 304));
        assert_eq!(report.thumbnail, dir.path().join("Spurr/2021/6/3/small_20210603T145000.png"));
        let thumb = image::open(&report.thumbnail).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (150, 79));
    }

    #[test]
    fn too_short_station_is_skipped_and_figure_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let waveforms = FakeWaveforms {
            stations: HashMap::from([("SPCP".to_string(), 100), ("SPBG".to_string(), full_length())]),
        };
        let pipeline = LocationPipeline::new(&config, &waveforms, &FakeMetadata);
        let image = dir.path().join("out.png");

        let report = pipeline.run(&group(), &window(), &image).unwrap();

        assert!(matches!(report.stations[0].outcome, StationOutcome::Absent { .. }));
        assert!(report.stations[0].csv.is_none());
        assert_eq!(report.stations[1].outcome, StationOutcome::Complete);
        assert!(image.exists());
    }

    #[test]
    fn uncalibrated_east_channel_plots_without_csv() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let waveforms = FakeWaveforms {
            stations: HashMap::from([
                ("SPCP".to_string(), full_length()),
                ("SPBG".to_string(), full_length()),
            ]),
        };
        let metadata = NoEastMetadata { stations: vec!["SPCP"] };
        let pipeline = LocationPipeline::new(&config, &waveforms, &metadata);
        let image = dir.path().join("out.png");

        let report = pipeline.run(&group(), &window(), &image).unwrap();

        let spcp = &report.stations[0];
        assert_eq!(spcp.outcome, StationOutcome::VerticalOnly);
        assert!(spcp.plotted);
        assert!(spcp.csv.is_none());
        assert_eq!(report.rendered(), 2);

        let csv_names: Vec<String> = std::fs::read_dir(dir.path().join("CSVFiles"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(csv_names.len(), 1);
        assert!(csv_names[0].starts_with("SPBG_"));
        assert!(!csv_names.iter().any(|name| name.starts_with("SPCP_")));
        assert!(image.exists());
    }

    #[test]
    fn metadata_failure_fails_the_location() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let waveforms = FakeWaveforms {
            stations: HashMap::from([("SPCP".to_string(), full_length())]),
        };
        let pipeline = LocationPipeline::new(&config, &waveforms, &BrokenMetadata);
        let result = pipeline.run(&group(), &window(), &dir.path().join("out.png"));
        assert!(matches!(result, Err(PipelineError::Source { ref station, .. }) if station == "SPCP.BHZ"));
    }

    #[test]
    fn empty_group_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let waveforms = FakeWaveforms {
            stations: HashMap::new(),
        };
        let pipeline = LocationPipeline::new(&config, &waveforms, &FakeMetadata);
        let result = pipeline.run(&LocationGroup::new("Empty", Vec::new()), &window(), &dir.path().join("x.png"));
        assert!(matches!(result, Err(PipelineError::EmptyGroup(_))));
    }

    #[test]
    fn thumbnail_sits_next_to_image() {
        assert_eq!(
            thumbnail_path(Path::new("plots/Spurr/2021/6/3/20210603T145000.png")),
            Path::new("plots/Spurr/2021/6/3/small_20210603T145000.png")
        );
    }
}
