use super::PipelineError;
use crate::prelude::{Component, StationSpec, TimeWindow, WaveformTrace};
use crate::processing::Preprocessor;
use crate::sources::{ChannelMetadata, MetadataSource, WaveformSource};
use crate::telemetry::LogManager;

/// Why a station contributes an empty panel pair.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AbsentReason {
    #[error("no data returned")]
    NoData,
    #[error("no vertical component")]
    NoVertical,
    #[error("{samples} samples, spectrogram needs {required}")]
    TooShort { samples: usize, required: usize },
    #[error("vertical channel not calibrated: {0}")]
    Uncalibrated(String),
}

/// Preprocessed traces of one station for one window.
#[derive(Debug, Clone)]
pub enum StationData {
    Complete {
        z: WaveformTrace,
        n: WaveformTrace,
        e: WaveformTrace,
    },
    VerticalOnly {
        z: WaveformTrace,
    },
    Absent {
        reason: AbsentReason,
    },
}

impl StationData {
    pub fn vertical(&self) -> Option<&WaveformTrace> {
        match self {
            Self::Complete { z, .. } | Self::VerticalOnly { z } => Some(z),
            Self::Absent { .. } => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent { .. })
    }
}

/// Station data together with the calibration it was scaled by.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub data: StationData,
    pub metadata: Option<ChannelMetadata>,
}

impl Acquisition {
    fn absent(reason: AbsentReason) -> Self {
        Self {
            data: StationData::Absent { reason },
            metadata: None,
        }
    }

    /// Rate for the spectrogram: the calibrated rate of the vertical channel
    /// when the metadata has one, the trace header's rate otherwise.
    pub fn spectral_rate(&self) -> Option<f64> {
        let z = self.data.vertical()?;
        let calibrated = self
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.sample_rate(&z.channel).ok());
        Some(calibrated.unwrap_or(z.sample_rate))
    }
}

/// Fetches, classifies and preprocesses one station at a time.
pub struct StationAcquirer<'a> {
    waveforms: &'a dyn WaveformSource,
    metadata: &'a dyn MetadataSource,
    preprocessor: Preprocessor,
    required_samples: usize,
    log: &'a LogManager,
}

impl<'a> StationAcquirer<'a> {
    pub fn new(
        waveforms: &'a dyn WaveformSource,
        metadata: &'a dyn MetadataSource,
        preprocessor: Preprocessor,
        required_samples: usize,
        log: &'a LogManager,
    ) -> Self {
        Self {
            waveforms,
            metadata,
            preprocessor,
            required_samples,
            log,
        }
    }

    /// A station without usable vertical data comes back `Absent`; only
    /// source failures and DSP parameter errors are returned as errors.
    pub fn acquire(&self, station: &StationSpec, window: &TimeWindow) -> Result<Acquisition, PipelineError> {
        let query = window.padded();
        let wildcard = station.channel_wildcard();
        let source_error = |source| PipelineError::Source {
            station: station.label(),
            source,
        };

        let mut traces = self
            .waveforms
            .fetch(station, &wildcard, &query)
            .map_err(source_error)?;
        if traces.is_empty() {
            return Ok(Acquisition::absent(AbsentReason::NoData));
        }
        self.log.detail(&format!(
            "{}: {} traces, {} vertical samples",
            station.label(),
            traces.len(),
            traces
                .iter()
                .find(|trace| trace.component() == Some(Component::Vertical))
                .map_or(0, WaveformTrace::len)
        ));

        let Some(mut z) = take_component(&mut traces, Component::Vertical) else {
            return Ok(Acquisition::absent(AbsentReason::NoVertical));
        };
        if z.len() < self.required_samples {
            return Ok(Acquisition::absent(AbsentReason::TooShort {
                samples: z.len(),
                required: self.required_samples,
            }));
        }

        let metadata = self
            .metadata
            .fetch(station, &wildcard, &query)
            .map_err(source_error)?;
        let scale = match metadata.scale(&z.channel) {
            Ok(scale) => scale,
            Err(err) => return Ok(Acquisition::absent(AbsentReason::Uncalibrated(err.to_string()))),
        };
        self.preprocessor.apply(&mut z, scale)?;

        let n = self.horizontal(&mut traces, Component::North, &metadata);
        let e = self.horizontal(&mut traces, Component::East, &metadata);
        let data = match (n, e) {
            (Some(n), Some(e)) => StationData::Complete { z, n, e },
            _ => StationData::VerticalOnly { z },
        };
        Ok(Acquisition {
            data,
            metadata: Some(metadata),
        })
    }

    fn horizontal(
        &self,
        traces: &mut Vec<WaveformTrace>,
        component: Component,
        metadata: &ChannelMetadata,
    ) -> Option<WaveformTrace> {
        let mut trace = take_component(traces, component)?;
        let processed = metadata
            .scale(&trace.channel)
            .map_err(|err| err.to_string())
            .and_then(|scale| {
                self.preprocessor
                    .apply(&mut trace, scale)
                    .map_err(|err| err.to_string())
            });
        match processed {
            Ok(()) => Some(trace),
            Err(reason) => {
                self.log.warn(&format!("dropping {}: {}", trace.channel, reason));
                None
            }
        }
    }
}

fn take_component(traces: &mut Vec<WaveformTrace>, component: Component) -> Option<WaveformTrace> {
    let index = traces
        .iter()
        .position(|trace| trace.component() == Some(component))?;
    Some(traces.remove(index))
}
