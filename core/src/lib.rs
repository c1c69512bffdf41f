//! Core of the seismic spectrogram renderer.
//!
//! Waveforms and calibration come in through [`sources`], are cleaned up and
//! transformed by [`processing`], and are drawn by [`figure`]. [`pipeline`]
//! strings these together for one location group and one time window.

pub mod config;
pub mod figure;
pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod sources;
pub mod telemetry;

pub use config::PipelineConfig;
pub use pipeline::{LocationPipeline, LocationReport, PipelineError};
pub use prelude::{LocationGroup, StationSpec, TimeWindow, WaveformTrace};
