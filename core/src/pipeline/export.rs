use super::PipelineError;
use crate::prelude::WaveformTrace;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

const FILE_TIME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";
const ROW_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// `<dir>/<station>_<time of last Z sample>.csv`
pub fn csv_path(dir: &Path, station: &str, z: &WaveformTrace) -> Option<PathBuf> {
    let last = z.len().checked_sub(1)?;
    let stamp = sample_time(z, last).format(FILE_TIME_FORMAT);
    Some(dir.join(format!("{station}_{stamp}.csv")))
}

/// Writes one `timestamp, Z, N, E` row per vertical sample, without a header.
/// Horizontal values past the end of a shorter N or E trace are left empty.
pub fn write_station_csv(
    dir: &Path,
    station: &str,
    z: &WaveformTrace,
    n: &WaveformTrace,
    e: &WaveformTrace,
) -> Result<PathBuf, PipelineError> {
    let path = csv_path(dir, station, z).ok_or_else(|| PipelineError::Export {
        path: dir.to_path_buf(),
        message: format!("{station}: vertical trace has no usable timestamps"),
    })?;
    std::fs::create_dir_all(dir)?;

    let export_error = |err: csv::Error| PipelineError::Export {
        path: path.clone(),
        message: err.to_string(),
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .map_err(export_error)?;
    let cell = |trace: &WaveformTrace, index: usize| {
        trace
            .samples
            .get(index)
            .map(|value| value.to_string())
            .unwrap_or_default()
    };
    for index in 0..z.len() {
        let stamp = sample_time(z, index).format(ROW_TIME_FORMAT).to_string();
        writer
            .write_record([stamp, cell(z, index), cell(n, index), cell(e, index)])
            .map_err(export_error)?;
    }
    writer.flush()?;
    Ok(path)
}

/// Offset from the trace start rounded to whole nanoseconds.
fn sample_time(trace: &WaveformTrace, index: usize) -> DateTime<Utc> {
    let offset = (index as f64 * 1e9 / trace.sample_rate).round() as i64;
    trace.start + Duration::nanoseconds(offset)
}
