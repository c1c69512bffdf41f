use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds added on both sides of a window when querying upstream sources.
pub const QUERY_PAD_SECS: i64 = 10;

/// Rendered windows always end on a multiple of this many minutes.
pub const WINDOW_ALIGN_MINUTES: i64 = 10;

/// One three-component sensor package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSpec {
    #[serde(default = "default_network", alias = "NET")]
    pub network: String,
    #[serde(alias = "STA")]
    pub station: String,
    #[serde(default = "default_channel", alias = "CHAN")]
    pub channel: String,
}

fn default_network() -> String {
    "AV".into()
}

fn default_channel() -> String {
    "BHZ".into()
}

impl StationSpec {
    pub fn new(network: &str, station: &str, channel: &str) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            channel: channel.into(),
        }
    }

    /// Channel code with the orientation character replaced by `*`, so one
    /// query returns all three components.
    pub fn channel_wildcard(&self) -> String {
        let mut chars = self.channel.chars();
        chars.next_back();
        format!("{}*", chars.as_str())
    }

    pub fn label(&self) -> String {
        format!("{}.{}", self.station, self.channel)
    }
}

/// Stations rendered together in one figure, top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationGroup {
    pub name: String,
    pub stations: Vec<StationSpec>,
}

impl LocationGroup {
    pub fn new(name: &str, stations: Vec<StationSpec>) -> Self {
        Self {
            name: name.into(),
            stations,
        }
    }
}

/// Absolute `[start, end]` range rendered on the shared time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of `minutes` ending at the last 10-minute boundary at or before `now`.
    pub fn ending_at(now: DateTime<Utc>, minutes: u32) -> Self {
        let end = align_down(now);
        Self {
            start: end - Duration::minutes(i64::from(minutes)),
            end,
        }
    }

    /// Query range for upstream sources; never used for drawing.
    pub fn padded(&self) -> Self {
        let pad = Duration::seconds(QUERY_PAD_SECS);
        Self {
            start: self.start - pad,
            end: self.end + pad,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn start_seconds(&self) -> f64 {
        epoch_seconds(self.start)
    }

    pub fn end_seconds(&self) -> f64 {
        epoch_seconds(self.end)
    }
}

fn align_down(now: DateTime<Utc>) -> DateTime<Utc> {
    let step = WINDOW_ALIGN_MINUTES * 60;
    let excess = now.timestamp().rem_euclid(step);
    now - Duration::seconds(excess) - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
}

pub fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) * 1e-9
}

pub fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Sensor orientation, taken from the last character of the channel code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Vertical,
    North,
    East,
}

impl Component {
    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel.chars().last()? {
            'Z' => Some(Self::Vertical),
            'N' => Some(Self::North),
            'E' => Some(Self::East),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Self::Vertical => 'Z',
            Self::North => 'N',
            Self::East => 'E',
        }
    }
}

/// One continuous sample sequence for a single channel.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformTrace {
    pub channel: String,
    pub samples: Vec<f64>,
    pub sample_rate: f64,
    /// Actual start of the data, which may differ from the requested start.
    pub start: DateTime<Utc>,
}

impl WaveformTrace {
    pub fn new(channel: &str, samples: Vec<f64>, sample_rate: f64, start: DateTime<Utc>) -> Self {
        Self {
            channel: channel.into(),
            samples,
            sample_rate,
            start,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn component(&self) -> Option<Component> {
        Component::from_channel(&self.channel)
    }

    pub fn start_seconds(&self) -> f64 {
        epoch_seconds(self.start)
    }

    /// Absolute time of every sample in epoch seconds.
    pub fn sample_times(&self) -> Vec<f64> {
        let start = self.start_seconds();
        (0..self.samples.len())
            .map(|index| start + index as f64 / self.sample_rate)
            .collect()
    }
}

/// Errors raised by the numeric processing stages.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type StageResult<T> = Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn window_ends_on_ten_minute_boundary() {
        let now = Utc.with_ymd_and_hms(2021, 6, 3, 14, 57, 41).unwrap();
        let window = TimeWindow::ending_at(now, 10);
        assert_eq!(window.end, Utc.with_ymd_and_hms(2021, 6, 3, 14, 50, 0).unwrap());
        assert_eq!(window.start, Utc.with_ymd_and_hms(2021, 6, 3, 14, 40, 0).unwrap());
    }

    #[test]
    fn window_length_matches_configured_minutes() {
        let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        for offset in [0_i64, 59, 601, 3_599, 86_399] {
            for minutes in [10_u32, 20, 60] {
                let now = base + Duration::seconds(offset) + Duration::milliseconds(250);
                let window = TimeWindow::ending_at(now, minutes);
                assert_eq!(window.duration(), Duration::minutes(i64::from(minutes)));
                assert_eq!(window.end.minute() % 10, 0);
                assert_eq!(window.end.second(), 0);
                assert_eq!(window.end.nanosecond(), 0);
                assert!(window.end <= now);
            }
        }
    }

    #[test]
    fn aligned_time_is_kept() {
        let now = Utc.with_ymd_and_hms(2021, 6, 3, 14, 50, 0).unwrap();
        assert_eq!(TimeWindow::ending_at(now, 10).end, now);
    }

    #[test]
    fn padding_is_symmetric() {
        let now = Utc.with_ymd_and_hms(2021, 6, 3, 14, 50, 0).unwrap();
        let window = TimeWindow::ending_at(now, 10);
        let padded = window.padded();
        assert_eq!(window.start - padded.start, Duration::seconds(QUERY_PAD_SECS));
        assert_eq!(padded.end - window.end, Duration::seconds(QUERY_PAD_SECS));
    }

    #[test]
    fn channel_wildcard_replaces_orientation() {
        let spec = StationSpec::new("AV", "SPCP", "BHZ");
        assert_eq!(spec.channel_wildcard(), "BH*");
        assert_eq!(spec.label(), "SPCP.BHZ");
    }

    #[test]
    fn component_follows_last_channel_character() {
        assert_eq!(Component::from_channel("BHZ"), Some(Component::Vertical));
        assert_eq!(Component::from_channel("HHN"), Some(Component::North));
        assert_eq!(Component::from_channel("EHE"), Some(Component::East));
        assert_eq!(Component::from_channel("BH1"), None);
        assert_eq!(Component::from_channel(""), None);
    }

    #[test]
    fn sample_times_start_at_trace_start() {
        let start = Utc.with_ymd_and_hms(2021, 6, 3, 14, 39, 50).unwrap();
        let trace = WaveformTrace::new("BHZ", vec![0.0; 4], 2.0, start);
        let times = trace.sample_times();
        assert_eq!(times.len(), 4);
        assert_eq!(times[0], epoch_seconds(start));
        assert!((times[3] - times[0] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn epoch_seconds_round_trip() {
        let time = Utc.with_ymd_and_hms(2021, 6, 3, 14, 39, 50).unwrap() + Duration::milliseconds(125);
        let back = from_epoch_seconds(epoch_seconds(time)).unwrap();
        assert!((back - time).num_microseconds().unwrap().abs() <= 1);
        assert!(from_epoch_seconds(f64::NAN).is_none());
    }
}
