use rand::{rngs::StdRng, Rng, SeedableRng};
use seiscore::prelude::{Component, StationSpec, TimeWindow, WaveformTrace};
use seiscore::sources::{ChannelMetadata, ChannelRecord, MetadataSource, SourceResult, WaveformSource};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Configuration for the offline three-component signal generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub sample_rate: f64,
    /// Counts per m/s reported as the channel `Scale`.
    pub scale: f64,
    /// Dominant tremor frequency in Hz.
    pub tremor_hz: f64,
    /// Peak ground velocity of the tremor burst in m/s.
    pub amplitude: f64,
    /// Background noise level in m/s.
    pub noise: f64,
    pub seed: u64,
    /// Stations that return no data.
    pub silent: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 50.0,
            scale: 4.0e8,
            tremor_hz: 2.5,
            amplitude: 2.0e-5,
            noise: 1.5e-6,
            seed: 0,
            silent: Vec::new(),
        }
    }
}

/// Deterministic stand-in for the wave server and the metadata service.
pub struct SyntheticSource {
    config: GeneratorConfig,
}

impl SyntheticSource {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    fn station_seed(&self, station: &StationSpec) -> u64 {
        station
            .station
            .bytes()
            .fold(self.config.seed, |acc, byte| acc.wrapping_mul(31).wrapping_add(u64::from(byte)))
    }

    fn channel_codes(&self, pattern: &str) -> Vec<String> {
        let prefix = pattern.trim_end_matches(&['*', '?'][..]);
        if prefix.len() == pattern.len() {
            return vec![pattern.to_string()];
        }
        [Component::Vertical, Component::North, Component::East]
            .iter()
            .map(|component| format!("{prefix}{}", component.code()))
            .collect()
    }

    fn build_trace(&self, channel: &str, window: &TimeWindow, rng: &mut StdRng) -> WaveformTrace {
        let rate = self.config.sample_rate;
        let duration = (window.end - window.start).num_milliseconds() as f64 / 1000.0;
        let count = (duration * rate).floor().max(0.0) as usize;
        let gain = match Component::from_channel(channel) {
            Some(Component::Vertical) | None => 1.0,
            Some(Component::North) => 0.7,
            Some(Component::East) => 0.5,
        };
        let phase = rng.gen_range(0.0..2.0 * PI);
        let burst_centre = duration * rng.gen_range(0.3..0.7);
        let burst_width = duration / 8.0;

        let samples = (0..count)
            .map(|index| {
                let t = index as f64 / rate;
                let envelope = (-((t - burst_centre) / burst_width).powi(2)).exp();
                let tremor = self.config.amplitude * gain * envelope * (2.0 * PI * self.config.tremor_hz * t + phase).sin();
                let noise = self.config.noise * rng.gen_range(-1.0..1.0);
                ((tremor + noise) * self.config.scale).round()
            })
            .collect();
        WaveformTrace::new(channel, samples, rate, window.start)
    }
}

impl WaveformSource for SyntheticSource {
    fn fetch(
        &self,
        station: &StationSpec,
        channel: &str,
        window: &TimeWindow,
    ) -> SourceResult<Vec<WaveformTrace>> {
        if self.config.silent.iter().any(|name| name == &station.station) {
            return Ok(Vec::new());
        }
        let mut rng = StdRng::seed_from_u64(self.station_seed(station));
        Ok(self
            .channel_codes(channel)
            .iter()
            .map(|code| self.build_trace(code, window, &mut rng))
            .collect())
    }
}

impl MetadataSource for SyntheticSource {
    fn fetch(
        &self,
        station: &StationSpec,
        channel: &str,
        _window: &TimeWindow,
    ) -> SourceResult<ChannelMetadata> {
        let mut metadata = ChannelMetadata::default();
        for code in self.channel_codes(channel) {
            let record: ChannelRecord = [
                ("Network", station.network.clone()),
                ("Station", station.station.clone()),
                ("Location", String::new()),
                ("Channel", code.clone()),
                ("Scale", self.config.scale.to_string()),
                ("SampleRate", self.config.sample_rate.to_string()),
            ]
            .into_iter()
            .collect();
            metadata.insert(&code, record);
        }
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        let start = Utc.with_ymd_and_hms(2021, 6, 3, 14, 39, 50).unwrap();
        TimeWindow::new(start, start + chrono::Duration::seconds(620))
    }

    #[test]
    fn generator_returns_three_components() {
        let source = SyntheticSource::new(GeneratorConfig::default());
        let station = StationSpec::new("AV", "SPCP", "BHZ");
        let traces = WaveformSource::fetch(&source, &station, "BH*", &window()).unwrap();
        let channels: Vec<&str> = traces.iter().map(|trace| trace.channel.as_str()).collect();
        assert_eq!(channels, vec!["BHZ", "BHN", "BHE"]);
        assert!(traces.iter().all(|trace| trace.len() == 620 * 50));
    }

    #[test]
    fn generator_is_deterministic_per_station() {
        let source = SyntheticSource::new(GeneratorConfig::default());
        let spcp = StationSpec::new("AV", "SPCP", "BHZ");
        let spbg = StationSpec::new("AV", "SPBG", "BHZ");
        let first = WaveformSource::fetch(&source, &spcp, "BH*", &window()).unwrap();
        let again = WaveformSource::fetch(&source, &spcp, "BH*", &window()).unwrap();
        let other = WaveformSource::fetch(&source, &spbg, "BH*", &window()).unwrap();
        assert_eq!(first, again);
        assert_ne!(first[0].samples, other[0].samples);
    }

    #[test]
    fn silent_station_has_no_data() {
        let source = SyntheticSource::new(GeneratorConfig {
            silent: vec!["SPBG".into()],
            ..GeneratorConfig::default()
        });
        let station = StationSpec::new("AV", "SPBG", "BHZ");
        assert!(WaveformSource::fetch(&source, &station, "BH*", &window())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn metadata_reports_configured_scale() {
        let source = SyntheticSource::new(GeneratorConfig::default());
        let station = StationSpec::new("AV", "SPCP", "BHZ");
        let metadata = MetadataSource::fetch(&source, &station, "BH*", &window()).unwrap();
        assert_eq!(metadata.len(), 3);
        assert_eq!(metadata.scale("BHE").unwrap(), 400_000_000);
        assert_eq!(metadata.sample_rate("BHZ").unwrap(), 50.0);
    }
}
