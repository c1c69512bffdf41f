use super::{MetadataSource, SourceError, SourceResult};
use crate::prelude::{StationSpec, TimeWindow};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeMap;

const CHANNEL_FIELD: usize = 3;

/// All text fields of one channel row, keyed by header name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelRecord {
    fields: BTreeMap<String, String>,
}

impl ChannelRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ChannelRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Calibration lookup by channel code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMetadata {
    channels: BTreeMap<String, ChannelRecord>,
}

impl ChannelMetadata {
    /// Parses the pipe-delimited text format: one header row of field names,
    /// then one row per channel keyed by its fourth column.
    pub fn parse(text: &str) -> SourceResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut rows = reader.records();

        let keys: Vec<String> = match rows.next() {
            Some(header) => header
                .map_err(|err| SourceError::Parse(err.to_string()))?
                .iter()
                .map(|key| key.trim().trim_start_matches('#').trim().to_string())
                .collect(),
            None => return Ok(Self::default()),
        };

        let mut channels = BTreeMap::new();
        for row in rows {
            let row = row.map_err(|err| SourceError::Parse(err.to_string()))?;
            let channel = row
                .get(CHANNEL_FIELD)
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .ok_or_else(|| SourceError::Parse(format!("row without channel code: {row:?}")))?;
            let record = keys
                .iter()
                .zip(row.iter())
                .map(|(key, value)| (key.clone(), value.trim().to_string()))
                .collect();
            channels.insert(channel.to_string(), record);
        }
        Ok(Self { channels })
    }

    pub fn insert(&mut self, channel: &str, record: ChannelRecord) {
        self.channels.insert(channel.into(), record);
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelRecord> {
        self.channels.get(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// `Scale` truncated to an integer divisor.
    pub fn scale(&self, channel: &str) -> SourceResult<i64> {
        let value = self.number(channel, "Scale")?;
        let scale = value.trunc();
        if scale == 0.0 || scale.abs() > i64::MAX as f64 {
            return Err(missing(channel, "Scale"));
        }
        Ok(scale as i64)
    }

    pub fn sample_rate(&self, channel: &str) -> SourceResult<f64> {
        let rate = self.number(channel, "SampleRate")?;
        if rate <= 0.0 {
            return Err(missing(channel, "SampleRate"));
        }
        Ok(rate)
    }

    fn number(&self, channel: &str, field: &str) -> SourceResult<f64> {
        self.get(channel)
            .and_then(|record| record.get(field))
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .ok_or_else(|| missing(channel, field))
    }
}

fn missing(channel: &str, field: &str) -> SourceError {
    SourceError::MissingAttribute {
        channel: channel.into(),
        field: field.into(),
    }
}

/// Channel-level text queries against an FDSN station web service.
pub struct FdsnMetadataClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl FdsnMetadataClient {
    pub fn new(base_url: &str) -> SourceResult<Self> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn request_url(&self, station: &StationSpec, channel: &str, window: &TimeWindow) -> String {
        let separator = if self.base_url.ends_with('?') || self.base_url.ends_with('&') {
            ""
        } else if self.base_url.contains('?') {
            "&"
        } else {
            "?"
        };
        format!(
            "{}{}net={}&sta={}&cha={}&starttime={}&endtime={}&level=channel&format=text",
            self.base_url,
            separator,
            station.network,
            station.station,
            channel,
            query_time(window.start),
            query_time(window.end),
        )
    }
}

fn query_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

impl MetadataSource for FdsnMetadataClient {
    fn fetch(
        &self,
        station: &StationSpec,
        channel: &str,
        window: &TimeWindow,
    ) -> SourceResult<ChannelMetadata> {
        let url = self.request_url(station, channel, window);
        debug!("metadata request {}", url);
        let body = self.client.get(&url).send()?.error_for_status()?.text()?;
        ChannelMetadata::parse(&body)
    }
}
