//! Upstream data sources: calibration metadata and waveform samples.
//!
//! Both sources are reached through traits so a pipeline can run against the
//! network services or an in-memory stand-in.

pub mod metadata;
pub mod tracebuf;
pub mod winston;

pub use metadata::{ChannelMetadata, ChannelRecord, FdsnMetadataClient};
pub use winston::WinstonClient;

use crate::prelude::{StationSpec, TimeWindow, WaveformTrace};

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("connecting to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wave server protocol error: {0}")]
    Protocol(String),
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed metadata: {0}")]
    Parse(String),
    #[error("channel {channel} has no usable {field} value")]
    MissingAttribute { channel: String, field: String },
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Multi-channel waveform provider. `channel` may contain `*`/`?` wildcards.
pub trait WaveformSource: Send + Sync {
    fn fetch(
        &self,
        station: &StationSpec,
        channel: &str,
        window: &TimeWindow,
    ) -> SourceResult<Vec<WaveformTrace>>;
}

/// Per-channel calibration provider.
pub trait MetadataSource: Send + Sync {
    fn fetch(
        &self,
        station: &StationSpec,
        channel: &str,
        window: &TimeWindow,
    ) -> SourceResult<ChannelMetadata>;
}
