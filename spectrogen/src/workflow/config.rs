use crate::generator::GeneratorConfig;
use anyhow::Context;
use seiscore::config::{DisplayConfig, FilterConfig, PipelineConfig, SpectrogramConfig};
use seiscore::figure::ColorTable;
use seiscore::prelude::{LocationGroup, StationSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WaveServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 16022,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub plot_root: PathBuf,
    pub csv_dir: PathBuf,
    /// TTF or OTF file replacing the bundled DejaVu Sans label font.
    pub font: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            plot_root: PathBuf::from("spectrograms/static/plots"),
            csv_dir: PathBuf::from("CSVFiles"),
            font: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub metadata_url: String,
    pub winston: WaveServerConfig,
    pub window_minutes: u32,
    pub filter: FilterConfig,
    pub spectrogram: SpectrogramConfig,
    pub display: DisplayConfig,
    pub output: OutputConfig,
    /// Hex colours overriding the built-in spectrogram colour table.
    pub colormap: Option<Vec<String>>,
    /// Parallel location workers; one per location when unset.
    pub workers: Option<usize>,
    pub synthetic: GeneratorConfig,
    pub locations: BTreeMap<String, Vec<StationSpec>>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            metadata_url: "https://service.iris.edu/fdsnws/station/1/query?".into(),
            winston: WaveServerConfig::default(),
            window_minutes: 10,
            filter: FilterConfig::default(),
            spectrogram: SpectrogramConfig::default(),
            display: DisplayConfig::default(),
            output: OutputConfig::default(),
            colormap: None,
            workers: None,
            synthetic: GeneratorConfig::default(),
            locations: BTreeMap::new(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        if config.window_minutes == 0 {
            anyhow::bail!("window_minutes must be positive in {}", path_ref.display());
        }
        Ok(config)
    }

    /// Freezes the processing settings shared by every location worker.
    pub fn to_pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let colors = match &self.colormap {
            Some(codes) => ColorTable::from_hex(codes).context("parsing colormap")?,
            None => ColorTable::default(),
        };
        let config = PipelineConfig {
            filter: self.filter.clone(),
            spectrogram: self.spectrogram.clone(),
            display: self.display.clone(),
            colors,
            csv_dir: self.output.csv_dir.clone(),
        };
        config.validate().context("validating processing settings")?;
        Ok(config)
    }

    pub fn location_groups(&self) -> Vec<LocationGroup> {
        self.locations
            .iter()
            .map(|(name, stations)| LocationGroup::new(name, stations.clone()))
            .collect()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or(self.locations.len()).max(1)
    }
}
