use serde::Serialize;
use std::sync::Mutex;

/// Run counters shared by all location workers.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub stations_rendered: usize,
    pub stations_skipped: usize,
    pub csv_written: usize,
    pub locations_succeeded: usize,
    pub locations_failed: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_location(&self, rendered: usize, skipped: usize, csv_written: usize) {
        self.update(|metrics| {
            metrics.stations_rendered += rendered;
            metrics.stations_skipped += skipped;
            metrics.csv_written += csv_written;
            metrics.locations_succeeded += 1;
        });
    }

    pub fn record_failure(&self) {
        self.update(|metrics| metrics.locations_failed += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        match self.inner.lock() {
            Ok(metrics) => *metrics,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        match self.inner.lock() {
            Ok(mut metrics) => apply(&mut metrics),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
