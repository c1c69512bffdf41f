//! Pixel geometry of a station figure.
//!
//! Each station owns a waveform row stacked directly on a spectrogram row in
//! a 3:10 height ratio. Rows are contiguous, so pairs touch without a gap.
//! A decorated figure keeps a blank margin on the sides and bottom plus label
//! areas for the frequency axis and the time axis.

pub const FIGURE_WIDTH: u32 = 576;
pub const STATION_HEIGHT: u32 = 152;
pub const FIGURE_PADDING: u32 = 25;
/// Frequency labels and the rotated station name.
pub const Y_LABEL_AREA: u32 = 34;
/// `HH:MM` labels under the last row.
pub const X_LABEL_AREA: u32 = 20;
pub const THUMBNAIL_WIDTH: u32 = 150;
pub const THUMBNAIL_STATION_HEIGHT: f64 = 39.6;

const WAVEFORM_WEIGHT: u32 = 3;
const SPECTROGRAM_WEIGHT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelKind {
    Waveform,
    Spectrogram,
}

/// Plotting area of one panel in figure pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PanelRect {
    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FigureLayout {
    pub width: u32,
    pub height: u32,
    pub side_padding: u32,
    pub bottom_padding: u32,
    pub y_label_area: u32,
    pub x_label_area: u32,
    /// Two rows per station, waveform first.
    pub rows: Vec<(PanelKind, PanelRect)>,
}

impl FigureLayout {
    pub fn decorated(stations: usize) -> Self {
        Self::stacked(stations, FIGURE_PADDING, Y_LABEL_AREA, X_LABEL_AREA)
    }

    /// Same canvas with the plot rows filling it edge to edge.
    pub fn bare(stations: usize) -> Self {
        Self::stacked(stations, 0, 0, 0)
    }

    pub fn thumbnail_size(stations: usize) -> (u32, u32) {
        let height = (THUMBNAIL_STATION_HEIGHT * stations.max(1) as f64).round() as u32;
        (THUMBNAIL_WIDTH, height.max(1))
    }

    pub fn panel(&self, station: usize, kind: PanelKind) -> Option<PanelRect> {
        let offset = match kind {
            PanelKind::Waveform => 0,
            PanelKind::Spectrogram => 1,
        };
        self.rows.get(2 * station + offset).map(|(_, rect)| *rect)
    }

    /// Row boundaries used to split the canvas, top of every row but the first.
    pub fn row_breaks(&self) -> Vec<i32> {
        self.rows.iter().skip(1).map(|(_, rect)| rect.y).collect()
    }

    fn stacked(stations: usize, padding: u32, y_label_area: u32, x_label_area: u32) -> Self {
        let count = stations.max(1);
        let width = FIGURE_WIDTH;
        let height = STATION_HEIGHT * count as u32;
        let inner_height = f64::from(height - padding - x_label_area);
        let total_weight = f64::from((WAVEFORM_WEIGHT + SPECTROGRAM_WEIGHT) * count as u32);
        let left = padding + y_label_area;

        let mut rows = Vec::with_capacity(2 * count);
        let mut weight = 0;
        let mut top = 0;
        for _ in 0..count {
            for (kind, share) in [
                (PanelKind::Waveform, WAVEFORM_WEIGHT),
                (PanelKind::Spectrogram, SPECTROGRAM_WEIGHT),
            ] {
                weight += share;
                let next = (inner_height * f64::from(weight) / total_weight).round() as i32;
                rows.push((
                    kind,
                    PanelRect {
                        x: left as i32,
                        y: top,
                        width: width - left - padding,
                        height: (next - top) as u32,
                    },
                ));
                top = next;
            }
        }
        Self {
            width,
            height,
            side_padding: padding,
            bottom_padding: padding,
            y_label_area,
            x_label_area,
            rows,
        }
    }
}
