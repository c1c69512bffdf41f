use super::colormap::{ColorTable, Normalize};
use super::layout::{FigureLayout, PanelKind, PanelRect};
use super::{FigureError, FigureResult};
use crate::config::DisplayConfig;
use crate::prelude::{from_epoch_seconds, TimeWindow};
use crate::processing::SpectrogramResult;
use chrono::{DateTime, Utc};
use image::imageops::{self, FilterType};
use image::RgbImage;
use log::debug;
use plotters::prelude::*;
use plotters::style::register_font;
use std::fmt::Display;
use std::path::Path;
use std::sync::OnceLock;

/// Waveform amplitude limits, shared by every station so traces compare.
pub const WAVEFORM_LIMIT: f64 = 3.2e-5;
const FREQUENCY_STEP_HZ: f64 = 2.0;
const TIME_LABELS: usize = 6;
const TICK_LENGTH: i32 = 4;
const LABEL_FAMILY: &str = "sans-serif";
const LABEL_SIZE: f64 = 10.0;

static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");
static LABEL_FONT: OnceLock<()> = OnceLock::new();

/// What one station contributes to the figure.
#[derive(Debug, Clone)]
pub struct StationPlot {
    pub label: String,
    pub content: Option<PlotContent>,
}

impl StationPlot {
    pub fn empty(label: &str) -> Self {
        Self {
            label: label.into(),
            content: None,
        }
    }

    pub fn with_content(label: &str, content: PlotContent) -> Self {
        Self {
            label: label.into(),
            content: Some(content),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlotContent {
    /// Sample times in epoch seconds.
    pub times: Vec<f64>,
    pub amplitudes: Vec<f64>,
    pub spectrogram: SpectrogramResult,
}

/// Axis state of one drawn panel, read back from its chart.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSummary {
    pub kind: PanelKind,
    pub station: String,
    /// Plotting area in figure pixels.
    pub rect: PanelRect,
    pub x_range: (DateTime<Utc>, DateTime<Utc>),
    /// Pixel columns of the first and last instant on the x-axis.
    pub x_pixels: (i32, i32),
    pub y_range: (f64, f64),
    pub has_content: bool,
}

/// A rendered RGB raster plus the panels drawn on it.
#[derive(Debug, Clone)]
pub struct Figure {
    pub width: u32,
    pub height: u32,
    pub panels: Vec<PanelSummary>,
    pixels: Vec<u8>,
}

impl Figure {
    pub fn to_image(&self) -> FigureResult<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| FigureError::Render("pixel buffer does not match figure size".into()))
    }

    /// Writes the figure as PNG, creating missing parent directories.
    pub fn save(&self, path: &Path) -> FigureResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_image()?.save(path)?;
        Ok(())
    }
}

/// Replaces the built-in label font (DejaVu Sans) with a TTF or OTF file.
pub fn register_label_font(path: &Path) -> FigureResult<()> {
    let bytes: &'static [u8] = Box::leak(std::fs::read(path)?.into_boxed_slice());
    register_font(LABEL_FAMILY, FontStyle::Normal, bytes)
        .map_err(|_| FigureError::Font(format!("{} is not a TrueType or OpenType font", path.display())))?;
    LABEL_FONT.get_or_init(|| ());
    Ok(())
}

fn ensure_label_font() -> FigureResult<()> {
    if LABEL_FONT.get().is_none() {
        register_font(LABEL_FAMILY, FontStyle::Normal, EMBEDDED_FONT)
            .map_err(|_| FigureError::Font("embedded DejaVu Sans could not be parsed".into()))?;
        LABEL_FONT.get_or_init(|| ());
    }
    Ok(())
}

fn label_font() -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, LABEL_SIZE, FontStyle::Normal)
}

pub struct FigureComposer {
    window: TimeWindow,
    display: DisplayConfig,
    colors: ColorTable,
    norm: Normalize,
}

impl FigureComposer {
    pub fn new(window: TimeWindow, display: &DisplayConfig, colors: &ColorTable) -> Self {
        Self {
            window,
            display: display.clone(),
            colors: colors.clone(),
            norm: Normalize::SPECTROGRAM_DB,
        }
    }

    /// Full-size figure with axes, frequency gridlines, station names and
    /// `HH:MM` time labels.
    pub fn compose(&self, plots: &[StationPlot]) -> FigureResult<Figure> {
        ensure_label_font()?;
        self.render(plots, FigureLayout::decorated(plots.len()), true)
    }

    /// Reduced copy of the figure without decorations.
    pub fn thumbnail(&self, plots: &[StationPlot]) -> FigureResult<RgbImage> {
        let bare = self.render(plots, FigureLayout::bare(plots.len()), false)?;
        let (width, height) = FigureLayout::thumbnail_size(plots.len());
        Ok(imageops::resize(&bare.to_image()?, width, height, FilterType::Triangle))
    }

    fn render(&self, plots: &[StationPlot], layout: FigureLayout, decorated: bool) -> FigureResult<Figure> {
        let mut pixels = vec![0u8; layout.width as usize * layout.height as usize * 3];
        let mut panels = Vec::with_capacity(layout.rows.len());
        let time_label = |time: &DateTime<Utc>| time.format("%H:%M").to_string();
        {
            let root = BitMapBackend::with_buffer(&mut pixels, (layout.width, layout.height)).into_drawing_area();
            drawn(root.fill(&WHITE))?;
            let canvas = root.margin(0, layout.bottom_padding, layout.side_padding, layout.side_padding);
            let areas = canvas.split_by_breakpoints(Vec::<i32>::new(), layout.row_breaks());
            let last = layout.rows.len().saturating_sub(1);
            let (min_freq, max_freq) = (self.display.min_freq, self.display.max_freq);

            for (index, (area, &(kind, _))) in areas.iter().zip(&layout.rows).enumerate() {
                let plot = plots.get(index / 2);
                let station = plot.map(|plot| plot.label.as_str()).unwrap_or_default();
                let content = plot.and_then(|plot| plot.content.as_ref());
                let x_label_area = if index == last { layout.x_label_area } else { 0 };
                let y_spec = match kind {
                    PanelKind::Waveform => (-WAVEFORM_LIMIT..WAVEFORM_LIMIT).step(WAVEFORM_LIMIT),
                    PanelKind::Spectrogram => (min_freq..max_freq).step(FREQUENCY_STEP_HZ),
                };
                let mut chart = drawn(
                    ChartBuilder::on(area)
                        .set_label_area_size(LabelAreaPosition::Left, layout.y_label_area)
                        .set_label_area_size(LabelAreaPosition::Bottom, x_label_area)
                        .build_cartesian_2d(self.window.start..self.window.end, y_spec),
                )?;

                if let Some(content) = content {
                    match kind {
                        PanelKind::Waveform => self.draw_waveform(&mut chart, content)?,
                        PanelKind::Spectrogram => self.draw_spectrogram(&mut chart, &content.spectrogram)?,
                    }
                }

                let x_range = chart.x_range();
                let y_range = chart.y_range();
                if decorated {
                    let mut mesh = chart.configure_mesh();
                    mesh.disable_x_mesh()
                        .x_labels(TIME_LABELS)
                        .x_label_formatter(&time_label)
                        .label_style(label_font())
                        .axis_desc_style(label_font())
                        .set_all_tick_mark_size(TICK_LENGTH);
                    match kind {
                        PanelKind::Waveform => {
                            mesh.disable_y_mesh().disable_y_axis();
                        }
                        PanelKind::Spectrogram => {
                            mesh.bold_line_style(BLACK.mix(0.3))
                                .light_line_style(TRANSPARENT)
                                .y_desc(station);
                        }
                    }
                    drawn(mesh.draw())?;
                    let frame = [
                        (x_range.start, y_range.end),
                        (x_range.end, y_range.start),
                    ];
                    drawn(chart.plotting_area().draw(&Rectangle::new(frame, BLACK.stroke_width(1))))?;
                }

                let (columns, rows) = chart.plotting_area().get_pixel_range();
                let left = chart.backend_coord(&(x_range.start, y_range.start)).0;
                let right = chart.backend_coord(&(x_range.end, y_range.start)).0;
                panels.push(PanelSummary {
                    kind,
                    station: station.to_string(),
                    rect: PanelRect {
                        x: columns.start,
                        y: rows.start,
                        width: (columns.end - columns.start) as u32,
                        height: (rows.end - rows.start) as u32,
                    },
                    x_range: (x_range.start, x_range.end),
                    x_pixels: (left, right),
                    y_range: (y_range.start, y_range.end),
                    has_content: content.is_some(),
                });
            }
            drawn(root.present())?;
        }
        debug!(
            "rendered {}x{} figure with {} panels",
            layout.width,
            layout.height,
            panels.len()
        );
        Ok(Figure {
            width: layout.width,
            height: layout.height,
            panels,
            pixels,
        })
    }

    /// Samples inside the window as one line; amplitudes beyond the fixed
    /// limits run along the panel edge.
    fn draw_waveform<DB, X, Y>(
        &self,
        chart: &mut ChartContext<'_, DB, Cartesian2d<X, Y>>,
        content: &PlotContent,
    ) -> FigureResult<()>
    where
        DB: DrawingBackend,
        X: Ranged<ValueType = DateTime<Utc>>,
        Y: Ranged<ValueType = f64>,
    {
        let (start, end) = (self.window.start_seconds(), self.window.end_seconds());
        let points: Vec<(DateTime<Utc>, f64)> = content
            .times
            .iter()
            .zip(&content.amplitudes)
            .filter(|(time, _)| (start..=end).contains(*time))
            .filter_map(|(&time, &amplitude)| {
                Some((from_epoch_seconds(time)?, amplitude.clamp(-WAVEFORM_LIMIT, WAVEFORM_LIMIT)))
            })
            .collect();
        drawn(chart.draw_series(LineSeries::new(points, &BLACK)))?;
        Ok(())
    }

    /// One filled cell per (frequency, segment) bin, clipped to the window
    /// and the displayed frequency band. Outside the covered segments the
    /// panel stays white.
    fn draw_spectrogram<DB, X, Y>(
        &self,
        chart: &mut ChartContext<'_, DB, Cartesian2d<X, Y>>,
        spectrogram: &SpectrogramResult,
    ) -> FigureResult<()>
    where
        DB: DrawingBackend,
        X: Ranged<ValueType = DateTime<Utc>>,
        Y: Ranged<ValueType = f64>,
    {
        let decibels = spectrogram.to_decibels();
        let decibels = &decibels;
        let (start, end) = (self.window.start_seconds(), self.window.end_seconds());
        let (min_freq, max_freq) = (self.display.min_freq, self.display.max_freq);

        let columns: Vec<(usize, DateTime<Utc>, DateTime<Utc>)> = cell_edges(&spectrogram.times)
            .windows(2)
            .enumerate()
            .filter_map(|(column, edge)| {
                let (left, right) = (edge[0].max(start), edge[1].min(end));
                if left >= right {
                    return None;
                }
                Some((column, from_epoch_seconds(left)?, from_epoch_seconds(right)?))
            })
            .collect();
        let rows: Vec<(usize, f64, f64)> = cell_edges(&spectrogram.frequencies)
            .windows(2)
            .enumerate()
            .filter_map(|(row, edge)| {
                let (low, high) = (edge[0].max(min_freq), edge[1].min(max_freq));
                (low < high).then_some((row, low, high))
            })
            .collect();

        let columns = &columns;
        let cells = rows.iter().flat_map(|&(row, low, high)| {
            columns.iter().map(move |&(column, left, right)| {
                let color = self.colors.sample(self.norm.fraction(decibels[[row, column]]));
                Rectangle::new([(left, high), (right, low)], color.filled())
            })
        });
        drawn(chart.draw_series(cells))?;
        Ok(())
    }
}

fn drawn<T, E: Display>(result: Result<T, E>) -> FigureResult<T> {
    result.map_err(|err| FigureError::Render(err.to_string()))
}

/// Cell boundaries halfway between neighbouring centres, the outer cells
/// extended by half their inner spacing. A lone centre covers everything.
fn cell_edges(centres: &[f64]) -> Vec<f64> {
    match centres {
        [] => Vec::new(),
        [_] => vec![f64::NEG_INFINITY, f64::INFINITY],
        _ => {
            let last = centres.len() - 1;
            let mut edges = Vec::with_capacity(centres.len() + 1);
            edges.push(centres[0] - (centres[1] - centres[0]) / 2.0);
            edges.extend(centres.windows(2).map(|pair| (pair[0] + pair[1]) / 2.0));
            edges.push(centres[last] + (centres[last] - centres[last - 1]) / 2.0);
            edges
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::figure::layout::{FIGURE_PADDING, X_LABEL_AREA};
    use chrono::TimeZone;
    use ndarray::Array2;
    use std::f64::consts::PI;
    use std::io::Write;
    use std::ops::Range;

    impl Figure {
        fn pixel(&self, x: i32, y: i32) -> [u8; 3] {
            let offset = 3 * (y as usize * self.width as usize + x as usize);
            [self.pixels[offset], self.pixels[offset + 1], self.pixels[offset + 2]]
        }

        fn inked(&self, columns: Range<i32>, rows: Range<i32>) -> usize {
            rows.flat_map(|y| columns.clone().map(move |x| (x, y)))
                .filter(|&(x, y)| self.pixel(x, y) != [255, 255, 255])
                .count()
        }
    }

    fn window() -> TimeWindow {
        let start = Utc.with_ymd_and_hms(2021, 6, 3, 14, 40, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 6, 3, 14, 50, 0).unwrap();
        TimeWindow::new(start, end)
    }

    /// Ten seconds of padding on both sides of the window at 20 Hz.
    fn content(window: &TimeWindow) -> PlotContent {
        let start = window.start_seconds() - 10.0;
        let rate = 20.0;
        let len = 620 * 20;
        let times: Vec<f64> = (0..len).map(|i| start + i as f64 / rate).collect();
        let amplitudes = (0..len)
            .map(|i| 1.0e-5 * (2.0 * PI * 0.5 * i as f64 / rate).sin())
            .collect();
        let frequencies: Vec<f64> = (0..=40).map(|k| k as f64 * 0.25).collect();
        let segments: Vec<f64> = (0..124).map(|s| 2.5 + s as f64 * 5.0).collect();
        let power = Array2::from_elem((frequencies.len(), segments.len()), 1.0e-12);
        PlotContent {
            times,
            amplitudes,
            spectrogram: SpectrogramResult {
                frequencies,
                times: segments.iter().map(|offset| start + offset).collect(),
                offsets: segments,
                power,
            },
        }
    }

    fn composer() -> FigureComposer {
        FigureComposer::new(window(), &DisplayConfig::default(), &ColorTable::default())
    }

    fn centre(rect: PanelRect) -> (i32, i32) {
        ((rect.x + rect.right()) / 2, (rect.y + rect.bottom()) / 2)
    }

    #[test]
    fn empty_station_keeps_its_panels_blank() {
        let window = window();
        let plots = vec![
            StationPlot::with_content("SPCP.BHZ", content(&window)),
            StationPlot::empty("SPBG.BHZ"),
        ];
        let figure = composer().compose(&plots).unwrap();
        assert_eq!(figure.panels.len(), 4);
        let flags: Vec<bool> = figure.panels.iter().map(|panel| panel.has_content).collect();
        assert_eq!(flags, vec![true, true, false, false]);

        let (x, y) = centre(figure.panels[1].rect);
        assert_ne!(figure.pixel(x, y), [255, 255, 255]);

        // Off the 2 Hz gridlines: 5 Hz sits midway between two of them.
        let blank = figure.panels[3].rect;
        let (x, _) = centre(blank);
        let y = blank.y + blank.height as i32 / 2 + 1;
        assert_eq!(figure.pixel(x, y), [255, 255, 255]);
    }

    #[test]
    fn panels_use_the_layout_rows() {
        let plots = vec![StationPlot::empty("A.BHZ"), StationPlot::empty("B.BHZ")];
        let figure = composer().compose(&plots).unwrap();
        let layout = FigureLayout::decorated(2);
        let rects: Vec<PanelRect> = figure.panels.iter().map(|panel| panel.rect).collect();
        let expected: Vec<PanelRect> = layout.rows.iter().map(|(_, rect)| *rect).collect();
        assert_eq!(rects, expected);
    }

    #[test]
    fn x_axis_spans_exactly_the_window() {
        let window = window();
        for stations in 1..=4 {
            let plots: Vec<StationPlot> = (0..stations)
                .map(|i| StationPlot::with_content(&format!("ST{i}.BHZ"), content(&window)))
                .collect();
            let figure = composer().compose(&plots).unwrap();
            assert_eq!(figure.panels.len(), 2 * stations);
            for panel in &figure.panels {
                assert_eq!(panel.x_range, (window.start, window.end));
                assert_eq!(panel.x_pixels, (panel.rect.x, panel.rect.right() - 1));
            }
        }
    }

    #[test]
    fn samples_in_the_query_padding_are_not_drawn() {
        let window = window();
        let mut padded = content(&window);
        let (start, end) = (window.start_seconds(), window.end_seconds());
        padded.amplitudes = padded
            .times
            .iter()
            .map(|time| if (start..=end).contains(time) { 0.0 } else { 2.5e-5 })
            .collect();
        let figure = composer()
            .compose(&[StationPlot::with_content("SPCP.BHZ", padded)])
            .unwrap();
        let wave = figure.panels[0].rect;

        let upper = wave.y + 1..wave.y + wave.height as i32 / 4;
        assert_eq!(figure.inked(wave.x + 1..wave.right() - 1, upper.clone()), 0);
        assert_eq!(figure.inked(wave.right()..figure.width as i32, upper.clone()), 0);
        assert_eq!(figure.inked(0..FIGURE_PADDING as i32, upper), 0);

        let inner = wave.y + 1..wave.bottom() - 1;
        assert!(figure.inked(wave.x + 1..wave.x + 2, inner.clone()) > 0);
        assert!(figure.inked(wave.right() - 2..wave.right() - 1, inner) > 0);
    }

    #[test]
    fn axis_limits_are_fixed() {
        let figure = composer().compose(&[StationPlot::empty("SPCP.BHZ")]).unwrap();
        assert_eq!(figure.panels[0].y_range, (-WAVEFORM_LIMIT, WAVEFORM_LIMIT));
        assert_eq!(figure.panels[1].y_range, (0.0, 10.0));
    }

    #[test]
    fn default_figure_labels_time_axis_and_station() {
        let figure = composer().compose(&[StationPlot::empty("SPCP.BHZ")]).unwrap();
        let bottom = figure.panels[1].rect;

        let under_ticks = bottom.bottom() + TICK_LENGTH + 1..bottom.bottom() + X_LABEL_AREA as i32;
        assert!(figure.inked(bottom.x..bottom.right(), under_ticks) > 0);

        let name_column = FIGURE_PADDING as i32..FIGURE_PADDING as i32 + 8;
        assert!(figure.inked(name_column, bottom.y..bottom.bottom()) > 0);
    }

    #[test]
    fn thumbnail_is_deterministic() {
        let window = window();
        let plots = vec![
            StationPlot::with_content("SPCP.BHZ", content(&window)),
            StationPlot::empty("SPBG.BHZ"),
        ];
        let first = composer().thumbnail(&plots).unwrap();
        let second = composer().thumbnail(&plots).unwrap();
        assert_eq!(first.dimensions(), (150, 79));
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn saved_png_has_figure_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AV/2021/6/3/20210603T144000.png");
        let figure = composer()
            .compose(&[StationPlot::empty("A.BHZ"), StationPlot::empty("B.BHZ")])
            .unwrap();
        figure.save(&path).unwrap();
        let image = image::open(&path).unwrap();
        assert_eq!((image.width(), image.height()), (576, 304));
    }

    #[test]
    fn cell_edges_sit_between_centres() {
        assert_eq!(cell_edges(&[1.0, 2.0, 4.0]), vec![0.5, 1.5, 3.0, 5.0]);
        assert_eq!(cell_edges(&[1.0, 3.0]), vec![0.0, 2.0, 4.0]);
        assert_eq!(cell_edges(&[2.0]), vec![f64::NEG_INFINITY, f64::INFINITY]);
        assert!(cell_edges(&[]).is_empty());
    }

    #[test]
    fn label_font_file_must_parse() {
        let mut junk = tempfile::NamedTempFile::new().unwrap();
        junk.write_all(b"not a font").unwrap();
        match register_label_font(junk.path()) {
            Err(FigureError::Font(message)) => assert!(message.contains("not a TrueType")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            register_label_font(Path::new("/nonexistent/label.ttf")),
            Err(FigureError::Io(_))
        ));
    }

    #[test]
    fn bundled_font_registers_from_disk() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/DejaVuSans.ttf");
        register_label_font(&path).unwrap();
    }
}
