pub mod colormap;
pub mod composer;
pub mod layout;

pub use colormap::{ColorTable, Normalize};
pub use composer::{register_label_font, Figure, FigureComposer, PanelSummary, PlotContent, StationPlot};
pub use layout::{FigureLayout, PanelKind, PanelRect};

#[derive(thiserror::Error, Debug)]
pub enum FigureError {
    #[error("render failed: {0}")]
    Render(String),
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("invalid colour table: {0}")]
    Colors(String),
    #[error("label font rejected: {0}")]
    Font(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FigureResult<T> = Result<T, FigureError>;
