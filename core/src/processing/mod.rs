pub mod filter;
pub mod preprocess;
pub mod spectrogram;
pub mod window;

pub use filter::ButterworthFilter;
pub use preprocess::Preprocessor;
pub use spectrogram::{SpectrogramEngine, SpectrogramResult};
pub use window::WindowType;
