pub mod error;
pub mod consts;
pub mod buffer;
pub mod background;
pub mod convolve;
pub mod extract;
pub mod aperture;

pub use buffer::{ImageView, Noise, NoiseKind, PixelData, PixelDataMut};
pub use error::{PleiadesError, Result};

/// Library version, from the crate metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
