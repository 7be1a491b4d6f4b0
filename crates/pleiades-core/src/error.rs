use thiserror::Error;

#[derive(Error, Debug)]
pub enum PleiadesError {
    #[error("memory allocation failed ({0} bytes requested)")]
    Alloc(usize),

    #[error("background mesh {bw}x{bh} yields too few usable samples per cell")]
    MeshTooSmall { bw: usize, bh: usize },

    #[error("internal buffer overflow: {0}")]
    InternalOverflow(&'static str),

    #[error("unsupported pixel type for this operation: {0}")]
    UnsupportedDtype(&'static str),

    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("companion {name} buffer has {got} elements, expected {expected}")]
    ShapeMismatch {
        name: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("illegal argument: {0}")]
    IllegalArgument(String),
}

pub type Result<T> = std::result::Result<T, PleiadesError>;
