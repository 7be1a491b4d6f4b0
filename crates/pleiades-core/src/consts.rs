/// Maximum image extent in either axis.
pub const MAX_DIMENSION: usize = 1_048_576;

/// Kappa for iterative sigma clipping in background cells and globals.
pub const CLIP_KAPPA: f32 = 3.0;

/// Maximum sigma-clipping iterations per background cell.
pub const CLIP_MAX_ITER: usize = 6;

/// Minimum unmasked pixels for a background cell estimate; cells below this
/// are filled from the good-cell median before filtering.
pub const BACK_MIN_VALID: usize = 2;

/// Minimum full-cell area (bw*bh) for a usable mesh.
pub const BACK_MIN_CELL_AREA: usize = 4;

/// Skewness cut for the mode estimator: |mean - median| / sigma below this
/// uses the clipped mean directly.
pub const MODE_SKEW_CUT: f32 = 0.3;

/// Default capacity of the pixel-list arena, in records.
pub const DEFAULT_PIXEL_STACK: usize = 300_000;

/// Deblending level bounds.
pub const DEBLEND_NTHRESH_MIN: usize = 2;
pub const DEBLEND_NTHRESH_MAX: usize = 64;

/// Maximum sub-objects per deblending level.
pub const NSONMAX: usize = 1024;

/// Maximum simultaneous branches while walking the deblend tree.
pub const NBRANCH: usize = 16;

/// Variance floor of a pixel-quantized coordinate (1/12).
pub const MOMENT_FLOOR: f64 = 1.0 / 12.0;

/// Half diagonal of a unit pixel; boundary ring half-width for apertures.
pub const PIXEL_HALF_DIAG: f64 = std::f64::consts::FRAC_1_SQRT_2;
