//! Synthetic image builders shared by the integration tests.
#![allow(dead_code)]

use ndarray::Array2;

use pleiades_core::{ImageView, PixelData};

/// Flat image of a constant value.
pub fn constant(h: usize, w: usize, value: f32) -> Array2<f32> {
    Array2::from_elem((h, w), value)
}

pub fn ones(h: usize, w: usize) -> Array2<f32> {
    constant(h, w, 1.0)
}

/// Add `val` to the square box of half-size `r` around `(xc, yc)`:
/// columns `xc - r .. xc + r`, rows `yc - r .. yc + r` (exclusive upper
/// bounds), clipped to the frame.
pub fn add_box(im: &mut Array2<f32>, xc: i64, yc: i64, r: i64, val: f32) {
    let (h, w) = im.dim();
    for y in (yc - r).max(0)..(yc + r).min(h as i64) {
        for x in (xc - r).max(0)..(xc + r).min(w as i64) {
            im[[y as usize, x as usize]] += val;
        }
    }
}

/// Add a circular Gaussian of the given peak and sigma centered on
/// `(xc, yc)` (pixel-center coordinates).
pub fn add_gaussian(im: &mut Array2<f32>, xc: f64, yc: f64, sigma: f64, peak: f32) {
    let (h, w) = im.dim();
    let reach = (5.0 * sigma).ceil() as i64;
    let x0 = (xc.round() as i64 - reach).max(0);
    let x1 = (xc.round() as i64 + reach).min(w as i64 - 1);
    let y0 = (yc.round() as i64 - reach).max(0);
    let y1 = (yc.round() as i64 + reach).min(h as i64 - 1);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f64 - xc;
            let dy = y as f64 - yc;
            let g = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            im[[y as usize, x as usize]] += peak * g as f32;
        }
    }
}

/// Deterministic Gaussian noise source (64-bit LCG + Box-Muller), so tests
/// never depend on an external RNG.
pub struct NoiseGen {
    state: u64,
    spare: Option<f64>,
}

impl NoiseGen {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).max(1),
            spare: None,
        }
    }

    /// Uniform sample in (0, 1).
    pub fn uniform(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.state >> 11) as f64 + 1.0) / (1u64 << 53) as f64
    }

    /// Standard normal sample.
    pub fn gauss(&mut self) -> f64 {
        if let Some(v) = self.spare.take() {
            return v;
        }
        let u1 = self.uniform();
        let u2 = self.uniform();
        let r = (-2.0 * u1.ln()).sqrt();
        let (s, c) = (2.0 * std::f64::consts::PI * u2).sin_cos();
        self.spare = Some(r * s);
        r * c
    }
}

/// Add zero-mean Gaussian noise of the given sigma.
pub fn add_noise(im: &mut Array2<f32>, sigma: f32, seed: u64) {
    let mut rng = NoiseGen::new(seed);
    for v in im.iter_mut() {
        *v += sigma * rng.gauss() as f32;
    }
}

/// Borrow an `Array2` as an `ImageView`.
pub fn view(im: &Array2<f32>) -> ImageView<'_> {
    ImageView::from_array(im).expect("contiguous test image")
}

/// Build a view over a non-f32 buffer.
pub fn view_of<'a>(data: PixelData<'a>, w: usize, h: usize) -> ImageView<'a> {
    ImageView::new(data, w, h).expect("valid test buffer")
}
