//! Matched-filter convolution of single scan lines.

use crate::buffer::ImageView;
use crate::error::{PleiadesError, Result};

/// A small odd-sized convolution kernel, row-major.
///
/// Normalization is the caller's responsibility; detection only cares about
/// the relative response.
#[derive(Clone, Debug)]
pub struct Kernel {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl Kernel {
    pub fn new(data: Vec<f32>, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 == 0 || height % 2 == 0 {
            return Err(PleiadesError::IllegalArgument(format!(
                "convolution kernel must have odd dimensions, got {width}x{height}"
            )));
        }
        if data.len() != width * height {
            return Err(PleiadesError::ShapeMismatch {
                name: "kernel",
                got: data.len(),
                expected: width * height,
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// The classic 3x3 pyramidal detection filter.
    pub fn default_filter() -> Self {
        Self {
            data: vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0],
            width: 3,
            height: 3,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Element-wise squared kernel, for propagating variances through the
    /// matched filter.
    pub fn squared(&self) -> Self {
        Self {
            data: self.data.iter().map(|&v| v * v).collect(),
            width: self.width,
            height: self.height,
        }
    }
}

/// Convolve image row `y` with `kernel` into `out` (length `width`).
///
/// Pixels outside the image contribute zero. `rows` must hold the
/// `kernel.height` image rows centered on `y`, already converted to `f32`
/// (entries are `None` above/below the frame); this lets the scanner reuse
/// its sliding row window without reconversion.
pub fn convolve_row(rows: &[Option<&[f32]>], kernel: &Kernel, out: &mut [f32]) {
    let w = out.len();
    let hw = kernel.width / 2;
    out.fill(0.0);
    for (ky, row) in rows.iter().enumerate() {
        let row = match row {
            Some(r) => r,
            None => continue,
        };
        let krow = &kernel.data[ky * kernel.width..(ky + 1) * kernel.width];
        for (kx, &kv) in krow.iter().enumerate() {
            if kv == 0.0 {
                continue;
            }
            // out[x] += kv * row[x + kx - hw], clipped to the frame
            let shift = kx as isize - hw as isize;
            let (dst0, src0) = if shift < 0 {
                ((-shift) as usize, 0usize)
            } else {
                (0usize, shift as usize)
            };
            if dst0.max(src0) >= w {
                continue;
            }
            let n = w - dst0.max(src0);
            for i in 0..n {
                out[dst0 + i] += kv * row[src0 + i];
            }
        }
    }
}

/// Convolve a full image row-by-row, zero-padded at the edges.
///
/// Mainly a convenience for callers outside the scanner; the extractor
/// itself feeds its sliding window through [`convolve_row`].
pub fn convolve_image(image: &ImageView, kernel: &Kernel) -> Result<Vec<f32>> {
    let (w, h) = (image.width, image.height);
    let hh = kernel.height / 2;
    let mut rows: Vec<Vec<f32>> = vec![vec![0.0f32; w]; kernel.height];
    let mut out = vec![0.0f32; w * h];
    let mut line = vec![0.0f32; w];

    for y in 0..h {
        for (ky, buf) in rows.iter_mut().enumerate() {
            let yy = y as isize + ky as isize - hh as isize;
            if yy >= 0 && (yy as usize) < h {
                image.fill_row(yy as usize, buf);
            }
        }
        let window: Vec<Option<&[f32]>> = rows
            .iter()
            .enumerate()
            .map(|(ky, buf)| {
                let yy = y as isize + ky as isize - hh as isize;
                if yy >= 0 && (yy as usize) < h {
                    Some(buf.as_slice())
                } else {
                    None
                }
            })
            .collect();
        convolve_row(&window, kernel, &mut line);
        out[y * w..(y + 1) * w].copy_from_slice(&line);
    }
    Ok(out)
}
