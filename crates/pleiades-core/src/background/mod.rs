//! Mesh-based background and noise estimation.
//!
//! The image is partitioned into a coarse grid of cells; each cell gets a
//! sigma-clipped mode/RMS estimate, the node grids are median-filtered, and
//! full-resolution surfaces are produced by natural bicubic spline
//! interpolation over the nodes.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::{ImageView, PixelDataMut};
use crate::consts::BACK_MIN_CELL_AREA;
use crate::error::{PleiadesError, Result};

mod mesh;
mod spline;

/// Parameters for background estimation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Cell width in pixels (default: 64).
    pub cell_w: usize,
    /// Cell height in pixels (default: 64).
    pub cell_h: usize,
    /// Median filter width in cells, odd (default: 3).
    pub filter_w: usize,
    /// Median filter height in cells, odd (default: 3).
    pub filter_h: usize,
    /// Filtering threshold in units of the local RMS; 0 filters
    /// unconditionally (default: 0.0).
    pub filter_thresh: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            cell_w: 64,
            cell_h: 64,
            filter_w: 3,
            filter_h: 3,
            filter_thresh: 0.0,
        }
    }
}

/// Coarse background/noise model of one image.
///
/// Created by [`make_background`], read-only afterwards. Safe to share
/// across threads for concurrent evaluation.
#[derive(Clone, Debug)]
pub struct BackgroundMap {
    width: usize,
    height: usize,
    cell_w: usize,
    cell_h: usize,
    back: Array2<f32>,
    rms: Array2<f32>,
    dback: Array2<f32>,
    drms: Array2<f32>,
    global_back: f32,
    global_rms: f32,
}

/// Estimate the background of `image` on a `cell_w x cell_h` mesh.
pub fn make_background(image: &ImageView, config: &BackgroundConfig) -> Result<BackgroundMap> {
    let (bw, bh) = (config.cell_w, config.cell_h);
    if bw == 0 || bh == 0 || bw * bh < BACK_MIN_CELL_AREA {
        return Err(PleiadesError::MeshTooSmall { bw, bh });
    }
    let (fw, fh) = (config.filter_w, config.filter_h);
    if fw == 0 || fh == 0 || fw % 2 == 0 || fh % 2 == 0 {
        return Err(PleiadesError::IllegalArgument(format!(
            "median filter size must be odd, got {fw}x{fh}"
        )));
    }
    if config.filter_thresh < 0.0 {
        return Err(PleiadesError::IllegalArgument(
            "filter threshold must be non-negative".into(),
        ));
    }

    let (raw_back, raw_rms) = mesh::build_mesh(image, bw, bh)?;
    let (back, rms) = mesh::filter_mesh(&raw_back, &raw_rms, fw, fh, config.filter_thresh);

    let mut cells: Vec<f32> = back.iter().copied().collect();
    let global_back = mesh::clipped_mean(&mut cells);
    cells.clear();
    cells.extend(rms.iter().copied());
    let global_rms = mesh::clipped_mean(&mut cells);

    let dback = column_splines(&back);
    let drms = column_splines(&rms);

    debug!(
        grid_w = back.ncols(),
        grid_h = back.nrows(),
        global_back,
        global_rms,
        "background mesh ready"
    );

    Ok(BackgroundMap {
        width: image.width,
        height: image.height,
        cell_w: bw,
        cell_h: bh,
        back,
        rms,
        dback,
        drms,
        global_back,
        global_rms,
    })
}

/// Second derivatives of the natural spline along every grid column.
fn column_splines(grid: &Array2<f32>) -> Array2<f32> {
    let (gh, gw) = grid.dim();
    let mut out = Array2::<f32>::zeros((gh, gw));
    let mut col = vec![0.0f32; gh];
    let mut col2 = vec![0.0f32; gh];
    let mut scratch = vec![0.0f32; gh];
    for gx in 0..gw {
        for gy in 0..gh {
            col[gy] = grid[[gy, gx]];
        }
        spline::second_derivs(&col, &mut col2, &mut scratch);
        for gy in 0..gh {
            out[[gy, gx]] = col2[gy];
        }
    }
    out
}

impl BackgroundMap {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Mesh cell size in pixels, `(cell_w, cell_h)`.
    pub fn cell_size(&self) -> (usize, usize) {
        (self.cell_w, self.cell_h)
    }

    /// Node grid dimensions, `(grid_w, grid_h)`.
    pub fn grid_size(&self) -> (usize, usize) {
        (self.back.ncols(), self.back.nrows())
    }

    /// Background node grid, shape `(grid_h, grid_w)`.
    pub fn back_nodes(&self) -> &Array2<f32> {
        &self.back
    }

    /// RMS node grid, shape `(grid_h, grid_w)`.
    pub fn rms_nodes(&self) -> &Array2<f32> {
        &self.rms
    }

    /// Clipped mean background over the whole image.
    pub fn global_back(&self) -> f32 {
        self.global_back
    }

    /// Clipped mean background RMS over the whole image.
    pub fn global_rms(&self) -> f32 {
        self.global_rms
    }

    /// Fill `out` (length `width`) with the background of image row `y`.
    pub fn back_line(&self, y: usize, out: &mut [f32]) -> Result<()> {
        self.eval_line(&self.back, &self.dback, y, out)
    }

    /// Fill `out` (length `width`) with the background RMS of image row `y`.
    pub fn rms_line(&self, y: usize, out: &mut [f32]) -> Result<()> {
        self.eval_line(&self.rms, &self.drms, y, out)
    }

    /// Evaluate the full background surface.
    pub fn back_array(&self) -> Array2<f32> {
        self.eval_array(&self.back, &self.dback)
    }

    /// Evaluate the full RMS surface.
    pub fn rms_array(&self) -> Array2<f32> {
        self.eval_array(&self.rms, &self.drms)
    }

    /// Subtract the background surface from `data` in place.
    ///
    /// Row `y` is obtained with the same evaluation as [`back_line`], so
    /// subtracting is numerically identical to evaluating then subtracting.
    ///
    /// [`back_line`]: BackgroundMap::back_line
    pub fn subtract_from(&self, data: PixelDataMut) -> Result<()> {
        let expected = self.width * self.height;
        if data.len() != expected {
            return Err(PleiadesError::ShapeMismatch {
                name: "subtract",
                got: data.len(),
                expected,
            });
        }
        let mut line = vec![0.0f32; self.width];
        match data {
            PixelDataMut::F32(buf) => {
                for y in 0..self.height {
                    self.back_line(y, &mut line)?;
                    let row = &mut buf[y * self.width..(y + 1) * self.width];
                    for (p, b) in row.iter_mut().zip(&line) {
                        *p -= b;
                    }
                }
            }
            PixelDataMut::F64(buf) => {
                for y in 0..self.height {
                    self.back_line(y, &mut line)?;
                    let row = &mut buf[y * self.width..(y + 1) * self.width];
                    for (p, b) in row.iter_mut().zip(&line) {
                        *p -= *b as f64;
                    }
                }
            }
        }
        Ok(())
    }

    /// Convenience wrapper over [`subtract_from`] for `ndarray` images.
    ///
    /// [`subtract_from`]: BackgroundMap::subtract_from
    pub fn subtract_array(&self, image: &mut Array2<f32>) -> Result<()> {
        let slice = image.as_slice_mut().ok_or_else(|| {
            PleiadesError::IllegalArgument("image array must be contiguous row-major".into())
        })?;
        self.subtract_from(PixelDataMut::F32(slice))
    }

    fn eval_line(
        &self,
        grid: &Array2<f32>,
        dgrid: &Array2<f32>,
        y: usize,
        out: &mut [f32],
    ) -> Result<()> {
        if y >= self.height {
            return Err(PleiadesError::IllegalArgument(format!(
                "row {y} outside image of height {}",
                self.height
            )));
        }
        if out.len() != self.width {
            return Err(PleiadesError::ShapeMismatch {
                name: "line",
                got: out.len(),
                expected: self.width,
            });
        }

        let (gh, gw) = grid.dim();
        let mut node = vec![0.0f32; gw];

        if gh == 1 {
            for gx in 0..gw {
                node[gx] = grid[[0, gx]];
            }
        } else {
            // Spline in y: the same basis weights apply to every column.
            let ty = (y as f64 + 0.5) / self.cell_h as f64 - 0.5;
            let j = (ty.floor() as isize).clamp(0, gh as isize - 2) as usize;
            let d = ty - j as f64;
            let c = 1.0 - d;
            let wd = (d * d * d - d) / 6.0;
            let wc = (c * c * c - c) / 6.0;
            for gx in 0..gw {
                node[gx] = (c * grid[[j, gx]] as f64
                    + d * grid[[j + 1, gx]] as f64
                    + wc * dgrid[[j, gx]] as f64
                    + wd * dgrid[[j + 1, gx]] as f64) as f32;
            }
        }

        // Spline in x along the interpolated node row.
        let mut node2 = vec![0.0f32; gw];
        let mut scratch = vec![0.0f32; gw];
        spline::second_derivs(&node, &mut node2, &mut scratch);
        for (x, o) in out.iter_mut().enumerate() {
            let tx = (x as f64 + 0.5) / self.cell_w as f64 - 0.5;
            *o = spline::eval(&node, &node2, tx);
        }
        Ok(())
    }

    fn eval_array(&self, grid: &Array2<f32>, dgrid: &Array2<f32>) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((self.height, self.width));
        let mut line = vec![0.0f32; self.width];
        for y in 0..self.height {
            // eval_line cannot fail here: y and the line length are in range
            if self.eval_line(grid, dgrid, y, &mut line).is_ok() {
                for (x, &v) in line.iter().enumerate() {
                    out[[y, x]] = v;
                }
            }
        }
        out
    }
}
