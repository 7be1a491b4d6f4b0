use ndarray::Array2;

use crate::consts::{BACK_MIN_VALID, CLIP_KAPPA, CLIP_MAX_ITER, MODE_SKEW_CUT};
use crate::buffer::ImageView;
use crate::error::{PleiadesError, Result};

/// Robust (mode, rms) estimate of one cell's pixel distribution.
///
/// Iteratively clips at `CLIP_KAPPA` sigma around the running mean, then
/// applies the classic mode estimator: the clipped mean when the clipped
/// distribution is near-symmetric, `2.5*median - 1.5*mean` otherwise.
pub(super) fn clipped_cell_stats(values: &mut [f32]) -> Option<(f32, f32)> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));

    let mut lo = 0usize;
    let mut hi = values.len();
    let (mut mean, mut sigma) = mean_sigma(&values[lo..hi]);

    for _ in 0..CLIP_MAX_ITER {
        if sigma <= 0.0 {
            break;
        }
        let lcut = mean - CLIP_KAPPA * sigma;
        let hcut = mean + CLIP_KAPPA * sigma;
        let nlo = lo + values[lo..hi].partition_point(|&v| v < lcut);
        let nhi = lo + values[lo..hi].partition_point(|&v| v <= hcut);
        if (nlo == lo && nhi == hi) || nhi <= nlo {
            break;
        }
        lo = nlo;
        hi = nhi;
        let (m, s) = mean_sigma(&values[lo..hi]);
        mean = m;
        sigma = s;
    }

    let median = median_sorted(&values[lo..hi]);
    let mode = if sigma <= 0.0 || ((mean - median).abs() / sigma) < MODE_SKEW_CUT {
        mean
    } else {
        2.5 * median - 1.5 * mean
    };
    Some((mode, sigma))
}

/// Plain kappa-sigma clipped mean, used for the global scalars.
pub(super) fn clipped_mean(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mut lo = 0usize;
    let mut hi = values.len();
    let (mut mean, mut sigma) = mean_sigma(&values[lo..hi]);
    for _ in 0..CLIP_MAX_ITER {
        if sigma <= 0.0 {
            break;
        }
        let lcut = mean - CLIP_KAPPA * sigma;
        let hcut = mean + CLIP_KAPPA * sigma;
        let nlo = lo + values[lo..hi].partition_point(|&v| v < lcut);
        let nhi = lo + values[lo..hi].partition_point(|&v| v <= hcut);
        if (nlo == lo && nhi == hi) || nhi <= nlo {
            break;
        }
        lo = nlo;
        hi = nhi;
        let (m, s) = mean_sigma(&values[lo..hi]);
        mean = m;
        sigma = s;
    }
    mean
}

fn mean_sigma(values: &[f32]) -> (f32, f32) {
    let n = values.len() as f64;
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    let mean = sum / n;
    let var: f64 = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean as f32, var.sqrt() as f32)
}

fn median_sorted(sorted: &[f32]) -> f32 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Estimate the cell grids for an image: one (background, rms) pair per
/// `bw x bh` cell. Cells with fewer than `BACK_MIN_VALID` unmasked pixels
/// are filled with the median over the good cells.
pub(super) fn build_mesh(
    image: &ImageView,
    bw: usize,
    bh: usize,
) -> Result<(Array2<f32>, Array2<f32>)> {
    let (w, h) = (image.width, image.height);
    let gw = w.div_ceil(bw);
    let gh = h.div_ceil(bh);

    let mut back = Array2::<f32>::zeros((gh, gw));
    let mut rms = Array2::<f32>::zeros((gh, gw));
    let mut bad = Vec::new();

    let mut row = vec![0.0f32; w];
    let mut mask_row = vec![0.0f32; w];
    let mut cells: Vec<Vec<f32>> = vec![Vec::with_capacity(bw * bh); gw];

    for gy in 0..gh {
        for cell in cells.iter_mut() {
            cell.clear();
        }
        let y0 = gy * bh;
        let y1 = (y0 + bh).min(h);
        for y in y0..y1 {
            image.fill_row(y, &mut row);
            let masked = image.fill_mask_row(y, &mut mask_row);
            for (x, &v) in row.iter().enumerate() {
                if masked && mask_row[x] >= image.mask_thresh {
                    continue;
                }
                cells[x / bw].push(v);
            }
        }
        for gx in 0..gw {
            if cells[gx].len() < BACK_MIN_VALID {
                bad.push((gy, gx));
                continue;
            }
            if let Some((mode, sigma)) = clipped_cell_stats(&mut cells[gx]) {
                back[[gy, gx]] = mode;
                rms[[gy, gx]] = sigma;
            } else {
                bad.push((gy, gx));
            }
        }
    }

    if bad.len() == gw * gh {
        return Err(PleiadesError::MeshTooSmall { bw, bh });
    }
    if !bad.is_empty() {
        fill_bad_cells(&mut back, &bad);
        fill_bad_cells(&mut rms, &bad);
    }

    Ok((back, rms))
}

/// Replace flagged cells with the median over the remaining cells.
fn fill_bad_cells(grid: &mut Array2<f32>, bad: &[(usize, usize)]) {
    let bad_set: std::collections::HashSet<(usize, usize)> = bad.iter().copied().collect();
    let mut good: Vec<f32> = grid
        .indexed_iter()
        .filter(|(idx, _)| !bad_set.contains(idx))
        .map(|(_, &v)| v)
        .collect();
    good.sort_unstable_by(|a, b| a.total_cmp(b));
    let fill = median_sorted(&good);
    for &(gy, gx) in bad {
        grid[[gy, gx]] = fill;
    }
}

/// Conditional median filter over the node grids.
///
/// A background node is replaced by the median of its `fw x fh` window only
/// when it deviates from that median by more than `fthresh` times the local
/// median RMS; the RMS surface follows the same rule against itself.
pub(super) fn filter_mesh(
    back: &Array2<f32>,
    rms: &Array2<f32>,
    fw: usize,
    fh: usize,
    fthresh: f32,
) -> (Array2<f32>, Array2<f32>) {
    let (gh, gw) = back.dim();
    if fw <= 1 && fh <= 1 {
        return (back.clone(), rms.clone());
    }

    let mut back_out = back.clone();
    let mut rms_out = rms.clone();
    let hw = fw / 2;
    let hh = fh / 2;
    let mut window_b = Vec::with_capacity(fw * fh);
    let mut window_r = Vec::with_capacity(fw * fh);

    for gy in 0..gh {
        let ylo = gy.saturating_sub(hh);
        let yhi = (gy + hh + 1).min(gh);
        for gx in 0..gw {
            let xlo = gx.saturating_sub(hw);
            let xhi = (gx + hw + 1).min(gw);
            window_b.clear();
            window_r.clear();
            for wy in ylo..yhi {
                for wx in xlo..xhi {
                    window_b.push(back[[wy, wx]]);
                    window_r.push(rms[[wy, wx]]);
                }
            }
            window_b.sort_unstable_by(|a, b| a.total_cmp(b));
            window_r.sort_unstable_by(|a, b| a.total_cmp(b));
            let med_b = median_sorted(&window_b);
            let med_r = median_sorted(&window_r);
            if (back[[gy, gx]] - med_b).abs() > fthresh * med_r {
                back_out[[gy, gx]] = med_b;
            }
            if (rms[[gy, gx]] - med_r).abs() > fthresh * med_r {
                rms_out[[gy, gx]] = med_r;
            }
        }
    }

    (back_out, rms_out)
}
