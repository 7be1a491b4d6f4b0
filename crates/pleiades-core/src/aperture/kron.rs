//! First-moment (Kron) radius estimation.

use crate::buffer::ImageView;
use crate::error::{PleiadesError, Result};
use crate::extract::flags;

use super::RowReader;

/// Minimum contributing pixels for a trustworthy Kron radius.
const KRON_MIN_PIXELS: usize = 4;

/// Flux-weighted mean elliptical radius within `r <= r_max`, where
/// `r^2 = cxx dx^2 + cyy dy^2 + cxy dx dy`.
///
/// Returns `(kron_radius, flag)`. A non-positive flux sum or a nearly
/// empty aperture raises `APER_NONPOSITIVE` and falls back to `r_max`.
pub fn kron_radius(
    image: &ImageView,
    x: f64,
    y: f64,
    cxx: f64,
    cyy: f64,
    cxy: f64,
    r_max: f64,
) -> Result<(f64, u16)> {
    if !(r_max > 0.0) {
        return Err(PleiadesError::IllegalArgument(format!(
            "r_max must be positive, got {r_max}"
        )));
    }
    let det = cxx * cyy - cxy * cxy / 4.0;
    if !(cxx > 0.0) || !(cyy > 0.0) || det <= 0.0 {
        return Err(PleiadesError::IllegalArgument(
            "conic coefficients do not describe an ellipse".into(),
        ));
    }

    // Tight bounding box of the ellipse r = r_max.
    let dx_max = r_max * (cyy / det).sqrt();
    let dy_max = r_max * (cxx / det).sqrt();

    let (w, h) = (image.width as i64, image.height as i64);
    let ixmin = (x - dx_max).ceil() as i64;
    let ixmax = (x + dx_max).floor() as i64;
    let iymin = (y - dy_max).ceil() as i64;
    let iymax = (y + dy_max).floor() as i64;

    let mut flag = 0u16;
    if ixmin < 0 || iymin < 0 || ixmax >= w || iymax >= h {
        flag |= flags::APER_TRUNC;
    }
    let x0 = ixmin.max(0);
    let x1 = ixmax.min(w - 1);
    let y0 = iymin.max(0);
    let y1 = iymax.min(h - 1);
    if x0 > x1 || y0 > y1 {
        return Ok((r_max, flag | flags::APER_NONPOSITIVE));
    }

    let r2_max = r_max * r_max;
    let mut rsum = 0.0f64;
    let mut vsum = 0.0f64;
    let mut npix = 0usize;
    let mut reader = RowReader::new(image);

    for iy in y0..=y1 {
        reader.load(image, iy as usize, x0 as usize, (x1 + 1) as usize);
        let dy = iy as f64 - y;
        for ix in x0..=x1 {
            let dx = ix as f64 - x;
            let r2 = cxx * dx * dx + cyy * dy * dy + cxy * dx * dy;
            if r2 > r2_max {
                continue;
            }
            if reader.masked(ix as usize, image.mask_thresh) {
                flag |= flags::APER_HASMASKED;
                continue;
            }
            let v = reader.value(ix as usize);
            rsum += r2.max(0.0).sqrt() * v;
            vsum += v;
            npix += 1;
        }
    }

    if vsum <= 0.0 || npix < KRON_MIN_PIXELS {
        return Ok((r_max, flag | flags::APER_NONPOSITIVE));
    }
    Ok((rsum / vsum, flag))
}
