//! Elliptical apertures and ellipse parameter conversions.

use crate::buffer::ImageView;
use crate::consts::PIXEL_HALF_DIAG;
use crate::error::{PleiadesError, Result};
use crate::extract::flags;

use super::{error_weight, ApertureSum, RowReader};

/// Conic coefficients of the ellipse with semi-axes `a`, `b` and position
/// angle `theta`: the curve `cxx dx^2 + cyy dy^2 + cxy dx dy = 1` is that
/// ellipse.
pub fn ellipse_coeffs(a: f64, b: f64, theta: f64) -> Result<(f64, f64, f64)> {
    if !(a > 0.0) || !(b > 0.0) {
        return Err(PleiadesError::IllegalArgument(format!(
            "ellipse axes must be positive, got a={a}, b={b}"
        )));
    }
    Ok(coeffs_from_shape(a, b, theta))
}

pub(crate) fn coeffs_from_shape(a: f64, b: f64, theta: f64) -> (f64, f64, f64) {
    let (sin, cos) = theta.sin_cos();
    let inv_a2 = 1.0 / (a * a);
    let inv_b2 = 1.0 / (b * b);
    let cxx = cos * cos * inv_a2 + sin * sin * inv_b2;
    let cyy = sin * sin * inv_a2 + cos * cos * inv_b2;
    let cxy = 2.0 * cos * sin * (inv_a2 - inv_b2);
    (cxx, cyy, cxy)
}

/// Invert [`ellipse_coeffs`]: recover `(a, b, theta)` with `a >= b` and
/// `theta` in `(-pi/2, pi/2]`.
pub fn ellipse_axes(cxx: f64, cyy: f64, cxy: f64) -> Result<(f64, f64, f64)> {
    let p = (cxx + cyy) / 2.0;
    let q = ((cxx - cyy) / 2.0).hypot(cxy / 2.0);
    let lambda_min = p - q;
    let lambda_max = p + q;
    if lambda_min <= 0.0 {
        return Err(PleiadesError::IllegalArgument(
            "conic coefficients do not describe an ellipse".into(),
        ));
    }
    let a = 1.0 / lambda_min.sqrt();
    let b = 1.0 / lambda_max.sqrt();
    let theta = 0.5 * (-cxy).atan2(cyy - cxx);
    Ok((a, b, theta))
}

/// Sum pixel values over the elliptical aperture
/// `cxx dx^2 + cyy dy^2 + cxy dx dy <= r_scale^2` built from the shape
/// `(a, b, theta)` scaled by `r_scale`.
///
/// Boundary pixels are weighted on a `subpix x subpix` sample grid;
/// elliptical apertures have no exact mode (`subpix >= 1` required).
pub fn sum_ellipse(
    image: &ImageView,
    x: f64,
    y: f64,
    a: f64,
    b: f64,
    theta: f64,
    r_scale: f64,
    subpix: u32,
) -> Result<ApertureSum> {
    if !(r_scale > 0.0) {
        return Err(PleiadesError::IllegalArgument(format!(
            "aperture scale must be positive, got {r_scale}"
        )));
    }
    if subpix == 0 {
        return Err(PleiadesError::IllegalArgument(
            "exact overlap is only available for circular apertures".into(),
        ));
    }
    let (cxx, cyy, cxy) = ellipse_coeffs(a, b, theta)?;

    let (w, h) = (image.width as i64, image.height as i64);
    let rmajor = r_scale * a.max(b);
    // sqrt(Q) moves by at most |step| / min(a, b) across one pixel step.
    let half_diag = PIXEL_HALF_DIAG / a.min(b);
    let rin = (r_scale - half_diag).max(0.0);
    let rout = r_scale + half_diag;

    let ixmin = (x - rmajor - PIXEL_HALF_DIAG).ceil() as i64;
    let ixmax = (x + rmajor + PIXEL_HALF_DIAG).floor() as i64;
    let iymin = (y - rmajor - PIXEL_HALF_DIAG).ceil() as i64;
    let iymax = (y + rmajor + PIXEL_HALF_DIAG).floor() as i64;

    let mut sum = ApertureSum::default();
    if ixmin < 0 || iymin < 0 || ixmax >= w || iymax >= h {
        sum.flag |= flags::APER_TRUNC;
    }
    let x0 = ixmin.max(0);
    let x1 = ixmax.min(w - 1);
    let y0 = iymin.max(0);
    let y1 = iymax.min(h - 1);
    if x0 > x1 || y0 > y1 {
        return Ok(sum);
    }

    let mut err2 = 0.0f64;
    let mut contributing = 0usize;
    let mut masked = 0usize;
    let mut reader = RowReader::new(image);

    for iy in y0..=y1 {
        reader.load(image, iy as usize, x0 as usize, (x1 + 1) as usize);
        let dy = iy as f64 - y;
        for ix in x0..=x1 {
            let dx = ix as f64 - x;
            let q = (cxx * dx * dx + cyy * dy * dy + cxy * dx * dy).max(0.0).sqrt();
            let frac = if q > rout {
                continue;
            } else if q < rin {
                1.0
            } else {
                subsampled_fraction(dx, dy, cxx, cyy, cxy, r_scale, subpix)
            };
            if frac <= 0.0 {
                continue;
            }
            contributing += 1;
            if reader.masked(ix as usize, image.mask_thresh) {
                masked += 1;
                sum.flag |= flags::APER_HASMASKED;
                continue;
            }
            sum.flux += frac * reader.value(ix as usize);
            sum.area += frac;
            err2 += error_weight(&image.noise, frac) * reader.variance(ix as usize);
        }
    }

    if contributing > 0 && masked == contributing {
        sum.flag |= flags::APER_ALLMASKED;
    }
    sum.fluxerr = err2.max(0.0).sqrt();
    Ok(sum)
}

fn subsampled_fraction(
    dx: f64,
    dy: f64,
    cxx: f64,
    cyy: f64,
    cxy: f64,
    r_scale: f64,
    subpix: u32,
) -> f64 {
    let n = subpix as i64;
    let step = 1.0 / subpix as f64;
    let r2 = r_scale * r_scale;
    let mut inside = 0u64;
    for sy in 0..n {
        let oy = dy + (sy as f64 + 0.5) * step - 0.5;
        for sx in 0..n {
            let ox = dx + (sx as f64 + 0.5) * step - 0.5;
            if cxx * ox * ox + cyy * oy * oy + cxy * ox * oy <= r2 {
                inside += 1;
            }
        }
    }
    inside as f64 / (subpix as f64 * subpix as f64)
}
