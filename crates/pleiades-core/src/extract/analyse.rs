//! Per-object aggregate statistics: footprint sums, barycenter, second
//! moments and the derived ellipse shape.

use crate::aperture::coeffs_from_shape;
use crate::consts::MOMENT_FLOOR;

use super::object::RawObject;
use super::plist::PixelList;

/// First pass over a fresh pixel chain: counts, fluxes, peaks and the
/// bounding box. Cheap enough to run on every deblending candidate.
pub(crate) fn preanalyse(obj: &mut RawObject, plist: &PixelList) {
    let mut fdnpix = 0usize;
    let mut fdflux = 0.0f64;
    let mut fdpeak = f32::NEG_INFINITY;
    let mut dpeak = f32::NEG_INFINITY;

    for idx in plist.chain(obj.firstpix) {
        let rec = plist.get(idx);
        let cd = plist.cdvalue(idx);
        fdnpix += 1;
        fdflux += cd as f64;
        if cd > fdpeak {
            fdpeak = cd;
            obj.xcpeak = rec.x;
            obj.ycpeak = rec.y;
        }
        if rec.value > dpeak {
            dpeak = rec.value;
            obj.xpeak = rec.x;
            obj.ypeak = rec.y;
        }
        obj.xmin = obj.xmin.min(rec.x);
        obj.xmax = obj.xmax.max(rec.x);
        obj.ymin = obj.ymin.min(rec.y);
        obj.ymax = obj.ymax.max(rec.y);
    }

    obj.fdnpix = fdnpix;
    obj.fdflux = fdflux;
    obj.fdpeak = if fdnpix > 0 { fdpeak } else { 0.0 };
    obj.dpeak = if fdnpix > 0 { dpeak } else { 0.0 };
}

/// Full analysis of a finished object: threshold-relative counts, flux
/// error accumulation, barycenter, second central moments (with the 1/12
/// quantization floor) and the ellipse parameters.
pub(crate) fn analyse(obj: &mut RawObject, plist: &PixelList) {
    let mut dnpix = 0usize;
    let mut dflux = 0.0f64;
    let mut fluxvar = 0.0f64;
    let mut sum = 0.0f64;
    let mut sumx = 0.0f64;
    let mut sumy = 0.0f64;
    let mut sumxx = 0.0f64;
    let mut sumyy = 0.0f64;
    let mut sumxy = 0.0f64;

    for idx in plist.chain(obj.firstpix) {
        let rec = plist.get(idx);
        let v = plist.cdvalue(idx) as f64;
        let x = rec.x as f64;
        let y = rec.y as f64;
        sum += v;
        sumx += v * x;
        sumy += v * y;
        sumxx += v * x * x;
        sumyy += v * y * y;
        sumxy += v * x * y;
        dflux += rec.value as f64;
        if rec.value > obj.thresh {
            dnpix += 1;
        }
        if let Some(var) = plist.variance(idx) {
            fluxvar += var as f64;
        }
    }

    obj.dnpix = dnpix;
    obj.dflux = dflux;
    obj.fluxvar = fluxvar;

    if sum > 0.0 {
        obj.mx = sumx / sum;
        obj.my = sumy / sum;
        obj.mx2 = (sumxx / sum - obj.mx * obj.mx).max(MOMENT_FLOOR);
        obj.my2 = (sumyy / sum - obj.my * obj.my).max(MOMENT_FLOOR);
        obj.mxy = sumxy / sum - obj.mx * obj.my;
    } else {
        // Degenerate footprint: fall back to the bounding-box center.
        obj.mx = (obj.xmin + obj.xmax) as f64 / 2.0;
        obj.my = (obj.ymin + obj.ymax) as f64 / 2.0;
        obj.mx2 = MOMENT_FLOOR;
        obj.my2 = MOMENT_FLOOR;
        obj.mxy = 0.0;
    }

    let p = (obj.mx2 + obj.my2) / 2.0;
    let q = ((obj.mx2 - obj.my2) / 2.0).hypot(obj.mxy);
    let a2 = p + q;
    let b2 = p - q;
    if a2 <= 0.0 || b2 <= 0.0 || sum <= 0.0 {
        obj.singuflag = true;
        obj.a = MOMENT_FLOOR.sqrt() as f32;
        obj.b = obj.a;
        obj.theta = 0.0;
    } else {
        obj.a = a2.sqrt() as f32;
        obj.b = b2.sqrt() as f32;
        obj.theta = (0.5 * (2.0 * obj.mxy).atan2(obj.mx2 - obj.my2)) as f32;
    }

    let (cxx, cyy, cxy) = coeffs_from_shape(obj.a as f64, obj.b as f64, obj.theta as f64);
    obj.cxx = cxx as f32;
    obj.cyy = cyy as f32;
    obj.cxy = cxy as f32;
}
