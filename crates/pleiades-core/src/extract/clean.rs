//! Post-extraction cleaning.
//!
//! A surviving object whose detection only cleared the threshold because it
//! sits in the wings of a brighter neighbor is merged into that neighbor.
//! The neighbor's light profile is modelled as a Moffat function matched to
//! its measured flux, footprint and shape.

use tracing::debug;

use super::analyse::{analyse, preanalyse};
use super::object::{flags, ObjectList, RawObject};

/// Merge every shaded object into its shadower. `beta` is the Moffat
/// exponent (the `clean_param` option).
pub(super) fn clean(objlist: &mut ObjectList, beta: f64) {
    let before = objlist.objects.len();
    loop {
        let pair = find_shaded(&objlist.objects, beta);
        let (keeper, victim) = match pair {
            Some(p) => p,
            None => break,
        };

        let v = objlist.objects.remove(victim);
        let keeper = if keeper > victim { keeper - 1 } else { keeper };
        let k = &mut objlist.objects[keeper];
        objlist.plist.set_next(k.lastpix, v.firstpix);
        k.lastpix = v.lastpix;
        k.flag |= v.flag | flags::OBJ_MERGED;
        k.mthresh = k.mthresh.min(v.mthresh);
        let mut merged = RawObject::blank(k.thresh.min(v.thresh));
        merged.mthresh = k.mthresh;
        merged.flag = k.flag;
        merged.firstpix = k.firstpix;
        merged.lastpix = k.lastpix;
        preanalyse(&mut merged, &objlist.plist);
        analyse(&mut merged, &objlist.plist);
        *k = merged;
    }
    if objlist.objects.len() != before {
        debug!(
            merged = before - objlist.objects.len(),
            "cleaning merged marginal neighbors"
        );
    }
}

/// First (shadower, shaded) pair found, if any.
fn find_shaded(objs: &[RawObject], beta: f64) -> Option<(usize, usize)> {
    for i in 0..objs.len() {
        for j in 0..objs.len() {
            if i != j && shades(&objs[i], &objs[j], beta) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Would `victim` have been kept if `source`'s profile were subtracted?
fn shades(source: &RawObject, victim: &RawObject, beta: f64) -> bool {
    let a = source.a as f64;
    let b = source.b as f64;
    if a <= 0.0 || b <= 0.0 || source.fdnpix == 0 || source.thresh <= 0.0 {
        return false;
    }
    let unitarea = std::f64::consts::PI * a * b;
    let amp = source.fdflux / (2.0 * unitarea * source.abcor as f64);
    if amp <= victim.mthresh as f64 {
        return false;
    }
    let alpha = ((amp / source.thresh as f64).powf(1.0 / beta) - 1.0) * unitarea
        / source.fdnpix as f64;

    let dx = victim.mx - source.mx;
    let dy = victim.my - source.my;
    let r2 = source.cxx as f64 * dx * dx
        + source.cyy as f64 * dy * dy
        + source.cxy as f64 * dx * dy;
    let val = 1.0 + alpha * r2;
    if val <= 1.0 || val >= 1e10 {
        return false;
    }
    amp * val.powf(-beta) > victim.mthresh as f64
}
