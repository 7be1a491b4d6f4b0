//! Multi-threshold deblending.
//!
//! A detected group is re-extracted at a ladder of thresholds spaced
//! geometrically between the detection threshold and the group's peak.
//! Clumps that carry more than `deblend_cont` of the total flux at a level
//! where at least one sibling does the same become independent objects;
//! the faint pixels below every split level are handed to the most
//! probable branch afterwards.

use std::f64::consts::PI;

use tracing::debug;

use crate::consts::{NBRANCH, NSONMAX};

use super::analyse::{analyse, preanalyse};
use super::components::{labeled_components, NO_LABEL};
use super::object::{flags, RawObject};
use super::plist::{PixelList, PLIST_NONE};
use super::ExtractConfig;

struct Node {
    pixels: Vec<u32>,
    flux: f64,
    thresh: f32,
    children: Vec<usize>,
}

enum Descent {
    /// No split anywhere below: the subtree stays one object.
    Leaf(usize),
    /// The subtree splits into these promoted nodes.
    Branches(Vec<usize>),
}

/// Deblend one extracted group into its astrophysical components.
///
/// Returns the root itself (possibly flagged `OBJ_DOVERFLOW`) when nothing
/// splits or an internal bound is exceeded.
pub(super) fn deblend(
    root: RawObject,
    plist: &mut PixelList,
    config: &ExtractConfig,
) -> Vec<RawObject> {
    let nthresh = config.deblend_nthresh;
    let t0 = root.thresh as f64;
    let peak = root.fdpeak as f64;
    if nthresh < 2 || peak <= t0 || root.fdnpix < 2 * config.minarea {
        return vec![root];
    }

    let subw = (root.xmax - root.xmin + 1) as usize;
    let subh = (root.ymax - root.ymin + 1) as usize;
    let (x0, y0) = (root.xmin, root.ymin);

    // Rasterize the footprint for per-level re-extraction.
    let mut raster = vec![PLIST_NONE; subw * subh];
    let mut root_pixels = Vec::with_capacity(root.fdnpix);
    for idx in plist.chain(root.firstpix) {
        let rec = plist.get(idx);
        let cell = (rec.y - y0) as usize * subw + (rec.x - x0) as usize;
        raster[cell] = idx;
        root_pixels.push(idx);
    }

    let mut nodes: Vec<Node> = vec![Node {
        pixels: root_pixels,
        flux: root.fdflux,
        thresh: root.thresh,
        children: Vec::new(),
    }];
    // Maps raster cells to the owning node of the previous level.
    let mut prev_owner = vec![0u32; subw * subh];

    for k in 1..nthresh {
        let tk = if t0 > 0.0 {
            (t0 * (peak / t0).powf(k as f64 / nthresh as f64)) as f32
        } else {
            (t0 + (peak - t0) * k as f64 / nthresh as f64) as f32
        };

        // Every clump participates in the tree, however small; minarea is
        // enforced on the final branches after gatherup.
        let (subobjs, labels) = labeled_components(&raster, subw, subh, plist, tk, 1);
        if subobjs.is_empty() {
            break;
        }
        if subobjs.len() > NSONMAX {
            debug!(level = k, clumps = subobjs.len(), "deblend overflow");
            return overflow(root);
        }

        let mut owner = vec![0u32; subw * subh];
        for sub in subobjs {
            let parent_cell = {
                let rec = plist.get(sub.pixels[0]);
                (rec.y - y0) as usize * subw + (rec.x - x0) as usize
            };
            let parent_id = prev_owner[parent_cell] as usize;
            let id = nodes.len();
            nodes[parent_id].children.push(id);
            for &p in &sub.pixels {
                let rec = plist.get(p);
                let cell = (rec.y - y0) as usize * subw + (rec.x - x0) as usize;
                owner[cell] = id as u32;
            }
            nodes.push(Node {
                pixels: sub.pixels,
                flux: sub.flux,
                thresh: tk,
                children: Vec::new(),
            });
        }
        // Cells that fell below tk keep their previous owner; only cells
        // inside a level-k clump move down the tree.
        for (cell, &lbl) in labels.iter().enumerate() {
            if lbl == NO_LABEL {
                owner[cell] = prev_owner[cell];
            }
        }
        prev_owner = owner;
    }

    let min_flux = config.deblend_cont * root.fdflux;
    let branches = match descend(&nodes, 0, min_flux) {
        Descent::Leaf(_) => return vec![root],
        Descent::Branches(ids) => ids,
    };
    if branches.len() > NBRANCH {
        debug!(branches = branches.len(), "deblend branch overflow");
        return overflow(root);
    }

    gatherup(root, &nodes, &branches, raster, subw, subh, plist, config.minarea)
}

fn overflow(mut root: RawObject) -> Vec<RawObject> {
    root.flag |= flags::OBJ_DOVERFLOW;
    vec![root]
}

/// Walk the clump tree: a node splits where at least two of its children
/// carry significant flux; otherwise its identity continues downward.
fn descend(nodes: &[Node], id: usize, min_flux: f64) -> Descent {
    let significant: Vec<usize> = nodes[id]
        .children
        .iter()
        .copied()
        .filter(|&c| nodes[c].flux > min_flux)
        .collect();

    match significant.len() {
        0 => Descent::Leaf(id),
        1 => match descend(nodes, significant[0], min_flux) {
            Descent::Branches(b) => Descent::Branches(b),
            Descent::Leaf(_) => Descent::Leaf(id),
        },
        _ => {
            let mut out = Vec::new();
            for c in significant {
                match descend(nodes, c, min_flux) {
                    Descent::Leaf(l) => out.push(l),
                    Descent::Branches(b) => out.extend(b),
                }
            }
            Descent::Branches(out)
        }
    }
}

/// Build the final deblended objects: each branch keeps its own pixels,
/// every remaining root pixel goes to the branch with the highest
/// amplitude-weighted Gaussian score at that position. Falls back to the
/// undeblended root if any final branch would end up below `minarea`.
#[allow(clippy::too_many_arguments)]
fn gatherup(
    root: RawObject,
    nodes: &[Node],
    branches: &[usize],
    raster: Vec<u32>,
    subw: usize,
    subh: usize,
    plist: &mut PixelList,
    minarea: usize,
) -> Vec<RawObject> {
    let nb = branches.len();
    let mut objs: Vec<RawObject> = Vec::with_capacity(nb);
    let mut members: Vec<Vec<u32>> = Vec::with_capacity(nb);
    let mut amps: Vec<f64> = Vec::with_capacity(nb);
    let mut taken = vec![false; subw * subh];

    for &id in branches {
        let node = &nodes[id];
        let mut obj = RawObject::blank(root.thresh);
        obj.mthresh = node.thresh;
        obj.flag = root.flag | flags::OBJ_MERGED;
        link_chain(&mut obj, &node.pixels, plist);
        preanalyse(&mut obj, plist);
        analyse(&mut obj, plist);

        let spread = (obj.fdnpix as f64
            / (2.0 * PI * obj.abcor as f64 * obj.a as f64 * obj.b as f64))
            .min(70.0);
        amps.push(node.thresh as f64 * spread.exp());

        for &p in &node.pixels {
            let rec = plist.get(p);
            taken[(rec.y - root.ymin) as usize * subw + (rec.x - root.xmin) as usize] = true;
        }
        members.push(node.pixels.clone());
        objs.push(obj);
    }

    // Distribute the faint leftovers of the root footprint.
    for (cell, &idx) in raster.iter().enumerate() {
        if idx == PLIST_NONE || taken[cell] {
            continue;
        }
        let rec = plist.get(idx);
        let (px, py) = (rec.x as f64, rec.y as f64);
        let mut best = 0usize;
        let mut best_score = f64::NEG_INFINITY;
        for (b, obj) in objs.iter().enumerate() {
            let dx = px - obj.mx;
            let dy = py - obj.my;
            let r2 = obj.cxx as f64 * dx * dx
                + obj.cyy as f64 * dy * dy
                + obj.cxy as f64 * dx * dy;
            let score = amps[b] * (-r2 / 2.0).exp();
            if score > best_score {
                best_score = score;
                best = b;
            }
        }
        members[best].push(idx);
    }

    if members.iter().any(|m| m.len() < minarea) {
        // A branch fell below the detection floor; the partition is not
        // viable. Restore the root chain and emit it whole.
        let mut restored = root;
        link_chain(&mut restored, &nodes[0].pixels, plist);
        return vec![restored];
    }

    // Relink the final chains and refresh the aggregates.
    for (obj, pixels) in objs.iter_mut().zip(&members) {
        link_chain(obj, pixels, plist);
        *obj = {
            let mut fresh = RawObject::blank(root.thresh);
            fresh.mthresh = obj.mthresh;
            fresh.flag = obj.flag;
            fresh.firstpix = obj.firstpix;
            fresh.lastpix = obj.lastpix;
            fresh
        };
        preanalyse(obj, plist);
    }

    debug!(children = objs.len(), "group deblended");
    objs
}

/// Rewire the arena records in `pixels` into one chain owned by `obj`.
fn link_chain(obj: &mut RawObject, pixels: &[u32], plist: &mut PixelList) {
    obj.firstpix = PLIST_NONE;
    obj.lastpix = PLIST_NONE;
    for &p in pixels {
        if obj.firstpix == PLIST_NONE {
            obj.firstpix = p;
        } else {
            plist.set_next(obj.lastpix, p);
        }
        plist.set_next(p, PLIST_NONE);
        obj.lastpix = p;
    }
}
