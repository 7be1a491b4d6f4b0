//! Connected-component labeling over a rasterized pixel subset.
//!
//! Used by the deblender to re-extract a parent object's footprint at a
//! higher threshold. Two-pass labeling with union-find, 8-connectivity to
//! match the scanline scanner.

use super::plist::{PixelList, PLIST_NONE};

pub(super) const NO_LABEL: u32 = u32::MAX;

/// One re-extracted clump: arena indices of its member pixels and the
/// summed detection-plane flux.
pub(super) struct SubObject {
    pub pixels: Vec<u32>,
    pub flux: f64,
}

/// Label the cells of `raster` (a `subw x subh` grid of arena indices,
/// `PLIST_NONE` where empty) whose detection value exceeds `thresh`.
///
/// Returns the clumps with at least `minarea` pixels and a parallel label
/// grid (`NO_LABEL` for cells below threshold or in discarded clumps).
pub(super) fn labeled_components(
    raster: &[u32],
    subw: usize,
    subh: usize,
    plist: &PixelList,
    thresh: f32,
    minarea: usize,
) -> (Vec<SubObject>, Vec<u32>) {
    let above = |cell: u32| cell != PLIST_NONE && plist.cdvalue(cell) > thresh;

    let mut labels = vec![NO_LABEL; subw * subh];
    let mut parent: Vec<u32> = Vec::new();

    // Pass 1: provisional labels from the four already-visited neighbors.
    for y in 0..subh {
        for x in 0..subw {
            let i = y * subw + x;
            if !above(raster[i]) {
                continue;
            }

            let mut best = NO_LABEL;
            let mut neighbors = [NO_LABEL; 4];
            let mut n = 0;
            if x > 0 {
                neighbors[n] = labels[i - 1];
                n += 1;
            }
            if y > 0 {
                neighbors[n] = labels[i - subw];
                n += 1;
                if x > 0 {
                    neighbors[n] = labels[i - subw - 1];
                    n += 1;
                }
                if x + 1 < subw {
                    neighbors[n] = labels[i - subw + 1];
                    n += 1;
                }
            }
            for &lbl in &neighbors[..n] {
                if lbl != NO_LABEL && (best == NO_LABEL || lbl < best) {
                    best = lbl;
                }
            }

            if best == NO_LABEL {
                let lbl = parent.len() as u32;
                parent.push(lbl);
                labels[i] = lbl;
            } else {
                labels[i] = best;
                for &lbl in &neighbors[..n] {
                    if lbl != NO_LABEL && lbl != best {
                        union(&mut parent, best, lbl);
                    }
                }
            }
        }
    }

    // Flatten the union-find forest.
    for i in 0..parent.len() {
        parent[i] = find(&parent, i as u32);
    }

    // Pass 2: gather pixels per root label.
    let mut slot: Vec<u32> = vec![NO_LABEL; parent.len()];
    let mut subobjs: Vec<SubObject> = Vec::new();
    for i in 0..raster.len() {
        let lbl = labels[i];
        if lbl == NO_LABEL {
            continue;
        }
        let root = parent[lbl as usize];
        let s = if slot[root as usize] == NO_LABEL {
            slot[root as usize] = subobjs.len() as u32;
            subobjs.push(SubObject {
                pixels: Vec::new(),
                flux: 0.0,
            });
            slot[root as usize]
        } else {
            slot[root as usize]
        };
        let cell = raster[i];
        subobjs[s as usize].pixels.push(cell);
        subobjs[s as usize].flux += plist.cdvalue(cell) as f64;
        labels[i] = s;
    }

    // Drop clumps below minarea, compacting the surviving labels.
    let mut remap: Vec<u32> = vec![NO_LABEL; subobjs.len()];
    let mut kept: Vec<SubObject> = Vec::new();
    for (s, sub) in subobjs.into_iter().enumerate() {
        if sub.pixels.len() >= minarea {
            remap[s] = kept.len() as u32;
            kept.push(sub);
        }
    }
    for lbl in labels.iter_mut() {
        if *lbl != NO_LABEL {
            *lbl = remap[*lbl as usize];
        }
    }

    (kept, labels)
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}
