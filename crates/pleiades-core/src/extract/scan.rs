//! Single-pass connected-component scan (Lutz 1980).
//!
//! The image is walked top to bottom, one line at a time plus one virtual
//! closing line. A per-column marker array carries segment boundaries from
//! one line to the next; a status stack tracks the nesting of in-progress
//! objects. Pixel records are appended to the arena as they are classified
//! and spliced into per-object chains in O(1).

use tracing::debug;

use crate::buffer::ImageView;
use crate::convolve::{convolve_row, Kernel};
use crate::error::{PleiadesError, Result};

use super::analyse::{analyse, preanalyse};
use super::deblend::deblend;
use super::object::{flags, ObjectList, RawObject};
use super::plist::{PixelList, PLIST_NONE};
use super::{ExtractConfig, FilterKind, ThreshKind};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PixStatus {
    Complete,
    Incomplete,
    Object,
    NonObject,
}

/// Scanline state of one in-progress object.
#[derive(Clone, Copy, Debug)]
struct Info {
    pixnb: u32,
    firstpix: u32,
    lastpix: u32,
    flag: u16,
}

impl Info {
    const BLANK: Info = Info {
        pixnb: 0,
        firstpix: PLIST_NONE,
        lastpix: PLIST_NONE,
        flag: 0,
    };
}

/// Merge `src` into `dst`, splicing the pixel chains.
fn update(dst: &mut Info, src: &Info, plist: &mut PixelList) {
    dst.pixnb += src.pixnb;
    dst.flag |= src.flag;
    if dst.firstpix == PLIST_NONE {
        dst.firstpix = src.firstpix;
        dst.lastpix = src.lastpix;
    } else if src.lastpix != PLIST_NONE {
        plist.set_next(dst.lastpix, src.firstpix);
        dst.lastpix = src.lastpix;
    }
}

const UNKNOWN: i32 = -1;

/// Markers carried from one scanline to the next.
const M_NONE: u8 = 0;
const M_START: u8 = b'S';
const M_START2: u8 = b's';
const M_END_TMP: u8 = b'f';
const M_END: u8 = b'F';

/// Run the full scan over `image` and return the finished object list.
pub(super) fn scan_image(
    image: &ImageView,
    kernel: Option<&Kernel>,
    config: &ExtractConfig,
) -> Result<ObjectList> {
    let (w, h) = (image.width, image.height);
    let has_noise = !image.noise.is_none();
    let matched = kernel.is_some() && has_noise && config.filter_kind == FilterKind::Matched;
    let relative = config.thresh_kind == ThreshKind::Relative;
    if relative && !has_noise {
        return Err(PleiadesError::IllegalArgument(
            "relative thresholds require a noise companion".into(),
        ));
    }
    let varying_thresh = matched || relative;

    let plist = PixelList::new(
        config.pixel_stack,
        kernel.is_some(),
        has_noise,
        varying_thresh,
    )?;
    let mut objlist = ObjectList {
        objects: Vec::new(),
        plist,
        thresh: config.thresh,
    };

    // Squared kernel for the variance of the filtered plane.
    let sq_kernel = if matched {
        kernel.map(|k| k.squared())
    } else {
        None
    };

    // Scanline buffers.
    let mut scan = vec![0.0f32; w];
    let mut cdscan = vec![0.0f32; w];
    let mut var_row = vec![0.0f32; w];
    let mut cdvar = vec![0.0f32; w];
    let mut mask_row = vec![0.0f32; w];
    let kh = kernel.map_or(1, Kernel::height);
    let mut window: Vec<Vec<f32>> = vec![vec![0.0f32; w]; kh];
    let mut var_window: Vec<Vec<f32>> = vec![vec![0.0f32; w]; kh];

    // Lutz state.
    let mut marker = vec![M_NONE; w + 1];
    let mut info = vec![Info::BLANK; w + 1];
    let mut store = vec![Info::BLANK; w + 1];
    let mut start = vec![UNKNOWN; w + 1];
    let mut end = vec![UNKNOWN; w + 1];
    let mut psstack: Vec<PixStatus> = Vec::with_capacity(2 * w + 4);
    let mut co: i32 = -1;

    let underflow = || PleiadesError::InternalOverflow("pixel status stack");

    for yl in 0..=h {
        let in_frame = yl < h;
        if in_frame {
            image.fill_row(yl, &mut scan);
            let has_mask = image.fill_mask_row(yl, &mut mask_row);
            if !has_mask {
                mask_row.fill(f32::NEG_INFINITY);
            }
            if has_noise {
                image.fill_variance_row(yl, &mut var_row);
            }
            if let Some(k) = kernel {
                fill_window(image, yl, &mut window);
                let refs = window_refs(&window, yl, h, kh);
                convolve_row(&refs, k, &mut cdscan);
                if let Some(sq) = &sq_kernel {
                    fill_variance_window(image, yl, &mut var_window);
                    let vrefs = window_refs(&var_window, yl, h, kh);
                    convolve_row(&vrefs, sq, &mut cdvar);
                }
            } else {
                cdscan.copy_from_slice(&scan);
            }
        }

        let mut cs = PixStatus::NonObject;
        let mut ps = PixStatus::Complete;

        for xl in 0..=w {
            let newmarker = marker[xl];
            marker[xl] = M_NONE;

            let (luflag, cut) = if in_frame && xl < w {
                let cut = if matched {
                    config.thresh * cdvar[xl].max(0.0).sqrt()
                } else if relative {
                    config.thresh * var_row[xl].max(0.0).sqrt()
                } else {
                    config.thresh
                };
                let unmasked = image.mask.is_none() || mask_row[xl] < image.mask_thresh;
                (cdscan[xl] > cut && unmasked, cut)
            } else {
                (false, config.thresh)
            };

            if luflag {
                let trunc = if xl == 0 || xl == w - 1 || yl == 0 || yl == h - 1 {
                    flags::OBJ_TRUNC
                } else {
                    0
                };
                let var = if has_noise { var_row[xl] } else { 0.0 };
                let pix = objlist
                    .plist
                    .push(xl as i32, yl as i32, scan[xl], cdscan[xl], var, cut)?;
                let curpix = Info {
                    pixnb: 1,
                    firstpix: pix,
                    lastpix: pix,
                    flag: trunc,
                };
                if cs != PixStatus::Object {
                    // Start of a segment.
                    cs = PixStatus::Object;
                    if ps == PixStatus::Object {
                        if start[co as usize] == UNKNOWN {
                            marker[xl] = M_START;
                            start[co as usize] = xl as i32;
                        } else {
                            marker[xl] = M_START2;
                        }
                    } else {
                        psstack.push(ps);
                        marker[xl] = M_START;
                        co += 1;
                        if co as usize >= info.len() {
                            return Err(PleiadesError::InternalOverflow("object info stack"));
                        }
                        start[co as usize] = xl as i32;
                        ps = PixStatus::Complete;
                        info[co as usize] = Info::BLANK;
                    }
                }
                update(&mut info[co as usize], &curpix, &mut objlist.plist);
            }

            if newmarker != M_NONE {
                match newmarker {
                    M_START => {
                        psstack.push(ps);
                        if cs == PixStatus::NonObject {
                            psstack.push(PixStatus::Complete);
                            co += 1;
                            if co as usize >= info.len() {
                                return Err(PleiadesError::InternalOverflow(
                                    "object info stack",
                                ));
                            }
                            info[co as usize] = store[xl];
                            start[co as usize] = UNKNOWN;
                        } else {
                            let stored = store[xl];
                            update(&mut info[co as usize], &stored, &mut objlist.plist);
                        }
                        ps = PixStatus::Object;
                    }
                    M_START2 => {
                        if cs == PixStatus::Object && ps == PixStatus::Complete {
                            psstack.pop().ok_or_else(underflow)?;
                            if co < 1 {
                                return Err(underflow());
                            }
                            let xl2 = start[co as usize];
                            let merged = info[co as usize];
                            update(&mut info[co as usize - 1], &merged, &mut objlist.plist);
                            co -= 1;
                            if start[co as usize] == UNKNOWN {
                                start[co as usize] = xl2;
                            } else {
                                marker[xl2 as usize] = M_START2;
                            }
                        }
                        ps = PixStatus::Object;
                    }
                    M_END_TMP => ps = PixStatus::Incomplete,
                    _ => {
                        // M_END: a previous-line object finally ends here.
                        ps = psstack.pop().ok_or_else(underflow)?;
                        if cs == PixStatus::NonObject && ps == PixStatus::Complete {
                            if co < 0 {
                                return Err(underflow());
                            }
                            if start[co as usize] == UNKNOWN {
                                let finished = info[co as usize];
                                finish_object(&finished, &mut objlist, config)?;
                            } else {
                                marker[end[co as usize] as usize] = M_END;
                                store[start[co as usize] as usize] = info[co as usize];
                            }
                            co -= 1;
                            ps = psstack.pop().ok_or_else(underflow)?;
                        }
                    }
                }
            }

            if !luflag && cs == PixStatus::Object {
                // End of the current segment.
                cs = PixStatus::NonObject;
                if ps != PixStatus::Complete {
                    marker[xl] = M_END_TMP;
                    end[co as usize] = xl as i32;
                } else {
                    ps = psstack.pop().ok_or_else(underflow)?;
                    marker[xl] = M_END;
                    store[start[co as usize] as usize] = info[co as usize];
                    co -= 1;
                }
            }
        }
    }

    debug!(
        objects = objlist.objects.len(),
        pixels = objlist.plist.len(),
        "scan finished"
    );
    Ok(objlist)
}

/// Convert the raw rows of the convolution window centered on `y`.
fn fill_window(image: &ImageView, y: usize, window: &mut [Vec<f32>]) {
    let kh = window.len();
    let hh = kh / 2;
    for (ky, buf) in window.iter_mut().enumerate() {
        let yy = y as isize + ky as isize - hh as isize;
        if yy >= 0 && (yy as usize) < image.height {
            image.fill_row(yy as usize, buf);
        }
    }
}

fn fill_variance_window(image: &ImageView, y: usize, window: &mut [Vec<f32>]) {
    let kh = window.len();
    let hh = kh / 2;
    for (ky, buf) in window.iter_mut().enumerate() {
        let yy = y as isize + ky as isize - hh as isize;
        if yy >= 0 && (yy as usize) < image.height {
            image.fill_variance_row(yy as usize, buf);
        }
    }
}

fn window_refs<'a>(
    window: &'a [Vec<f32>],
    y: usize,
    h: usize,
    kh: usize,
) -> Vec<Option<&'a [f32]>> {
    let hh = kh / 2;
    window
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
        .collect()
}

/// A group has closed: discard it or deblend, analyse and record it.
fn finish_object(info: &Info, objlist: &mut ObjectList, config: &ExtractConfig) -> Result<()> {
    if (info.pixnb as usize) < config.minarea {
        objlist.plist.free_chain(info.firstpix, info.lastpix);
        return Ok(());
    }

    let mut obj = RawObject::blank(config.thresh);
    obj.firstpix = info.firstpix;
    obj.lastpix = info.lastpix;
    obj.flag = info.flag;

    // With spatially varying thresholds the object's own threshold is the
    // faintest cut inside its footprint.
    let mut tmin = f32::INFINITY;
    for idx in objlist.plist.chain(obj.firstpix) {
        tmin = tmin.min(objlist.plist.thresh(idx, config.thresh));
    }
    obj.thresh = tmin;
    obj.mthresh = tmin;

    preanalyse(&mut obj, &objlist.plist);

    let children = deblend(obj, &mut objlist.plist, config);
    for mut child in children {
        analyse(&mut child, &objlist.plist);
        objlist.objects.push(child);
    }
    Ok(())
}
