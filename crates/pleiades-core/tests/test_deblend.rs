mod common;

use approx::assert_abs_diff_eq;

use common::{add_gaussian, add_noise, constant, view};
use pleiades_core::extract::{extract, flags, ExtractConfig, Source};

fn blend_image() -> (ndarray::Array2<f32>, (f64, f64), (f64, f64)) {
    // Two sigma=1 Gaussians of peak 100, three pixels apart, on unit noise.
    let c1 = (30.0, 32.0);
    let c2 = (33.0, 32.0);
    let mut im = constant(64, 64, 0.0);
    add_noise(&mut im, 1.0, 17);
    add_gaussian(&mut im, c1.0, c1.1, 1.0, 100.0);
    add_gaussian(&mut im, c2.0, c2.1, 1.0, 100.0);
    (im, c1, c2)
}

fn config(cont: f64) -> ExtractConfig {
    ExtractConfig {
        thresh: 1.5,
        deblend_nthresh: 32,
        deblend_cont: cont,
        // Keep the two contrast runs byte-comparable.
        clean: false,
        ..ExtractConfig::default()
    }
}

fn bright(sources: &[Source]) -> Vec<&Source> {
    // The pair dominates the frame; ignore any faint noise detection.
    sources.iter().filter(|s| s.peak > 50.0).collect()
}

#[test]
fn test_blended_pair_splits_at_low_contrast() {
    let (im, c1, c2) = blend_image();
    let sources = extract(&view(&im), None, &config(0.005)).unwrap();
    let pair = bright(&sources);
    assert_eq!(pair.len(), 2, "sources: {sources:?}");

    let mut xs: Vec<f64> = pair.iter().map(|s| s.x).collect();
    xs.sort_by(f64::total_cmp);
    assert_abs_diff_eq!(xs[0], c1.0, epsilon = 0.8);
    assert_abs_diff_eq!(xs[1], c2.0, epsilon = 0.8);
    for s in &pair {
        assert_ne!(s.flag & flags::OBJ_MERGED, 0);
        assert_abs_diff_eq!(s.y, c1.1, epsilon = 0.8);
    }
}

#[test]
fn test_blended_pair_stays_whole_at_high_contrast() {
    let (im, c1, c2) = blend_image();
    let sources = extract(&view(&im), None, &config(0.5)).unwrap();
    let pair = bright(&sources);
    assert_eq!(pair.len(), 1, "sources: {sources:?}");
    // Barycenter of the merged pair sits between the two peaks.
    let mid = (c1.0 + c2.0) / 2.0;
    assert_abs_diff_eq!(pair[0].x, mid, epsilon = 0.8);
}

#[test]
fn test_children_partition_parent_flux() {
    let (im, ..) = blend_image();
    let whole = extract(&view(&im), None, &config(0.5)).unwrap();
    let split = extract(&view(&im), None, &config(0.005)).unwrap();

    let parent = bright(&whole);
    let children = bright(&split);
    assert_eq!(parent.len(), 1);
    assert_eq!(children.len(), 2);

    // Same footprint, redistributed: fluxes and pixel counts add up.
    let child_flux: f64 = children.iter().map(|s| s.flux).sum();
    assert_abs_diff_eq!(child_flux, parent[0].flux, epsilon = 1e-3);
    let child_npix: usize = children.iter().map(|s| s.npix).sum();
    assert_eq!(child_npix, parent[0].npix);
}

#[test]
fn test_children_stay_inside_parent_bbox() {
    let (im, ..) = blend_image();
    let whole = extract(&view(&im), None, &config(0.5)).unwrap();
    let split = extract(&view(&im), None, &config(0.005)).unwrap();
    let parent = bright(&whole)[0].clone();

    for child in bright(&split) {
        assert!(child.xmin >= parent.xmin);
        assert!(child.xmax <= parent.xmax);
        assert!(child.ymin >= parent.ymin);
        assert!(child.ymax <= parent.ymax);
        assert!(child.npix >= 5);
    }
}

#[test]
fn test_single_peak_never_splits() {
    let mut im = constant(64, 64, 0.0);
    add_gaussian(&mut im, 32.0, 32.0, 2.0, 500.0);
    let sources = extract(&view(&im), None, &config(0.005)).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].flag & flags::OBJ_MERGED, 0);
}

#[test]
fn test_deblend_overflow_flag_absent_on_normal_fields() {
    let (im, ..) = blend_image();
    let sources = extract(&view(&im), None, &config(0.005)).unwrap();
    for s in &sources {
        assert_eq!(s.flag & flags::OBJ_DOVERFLOW, 0);
    }
}
