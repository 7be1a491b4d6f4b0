mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use common::{add_box, add_noise, constant, ones, view};
use pleiades_core::background::{make_background, BackgroundConfig};
use pleiades_core::{Noise, PixelData, PixelDataMut, PleiadesError};

fn config(cell: usize) -> BackgroundConfig {
    BackgroundConfig {
        cell_w: cell,
        cell_h: cell,
        ..BackgroundConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Constancy (flat fields)
// ---------------------------------------------------------------------------

#[test]
fn test_constant_image_globals() {
    let im = constant(256, 256, 3.25);
    let bkg = make_background(&view(&im), &config(64)).unwrap();
    assert_abs_diff_eq!(bkg.global_back(), 3.25, epsilon = 1e-4);
    assert!(bkg.global_rms() < 1e-4, "rms = {}", bkg.global_rms());
    assert_eq!(bkg.grid_size(), (4, 4));
    assert_eq!(bkg.cell_size(), (64, 64));
}

#[test]
fn test_constant_image_surface() {
    let im = constant(128, 96, -7.5);
    let bkg = make_background(&view(&im), &config(32)).unwrap();
    let surface = bkg.back_array();
    assert_eq!(surface.dim(), (128, 96));
    for &v in surface.iter() {
        assert_abs_diff_eq!(v, -7.5, epsilon = 1e-4);
    }
}

#[test]
fn test_subtract_leaves_small_residual() {
    let mut im = constant(256, 256, 10.0);
    let bkg = make_background(&view(&im), &config(64)).unwrap();
    bkg.subtract_array(&mut im).unwrap();
    for &v in im.iter() {
        assert!(v.abs() < 1e-4, "residual {v}");
    }
}

#[test]
fn test_subtract_matches_evaluated_surface() {
    let mut im = ones(96, 96);
    add_noise(&mut im, 0.5, 11);
    let bkg = make_background(&view(&im), &config(32)).unwrap();

    let mut manual = im.clone();
    let surface = bkg.back_array();
    for (m, s) in manual.iter_mut().zip(surface.iter()) {
        *m -= s;
    }

    bkg.subtract_array(&mut im).unwrap();
    for (a, b) in im.iter().zip(manual.iter()) {
        assert_eq!(a, b);
    }
}

#[test]
fn test_subtract_f64_buffer() {
    let im = constant(64, 64, 2.0);
    let bkg = make_background(&view(&im), &config(32)).unwrap();
    let mut data = vec![5.0f64; 64 * 64];
    bkg.subtract_from(PixelDataMut::F64(&mut data)).unwrap();
    for &v in &data {
        assert_abs_diff_eq!(v, 3.0, epsilon = 1e-4);
    }
}

// ---------------------------------------------------------------------------
// Gradients and noise
// ---------------------------------------------------------------------------

#[test]
fn test_linear_gradient_is_tracked() {
    // back(x, y) = 2 + 0.01 x + 0.02 y; natural splines reproduce linear
    // node values exactly, so the surface should stay close everywhere.
    let mut im = Array2::<f32>::zeros((192, 192));
    for y in 0..192 {
        for x in 0..192 {
            im[[y, x]] = 2.0 + 0.01 * x as f32 + 0.02 * y as f32;
        }
    }
    let bkg = make_background(&view(&im), &config(32)).unwrap();
    let mut line = vec![0.0f32; 192];
    for &y in &[5usize, 96, 186] {
        bkg.back_line(y, &mut line).unwrap();
        for (x, &v) in line.iter().enumerate() {
            let expected = 2.0 + 0.01 * x as f32 + 0.02 * y as f32;
            assert_abs_diff_eq!(v, expected, epsilon = 0.05);
        }
    }
}

#[test]
fn test_rms_tracks_noise_sigma() {
    let mut im = constant(256, 256, 100.0);
    add_noise(&mut im, 2.0, 7);
    let bkg = make_background(&view(&im), &config(64)).unwrap();
    // Clipping biases the measured sigma slightly low.
    assert!(
        (bkg.global_rms() - 2.0).abs() < 0.4,
        "global rms = {}",
        bkg.global_rms()
    );
    assert_abs_diff_eq!(bkg.global_back(), 100.0, epsilon = 0.5);
}

#[test]
fn test_bright_source_rejected_from_cells() {
    let mut im = ones(256, 256);
    add_box(&mut im, 128, 128, 5, 1000.0);
    let bkg = make_background(&view(&im), &config(64)).unwrap();
    // The 10x10 box is clipped out of its cell.
    assert_abs_diff_eq!(bkg.global_back(), 1.0, epsilon = 1e-3);
    assert!(bkg.global_rms() < 1e-3);
}

#[test]
fn test_partial_edge_cells() {
    // 100 is not a multiple of 64: the last row/column of cells is partial
    // but still produces estimates.
    let im = constant(100, 100, 4.0);
    let bkg = make_background(&view(&im), &config(64)).unwrap();
    assert_eq!(bkg.grid_size(), (2, 2));
    assert_abs_diff_eq!(bkg.global_back(), 4.0, epsilon = 1e-4);
}

// ---------------------------------------------------------------------------
// Masks
// ---------------------------------------------------------------------------

#[test]
fn test_masked_pixels_ignored() {
    let mut im = constant(128, 128, 5.0);
    // Poison a patch, then mask it out.
    add_box(&mut im, 20, 20, 8, 500.0);
    let mut mask = vec![0u8; 128 * 128];
    for y in 0..40 {
        for x in 0..40 {
            mask[y * 128 + x] = 1;
        }
    }
    let v = view(&im).with_mask(PixelData::U8(&mask), 1.0).unwrap();
    let bkg = make_background(&v, &config(32)).unwrap();
    assert_abs_diff_eq!(bkg.global_back(), 5.0, epsilon = 1e-3);
}

#[test]
fn test_fully_masked_image_fails() {
    let im = constant(64, 64, 5.0);
    let mask = vec![1u8; 64 * 64];
    let v = view(&im).with_mask(PixelData::U8(&mask), 1.0).unwrap();
    let err = make_background(&v, &config(32)).unwrap_err();
    assert!(matches!(err, PleiadesError::MeshTooSmall { .. }));
}

// ---------------------------------------------------------------------------
// Argument validation
// ---------------------------------------------------------------------------

#[test]
fn test_even_filter_size_rejected() {
    let im = ones(64, 64);
    let cfg = BackgroundConfig {
        filter_w: 2,
        ..config(32)
    };
    let err = make_background(&view(&im), &cfg).unwrap_err();
    assert!(matches!(err, PleiadesError::IllegalArgument(_)));
}

#[test]
fn test_tiny_mesh_rejected() {
    let im = ones(64, 64);
    let err = make_background(&view(&im), &config(1)).unwrap_err();
    assert!(matches!(err, PleiadesError::MeshTooSmall { .. }));
}

#[test]
fn test_zero_extent_rejected() {
    let data: Vec<f32> = Vec::new();
    let err = pleiades_core::ImageView::new(PixelData::F32(&data), 0, 0).unwrap_err();
    assert!(matches!(err, PleiadesError::InvalidDimensions { .. }));

    let data = vec![0.0f32; 8];
    let err = pleiades_core::ImageView::new(PixelData::F32(&data), 4, 4).unwrap_err();
    assert!(matches!(err, PleiadesError::ShapeMismatch { .. }));
}

#[test]
fn test_noise_shape_mismatch_rejected() {
    let im = ones(32, 32);
    let noise = vec![1.0f32; 16];
    let err = view(&im)
        .with_noise(Noise::Map {
            data: PixelData::F32(&noise),
            kind: pleiades_core::NoiseKind::Stddev,
        })
        .unwrap_err();
    assert!(matches!(err, PleiadesError::ShapeMismatch { .. }));
}

#[test]
fn test_line_out_of_range_rejected() {
    let im = ones(64, 64);
    let bkg = make_background(&view(&im), &config(32)).unwrap();
    let mut line = vec![0.0f32; 64];
    assert!(bkg.back_line(64, &mut line).is_err());
    assert!(bkg.rms_line(0, &mut line).is_ok());
}
