mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use common::{constant, view};
use pleiades_core::convolve::{convolve_image, Kernel};

#[test]
fn test_delta_image_reproduces_kernel() {
    let mut im = Array2::<f32>::zeros((9, 9));
    im[[4, 4]] = 1.0;
    let kernel = Kernel::new(vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0], 3, 3).unwrap();
    let out = convolve_image(&view(&im), &kernel).unwrap();

    // The kernel is mirrored around the delta; this one is symmetric.
    let expected = [
        (3usize, 3usize, 1.0f32),
        (3, 4, 2.0),
        (3, 5, 1.0),
        (4, 3, 2.0),
        (4, 4, 4.0),
        (4, 5, 2.0),
        (5, 4, 2.0),
    ];
    for &(y, x, v) in &expected {
        assert_abs_diff_eq!(out[y * 9 + x], v, epsilon = 1e-6);
    }
    assert_abs_diff_eq!(out[0], 0.0, epsilon = 1e-6);
    let total: f32 = out.iter().sum();
    assert_abs_diff_eq!(total, 16.0, epsilon = 1e-5);
}

#[test]
fn test_flat_image_zero_padding_at_edges() {
    let im = constant(8, 8, 1.0);
    let kernel = Kernel::default_filter();
    let out = convolve_image(&view(&im), &kernel).unwrap();
    // Interior: full kernel weight (16); corner: the 2x2 overlap (4+2+2+1).
    assert_abs_diff_eq!(out[3 * 8 + 3], 16.0, epsilon = 1e-5);
    assert_abs_diff_eq!(out[0], 9.0, epsilon = 1e-5);
    assert_abs_diff_eq!(out[7], 9.0, epsilon = 1e-5);
    assert_abs_diff_eq!(out[7 * 8], 9.0, epsilon = 1e-5);
    // Edge (non-corner): a 2x3 overlap.
    assert_abs_diff_eq!(out[3], 12.0, epsilon = 1e-5);
}

#[test]
fn test_one_dimensional_kernel() {
    let mut im = Array2::<f32>::zeros((5, 5));
    im[[2, 2]] = 3.0;
    let kernel = Kernel::new(vec![1.0, 1.0, 1.0], 3, 1).unwrap();
    let out = convolve_image(&view(&im), &kernel).unwrap();
    assert_abs_diff_eq!(out[2 * 5 + 1], 3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(out[2 * 5 + 2], 3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(out[2 * 5 + 3], 3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(out[1 * 5 + 2], 0.0, epsilon = 1e-6);
}
