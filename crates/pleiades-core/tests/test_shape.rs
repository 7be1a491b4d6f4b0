use approx::assert_abs_diff_eq;

use pleiades_core::aperture::{ellipse_axes, ellipse_coeffs};
use pleiades_core::PleiadesError;

#[test]
fn test_round_trip_recovers_shape() {
    for &(a, b, theta) in &[
        (3.0, 1.5, 0.7),
        (2.0, 2.0, 0.0),
        (10.0, 0.5, -1.2),
        (4.0, 3.9, 1.5),
        (1.0, 0.1, 0.0),
    ] {
        let (cxx, cyy, cxy) = ellipse_coeffs(a, b, theta).unwrap();
        let (a2, b2, theta2) = ellipse_axes(cxx, cyy, cxy).unwrap();
        assert_abs_diff_eq!(a2, a, epsilon = 1e-9);
        assert_abs_diff_eq!(b2, b, epsilon = 1e-9);
        // Compare angles through the coefficients to stay clear of the
        // quadrant convention (theta and theta +/- pi are the same ellipse;
        // so is any angle for a circle).
        let (cxx2, cyy2, cxy2) = ellipse_coeffs(a2, b2, theta2).unwrap();
        assert_abs_diff_eq!(cxx2, cxx, epsilon = 1e-9);
        assert_abs_diff_eq!(cyy2, cyy, epsilon = 1e-9);
        assert_abs_diff_eq!(cxy2, cxy, epsilon = 1e-9);
    }
}

#[test]
fn test_axes_are_sorted_and_angle_in_range() {
    // Swapped input axes: the inverse returns the major axis first and an
    // angle rotated into (-pi/2, pi/2].
    let (cxx, cyy, cxy) = ellipse_coeffs(1.5, 3.0, 0.4).unwrap();
    let (a, b, theta) = ellipse_axes(cxx, cyy, cxy).unwrap();
    assert_abs_diff_eq!(a, 3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(b, 1.5, epsilon = 1e-9);
    assert!(theta > -std::f64::consts::FRAC_PI_2);
    assert!(theta <= std::f64::consts::FRAC_PI_2);
}

#[test]
fn test_unit_circle_coefficients() {
    let (cxx, cyy, cxy) = ellipse_coeffs(1.0, 1.0, 0.0).unwrap();
    assert_abs_diff_eq!(cxx, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(cyy, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(cxy, 0.0, epsilon = 1e-12);
}

#[test]
fn test_zero_axis_rejected() {
    assert!(matches!(
        ellipse_coeffs(0.0, 1.0, 0.0).unwrap_err(),
        PleiadesError::IllegalArgument(_)
    ));
    assert!(ellipse_coeffs(1.0, -2.0, 0.0).is_err());
}

#[test]
fn test_degenerate_conic_rejected() {
    assert!(ellipse_axes(0.0, 0.0, 0.0).is_err());
    // A hyperbola is not an ellipse.
    assert!(ellipse_axes(1.0, -1.0, 0.0).is_err());
}
