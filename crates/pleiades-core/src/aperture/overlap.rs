//! Exact area of intersection between a circle and an axis-aligned
//! rectangle, via decomposition into triangles and circular segments.

/// Area of the circular segment cut off by the chord from `(x0, y0)` to
/// `(x1, y1)`, both on the circle of radius `r` centered at the origin.
fn area_arc(x0: f64, y0: f64, x1: f64, y1: f64, r: f64) -> f64 {
    let chord = (x1 - x0).hypot(y1 - y0);
    let theta = 2.0 * (0.5 * chord / r).clamp(-1.0, 1.0).asin();
    0.5 * r * r * (theta - theta.sin())
}

fn area_triangle(x0: f64, y0: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    0.5 * ((x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0)).abs()
}

/// Overlap of `[xmin, xmax] x [ymin, ymax]` with the circle, for a
/// rectangle lying entirely in the first quadrant (`0 <= xmin`,
/// `0 <= ymin`).
fn overlap_core(xmin: f64, ymin: f64, xmax: f64, ymax: f64, r: f64) -> f64 {
    if xmin * xmin + ymin * ymin > r * r {
        return 0.0;
    }
    if xmax * xmax + ymax * ymax < r * r {
        return (xmax - xmin) * (ymax - ymin);
    }

    let d1 = (xmax * xmax + ymin * ymin).sqrt();
    let d2 = (xmin * xmin + ymax * ymax).sqrt();
    if d1 < r && d2 < r {
        // Only the far corner sticks out.
        let (x1, y1) = ((r * r - ymax * ymax).sqrt(), ymax);
        let (x2, y2) = (xmax, (r * r - xmax * xmax).sqrt());
        (xmax - xmin) * (ymax - ymin) - area_triangle(x1, y1, x2, y2, xmax, ymax)
            + area_arc(x1, y1, x2, y2, r)
    } else if d1 < r {
        // Crosses the left and right edges.
        let (x1, y1) = (xmin, (r * r - xmin * xmin).sqrt());
        let (x2, y2) = (xmax, (r * r - xmax * xmax).sqrt());
        area_arc(x1, y1, x2, y2, r)
            + area_triangle(x1, y1, x1, ymin, xmax, ymin)
            + area_triangle(x1, y1, x2, ymin, x2, y2)
    } else if d2 < r {
        // Crosses the top and bottom edges.
        let (x1, y1) = ((r * r - ymax * ymax).sqrt(), ymax);
        let (x2, y2) = ((r * r - ymin * ymin).sqrt(), ymin);
        area_arc(x1, y1, x2, y2, r)
            + area_triangle(x1, y1, xmin, y1, xmin, ymin)
            + area_triangle(x1, y1, xmin, ymin, x2, y2)
    } else {
        // Only the near corner is inside.
        let (x1, y1) = ((r * r - ymin * ymin).sqrt(), ymin);
        let (x2, y2) = (xmin, (r * r - xmin * xmin).sqrt());
        area_arc(x1, y1, x2, y2, r) + area_triangle(x1, y1, x2, y2, xmin, ymin)
    }
}

/// Overlap of an arbitrary rectangle with the circle of radius `r`
/// centered at the origin. Folds the rectangle into the first quadrant,
/// splitting at the axes where necessary.
pub(super) fn circle_box_overlap(xmin: f64, ymin: f64, xmax: f64, ymax: f64, r: f64) -> f64 {
    if 0.0 <= xmin {
        if 0.0 <= ymin {
            overlap_core(xmin, ymin, xmax, ymax, r)
        } else if 0.0 >= ymax {
            overlap_core(-ymax, xmin, -ymin, xmax, r)
        } else {
            circle_box_overlap(xmin, ymin, xmax, 0.0, r)
                + circle_box_overlap(xmin, 0.0, xmax, ymax, r)
        }
    } else if 0.0 >= xmax {
        if 0.0 <= ymin {
            overlap_core(-xmax, ymin, -xmin, ymax, r)
        } else if 0.0 >= ymax {
            overlap_core(-xmax, -ymax, -xmin, -ymin, r)
        } else {
            circle_box_overlap(xmin, ymin, xmax, 0.0, r)
                + circle_box_overlap(xmin, 0.0, xmax, ymax, r)
        }
    } else if 0.0 <= ymin {
        circle_box_overlap(xmin, ymin, 0.0, ymax, r)
            + circle_box_overlap(0.0, ymin, xmax, ymax, r)
    } else if 0.0 >= ymax {
        circle_box_overlap(xmin, ymin, 0.0, ymax, r)
            + circle_box_overlap(0.0, ymin, xmax, ymax, r)
    } else {
        circle_box_overlap(xmin, ymin, 0.0, 0.0, r)
            + circle_box_overlap(0.0, ymin, xmax, 0.0, r)
            + circle_box_overlap(xmin, 0.0, 0.0, ymax, r)
            + circle_box_overlap(0.0, 0.0, xmax, ymax, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn full_rectangle_inside() {
        let a = circle_box_overlap(-0.5, -0.5, 0.5, 0.5, 5.0);
        assert!((a - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rectangle_outside() {
        let a = circle_box_overlap(10.0, 10.0, 11.0, 11.0, 5.0);
        assert_eq!(a, 0.0);
    }

    #[test]
    fn whole_circle_tiled() {
        // Sum of unit-pixel overlaps over a grid covering the circle
        // reproduces pi r^2.
        let r = 3.7;
        let mut total = 0.0;
        for j in -6..=6 {
            for i in -6..=6 {
                let x = i as f64;
                let y = j as f64;
                total += circle_box_overlap(x - 0.5, y - 0.5, x + 0.5, y + 0.5, r);
            }
        }
        assert!((total - PI * r * r).abs() < 1e-9, "total = {total}");
    }

    #[test]
    fn half_plane_symmetry() {
        let r = 2.0;
        let left = circle_box_overlap(-3.0, -3.0, 0.0, 3.0, r);
        let right = circle_box_overlap(0.0, -3.0, 3.0, 3.0, r);
        assert!((left - right).abs() < 1e-12);
        assert!((left + right - PI * r * r).abs() < 1e-9);
    }
}
