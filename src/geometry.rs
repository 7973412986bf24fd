// ============================================================================
// GEOMETRY — rotated bounds, rotation pivots, selection rectangles
// ============================================================================

use std::f64::consts::TAU;

use kurbo::{Point, Rect, Size};

/// Slack used when snapping a fractional extent down to whole pixels, so that
/// `100.00000000000001` (cos/sin noise at right angles) stays `100`.
const EXTENT_EPSILON: f64 = 1e-6;

/// Normalize an angle in radians into `[0, 2π)`.
///
/// Idempotent: normalizing an already-normalized angle returns it unchanged.
pub fn normalize_rotation(radians: f64) -> f64 {
    if !radians.is_finite() {
        return 0.0;
    }
    let r = radians.rem_euclid(TAU);
    // rem_euclid rounds tiny negative inputs up to exactly TAU
    if r >= TAU { 0.0 } else { r }
}

/// Size of the axis-aligned box that encloses a `width × height` rectangle
/// rotated by `rotation` radians.
pub fn rotated_bounding_size(width: f64, height: f64, rotation: f64) -> Size {
    let (sin, cos) = normalize_rotation(rotation).sin_cos();
    let (sin, cos) = (sin.abs(), cos.abs());
    Size::new(width * cos + height * sin, width * sin + height * cos)
}

/// Pivot of a rectangle given as origin + (possibly negative) extent.
///
/// Mirrored draws pass a negative width or height, which moves the pivot to
/// the mirrored side of the origin.
pub fn rotation_pivot(left: f64, top: f64, width: f64, height: f64) -> Point {
    Point::new(left + width * 0.5, top + height * 0.5)
}

/// Axis-aligned bounding rectangle of a point sequence.
///
/// An empty sequence yields `Rect::ZERO`; the result never has a negative
/// width or height.
pub fn selection_rect(points: &[Point]) -> Rect {
    let Some(first) = points.first() else {
        return Rect::ZERO;
    };
    points
        .iter()
        .skip(1)
        .fold(Rect::from_points(*first, *first), |acc, p| acc.union_pt(*p))
}

/// Convert a fractional extent into a whole pixel count (truncating, like a
/// surface allocation does).  Non-finite or non-positive values give `0`.
pub fn pixel_extent(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value + EXTENT_EPSILON).floor().min(u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn rotation_normalization_is_idempotent() {
        for r in [-7.5, -PI, -0.0, 0.0, 0.3, PI, TAU, 3.0 * TAU + 0.25, 1e-18, -1e-18] {
            let once = normalize_rotation(r);
            assert!((0.0..TAU).contains(&once), "{r} -> {once}");
            assert_eq!(normalize_rotation(once), once);
        }
    }

    #[test]
    fn bounding_size_ignores_full_turns() {
        for r in [-9.0, -FRAC_PI_2, 0.1, FRAC_PI_4, 2.0, 5.0 * PI, 40.0] {
            let a = rotated_bounding_size(120.0, 45.0, r);
            let b = rotated_bounding_size(120.0, 45.0, r.rem_euclid(TAU));
            assert_eq!(a, b, "rotation {r}");
        }
    }

    #[test]
    fn right_angle_swaps_dimensions() {
        let s = rotated_bounding_size(200.0, 50.0, FRAC_PI_2);
        assert_eq!(pixel_extent(s.width), 50);
        assert_eq!(pixel_extent(s.height), 200);
    }

    #[test]
    fn diagonal_rotation_grows_bounds() {
        let s = rotated_bounding_size(100.0, 100.0, FRAC_PI_4);
        assert!((s.width - 141.421).abs() < 0.01);
        assert_eq!(pixel_extent(s.width), 141);
    }

    #[test]
    fn pivot_follows_mirrored_extent() {
        assert_eq!(rotation_pivot(0.0, 0.0, 100.0, 40.0), Point::new(50.0, 20.0));
        assert_eq!(rotation_pivot(0.0, 0.0, -100.0, 40.0), Point::new(-50.0, 20.0));
    }

    #[test]
    fn selection_rect_bounds_points() {
        let pts = [
            Point::new(10.0, 30.0),
            Point::new(40.0, 5.0),
            Point::new(25.0, 60.0),
        ];
        assert_eq!(selection_rect(&pts), Rect::new(10.0, 5.0, 40.0, 60.0));
    }

    #[test]
    fn degenerate_selection_has_no_area() {
        assert_eq!(selection_rect(&[]), Rect::ZERO);
        let single = selection_rect(&[Point::new(4.0, 4.0)]);
        assert_eq!(single.area(), 0.0);
        assert!(single.width() >= 0.0 && single.height() >= 0.0);
    }

    #[test]
    fn pixel_extent_rejects_garbage() {
        assert_eq!(pixel_extent(-3.0), 0);
        assert_eq!(pixel_extent(f64::NAN), 0);
        assert_eq!(pixel_extent(99.9999999), 100);
        assert_eq!(pixel_extent(99.5), 99);
    }
}
