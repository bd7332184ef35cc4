//! Axis-aligned and rotated rectangles.
//!
//! Coordinates are pixels, X grows to the right and Y downwards.

use std::{fmt, ops::RangeInclusive};

use crate::resolution::AspectRatio;

/// An axis-aligned rectangle with non-negative width and height.
///
/// Stored by center, since detection networks predict centers and sizes and most geometry here
/// scales or grows boxes around their center.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    xc: f32,
    yc: f32,
    w: f32,
    h: f32,
}

impl Rect {
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            xc: x_center,
            yc: y_center,
            w: width,
            h: height,
        }
    }

    #[inline]
    pub fn from_top_left(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_center(x + width * 0.5, y + height * 0.5, width, height)
    }

    /// Creates the rectangle spanning `x` horizontally and `y` vertically.
    ///
    /// # Panics
    ///
    /// Panics if either range is reversed.
    pub fn from_ranges(x: RangeInclusive<f32>, y: RangeInclusive<f32>) -> Self {
        let ((x0, x1), (y0, y1)) = (x.into_inner(), y.into_inner());
        assert!(x0 <= x1 && y0 <= y1, "reversed range {x0}..={x1}, {y0}..={y1}");
        Self::from_top_left(x0, y0, x1 - x0, y1 - y0)
    }

    /// Widens or heightens the rectangle around its center until it has the `target` aspect
    /// ratio. It never shrinks.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, target: AspectRatio) -> Self {
        let ratio = target.as_f32();
        if self.h * ratio >= self.w {
            Self { w: self.h * ratio, ..*self }
        } else {
            Self { h: self.w / ratio, ..*self }
        }
    }

    /// X coordinate of the left edge.
    #[inline]
    pub fn x(&self) -> f32 {
        self.xc - self.w * 0.5
    }

    /// Y coordinate of the top edge.
    #[inline]
    pub fn y(&self) -> f32 {
        self.yc - self.h * 0.5
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.w
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.h
    }

    #[inline]
    pub fn x_center(&self) -> f32 {
        self.xc
    }

    #[inline]
    pub fn y_center(&self) -> f32 {
        self.yc
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.xc, self.yc)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    #[must_use]
    pub fn move_by(&self, dx: f32, dy: f32) -> Self {
        Self::from_center(self.xc + dx, self.yc + dy, self.w, self.h)
    }

    /// The overlapping part of `self` and `other`, or `None` if they are disjoint.
    ///
    /// Rectangles that only touch intersect in an empty rectangle.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x().max(other.x());
        let top = self.y().max(other.y());
        let right = (self.x() + self.w).min(other.x() + other.w);
        let bottom = (self.y() + self.h).min(other.y() + other.h);
        (left <= right && top <= bottom).then(|| Rect::from_ranges(left..=right, top..=bottom))
    }

    /// Intersection over union, from 0 (disjoint) to 1 (identical).
    ///
    /// Defined as 0 when both rectangles are empty.
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection(other).map_or(0.0, |r| r.area());
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect({}x{} at {},{})",
            self.w,
            self.h,
            self.x(),
            self.y()
        )
    }
}

/// A [`Rect`] rotated clockwise (on screen) around its own center.
///
/// Besides marking an area of its parent coordinate system, it defines an inner coordinate system:
/// the origin is the rotated top left corner and the axes follow the rotated edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    rect: Rect,
    radians: f32,
}

impl RotatedRect {
    #[inline]
    pub fn new(rect: Rect, radians: f32) -> Self {
        Self { rect, radians }
    }

    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.radians
    }

    /// The rectangle before rotation.
    #[inline]
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Maps a point from the inner coordinate system to the parent one.
    pub fn transform_out(&self, x: f32, y: f32) -> [f32; 2] {
        let from_center = [x - self.rect.w * 0.5, y - self.rect.h * 0.5];
        let [dx, dy] = rotate(from_center, self.radians);
        [self.rect.xc + dx, self.rect.yc + dy]
    }
}

impl From<Rect> for RotatedRect {
    fn from(rect: Rect) -> Self {
        Self::new(rect, 0.0)
    }
}

/// Rotates a vector clockwise as seen on screen.
fn rotate([x, y]: [f32; 2], radians: f32) -> [f32; 2] {
    let (sin, cos) = radians.sin_cos();
    [x * cos - y * sin, x * sin + y * cos]
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use approx::assert_abs_diff_eq;

    use super::*;

    #[track_caller]
    fn assert_point(actual: [f32; 2], expected: [f32; 2]) {
        assert_abs_diff_eq!(actual[0], expected[0], epsilon = 1e-5);
        assert_abs_diff_eq!(actual[1], expected[1], epsilon = 1e-5);
    }

    #[test]
    fn constructors_agree() {
        let a = Rect::from_center(5.0, 10.0, 4.0, 8.0);
        assert_eq!(a, Rect::from_top_left(3.0, 6.0, 4.0, 8.0));
        assert_eq!(a, Rect::from_ranges(3.0..=7.0, 6.0..=14.0));
        assert_eq!((a.x(), a.y()), (3.0, 6.0));
        assert_eq!(a.move_by(-3.0, 1.0), Rect::from_top_left(0.0, 7.0, 4.0, 8.0));
    }

    #[test]
    fn intersection() {
        let big = Rect::from_ranges(0.0..=10.0, 0.0..=10.0);
        let dot = Rect::from_ranges(5.0..=5.0, 5.0..=5.0);
        assert_eq!(big.intersection(&dot), Some(dot));

        let right = Rect::from_ranges(6.0..=10.0, 0.0..=10.0);
        assert_eq!(dot.intersection(&right), None);
        assert_eq!(
            big.intersection(&Rect::from_ranges(8.0..=20.0, -5.0..=2.0)),
            Some(Rect::from_ranges(8.0..=10.0, 0.0..=2.0)),
        );
    }

    #[test]
    fn iou() {
        let small = Rect::from_center(9.0, 9.0, 1.0, 1.0);
        let large = Rect::from_center(9.0, 9.0, 2.0, 2.0);
        assert_eq!(small.iou(&large), 0.25);
        assert_eq!(large.iou(&small), 0.25);
        assert_eq!(small.iou(&small), 1.0);
        assert_eq!(small.iou(&small.move_by(5.0, 0.0)), 0.0);

        let empty = Rect::from_center(0.0, 0.0, 0.0, 0.0);
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn grow_to_fit_aspect() {
        let tall = Rect::from_center(10.0, 10.0, 50.0, 100.0);
        let wide = Rect::from_center(10.0, 10.0, 100.0, 50.0);
        let square = Rect::from_center(10.0, 10.0, 100.0, 100.0);
        assert_eq!(tall.grow_to_fit_aspect(AspectRatio::SQUARE), square);
        assert_eq!(wide.grow_to_fit_aspect(AspectRatio::SQUARE), square);

        let ratio = AspectRatio::new(4, 2).unwrap();
        let grown = Rect::from_top_left(0.0, 0.0, 400.0, 100.0).grow_to_fit_aspect(ratio);
        assert_eq!((grown.width(), grown.height()), (400.0, 200.0));
        assert_eq!(grown.center(), (200.0, 50.0));
    }

    #[test]
    fn transform_out() {
        let unrotated = RotatedRect::new(Rect::from_top_left(10.0, 20.0, 1.0, 1.0), 0.0);
        assert_point(unrotated.transform_out(0.0, 0.0), [10.0, 20.0]);
        assert_point(unrotated.transform_out(1.0, -1.0), [11.0, 19.0]);

        // A quarter turn moves the inner top left corner to the outer top right one.
        let quarter = RotatedRect::new(Rect::from_top_left(0.0, 0.0, 1.0, 1.0), FRAC_PI_2);
        assert_point(quarter.transform_out(0.0, 0.0), [1.0, 0.0]);
        assert_point(quarter.transform_out(0.5, 0.5), [0.5, 0.5]);
        assert_point(quarter.transform_out(0.0, -1.0), [2.0, 0.0]);

        let half = RotatedRect::new(Rect::from_top_left(10.0, 20.0, 1.0, 1.0), PI);
        assert_point(half.transform_out(0.0, 0.0), [11.0, 21.0]);
    }

    #[test]
    fn rotation_keeps_distances() {
        let mut rng = fastrand::Rng::with_seed(0x7ee7);
        for _ in 0..100 {
            let rect = RotatedRect::new(
                Rect::from_center(rng.f32() * 100.0, rng.f32() * 100.0, 10.0, 20.0),
                rng.f32() * 2.0 * PI,
            );
            // The center is fixed, and every point keeps its distance to it.
            assert_point(rect.transform_out(5.0, 10.0), [rect.rect().xc, rect.rect().yc]);
            let [x, y] = [rng.f32() * 50.0, rng.f32() * 50.0];
            let [ox, oy] = rect.transform_out(x, y);
            let inner = (x - 5.0).hypot(y - 10.0);
            let outer = (ox - rect.rect().xc).hypot(oy - rect.rect().yc);
            assert_abs_diff_eq!(inner, outer, epsilon = 1e-3);
        }
    }
}
