//! Geometry primitives in viewport space: origin top-left, y grows downward.

use serde::{Deserialize, Serialize};

use crate::placement::Side;

/// Position in viewport pixels.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Point at `(x, y)`.
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Size {
    /// Size of `width` by `height`.
    #[inline]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Integer pixel position produced by the placement functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelPos {
    /// Horizontal pixel.
    pub x: i32,
    /// Vertical pixel.
    pub y: i32,
}

impl PixelPos {
    /// Pixel position at `(x, y)`.
    #[inline]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Round a floating point position to whole pixels.
    #[inline]
    pub fn round(p: Point) -> Self {
        Self {
            x: p.x.round() as i32,
            y: p.y.round() as i32,
        }
    }
}

/// Axis-aligned rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    #[serde(rename = "width")]
    pub w: f64,
    /// Height.
    #[serde(rename = "height")]
    pub h: f64,
}

/// Viewport-relative snapshot of a trigger element.
pub type AnchorRect = Rect;

impl Rect {
    /// Rect at `(x, y)` sized `w` by `h`.
    #[inline]
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle with its origin at `origin` and the given size.
    #[inline]
    pub fn at(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    /// The full viewport as a rectangle rooted at the origin.
    #[inline]
    pub fn viewport(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    /// Left edge.
    #[inline]
    pub fn left(&self) -> f64 {
        self.x
    }
    /// Right edge.
    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.w
    }
    /// Top edge.
    #[inline]
    pub fn top(&self) -> f64 {
        self.y
    }
    /// Bottom edge.
    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }
    /// Extent as a size.
    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.w, self.h)
    }

    /// True for hidden or unmounted triggers: no area, or coordinates that are
    /// not finite.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.x.is_finite()
            && self.y.is_finite()
            && self.w.is_finite()
            && self.h.is_finite();
        !finite || self.w <= 0.0 || self.h <= 0.0
    }

    /// Shrink the rectangle by `pad` on every side. Never produces a negative
    /// extent.
    pub fn inset(&self, pad: f64) -> Self {
        let pad = pad.max(0.0);
        Self {
            x: self.x + pad,
            y: self.y + pad,
            w: (self.w - 2.0 * pad).max(0.0),
            h: (self.h - 2.0 * pad).max(0.0),
        }
    }
}

/// Layout axis; flips move along the main axis, shifts along the cross axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Left to right.
    Horizontal,
    /// Top to bottom.
    Vertical,
}

impl Axis {
    /// The perpendicular axis.
    #[inline]
    pub fn cross(self) -> Self {
        match self {
            Self::Horizontal => Self::Vertical,
            Self::Vertical => Self::Horizontal,
        }
    }
}

/// Signed overflow of a rectangle past each edge of a bounds rectangle.
/// Positive values mean the rectangle sticks out on that edge.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Overflow {
    /// Pixels past the top bound.
    pub top: f64,
    /// Pixels past the right bound.
    pub right: f64,
    /// Pixels past the bottom bound.
    pub bottom: f64,
    /// Pixels past the left bound.
    pub left: f64,
}

impl Overflow {
    /// Overflow of `rect` past `bounds`; negative values are clearance.
    pub fn of(rect: &Rect, bounds: &Rect) -> Self {
        Self {
            top: bounds.top() - rect.top(),
            right: rect.right() - bounds.right(),
            bottom: rect.bottom() - bounds.bottom(),
            left: bounds.left() - rect.left(),
        }
    }

    /// Overflow past the edge facing `side`.
    #[inline]
    pub fn on_side(&self, side: Side) -> f64 {
        match side {
            Side::Top => self.top,
            Side::Right => self.right,
            Side::Bottom => self.bottom,
            Side::Left => self.left,
        }
    }

    /// Largest overflow of the two edges along `axis`.
    #[inline]
    pub fn max_on(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Vertical => self.top.max(self.bottom),
            Axis::Horizontal => self.left.max(self.right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_edges() {
        let r = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(r.left(), 10.0);
        assert_eq!(r.right(), 40.0);
        assert_eq!(r.top(), 20.0);
        assert_eq!(r.bottom(), 60.0);
    }

    #[test]
    fn degenerate_rects() {
        assert!(Rect::new(5.0, 5.0, 0.0, 10.0).is_degenerate());
        assert!(Rect::new(5.0, 5.0, 10.0, 0.0).is_degenerate());
        assert!(Rect::new(f64::NAN, 5.0, 10.0, 10.0).is_degenerate());
        assert!(!Rect::new(0.0, 0.0, 1.0, 1.0).is_degenerate());
    }

    #[test]
    fn inset_never_goes_negative() {
        let r = Rect::new(0.0, 0.0, 10.0, 100.0).inset(8.0);
        assert_eq!(r, Rect::new(8.0, 8.0, 0.0, 84.0));
    }

    #[test]
    fn overflow_signs() {
        let bounds = Rect::new(8.0, 8.0, 1008.0, 752.0);
        let ov = Overflow::of(&Rect::new(0.0, 700.0, 100.0, 100.0), &bounds);
        assert_eq!(ov.left, 8.0);
        assert_eq!(ov.bottom, 40.0);
        assert!(ov.top < 0.0);
        assert!(ov.right < 0.0);
        assert_eq!(ov.max_on(Axis::Vertical), 40.0);
    }

    #[test]
    fn anchor_rect_serializes_with_long_names() {
        let json = serde_json::to_string(&Rect::new(1.0, 2.0, 3.0, 4.0)).expect("serialize");
        assert_eq!(json, r#"{"x":1.0,"y":2.0,"width":3.0,"height":4.0}"#);
        let back: AnchorRect = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Rect::new(1.0, 2.0, 3.0, 4.0));
    }
}
