use serde::{Deserialize, Serialize};

use crate::{
    placement::{Alignment, Placement, PlacementSpec, Side},
    rect::{Axis, Overflow, PixelPos, Point, Rect, Size},
};

/// Outcome of one placement computation. Fresh on every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionResult {
    /// Left edge in viewport pixels.
    pub x: i32,
    /// Top edge in viewport pixels.
    pub y: i32,
    /// Placement actually used; differs from the requested one when flipped.
    pub placement: Placement,
    /// True when the popup moved to the opposite side.
    pub flipped: bool,
}

impl PositionResult {
    /// Top-left corner.
    #[inline]
    pub fn pos(&self) -> PixelPos {
        PixelPos::new(self.x, self.y)
    }
}

/// Top-left corner for `placement` before any overflow handling.
fn base_origin(anchor: &Rect, size: Size, placement: Placement, offset: f64) -> Point {
    let along = |start: f64, extent: f64, own: f64| match placement.alignment {
        Alignment::Start => start,
        Alignment::Center => start + extent / 2.0 - own / 2.0,
        Alignment::End => start + extent - own,
    };
    match placement.side {
        Side::Bottom => Point::new(
            along(anchor.x, anchor.w, size.width),
            anchor.bottom() + offset,
        ),
        Side::Top => Point::new(
            along(anchor.x, anchor.w, size.width),
            anchor.top() - size.height - offset,
        ),
        Side::Right => Point::new(
            anchor.right() + offset,
            along(anchor.y, anchor.h, size.height),
        ),
        Side::Left => Point::new(
            anchor.left() - size.width - offset,
            along(anchor.y, anchor.h, size.height),
        ),
    }
}

/// Slide along `axis` so the popup stays inside `bounds`, one edge at a time:
/// the leading edge wins when the popup cannot fit at all.
fn shift_into(origin: Point, size: Size, bounds: &Rect, axis: Axis) -> Point {
    let ov = Overflow::of(&Rect::at(origin, size), bounds);
    match axis {
        Axis::Horizontal => {
            if ov.left > 0.0 {
                Point::new(origin.x + ov.left, origin.y)
            } else if ov.right > 0.0 {
                Point::new(origin.x - ov.right, origin.y)
            } else {
                origin
            }
        }
        Axis::Vertical => {
            if ov.top > 0.0 {
                Point::new(origin.x, origin.y + ov.top)
            } else if ov.bottom > 0.0 {
                Point::new(origin.x, origin.y - ov.bottom)
            } else {
                origin
            }
        }
    }
}

/// Compute where a popup of `size` goes relative to `anchor` inside `viewport`.
///
/// Steps:
/// - place the popup `offset` pixels outside the anchor edge for the requested
///   side, aligned on the cross axis
/// - when `flip` is set and the popup overflows on its own side, try the
///   opposite side and keep it only if its overflow on that axis is strictly
///   smaller
/// - when `shift` is set, slide along the cross axis back inside the padded
///   viewport
/// - round to whole pixels
///
/// A degenerate anchor yields the centered position with the requested
/// placement and `flipped = false`.
pub fn compute_position(
    anchor: &Rect,
    size: Size,
    spec: &PlacementSpec,
    viewport: Size,
) -> PositionResult {
    let requested = spec.placement;
    if anchor.is_degenerate() {
        let c = center_position(size, viewport);
        return PositionResult {
            x: c.x,
            y: c.y,
            placement: requested,
            flipped: false,
        };
    }

    let bounds = Rect::viewport(viewport).inset(spec.viewport_padding);
    let mut placement = requested;
    let mut origin = base_origin(anchor, size, placement, spec.offset);

    if spec.flip {
        let ov = Overflow::of(&Rect::at(origin, size), &bounds);
        if ov.on_side(placement.side) > 0.0 {
            let alt = placement.flipped();
            let alt_origin = base_origin(anchor, size, alt, spec.offset);
            let alt_ov = Overflow::of(&Rect::at(alt_origin, size), &bounds);
            let axis = placement.side.axis();
            if alt_ov.max_on(axis) < ov.max_on(axis) {
                placement = alt;
                origin = alt_origin;
            }
        }
    }

    if spec.shift {
        origin = shift_into(origin, size, &bounds, placement.side.axis().cross());
    }

    let px = PixelPos::round(origin);
    PositionResult {
        x: px.x,
        y: px.y,
        placement,
        flipped: placement.side != requested.side,
    }
}

/// Center `size` in `viewport`. Oversized popups pin to the origin rather than
/// going negative.
pub fn center_position(size: Size, viewport: Size) -> PixelPos {
    PixelPos::round(Point::new(
        ((viewport.width - size.width) / 2.0).max(0.0),
        ((viewport.height - size.height) / 2.0).max(0.0),
    ))
}

/// Translate a viewport position into host screen coordinates. Identity when
/// the host has no screen offset to apply.
pub fn to_screen_coordinates(pos: PixelPos, screen_offset: Option<Point>) -> PixelPos {
    match screen_offset {
        Some(off) => PixelPos::new(
            pos.x + off.x.round() as i32,
            pos.y + off.y.round() as i32,
        ),
        None => pos,
    }
}

/// Clamp `size` to `max_size` shrunk by `padding` on every side. Never grows
/// a dimension.
pub fn constrain_size(size: Size, max_size: Size, padding: f64) -> Size {
    let pad = padding.max(0.0) * 2.0;
    Size::new(
        size.width.min((max_size.width - pad).max(0.0)),
        size.height.min((max_size.height - pad).max(0.0)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::parse_placement;

    fn spec(token: &str) -> PlacementSpec {
        PlacementSpec {
            placement: parse_placement(token).unwrap(),
            ..PlacementSpec::default()
        }
    }

    const VIEWPORT: Size = Size {
        width: 1024.0,
        height: 768.0,
    };

    #[test]
    fn bottom_start_base_position() {
        let anchor = Rect::new(100.0, 100.0, 100.0, 40.0);
        let r = compute_position(
            &anchor,
            Size::new(200.0, 150.0),
            &spec("bottom-start"),
            VIEWPORT,
        );
        assert_eq!((r.x, r.y), (100, 144));
        assert!(!r.flipped);
        assert_eq!(r.placement.to_string(), "bottom-start");
    }

    #[test]
    fn center_alignment_on_every_side() {
        let anchor = Rect::new(400.0, 300.0, 100.0, 40.0);
        let size = Size::new(60.0, 20.0);
        let top = compute_position(&anchor, size, &spec("top"), VIEWPORT);
        assert_eq!((top.x, top.y), (420, 276));
        let right = compute_position(&anchor, size, &spec("right"), VIEWPORT);
        assert_eq!((right.x, right.y), (504, 310));
        let left = compute_position(&anchor, size, &spec("left-end"), VIEWPORT);
        assert_eq!((left.x, left.y), (336, 320));
    }

    #[test]
    fn flips_top_to_bottom_near_viewport_top() {
        let anchor = Rect::new(100.0, 20.0, 100.0, 40.0);
        let size = Size::new(200.0, 150.0);
        let r = compute_position(&anchor, size, &spec("top"), VIEWPORT);
        assert!(r.flipped);
        assert_eq!(r.placement.to_string(), "bottom");

        let no_flip = PlacementSpec {
            flip: false,
            ..spec("top")
        };
        let r = compute_position(&anchor, size, &no_flip, VIEWPORT);
        assert!(!r.flipped);
        assert_eq!(r.placement.to_string(), "top");
    }

    #[test]
    fn keeps_original_side_when_flip_is_no_better() {
        // Near the bottom edge a tall popup overflows less above than it
        // would below, so the preferred side stays.
        let anchor = Rect::new(400.0, 600.0, 50.0, 20.0);
        let size = Size::new(100.0, 700.0);
        let r = compute_position(&anchor, size, &spec("top"), VIEWPORT);
        assert!(!r.flipped);
        assert_eq!(r.placement.side, Side::Top);
    }

    #[test]
    fn shift_pulls_popup_back_from_left_edge() {
        let anchor = Rect::new(0.0, 100.0, 40.0, 20.0);
        let size = Size::new(200.0, 100.0);
        let r = compute_position(&anchor, size, &spec("bottom"), VIEWPORT);
        // Centered base x would be -80; shifted to the padding edge.
        assert_eq!(r.x, 8);

        let unshifted = PlacementSpec {
            shift: false,
            ..spec("bottom")
        };
        let r = compute_position(&anchor, size, &unshifted, VIEWPORT);
        assert_eq!(r.x, -80);
    }

    #[test]
    fn shift_pulls_popup_back_from_right_edge() {
        let anchor = Rect::new(1000.0, 100.0, 20.0, 20.0);
        let r = compute_position(
            &anchor,
            Size::new(100.0, 50.0),
            &spec("bottom-start"),
            VIEWPORT,
        );
        assert_eq!(r.x, 1024 - 8 - 100);
    }

    #[test]
    fn degenerate_anchor_routes_to_center() {
        let anchor = Rect::new(100.0, 20.0, 0.0, 0.0);
        let size = Size::new(200.0, 150.0);
        for p in Placement::all() {
            let s = PlacementSpec {
                placement: p,
                ..PlacementSpec::default()
            };
            let r = compute_position(&anchor, size, &s, VIEWPORT);
            assert_eq!(r.pos(), center_position(size, VIEWPORT));
            assert_eq!(r.placement, p);
            assert!(!r.flipped);
        }
    }

    #[test]
    fn center_and_screen_translation() {
        let c = center_position(Size::new(200.0, 100.0), VIEWPORT);
        assert_eq!(c, PixelPos::new(412, 334));
        assert_eq!(to_screen_coordinates(c, None), c);
        assert_eq!(
            to_screen_coordinates(c, Some(Point::new(1440.0, 25.0))),
            PixelPos::new(1852, 359)
        );
    }

    #[test]
    fn constrain_clamps_large_and_keeps_small() {
        let big = constrain_size(Size::new(2000.0, 900.0), VIEWPORT, 8.0);
        assert_eq!(big, Size::new(1008.0, 752.0));
        let small = constrain_size(Size::new(200.0, 150.0), VIEWPORT, 8.0);
        assert_eq!(small, Size::new(200.0, 150.0));
    }
}
