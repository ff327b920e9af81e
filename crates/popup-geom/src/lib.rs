//! Popup geometry: anchor-relative placement with boundary avoidance.
//!
//! Everything in this crate is pure and synchronous. Callers snapshot the
//! anchor rectangle and the viewport, pick a [`PlacementSpec`], and receive a
//! fresh [`PositionResult`]:
//!
//! - [`compute_position`]: place a popup next to an anchor, flipping to the
//!   opposite side and shifting along the cross axis when the viewport is too
//!   small on the preferred side
//! - [`center_position`]: center a popup in the viewport
//! - [`constrain_size`]: clamp a requested size to the padded viewport
//! - [`to_screen_coordinates`]: translate viewport coordinates into host
//!   screen coordinates
//!
//! A degenerate (zero-area) anchor never participates in anchor-relative math;
//! [`compute_position`] routes it to [`center_position`].

mod error;
mod placement;
mod position;
mod rect;

#[cfg(test)]
mod property_tests;

pub use error::{Error, Result};
pub use placement::{Alignment, Placement, PlacementSpec, Side, build_placement, parse_placement};
pub use position::{
    PositionResult, center_position, compute_position, constrain_size, to_screen_coordinates,
};
pub use rect::{AnchorRect, Axis, Overflow, PixelPos, Point, Rect, Size};
