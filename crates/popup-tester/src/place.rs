//! `place` subcommand: run one placement computation and print it as JSON.

use std::io::{self, Write};

use popup_geom::{
    PixelPos, Placement, PlacementSpec, center_position, compute_position, constrain_size,
    to_screen_coordinates,
};
use serde::Serialize;
use tracing::debug;

use crate::{
    cli::PlaceArgs,
    error::{Error, Result},
};

/// Printed result of a placement run.
#[derive(Debug, Serialize, PartialEq)]
struct PlaceReport {
    /// Viewport-relative top-left corner.
    x: i32,
    /// Viewport-relative top-left corner.
    y: i32,
    /// Size after clamping to the padded viewport.
    width: f64,
    /// Size after clamping to the padded viewport.
    height: f64,
    /// Placement token actually used.
    placement: Placement,
    /// True when the popup moved to the opposite side.
    flipped: bool,
    /// True when no usable anchor was given.
    centered: bool,
    /// Screen position, present only with `--screen-offset`.
    #[serde(skip_serializing_if = "Option::is_none")]
    screen: Option<PixelPos>,
}

/// Build the placement spec described by the arguments.
fn spec_of(args: &PlaceArgs) -> PlacementSpec {
    PlacementSpec {
        placement: args.placement,
        offset: args.offset,
        flip: !args.no_flip,
        shift: !args.no_shift,
        viewport_padding: args.padding,
    }
}

/// Compute the report without printing it.
fn compute(args: &PlaceArgs) -> Result<PlaceReport> {
    if args.size.width <= 0.0 || args.size.height <= 0.0 {
        return Err(Error::Invalid(format!(
            "popup size must be positive, got {}x{}",
            args.size.width, args.size.height
        )));
    }
    let spec = spec_of(args);
    let size = constrain_size(args.size, args.viewport, spec.viewport_padding);
    let (pos, placement, flipped, centered) = match args.anchor.filter(|a| !a.is_degenerate()) {
        Some(anchor) => {
            let r = compute_position(&anchor, size, &spec, args.viewport);
            (r.pos(), r.placement, r.flipped, false)
        }
        None => (
            center_position(size, args.viewport),
            spec.placement,
            false,
            true,
        ),
    };
    debug!(x = pos.x, y = pos.y, %placement, flipped, centered, "placed");
    Ok(PlaceReport {
        x: pos.x,
        y: pos.y,
        width: size.width,
        height: size.height,
        placement,
        flipped,
        centered,
        screen: args
            .screen_offset
            .map(|off| to_screen_coordinates(pos, Some(off))),
    })
}

/// Run the `place` subcommand.
pub fn run(args: &PlaceArgs) -> Result<()> {
    let report = compute(args)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(())
}
