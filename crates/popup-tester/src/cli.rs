//! Command-line interface definitions for popup-tester.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use logging::LogArgs;
use popup_geom::{Placement, Point, Rect, Size, parse_placement};

/// Command-line interface for the `popup-tester` binary.
#[derive(Parser, Debug)]
#[command(
    name = "popup-tester",
    about = "Placement and configuration diagnostics for popups",
    version
)]
pub struct Cli {
    /// Logging controls shared across popup binaries.
    #[command(flatten)]
    pub log: LogArgs,

    /// Which diagnostic to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level tester commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute where a popup lands for the given anchor and viewport.
    Place(PlaceArgs),
    /// Load a provider configuration file and print the merged defaults.
    CheckConfig(CheckConfigArgs),
}

/// Arguments for the `place` subcommand.
#[derive(Args, Debug, Clone)]
pub struct PlaceArgs {
    /// Anchor rectangle as `x,y,w,h`. Without one, or with a zero-area one,
    /// the popup is centered.
    #[arg(long, value_parser = parse_rect, value_name = "X,Y,W,H")]
    pub anchor: Option<Rect>,

    /// Popup size as `w,h`.
    #[arg(long, value_parser = parse_size, value_name = "W,H")]
    pub size: Size,

    /// Viewport size as `w,h`.
    #[arg(long, value_parser = parse_size, default_value = "1024,768", value_name = "W,H")]
    pub viewport: Size,

    /// Preferred placement token, e.g. `bottom-start` or `left`.
    #[arg(long, value_parser = parse_placement, default_value = "bottom-start")]
    pub placement: Placement,

    /// Gap between anchor and popup.
    #[arg(long, default_value_t = 4.0)]
    pub offset: f64,

    /// Margin kept clear on every viewport edge.
    #[arg(long, default_value_t = 8.0)]
    pub padding: f64,

    /// Never swap to the opposite side.
    #[arg(long)]
    pub no_flip: bool,

    /// Never slide along the cross axis.
    #[arg(long)]
    pub no_shift: bool,

    /// Viewport origin on screen as `x,y`; also prints screen coordinates.
    #[arg(long, value_parser = parse_point, value_name = "X,Y")]
    pub screen_offset: Option<Point>,
}

/// Arguments for the `check-config` subcommand.
#[derive(Args, Debug, Clone)]
pub struct CheckConfigArgs {
    /// Path to a RON provider configuration.
    #[arg(value_name = "PATH")]
    pub path: PathBuf,
}

/// Parse comma-separated numbers, requiring exactly `n` of them.
fn parse_numbers(s: &str, n: usize) -> Result<Vec<f64>, String> {
    let parts = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .map_err(|e| format!("'{}': {e}", p.trim()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if parts.len() != n {
        return Err(format!("expected {n} comma-separated numbers, got {}", parts.len()));
    }
    Ok(parts)
}

/// Parse `x,y,w,h`.
fn parse_rect(s: &str) -> Result<Rect, String> {
    let v = parse_numbers(s, 4)?;
    Ok(Rect::new(v[0], v[1], v[2], v[3]))
}

/// Parse `w,h`.
fn parse_size(s: &str) -> Result<Size, String> {
    let v = parse_numbers(s, 2)?;
    Ok(Size::new(v[0], v[1]))
}

/// Parse `x,y`.
fn parse_point(s: &str) -> Result<Point, String> {
    let v = parse_numbers(s, 2)?;
    Ok(Point::new(v[0], v[1]))
}
