use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    rect::Axis,
};

/// Side of the anchor the popup is placed against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Above the anchor.
    Top,
    /// Right of the anchor.
    Right,
    /// Below the anchor.
    Bottom,
    /// Left of the anchor.
    Left,
}

impl Side {
    /// All sides, in token order.
    pub const ALL: [Self; 4] = [Self::Top, Self::Right, Self::Bottom, Self::Left];

    /// Side across the anchor.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Axis along which the popup moves away from the anchor.
    #[inline]
    pub fn axis(self) -> Axis {
        match self {
            Self::Top | Self::Bottom => Axis::Vertical,
            Self::Left | Self::Right => Axis::Horizontal,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Right => "right",
            Self::Bottom => "bottom",
            Self::Left => "left",
        }
    }
}

/// Alignment of the popup against the anchor's extent on the cross axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Alignment {
    /// Leading edges line up.
    Start,
    /// Centers line up.
    #[default]
    Center,
    /// Trailing edges line up.
    End,
}

impl Alignment {
    /// All alignments, in token order.
    pub const ALL: [Self; 3] = [Self::Start, Self::Center, Self::End];
}

/// A side + alignment pair. Serializes to and from a token such as
/// `"bottom-start"`; center alignment is written as the bare side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Placement {
    /// Side of the anchor.
    pub side: Side,
    /// Alignment along that side.
    pub alignment: Alignment,
}

impl Placement {
    /// Placement on `side` with `alignment`.
    #[inline]
    pub fn new(side: Side, alignment: Alignment) -> Self {
        Self { side, alignment }
    }

    /// Same alignment against the opposite side.
    #[inline]
    pub fn flipped(self) -> Self {
        Self {
            side: self.side.opposite(),
            alignment: self.alignment,
        }
    }

    /// Every placement token this crate understands.
    pub fn all() -> impl Iterator<Item = Self> {
        Side::ALL
            .into_iter()
            .flat_map(|s| Alignment::ALL.into_iter().map(move |a| Self::new(s, a)))
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::new(Side::Bottom, Alignment::Start)
    }
}

/// Parse a placement token (`"top"`, `"left-end"`, ...) into side and alignment.
pub fn parse_placement(token: &str) -> Result<Placement> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::EmptyPlacement);
    }
    let (side, align) = match token.split_once('-') {
        Some((s, a)) => (s, Some(a)),
        None => (token, None),
    };
    let side = match side.to_ascii_lowercase().as_str() {
        "top" => Side::Top,
        "right" => Side::Right,
        "bottom" => Side::Bottom,
        "left" => Side::Left,
        other => return Err(Error::UnknownSide(other.to_string())),
    };
    let alignment = match align.map(str::to_ascii_lowercase).as_deref() {
        None => Alignment::Center,
        Some("start") => Alignment::Start,
        Some("end") => Alignment::End,
        Some(other) => return Err(Error::UnknownAlignment(other.to_string())),
    };
    Ok(Placement::new(side, alignment))
}

/// Inverse of [`parse_placement`].
pub fn build_placement(placement: Placement) -> String {
    let side = placement.side.as_str();
    match placement.alignment {
        Alignment::Center => side.to_string(),
        Alignment::Start => format!("{side}-start"),
        Alignment::End => format!("{side}-end"),
    }
}

impl Display for Placement {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&build_placement(*self))
    }
}

impl FromStr for Placement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_placement(s)
    }
}

impl TryFrom<String> for Placement {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        parse_placement(&value)
    }
}

impl From<Placement> for String {
    fn from(value: Placement) -> Self {
        build_placement(value)
    }
}

/// Placement preferences for one computation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSpec {
    /// Preferred side and alignment.
    pub placement: Placement,
    /// Gap between the anchor edge and the popup edge, in pixels.
    pub offset: f64,
    /// Allow swapping to the opposite side when the preferred side overflows.
    pub flip: bool,
    /// Allow sliding along the cross axis to stay inside the viewport.
    pub shift: bool,
    /// Margin kept clear on every viewport edge.
    pub viewport_padding: f64,
}

impl Default for PlacementSpec {
    fn default() -> Self {
        Self {
            placement: Placement::default(),
            offset: 4.0,
            flip: true,
            shift: true,
            viewport_padding: 8.0,
        }
    }
}
