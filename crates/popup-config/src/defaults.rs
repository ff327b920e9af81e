//! Per-popup defaults merged under caller options.

use popup_geom::{Placement, PlacementSpec, Size};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A width or height: sized by content, or a fixed pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Intrinsic size of the content.
    #[default]
    Auto,
    /// Fixed size in CSS pixels.
    Px(f64),
}

impl Dimension {
    /// True for `Auto`.
    pub fn is_auto(self) -> bool {
        matches!(self, Self::Auto)
    }

    /// Pixel value, or `fallback` for `Auto`.
    pub fn or(self, fallback: f64) -> f64 {
        match self {
            Self::Auto => fallback,
            Self::Px(v) => v,
        }
    }
}

/// What a pointer press outside the popup does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlurBehavior {
    /// Close with reason `blur`.
    #[default]
    Close,
    /// Ignore outside presses; native windows behave modally.
    None,
}

/// Defaults applied to every popup unless the caller overrides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupDefaults {
    /// Popup width.
    pub width: Dimension,
    /// Popup height.
    pub height: Dimension,
    /// Upper bound on width; the viewport when absent.
    pub max_width: Option<f64>,
    /// Upper bound on height; the viewport when absent.
    pub max_height: Option<f64>,
    /// Preferred side and alignment.
    pub placement: Placement,
    /// Gap between anchor and popup, in pixels.
    pub offset: f64,
    /// Swap to the opposite side on overflow.
    pub flip: bool,
    /// Slide along the cross axis on overflow.
    pub shift: bool,
    /// Margin kept clear on every viewport edge.
    pub viewport_padding: f64,
    /// What an outside press does.
    pub blur_behavior: BlurBehavior,
    /// Close on the Escape key.
    pub close_on_escape: bool,
    /// Block interaction with the page behind the popup.
    pub modal: bool,
    /// Dim the page behind the popup.
    pub backdrop: bool,
    /// Move focus into the popup once it is shown.
    pub autofocus: bool,
    /// Return focus to the prior element on close.
    pub restore_focus: bool,
    /// Route prefix native windows load structured content from.
    pub component_route: String,
    /// Width used when a native window is asked for `Auto`.
    pub native_width: f64,
    /// Height used when a native window is asked for `Auto`.
    pub native_height: f64,
}

impl Default for PopupDefaults {
    fn default() -> Self {
        Self {
            width: Dimension::Px(320.0),
            height: Dimension::Px(240.0),
            max_width: None,
            max_height: None,
            placement: Placement::default(),
            offset: 4.0,
            flip: true,
            shift: true,
            viewport_padding: 8.0,
            blur_behavior: BlurBehavior::Close,
            close_on_escape: true,
            modal: false,
            backdrop: false,
            autofocus: true,
            restore_focus: true,
            component_route: "/popup".to_string(),
            native_width: 400.0,
            native_height: 300.0,
        }
    }
}

impl PopupDefaults {
    /// Geometry settings as a placement spec.
    pub fn placement_spec(&self) -> PlacementSpec {
        PlacementSpec {
            placement: self.placement,
            offset: self.offset,
            flip: self.flip,
            shift: self.shift,
            viewport_padding: self.viewport_padding,
        }
    }

    /// Fallback size for `Auto` dimensions.
    pub fn native_size(&self) -> Size {
        Size::new(self.native_width, self.native_height)
    }

    /// Reject values no popup could be laid out with.
    pub fn validate(&self) -> Result<(), Error> {
        let non_negative: [(&'static str, f64); 4] = [
            ("offset", self.offset),
            ("viewport_padding", self.viewport_padding),
            ("native_width", self.native_width),
            ("native_height", self.native_height),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("expected a non-negative number, got {value}")));
            }
        }
        for (field, dim) in [("width", self.width), ("height", self.height)] {
            if let Dimension::Px(v) = dim
                && (!v.is_finite() || v <= 0.0)
            {
                return Err(invalid(field, format!("expected a positive size, got {v}")));
            }
        }
        for (field, max) in [("max_width", self.max_width), ("max_height", self.max_height)] {
            if let Some(v) = max
                && (!v.is_finite() || v <= 0.0)
            {
                return Err(invalid(field, format!("expected a positive bound, got {v}")));
            }
        }
        if !self.component_route.starts_with('/') && !self.component_route.contains("://") {
            return Err(invalid(
                "component_route",
                format!("expected an absolute route, got '{}'", self.component_route),
            ));
        }
        Ok(())
    }
}

/// Validation error without a path.
fn invalid(field: &'static str, message: String) -> Error {
    Error::Validation {
        path: None,
        field,
        message,
    }
}
