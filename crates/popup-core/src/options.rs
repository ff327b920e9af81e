//! Caller-facing popup options and their merge with configured defaults.

use std::{fmt, sync::Arc};

use popup_channel::run_isolated;
use popup_config::{BlurBehavior, Dimension, PopupDefaults};
use popup_geom::{AnchorRect, Placement, PlacementSpec, Size, parse_placement};
use popup_protocol::{Message, PopupId, PopupResult, Theme};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    host::AnchorSource,
};

/// What the popup shows.
#[derive(Debug, Clone, PartialEq)]
pub enum PopupContent {
    /// A page loaded in an isolated context.
    Url(String),
    /// A host component rendered with `props`.
    Component {
        /// Component name known to the mounter.
        name: String,
        /// Props passed at mount.
        props: Value,
    },
    /// Raw markup.
    Markup(String),
}

impl PopupContent {
    /// True for structured content.
    pub fn is_component(&self) -> bool {
        matches!(self, Self::Component { .. })
    }

    /// Reject descriptors no adapter can serve.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Url(u) if u.trim().is_empty() => {
                Err(Error::ContentUnsupported("empty url".into()))
            }
            Self::Component { name, .. } if name.trim().is_empty() => {
                Err(Error::ContentUnsupported("empty component name".into()))
            }
            _ => Ok(()),
        }
    }
}

/// Called once the popup is ready.
pub type OpenCallback = Arc<dyn Fn(&PopupId) + Send + Sync>;
/// Called with the final result.
pub type CloseCallback = Arc<dyn Fn(&PopupResult) + Send + Sync>;
/// Called when opening or the host fails after `open` returned.
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;
/// Called for every inbound message from the popup content.
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Lifecycle callbacks. Each invocation is isolated: a panicking callback is
/// logged and does not disturb the popup.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Runs once the popup is live.
    pub on_open: Option<OpenCallback>,
    /// Runs once with the final result.
    pub on_close: Option<CloseCallback>,
    /// Runs for each error reported while open.
    pub on_error: Option<ErrorCallback>,
    /// Runs for each message from the content.
    pub on_message: Option<MessageCallback>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

impl Callbacks {
    /// Fire `on_open`.
    pub(crate) fn opened(&self, id: &PopupId) {
        if let Some(f) = &self.on_open {
            run_isolated("on_open", || {
                f(id);
                Ok(())
            });
        }
    }

    /// Fire `on_close`.
    pub(crate) fn closed(&self, result: &PopupResult) {
        if let Some(f) = &self.on_close {
            run_isolated("on_close", || {
                f(result);
                Ok(())
            });
        }
    }

    /// Fire `on_error`.
    pub(crate) fn failed(&self, error: &Error) {
        if let Some(f) = &self.on_error {
            run_isolated("on_error", || {
                f(error);
                Ok(())
            });
        }
    }

    /// Fire `on_message`.
    pub(crate) fn message(&self, msg: &Message) {
        if let Some(f) = &self.on_message {
            run_isolated("on_message", || {
                f(msg);
                Ok(())
            });
        }
    }
}

/// Native container window overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerOverrides {
    /// Draw window chrome. Off by default.
    pub frame: Option<bool>,
    /// Window background, as a CSS color.
    pub background_color: Option<String>,
    /// Take focus on show. On by default.
    pub focus: Option<bool>,
    /// Keep above other windows. Off by default.
    pub always_on_top: Option<bool>,
}

/// In-page overlay overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayOverrides {
    /// Sandbox attribute for isolated frames.
    pub sandbox: Option<String>,
    /// Extra class for the popup container.
    pub class_name: Option<String>,
    /// Stacking order of the layer.
    pub z_index: Option<i32>,
}

/// Sandbox applied to frames unless overridden.
pub const DEFAULT_SANDBOX: &str = "allow-scripts allow-forms allow-popups";

/// Options for one popup. Unset fields fall back to the provider defaults.
#[derive(Clone)]
pub struct PopupOptions {
    /// What the popup shows.
    pub content: PopupContent,
    /// Width.
    pub width: Option<Dimension>,
    /// Height.
    pub height: Option<Dimension>,
    /// Upper bound on width.
    pub max_width: Option<f64>,
    /// Upper bound on height.
    pub max_height: Option<f64>,
    /// Element the popup is positioned against; centered without one.
    pub anchor: Option<Arc<dyn AnchorSource>>,
    /// Preferred side and alignment.
    pub placement: Option<Placement>,
    /// Gap between anchor and popup.
    pub offset: Option<f64>,
    /// Swap sides on overflow.
    pub flip: Option<bool>,
    /// Slide along the cross axis on overflow.
    pub shift: Option<bool>,
    /// Margin kept clear on every viewport edge.
    pub viewport_padding: Option<f64>,
    /// What an outside press does.
    pub blur_behavior: Option<BlurBehavior>,
    /// Close on Escape.
    pub close_on_escape: Option<bool>,
    /// Block the page behind.
    pub modal: Option<bool>,
    /// Dim the page behind.
    pub backdrop: Option<bool>,
    /// Focus the popup once shown.
    pub autofocus: Option<bool>,
    /// Return focus on close.
    pub restore_focus: Option<bool>,
    /// Fixed theme for this popup; host theme changes are not relayed.
    pub theme: Option<Theme>,
    /// Initial data handed to the content.
    pub data: Option<Value>,
    /// Lifecycle callbacks.
    pub callbacks: Callbacks,
    /// Used only by the container adapter.
    pub container: ContainerOverrides,
    /// Used only by the overlay adapter.
    pub overlay: OverlayOverrides,
}

impl fmt::Debug for PopupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupOptions")
            .field("content", &self.content)
            .field("anchored", &self.anchor.is_some())
            .field("placement", &self.placement)
            .field("theme", &self.theme)
            .finish_non_exhaustive()
    }
}

impl PopupOptions {
    /// Options showing `content`, everything else defaulted.
    pub fn new(content: PopupContent) -> Self {
        Self {
            content,
            width: None,
            height: None,
            max_width: None,
            max_height: None,
            anchor: None,
            placement: None,
            offset: None,
            flip: None,
            shift: None,
            viewport_padding: None,
            blur_behavior: None,
            close_on_escape: None,
            modal: None,
            backdrop: None,
            autofocus: None,
            restore_focus: None,
            theme: None,
            data: None,
            callbacks: Callbacks::default(),
            container: ContainerOverrides::default(),
            overlay: OverlayOverrides::default(),
        }
    }

    /// Load `url` in an isolated context.
    pub fn url(url: impl Into<String>) -> Self {
        Self::new(PopupContent::Url(url.into()))
    }

    /// Render the registered component `name` with `props`.
    pub fn component(name: impl Into<String>, props: Value) -> Self {
        Self::new(PopupContent::Component {
            name: name.into(),
            props,
        })
    }

    /// Show inline `markup` in an isolated context.
    pub fn markup(markup: impl Into<String>) -> Self {
        Self::new(PopupContent::Markup(markup.into()))
    }

    /// Anchor to a fixed rect.
    pub fn anchor(self, rect: AnchorRect) -> Self {
        self.anchored_to(Arc::new(rect))
    }

    /// Anchor to a live element; it is measured at open and on reposition.
    pub fn anchored_to(mut self, source: Arc<dyn AnchorSource>) -> Self {
        self.anchor = Some(source);
        self
    }

    /// Preferred placement.
    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Preferred placement from a token such as `"top-end"`.
    pub fn placement_token(self, token: &str) -> Result<Self> {
        Ok(self.placement(parse_placement(token)?))
    }

    /// Fixed pixel size.
    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(Dimension::Px(width));
        self.height = Some(Dimension::Px(height));
        self
    }

    /// Upper bounds on size.
    pub fn max_size(mut self, width: f64, height: f64) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// Gap between anchor and popup.
    pub fn offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Allow flipping.
    pub fn flip(mut self, flip: bool) -> Self {
        self.flip = Some(flip);
        self
    }

    /// Allow shifting.
    pub fn shift(mut self, shift: bool) -> Self {
        self.shift = Some(shift);
        self
    }

    /// Viewport margin.
    pub fn viewport_padding(mut self, padding: f64) -> Self {
        self.viewport_padding = Some(padding);
        self
    }

    /// Outside press behavior.
    pub fn blur_behavior(mut self, behavior: BlurBehavior) -> Self {
        self.blur_behavior = Some(behavior);
        self
    }

    /// Escape key behavior.
    pub fn close_on_escape(mut self, enabled: bool) -> Self {
        self.close_on_escape = Some(enabled);
        self
    }

    /// Block the page behind.
    pub fn modal(mut self, modal: bool) -> Self {
        self.modal = Some(modal);
        self
    }

    /// Dim the page behind.
    pub fn backdrop(mut self, backdrop: bool) -> Self {
        self.backdrop = Some(backdrop);
        self
    }

    /// Focus the popup once shown.
    pub fn autofocus(mut self, enabled: bool) -> Self {
        self.autofocus = Some(enabled);
        self
    }

    /// Return focus on close.
    pub fn restore_focus(mut self, enabled: bool) -> Self {
        self.restore_focus = Some(enabled);
        self
    }

    /// Fix the theme, ignoring host changes.
    pub fn theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }

    /// Initial data for the content.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the open callback.
    pub fn on_open(mut self, f: impl Fn(&PopupId) + Send + Sync + 'static) -> Self {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set the close callback.
    pub fn on_close(mut self, f: impl Fn(&PopupResult) + Send + Sync + 'static) -> Self {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set the error callback.
    pub fn on_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    /// Set the message callback.
    pub fn on_message(mut self, f: impl Fn(&Message) + Send + Sync + 'static) -> Self {
        self.callbacks.on_message = Some(Arc::new(f));
        self
    }

    /// Native window overrides.
    pub fn container_overrides(mut self, overrides: ContainerOverrides) -> Self {
        self.container = overrides;
        self
    }

    /// Overlay overrides.
    pub fn overlay_overrides(mut self, overrides: OverlayOverrides) -> Self {
        self.overlay = overrides;
        self
    }

    /// Merge `defaults` under these options; set fields win. Structured
    /// content sizes to its content unless a size was given.
    pub fn resolve(self, defaults: &PopupDefaults) -> ResolvedOptions {
        let intrinsic = self.content.is_component();
        let dim = |given: Option<Dimension>, fallback: Dimension| match given {
            Some(d) => d,
            None if intrinsic => Dimension::Auto,
            None => fallback,
        };
        let placement = PlacementSpec {
            placement: self.placement.unwrap_or(defaults.placement),
            offset: self.offset.unwrap_or(defaults.offset),
            flip: self.flip.unwrap_or(defaults.flip),
            shift: self.shift.unwrap_or(defaults.shift),
            viewport_padding: self.viewport_padding.unwrap_or(defaults.viewport_padding),
        };
        ResolvedOptions {
            width: dim(self.width, defaults.width),
            height: dim(self.height, defaults.height),
            max_width: self.max_width.or(defaults.max_width),
            max_height: self.max_height.or(defaults.max_height),
            anchor: self.anchor,
            placement,
            blur_behavior: self.blur_behavior.unwrap_or(defaults.blur_behavior),
            close_on_escape: self.close_on_escape.unwrap_or(defaults.close_on_escape),
            modal: self.modal.unwrap_or(defaults.modal),
            backdrop: self.backdrop.unwrap_or(defaults.backdrop),
            autofocus: self.autofocus.unwrap_or(defaults.autofocus),
            restore_focus: self.restore_focus.unwrap_or(defaults.restore_focus),
            theme: self.theme,
            data: self.data,
            callbacks: self.callbacks,
            container: self.container,
            overlay: self.overlay,
            component_route: defaults.component_route.clone(),
            native_size: defaults.native_size(),
            content: self.content,
        }
    }
}

/// Fully merged options as adapters consume them.
#[derive(Clone)]
pub struct ResolvedOptions {
    /// What the popup shows.
    pub content: PopupContent,
    /// Width.
    pub width: Dimension,
    /// Height.
    pub height: Dimension,
    /// Upper bound on width.
    pub max_width: Option<f64>,
    /// Upper bound on height.
    pub max_height: Option<f64>,
    /// Anchor, if any.
    pub anchor: Option<Arc<dyn AnchorSource>>,
    /// Merged placement preferences.
    pub placement: PlacementSpec,
    /// Outside press behavior.
    pub blur_behavior: BlurBehavior,
    /// Close on Escape.
    pub close_on_escape: bool,
    /// Block the page behind.
    pub modal: bool,
    /// Dim the page behind.
    pub backdrop: bool,
    /// Focus the popup once shown.
    pub autofocus: bool,
    /// Return focus on close.
    pub restore_focus: bool,
    /// Caller-fixed theme, if any.
    pub theme: Option<Theme>,
    /// Initial data for the content.
    pub data: Option<Value>,
    /// Lifecycle callbacks.
    pub callbacks: Callbacks,
    /// Native window overrides.
    pub container: ContainerOverrides,
    /// Overlay overrides.
    pub overlay: OverlayOverrides,
    /// Route prefix for structured content in native windows.
    pub component_route: String,
    /// Size used where a concrete size is required and `Auto` was asked for.
    pub native_size: Size,
}

impl ResolvedOptions {
    /// Requested size with `Auto` replaced by the fixed fallback, then capped
    /// by the max bounds.
    pub fn concrete_size(&self) -> Size {
        let w = self.width.or(self.native_size.width);
        let h = self.height.or(self.native_size.height);
        Size::new(
            self.max_width.map_or(w, |m| w.min(m)),
            self.max_height.map_or(h, |m| h.min(m)),
        )
    }

    /// Measure the anchor now. Absent sources and detached elements come back
    /// as `None`.
    pub fn measure_anchor(&self) -> Option<AnchorRect> {
        self.anchor.as_ref().and_then(|a| a.measure())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn caller_wins_over_defaults() {
        let defaults = PopupDefaults {
            close_on_escape: false,
            offset: 10.0,
            ..PopupDefaults::default()
        };
        let r = PopupOptions::url("https://app.local/menu")
            .placement_token("top-end")
            .unwrap()
            .close_on_escape(true)
            .resolve(&defaults);
        assert!(r.close_on_escape);
        assert_eq!(r.placement.offset, 10.0);
        assert_eq!(r.placement.placement.to_string(), "top-end");
        assert_eq!(r.width, defaults.width);
        assert_eq!(r.component_route, "/popup");
    }

    #[test]
    fn bad_placement_token_is_a_geometry_error() {
        assert!(matches!(
            PopupOptions::url("https://app.local/").placement_token("middle"),
            Err(Error::Geometry(_))
        ));
    }

    #[test]
    fn components_default_to_intrinsic_size() {
        let r = PopupOptions::component("Picker", json!({})).resolve(&PopupDefaults::default());
        assert!(r.width.is_auto() && r.height.is_auto());
        let r = PopupOptions::component("Picker", json!({}))
            .size(200.0, 100.0)
            .resolve(&PopupDefaults::default());
        assert_eq!(r.width, Dimension::Px(200.0));
    }

    #[test]
    fn concrete_size_applies_fallback_and_caps() {
        let r = PopupOptions::component("Picker", json!({}))
            .max_size(350.0, 1000.0)
            .resolve(&PopupDefaults::default());
        assert_eq!(r.concrete_size(), Size::new(350.0, 300.0));
    }

    #[test]
    fn content_validation() {
        assert!(PopupContent::Url(" ".into()).validate().is_err());
        assert!(
            PopupContent::Component {
                name: String::new(),
                props: Value::Null
            }
            .validate()
            .is_err()
        );
        assert!(PopupContent::Markup(String::new()).validate().is_ok());
    }

    #[test]
    fn panicking_callbacks_are_contained() {
        let cb = Callbacks {
            on_open: Some(Arc::new(|_: &PopupId| panic!("caller bug"))),
            ..Callbacks::default()
        };
        cb.opened(&PopupId::new("p"));
    }
}
