//! Capabilities the embedding host supplies.
//!
//! The core never touches a page or a native shell directly. Everything it
//! needs is behind the traits here: an observable theme, anchor measurement,
//! the page DOM used by the in-page overlay, an optional native container
//! runtime, and an optional component mounter for structured content.
//! `test_support` has fakes for all of them.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use popup_channel::{ChannelEnv, Endpoint, run_isolated};
use popup_geom::{AnchorRect, Point, Size};
use popup_protocol::{LaunchParams, PopupId, Theme};
use serde_json::Value;
use tracing::{debug, info};

use crate::{child::ChildHandle, error::HostError};

/// Callback for theme changes.
pub type ThemeListener = Arc<dyn Fn(Theme) + Send + Sync>;

/// Token returned by [`ThemeSource::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Readable, observable host theme indicator.
pub trait ThemeSource: Send + Sync {
    /// Current theme. Must not block.
    fn current(&self) -> Theme;
    /// Register a change listener.
    fn watch(&self, listener: ThemeListener) -> WatchId;
    /// Remove a change listener.
    fn unwatch(&self, id: WatchId);
}

/// Plain observable theme value.
pub struct ThemeCell {
    /// Current value.
    current: Mutex<Theme>,
    /// Registered listeners.
    watchers: Mutex<Vec<(WatchId, ThemeListener)>>,
    /// Next watch id.
    next: AtomicU64,
}

impl ThemeCell {
    /// Cell holding `theme` with no watchers.
    pub fn new(theme: Theme) -> Self {
        Self {
            current: Mutex::new(theme),
            watchers: Mutex::new(Vec::new()),
            next: AtomicU64::new(1),
        }
    }

    /// Change the theme, notifying listeners when it actually changed. A
    /// failing listener does not stop the rest.
    pub fn set(&self, theme: Theme) {
        {
            let mut cur = self.current.lock();
            if *cur == theme {
                return;
            }
            *cur = theme;
        }
        info!(theme = %theme, "host theme changed");
        let watchers: Vec<ThemeListener> =
            self.watchers.lock().iter().map(|(_, l)| l.clone()).collect();
        for l in watchers {
            run_isolated("theme watcher", || {
                l(theme);
                Ok(())
            });
        }
    }

    /// Number of live watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }
}

impl Default for ThemeCell {
    fn default() -> Self {
        Self::new(Theme::default())
    }
}

impl ThemeSource for ThemeCell {
    fn current(&self) -> Theme {
        *self.current.lock()
    }

    fn watch(&self, listener: ThemeListener) -> WatchId {
        let id = WatchId(self.next.fetch_add(1, Ordering::Relaxed));
        self.watchers.lock().push((id, listener));
        id
    }

    fn unwatch(&self, id: WatchId) {
        self.watchers.lock().retain(|(w, _)| *w != id);
    }
}

/// Measures a trigger element. `None` means the element is gone, which is
/// treated like a zero-area anchor.
pub trait AnchorSource: Send + Sync {
    /// Current viewport rect, or `None` when the anchor is gone.
    fn measure(&self) -> Option<AnchorRect>;
}

impl AnchorSource for AnchorRect {
    fn measure(&self) -> Option<AnchorRect> {
        Some(*self)
    }
}

/// Opaque reference to a DOM element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(pub u64);

/// DOM events the overlay listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEventKind {
    /// Pointer pressed anywhere in the page.
    PointerDown,
    /// Key pressed anywhere in the page.
    KeyDown,
}

/// A dispatched DOM event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEvent {
    /// Pointer pressed on `target` (absent when outside any element).
    PointerDown { target: Option<ElementRef> },
    /// Key pressed; `key` follows DOM `KeyboardEvent.key` naming.
    KeyDown { key: String },
}

impl DomEvent {
    /// Kind used to route this event to listeners.
    pub fn kind(&self) -> DomEventKind {
        match self {
            Self::PointerDown { .. } => DomEventKind::PointerDown,
            Self::KeyDown { .. } => DomEventKind::KeyDown,
        }
    }
}

/// DOM event listener.
pub type DomHandler = Arc<dyn Fn(&DomEvent) + Send + Sync>;

/// Token returned by [`Dom::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomListenerId(pub u64);

/// Deferred work handed to the host, run once.
pub type Deferred = Box<dyn FnOnce() + Send>;

/// Where the popup container sits inside its overlay layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerPlacement {
    /// Absolutely positioned at viewport coordinates.
    Absolute { x: i32, y: i32 },
    /// Centered by layout, so it stays centered across viewport resizes.
    Centered,
}

/// Size of the popup container; `None` sizes to content.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContainerSize {
    /// Fixed width in pixels.
    pub width: Option<f64>,
    /// Fixed height in pixels.
    pub height: Option<f64>,
}

/// Everything needed to build one overlay layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    /// Popup the layer hosts.
    pub popup_id: PopupId,
    /// Theme applied on creation.
    pub theme: Theme,
    /// Block interaction with the page behind.
    pub modal: bool,
    /// Dim the page behind.
    pub backdrop: bool,
    /// Container size.
    pub size: ContainerSize,
    /// Initial container position.
    pub placement: LayerPlacement,
    /// Extra class for the container.
    pub class_name: Option<String>,
    /// Stacking order override.
    pub z_index: Option<i32>,
}

/// Content of an isolated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSource {
    /// Load from a url; launch parameters are already in its query.
    Src(String),
    /// Inline markup.
    Inline(String),
}

/// Isolated, sandboxed content frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSpec {
    /// What the frame loads.
    pub source: FrameSource,
    /// Value of the frame's sandbox attribute.
    pub sandbox: String,
    /// Identity handed to the frame's content.
    pub params: LaunchParams,
}

/// A mounted frame.
pub trait DomFrame: Send + Sync {
    /// Mailbox of the frame's execution context.
    fn endpoint(&self) -> Endpoint;
}

/// Full-viewport fixed layer holding one popup container.
pub trait DomLayer: Send + Sync {
    /// The positioned popup container.
    fn container(&self) -> ElementRef;
    /// Whether `element` is the container or inside it.
    fn contains(&self, element: ElementRef) -> bool;
    /// Move the container.
    fn set_placement(&self, placement: LayerPlacement);
    /// Apply `theme` to the container.
    fn set_theme(&self, theme: Theme);
    /// Create an isolated frame inside the container.
    fn mount_frame(&self, spec: FrameSpec) -> Result<Arc<dyn DomFrame>, HostError>;
    /// First focusable descendant of the container.
    fn first_focusable(&self) -> Option<ElementRef>;
    /// Play the exit transition, then call `done` exactly once.
    fn play_exit_transition(&self, done: Deferred);
    /// Detach the layer from the page.
    fn remove(&self);
}

/// The host page, as far as popups are concerned.
pub trait Dom: Send + Sync {
    /// Current viewport size in CSS pixels.
    fn viewport(&self) -> Size;
    /// Create and insert a layer built from `spec`.
    fn create_layer(&self, spec: &LayerSpec) -> Result<Arc<dyn DomLayer>, HostError>;
    /// Element that has focus.
    fn active_element(&self) -> Option<ElementRef>;
    /// Move focus to `element`.
    fn focus(&self, element: ElementRef);
    /// Listen for page-wide events of `kind`.
    fn add_listener(&self, kind: DomEventKind, handler: DomHandler) -> DomListenerId;
    /// Stop a listener added with `add_listener`.
    fn remove_listener(&self, id: DomListenerId);
    /// Run `done` once the open transition of the newest layer settles.
    fn after_open_transition(&self, done: Deferred);
    /// Materialize `markup` as a transient resource url.
    fn create_blob_url(&self, markup: &str) -> Result<String, HostError>;
    /// Release a url from `create_blob_url`.
    fn revoke_blob_url(&self, url: &str);
}

/// How a native window reacts to losing focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeBlur {
    /// Stay open; the container treats it as modal.
    ModalLike,
    /// Close when focus leaves it.
    CloseOnBlur,
}

/// Arguments to [`ContainerRuntime::show_popup_window`].
#[derive(Debug, Clone, PartialEq)]
pub struct NativeWindowRequest {
    /// Page to load, launch parameters included.
    pub url: String,
    /// Screen coordinates.
    pub x: i32,
    /// Screen coordinates.
    pub y: i32,
    /// Window width in pixels.
    pub width: u32,
    /// Window height in pixels.
    pub height: u32,
    /// Focus-loss behavior.
    pub blur: NativeBlur,
    /// Take focus on show.
    pub focus: bool,
    /// Draw window chrome.
    pub frame: bool,
    /// Window background, as a CSS color.
    pub background_color: Option<String>,
    /// Keep above other windows.
    pub always_on_top: bool,
    /// Payload the child reads its popup id, channel id, and theme from.
    pub custom_data: Value,
}

/// How a native window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOutcome {
    /// Content produced a value.
    Submitted,
    /// Window went away without one.
    Dismissed,
}

/// Result callback payload from the container.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeResult {
    /// How the window ended.
    pub outcome: NativeOutcome,
    /// Value reported with it.
    pub payload: Option<Value>,
}

/// A live native popup window.
pub trait NativeWindow: Send + Sync {
    /// Host-assigned window id.
    fn id(&self) -> String;
    /// Mailbox of the window's execution context.
    fn endpoint(&self) -> Endpoint;
    /// Close the window. Idempotent.
    fn close(&self);
}

/// Callbacks the container invokes for one window. Any of them may arrive
/// after the popup was closed from our side.
pub trait NativeWindowEvents: Send + Sync {
    /// The window exists and its content is loading.
    fn on_ready(&self, window: Arc<dyn NativeWindow>);
    /// The container reports how the window ended.
    fn on_result(&self, result: NativeResult);
    /// The window failed after the request was accepted.
    fn on_error(&self, error: HostError);
}

/// Native desktop container runtime.
pub trait ContainerRuntime: Send + Sync {
    /// Ask the container to open a window. Returning `Ok` means the request was
    /// accepted; readiness and failures arrive through `events`.
    fn show_popup_window(
        &self,
        request: NativeWindowRequest,
        events: Arc<dyn NativeWindowEvents>,
    ) -> Result<(), HostError>;
    /// Offset of the host viewport on screen, if the container knows it.
    fn screen_offset(&self) -> Option<Point>;
}

/// A component rendered directly into a popup container.
pub trait MountedComponent: Send + Sync {
    /// Remove the component and release its resources.
    fn unmount(&self);
}

/// Host-supplied renderer for structured content.
pub trait ComponentMounter: Send + Sync {
    /// Render component `name` with `props` into `container`.
    fn mount(
        &self,
        container: ElementRef,
        component: &str,
        props: &Value,
        child: ChildHandle,
    ) -> Result<Box<dyn MountedComponent>, HostError>;
}

/// Slot the container runtime lives in. Hosts may inject the runtime after
/// startup, so availability is checked on every probe.
#[derive(Clone, Default)]
pub struct ContainerSlot {
    /// Injected runtime, if any.
    runtime: Arc<RwLock<Option<Arc<dyn ContainerRuntime>>>>,
}

impl fmt::Debug for ContainerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerSlot")
            .field("present", &self.is_present())
            .finish()
    }
}

impl ContainerSlot {
    /// Slot with a runtime already present.
    pub fn with(runtime: Arc<dyn ContainerRuntime>) -> Self {
        let slot = Self::default();
        slot.inject(runtime);
        slot
    }

    /// Make `runtime` available to subsequent probes.
    pub fn inject(&self, runtime: Arc<dyn ContainerRuntime>) {
        *self.runtime.write() = Some(runtime);
        debug!("container runtime injected");
    }

    /// Remove the runtime.
    pub fn eject(&self) {
        *self.runtime.write() = None;
        debug!("container runtime ejected");
    }

    /// Current runtime, if one is present right now.
    pub fn probe(&self) -> Option<Arc<dyn ContainerRuntime>> {
        self.runtime.read().clone()
    }

    /// True when a runtime is present right now.
    pub fn is_present(&self) -> bool {
        self.runtime.read().is_some()
    }
}

/// Every host capability, bundled.
#[derive(Clone)]
pub struct Host {
    /// Host theme and its change notifications.
    pub theme: Arc<dyn ThemeSource>,
    /// Page access for overlays.
    pub dom: Arc<dyn Dom>,
    /// Renderer for structured content; without one, component popups are
    /// rejected by the overlay.
    pub mounter: Option<Arc<dyn ComponentMounter>>,
    /// Messaging environment of the host context.
    pub channels: ChannelEnv,
    /// Native container runtime, probed on use.
    pub container: ContainerSlot,
}
