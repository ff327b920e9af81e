//! Test support for popup-core unit and integration tests.
//! In-memory fakes for every host capability, plus a bundle wiring them into a
//! [`Host`]. They record what the core asked for and let a test drive events
//! and transitions by hand. Intended for the test suite only.

use std::{
    mem,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use popup_channel::{BroadcastHub, ChannelEnv, Endpoint, Peers};
use popup_config::{EnvironmentPreference, ProviderConfig};
use popup_geom::{AnchorRect, Point, Size};
use popup_protocol::{PopupResult, Theme};
use serde_json::Value;
use tokio::time::timeout;

use crate::{
    child::ChildHandle,
    error::HostError,
    handle::PopupHandle,
    host::{
        AnchorSource, ComponentMounter, ContainerRuntime, ContainerSlot, Deferred, Dom, DomEvent,
        DomEventKind, DomFrame, DomHandler, DomLayer, DomListenerId, ElementRef, FrameSpec, Host,
        LayerPlacement, LayerSpec, MountedComponent, NativeResult, NativeWindow,
        NativeWindowEvents, NativeWindowRequest, ThemeCell,
    },
    provider::PopupProvider,
};

/// Viewport every fake page starts with.
pub const TEST_VIEWPORT: Size = Size {
    width: 1024.0,
    height: 768.0,
};

/// Element ids handed out by fakes. Shared so ids never collide across fakes.
static NEXT_ELEMENT: AtomicU64 = AtomicU64::new(1);

/// Fresh element id.
fn next_element() -> ElementRef {
    ElementRef(NEXT_ELEMENT.fetch_add(1, Ordering::Relaxed))
}

/// A frame mounted in a [`FakeLayer`].
pub struct FakeFrame {
    /// How the frame was mounted.
    spec: FrameSpec,
    /// Mailbox of the frame's context.
    endpoint: Endpoint,
}

impl FakeFrame {
    /// How the frame was mounted.
    pub fn spec(&self) -> &FrameSpec {
        &self.spec
    }

    /// Mailbox of the frame's context.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }
}

impl DomFrame for FakeFrame {
    fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }
}

/// Overlay layer that records everything done to it.
pub struct FakeLayer {
    /// Spec the layer was created with.
    spec: LayerSpec,
    /// Popup container element.
    container: ElementRef,
    /// Focusable element inside the container, if any.
    focusable: Option<ElementRef>,
    /// Every placement applied, in order.
    placements: Mutex<Vec<LayerPlacement>>,
    /// Theme currently applied.
    theme: Mutex<Theme>,
    /// Frames mounted in the container.
    frames: Mutex<Vec<Arc<FakeFrame>>>,
    /// Exit transitions wait for `finish_exit` when set.
    manual_exit: bool,
    /// Exit transition waiting for `finish_exit`.
    pending_exit: Mutex<Option<Deferred>>,
    /// Set by `remove`.
    removed: AtomicBool,
}

impl FakeLayer {
    fn new(spec: &LayerSpec, focusable: bool, manual_exit: bool) -> Self {
        Self {
            container: next_element(),
            focusable: focusable.then(next_element),
            placements: Mutex::new(vec![spec.placement]),
            theme: Mutex::new(spec.theme),
            frames: Mutex::new(Vec::new()),
            manual_exit,
            pending_exit: Mutex::new(None),
            removed: AtomicBool::new(false),
            spec: spec.clone(),
        }
    }

    /// Spec the layer was created with.
    pub fn spec(&self) -> &LayerSpec {
        &self.spec
    }

    /// Focusable element inside the container.
    pub fn focusable(&self) -> Option<ElementRef> {
        self.focusable
    }

    /// Latest placement applied.
    pub fn placement(&self) -> LayerPlacement {
        self.placements
            .lock()
            .last()
            .copied()
            .unwrap_or(self.spec.placement)
    }

    /// Every placement applied, starting with the initial one.
    pub fn placements(&self) -> Vec<LayerPlacement> {
        self.placements.lock().clone()
    }

    /// Theme currently applied.
    pub fn theme(&self) -> Theme {
        *self.theme.lock()
    }

    /// Most recently mounted frame.
    pub fn frame(&self) -> Option<Arc<FakeFrame>> {
        self.frames.lock().last().cloned()
    }

    /// True once removed from the page.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Whether an exit transition is waiting to finish.
    pub fn exit_pending(&self) -> bool {
        self.pending_exit.lock().is_some()
    }

    /// Complete a pending exit transition.
    pub fn finish_exit(&self) {
        let done = self.pending_exit.lock().take();
        if let Some(done) = done {
            done();
        }
    }
}

impl DomLayer for FakeLayer {
    fn container(&self) -> ElementRef {
        self.container
    }

    fn contains(&self, element: ElementRef) -> bool {
        element == self.container || Some(element) == self.focusable
    }

    fn set_placement(&self, placement: LayerPlacement) {
        self.placements.lock().push(placement);
    }

    fn set_theme(&self, theme: Theme) {
        *self.theme.lock() = theme;
    }

    fn mount_frame(&self, spec: FrameSpec) -> Result<Arc<dyn DomFrame>, HostError> {
        let frame = Arc::new(FakeFrame {
            endpoint: Endpoint::new(format!("frame-{}", spec.params.popup_id)),
            spec,
        });
        self.frames.lock().push(frame.clone());
        Ok(frame)
    }

    fn first_focusable(&self) -> Option<ElementRef> {
        self.focusable
    }

    fn play_exit_transition(&self, done: Deferred) {
        if self.manual_exit {
            *self.pending_exit.lock() = Some(done);
        } else {
            done();
        }
    }

    fn remove(&self) {
        self.removed.store(true, Ordering::SeqCst);
        for f in self.frames.lock().iter() {
            f.endpoint.close();
        }
    }
}

/// Host page fake.
pub struct FakeOverlayDom {
    /// Current viewport size.
    viewport: Mutex<Size>,
    /// Every layer created, in order.
    layers: Mutex<Vec<Arc<FakeLayer>>>,
    /// Registered page listeners.
    listeners: Mutex<Vec<(DomListenerId, DomEventKind, DomHandler)>>,
    /// Next listener id.
    next_listener: AtomicU64,
    /// Currently focused element.
    active: Mutex<Option<ElementRef>>,
    /// Every element focused, in order.
    focus_log: Mutex<Vec<ElementRef>>,
    /// Layers get a focusable descendant when set.
    focusable_layers: AtomicBool,
    /// Transitions wait for the test when set.
    manual_transitions: AtomicBool,
    /// Open transitions waiting for the test.
    pending_open: Mutex<Vec<Deferred>>,
    /// Error returned by the next `create_layer`.
    layer_failure: Mutex<Option<HostError>>,
    /// Blob urls handed out.
    blobs: Mutex<Vec<String>>,
    /// Blob urls revoked.
    revoked: Mutex<Vec<String>>,
}

impl Default for FakeOverlayDom {
    fn default() -> Self {
        Self {
            viewport: Mutex::new(TEST_VIEWPORT),
            layers: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            active: Mutex::new(None),
            focus_log: Mutex::new(Vec::new()),
            focusable_layers: AtomicBool::new(true),
            manual_transitions: AtomicBool::new(false),
            pending_open: Mutex::new(Vec::new()),
            layer_failure: Mutex::new(None),
            blobs: Mutex::new(Vec::new()),
            revoked: Mutex::new(Vec::new()),
        }
    }
}

impl FakeOverlayDom {
    /// Resize the viewport.
    pub fn set_viewport(&self, size: Size) {
        *self.viewport.lock() = size;
    }

    /// A fresh element outside every layer.
    pub fn element(&self) -> ElementRef {
        next_element()
    }

    /// Pretend `element` has focus.
    pub fn set_active(&self, element: Option<ElementRef>) {
        *self.active.lock() = element;
    }

    /// Elements focused by the core, in order.
    pub fn focus_log(&self) -> Vec<ElementRef> {
        self.focus_log.lock().clone()
    }

    /// Give new layers a focusable descendant.
    pub fn set_focusable_layers(&self, on: bool) {
        self.focusable_layers.store(on, Ordering::SeqCst);
    }

    /// Hold open and exit transitions until the test runs them.
    pub fn set_manual_transitions(&self, on: bool) {
        self.manual_transitions.store(on, Ordering::SeqCst);
    }

    /// Run every pending open transition callback.
    pub fn finish_open_transitions(&self) {
        let pending = mem::take(&mut *self.pending_open.lock());
        for done in pending {
            done();
        }
    }

    /// Fail the next `create_layer` with `error`.
    pub fn fail_next_layer(&self, error: HostError) {
        *self.layer_failure.lock() = Some(error);
    }

    /// Every layer created, in order.
    pub fn layers(&self) -> Vec<Arc<FakeLayer>> {
        self.layers.lock().clone()
    }

    /// Most recently created layer.
    pub fn last_layer(&self) -> Option<Arc<FakeLayer>> {
        self.layers.lock().last().cloned()
    }

    /// Number of registered page listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver `event` to every listener of its kind.
    pub fn dispatch(&self, event: &DomEvent) {
        let kind = event.kind();
        let handlers: Vec<DomHandler> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| h.clone())
            .collect();
        for h in handlers {
            h(event);
        }
    }

    /// Dispatch a key press.
    pub fn press_key(&self, key: &str) {
        self.dispatch(&DomEvent::KeyDown {
            key: key.to_string(),
        });
    }

    /// Dispatch a pointer press on `target`.
    pub fn click(&self, target: Option<ElementRef>) {
        self.dispatch(&DomEvent::PointerDown { target });
    }

    /// Blob urls handed out, in order.
    pub fn blobs_created(&self) -> Vec<String> {
        self.blobs.lock().clone()
    }

    /// Blob urls revoked, in order.
    pub fn blobs_revoked(&self) -> Vec<String> {
        self.revoked.lock().clone()
    }
}

impl Dom for FakeOverlayDom {
    fn viewport(&self) -> Size {
        *self.viewport.lock()
    }

    fn create_layer(&self, spec: &LayerSpec) -> Result<Arc<dyn DomLayer>, HostError> {
        let failure = self.layer_failure.lock().take();
        if let Some(e) = failure {
            return Err(e);
        }
        let layer = Arc::new(FakeLayer::new(
            spec,
            self.focusable_layers.load(Ordering::SeqCst),
            self.manual_transitions.load(Ordering::SeqCst),
        ));
        self.layers.lock().push(layer.clone());
        Ok(layer)
    }

    fn active_element(&self) -> Option<ElementRef> {
        *self.active.lock()
    }

    fn focus(&self, element: ElementRef) {
        *self.active.lock() = Some(element);
        self.focus_log.lock().push(element);
    }

    fn add_listener(&self, kind: DomEventKind, handler: DomHandler) -> DomListenerId {
        let id = DomListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, kind, handler));
        id
    }

    fn remove_listener(&self, id: DomListenerId) {
        self.listeners.lock().retain(|(l, _, _)| *l != id);
    }

    fn after_open_transition(&self, done: Deferred) {
        if self.manual_transitions.load(Ordering::SeqCst) {
            self.pending_open.lock().push(done);
        } else {
            done();
        }
    }

    fn create_blob_url(&self, markup: &str) -> Result<String, HostError> {
        let mut blobs = self.blobs.lock();
        let url = format!("blob:fake/{}-{}", blobs.len() + 1, markup.len());
        blobs.push(url.clone());
        Ok(url)
    }

    fn revoke_blob_url(&self, url: &str) {
        self.revoked.lock().push(url.to_string());
    }
}

/// Native window fake.
pub struct FakeWindow {
    /// Window id.
    id: String,
    /// Mailbox of the window's context.
    endpoint: Endpoint,
    /// Set by `close`.
    closed: AtomicBool,
}

impl FakeWindow {
    /// True once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl NativeWindow for FakeWindow {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.endpoint.close();
    }
}

/// Container runtime fake. Requests are recorded; readiness, results, and
/// errors are delivered by the test, by request index.
#[derive(Default)]
pub struct FakeContainerRuntime {
    /// Every request, in order.
    requests: Mutex<Vec<NativeWindowRequest>>,
    /// Event sinks, by request index.
    events: Mutex<Vec<Arc<dyn NativeWindowEvents>>>,
    /// Windows handed out, by request index.
    windows: Mutex<Vec<Arc<FakeWindow>>>,
    /// Error returned by the next `show_popup_window`.
    rejection: Mutex<Option<HostError>>,
    /// Screen offset reported to adapters.
    offset: Mutex<Option<Point>>,
}

impl FakeContainerRuntime {
    /// Screen offset reported to adapters.
    pub fn set_screen_offset(&self, offset: Option<Point>) {
        *self.offset.lock() = offset;
    }

    /// Reject the next window request synchronously.
    pub fn reject_next(&self, error: HostError) {
        *self.rejection.lock() = Some(error);
    }

    /// Every request, in order.
    pub fn requests(&self) -> Vec<NativeWindowRequest> {
        self.requests.lock().clone()
    }

    /// Most recent request.
    pub fn last_request(&self) -> Option<NativeWindowRequest> {
        self.requests.lock().last().cloned()
    }

    fn events(&self, index: usize) -> Option<Arc<dyn NativeWindowEvents>> {
        self.events.lock().get(index).cloned()
    }

    /// Report window `index` ready and return it.
    pub fn deliver_ready(&self, index: usize) -> Option<Arc<FakeWindow>> {
        let events = self.events(index)?;
        let window = Arc::new(FakeWindow {
            id: format!("native-{index}"),
            endpoint: Endpoint::new(format!("native-{index}")),
            closed: AtomicBool::new(false),
        });
        self.windows.lock().push(window.clone());
        events.on_ready(window.clone());
        Some(window)
    }

    /// Report `result` for request `index`.
    pub fn deliver_result(&self, index: usize, result: NativeResult) {
        if let Some(events) = self.events(index) {
            events.on_result(result);
        }
    }

    /// Report `error` for request `index`.
    pub fn deliver_error(&self, index: usize, error: HostError) {
        if let Some(events) = self.events(index) {
            events.on_error(error);
        }
    }
}

impl ContainerRuntime for FakeContainerRuntime {
    fn show_popup_window(
        &self,
        request: NativeWindowRequest,
        events: Arc<dyn NativeWindowEvents>,
    ) -> Result<(), HostError> {
        let rejection = self.rejection.lock().take();
        if let Some(e) = rejection {
            return Err(e);
        }
        self.requests.lock().push(request);
        self.events.lock().push(events);
        Ok(())
    }

    fn screen_offset(&self) -> Option<Point> {
        *self.offset.lock()
    }
}

/// One recorded mount.
#[derive(Clone)]
pub struct MountRecord {
    /// Container the component was mounted into.
    pub container: ElementRef,
    /// Component name.
    pub component: String,
    /// Props it was mounted with.
    pub props: Value,
    /// Handle the component received.
    pub child: ChildHandle,
}

/// Mounted component fake; counts unmounts on its mounter.
struct FakeMounted {
    /// Unmount counter shared with the mounter.
    unmounts: Arc<AtomicUsize>,
}

impl MountedComponent for FakeMounted {
    fn unmount(&self) {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Component mounter fake.
#[derive(Default)]
pub struct FakeMounter {
    /// Every mount, in order.
    mounts: Mutex<Vec<MountRecord>>,
    /// Unmounts so far.
    unmounts: Arc<AtomicUsize>,
    /// Error returned by the next mount.
    failure: Mutex<Option<HostError>>,
}

impl FakeMounter {
    /// Fail the next mount with `error`.
    pub fn fail_next(&self, error: HostError) {
        *self.failure.lock() = Some(error);
    }

    /// Every mount, in order.
    pub fn mounts(&self) -> Vec<MountRecord> {
        self.mounts.lock().clone()
    }

    /// Child handle of the latest mount.
    pub fn last_child(&self) -> Option<ChildHandle> {
        self.mounts.lock().last().map(|m| m.child.clone())
    }

    /// Number of unmounts so far.
    pub fn unmount_count(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }
}

impl ComponentMounter for FakeMounter {
    fn mount(
        &self,
        container: ElementRef,
        component: &str,
        props: &Value,
        child: ChildHandle,
    ) -> Result<Box<dyn MountedComponent>, HostError> {
        let failure = self.failure.lock().take();
        if let Some(e) = failure {
            return Err(e);
        }
        self.mounts.lock().push(MountRecord {
            container,
            component: component.to_string(),
            props: props.clone(),
            child,
        });
        Ok(Box::new(FakeMounted {
            unmounts: self.unmounts.clone(),
        }))
    }
}

/// Anchor whose element can move or leave the page.
pub struct DetachableAnchor {
    /// Current rect; `None` once detached.
    rect: Mutex<Option<AnchorRect>>,
}

impl DetachableAnchor {
    /// Anchor at `rect`.
    pub fn new(rect: AnchorRect) -> Arc<Self> {
        Arc::new(Self {
            rect: Mutex::new(Some(rect)),
        })
    }

    /// Move the anchor.
    pub fn move_to(&self, rect: AnchorRect) {
        *self.rect.lock() = Some(rect);
    }

    /// Remove the anchor from the page.
    pub fn detach(&self) {
        *self.rect.lock() = None;
    }
}

impl AnchorSource for DetachableAnchor {
    fn measure(&self) -> Option<AnchorRect> {
        *self.rect.lock()
    }
}

/// Every fake, wired into one [`Host`].
pub struct TestHost {
    /// Host theme.
    pub theme: Arc<ThemeCell>,
    /// Host page.
    pub dom: Arc<FakeOverlayDom>,
    /// Structured content renderer.
    pub mounter: Arc<FakeMounter>,
    /// Container runtime; absent until injected.
    pub runtime: Arc<FakeContainerRuntime>,
    /// Mailbox of the host context.
    pub local: Endpoint,
    /// Broadcast hub of the host.
    pub hub: BroadcastHub,
    /// The bundled host handed to providers.
    pub host: Host,
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost {
    /// Page host with a mounter and no container runtime.
    pub fn new() -> Self {
        let theme = Arc::new(ThemeCell::new(Theme::Light));
        let dom = Arc::new(FakeOverlayDom::default());
        let mounter = Arc::new(FakeMounter::default());
        let runtime = Arc::new(FakeContainerRuntime::default());
        let local = Endpoint::new("host");
        let hub = BroadcastHub::new();
        let host = Host {
            theme: theme.clone(),
            dom: dom.clone(),
            mounter: Some(mounter.clone()),
            channels: ChannelEnv::host(hub.clone(), local.clone()),
            container: ContainerSlot::default(),
        };
        Self {
            theme,
            dom,
            mounter,
            runtime,
            local,
            hub,
            host,
        }
    }

    /// Host with the container runtime injected.
    pub fn with_container() -> Self {
        let t = Self::new();
        t.inject_container();
        t
    }

    /// Same host without a component mounter.
    pub fn without_mounter(mut self) -> Self {
        self.host.mounter = None;
        self
    }

    /// Make the container runtime available.
    pub fn inject_container(&self) {
        self.host.container.inject(self.runtime.clone());
    }

    /// Remove the container runtime.
    pub fn eject_container(&self) {
        self.host.container.eject();
    }

    /// Provider over this host with `environment` and default settings.
    pub fn provider(&self, environment: EnvironmentPreference) -> PopupProvider {
        PopupProvider::new(
            self.host.clone(),
            ProviderConfig {
                environment,
                ..ProviderConfig::default()
            },
        )
    }

    /// Messaging environment of content running in a frame or window whose
    /// mailbox is `endpoint`.
    pub fn content_env(&self, endpoint: &Endpoint) -> ChannelEnv {
        ChannelEnv::isolated(endpoint.clone(), Peers::with_parent(self.local.clone()))
    }
}

/// Wait up to `timeout_ms` for `handle` to resolve.
pub async fn result_within(handle: &PopupHandle, timeout_ms: u64) -> Option<PopupResult> {
    timeout(Duration::from_millis(timeout_ms), handle.result())
        .await
        .ok()
}
