//! In-page overlay layers.
//!
//! Each popup gets a full-viewport fixed layer with one positioned container.
//! Url and markup content go into an isolated, sandboxed frame and talk over
//! a point-to-point channel; structured content is mounted straight into the
//! container with a [`ChildHandle`] bound to the popup.

use std::{
    mem,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use popup_channel::{Channel, TransportHint, create_channel, run_isolated};
use popup_config::BlurBehavior;
use popup_geom::{AnchorRect, PlacementSpec, Size, constrain_size};
use popup_protocol::{
    CloseReason, LaunchParams, Message, MessageKind, PopupId, PopupResult, Theme,
};
use serde_json::{Value, json};
use tracing::{debug, info, trace, warn};

use super::{AdapterKind, OpenSet, PopupAdapter, place};
use crate::{
    child::{ChildHandle, ChildLink, ChildSubscription, ParentHandler},
    error::{Error, Result},
    handle::{Lifecycle, Phase, PopupControl, PopupHandle, result_from_payload},
    host::{
        AnchorSource, ContainerSize, DomEvent, DomEventKind, DomHandler, DomLayer, ElementRef,
        FrameSource, FrameSpec, Host, LayerPlacement, LayerSpec, MountedComponent,
    },
    options::{Callbacks, DEFAULT_SANDBOX, PopupContent, ResolvedOptions},
};

/// Cleanup registered while wiring a popup.
type Teardown = Box<dyn FnOnce() + Send>;

/// Adapter rendering popups as overlay layers in the host page.
pub struct OverlayAdapter {
    /// Host capabilities.
    host: Host,
    /// Popups currently open.
    open: OpenSet<OverlayPopup>,
}

/// One overlay popup.
struct OverlayPopup {
    /// Self reference, handed to the exit transition.
    this: Weak<Self>,
    /// Exactly-once state.
    lifecycle: Arc<Lifecycle>,
    /// Caller callbacks.
    callbacks: Callbacks,
    /// Channel to framed content.
    channel: Channel,
    /// Host capabilities.
    host: Host,
    /// Structured content is rendered in-page instead of framed.
    direct: bool,
    /// Requested size before clamping to the viewport.
    requested: Size,
    /// Placement preferences used on every reposition.
    placement: PlacementSpec,
    /// Current anchor; replaced by explicit repositions.
    anchor: Mutex<Option<Arc<dyn AnchorSource>>>,
    /// Theme currently applied.
    theme: Mutex<Theme>,
    /// Layer, once created.
    layer: Mutex<Option<Arc<dyn DomLayer>>>,
    /// Structured content, once mounted.
    mounted: Mutex<Option<Box<dyn MountedComponent>>>,
    /// Parent-message handlers of a bound child.
    child_handlers: Mutex<Vec<(ChildSubscription, ParentHandler)>>,
    /// Next child subscription id.
    next_sub: AtomicU64,
    /// Listener removal and unsubscribes, run once on teardown.
    teardown: Mutex<Vec<Teardown>>,
    /// Element focused before the popup opened.
    prior_focus: Option<ElementRef>,
    /// Return focus to `prior_focus` on teardown.
    restore_focus: bool,
    /// Set when teardown has run.
    finished: AtomicBool,
    /// Owning adapter's open set.
    set: OpenSet<Self>,
}

impl OverlayPopup {
    /// Popup id.
    fn id(&self) -> &PopupId {
        self.lifecycle.id()
    }

    /// Layer, once built.
    fn layer(&self) -> Option<Arc<dyn DomLayer>> {
        self.layer.lock().clone()
    }

    /// Run `f` during teardown.
    fn on_teardown(&self, f: impl FnOnce() + Send + 'static) {
        self.teardown.lock().push(Box::new(f));
    }

    /// Add a page listener removed on teardown.
    fn listen(&self, kind: DomEventKind, handler: DomHandler) {
        let id = self.host.dom.add_listener(kind, handler);
        let dom = self.host.dom.clone();
        self.on_teardown(move || dom.remove_listener(id));
    }

    /// Start closing: play the exit transition, then tear down.
    fn close(&self, result: PopupResult) {
        if !self.lifecycle.begin_close() {
            return;
        }
        let (Some(me), Some(layer)) = (self.this.upgrade(), self.layer()) else {
            self.finish(result);
            return;
        };
        layer.play_exit_transition(Box::new(move || me.finish(result)));
    }

    /// Release everything and resolve. Runs once, after any exit transition.
    fn finish(&self, result: PopupResult) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let mounted = self.mounted.lock().take();
        if let Some(m) = mounted {
            m.unmount();
        }
        let layer = self.layer.lock().take();
        if let Some(l) = layer {
            l.remove();
        }
        let teardown = mem::take(&mut *self.teardown.lock());
        for t in teardown {
            t();
        }
        self.child_handlers.lock().clear();
        if self.restore_focus
            && let Some(el) = self.prior_focus
        {
            self.host.dom.focus(el);
        }
        self.set.remove(self.id());
        if self.lifecycle.settle(result.clone()) {
            info!(popup_id = %self.id(), reason = ?result.close_reason, "overlay popup closed");
            self.callbacks.closed(&result);
        }
    }

    /// Report `error` and close as `programmatic`.
    fn fail(&self, error: Error) {
        if !self.lifecycle.is_open() {
            debug!(popup_id = %self.id(), error = %error, "failure after close ignored");
            return;
        }
        warn!(popup_id = %self.id(), error = %error, "overlay popup failed");
        self.callbacks.failed(&error);
        self.close(PopupResult::programmatic());
    }

    /// Message from framed content.
    fn inbound(&self, msg: &Message) {
        self.callbacks.message(msg);
        match msg.kind {
            MessageKind::CloseRequest => self.close(PopupResult::programmatic()),
            MessageKind::SubmitResult => self.close(result_from_payload(msg.payload.clone())),
            _ => {}
        }
    }

    /// Pointer pressed somewhere in the page.
    fn pointer_down(&self, target: Option<ElementRef>) {
        let Some(layer) = self.layer() else {
            return;
        };
        if target.is_some_and(|t| layer.contains(t)) {
            return;
        }
        debug!(popup_id = %self.id(), "outside click");
        self.close(PopupResult::dismissed(CloseReason::Blur));
    }

    /// Apply a host theme change to the layer and the content.
    fn relay_theme(&self, theme: Theme) {
        if !self.lifecycle.is_open() {
            return;
        }
        *self.theme.lock() = theme;
        if let Some(layer) = self.layer() {
            layer.set_theme(theme);
        }
        if self.direct {
            return;
        }
        if let Err(e) = self
            .channel
            .send(MessageKind::ThemeChange, Some(json!(theme.as_str())))
        {
            debug!(popup_id = %self.id(), error = %e, "theme relay skipped");
        }
    }

    /// Focus the first focusable element, or the container itself.
    fn trap_focus(&self) {
        if !self.lifecycle.is_open() {
            return;
        }
        if let Some(layer) = self.layer() {
            let target = layer.first_focusable().unwrap_or_else(|| layer.container());
            self.host.dom.focus(target);
        }
    }

    /// Placement of the clamped container against `anchor` in the current viewport.
    fn layer_placement(&self, anchor: Option<AnchorRect>) -> LayerPlacement {
        let viewport = self.host.dom.viewport();
        let size = constrain_size(self.requested, viewport, self.placement.viewport_padding);
        match place(&self.placement, anchor, size, viewport) {
            Some(pos) => LayerPlacement::Absolute { x: pos.x, y: pos.y },
            None => LayerPlacement::Centered,
        }
    }

    /// Run the bound child's parent-message handlers with `data`.
    fn deliver_to_child(&self, data: Option<Value>) {
        let handlers: Vec<ParentHandler> = self
            .child_handlers
            .lock()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        let data = data.unwrap_or(Value::Null);
        for h in handlers {
            run_isolated("parent message", || {
                h(&data);
                Ok(())
            });
        }
    }
}

impl PopupControl for OverlayPopup {
    fn close(&self, result: PopupResult) {
        Self::close(self, result);
    }

    fn send(&self, kind: MessageKind, payload: Option<Value>) -> Result<()> {
        if !self.lifecycle.is_open() {
            return Ok(());
        }
        if self.direct {
            match kind {
                MessageKind::DataToChild => self.deliver_to_child(payload),
                other => {
                    trace!(popup_id = %self.id(), kind = %other, "not relayed to rendered content");
                }
            }
            return Ok(());
        }
        Ok(self.channel.send(kind, payload)?)
    }

    fn update_position(&self, anchor: Option<AnchorRect>) {
        if !self.lifecycle.is_open() {
            return;
        }
        if let Some(rect) = anchor {
            *self.anchor.lock() = Some(Arc::new(rect));
        }
        let source = self.anchor.lock().clone();
        let placement = self.layer_placement(source.and_then(|a| a.measure()));
        if let Some(layer) = self.layer() {
            debug!(popup_id = %self.id(), placement = ?placement, "repositioned");
            layer.set_placement(placement);
        }
    }
}

/// Child link for structured content rendered into the container.
struct BoundChild {
    /// Owning popup.
    popup: Weak<OverlayPopup>,
}

impl ChildLink for BoundChild {
    fn close(&self, result: PopupResult) {
        if let Some(p) = self.popup.upgrade() {
            p.close(result);
        }
    }

    fn send_to_parent(&self, data: Option<Value>) {
        if let Some(p) = self.popup.upgrade()
            && p.lifecycle.is_open()
        {
            p.callbacks
                .message(&Message::new(p.id().clone(), MessageKind::DataToParent, data));
        }
    }

    fn subscribe(&self, handler: ParentHandler) -> ChildSubscription {
        let Some(p) = self.popup.upgrade() else {
            return ChildSubscription(0);
        };
        let id = ChildSubscription(p.next_sub.fetch_add(1, Ordering::Relaxed));
        p.child_handlers.lock().push((id, handler));
        id
    }

    fn unsubscribe(&self, id: ChildSubscription) {
        if let Some(p) = self.popup.upgrade() {
            p.child_handlers.lock().retain(|(s, _)| *s != id);
        }
    }

    fn theme(&self) -> Theme {
        self.popup
            .upgrade()
            .map_or_else(Theme::default, |p| *p.theme.lock())
    }

    fn is_open(&self) -> bool {
        self.popup.upgrade().is_some_and(|p| p.lifecycle.is_open())
    }
}

impl OverlayAdapter {
    /// Adapter rendering into the DOM of `host`.
    pub fn new(host: Host) -> Self {
        Self {
            host,
            open: OpenSet::default(),
        }
    }

    /// Number of popups currently open through this adapter.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Put content into the layer: a frame for url and markup, a direct
    /// mount for structured content.
    fn materialize(
        &self,
        popup: &Arc<OverlayPopup>,
        layer: &Arc<dyn DomLayer>,
        opts: &ResolvedOptions,
        params: LaunchParams,
    ) -> Result<()> {
        let source = match &opts.content {
            PopupContent::Url(u) => FrameSource::Src(params.append_to_url(u)),
            PopupContent::Markup(m) => FrameSource::Inline(m.clone()),
            PopupContent::Component { name, props } => {
                let Some(mounter) = &self.host.mounter else {
                    return Err(Error::ContentUnsupported(
                        "no component mounter".to_string(),
                    ));
                };
                let child = ChildHandle::new(
                    popup.id().clone(),
                    opts.data.clone(),
                    Arc::new(BoundChild {
                        popup: Arc::downgrade(popup),
                    }),
                );
                let mounted = mounter.mount(layer.container(), name, props, child)?;
                *popup.mounted.lock() = Some(mounted);
                return Ok(());
            }
        };
        let frame = layer.mount_frame(FrameSpec {
            source,
            sandbox: opts
                .overlay
                .sandbox
                .clone()
                .unwrap_or_else(|| DEFAULT_SANDBOX.to_string()),
            params,
        })?;
        popup.channel.attach_target(frame.endpoint());
        Ok(())
    }

    /// Wire dismissal listeners, theme relay, and the channel.
    fn wire(&self, popup: &Arc<OverlayPopup>, opts: &ResolvedOptions) {
        let weak = Arc::downgrade(popup);
        popup.channel.subscribe(Arc::new(move |msg: &Message| {
            if let Some(p) = weak.upgrade() {
                p.inbound(msg);
            }
            Ok(())
        }));
        let channel = popup.channel.clone();
        popup.on_teardown(move || channel.destroy());

        if opts.blur_behavior != BlurBehavior::None {
            let weak = Arc::downgrade(popup);
            popup.listen(
                DomEventKind::PointerDown,
                Arc::new(move |ev: &DomEvent| {
                    if let (Some(p), DomEvent::PointerDown { target }) = (weak.upgrade(), ev) {
                        p.pointer_down(*target);
                    }
                }),
            );
        }
        if opts.close_on_escape {
            let weak = Arc::downgrade(popup);
            popup.listen(
                DomEventKind::KeyDown,
                Arc::new(move |ev: &DomEvent| {
                    if let (Some(p), DomEvent::KeyDown { key }) = (weak.upgrade(), ev)
                        && key == "Escape"
                    {
                        p.close(PopupResult::dismissed(CloseReason::Escape));
                    }
                }),
            );
        }
        if opts.theme.is_none() {
            let weak = Arc::downgrade(popup);
            let id = self.host.theme.watch(Arc::new(move |t| {
                if let Some(p) = weak.upgrade() {
                    p.relay_theme(t);
                }
            }));
            let theme = self.host.theme.clone();
            popup.on_teardown(move || theme.unwatch(id));
        }
    }
}

impl PopupAdapter for OverlayAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Overlay
    }

    fn is_available(&self) -> bool {
        true
    }

    fn open(&self, opts: ResolvedOptions) -> Result<PopupHandle> {
        opts.content.validate()?;
        if opts.content.is_component() && self.host.mounter.is_none() {
            warn!("structured content needs a component mounter");
            return Err(Error::ContentUnsupported(
                "structured content without a component mounter".to_string(),
            ));
        }

        let id = PopupId::generate();
        let channel = create_channel(
            &self.host.channels,
            id.clone(),
            None,
            TransportHint::PostMessage,
        );
        let lifecycle = Lifecycle::new(id.clone());
        lifecycle.mark_opening();
        let theme = opts.theme.unwrap_or_else(|| self.host.theme.current());
        let params = LaunchParams::new(id.clone(), channel.channel_id().clone(), theme)
            .with_data(opts.data.clone());

        let popup = Arc::new_cyclic(|this| OverlayPopup {
            this: this.clone(),
            lifecycle: lifecycle.clone(),
            callbacks: opts.callbacks.clone(),
            channel: channel.clone(),
            host: self.host.clone(),
            direct: opts.content.is_component(),
            requested: opts.concrete_size(),
            placement: opts.placement,
            anchor: Mutex::new(opts.anchor.clone()),
            theme: Mutex::new(theme),
            layer: Mutex::new(None),
            mounted: Mutex::new(None),
            child_handlers: Mutex::new(Vec::new()),
            next_sub: AtomicU64::new(1),
            teardown: Mutex::new(Vec::new()),
            prior_focus: self.host.dom.active_element(),
            restore_focus: opts.restore_focus,
            finished: AtomicBool::new(false),
            set: self.open.clone(),
        });
        self.open.insert(id.clone(), popup.clone());
        let handle = PopupHandle::new(lifecycle.clone(), popup.clone());
        self.wire(&popup, &opts);

        let viewport = self.host.dom.viewport();
        let clamped = constrain_size(
            opts.concrete_size(),
            viewport,
            opts.placement.viewport_padding,
        );
        let spec = LayerSpec {
            popup_id: id.clone(),
            theme,
            modal: opts.modal,
            backdrop: opts.backdrop,
            size: ContainerSize {
                width: (!opts.width.is_auto()).then_some(clamped.width),
                height: (!opts.height.is_auto()).then_some(clamped.height),
            },
            placement: popup.layer_placement(opts.measure_anchor()),
            class_name: opts.overlay.class_name.clone(),
            z_index: opts.overlay.z_index,
        };
        debug!(popup_id = %id, placement = ?spec.placement, "opening overlay popup");
        let layer = match self.host.dom.create_layer(&spec) {
            Ok(layer) => layer,
            Err(e) => {
                popup.fail(e.into());
                return Ok(handle);
            }
        };
        *popup.layer.lock() = Some(layer.clone());
        if let Err(e) = self.materialize(&popup, &layer, &opts, params) {
            popup.fail(e);
            return Ok(handle);
        }
        if !lifecycle.is_open() {
            return Ok(handle);
        }

        lifecycle.advance(Phase::Ready);
        opts.callbacks.opened(&id);
        lifecycle.advance(Phase::Live);
        if opts.autofocus {
            let weak = Arc::downgrade(&popup);
            self.host.dom.after_open_transition(Box::new(move || {
                if let Some(p) = weak.upgrade() {
                    p.trap_focus();
                }
            }));
        }
        Ok(handle)
    }

    fn close(&self, id: &PopupId, result: Option<PopupResult>) {
        if let Some(p) = self.open.get(id) {
            p.close(result.unwrap_or_else(PopupResult::programmatic));
        }
    }

    fn update_position(&self, id: &PopupId, anchor: Option<AnchorRect>) {
        if let Some(p) = self.open.get(id) {
            PopupControl::update_position(p.as_ref(), anchor);
        }
    }

    fn destroy(&self) {
        for p in self.open.drain() {
            p.close(PopupResult::programmatic());
        }
    }
}
