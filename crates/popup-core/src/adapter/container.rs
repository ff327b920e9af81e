//! Native container windows.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use popup_channel::{Channel, TransportHint, create_channel};
use popup_config::BlurBehavior;
use popup_geom::{AnchorRect, to_screen_coordinates};
use popup_protocol::{
    CloseReason, LaunchParams, Message, MessageKind, PopupId, PopupResult, Theme,
    launch::component_route,
};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{AdapterKind, OpenSet, PopupAdapter, place_or_center};
use crate::{
    error::{Error, HostError, Result},
    handle::{Lifecycle, Phase, PopupControl, PopupHandle, result_from_payload},
    host::{
        ContainerRuntime, Host, NativeBlur, NativeOutcome, NativeResult, NativeWindow,
        NativeWindowEvents, NativeWindowRequest, WatchId,
    },
    options::{Callbacks, PopupContent, ResolvedOptions},
};

/// Adapter driving the host container's native window API.
pub struct ContainerAdapter {
    /// Host capabilities.
    host: Host,
    /// Popups currently open.
    open: OpenSet<NativePopup>,
}

/// One native popup window and everything wired to it.
struct NativePopup {
    /// Exactly-once state.
    lifecycle: Arc<Lifecycle>,
    /// Caller callbacks.
    callbacks: Callbacks,
    /// Point-to-point channel to the window.
    channel: Channel,
    /// Host capabilities.
    host: Host,
    /// Window reference, retained once the container reports ready.
    window: Mutex<Option<Arc<dyn NativeWindow>>>,
    /// Blob url backing markup content, revoked on teardown.
    blob: Mutex<Option<String>>,
    /// Host theme subscription, absent when the theme is fixed.
    theme_watch: Mutex<Option<WatchId>>,
    /// Owning adapter's open set.
    set: OpenSet<Self>,
}

impl NativePopup {
    /// Popup id.
    fn id(&self) -> &PopupId {
        self.lifecycle.id()
    }

    /// Tear down and resolve. Only the first close source gets past
    /// `begin_close`.
    fn finish(&self, result: PopupResult) {
        if !self.lifecycle.begin_close() {
            return;
        }
        let window = self.window.lock().take();
        if let Some(w) = window {
            w.close();
        }
        let blob = self.blob.lock().take();
        if let Some(url) = blob {
            self.host.dom.revoke_blob_url(&url);
        }
        let watch = self.theme_watch.lock().take();
        if let Some(id) = watch {
            self.host.theme.unwatch(id);
        }
        self.channel.destroy();
        self.set.remove(self.id());
        if self.lifecycle.settle(result.clone()) {
            info!(popup_id = %self.id(), reason = ?result.close_reason, "native popup closed");
            self.callbacks.closed(&result);
        }
    }

    /// Open failed after `open` returned.
    fn fail(&self, error: Error) {
        if !self.lifecycle.is_open() {
            debug!(popup_id = %self.id(), error = %error, "failure after close ignored");
            return;
        }
        warn!(popup_id = %self.id(), error = %error, "native popup failed");
        self.callbacks.failed(&error);
        self.finish(PopupResult::programmatic());
    }

    /// The container created the window.
    fn ready(&self, window: Arc<dyn NativeWindow>) {
        if !self.lifecycle.is_open() {
            debug!(popup_id = %self.id(), window = %window.id(), "window ready after close");
            window.close();
            return;
        }
        self.channel.attach_target(window.endpoint());
        *self.window.lock() = Some(window);
        // A close may have run between the check and the store.
        if !self.lifecycle.is_open() {
            let stale = self.window.lock().take();
            if let Some(w) = stale {
                w.close();
            }
            return;
        }
        self.lifecycle.advance(Phase::Ready);
        debug!(popup_id = %self.id(), "native window ready");
        self.callbacks.opened(self.id());
        self.lifecycle.advance(Phase::Live);
    }

    /// The container reported how the window ended.
    fn native_result(&self, result: NativeResult) {
        let kind = match result.outcome {
            NativeOutcome::Submitted => MessageKind::SubmitResult,
            NativeOutcome::Dismissed => MessageKind::CloseRequest,
        };
        self.callbacks
            .message(&Message::new(self.id().clone(), kind, result.payload.clone()));
        match result.outcome {
            NativeOutcome::Submitted => self.finish(PopupResult::submit(result.payload)),
            NativeOutcome::Dismissed => self.finish(PopupResult::dismissed(CloseReason::Blur)),
        }
    }

    /// Message from the window's content.
    fn inbound(&self, msg: &Message) {
        self.callbacks.message(msg);
        match msg.kind {
            MessageKind::CloseRequest => self.finish(PopupResult::programmatic()),
            MessageKind::SubmitResult => self.finish(result_from_payload(msg.payload.clone())),
            _ => {}
        }
    }

    /// Forward a host theme change to the window.
    fn relay_theme(&self, theme: Theme) {
        if !self.lifecycle.is_open() {
            return;
        }
        if let Err(e) = self
            .channel
            .send(MessageKind::ThemeChange, Some(json!(theme.as_str())))
        {
            debug!(popup_id = %self.id(), error = %e, "theme relay skipped");
        }
    }
}

impl PopupControl for NativePopup {
    fn close(&self, result: PopupResult) {
        self.finish(result);
    }

    fn send(&self, kind: MessageKind, payload: Option<Value>) -> Result<()> {
        if !self.lifecycle.is_open() {
            return Ok(());
        }
        Ok(self.channel.send(kind, payload)?)
    }

    fn update_position(&self, _anchor: Option<AnchorRect>) {
        warn!(
            popup_id = %self.id(),
            "native popup windows cannot be repositioned after open; ignoring"
        );
    }
}

/// Container callbacks for one window. Holds the popup weakly: the container
/// may call back long after teardown.
struct WindowEvents {
    /// Target popup.
    popup: Weak<NativePopup>,
}

impl NativeWindowEvents for WindowEvents {
    fn on_ready(&self, window: Arc<dyn NativeWindow>) {
        match self.popup.upgrade() {
            Some(p) => p.ready(window),
            None => window.close(),
        }
    }

    fn on_result(&self, result: NativeResult) {
        if let Some(p) = self.popup.upgrade() {
            p.native_result(result);
        }
    }

    fn on_error(&self, error: HostError) {
        if let Some(p) = self.popup.upgrade() {
            p.fail(error.into());
        }
    }
}

impl ContainerAdapter {
    /// Adapter over the container runtime in `host`. Availability is probed per call.
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

    /// Locator, geometry, and window options for one popup.
    fn build_request(
        &self,
        popup: &NativePopup,
        opts: &ResolvedOptions,
        params: &LaunchParams,
        runtime: &dyn ContainerRuntime,
    ) -> Result<NativeWindowRequest> {
        let url = match &opts.content {
            PopupContent::Url(u) => params.append_to_url(u),
            PopupContent::Component { name, props } => {
                component_route(&opts.component_route, name, props, params)
            }
            PopupContent::Markup(m) => {
                // Blob urls resolve by exact key; identity travels in the custom payload.
                let blob = self.host.dom.create_blob_url(m)?;
                *popup.blob.lock() = Some(blob.clone());
                blob
            }
        };
        let size = opts.concrete_size();
        let pos = place_or_center(
            &opts.placement,
            opts.measure_anchor(),
            size,
            self.host.dom.viewport(),
        );
        let screen = to_screen_coordinates(pos, runtime.screen_offset());
        Ok(NativeWindowRequest {
            url,
            x: screen.x,
            y: screen.y,
            width: size.width.max(1.0).round() as u32,
            height: size.height.max(1.0).round() as u32,
            blur: match opts.blur_behavior {
                BlurBehavior::None => NativeBlur::ModalLike,
                BlurBehavior::Close => NativeBlur::CloseOnBlur,
            },
            focus: opts.container.focus.unwrap_or(true),
            frame: opts.container.frame.unwrap_or(false),
            background_color: opts.container.background_color.clone(),
            always_on_top: opts.container.always_on_top.unwrap_or(false),
            custom_data: params.to_custom_data(),
        })
    }
}

impl PopupAdapter for ContainerAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Container
    }

    fn is_available(&self) -> bool {
        self.host.container.is_present()
    }

    fn open(&self, opts: ResolvedOptions) -> Result<PopupHandle> {
        let Some(runtime) = self.host.container.probe() else {
            warn!("container environment selected but no native runtime is present");
            return Err(Error::NativeHostUnavailable);
        };
        opts.content.validate()?;

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

        let popup = Arc::new(NativePopup {
            lifecycle: lifecycle.clone(),
            callbacks: opts.callbacks.clone(),
            channel: channel.clone(),
            host: self.host.clone(),
            window: Mutex::new(None),
            blob: Mutex::new(None),
            theme_watch: Mutex::new(None),
            set: self.open.clone(),
        });

        let weak = Arc::downgrade(&popup);
        channel.subscribe(Arc::new(move |msg: &Message| {
            if let Some(p) = weak.upgrade() {
                p.inbound(msg);
            }
            Ok(())
        }));
        if opts.theme.is_none() {
            let weak = Arc::downgrade(&popup);
            let watch = self.host.theme.watch(Arc::new(move |t| {
                if let Some(p) = weak.upgrade() {
                    p.relay_theme(t);
                }
            }));
            *popup.theme_watch.lock() = Some(watch);
        }
        self.open.insert(id.clone(), popup.clone());
        let handle = PopupHandle::new(lifecycle, popup.clone());
        debug!(popup_id = %id, channel_id = %channel.channel_id(), "opening native popup");

        match self.build_request(&popup, &opts, &params, runtime.as_ref()) {
            Ok(request) => {
                let events = Arc::new(WindowEvents {
                    popup: Arc::downgrade(&popup),
                });
                if let Err(e) = runtime.show_popup_window(request, events) {
                    popup.fail(e.into());
                }
            }
            Err(e) => popup.fail(e),
        }
        Ok(handle)
    }

    fn close(&self, id: &PopupId, result: Option<PopupResult>) {
        if let Some(p) = self.open.get(id) {
            p.finish(result.unwrap_or_else(PopupResult::programmatic));
        }
    }

    fn update_position(&self, id: &PopupId, anchor: Option<AnchorRect>) {
        if let Some(p) = self.open.get(id) {
            PopupControl::update_position(p.as_ref(), anchor);
        }
    }

    fn destroy(&self) {
        for p in self.open.drain() {
            p.finish(PopupResult::programmatic());
        }
    }
}
