//! The popup content's side of the conversation.
//!
//! Content in an isolated context (a frame or a native window) uses
//! [`ChildContext`], which reads its launch parameters and talks over a
//! channel. Structured content rendered directly into an overlay gets a
//! [`ChildHandle`] bound to its owning popup instead. Both expose the same
//! operations.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use popup_channel::{
    Channel, ChannelEnv, HandlerResult, MessageHandler, SubscriptionId, TransportHint,
    create_channel,
};
use popup_protocol::{LaunchParams, Message, MessageKind, PopupId, PopupResult, Theme};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Result;

/// Handler for data the parent sends.
pub type ParentHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Token for a parent-message or theme subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildSubscription(pub u64);

/// Operations a bound child forwards to its owning popup.
pub trait ChildLink: Send + Sync {
    /// Close the owning popup.
    fn close(&self, result: PopupResult);
    /// Deliver `data` to the parent's message callback.
    fn send_to_parent(&self, data: Option<Value>);
    /// Register a handler for parent messages.
    fn subscribe(&self, handler: ParentHandler) -> ChildSubscription;
    /// Drop a handler registered with `subscribe`.
    fn unsubscribe(&self, id: ChildSubscription);
    /// Theme currently applied to the popup.
    fn theme(&self) -> Theme;
    /// False once the popup started closing.
    fn is_open(&self) -> bool;
}

/// Child-facing handle for structured content rendered in-page.
#[derive(Clone)]
pub struct ChildHandle {
    /// Popup being rendered.
    popup_id: PopupId,
    /// Data passed at open.
    initial_data: Option<Value>,
    /// Owning popup.
    link: Arc<dyn ChildLink>,
}

impl fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildHandle")
            .field("popup_id", &self.popup_id)
            .finish_non_exhaustive()
    }
}

impl ChildHandle {
    /// Handle for content bound to popup `popup_id` through `link`.
    pub fn new(popup_id: PopupId, initial_data: Option<Value>, link: Arc<dyn ChildLink>) -> Self {
        Self {
            popup_id,
            initial_data,
            link,
        }
    }

    /// Popup this content belongs to.
    pub fn popup_id(&self) -> &PopupId {
        &self.popup_id
    }

    /// Data the opener passed at open time.
    pub fn initial_data(&self) -> Option<&Value> {
        self.initial_data.as_ref()
    }

    /// Theme currently applied to the popup.
    pub fn theme(&self) -> Theme {
        self.link.theme()
    }

    /// False once the popup has started closing.
    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Finish with `result`.
    pub fn close(&self, result: PopupResult) {
        self.link.close(result);
    }

    /// Deliver `data` to the opener as `data-to-parent`.
    pub fn send_to_parent(&self, data: Option<Value>) {
        self.link.send_to_parent(data);
    }

    /// Receive data the parent sends with `data-to-child`.
    pub fn on_parent_message(
        &self,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ChildSubscription {
        self.link.subscribe(Arc::new(handler))
    }

    /// Remove a handler added with `on_parent_message`.
    pub fn off_parent_message(&self, id: ChildSubscription) {
        self.link.unsubscribe(id);
    }
}

/// Child side of a popup living in its own execution context.
pub struct ChildContext {
    /// Identity read at launch.
    params: LaunchParams,
    /// Channel back to the creator.
    channel: Channel,
    /// Latest theme seen.
    theme: Arc<Mutex<Theme>>,
    /// Set once the child has closed itself.
    closed: AtomicBool,
}

impl fmt::Debug for ChildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildContext")
            .field("popup_id", &self.params.popup_id)
            .field("channel_id", &self.params.channel_id)
            .field("theme", &self.theme())
            .finish()
    }
}

impl ChildContext {
    /// Join the channel named in `params` and announce `ready`.
    pub fn connect(params: LaunchParams, env: &ChannelEnv, hint: TransportHint) -> Result<Self> {
        let channel = create_channel(
            env,
            params.popup_id.clone(),
            Some(params.channel_id.clone()),
            hint,
        );
        let theme = Arc::new(Mutex::new(params.theme));
        let tracked = theme.clone();
        channel.subscribe(Arc::new(move |msg: &Message| {
            if let Some(t) = msg.theme() {
                trace!(theme = %t, "child theme updated");
                *tracked.lock() = t;
            }
            Ok(())
        }));
        channel.send(MessageKind::Ready, None)?;
        debug!(popup_id = %params.popup_id, channel_id = %params.channel_id, "child connected");
        Ok(Self {
            params,
            channel,
            theme,
            closed: AtomicBool::new(false),
        })
    }

    /// Connect using parameters read from a url or query string.
    pub fn from_query(query: &str, env: &ChannelEnv, hint: TransportHint) -> Result<Self> {
        Self::connect(LaunchParams::from_query(query)?, env, hint)
    }

    /// Connect using a native window's custom payload.
    pub fn from_custom_data(data: Value, env: &ChannelEnv, hint: TransportHint) -> Result<Self> {
        Self::connect(LaunchParams::from_custom_data(data)?, env, hint)
    }

    /// Popup this context serves.
    pub fn popup_id(&self) -> &PopupId {
        &self.params.popup_id
    }

    /// Theme last announced by the creator.
    pub fn theme(&self) -> Theme {
        *self.theme.lock()
    }

    /// Data the opener passed at open time.
    pub fn initial_data(&self) -> Option<&Value> {
        self.params.data.as_ref()
    }

    /// Underlying channel.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// True once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Report `result` to the creator and stop talking. Later calls are
    /// ignored.
    pub fn close(&self, result: PopupResult) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let payload = serde_json::to_value(&result).ok();
        let sent = self.channel.send(MessageKind::SubmitResult, payload);
        self.channel.destroy();
        Ok(sent?)
    }

    /// Ask the creator to close this popup without a result.
    pub fn request_close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        Ok(self.channel.send(MessageKind::CloseRequest, None)?)
    }

    /// Send `data` to the creator as `data-to-parent`. No-op once closed.
    pub fn send_to_parent(&self, data: Option<Value>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        Ok(self.channel.send(MessageKind::DataToParent, data)?)
    }

    /// Receive data the creator sends with `data-to-child`.
    pub fn on_parent_message(
        &self,
        handler: impl Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    ) -> SubscriptionId {
        let handler: MessageHandler = Arc::new(move |msg: &Message| match msg.kind {
            MessageKind::DataToChild => handler(msg.payload.as_ref().unwrap_or(&Value::Null)),
            _ => Ok(()),
        });
        self.channel.subscribe(handler)
    }
}

impl Drop for ChildContext {
    fn drop(&mut self) {
        self.channel.destroy();
    }
}

#[cfg(test)]
mod tests {
    use popup_channel::{Endpoint, Peers};
    use popup_protocol::ChannelId;
    use serde_json::json;

    use super::*;

    fn pair() -> (Channel, ChannelEnv, Endpoint) {
        let host = Endpoint::new("host");
        let frame = Endpoint::new("frame");
        let parent = create_channel(
            &ChannelEnv::isolated(host.clone(), Peers::default()),
            PopupId::new("p"),
            Some(ChannelId::new("c")),
            TransportHint::PostMessage,
        );
        parent.attach_target(frame.clone());
        (parent, ChannelEnv::isolated(frame.clone(), Peers::with_parent(host)), frame)
    }

    fn params() -> LaunchParams {
        LaunchParams::new(PopupId::new("p"), ChannelId::new("c"), Theme::Light)
            .with_data(Some(json!({"step": 1})))
    }

    #[test]
    fn connect_announces_ready_and_tracks_theme() {
        let (parent, env, _frame) = pair();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        parent.subscribe(Arc::new(move |m: &Message| {
            sink.lock().push(m.kind);
            Ok(())
        }));
        let child =
            ChildContext::from_query(&params().to_query(), &env, TransportHint::Auto).unwrap();
        assert_eq!(*seen.lock(), vec![MessageKind::Ready]);
        assert_eq!(child.initial_data(), Some(&json!({"step": 1})));

        parent
            .send(MessageKind::ThemeChange, Some(json!("dark")))
            .unwrap();
        assert_eq!(child.theme(), Theme::Dark);
    }

    #[test]
    fn parent_data_reaches_only_data_handlers() {
        let (parent, env, _frame) = pair();
        let child = ChildContext::connect(params(), &env, TransportHint::Auto).unwrap();
        let got = Arc::new(Mutex::new(Vec::new()));
        let sink = got.clone();
        child.on_parent_message(move |v| {
            sink.lock().push(v.clone());
            Ok(())
        });
        parent.send(MessageKind::ThemeChange, Some(json!("dark"))).unwrap();
        parent.send(MessageKind::DataToChild, Some(json!([1, 2]))).unwrap();
        assert_eq!(*got.lock(), vec![json!([1, 2])]);
    }

    #[test]
    fn close_sends_result_once() {
        let (parent, env, _frame) = pair();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        parent.subscribe(Arc::new(move |m: &Message| {
            if m.kind == MessageKind::SubmitResult {
                sink.lock().push(m.payload.clone());
            }
            Ok(())
        }));
        let child = ChildContext::connect(params(), &env, TransportHint::Auto).unwrap();
        child.close(PopupResult::submit(Some(json!("ok")))).unwrap();
        child.close(PopupResult::cancel()).unwrap();
        child.send_to_parent(Some(json!("late"))).unwrap();
        assert_eq!(results.lock().len(), 1);
        assert!(child.is_closed());
    }

    #[test]
    fn bad_launch_query_is_an_error() {
        let (_parent, env, _frame) = pair();
        assert!(ChildContext::from_query("?theme=dark", &env, TransportHint::Auto).is_err());
    }
}
