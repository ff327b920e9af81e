//! The per-popup channel and transport selection.

use std::{
    mem,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use popup_protocol::{ChannelId, Envelope, Message, MessageKind, PopupId};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{
    endpoint::{Endpoint, ListenerId, Peers},
    error::{Error, Result},
    handler::{MessageHandler, run_isolated},
    hub::{BroadcastHub, BusPort},
};

/// Caller preference for the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportHint {
    /// Broadcast when a hub exists, otherwise point-to-point.
    #[default]
    Auto,
    /// Require the broadcast bus; falls back with a warning when none exists.
    Broadcast,
    /// Force point-to-point. Needed when content is sandboxed and cannot see
    /// the hub.
    PostMessage,
}

/// Transport a channel actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Shared broadcast hub, reaching every context that joined it.
    Broadcast,
    /// Direct mailbox delivery to a known peer.
    PostMessage,
}

/// What a context can reach: its broadcast hub (if the context has one), its
/// own mailbox, and the peers it may post to.
#[derive(Clone)]
pub struct ChannelEnv {
    /// Broadcast hub, when the host offers one.
    pub hub: Option<BroadcastHub>,
    /// Mailbox of this context.
    pub local: Endpoint,
    /// Known peer contexts.
    pub peers: Peers,
}

impl ChannelEnv {
    /// Environment of a top-level context with a hub and no peers yet.
    pub fn host(hub: BroadcastHub, local: Endpoint) -> Self {
        Self {
            hub: Some(hub),
            local,
            peers: Peers::default(),
        }
    }

    /// Environment of an isolated context that can only post.
    pub fn isolated(local: Endpoint, peers: Peers) -> Self {
        Self {
            hub: None,
            local,
            peers,
        }
    }

    /// Pick the transport for `hint`.
    pub fn select(&self, hint: TransportHint) -> Transport {
        match (hint, self.hub.is_some()) {
            (TransportHint::PostMessage, _) | (TransportHint::Auto, false) => {
                Transport::PostMessage
            }
            (TransportHint::Auto | TransportHint::Broadcast, true) => Transport::Broadcast,
            (TransportHint::Broadcast, false) => {
                warn!("broadcast transport requested but unavailable; using point-to-point");
                Transport::PostMessage
            }
        }
    }
}

/// Token returned by [`Channel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Transport resources held by a live channel.
enum Link {
    /// Attached to a named bus.
    Broadcast(Arc<BusPort>),
    /// Listening on the local mailbox, posting to peers.
    PostMessage {
        /// Our own mailbox.
        local: Endpoint,
        /// Listener registered on `local`.
        listener: ListenerId,
        /// Where sends go.
        peers: Peers,
    },
    /// Destroyed.
    Released,
}

/// Shared channel state.
struct ChannelInner {
    /// Popup this channel serves.
    popup_id: PopupId,
    /// Channel id.
    channel_id: ChannelId,
    /// Transport in use.
    transport: Transport,
    /// Set on destroy.
    destroyed: AtomicBool,
    /// Subscribers in subscription order.
    handlers: Mutex<Vec<(SubscriptionId, MessageHandler)>>,
    /// Next subscription id.
    next_sub: AtomicU64,
    /// Transport resources.
    link: Mutex<Link>,
}

impl ChannelInner {
    /// Deliver an inbound message to every subscriber, if it is ours.
    fn dispatch(&self, msg: &Message) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if msg.popup_id != self.popup_id {
            trace!(popup_id = %self.popup_id, other = %msg.popup_id, "ignoring foreign message");
            return;
        }
        let handlers: Vec<MessageHandler> =
            self.handlers.lock().iter().map(|(_, h)| h.clone()).collect();
        for h in &handlers {
            run_isolated(self.channel_id.as_str(), || h(msg));
        }
    }
}

/// Bidirectional typed message bus between one popup and its creator.
///
/// Cheap to clone; all clones share state. Inbound messages are delivered
/// synchronously, in send order, to subscribers registered at delivery time.
#[derive(Clone)]
pub struct Channel {
    /// Shared state.
    inner: Arc<ChannelInner>,
}

/// Bus name for a channel id.
pub fn bus_name(channel_id: &ChannelId) -> String {
    format!("popup-channel-{channel_id}")
}

/// Open a channel for `popup_id`. A fresh channel id is generated when none is
/// given.
pub fn create_channel(
    env: &ChannelEnv,
    popup_id: PopupId,
    channel_id: Option<ChannelId>,
    hint: TransportHint,
) -> Channel {
    let channel_id = channel_id.unwrap_or_else(ChannelId::generate);
    let transport = env.select(hint);
    let inner = Arc::new(ChannelInner {
        popup_id,
        channel_id,
        transport,
        destroyed: AtomicBool::new(false),
        handlers: Mutex::new(Vec::new()),
        next_sub: AtomicU64::new(1),
        link: Mutex::new(Link::Released),
    });
    let weak: Weak<ChannelInner> = Arc::downgrade(&inner);

    let link = match (transport, &env.hub) {
        (Transport::Broadcast, Some(hub)) => {
            let handler: MessageHandler = Arc::new(move |msg: &Message| {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch(msg);
                }
                Ok(())
            });
            Link::Broadcast(Arc::new(hub.open(&bus_name(&inner.channel_id), handler)))
        }
        _ => {
            let listener = env.local.listen(Arc::new(move |envelope: &Envelope| {
                if let Some(inner) = weak.upgrade()
                    && envelope.channel_id == inner.channel_id
                {
                    inner.dispatch(&envelope.message);
                }
                Ok(())
            }));
            Link::PostMessage {
                local: env.local.clone(),
                listener,
                peers: env.peers.clone(),
            }
        }
    };
    *inner.link.lock() = link;
    debug!(
        popup_id = %inner.popup_id,
        channel_id = %inner.channel_id,
        transport = ?transport,
        "channel created"
    );
    Channel { inner }
}

impl Channel {
    /// Popup this channel belongs to.
    pub fn popup_id(&self) -> &PopupId {
        &self.inner.popup_id
    }

    /// Identifier that scopes every envelope on this channel.
    pub fn channel_id(&self) -> &ChannelId {
        &self.inner.channel_id
    }

    /// Transport chosen at creation.
    pub fn transport(&self) -> Transport {
        self.inner.transport
    }

    /// True once `destroy` has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Send a message tagged with this channel's popup id. Peers that are
    /// closed or absent are skipped.
    pub fn send(&self, kind: MessageKind, payload: Option<Value>) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed(self.inner.channel_id.to_string()));
        }
        let msg = Message::new(self.inner.popup_id.clone(), kind, payload);
        // Snapshot the route and release the lock: receivers may reply or
        // destroy this channel from inside delivery.
        let route = match &*self.inner.link.lock() {
            Link::Broadcast(port) => Route::Bus(port.clone()),
            Link::PostMessage { local, peers, .. } => Route::Peers(peers.distinct(local)),
            Link::Released => return Err(Error::Destroyed(self.inner.channel_id.to_string())),
        };
        match route {
            Route::Bus(port) => {
                let n = port.post(&msg);
                trace!(
                    channel_id = %self.inner.channel_id,
                    kind = %kind,
                    receivers = n,
                    "broadcast"
                );
            }
            Route::Peers(peers) => {
                let envelope = Envelope::new(self.inner.channel_id.clone(), msg);
                for peer in peers {
                    if let Err(e) = peer.post(&envelope) {
                        trace!(
                            channel_id = %self.inner.channel_id,
                            peer = peer.label(),
                            error = %e,
                            "peer skipped"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Register a handler for inbound messages addressed to this popup.
    pub fn subscribe(&self, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_sub.fetch_add(1, Ordering::Relaxed));
        self.inner.handlers.lock().push((id, handler));
        id
    }

    /// Remove a handler. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.handlers.lock().retain(|(s, _)| *s != id);
    }

    /// Bind the explicit target peer once it exists, e.g. when a native window
    /// reports ready. Has no effect on broadcast channels.
    pub fn attach_target(&self, target: Endpoint) {
        if let Link::PostMessage { peers, .. } = &mut *self.inner.link.lock() {
            peers.target = Some(target);
        }
    }

    /// Release every listener and transport resource. Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let link = mem::replace(&mut *self.inner.link.lock(), Link::Released);
        match link {
            Link::Broadcast(port) => port.close(),
            Link::PostMessage {
                local, listener, ..
            } => local.unlisten(listener),
            Link::Released => {}
        }
        self.inner.handlers.lock().clear();
        debug!(
            popup_id = %self.inner.popup_id,
            channel_id = %self.inner.channel_id,
            "channel destroyed"
        );
    }
}

/// Where one send goes, captured outside the link lock.
enum Route {
    /// A bus port.
    Bus(Arc<BusPort>),
    /// Distinct point-to-point peers.
    Peers(Vec<Endpoint>),
}
