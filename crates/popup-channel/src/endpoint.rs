//! Point-to-point mailboxes.
//!
//! An [`Endpoint`] stands for one execution context (the host page, a frame,
//! a native window) as a target of posted envelopes. Anyone holding a clone
//! can post to it; listeners registered on it see every envelope posted
//! there, regardless of channel. Filtering is the listener's job.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use popup_protocol::Envelope;
use tracing::trace;

use crate::{
    error::{Error, Result},
    handler::{HandlerResult, run_isolated},
};

/// Callback invoked for envelopes arriving at an endpoint.
pub type EnvelopeHandler = Arc<dyn Fn(&Envelope) -> HandlerResult + Send + Sync>;

/// Token returned by [`Endpoint::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Shared state of one endpoint.
struct EndpointInner {
    /// Human-readable label for diagnostics.
    label: String,
    /// Set once the context is gone.
    closed: AtomicBool,
    /// Registered listeners in registration order.
    listeners: Mutex<Vec<(ListenerId, EnvelopeHandler)>>,
    /// Next listener id.
    next_listener: AtomicU64,
}

/// Mailbox of one execution context.
#[derive(Clone)]
pub struct Endpoint {
    /// Shared state.
    inner: Arc<EndpointInner>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("label", &self.inner.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Endpoint {
    /// Create an open endpoint.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                label: label.into(),
                closed: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Diagnostic label.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether `self` and `other` are the same mailbox.
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the owning context has gone away.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Deliver `envelope` to every listener. Listener failures are isolated.
    pub fn post(&self, envelope: &Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(Error::EndpointClosed(self.inner.label.clone()));
        }
        let listeners: Vec<EnvelopeHandler> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for h in &listeners {
            run_isolated(&self.inner.label, || h(envelope));
        }
        Ok(())
    }

    /// Register a listener.
    pub fn listen(&self, handler: EnvelopeHandler) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, handler));
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unlisten(&self, id: ListenerId) {
        self.inner.listeners.lock().retain(|(l, _)| *l != id);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Mark the context gone and drop all listeners. Later posts fail.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.listeners.lock().clear();
            trace!(endpoint = %self.inner.label, "endpoint closed");
        }
    }
}

/// Peer references a context may post to: an explicit target, the logical
/// parent, and the logical opener. Any of them may be absent.
#[derive(Debug, Clone, Default)]
pub struct Peers {
    /// Context this one posts to by default.
    pub target: Option<Endpoint>,
    /// Embedding context, for framed content.
    pub parent: Option<Endpoint>,
    /// Context that opened this one, for native windows.
    pub opener: Option<Endpoint>,
}

impl Peers {
    /// Peers with only a parent, as seen from inside a frame.
    pub fn with_parent(parent: Endpoint) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// Peers with only an opener, as seen from inside a native window.
    pub fn with_opener(opener: Endpoint) -> Self {
        Self {
            opener: Some(opener),
            ..Self::default()
        }
    }

    /// Distinct peers, skipping `local` and duplicates.
    pub fn distinct(&self, local: &Endpoint) -> Vec<Endpoint> {
        let mut out: Vec<Endpoint> = Vec::new();
        for ep in [&self.target, &self.parent, &self.opener].into_iter().flatten() {
            if ep.same(local) || out.iter().any(|e| e.same(ep)) {
                continue;
            }
            out.push(ep.clone());
        }
        out
    }
}
