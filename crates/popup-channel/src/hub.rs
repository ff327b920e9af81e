//! Same-context broadcast bus.
//!
//! A [`BroadcastHub`] holds named buses. Every [`BusPort`] opened on a name
//! receives what the other ports on that name post; a port never hears its
//! own posts. Messages are not filtered here: consumers drop anything whose
//! popup id is not theirs.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use popup_protocol::Message;
use tracing::trace;

use crate::handler::{MessageHandler, run_isolated};

/// One registered port on a named bus.
struct PortEntry {
    /// Hub-unique port id.
    id: u64,
    /// Delivery callback.
    handler: MessageHandler,
}

/// Shared state behind a hub handle.
#[derive(Default)]
struct HubInner {
    /// Bus name to attached ports.
    buses: Mutex<HashMap<String, Vec<PortEntry>>>,
    /// Next port id.
    next_port: AtomicU64,
}

/// Registry of named broadcast buses shared by everything in one context.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    /// Shared state.
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a port to bus `name`. `handler` sees every message other ports
    /// post on the same name.
    pub fn open(&self, name: &str, handler: MessageHandler) -> BusPort {
        let id = self.inner.next_port.fetch_add(1, Ordering::Relaxed);
        self.inner
            .buses
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(PortEntry { id, handler });
        trace!(bus = name, port = id, "bus port opened");
        BusPort {
            hub: self.clone(),
            name: name.to_string(),
            id,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of ports currently attached to `name`.
    pub fn port_count(&self, name: &str) -> usize {
        self.inner.buses.lock().get(name).map_or(0, Vec::len)
    }

    /// Handlers on `name` except the sender's own.
    fn peers_of(&self, name: &str, sender: u64) -> Vec<MessageHandler> {
        self.inner
            .buses
            .lock()
            .get(name)
            .map(|ports| {
                ports
                    .iter()
                    .filter(|p| p.id != sender)
                    .map(|p| p.handler.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Detach port `id` from `name`, dropping the bus when it empties.
    fn detach(&self, name: &str, id: u64) {
        let mut buses = self.inner.buses.lock();
        if let Some(ports) = buses.get_mut(name) {
            ports.retain(|p| p.id != id);
            if ports.is_empty() {
                buses.remove(name);
            }
        }
    }
}

/// A handle on one named bus. Detaches on [`close`](Self::close) or drop.
pub struct BusPort {
    /// Owning hub.
    hub: BroadcastHub,
    /// Bus name.
    name: String,
    /// Port id within the hub.
    id: u64,
    /// Set once detached.
    closed: AtomicBool,
}

impl BusPort {
    /// Bus name this port is attached to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver `msg` to every other port on the bus, in attachment order.
    /// Returns how many ports received it. A closed port delivers nothing.
    pub fn post(&self, msg: &Message) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }
        let handlers = self.hub.peers_of(&self.name, self.id);
        for h in &handlers {
            run_isolated(&self.name, || h(msg));
        }
        handlers.len()
    }

    /// Detach from the bus. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.hub.detach(&self.name, self.id);
            trace!(bus = %self.name, port = self.id, "bus port closed");
        }
    }
}

impl Drop for BusPort {
    fn drop(&mut self) {
        self.close();
    }
}
