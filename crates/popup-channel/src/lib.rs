//! Bidirectional message channel between a popup and its creator.
//!
//! Two transports sit behind [`Channel`]:
//! - a same-context broadcast bus ([`BroadcastHub`]) scoped by a name derived
//!   from the channel id, filtered by popup id
//! - point-to-point posting to up to three peer [`Endpoint`]s (explicit
//!   target, parent, opener), filtered by popup id and channel id
//!
//! Handlers are isolated per invocation: an error or panic is logged and
//! delivery continues with the next handler.

mod channel;
mod endpoint;
mod error;
mod handler;
mod hub;

pub use channel::{
    Channel, ChannelEnv, SubscriptionId, Transport, TransportHint, bus_name, create_channel,
};
pub use endpoint::{Endpoint, EnvelopeHandler, ListenerId, Peers};
pub use error::{Error, Result};
pub use handler::{HandlerError, HandlerResult, MessageHandler, run_isolated};
pub use hub::{BroadcastHub, BusPort};
