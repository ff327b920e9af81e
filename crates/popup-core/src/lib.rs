//! Popup core
//!
//! Opens, positions, and tears down popup surfaces (menus, dialogs,
//! tooltips) that render either as native windows of a host container or as
//! overlay layers in the host page. Both environments present one contract:
//!
//! - [`PopupProvider`]: picks an environment, merges defaults under caller
//!   options, and tracks every popup until it resolves
//! - [`PopupHandle`]: close, send, reposition, and await the single
//!   [`PopupResult`](popup_protocol::PopupResult) of one popup
//! - [`ChildContext`] and [`ChildHandle`]: the content's side of the
//!   conversation
//!
//! Host capabilities (theme, DOM, container runtime, component mounter) are
//! traits in [`host`]; [`test_support`] has in-memory fakes for all of them.
//!
//! ```no_run
//! use popup_config::ProviderConfig;
//! use popup_core::{PopupOptions, PopupProvider, test_support::TestHost};
//!
//! # async fn demo() -> popup_core::Result<()> {
//! let host = TestHost::new();
//! let provider = PopupProvider::new(host.host.clone(), ProviderConfig::default());
//! let handle = provider.open(PopupOptions::url("https://app.local/picker"))?;
//! let result = handle.result().await;
//! println!("confirmed: {}", result.confirmed);
//! # Ok(())
//! # }
//! ```

mod adapter;
mod child;
mod error;
mod handle;
pub mod host;
mod options;
mod provider;
pub mod test_support;

pub use adapter::{AdapterKind, ContainerAdapter, OverlayAdapter, PopupAdapter};
pub use child::{ChildContext, ChildHandle, ChildLink, ChildSubscription, ParentHandler};
pub use error::{Error, HostError, Result};
pub use handle::{Lifecycle, Phase, PopupControl, PopupHandle, SettledHook, result_from_payload};
pub use options::{
    Callbacks, CloseCallback, ContainerOverrides, DEFAULT_SANDBOX, ErrorCallback, MessageCallback,
    OpenCallback, OverlayOverrides, PopupContent, PopupOptions, ResolvedOptions,
};
pub use provider::PopupProvider;
