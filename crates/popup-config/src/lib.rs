//! Popup defaults and provider configuration.
//!
//! Configuration is plain RON. Every field is optional; anything left out
//! takes the value from [`PopupDefaults::default`]:
//!
//! ```ron
//! (
//!     environment: auto,
//!     defaults: (
//!         width: px(320.0),
//!         height: auto,
//!         placement: "bottom-start",
//!         blur_behavior: close,
//!     ),
//! )
//! ```

mod defaults;
mod error;
mod loader;
mod provider;

pub use defaults::{BlurBehavior, Dimension, PopupDefaults};
pub use error::{Error, excerpt_at};
pub use loader::{load_from_path, load_from_str};
pub use provider::{EnvironmentPreference, ProviderConfig};
