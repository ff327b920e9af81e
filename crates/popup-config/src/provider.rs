use serde::{Deserialize, Serialize};

use crate::defaults::PopupDefaults;

/// Which adapter the provider should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentPreference {
    /// Probe for a native container host; fall back to the in-page overlay.
    #[default]
    Auto,
    /// Require the native container host. Opening fails when it is absent.
    Container,
    /// Always use the in-page overlay.
    Overlay,
}

/// Top-level configuration handed to a popup provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Adapter selection.
    pub environment: EnvironmentPreference,
    /// Defaults merged under every popup's options.
    pub defaults: PopupDefaults,
}
