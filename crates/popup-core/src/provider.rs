//! Popup registry: environment selection and the set of open popups.

use std::sync::Arc;

use parking_lot::Mutex;
use popup_config::{EnvironmentPreference, PopupDefaults, ProviderConfig};
use popup_geom::AnchorRect;
use popup_protocol::{PopupId, PopupResult, Theme};
use tracing::{debug, info, warn};

use crate::{
    adapter::{AdapterKind, ContainerAdapter, OverlayAdapter, PopupAdapter},
    error::{Error, Result},
    handle::PopupHandle,
    host::Host,
    options::PopupOptions,
};

/// Open handles, shared with the settle hooks that prune them.
type HandleList = Arc<Mutex<Vec<PopupHandle>>>;

/// Entry point for opening popups.
///
/// Picks an environment adapter at initialization, merges configured
/// defaults under caller options, and tracks every popup until it resolves.
pub struct PopupProvider {
    /// Host capabilities shared with every adapter.
    host: Host,
    /// Configuration the provider was built with.
    config: ProviderConfig,
    /// Active adapter; `None` before initialization and after destroy.
    adapter: Mutex<Option<Arc<dyn PopupAdapter>>>,
    /// Popups that have not resolved yet, in open order.
    handles: HandleList,
}

impl PopupProvider {
    /// Create a provider and select an adapter per `config.environment`.
    pub fn new(host: Host, config: ProviderConfig) -> Self {
        let provider = Self {
            host,
            adapter: Mutex::new(None),
            handles: Arc::new(Mutex::new(Vec::new())),
            config,
        };
        provider.initialize(provider.config.environment);
        provider
    }

    /// Select the adapter for `preference`, replacing any current one.
    ///
    /// `Auto` probes for the container runtime and falls back to the overlay.
    /// `Container` is honored even when no runtime is present; opens then
    /// fail with [`Error::NativeHostUnavailable`].
    pub fn initialize(&self, preference: EnvironmentPreference) -> AdapterKind {
        let kind = match preference {
            EnvironmentPreference::Auto if self.host.container.is_present() => {
                AdapterKind::Container
            }
            EnvironmentPreference::Auto | EnvironmentPreference::Overlay => AdapterKind::Overlay,
            EnvironmentPreference::Container => AdapterKind::Container,
        };
        let adapter: Arc<dyn PopupAdapter> = match kind {
            AdapterKind::Container => Arc::new(ContainerAdapter::new(self.host.clone())),
            AdapterKind::Overlay => Arc::new(OverlayAdapter::new(self.host.clone())),
        };
        if preference == EnvironmentPreference::Container && !adapter.is_available() {
            warn!("container environment forced without a native runtime");
        }
        let previous = self.adapter.lock().replace(adapter);
        if let Some(prev) = previous {
            prev.destroy();
        }
        info!(preference = ?preference, environment = %kind, "popup provider initialized");
        kind
    }

    /// Open a popup.
    ///
    /// Returns an error only for configuration problems: no adapter, a forced
    /// but absent container runtime, or content the adapter cannot serve.
    pub fn open(&self, options: PopupOptions) -> Result<PopupHandle> {
        let Some(adapter) = self.adapter.lock().clone() else {
            warn!("open called on an uninitialized popup provider");
            return Err(Error::NotInitialized);
        };
        let resolved = options.resolve(&self.config.defaults);
        let handle = adapter.open(resolved)?;
        self.track(&handle);
        Ok(handle)
    }

    /// Remember `handle` until its result settles.
    fn track(&self, handle: &PopupHandle) {
        if handle.try_result().is_some() {
            return;
        }
        self.handles.lock().push(handle.clone());
        let handles = Arc::downgrade(&self.handles);
        let id = handle.id().clone();
        handle.lifecycle().on_settled(Box::new(move |_| {
            if let Some(handles) = handles.upgrade() {
                handles.lock().retain(|h| h.id() != &id);
            }
        }));
    }

    /// Close one popup; `None` closes it as `programmatic`. Unknown ids are
    /// ignored.
    pub fn close(&self, id: &PopupId, result: Option<PopupResult>) {
        let adapter = self.adapter.lock().clone();
        match adapter {
            Some(a) => a.close(id, result),
            None => debug!(popup_id = %id, "close without an adapter ignored"),
        }
    }

    /// Close every open popup as `programmatic`.
    pub fn close_all(&self) {
        let open = self.open_popups();
        debug!(count = open.len(), "closing all popups");
        for h in open {
            h.close(None);
        }
    }

    /// Reposition one popup.
    pub fn update_position(&self, id: &PopupId, anchor: Option<AnchorRect>) {
        let adapter = self.adapter.lock().clone();
        if let Some(a) = adapter {
            a.update_position(id, anchor);
        }
    }

    /// Snapshot of the popups still open. Popups playing their exit
    /// transition are excluded.
    pub fn open_popups(&self) -> Vec<PopupHandle> {
        self.handles
            .lock()
            .iter()
            .filter(|h| h.is_open())
            .cloned()
            .collect()
    }

    /// Current host theme.
    pub fn theme(&self) -> Theme {
        self.host.theme.current()
    }

    /// Active environment, if initialized.
    pub fn environment(&self) -> Option<AdapterKind> {
        self.adapter.lock().as_ref().map(|a| a.kind())
    }

    /// Defaults merged under every popup's options.
    pub fn defaults(&self) -> &PopupDefaults {
        &self.config.defaults
    }

    /// Close everything, drop the adapter, and return to the uninitialized
    /// state.
    pub fn destroy(&self) {
        self.close_all();
        let adapter = self.adapter.lock().take();
        if let Some(a) = adapter {
            a.destroy();
            info!(environment = %a.kind(), "popup provider destroyed");
        }
    }
}

impl Drop for PopupProvider {
    fn drop(&mut self) {
        self.destroy();
    }
}
