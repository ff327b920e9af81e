//! Environment adapters: one capability contract, two rendering models.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use popup_geom::{AnchorRect, PixelPos, PlacementSpec, Size, center_position, compute_position};
use popup_protocol::{PopupId, PopupResult};

use crate::{error::Result, handle::PopupHandle, options::ResolvedOptions};

mod container;
mod overlay;

pub use container::ContainerAdapter;
pub use overlay::OverlayAdapter;

/// Which adapter is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Native windows through the host container runtime.
    Container,
    /// In-page overlay layers.
    Overlay,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Container => "container",
            Self::Overlay => "overlay",
        })
    }
}

/// Capability set every environment implements.
pub trait PopupAdapter: Send + Sync {
    /// Which environment this is.
    fn kind(&self) -> AdapterKind;

    /// Whether the environment can open popups right now.
    fn is_available(&self) -> bool;

    /// Open a popup. Configuration errors are returned; failures after the
    /// surface starts building close the popup with a `programmatic` result
    /// and go to `on_error` instead.
    fn open(&self, options: ResolvedOptions) -> Result<PopupHandle>;

    /// Close an open popup. Unknown or closed ids are ignored.
    fn close(&self, id: &PopupId, result: Option<PopupResult>);

    /// Reposition an open popup.
    fn update_position(&self, id: &PopupId, anchor: Option<AnchorRect>);

    /// Close everything this adapter opened.
    fn destroy(&self);
}

/// Popups an adapter has open, keyed by id.
pub(crate) struct OpenSet<T> {
    /// Shared map; entries remove themselves on teardown.
    map: Arc<Mutex<HashMap<PopupId, Arc<T>>>>,
}

impl<T> Clone for OpenSet<T> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<T> Default for OpenSet<T> {
    fn default() -> Self {
        Self {
            map: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> OpenSet<T> {
    /// Track `popup` under `id`.
    pub(crate) fn insert(&self, id: PopupId, popup: Arc<T>) {
        self.map.lock().insert(id, popup);
    }

    /// Popup registered under `id`.
    pub(crate) fn get(&self, id: &PopupId) -> Option<Arc<T>> {
        self.map.lock().get(id).cloned()
    }

    /// Forget `id`.
    pub(crate) fn remove(&self, id: &PopupId) {
        self.map.lock().remove(id);
    }

    /// Drain every entry; callers close them outside the lock.
    pub(crate) fn drain(&self) -> Vec<Arc<T>> {
        self.map.lock().drain().map(|(_, p)| p).collect()
    }

    /// Number of tracked popups.
    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }
}

/// Position for a popup of `size`: anchor-relative when the anchor has area,
/// centered otherwise. `None` means the result should be layout-centered.
pub(crate) fn place(
    spec: &PlacementSpec,
    anchor: Option<AnchorRect>,
    size: Size,
    viewport: Size,
) -> Option<PixelPos> {
    match anchor {
        Some(rect) if !rect.is_degenerate() => {
            Some(compute_position(&rect, size, spec, viewport).pos())
        }
        _ => None,
    }
}

/// Like [`place`], but always yields coordinates.
pub(crate) fn place_or_center(
    spec: &PlacementSpec,
    anchor: Option<AnchorRect>,
    size: Size,
    viewport: Size,
) -> PixelPos {
    place(spec, anchor, size, viewport).unwrap_or_else(|| center_position(size, viewport))
}

#[cfg(test)]
mod tests {
    use popup_geom::Rect;

    use super::*;

    const VIEWPORT: Size = Size {
        width: 800.0,
        height: 600.0,
    };

    #[test]
    fn anchors_without_area_fall_back_to_center() {
        let spec = PlacementSpec::default();
        let size = Size::new(200.0, 100.0);
        assert_eq!(place(&spec, None, size, VIEWPORT), None);
        let flat = Rect::new(10.0, 10.0, 50.0, 0.0);
        assert_eq!(place(&spec, Some(flat), size, VIEWPORT), None);
        assert_eq!(
            place_or_center(&spec, Some(flat), size, VIEWPORT),
            PixelPos::new(300, 250)
        );
    }

    #[test]
    fn anchored_placement_uses_the_geometry_engine() {
        let spec = PlacementSpec::default();
        let anchor = Rect::new(40.0, 40.0, 80.0, 20.0);
        assert_eq!(
            place(&spec, Some(anchor), Size::new(100.0, 50.0), VIEWPORT),
            Some(PixelPos::new(40, 64))
        );
    }

    #[test]
    fn adapter_kind_names() {
        assert_eq!(AdapterKind::Container.to_string(), "container");
        assert_eq!(AdapterKind::Overlay.to_string(), "overlay");
    }
}
