//! Environment capabilities consumed by the coordinator
//!
//! Everything the core needs from the surrounding document/runtime arrives
//! through these traits, bundled into [`Services`] and injected into
//! [`crate::manager::VideoManager`] at construction. There is no global
//! service lookup; a manager sees exactly the environment it was given.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::types::{ActionTrust, Intersection, MediaMetadata, Orientation};

/// Boxed callback invoked by the environment (action handlers, media
/// session handlers, overlay taps)
pub type ActionHandler = Arc<dyn Fn() + Send + Sync>;

/// Visibility threshold crossing delivered by the viewport observer
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityChange {
    pub element_id: String,
    pub is_visible: bool,
}

/// Where a scroll animation should leave the element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollTarget {
    /// Minimal scroll that brings the element into view
    Nearest,
    /// Element vertically centered in the viewport
    Center,
}

/// Shared intersection observation of video elements
///
/// Implementations deliver a [`VisibilityChange`] whenever an observed
/// element crosses [`crate::types::MIN_VISIBILITY_RATIO_FOR_AUTOPLAY`].
/// `measure` returns the full-precision ratio for selection heuristics and
/// resolves to `None` when the element unloads mid-measurement.
#[async_trait]
pub trait ViewportObserver: Send + Sync {
    fn observe(&self, element_id: &str, updates: mpsc::UnboundedSender<VisibilityChange>);

    fn unobserve(&self, element_id: &str);

    /// Stop observing everything; called on manager disposal
    fn disconnect(&self);

    async fn measure(&self, element_id: &str) -> Option<Intersection>;

    /// `(width, height)` of the viewport
    fn viewport_size(&self) -> (f64, f64);

    async fn scroll_into_view(&self, element_id: &str, target: ScrollTarget);
}

/// Declarative action registration and event triggering
pub trait ActionHost: Send + Sync {
    fn register_action(
        &self,
        element_id: &str,
        name: &str,
        trust: ActionTrust,
        handler: ActionHandler,
    );

    /// Trigger an action event consumable by declarative bindings
    fn trigger(&self, element_id: &str, event_name: &str, detail: Value, trust: ActionTrust);
}

/// Browser/OS flags relevant to fullscreen and rotation behavior
pub trait Platform: Send + Sync {
    fn is_ios(&self) -> bool;
    fn is_safari(&self) -> bool;
    fn is_android(&self) -> bool;
    fn is_chrome(&self) -> bool;
}

/// Device orientation, current and streamed
///
/// Implementations fold both the modern and the legacy rotation event
/// sources into one stream; consumers tolerate duplicate notifications.
pub trait OrientationProvider: Send + Sync {
    fn orientation(&self) -> Orientation;

    fn subscribe(&self) -> broadcast::Receiver<Orientation>;
}

/// Document-level context
pub trait DocumentHost: Send + Sync {
    fn title(&self) -> Option<String>;

    /// Poster fallback resolved by the host (structured data, open graph,
    /// then favicon)
    fn fallback_poster(&self) -> Option<Url>;

    /// Fires on any document fullscreen change, vendor prefixes included
    fn fullscreen_changes(&self) -> broadcast::Receiver<()>;
}

/// Asynchronous probe for platform autoplay support
#[async_trait]
pub trait AutoplayProbe: Send + Sync {
    async fn is_autoplay_supported(&self) -> bool;
}

/// Platform media session integration
///
/// Metadata validation is the gateway's concern, not the caller's.
pub trait MediaSessionGateway: Send + Sync {
    fn set_metadata(&self, metadata: &MediaMetadata);

    fn set_handlers(&self, play: ActionHandler, pause: ActionHandler);
}

/// Injected autoplay UI: an animated icon plus, on interactive players, a
/// tap-capturing mask
pub trait AutoplayOverlay: Send + Sync {
    /// Toggle the icon's play-state styling
    fn set_playing(&self, playing: bool);

    /// Hide the icon while an ad is rolling
    fn set_ad_showing(&self, showing: bool);

    /// Remove the injected UI. Must be idempotent.
    fn dismiss(&self);
}

/// Creates autoplay overlays on demand
pub trait OverlayFactory: Send + Sync {
    /// `on_tap` fires when the mask captures an interaction; the mask is
    /// only installed when `interactive` is true.
    fn install(
        &self,
        element_id: &str,
        interactive: bool,
        on_tap: ActionHandler,
    ) -> Arc<dyn AutoplayOverlay>;
}

/// Bundle of environment capabilities injected into a manager
#[derive(Clone)]
pub struct Services {
    pub viewport: Arc<dyn ViewportObserver>,
    pub actions: Arc<dyn ActionHost>,
    pub platform: Arc<dyn Platform>,
    pub orientation: Arc<dyn OrientationProvider>,
    pub document: Arc<dyn DocumentHost>,
    pub autoplay: Arc<dyn AutoplayProbe>,
    pub media_session: Arc<dyn MediaSessionGateway>,
    pub overlays: Arc<dyn OverlayFactory>,
}
