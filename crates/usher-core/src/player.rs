//! Video player capability traits
//!
//! The core never constructs a player. Embedding components implement
//! [`VideoPlayer`] and hand the manager an `Arc<dyn VideoPlayer>`; the core
//! drives playback exclusively through this surface and observes the
//! component through its event stream and signal bus.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::signals::Signals;
use crate::types::{MediaMetadata, PlaybackEvent, PlayerKind, Rect};

/// Handle to the player's host element
pub trait ElementHandle: Send + Sync {
    /// DOM id of the element
    fn id(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Tag the element with a marker class
    fn add_class(&self, name: &str);

    /// Dispatch a custom event on the element
    fn dispatch_event(&self, name: &str, detail: Value);

    /// Current layout rectangle in viewport coordinates
    fn layout_rect(&self) -> Rect;
}

/// Polymorphic video component capability
///
/// Control methods are fire-and-forget commands; their outcomes surface
/// later on the event stream. Implementations must not call back into the
/// manager synchronously from a control method.
pub trait VideoPlayer: Send + Sync {
    /// The player's host element
    fn element(&self) -> Arc<dyn ElementHandle>;

    /// Subscribe to the player's playback event stream
    fn events(&self) -> broadcast::Receiver<PlaybackEvent>;

    /// The player's one-shot signal bus
    fn signals(&self) -> Arc<Signals>;

    /// How this player is rendered
    fn kind(&self) -> PlayerKind;

    // --- playback control ---

    /// `auto` distinguishes autoplay-driven playback from user requests
    fn play(&self, auto: bool);
    fn pause(&self);
    fn mute(&self);
    fn unmute(&self);

    // --- fullscreen control ---

    fn fullscreen_enter(&self);
    fn fullscreen_exit(&self);

    // --- UI toggles ---

    fn show_controls(&self);
    fn hide_controls(&self);

    // --- telemetry ---

    /// Current playback position in seconds
    fn current_time(&self) -> f64;

    /// Media duration in seconds; may be non-finite before metadata loads
    fn duration(&self) -> f64;

    /// Played time ranges as `(start, end)` pairs in seconds
    fn played_ranges(&self) -> Vec<(f64, f64)>;

    /// Component-supplied media session metadata, if any
    fn metadata(&self) -> Option<MediaMetadata>;

    // --- capability flags ---

    /// Whether this component can work on the current platform at all
    fn supports_platform(&self) -> bool {
        true
    }

    /// Whether the component accepts user input (controls, taps)
    fn is_interactive(&self) -> bool;

    /// Component handles rotate-to-fullscreen itself
    fn preimplements_auto_fullscreen(&self) -> bool {
        false
    }

    /// Component integrates with the platform media session itself
    fn preimplements_media_session(&self) -> bool {
        false
    }
}
