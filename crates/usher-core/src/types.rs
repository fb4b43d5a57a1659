//! Core types for Usher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

// =============================================================================
// Tuning constants (fixed, not user-overridable)
// =============================================================================

/// Cadence of the seconds-played ticker.
pub const SECONDS_PLAYED_MIN_DELAY: Duration = Duration::from_millis(1000);

/// Step between emitted percentage-played milestones.
pub const PERCENTAGE_INTERVAL: u32 = 5;

/// Polling cadence of the percentage tracker while the video is paused.
pub const PERCENTAGE_FREQUENCY_WHEN_PAUSED: Duration = Duration::from_millis(500);

/// Lower bound on the percentage tracker cadence, in milliseconds.
pub const PERCENTAGE_FREQUENCY_MIN_MS: u64 = 250;

/// Upper bound on the percentage tracker cadence, in milliseconds.
pub const PERCENTAGE_FREQUENCY_MAX_MS: u64 = 4000;

/// Intersection ratio at which a video counts as visible for autoplay and
/// centered-candidate selection.
pub const MIN_VISIBILITY_RATIO_FOR_AUTOPLAY: f64 = 0.5;

/// How long a device rotation is given to settle visually before the
/// viewport is measured for scroll/fullscreen decisions.
pub const ORIENTATION_SETTLE_DELAY: Duration = Duration::from_millis(330);

/// Intersection-ratio difference below which two centering candidates are
/// treated as equally visible and the tie breaks on geometry instead.
pub const CENTERING_RATIO_TOLERANCE: f64 = 0.1;

// =============================================================================
// Playback state
// =============================================================================

/// Derived playing state of a registered video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayingState {
    /// Not playing
    Paused,
    /// Playing because a user asked for it
    PlayingManual,
    /// Playing because the autoplay machinery started it and the user has
    /// not interacted yet
    PlayingAuto,
}

impl std::fmt::Display for PlayingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayingState::Paused => write!(f, "paused"),
            PlayingState::PlayingManual => write!(f, "playing_manual"),
            PlayingState::PlayingAuto => write!(f, "playing_auto"),
        }
    }
}

/// Events a video player publishes on its event stream
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// The underlying media finished loading
    Load,
    /// The component swapped its source and reloaded
    Reload,
    /// Media metadata (duration et al.) became available
    LoadedMetadata,
    /// A discrete play request was observed
    Play,
    /// Playback actually advanced
    Playing,
    /// Playback stopped advancing
    Pause,
    /// Playback reached the end of the media
    Ended,
    Muted,
    Unmuted,
    /// An ad break started rolling
    AdStart,
    /// An ad break finished
    AdEnd,
    /// Component-defined analytics tick; `vars` carries the reserved
    /// `eventType` key plus arbitrary extra vars
    CustomTick { vars: Map<String, Value> },
}

/// One-shot lifecycle signals latched on a video's signal bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoSignal {
    /// The manager accepted this video
    Registered,
    /// A user gesture touched this video (taps, declarative actions, unmute)
    UserInteracted,
    /// An outer component took over playback management
    PlaybackDelegated,
}

/// How a video is rendered, for fullscreen-capability decisions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlayerKind {
    /// Backed by a native `<video>` element
    NativeVideo,
    /// Backed by a third-party iframe embed, identified by component name
    Embed(String),
}

/// Trust level attached to action registrations and triggered events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionTrust {
    Low,
    Default,
    High,
}

/// Device orientation as reported by the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Portrait,
    Landscape,
}

// =============================================================================
// Analytics
// =============================================================================

/// Analytics event kinds emitted on a video's element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoAnalyticsEvent {
    Play,
    Pause,
    Ended,
    AdStart,
    AdEnd,
    /// An action-driven playback session ended
    Session,
    /// A visibility-driven playback session ended
    SessionVisible,
    SecondsPlayed,
    PercentagePlayed,
    /// Component-defined custom event
    Custom,
}

impl VideoAnalyticsEvent {
    /// Name of the custom event dispatched on the element
    pub fn event_name(&self) -> &'static str {
        match self {
            VideoAnalyticsEvent::Play => "play",
            VideoAnalyticsEvent::Pause => "pause",
            VideoAnalyticsEvent::Ended => "ended",
            VideoAnalyticsEvent::AdStart => "ad_start",
            VideoAnalyticsEvent::AdEnd => "ad_end",
            VideoAnalyticsEvent::Session => "session",
            VideoAnalyticsEvent::SessionVisible => "session-visible",
            VideoAnalyticsEvent::SecondsPlayed => "seconds-played",
            VideoAnalyticsEvent::PercentagePlayed => "percentage-played",
            VideoAnalyticsEvent::Custom => "custom",
        }
    }
}

/// Snapshot of a video's state attached to every analytics event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsDetails {
    /// Whether this video is autoplay-eligible in the current environment
    pub autoplay: bool,
    pub current_time: f64,
    pub duration: f64,
    pub height: f64,
    /// DOM id of the video's element
    pub id: String,
    pub muted: bool,
    /// Total seconds covered by the played ranges
    pub played_total: f64,
    /// Played ranges encoded as a JSON array of `[start, end]` pairs
    pub played_ranges_json: String,
    /// Rendered [`PlayingState`]
    pub state: String,
    pub width: f64,
}

/// Analytics event with envelope metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    /// Unique event ID
    pub id: Uuid,
    /// Emission timestamp
    pub timestamp: DateTime<Utc>,
    /// Event name, matching [`VideoAnalyticsEvent::event_name`]
    pub event: String,
    /// Extra event vars (percentage milestones, custom tick payloads)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vars: Option<Map<String, Value>>,
    /// State snapshot at emission time
    pub details: AnalyticsDetails,
}

// =============================================================================
// Media session metadata
// =============================================================================

/// Metadata handed to the platform media session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Artwork URLs, most preferred first
    pub artwork: Vec<Url>,
}

// =============================================================================
// Geometry
// =============================================================================

/// Layout rectangle of an element, in viewport coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

/// Absolute distance between an element's vertical center and the
/// viewport's vertical center
pub fn center_distance(viewport_height: f64, rect: &Rect) -> f64 {
    (rect.center_y() - viewport_height / 2.0).abs()
}

/// Viewport intersection measurement for one element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Fraction of the element's area inside the viewport, 0.0..=1.0
    pub ratio: f64,
    /// The element's bounding rect at measurement time
    pub rect: Rect,
}
