//! Usher Core - Viewport-Driven Video Playback Coordination
//!
//! This crate coordinates every embedded video in a document context:
//! - Registration and per-video playback state machines
//! - Visibility-driven autoplay with one-shot interaction teardown
//! - Analytics sessions, seconds-played and percentage-played milestones
//! - Rotate-to-fullscreen selection of the best centered video
//! - Single-manual-playback exclusivity across videos
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     VideoManager                          │
//! │   registry · visibility pump · seconds ticker · policy    │
//! ├──────────────┬─────────────────────────┬──────────────────┤
//! │  VideoEntry  │  VideoEntry  │   ...    │ AutoFullscreen   │
//! │  state machine, autoplay,   │          │ Manager          │
//! │  session + % trackers       │          │ (lazy, shared)   │
//! ├──────────────┴─────────────────────────┴──────────────────┤
//! │           Services (injected environment capabilities)    │
//! │  viewport · actions · platform · orientation · document   │
//! │  autoplay probe · media session · overlays                │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Components implement [`VideoPlayer`] and call
//! [`VideoManager::register`]; everything else is event-driven.

pub mod entry;
pub mod error;
pub mod fullscreen;
pub mod manager;
pub mod percentage;
pub mod player;
pub mod services;
pub mod session;
pub mod signals;
pub mod types;

pub use entry::VideoEntry;
pub use error::{Error, Result};
pub use fullscreen::AutoFullscreenManager;
pub use manager::VideoManager;
pub use percentage::AnalyticsPercentageTracker;
pub use player::{ElementHandle, VideoPlayer};
pub use services::{
    ActionHandler, ActionHost, AutoplayOverlay, AutoplayProbe, DocumentHost, MediaSessionGateway,
    OrientationProvider, OverlayFactory, Platform, ScrollTarget, Services, ViewportObserver,
    VisibilityChange,
};
pub use session::VideoSessionManager;
pub use signals::Signals;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Usher Core initialized");
}
