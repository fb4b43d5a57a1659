//! Minimal end-to-end wiring: one autoplaying video scrolled in and out of
//! view, with every environment capability stubbed in-process.
//!
//! Run with: cargo run --example autoplay_walkthrough

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use url::Url;

use usher_core::{
    ActionHandler, ActionHost, ActionTrust, AutoplayOverlay, AutoplayProbe, DocumentHost,
    ElementHandle, Intersection, MediaMetadata, MediaSessionGateway, Orientation,
    OrientationProvider, OverlayFactory, Platform, PlaybackEvent, PlayerKind, Rect, ScrollTarget,
    Services, Signals, VideoManager, VideoPlayer, ViewportObserver, VisibilityChange,
};

// ---------------------------------------------------------------------------
// A bare-bones video component
// ---------------------------------------------------------------------------

struct DemoElement {
    attributes: HashMap<String, String>,
}

impl ElementHandle for DemoElement {
    fn id(&self) -> String {
        "demo-video".to_string()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    fn add_class(&self, name: &str) {
        tracing::info!(class = name, "element tagged");
    }

    fn dispatch_event(&self, name: &str, _detail: Value) {
        tracing::info!(event = name, "analytics event dispatched");
    }

    fn layout_rect(&self) -> Rect {
        Rect::new(120.0, 0.0, 640.0, 360.0)
    }
}

struct DemoVideo {
    element: Arc<DemoElement>,
    events_tx: broadcast::Sender<PlaybackEvent>,
    signals: Arc<Signals>,
}

impl DemoVideo {
    fn new() -> Arc<Self> {
        let mut attributes = HashMap::new();
        attributes.insert("autoplay".to_string(), String::new());
        attributes.insert("title".to_string(), "Demo clip".to_string());
        let (events_tx, _) = broadcast::channel(32);
        Arc::new(Self {
            element: Arc::new(DemoElement { attributes }),
            events_tx,
            signals: Arc::new(Signals::new()),
        })
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl VideoPlayer for DemoVideo {
    fn element(&self) -> Arc<dyn ElementHandle> {
        self.element.clone()
    }

    fn events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events_tx.subscribe()
    }

    fn signals(&self) -> Arc<Signals> {
        self.signals.clone()
    }

    fn kind(&self) -> PlayerKind {
        PlayerKind::NativeVideo
    }

    fn play(&self, auto: bool) {
        tracing::info!(auto, "video.play");
        self.emit(PlaybackEvent::Playing);
    }

    fn pause(&self) {
        tracing::info!("video.pause");
        self.emit(PlaybackEvent::Pause);
    }

    fn mute(&self) {
        tracing::info!("video.mute");
        self.emit(PlaybackEvent::Muted);
    }

    fn unmute(&self) {
        tracing::info!("video.unmute");
        self.emit(PlaybackEvent::Unmuted);
    }

    fn fullscreen_enter(&self) {}
    fn fullscreen_exit(&self) {}

    fn show_controls(&self) {
        tracing::info!("controls shown");
    }

    fn hide_controls(&self) {
        tracing::info!("controls hidden");
    }

    fn current_time(&self) -> f64 {
        4.2
    }

    fn duration(&self) -> f64 {
        60.0
    }

    fn played_ranges(&self) -> Vec<(f64, f64)> {
        vec![(0.0, 4.2)]
    }

    fn metadata(&self) -> Option<MediaMetadata> {
        None
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Stub environment
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StubViewport {
    updates: Mutex<Option<mpsc::UnboundedSender<VisibilityChange>>>,
}

impl StubViewport {
    fn set_visible(&self, element_id: &str, is_visible: bool) {
        if let Some(updates) = self.updates.lock().unwrap().as_ref() {
            let _ = updates.send(VisibilityChange {
                element_id: element_id.to_string(),
                is_visible,
            });
        }
    }
}

#[async_trait]
impl ViewportObserver for StubViewport {
    fn observe(&self, _element_id: &str, updates: mpsc::UnboundedSender<VisibilityChange>) {
        *self.updates.lock().unwrap() = Some(updates);
    }

    fn unobserve(&self, _element_id: &str) {}

    fn disconnect(&self) {}

    async fn measure(&self, _element_id: &str) -> Option<Intersection> {
        None
    }

    fn viewport_size(&self) -> (f64, f64) {
        (400.0, 800.0)
    }

    async fn scroll_into_view(&self, _element_id: &str, _target: ScrollTarget) {}
}

struct StubActions;

impl ActionHost for StubActions {
    fn register_action(
        &self,
        element_id: &str,
        name: &str,
        _trust: ActionTrust,
        _handler: ActionHandler,
    ) {
        tracing::debug!(element_id, action = name, "action registered");
    }

    fn trigger(&self, element_id: &str, event_name: &str, detail: Value, _trust: ActionTrust) {
        tracing::info!(element_id, event = event_name, %detail, "action event");
    }
}

struct StubPlatform;

impl Platform for StubPlatform {
    fn is_ios(&self) -> bool {
        false
    }
    fn is_safari(&self) -> bool {
        false
    }
    fn is_android(&self) -> bool {
        false
    }
    fn is_chrome(&self) -> bool {
        false
    }
}

struct StubOrientation {
    rotations_tx: broadcast::Sender<Orientation>,
}

impl OrientationProvider for StubOrientation {
    fn orientation(&self) -> Orientation {
        Orientation::Portrait
    }

    fn subscribe(&self) -> broadcast::Receiver<Orientation> {
        self.rotations_tx.subscribe()
    }
}

struct StubDocument {
    fullscreen_tx: broadcast::Sender<()>,
}

impl DocumentHost for StubDocument {
    fn title(&self) -> Option<String> {
        Some("Walkthrough".to_string())
    }

    fn fallback_poster(&self) -> Option<Url> {
        None
    }

    fn fullscreen_changes(&self) -> broadcast::Receiver<()> {
        self.fullscreen_tx.subscribe()
    }
}

struct StubProbe;

#[async_trait]
impl AutoplayProbe for StubProbe {
    async fn is_autoplay_supported(&self) -> bool {
        true
    }
}

struct StubMediaSession;

impl MediaSessionGateway for StubMediaSession {
    fn set_metadata(&self, metadata: &MediaMetadata) {
        tracing::info!(title = %metadata.title, "media session metadata");
    }

    fn set_handlers(&self, _play: ActionHandler, _pause: ActionHandler) {}
}

struct StubOverlay;

impl AutoplayOverlay for StubOverlay {
    fn set_playing(&self, playing: bool) {
        tracing::info!(playing, "autoplay icon toggled");
    }

    fn set_ad_showing(&self, showing: bool) {
        tracing::info!(showing, "ad state toggled");
    }

    fn dismiss(&self) {
        tracing::info!("autoplay overlay removed");
    }
}

struct StubOverlayFactory;

impl OverlayFactory for StubOverlayFactory {
    fn install(
        &self,
        element_id: &str,
        interactive: bool,
        _on_tap: ActionHandler,
    ) -> Arc<dyn AutoplayOverlay> {
        tracing::info!(element_id, interactive, "autoplay overlay installed");
        Arc::new(StubOverlay)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    usher_core::init();

    let viewport = Arc::new(StubViewport::default());
    let services = Services {
        viewport: viewport.clone(),
        actions: Arc::new(StubActions),
        platform: Arc::new(StubPlatform),
        orientation: Arc::new(StubOrientation {
            rotations_tx: broadcast::channel(4).0,
        }),
        document: Arc::new(StubDocument {
            fullscreen_tx: broadcast::channel(4).0,
        }),
        autoplay: Arc::new(StubProbe),
        media_session: Arc::new(StubMediaSession),
        overlays: Arc::new(StubOverlayFactory),
    };

    let manager = VideoManager::new(services);
    let video = DemoVideo::new();
    let player: Arc<dyn VideoPlayer> = video.clone();
    manager.register(&player).expect("registration");

    video.emit(PlaybackEvent::Load);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    tracing::info!("-- scrolling the video into view --");
    viewport.set_visible("demo-video", true);
    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
    tracing::info!(
        state = %manager.playing_state(&player).expect("registered"),
        "after entering the viewport"
    );

    tracing::info!("-- scrolling the video out of view --");
    viewport.set_visible("demo-video", false);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    tracing::info!(
        state = %manager.playing_state(&player).expect("registered"),
        "after leaving the viewport"
    );

    manager.dispose();
}
