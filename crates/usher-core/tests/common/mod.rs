//! Shared fakes for integration tests: a scriptable video player and an
//! in-memory implementation of every environment capability.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
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

/// Let spawned listener tasks settle without advancing the paused clock.
pub async fn drain() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    drain().await;
}

// =============================================================================
// Fake element
// =============================================================================

pub struct FakeElement {
    id: String,
    attributes: Mutex<HashMap<String, String>>,
    classes: Mutex<Vec<String>>,
    dispatched: Mutex<Vec<(String, Value)>>,
    rect: Mutex<Rect>,
}

impl FakeElement {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            attributes: Mutex::new(HashMap::new()),
            classes: Mutex::new(Vec::new()),
            dispatched: Mutex::new(Vec::new()),
            rect: Mutex::new(Rect::new(0.0, 0.0, 640.0, 360.0)),
        })
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.attributes
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_rect(&self, rect: Rect) {
        *self.rect.lock().unwrap() = rect;
    }

    pub fn classes(&self) -> Vec<String> {
        self.classes.lock().unwrap().clone()
    }

    pub fn dispatched(&self) -> Vec<(String, Value)> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Payloads of every dispatched event with the given name
    pub fn dispatched_named(&self, name: &str) -> Vec<Value> {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .filter(|(event, _)| event == name)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl ElementHandle for FakeElement {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.lock().unwrap().get(name).cloned()
    }

    fn add_class(&self, name: &str) {
        self.classes.lock().unwrap().push(name.to_string());
    }

    fn dispatch_event(&self, name: &str, detail: Value) {
        self.dispatched
            .lock()
            .unwrap()
            .push((name.to_string(), detail));
    }

    fn layout_rect(&self) -> Rect {
        *self.rect.lock().unwrap()
    }
}

// =============================================================================
// Fake video player
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    Play { auto: bool },
    Pause,
    Mute,
    Unmute,
    FullscreenEnter,
    FullscreenExit,
    ShowControls,
    HideControls,
}

struct Telemetry {
    current_time: f64,
    duration: f64,
    played_ranges: Vec<(f64, f64)>,
    metadata: Option<MediaMetadata>,
}

pub struct FakeVideo {
    element: Arc<FakeElement>,
    events_tx: broadcast::Sender<PlaybackEvent>,
    signals: Arc<Signals>,
    kind: PlayerKind,
    interactive: AtomicBool,
    supports_platform: AtomicBool,
    pre_media_session: AtomicBool,
    pre_auto_fullscreen: AtomicBool,
    telemetry: Mutex<Telemetry>,
    calls: Mutex<Vec<PlayerCall>>,
}

impl FakeVideo {
    pub fn new(id: &str) -> Arc<Self> {
        Self::with_kind(id, PlayerKind::NativeVideo)
    }

    pub fn with_kind(id: &str, kind: PlayerKind) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(128);
        Arc::new(Self {
            element: FakeElement::new(id),
            events_tx,
            signals: Arc::new(Signals::new()),
            kind,
            interactive: AtomicBool::new(true),
            supports_platform: AtomicBool::new(true),
            pre_media_session: AtomicBool::new(false),
            pre_auto_fullscreen: AtomicBool::new(false),
            telemetry: Mutex::new(Telemetry {
                current_time: 0.0,
                duration: f64::NAN,
                played_ranges: Vec::new(),
                metadata: None,
            }),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fake_element(&self) -> &Arc<FakeElement> {
        &self.element
    }

    pub fn signals(&self) -> Arc<Signals> {
        self.signals.clone()
    }

    pub fn as_player(self: &Arc<Self>) -> Arc<dyn VideoPlayer> {
        self.clone()
    }

    pub fn emit(&self, event: PlaybackEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn set_interactive(&self, interactive: bool) {
        self.interactive.store(interactive, Ordering::SeqCst);
    }

    pub fn set_supports_platform(&self, supported: bool) {
        self.supports_platform.store(supported, Ordering::SeqCst);
    }

    pub fn set_preimplements_media_session(&self, value: bool) {
        self.pre_media_session.store(value, Ordering::SeqCst);
    }

    pub fn set_current_time(&self, seconds: f64) {
        self.telemetry.lock().unwrap().current_time = seconds;
    }

    pub fn set_duration(&self, seconds: f64) {
        self.telemetry.lock().unwrap().duration = seconds;
    }

    pub fn set_played_ranges(&self, ranges: Vec<(f64, f64)>) {
        self.telemetry.lock().unwrap().played_ranges = ranges;
    }

    pub fn set_metadata(&self, metadata: MediaMetadata) {
        self.telemetry.lock().unwrap().metadata = Some(metadata);
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, call: &PlayerCall) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|recorded| *recorded == call)
            .count()
    }

    fn record(&self, call: PlayerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl VideoPlayer for FakeVideo {
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
        self.kind.clone()
    }

    fn play(&self, auto: bool) {
        self.record(PlayerCall::Play { auto });
    }

    fn pause(&self) {
        self.record(PlayerCall::Pause);
    }

    fn mute(&self) {
        self.record(PlayerCall::Mute);
    }

    fn unmute(&self) {
        self.record(PlayerCall::Unmute);
    }

    fn fullscreen_enter(&self) {
        self.record(PlayerCall::FullscreenEnter);
    }

    fn fullscreen_exit(&self) {
        self.record(PlayerCall::FullscreenExit);
    }

    fn show_controls(&self) {
        self.record(PlayerCall::ShowControls);
    }

    fn hide_controls(&self) {
        self.record(PlayerCall::HideControls);
    }

    fn current_time(&self) -> f64 {
        self.telemetry.lock().unwrap().current_time
    }

    fn duration(&self) -> f64 {
        self.telemetry.lock().unwrap().duration
    }

    fn played_ranges(&self) -> Vec<(f64, f64)> {
        self.telemetry.lock().unwrap().played_ranges.clone()
    }

    fn metadata(&self) -> Option<MediaMetadata> {
        self.telemetry.lock().unwrap().metadata.clone()
    }

    fn supports_platform(&self) -> bool {
        self.supports_platform.load(Ordering::SeqCst)
    }

    fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::SeqCst)
    }

    fn preimplements_auto_fullscreen(&self) -> bool {
        self.pre_auto_fullscreen.load(Ordering::SeqCst)
    }

    fn preimplements_media_session(&self) -> bool {
        self.pre_media_session.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Fake services
// =============================================================================

#[derive(Default)]
pub struct FakeViewport {
    observed: Mutex<HashMap<String, mpsc::UnboundedSender<VisibilityChange>>>,
    measurements: Mutex<HashMap<String, Intersection>>,
    scrolls: Mutex<Vec<(String, ScrollTarget)>>,
    disconnected: AtomicBool,
}

impl FakeViewport {
    pub fn is_observing(&self, element_id: &str) -> bool {
        self.observed.lock().unwrap().contains_key(element_id)
    }

    pub fn send_visibility(&self, element_id: &str, is_visible: bool) {
        if let Some(updates) = self.observed.lock().unwrap().get(element_id) {
            let _ = updates.send(VisibilityChange {
                element_id: element_id.to_string(),
                is_visible,
            });
        }
    }

    pub fn set_measurement(&self, element_id: &str, intersection: Intersection) {
        self.measurements
            .lock()
            .unwrap()
            .insert(element_id.to_string(), intersection);
    }

    pub fn scrolls(&self) -> Vec<(String, ScrollTarget)> {
        self.scrolls.lock().unwrap().clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ViewportObserver for FakeViewport {
    fn observe(&self, element_id: &str, updates: mpsc::UnboundedSender<VisibilityChange>) {
        self.observed
            .lock()
            .unwrap()
            .insert(element_id.to_string(), updates);
    }

    fn unobserve(&self, element_id: &str) {
        self.observed.lock().unwrap().remove(element_id);
    }

    fn disconnect(&self) {
        self.observed.lock().unwrap().clear();
        self.disconnected.store(true, Ordering::SeqCst);
    }

    async fn measure(&self, element_id: &str) -> Option<Intersection> {
        self.measurements.lock().unwrap().get(element_id).copied()
    }

    fn viewport_size(&self) -> (f64, f64) {
        (400.0, 800.0)
    }

    async fn scroll_into_view(&self, element_id: &str, target: ScrollTarget) {
        self.scrolls
            .lock()
            .unwrap()
            .push((element_id.to_string(), target));
    }
}

#[derive(Debug, Clone)]
pub struct TriggeredEvent {
    pub element_id: String,
    pub name: String,
    pub detail: Value,
    pub trust: ActionTrust,
}

#[derive(Default)]
pub struct FakeActions {
    handlers: Mutex<HashMap<(String, String), ActionHandler>>,
    registrations: Mutex<Vec<(String, String)>>,
    triggered: Mutex<Vec<TriggeredEvent>>,
}

impl FakeActions {
    pub fn has_action(&self, element_id: &str, name: &str) -> bool {
        self.handlers
            .lock()
            .unwrap()
            .contains_key(&(element_id.to_string(), name.to_string()))
    }

    /// Invoke a registered action as the action service would
    pub fn invoke(&self, element_id: &str, name: &str) {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .get(&(element_id.to_string(), name.to_string()))
            .cloned();
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn registrations(&self) -> Vec<(String, String)> {
        self.registrations.lock().unwrap().clone()
    }

    pub fn triggered(&self) -> Vec<TriggeredEvent> {
        self.triggered.lock().unwrap().clone()
    }

    pub fn triggered_named(&self, name: &str) -> Vec<TriggeredEvent> {
        self.triggered
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.name == name)
            .cloned()
            .collect()
    }
}

impl ActionHost for FakeActions {
    fn register_action(
        &self,
        element_id: &str,
        name: &str,
        _trust: ActionTrust,
        handler: ActionHandler,
    ) {
        self.handlers
            .lock()
            .unwrap()
            .insert((element_id.to_string(), name.to_string()), handler);
        self.registrations
            .lock()
            .unwrap()
            .push((element_id.to_string(), name.to_string()));
    }

    fn trigger(&self, element_id: &str, event_name: &str, detail: Value, trust: ActionTrust) {
        self.triggered.lock().unwrap().push(TriggeredEvent {
            element_id: element_id.to_string(),
            name: event_name.to_string(),
            detail,
            trust,
        });
    }
}

#[derive(Default)]
pub struct FakePlatform {
    pub ios: AtomicBool,
    pub safari: AtomicBool,
    pub android: AtomicBool,
    pub chrome: AtomicBool,
}

impl Platform for FakePlatform {
    fn is_ios(&self) -> bool {
        self.ios.load(Ordering::SeqCst)
    }

    fn is_safari(&self) -> bool {
        self.safari.load(Ordering::SeqCst)
    }

    fn is_android(&self) -> bool {
        self.android.load(Ordering::SeqCst)
    }

    fn is_chrome(&self) -> bool {
        self.chrome.load(Ordering::SeqCst)
    }
}

pub struct FakeOrientation {
    current: Mutex<Orientation>,
    rotations_tx: broadcast::Sender<Orientation>,
}

impl Default for FakeOrientation {
    fn default() -> Self {
        let (rotations_tx, _) = broadcast::channel(16);
        Self {
            current: Mutex::new(Orientation::Portrait),
            rotations_tx,
        }
    }
}

impl FakeOrientation {
    pub fn rotate_to(&self, orientation: Orientation) {
        *self.current.lock().unwrap() = orientation;
        let _ = self.rotations_tx.send(orientation);
    }

    /// Re-send the current orientation, as a second event source would
    pub fn notify_again(&self) {
        let orientation = *self.current.lock().unwrap();
        let _ = self.rotations_tx.send(orientation);
    }
}

impl OrientationProvider for FakeOrientation {
    fn orientation(&self) -> Orientation {
        *self.current.lock().unwrap()
    }

    fn subscribe(&self) -> broadcast::Receiver<Orientation> {
        self.rotations_tx.subscribe()
    }
}

pub struct FakeDocument {
    pub title: Mutex<Option<String>>,
    pub poster: Mutex<Option<Url>>,
    fullscreen_tx: broadcast::Sender<()>,
}

impl Default for FakeDocument {
    fn default() -> Self {
        let (fullscreen_tx, _) = broadcast::channel(16);
        Self {
            title: Mutex::new(None),
            poster: Mutex::new(None),
            fullscreen_tx,
        }
    }
}

impl FakeDocument {
    pub fn emit_fullscreen_change(&self) {
        let _ = self.fullscreen_tx.send(());
    }
}

impl DocumentHost for FakeDocument {
    fn title(&self) -> Option<String> {
        self.title.lock().unwrap().clone()
    }

    fn fallback_poster(&self) -> Option<Url> {
        self.poster.lock().unwrap().clone()
    }

    fn fullscreen_changes(&self) -> broadcast::Receiver<()> {
        self.fullscreen_tx.subscribe()
    }
}

#[derive(Default)]
pub struct FakeAutoplayProbe {
    pub supported: AtomicBool,
    pub probes: AtomicU32,
}

impl FakeAutoplayProbe {
    pub fn supporting() -> Self {
        let probe = Self::default();
        probe.supported.store(true, Ordering::SeqCst);
        probe
    }
}

#[async_trait]
impl AutoplayProbe for FakeAutoplayProbe {
    async fn is_autoplay_supported(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.supported.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeMediaSession {
    metadata: Mutex<Option<MediaMetadata>>,
    handlers: Mutex<Option<(ActionHandler, ActionHandler)>>,
}

impl FakeMediaSession {
    pub fn metadata(&self) -> Option<MediaMetadata> {
        self.metadata.lock().unwrap().clone()
    }

    pub fn has_handlers(&self) -> bool {
        self.handlers.lock().unwrap().is_some()
    }

    pub fn invoke_pause_handler(&self) {
        let pause = self
            .handlers
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, pause)| pause.clone());
        if let Some(pause) = pause {
            pause();
        }
    }
}

impl MediaSessionGateway for FakeMediaSession {
    fn set_metadata(&self, metadata: &MediaMetadata) {
        *self.metadata.lock().unwrap() = Some(metadata.clone());
    }

    fn set_handlers(&self, play: ActionHandler, pause: ActionHandler) {
        *self.handlers.lock().unwrap() = Some((play, pause));
    }
}

pub struct FakeOverlay {
    pub element_id: String,
    pub interactive: bool,
    playing_calls: Mutex<Vec<bool>>,
    ad_calls: Mutex<Vec<bool>>,
    dismissals: AtomicU32,
    on_tap: ActionHandler,
}

impl FakeOverlay {
    pub fn tap(&self) {
        (self.on_tap)();
    }

    pub fn playing_calls(&self) -> Vec<bool> {
        self.playing_calls.lock().unwrap().clone()
    }

    pub fn ad_calls(&self) -> Vec<bool> {
        self.ad_calls.lock().unwrap().clone()
    }

    pub fn dismissals(&self) -> u32 {
        self.dismissals.load(Ordering::SeqCst)
    }
}

impl AutoplayOverlay for FakeOverlay {
    fn set_playing(&self, playing: bool) {
        self.playing_calls.lock().unwrap().push(playing);
    }

    fn set_ad_showing(&self, showing: bool) {
        self.ad_calls.lock().unwrap().push(showing);
    }

    fn dismiss(&self) {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeOverlayFactory {
    installed: Mutex<Vec<Arc<FakeOverlay>>>,
}

impl FakeOverlayFactory {
    pub fn installed(&self) -> Vec<Arc<FakeOverlay>> {
        self.installed.lock().unwrap().clone()
    }

    pub fn overlay_for(&self, element_id: &str) -> Option<Arc<FakeOverlay>> {
        self.installed
            .lock()
            .unwrap()
            .iter()
            .find(|overlay| overlay.element_id == element_id)
            .cloned()
    }
}

impl OverlayFactory for FakeOverlayFactory {
    fn install(
        &self,
        element_id: &str,
        interactive: bool,
        on_tap: ActionHandler,
    ) -> Arc<dyn AutoplayOverlay> {
        let overlay = Arc::new(FakeOverlay {
            element_id: element_id.to_string(),
            interactive,
            playing_calls: Mutex::new(Vec::new()),
            ad_calls: Mutex::new(Vec::new()),
            dismissals: AtomicU32::new(0),
            on_tap,
        });
        self.installed.lock().unwrap().push(overlay.clone());
        overlay
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub viewport: Arc<FakeViewport>,
    pub actions: Arc<FakeActions>,
    pub platform: Arc<FakePlatform>,
    pub orientation: Arc<FakeOrientation>,
    pub document: Arc<FakeDocument>,
    pub autoplay: Arc<FakeAutoplayProbe>,
    pub media_session: Arc<FakeMediaSession>,
    pub overlays: Arc<FakeOverlayFactory>,
    pub manager: Arc<VideoManager>,
}

impl Harness {
    /// Harness with autoplay supported by the platform
    pub fn new() -> Self {
        Self::with_autoplay_support(true)
    }

    pub fn with_autoplay_support(supported: bool) -> Self {
        let viewport = Arc::new(FakeViewport::default());
        let actions = Arc::new(FakeActions::default());
        let platform = Arc::new(FakePlatform::default());
        let orientation = Arc::new(FakeOrientation::default());
        let document = Arc::new(FakeDocument::default());
        let autoplay = Arc::new(if supported {
            FakeAutoplayProbe::supporting()
        } else {
            FakeAutoplayProbe::default()
        });
        let media_session = Arc::new(FakeMediaSession::default());
        let overlays = Arc::new(FakeOverlayFactory::default());

        let services = Services {
            viewport: viewport.clone(),
            actions: actions.clone(),
            platform: platform.clone(),
            orientation: orientation.clone(),
            document: document.clone(),
            autoplay: autoplay.clone(),
            media_session: media_session.clone(),
            overlays: overlays.clone(),
        };
        let manager = VideoManager::new(services);

        Self {
            viewport,
            actions,
            platform,
            orientation,
            document,
            autoplay,
            media_session,
            overlays,
            manager,
        }
    }

    /// Register a fake video, settling listener tasks afterwards.
    pub async fn register(&self, video: &Arc<FakeVideo>) -> usher_core::Result<()> {
        let player = video.as_player();
        let result = self.manager.register(&player);
        drain().await;
        result
    }
}
