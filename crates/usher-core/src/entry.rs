//! Per-video state machine
//!
//! A [`VideoEntry`] wraps one registered player and owns everything that is
//! per-video: the playing/visibility flags, the two analytics sessions, the
//! percentage tracker, media-session metadata, and the autoplay machinery.
//! Entries are created by [`crate::manager::VideoManager::register`] and
//! live as long as the manager does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::manager::VideoManager;
use crate::percentage::AnalyticsPercentageTracker;
use crate::player::VideoPlayer;
use crate::services::{ActionHandler, AutoplayOverlay, Services};
use crate::session::VideoSessionManager;
use crate::types::{
    ActionTrust, AnalyticsDetails, AnalyticsRecord, MediaMetadata, PlaybackEvent, PlayingState,
    VideoAnalyticsEvent, VideoSignal,
};

/// Attribute opting an element into autoplay
pub const AUTOPLAY_ATTR: &str = "autoplay";

/// Attribute opting an element into rotate-to-fullscreen
pub const ROTATE_TO_FULLSCREEN_ATTR: &str = "rotate-to-fullscreen";

/// Attribute opting an element out of media session integration
const NO_MEDIA_SESSION_ATTR: &str = "no-media-session";

/// Action event fired the first time a video plays manually
const FIRST_PLAY_ACTION: &str = "firstPlay";

/// Reserved var key on custom analytics ticks
const CUSTOM_TICK_EVENT_TYPE: &str = "eventType";

#[derive(Debug)]
struct EntryFlags {
    manage_playback: bool,
    loaded: bool,
    is_playing: bool,
    is_rolling_ad: bool,
    is_visible: bool,
    muted: bool,
    play_called_by_autoplay: bool,
    pause_called_by_autoplay: bool,
    has_seen_play_event: bool,
}

impl Default for EntryFlags {
    fn default() -> Self {
        Self {
            manage_playback: true,
            loaded: false,
            is_playing: false,
            is_rolling_ad: false,
            is_visible: false,
            muted: false,
            play_called_by_autoplay: false,
            pause_called_by_autoplay: false,
            has_seen_play_event: false,
        }
    }
}

/// One registered video and its playback state machine
pub struct VideoEntry {
    video: Arc<dyn VideoPlayer>,
    services: Services,
    manager: Weak<VideoManager>,
    flags: Mutex<EntryFlags>,
    has_autoplay: bool,
    wants_auto_fullscreen: bool,
    /// Session spanning play-action to pause-action
    action_session: VideoSessionManager,
    /// Session spanning visible-while-playing stretches
    visibility_session: VideoSessionManager,
    percentage_tracker: Arc<AnalyticsPercentageTracker>,
    metadata: Mutex<MediaMetadata>,
    first_play_fired: AtomicBool,
    autoplay_installed: AtomicBool,
    autoplay_torn_down: AtomicBool,
    overlay_task: Mutex<Option<JoinHandle<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl VideoEntry {
    /// Validate the player's registration contract and wire its listeners.
    ///
    /// Fails when the element asks for rotate-to-fullscreen but the player
    /// is not interactive; the gesture could never be attributed.
    pub(crate) fn new(
        manager: &Arc<VideoManager>,
        video: Arc<dyn VideoPlayer>,
        services: Services,
    ) -> Result<Arc<Self>> {
        let wants_auto_fullscreen = Self::requires_auto_fullscreen(&video)?;
        let has_autoplay = video.element().has_attribute(AUTOPLAY_ATTR);

        let entry = Arc::new_cyclic(|weak: &Weak<VideoEntry>| VideoEntry {
            percentage_tracker: Arc::new(AnalyticsPercentageTracker::new(
                video.clone(),
                weak.clone(),
            )),
            video,
            services,
            manager: Arc::downgrade(manager),
            flags: Mutex::new(EntryFlags::default()),
            has_autoplay,
            wants_auto_fullscreen,
            action_session: VideoSessionManager::new(),
            visibility_session: VideoSessionManager::new(),
            metadata: Mutex::new(MediaMetadata::default()),
            first_play_fired: AtomicBool::new(false),
            autoplay_installed: AtomicBool::new(false),
            autoplay_torn_down: AtomicBool::new(false),
            overlay_task: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        entry.wire_sessions();
        entry.spawn_listeners();
        Ok(entry)
    }

    fn requires_auto_fullscreen(video: &Arc<dyn VideoPlayer>) -> Result<bool> {
        let element = video.element();
        if video.preimplements_auto_fullscreen()
            || !element.has_attribute(ROTATE_TO_FULLSCREEN_ATTR)
        {
            return Ok(false);
        }
        if !video.is_interactive() {
            return Err(Error::RotateToFullscreenNotInteractive(element.id()));
        }
        Ok(true)
    }

    fn wire_sessions(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.action_session.on_session_end(move || {
            if let Some(entry) = weak.upgrade() {
                entry.analytics_event(VideoAnalyticsEvent::Session, None);
            }
        });
        let weak = Arc::downgrade(self);
        self.visibility_session.on_session_end(move || {
            if let Some(entry) = weak.upgrade() {
                entry.analytics_event(VideoAnalyticsEvent::SessionVisible, None);
            }
        });
    }

    fn spawn_listeners(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();

        let entry = self.clone();
        let mut events = self.video.events();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => entry.handle_event(event).await,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        let entry = self.clone();
        let signals = self.video.signals();
        tasks.push(tokio::spawn(async move {
            signals.wait_for(VideoSignal::Registered).await;
            entry.on_register().await;
        }));

        let entry = self.clone();
        let signals = self.video.signals();
        tasks.push(tokio::spawn(async move {
            signals.wait_for(VideoSignal::PlaybackDelegated).await;
            entry.on_playback_delegated();
        }));
    }

    async fn handle_event(self: &Arc<Self>, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Load | PlaybackEvent::Reload => self.video_loaded().await,
            PlaybackEvent::LoadedMetadata => {}
            PlaybackEvent::Play => {
                self.flags.lock().unwrap().has_seen_play_event = true;
                self.analytics_event(VideoAnalyticsEvent::Play, None);
            }
            PlaybackEvent::Playing => self.video_played(),
            PlaybackEvent::Pause => self.video_paused(),
            PlaybackEvent::Ended => {
                self.flags.lock().unwrap().is_rolling_ad = false;
                self.analytics_event(VideoAnalyticsEvent::Ended, None);
            }
            PlaybackEvent::AdStart => {
                self.flags.lock().unwrap().is_rolling_ad = true;
                self.analytics_event(VideoAnalyticsEvent::AdStart, None);
            }
            PlaybackEvent::AdEnd => {
                self.flags.lock().unwrap().is_rolling_ad = false;
                self.analytics_event(VideoAnalyticsEvent::AdEnd, None);
            }
            PlaybackEvent::Muted => {
                self.flags.lock().unwrap().muted = true;
            }
            PlaybackEvent::Unmuted => {
                self.flags.lock().unwrap().muted = false;
                // an audible video must be the only manual one
                if let Some(manager) = self.manager.upgrade() {
                    manager.pause_other_videos(self);
                }
            }
            PlaybackEvent::CustomTick { vars } => self.custom_tick(vars),
        }
    }

    /// The media finished loading (or reloaded after a source swap).
    pub(crate) async fn video_loaded(self: &Arc<Self>) {
        self.flags.lock().unwrap().loaded = true;
        self.fill_media_session_metadata();
        self.percentage_tracker.start();
        debug!(id = %self.video.element().id(), "video loaded");

        let visible = self.flags.lock().unwrap().is_visible;
        if visible {
            // the element entered the viewport before its media loaded
            self.loaded_video_visibility_changed().await;
        }
    }

    fn fill_media_session_metadata(&self) {
        let element = self.video.element();
        let mut metadata = self.video.metadata().unwrap_or_default();
        if metadata.artwork.is_empty() {
            let poster = element
                .attribute("poster")
                .and_then(|poster| Url::parse(&poster).ok())
                .or_else(|| self.services.document.fallback_poster());
            if let Some(poster) = poster {
                metadata.artwork.push(poster);
            }
        }
        if metadata.title.is_empty() {
            metadata.title = element
                .attribute("title")
                .filter(|title| !title.is_empty())
                .or_else(|| element.attribute("aria-label").filter(|l| !l.is_empty()))
                .or_else(|| self.services.document.title())
                .unwrap_or_default();
        }
        *self.metadata.lock().unwrap() = metadata;
    }

    fn video_played(self: &Arc<Self>) {
        self.flags.lock().unwrap().is_playing = true;

        if self.playing_state() == PlayingState::PlayingManual {
            self.first_play_or_noop();
            if let Some(manager) = self.manager.upgrade() {
                manager.pause_other_videos(self);
            }
        }

        let element = self.video.element();
        if !self.video.preimplements_media_session()
            && !element.has_attribute(NO_MEDIA_SESSION_ATTR)
        {
            let metadata = self.metadata.lock().unwrap().clone();
            self.services.media_session.set_metadata(&metadata);
            let play_video = self.video.clone();
            let pause_video = self.video.clone();
            self.services.media_session.set_handlers(
                Arc::new(move || play_video.play(false)),
                Arc::new(move || pause_video.pause()),
            );
        }

        self.action_session.begin_session();
        let (visible, seen_play) = {
            let flags = self.flags.lock().unwrap();
            (flags.is_visible, flags.has_seen_play_event)
        };
        if visible {
            self.visibility_session.begin_session();
        }
        if !seen_play {
            // some players only report the playing transition; synthesize
            // the discrete play event they omitted
            self.analytics_event(VideoAnalyticsEvent::Play, None);
        }
    }

    fn video_paused(self: &Arc<Self>) {
        self.analytics_event(VideoAnalyticsEvent::Pause, None);
        let autoplay_pause = {
            let mut flags = self.flags.lock().unwrap();
            flags.is_playing = false;
            // consume the flag either way
            std::mem::replace(&mut flags.pause_called_by_autoplay, false)
        };
        // an autoplay pause (video scrolled away) must not close the
        // action session a user opened
        if !autoplay_pause {
            self.action_session.end_session();
        }
    }

    fn custom_tick(self: &Arc<Self>, mut vars: Map<String, Value>) {
        let Some(Value::String(event_type)) = vars.remove(CUSTOM_TICK_EVENT_TYPE) else {
            return;
        };
        let mut prefixed = Map::new();
        prefixed.insert(
            CUSTOM_TICK_EVENT_TYPE.to_string(),
            Value::String(event_type),
        );
        for (key, value) in vars {
            prefixed.insert(format!("custom_{key}"), value);
        }
        self.analytics_event(VideoAnalyticsEvent::Custom, Some(prefixed));
    }

    async fn on_register(self: &Arc<Self>) {
        if self.wants_auto_fullscreen {
            if let Some(manager) = self.manager.upgrade() {
                manager.register_for_auto_fullscreen(self);
            }
        }
        if self.has_autoplay {
            self.autoplay_video_built().await;
        }
    }

    fn on_playback_delegated(&self) {
        let was_playing = {
            let mut flags = self.flags.lock().unwrap();
            flags.manage_playback = false;
            flags.is_playing
        };
        info!(id = %self.video.element().id(), "playback delegated");
        if was_playing {
            self.video.pause();
        }
    }

    // -------------------------------------------------------------------------
    // Visibility
    // -------------------------------------------------------------------------

    /// Called by the manager's visibility pump on threshold crossings.
    pub(crate) async fn update_visibility(self: &Arc<Self>, is_visible: bool) {
        let (changed, loaded) = {
            let mut flags = self.flags.lock().unwrap();
            if flags.is_visible == is_visible {
                (false, flags.loaded)
            } else {
                flags.is_visible = is_visible;
                (true, flags.loaded)
            }
        };
        if changed && loaded {
            self.loaded_video_visibility_changed().await;
        }
    }

    async fn loaded_video_visibility_changed(self: &Arc<Self>) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let supported = manager.autoplay_supported().await;
        // visibility may have flipped again while the probe resolved; every
        // decision below reads current state
        let can_autoplay = self.has_autoplay && !self.user_interacted();
        if can_autoplay && supported {
            self.autoplay_loaded_video_visibility_changed();
        } else {
            self.non_autoplay_loaded_video_visibility_changed();
        }
    }

    fn autoplay_loaded_video_visibility_changed(&self) {
        enum Autoplay {
            Play,
            Pause { was_playing: bool },
            Skip,
        }
        let action = {
            let mut flags = self.flags.lock().unwrap();
            if !flags.manage_playback {
                Autoplay::Skip
            } else if flags.is_visible {
                flags.play_called_by_autoplay = true;
                Autoplay::Play
            } else {
                flags.pause_called_by_autoplay = true;
                Autoplay::Pause {
                    was_playing: flags.is_playing,
                }
            }
        };
        match action {
            Autoplay::Play => {
                self.visibility_session.begin_session();
                self.video.play(true);
            }
            Autoplay::Pause { was_playing } => {
                if was_playing {
                    self.visibility_session.end_session();
                }
                self.video.pause();
            }
            Autoplay::Skip => {}
        }
    }

    fn non_autoplay_loaded_video_visibility_changed(&self) {
        let (visible, playing) = {
            let flags = self.flags.lock().unwrap();
            (flags.is_visible, flags.is_playing)
        };
        if visible {
            self.visibility_session.begin_session();
        } else if playing {
            self.visibility_session.end_session();
        }
    }

    // -------------------------------------------------------------------------
    // Autoplay machinery
    // -------------------------------------------------------------------------

    async fn autoplay_video_built(self: &Arc<Self>) {
        // keep controls hidden while the probe resolves so they don't
        // flash in and out
        self.video.hide_controls();
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        if !manager.autoplay_supported().await {
            self.video.show_controls();
            return;
        }
        // platform autoplay only admits muted media
        self.video.mute();
        self.install_autoplay_artifacts();
    }

    fn install_autoplay_artifacts(self: &Arc<Self>) {
        if self.autoplay_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.user_interacted() {
            return;
        }
        let element_id = self.video.element().id();
        let signals = self.video.signals();
        let on_tap: ActionHandler = {
            let signals = signals.clone();
            Arc::new(move || signals.signal(VideoSignal::UserInteracted))
        };
        let overlay =
            self.services
                .overlays
                .install(&element_id, self.video.is_interactive(), on_tap);
        debug!(id = %element_id, "autoplay artifacts installed");

        let wiring = {
            let overlay = overlay.clone();
            let video = self.video.clone();
            let signals = signals.clone();
            let mut events = self.video.events();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(PlaybackEvent::Playing) => overlay.set_playing(true),
                        Ok(PlaybackEvent::Pause) => overlay.set_playing(false),
                        Ok(PlaybackEvent::AdStart) => {
                            overlay.set_ad_showing(true);
                            video.show_controls();
                        }
                        Ok(PlaybackEvent::AdEnd) => {
                            overlay.set_ad_showing(false);
                            video.hide_controls();
                        }
                        Ok(PlaybackEvent::Unmuted) => {
                            signals.signal(VideoSignal::UserInteracted);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };
        *self.overlay_task.lock().unwrap() = Some(wiring);

        let entry = self.clone();
        let teardown = tokio::spawn(async move {
            entry
                .video
                .signals()
                .wait_for(VideoSignal::UserInteracted)
                .await;
            entry.dismiss_autoplay_artifacts(&overlay);
        });
        self.tasks.lock().unwrap().push(teardown);
    }

    /// One-shot, irreversible teardown of the autoplay UI.
    fn dismiss_autoplay_artifacts(&self, overlay: &Arc<dyn AutoplayOverlay>) {
        if self.autoplay_torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(id = %self.video.element().id(), "autoplay dismissed after interaction");
        self.first_play_or_noop();
        self.video.show_controls();
        self.video.unmute();
        if let Some(task) = self.overlay_task.lock().unwrap().take() {
            task.abort();
        }
        overlay.dismiss();
    }

    fn first_play_or_noop(&self) {
        if self.first_play_fired.swap(true, Ordering::SeqCst) {
            return;
        }
        self.services.actions.trigger(
            &self.video.element().id(),
            FIRST_PLAY_ACTION,
            Value::Null,
            ActionTrust::Low,
        );
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Derived playing state
    pub fn playing_state(&self) -> PlayingState {
        let autoplay_play = {
            let flags = self.flags.lock().unwrap();
            if !flags.is_playing {
                return PlayingState::Paused;
            }
            flags.play_called_by_autoplay
        };
        if autoplay_play && !self.user_interacted() {
            PlayingState::PlayingAuto
        } else {
            PlayingState::PlayingManual
        }
    }

    pub fn user_interacted(&self) -> bool {
        self.video.signals().has_fired(VideoSignal::UserInteracted)
    }

    pub fn is_muted(&self) -> bool {
        self.flags.lock().unwrap().muted
    }

    pub fn is_rolling_ad(&self) -> bool {
        self.flags.lock().unwrap().is_rolling_ad
    }

    pub fn is_playback_managed(&self) -> bool {
        self.flags.lock().unwrap().manage_playback
    }

    pub fn has_autoplay(&self) -> bool {
        self.has_autoplay
    }

    pub fn video(&self) -> &Arc<dyn VideoPlayer> {
        &self.video
    }

    /// The entry's percentage tracker; restarted on every load
    pub fn percentage_tracker(&self) -> &Arc<AnalyticsPercentageTracker> {
        &self.percentage_tracker
    }

    // -------------------------------------------------------------------------
    // Analytics
    // -------------------------------------------------------------------------

    /// Dispatch an analytics event on the element, with the state snapshot
    /// attached once it resolves.
    pub(crate) fn analytics_event(
        self: &Arc<Self>,
        kind: VideoAnalyticsEvent,
        vars: Option<Map<String, Value>>,
    ) {
        let entry = self.clone();
        tokio::spawn(async move {
            let details = entry.analytics_details().await;
            let record = AnalyticsRecord {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                event: kind.event_name().to_string(),
                vars,
                details,
            };
            let payload = serde_json::to_value(&record).unwrap_or(Value::Null);
            debug!(event = kind.event_name(), id = %record.id, "video analytics event");
            entry
                .video
                .element()
                .dispatch_event(kind.event_name(), payload);
        });
    }

    /// Snapshot of this video's analytics state
    pub async fn analytics_details(self: &Arc<Self>) -> AnalyticsDetails {
        let supported = match self.manager.upgrade() {
            Some(manager) => manager.autoplay_supported().await,
            None => false,
        };
        let element = self.video.element();
        let rect = element.layout_rect();
        let ranges = self.video.played_ranges();
        let played_total: f64 = ranges.iter().map(|(start, end)| end - start).sum();
        let state = self.playing_state();
        let muted = self.flags.lock().unwrap().muted;
        AnalyticsDetails {
            autoplay: self.has_autoplay && supported,
            current_time: self.video.current_time(),
            duration: self.video.duration(),
            height: rect.height,
            id: element.id(),
            muted,
            played_total,
            played_ranges_json: serde_json::to_string(&ranges).unwrap_or_else(|_| "[]".into()),
            state: state.to_string(),
            width: rect.width,
        }
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Stop the percentage tracker and detach every listener task.
    pub(crate) fn dispose(&self) {
        self.percentage_tracker.stop();
        let mut tasks = self.tasks.lock().unwrap();
        while let Some(task) = tasks.pop() {
            task.abort();
        }
        if let Some(task) = self.overlay_task.lock().unwrap().take() {
            task.abort();
        }
    }
}
