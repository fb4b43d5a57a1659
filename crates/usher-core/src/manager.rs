//! Top-level video registry
//!
//! One [`VideoManager`] per document context, constructed with the
//! environment [`Services`] it is allowed to see. It owns every
//! [`VideoEntry`], pumps viewport visibility into them, runs the
//! seconds-played ticker, and enforces the exclusivity policy: at most one
//! manually-playing video at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::entry::VideoEntry;
use crate::error::{Error, Result};
use crate::fullscreen::AutoFullscreenManager;
use crate::player::VideoPlayer;
use crate::services::{ActionHandler, Services, VisibilityChange};
use crate::types::{
    ActionTrust, PlayingState, VideoAnalyticsEvent, VideoSignal, SECONDS_PLAYED_MIN_DELAY,
};

/// Custom event dispatched on an element when its video is accepted
pub const REGISTERED_EVENT: &str = "registered";

/// Marker class tagging elements under playback management
pub const VIDEO_INTERFACE_CLASS: &str = "managed-video";

/// Action event carrying `{time, percent}` once per ticker cadence
const TIME_UPDATE_ACTION: &str = "timeUpdate";

/// Registry and coordinator for every video in a document context
pub struct VideoManager {
    services: Services,
    /// Append-only; insertion order is registration order
    entries: RwLock<Vec<Arc<VideoEntry>>>,
    /// Single-slot identity cache for entry lookups
    last_found: Mutex<Option<Arc<VideoEntry>>>,
    visibility_tx: mpsc::UnboundedSender<VisibilityChange>,
    observer_installed: AtomicBool,
    autoplay_supported: OnceCell<bool>,
    auto_fullscreen: OnceLock<Arc<AutoFullscreenManager>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl VideoManager {
    /// Construct a manager over the given environment and start its
    /// background workers.
    pub fn new(services: Services) -> Arc<Self> {
        let (visibility_tx, visibility_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            services,
            entries: RwLock::new(Vec::new()),
            last_found: Mutex::new(None),
            visibility_tx,
            observer_installed: AtomicBool::new(false),
            autoplay_supported: OnceCell::new(),
            auto_fullscreen: OnceLock::new(),
            tasks: Mutex::new(Vec::new()),
        });
        manager.spawn_workers(visibility_rx);
        manager
    }

    fn spawn_workers(self: &Arc<Self>, mut visibility_rx: mpsc::UnboundedReceiver<VisibilityChange>) {
        let mut tasks = self.tasks.lock().unwrap();

        // visibility pump: observer threshold crossings -> owning entry
        let weak = Arc::downgrade(self);
        tasks.push(tokio::spawn(async move {
            while let Some(change) = visibility_rx.recv().await {
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if let Some(entry) = manager.entry_for_element_id(&change.element_id) {
                    entry.update_visibility(change.is_visible).await;
                }
            }
        }));

        // seconds-played ticker
        let weak = Arc::downgrade(self);
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::time::sleep(SECONDS_PLAYED_MIN_DELAY).await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.seconds_playing();
            }
        }));
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register a video for playback management.
    ///
    /// Idempotent: a second registration of the same player (or element)
    /// only re-registers the common actions. Players that cannot work on
    /// this platform still get their actions wired, but no entry.
    pub fn register(self: &Arc<Self>, video: &Arc<dyn VideoPlayer>) -> Result<()> {
        self.register_common_actions(video);

        if !video.supports_platform() {
            return Ok(());
        }
        if self.entry_for_video(video).is_some() {
            debug!(id = %video.element().id(), "video already registered");
            return Ok(());
        }

        let element = video.element();
        if !self.observer_installed.swap(true, Ordering::SeqCst) {
            debug!("shared viewport observer installed");
        }
        self.services
            .viewport
            .observe(&element.id(), self.visibility_tx.clone());

        let entry = match VideoEntry::new(self, video.clone(), self.services.clone()) {
            Ok(entry) => entry,
            Err(err) => {
                self.services.viewport.unobserve(&element.id());
                return Err(err);
            }
        };
        self.entries.write().unwrap().push(entry);

        element.dispatch_event(REGISTERED_EVENT, Value::Null);
        video.signals().signal(VideoSignal::Registered);
        element.add_class(VIDEO_INTERFACE_CLASS);
        info!(id = %element.id(), "video registered");
        Ok(())
    }

    fn register_common_actions(&self, video: &Arc<dyn VideoPlayer>) {
        self.register_user_action(video, "play", |video| video.play(false));
        self.register_user_action(video, "pause", |video| video.pause());
        self.register_user_action(video, "mute", |video| video.mute());
        self.register_user_action(video, "unmute", |video| video.unmute());
        self.register_user_action(video, "fullscreenenter", |video| video.fullscreen_enter());
        self.register_user_action(video, "fullscreen", |video| video.fullscreen_enter());
    }

    fn register_user_action(
        &self,
        video: &Arc<dyn VideoPlayer>,
        name: &str,
        operation: fn(&dyn VideoPlayer),
    ) {
        let element_id = video.element().id();
        let video = video.clone();
        let handler: ActionHandler = Arc::new(move || {
            // a declarative invocation counts as a user gesture
            video.signals().signal(VideoSignal::UserInteracted);
            operation(video.as_ref());
        });
        self.services
            .actions
            .register_action(&element_id, name, ActionTrust::Low, handler);
    }

    // -------------------------------------------------------------------------
    // Entry lookup
    // -------------------------------------------------------------------------

    fn find_entry(
        &self,
        predicate: impl Fn(&Arc<VideoEntry>) -> bool,
    ) -> Option<Arc<VideoEntry>> {
        {
            let cached = self.last_found.lock().unwrap();
            if let Some(entry) = cached.as_ref() {
                if predicate(entry) {
                    return Some(entry.clone());
                }
            }
        }
        let found = self
            .entries
            .read()
            .unwrap()
            .iter()
            .find(|entry| predicate(entry))
            .cloned();
        if let Some(entry) = &found {
            *self.last_found.lock().unwrap() = Some(entry.clone());
        }
        found
    }

    fn entry_for_video(&self, video: &Arc<dyn VideoPlayer>) -> Option<Arc<VideoEntry>> {
        self.find_entry(|entry| {
            Arc::ptr_eq(entry.video(), video)
                || Arc::ptr_eq(&entry.video().element(), &video.element())
                || entry.video().element().id() == video.element().id()
        })
    }

    /// Entry lookup by the element's DOM id
    pub fn entry_for_element_id(&self, element_id: &str) -> Option<Arc<VideoEntry>> {
        self.find_entry(|entry| entry.video().element().id() == element_id)
    }

    fn require_entry(&self, video: &Arc<dyn VideoPlayer>) -> Result<Arc<VideoEntry>> {
        self.entry_for_video(video)
            .ok_or_else(|| Error::VideoNotRegistered(video.element().id()))
    }

    // -------------------------------------------------------------------------
    // State queries
    // -------------------------------------------------------------------------

    /// Derived playing state; fails for unregistered videos.
    pub fn playing_state(&self, video: &Arc<dyn VideoPlayer>) -> Result<PlayingState> {
        Ok(self.require_entry(video)?.playing_state())
    }

    pub fn is_muted(&self, video: &Arc<dyn VideoPlayer>) -> Result<bool> {
        Ok(self.require_entry(video)?.is_muted())
    }

    pub fn user_interacted(&self, video: &Arc<dyn VideoPlayer>) -> Result<bool> {
        Ok(self.require_entry(video)?.user_interacted())
    }

    pub fn is_rolling_ad(&self, video: &Arc<dyn VideoPlayer>) -> Result<bool> {
        Ok(self.require_entry(video)?.is_rolling_ad())
    }

    /// One field of a video's analytics snapshot, by DOM id and camelCase
    /// field name. Empty when the entry or the field is missing.
    pub async fn video_state_property(&self, element_id: &str, property: &str) -> String {
        let Some(entry) = self.entry_for_element_id(element_id) else {
            return String::new();
        };
        let details = entry.analytics_details().await;
        match serde_json::to_value(&details)
            .ok()
            .and_then(|value| value.get(property).cloned())
        {
            Some(Value::String(text)) => text,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Exclusivity policy
    // -------------------------------------------------------------------------

    /// Pause every other managed entry that is playing manually. Autoplay
    /// entries keep playing; they are muted by construction.
    pub(crate) fn pause_other_videos(&self, playing_entry: &Arc<VideoEntry>) {
        let entries: Vec<_> = self.entries.read().unwrap().iter().cloned().collect();
        for entry in entries {
            if Arc::ptr_eq(&entry, playing_entry) {
                continue;
            }
            if entry.is_playback_managed() && entry.playing_state() == PlayingState::PlayingManual
            {
                debug!(id = %entry.video().element().id(), "pausing for exclusivity");
                entry.video().pause();
            }
        }
    }

    // -------------------------------------------------------------------------
    // Seconds ticker
    // -------------------------------------------------------------------------

    fn seconds_playing(self: &Arc<Self>) {
        let entries: Vec<_> = self.entries.read().unwrap().iter().cloned().collect();
        for entry in entries {
            if entry.playing_state() == PlayingState::Paused {
                continue;
            }
            let current_time = entry.video().current_time();
            let duration = entry.video().duration();
            if !current_time.is_finite() || !duration.is_finite() || duration <= 0.0 {
                continue;
            }
            entry.analytics_event(VideoAnalyticsEvent::SecondsPlayed, None);
            let detail = serde_json::json!({
                "time": current_time,
                "percent": current_time / duration,
            });
            self.services.actions.trigger(
                &entry.video().element().id(),
                TIME_UPDATE_ACTION,
                detail,
                ActionTrust::Low,
            );
        }
    }

    // -------------------------------------------------------------------------
    // Environment
    // -------------------------------------------------------------------------

    /// Cached platform autoplay support; probed once per manager.
    pub(crate) async fn autoplay_supported(&self) -> bool {
        *self
            .autoplay_supported
            .get_or_init(|| async { self.services.autoplay.is_autoplay_supported().await })
            .await
    }

    /// Hand an entry to the auto-fullscreen coordinator, constructing it
    /// on first use.
    pub(crate) fn register_for_auto_fullscreen(self: &Arc<Self>, entry: &Arc<VideoEntry>) {
        let manager = self
            .auto_fullscreen
            .get_or_init(|| AutoFullscreenManager::new(self.services.clone(), Arc::downgrade(self)));
        manager.register(entry);
    }

    /// The auto-fullscreen coordinator, if any video required one
    pub fn auto_fullscreen(&self) -> Option<&Arc<AutoFullscreenManager>> {
        self.auto_fullscreen.get()
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Tear down the coordinator: auto-fullscreen listeners, the viewport
    /// observer, worker tasks, and every entry's listeners.
    pub fn dispose(&self) {
        if let Some(auto_fullscreen) = self.auto_fullscreen.get() {
            auto_fullscreen.dispose();
        }
        self.services.viewport.disconnect();
        {
            let mut tasks = self.tasks.lock().unwrap();
            while let Some(task) = tasks.pop() {
                task.abort();
            }
        }
        for entry in self.entries.read().unwrap().iter() {
            entry.dispose();
        }
        info!("video manager disposed");
    }
}
