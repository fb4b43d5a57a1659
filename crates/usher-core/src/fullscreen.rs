//! Rotate-to-fullscreen coordination
//!
//! Tracks every fullscreen-eligible video, keeps a "best centered"
//! candidate up to date while the device is in portrait, and enters/exits
//! fullscreen on rotation. The candidate and the fullscreen occupant are
//! weak back-references; the embedding components own their players.

use std::cmp::Ordering as CmpOrdering;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::entry::VideoEntry;
use crate::manager::VideoManager;
use crate::player::VideoPlayer;
use crate::services::{ScrollTarget, Services};
use crate::types::{
    center_distance, Intersection, Orientation, PlaybackEvent, PlayerKind, PlayingState,
    VideoSignal, CENTERING_RATIO_TOLERANCE, MIN_VISIBILITY_RATIO_FOR_AUTOPLAY,
    ORIENTATION_SETTLE_DELAY,
};

/// Embeds known to honor fullscreen requests through their message bridge
/// even on iOS Safari
const FULLSCREEN_CAPABLE_EMBEDS: [&str; 2] = ["dailymotion", "ima-video"];

/// Cross-video rotate-to-fullscreen coordinator
pub struct AutoFullscreenManager {
    services: Services,
    manager: Weak<VideoManager>,
    /// At most one video is fullscreen at a time
    currently_in_fullscreen: Mutex<Option<Weak<dyn VideoPlayer>>>,
    /// Best centered portrait candidate, if any
    currently_centered: Mutex<Option<Weak<dyn VideoPlayer>>>,
    registered: Mutex<Vec<Weak<dyn VideoPlayer>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AutoFullscreenManager {
    pub(crate) fn new(services: Services, manager: Weak<VideoManager>) -> Arc<Self> {
        let this = Arc::new(Self {
            services,
            manager,
            currently_in_fullscreen: Mutex::new(None),
            currently_centered: Mutex::new(None),
            registered: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        });
        this.install_orientation_observer();
        this.install_fullscreen_listener();
        this
    }

    fn install_orientation_observer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let mut rotations = self.services.orientation.subscribe();
        self.tasks.lock().unwrap().push(tokio::spawn(async move {
            loop {
                match rotations.recv().await {
                    Ok(_) => {
                        let Some(this) = weak.upgrade() else {
                            break;
                        };
                        this.on_rotation().await;
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    fn install_fullscreen_listener(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let mut changes = self.services.document.fullscreen_changes();
        self.tasks.lock().unwrap().push(tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(()) => {
                        let Some(this) = weak.upgrade() else {
                            break;
                        };
                        // browser-driven exits (e.g. Escape) are honored
                        // without an explicit request from us
                        *this.currently_in_fullscreen.lock().unwrap() = None;
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Track an entry whose element asked for rotate-to-fullscreen.
    /// Players that cannot fullscreen on this platform are skipped.
    pub(crate) fn register(self: &Arc<Self>, entry: &Arc<VideoEntry>) {
        let video = entry.video().clone();
        if !self.can_fullscreen(&video) {
            debug!(id = %video.element().id(), "fullscreen unavailable, skipped");
            return;
        }
        self.registered.lock().unwrap().push(Arc::downgrade(&video));

        // manual-playback state changes move the centered candidate
        let weak = Arc::downgrade(self);
        let mut events = video.events();
        self.tasks.lock().unwrap().push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PlaybackEvent::Pause | PlaybackEvent::Playing | PlaybackEvent::Ended) => {
                        let Some(this) = weak.upgrade() else {
                            break;
                        };
                        this.select_best_centered_in_portrait().await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        let weak = Arc::downgrade(self);
        let signals = video.signals();
        self.tasks.lock().unwrap().push(tokio::spawn(async move {
            signals.wait_for(VideoSignal::UserInteracted).await;
            if let Some(this) = weak.upgrade() {
                this.select_best_centered_in_portrait().await;
            }
        }));
    }

    fn can_fullscreen(&self, video: &Arc<dyn VideoPlayer>) -> bool {
        match video.kind() {
            PlayerKind::NativeVideo => true,
            PlayerKind::Embed(name) => {
                let platform = &self.services.platform;
                if !(platform.is_ios() && platform.is_safari()) {
                    return true;
                }
                FULLSCREEN_CAPABLE_EMBEDS.contains(&name.as_str())
            }
        }
    }

    /// Re-run candidate selection. In landscape the current selection is
    /// kept as-is; selection only moves while in portrait.
    pub async fn select_best_centered_in_portrait(&self) -> Option<Arc<dyn VideoPlayer>> {
        if self.services.orientation.orientation() == Orientation::Landscape {
            return self
                .currently_centered
                .lock()
                .unwrap()
                .as_ref()
                .and_then(Weak::upgrade);
        }
        *self.currently_centered.lock().unwrap() = None;

        let manager = self.manager.upgrade()?;
        let registered: Vec<Arc<dyn VideoPlayer>> = self
            .registered
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        let candidates: Vec<Arc<dyn VideoPlayer>> = registered
            .into_iter()
            .filter(|video| {
                manager
                    .playing_state(video)
                    .map_or(false, |state| state == PlayingState::PlayingManual)
            })
            .collect();

        let mut measured: Vec<(Arc<dyn VideoPlayer>, Intersection)> = Vec::new();
        for video in candidates {
            // unloaded elements resolve to None and drop out
            if let Some(intersection) = self.services.viewport.measure(&video.element().id()).await
            {
                measured.push((video, intersection));
            }
        }

        let (_, viewport_height) = self.services.viewport.viewport_size();
        measured.sort_by(|(_, a), (_, b)| compare_candidates(a, b, viewport_height));

        let (best, intersection) = measured.into_iter().next()?;
        if intersection.ratio > MIN_VISIBILITY_RATIO_FOR_AUTOPLAY {
            debug!(id = %best.element().id(), ratio = intersection.ratio, "centered candidate");
            *self.currently_centered.lock().unwrap() = Some(Arc::downgrade(&best));
            return Some(best);
        }
        None
    }

    async fn on_rotation(&self) {
        if self.services.orientation.orientation() == Orientation::Landscape {
            let centered = self
                .currently_centered
                .lock()
                .unwrap()
                .as_ref()
                .and_then(Weak::upgrade);
            if let Some(video) = centered {
                self.enter(video).await;
            }
            return;
        }
        let occupant = self
            .currently_in_fullscreen
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade);
        if let Some(video) = occupant {
            self.exit(video).await;
        }
    }

    async fn enter(&self, video: Arc<dyn VideoPlayer>) {
        {
            let mut current = self.currently_in_fullscreen.lock().unwrap();
            let already = current
                .as_ref()
                .and_then(Weak::upgrade)
                .map_or(false, |occupant| Arc::ptr_eq(&occupant, &video));
            if already {
                // duplicate rotation notification
                return;
            }
            *current = Some(Arc::downgrade(&video));
        }
        info!(id = %video.element().id(), "entering fullscreen on rotation");

        let platform = &self.services.platform;
        if platform.is_android() && platform.is_chrome() {
            // Chrome on Android runs its own transition when asked right away
            video.fullscreen_enter();
            return;
        }
        self.scroll_into_view_if_needed(&video, ScrollTarget::Nearest)
            .await;
        video.fullscreen_enter();
    }

    async fn exit(&self, video: Arc<dyn VideoPlayer>) {
        *self.currently_in_fullscreen.lock().unwrap() = None;
        info!(id = %video.element().id(), "exiting fullscreen on rotation");
        self.scroll_into_view_if_needed(&video, ScrollTarget::Center)
            .await;
        video.fullscreen_exit();
    }

    async fn scroll_into_view_if_needed(&self, video: &Arc<dyn VideoPlayer>, target: ScrollTarget) {
        // give the rotation time to settle before measuring
        tokio::time::sleep(ORIENTATION_SETTLE_DELAY).await;
        let element_id = video.element().id();
        let fully_visible = self
            .services
            .viewport
            .measure(&element_id)
            .await
            .map_or(false, |intersection| intersection.ratio >= 1.0);
        if !fully_visible {
            self.services
                .viewport
                .scroll_into_view(&element_id, target)
                .await;
        }
    }

    /// The video currently holding fullscreen, if any
    pub fn currently_in_fullscreen(&self) -> Option<Arc<dyn VideoPlayer>> {
        self.currently_in_fullscreen
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Detach every global listener eagerly.
    pub(crate) fn dispose(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        while let Some(task) = tasks.pop() {
            task.abort();
        }
    }
}

/// Candidate ordering: intersection ratio when the difference is decisive,
/// then distance from the viewport center, then topmost.
pub(crate) fn compare_candidates(
    a: &Intersection,
    b: &Intersection,
    viewport_height: f64,
) -> CmpOrdering {
    let ratio_delta = a.ratio - b.ratio;
    if ratio_delta.abs() > CENTERING_RATIO_TOLERANCE {
        // more visible sorts first
        return b
            .ratio
            .partial_cmp(&a.ratio)
            .unwrap_or(CmpOrdering::Equal);
    }
    let center_a = center_distance(viewport_height, &a.rect);
    let center_b = center_distance(viewport_height, &b.rect);
    if center_a != center_b {
        return center_a
            .partial_cmp(&center_b)
            .unwrap_or(CmpOrdering::Equal);
    }
    a.rect
        .top
        .partial_cmp(&b.rect.top)
        .unwrap_or(CmpOrdering::Equal)
}
