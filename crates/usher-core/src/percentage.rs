//! Percentage-played analytics milestones
//!
//! Emits `percentage-played` events in steps of
//! [`PERCENTAGE_INTERVAL`] at a cadence adapted to the media duration, with
//! a forced final 100 when playback ends. A generation counter invalidates
//! loops scheduled before a `stop`, so stale wakeups die silently instead
//! of emitting against a restarted tracker.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::entry::VideoEntry;
use crate::player::VideoPlayer;
use crate::types::{
    PlaybackEvent, PlayingState, VideoAnalyticsEvent, PERCENTAGE_FREQUENCY_MAX_MS,
    PERCENTAGE_FREQUENCY_MIN_MS, PERCENTAGE_FREQUENCY_WHEN_PAUSED, PERCENTAGE_INTERVAL,
};

/// Per-video percentage milestone watcher
pub struct AnalyticsPercentageTracker {
    video: Arc<dyn VideoPlayer>,
    entry: Weak<VideoEntry>,
    /// Last normalized percentage emitted; 0 means none yet
    last: AtomicU32,
    /// Epoch counter; loops carry the epoch they were started under
    generation: AtomicU64,
    /// Listener tasks; `None` until the first `start`
    tasks: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl AnalyticsPercentageTracker {
    pub(crate) fn new(video: Arc<dyn VideoPlayer>, entry: Weak<VideoEntry>) -> Self {
        Self {
            video,
            entry,
            last: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            tasks: Mutex::new(None),
        }
    }

    /// Begin watching. Idempotent: restarts cleanly when already running.
    ///
    /// Durations of one second or less are treated as unknown until a
    /// `LoadedMetadata` event corrects them; some players report a
    /// one-second placeholder for live streams.
    pub fn start(self: &Arc<Self>) {
        self.stop();

        let generation = self.generation.load(Ordering::SeqCst);
        let mut tasks = self.tasks.lock().unwrap();
        let list = tasks.get_or_insert_with(Vec::new);

        if self.has_duration() {
            let tracker = self.clone();
            list.push(tokio::spawn(tracker.calculate(generation)));
        } else {
            let tracker = self.clone();
            let mut events = self.video.events();
            list.push(tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(PlaybackEvent::LoadedMetadata) => {
                            if tracker.has_duration() {
                                tokio::spawn(tracker.clone().calculate(generation));
                            }
                            break;
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            }));
        }

        // the last interval is often shorter than the cadence; force the
        // final milestone when playback actually ends
        let tracker = self.clone();
        let mut events = self.video.events();
        list.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PlaybackEvent::Ended) => {
                        if tracker.has_duration() {
                            tracker.maybe_trigger(100);
                        }
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Stop watching and invalidate every loop started so far. No-op
    /// before the first `start`; safe to call repeatedly.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(list) = tasks.as_mut() else {
            return;
        };
        while let Some(task) = list.pop() {
            task.abort();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(id = %self.video.element().id(), "percentage tracker stopped");
    }

    fn has_duration(&self) -> bool {
        let duration = self.video.duration();
        duration.is_finite() && duration > 1.0
    }

    async fn calculate(self: Arc<Self>, generation: u64) {
        loop {
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let Some(entry) = self.entry.upgrade() else {
                return;
            };
            if entry.playing_state() == PlayingState::Paused {
                tokio::time::sleep(PERCENTAGE_FREQUENCY_WHEN_PAUSED).await;
                continue;
            }
            let duration = self.video.duration();
            self.maybe_trigger(normalized_percentage(self.video.current_time(), duration));
            tokio::time::sleep(percentage_frequency(duration)).await;
        }
    }

    fn maybe_trigger(&self, percentage: u32) {
        if percentage == 0 {
            return;
        }
        if self.last.swap(percentage, Ordering::SeqCst) == percentage {
            return;
        }
        if let Some(entry) = self.entry.upgrade() {
            let mut vars = Map::new();
            vars.insert(
                "normalizedPercentage".to_string(),
                Value::String(percentage.to_string()),
            );
            entry.analytics_event(VideoAnalyticsEvent::PercentagePlayed, Some(vars));
        }
    }
}

/// Cadence that would ideally fire `100 / PERCENTAGE_INTERVAL` times
/// across the media duration, clamped to sane bounds
pub(crate) fn percentage_frequency(duration_secs: f64) -> Duration {
    let ideal_ms = duration_secs * 10.0 * f64::from(PERCENTAGE_INTERVAL);
    Duration::from_millis(ideal_ms.clamp(
        PERCENTAGE_FREQUENCY_MIN_MS as f64,
        PERCENTAGE_FREQUENCY_MAX_MS as f64,
    ) as u64)
}

/// Snap a playback position to the nearest milestone step
pub(crate) fn normalized_percentage(current_time: f64, duration: f64) -> u32 {
    let interval = f64::from(PERCENTAGE_INTERVAL);
    let raw = (current_time / duration * 100.0).clamp(0.0, 100.0);
    ((raw / interval).round() * interval) as u32
}
