//! One-shot lifecycle signal bus
//!
//! Every video carries a signal bus latching the lifecycle signals of
//! [`VideoSignal`]. A signal fires at most once; late subscribers resolve
//! immediately. The first `user-interacted` firing is what permanently
//! dismantles a video's autoplay machinery, so the latch is load-bearing.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::types::VideoSignal;

#[derive(Default)]
struct Slot {
    fired_at: Option<DateTime<Utc>>,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Per-video signal bus
#[derive(Default)]
pub struct Signals {
    slots: Mutex<HashMap<VideoSignal, Slot>>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire a signal. Firing twice is a no-op; the first timestamp wins.
    pub fn signal(&self, signal: VideoSignal) {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entry(signal).or_default();
        if slot.fired_at.is_some() {
            return;
        }
        slot.fired_at = Some(Utc::now());
        for waiter in slot.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// When the signal fired, if it has
    pub fn get(&self, signal: VideoSignal) -> Option<DateTime<Utc>> {
        self.slots
            .lock()
            .unwrap()
            .get(&signal)
            .and_then(|slot| slot.fired_at)
    }

    pub fn has_fired(&self, signal: VideoSignal) -> bool {
        self.get(signal).is_some()
    }

    /// Resolve once the signal fires; resolves immediately when it already
    /// has.
    pub async fn wait_for(&self, signal: VideoSignal) {
        let receiver = {
            let mut slots = self.slots.lock().unwrap();
            let slot = slots.entry(signal).or_default();
            if slot.fired_at.is_some() {
                return;
            }
            let (tx, rx) = oneshot::channel();
            slot.waiters.push(tx);
            rx
        };
        let _ = receiver.await;
    }
}
