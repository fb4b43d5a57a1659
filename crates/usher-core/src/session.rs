//! Playback session bookkeeping
//!
//! A session spans one stretch of playback for analytics purposes. Each
//! video entry runs two of these: one driven by play/pause actions, one
//! driven by viewport visibility.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Callback fired when a session ends
pub type SessionEndCallback = Box<dyn Fn() + Send + Sync>;

/// Tracks a single begin/end playback session
///
/// `end_session` fires the registered callback exactly once per begin/end
/// pair; redundant ends are no-ops.
#[derive(Default)]
pub struct VideoSessionManager {
    session_active: AtomicBool,
    on_end: Mutex<Option<SessionEndCallback>>,
}

impl VideoSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the single end-of-session callback, replacing any previous
    /// one.
    pub fn on_session_end(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_end.lock().unwrap() = Some(Box::new(callback));
    }

    /// Mark a session as active. Safe to call while already active.
    pub fn begin_session(&self) {
        self.session_active.store(true, Ordering::SeqCst);
    }

    /// End the active session, firing the callback. No-op when no session
    /// is active.
    pub fn end_session(&self) {
        if self.session_active.swap(false, Ordering::SeqCst) {
            if let Some(callback) = self.on_end.lock().unwrap().as_ref() {
                callback();
            }
        }
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }
}
