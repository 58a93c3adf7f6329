//! # Notification Boundary
//!
//! Fire-and-forget announcements after terminal transitions. A failed
//! notification is logged and never rolls back the transition it reports.

use async_trait::async_trait;
use homestay_core::NotificationEvent;
use tracing::info;

use crate::error::NotifyError;

/// Receives booking lifecycle events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, booking_id: &str, event: NotificationEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log. Default when no delivery channel is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, booking_id: &str, event: NotificationEvent) -> Result<(), NotifyError> {
        info!(booking_id = %booking_id, event = %event, "Booking notification");
        Ok(())
    }
}

/// Keeps every event in memory; can be told to fail.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: tokio::sync::Mutex<Vec<(String, NotificationEvent)>>,
    failing: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following call fails (the event is still recorded).
    pub fn fail_all(&self) {
        self.failing.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<(String, NotificationEvent)> {
        self.events.lock().await.clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, booking_id: &str, event: NotificationEvent) -> Result<(), NotifyError> {
        self.events.lock().await.push((booking_id.to_string(), event));
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError("notification channel down".into()));
        }
        Ok(())
    }
}
