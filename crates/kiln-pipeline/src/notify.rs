//! Out-of-band error notifications.

use std::sync::Mutex;

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Short title, e.g. "Error: Styles"
    pub title: String,

    /// Body text
    pub message: String,
}

impl Notification {
    /// Notification for a failed file: "Path: <path> at line <line>".
    pub fn file_error(label: &str, relative_path: &str, line: Option<usize>) -> Self {
        let line = line
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            title: format!("Error: {}", label),
            message: format!("Path: {} at line {}", relative_path, line),
        }
    }
}

/// Channel for notifications, separate from build results.
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Delivery failures are logged, never returned.
    fn notify(&self, notification: &Notification);
}

/// Desktop notifications through the platform notification service.
#[derive(Debug, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, notification: &Notification) {
        let notification = notification.clone();

        // Showing a notification waits on the session bus
        off_loop(move || {
            let shown = notify_rust::Notification::new()
                .appname("kiln")
                .summary(&notification.title)
                .body(&notification.message)
                .show();

            if let Err(e) = shown {
                tracing::warn!("Desktop notification unavailable: {}", e);
                LogNotifier.notify(&notification);
            }
        });
    }
}

/// Run `work` on the runtime's blocking pool, or inline outside a runtime.
fn off_loop<F>(work: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(work);
        }
        Err(_) => work(),
    }
}

/// Notifications written to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        tracing::error!("{}: {}", notification.title, notification.message);
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Notifications received so far.
    pub fn received(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        if let Ok(mut received) = self.received.lock() {
            received.push(notification.clone());
        }
    }
}
