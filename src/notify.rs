//! User-facing notifications, delivered over a channel to whatever presents
//! them (toasts, a status line, stderr).

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

/// A message for the user, shown for `duration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
    pub duration: Duration,
}

/// Sending half. Every notification is also logged.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
    duration: Duration,
    error_duration: Duration,
}

/// Receiving half, owned by the presentation layer.
pub struct Notifications {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl Notifier {
    /// Create a connected sender/receiver pair.
    pub fn channel(duration: Duration, error_duration: Duration) -> (Notifier, Notifications) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Notifier {
                tx,
                duration,
                error_duration,
            },
            Notifications { rx },
        )
    }

    pub fn notify(&self, message: impl Into<String>, kind: NotificationKind) {
        let message = message.into();
        match kind {
            NotificationKind::Error => error!(%message, "notify"),
            _ => info!(%message, "notify"),
        }
        let duration = match kind {
            NotificationKind::Error => self.error_duration,
            _ => self.duration,
        };
        // Nobody listening is fine; the message was logged.
        let _ = self.tx.send(Notification {
            message,
            kind,
            duration,
        });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(message, NotificationKind::Success);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(message, NotificationKind::Error);
    }
}

impl Notifications {
    /// Wait for the next notification. `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Everything queued right now, without waiting.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.rx.try_recv() {
            out.push(n);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn durations_follow_kind() {
        let (notifier, mut rx) =
            Notifier::channel(Duration::from_millis(3000), Duration::from_millis(5000));
        notifier.success("Folder created successfully");
        notifier.error("Failed to create folder: boom");

        let ok = rx.next().await.unwrap();
        assert_eq!(ok.kind, NotificationKind::Success);
        assert_eq!(ok.duration, Duration::from_millis(3000));
        let err = rx.next().await.unwrap();
        assert_eq!(err.kind, NotificationKind::Error);
        assert_eq!(err.duration, Duration::from_millis(5000));
    }

    #[test]
    fn drain_collects_pending() {
        let (notifier, mut rx) = Notifier::channel(Duration::ZERO, Duration::ZERO);
        notifier.notify("a", NotificationKind::Info);
        notifier.notify("b", NotificationKind::Info);
        let messages: Vec<String> = rx.drain().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["a", "b"]);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn send_without_receiver_does_not_panic() {
        let (notifier, rx) = Notifier::channel(Duration::ZERO, Duration::ZERO);
        drop(rx);
        notifier.error("lost");
    }
}
