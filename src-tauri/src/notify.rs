//! User-facing notifications
//!
//! Fire-and-forget success/failure messages. The desktop app turns them into
//! toasts; headless hosts subscribe through `BroadcastNotifier`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Failure,
}

/// A message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Failure,
            message: message.into(),
        }
    }
}

/// Receives user notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    fn notify_success(&self, message: &str) {
        self.notify(Notification::success(message));
    }

    fn notify_failure(&self, message: &str) {
        self.notify(Notification::failure(message));
    }
}

/// Fans notifications out to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(32)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        // Nobody listening is fine
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.notify_success("Webcam enabled");
        notifier.notify_failure("Failed to access webcam");

        assert_eq!(rx.recv().await.unwrap(), Notification::success("Webcam enabled"));
        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::failure("Failed to access webcam")
        );
    }

    #[test]
    fn test_broadcast_without_subscribers_does_not_panic() {
        BroadcastNotifier::default().notify_success("Answer saved!");
    }
}
