//! Notifications published to in-process subscribers.

use tokio::sync::broadcast;
use tracing::debug;

use focalpoint_core::{PushResult, ViewId};

const CHANNEL_CAPACITY: usize = 256;

/// Something the peer told us that subscribers may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// New views were announced.
    InvView { view_ids: Vec<ViewId> },
    /// Outcome of a pushed consideration.
    PushConsiderationResult(PushResult),
    /// History of `public_key` was refreshed in the store.
    PublicKeyConsiderations { public_key: String },
}

/// Kinds of notification a subscriber can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationCategory {
    InvView,
    PushConsiderationResult,
    PublicKeyConsiderations,
}

impl Notification {
    pub fn category(&self) -> NotificationCategory {
        match self {
            Self::InvView { .. } => NotificationCategory::InvView,
            Self::PushConsiderationResult(_) => NotificationCategory::PushConsiderationResult,
            Self::PublicKeyConsiderations { .. } => NotificationCategory::PublicKeyConsiderations,
        }
    }
}

/// Fan-out of notifications to any number of subscribers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish to current subscribers; having none is not an error.
    pub fn publish(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            debug!("No subscribers for notification");
        }
    }

    /// Receive every notification.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            categories: None,
        }
    }

    /// Receive only notifications in `categories`.
    pub fn subscribe_to(&self, categories: &[NotificationCategory]) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            categories: Some(categories.to_vec()),
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's end of the notifier. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Notification>,
    categories: Option<Vec<NotificationCategory>>,
}

impl Subscription {
    /// Next matching notification, or `None` once the client is gone.
    /// A subscriber that falls behind skips what it missed.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(notification) if self.matches(&notification) => return Some(notification),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Subscriber lagged, skipped {} notifications", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn matches(&self, notification: &Notification) -> bool {
        self.categories
            .as_ref()
            .map_or(true, |categories| categories.contains(&notification.category()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_and_filtering() {
        let notifier = Notifier::new();
        let mut all = notifier.subscribe();
        let mut pushes = notifier.subscribe_to(&[NotificationCategory::PushConsiderationResult]);

        notifier.publish(Notification::InvView {
            view_ids: vec!["aa".to_string()],
        });
        notifier.publish(Notification::PushConsiderationResult(PushResult {
            consideration_id: "ab".to_string(),
            error: None,
        }));

        assert_eq!(all.recv().await.unwrap().category(), NotificationCategory::InvView);
        assert_eq!(
            all.recv().await.unwrap().category(),
            NotificationCategory::PushConsiderationResult
        );
        let Some(Notification::PushConsiderationResult(result)) = pushes.recv().await else {
            panic!("expected push result");
        };
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn closed_notifier_ends_subscription() {
        let notifier = Notifier::new();
        let mut sub = notifier.subscribe();
        drop(notifier);
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn publishing_without_subscribers() {
        Notifier::new().publish(Notification::PublicKeyConsiderations {
            public_key: "k=".to_string(),
        });
    }
}
