//! Routing of inbound frames into the store and the notifier.

use std::sync::Arc;

use tracing::debug;

use focalpoint_core::{Inbound, Request, Store};

use crate::notify::{Notification, Notifier};

/// Applies inbound messages to the shared state.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<Store>,
    notifier: Notifier,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Handle one text frame. Returns a request to send in reply, if the
    /// message calls for one. Frames that fail to decode are dropped.
    pub fn handle_text(&self, text: &str) -> Option<Request> {
        match Inbound::from_json(text) {
            Ok(message) => self.handle(message),
            Err(e) => {
                debug!("Dropping inbound frame: {}", e);
                None
            }
        }
    }

    /// Handle one decoded message.
    pub fn handle(&self, message: Inbound) -> Option<Request> {
        debug!("Received {}", message.kind());
        match message {
            Inbound::InvView { view_ids } => {
                self.notifier.publish(Notification::InvView { view_ids });
                return Some(Request::GetTipHeader {});
            }
            Inbound::TipHeader(tip) => self.store.set_tip(tip),
            Inbound::Profile(profile) => self.store.set_profile(profile),
            Inbound::Graph { public_key, graph } => self.store.set_graph(public_key, graph),
            Inbound::View(view) => self.store.set_current_view(view),
            Inbound::Consideration {
                consideration_id,
                consideration,
            } => self.store.set_consideration(consideration_id, consideration),
            Inbound::PushConsiderationResult(result) => {
                if let Some(error) = result.error.as_deref().filter(|e| !e.is_empty()) {
                    debug!("Peer rejected {}: {}", result.consideration_id, error);
                }
                self.notifier.publish(Notification::PushConsiderationResult(result));
            }
            Inbound::PublicKeyConsiderations {
                public_key,
                considerations,
            } => {
                self.store
                    .set_considerations_for(public_key.clone(), considerations);
                self.notifier
                    .publish(Notification::PublicKeyConsiderations { public_key });
            }
            Inbound::FilterConsiderationQueue { considerations } => {
                self.store.set_pending(considerations)
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationCategory;
    use serde_json::json;

    fn dispatcher() -> (Dispatcher, Arc<Store>, Notifier) {
        let store = Arc::new(Store::in_memory());
        let notifier = Notifier::new();
        (Dispatcher::new(store.clone(), notifier.clone()), store, notifier)
    }

    fn header(height: u64) -> serde_json::Value {
        json!({
            "previous": "00",
            "hash_list_root": "11",
            "time": 1700000000,
            "target": "ff",
            "point_work": "01",
            "nonce": 3,
            "height": height,
            "consideration_count": 0
        })
    }

    #[tokio::test]
    async fn inv_view_broadcasts_and_asks_for_tip() {
        let (dispatcher, _, notifier) = dispatcher();
        let mut sub = notifier.subscribe();

        let reply = dispatcher.handle_text(r#"{"type":"inv_view","body":{"view_ids":["aa","bb"]}}"#);
        assert_eq!(reply, Some(Request::GetTipHeader {}));
        assert_eq!(
            sub.recv().await,
            Some(Notification::InvView {
                view_ids: vec!["aa".to_string(), "bb".to_string()]
            })
        );
    }

    #[test]
    fn cache_writes() {
        let (dispatcher, store, _) = dispatcher();

        let tip = json!({"type": "tip_header", "body": {"view_id": "cc", "header": header(7)}});
        assert_eq!(dispatcher.handle_text(&tip.to_string()), None);
        assert_eq!(store.tip_height(), Some(7));

        let view = json!({"type": "view", "body": {"view": {"header": header(0)}}});
        dispatcher.handle_text(&view.to_string());
        assert!(store.genesis_view().is_some());
        assert!(store.current_view().is_some());

        let graph = json!({"type": "graph", "body": {"public_key": "k=", "graph": "digraph{}"}});
        dispatcher.handle_text(&graph.to_string());
        assert_eq!(store.graph("k=").as_deref(), Some("digraph{}"));

        let profile = json!({"type": "profile", "body": {"public_key": "k=", "ranking": 0.5, "imbalance": 2}});
        dispatcher.handle_text(&profile.to_string());
        assert_eq!(store.profile("k=").unwrap().imbalance, 2);

        let record = json!({
            "type": "consideration",
            "body": {"consideration_id": "ab", "consideration": {"time": 1, "for": "k="}}
        });
        dispatcher.handle_text(&record.to_string());
        assert_eq!(store.consideration("ab").unwrap().recipient, "k=");

        let queue = json!({
            "type": "filter_consideration_queue",
            "body": {"considerations": [{"time": 2, "for": "k="}]}
        });
        dispatcher.handle_text(&queue.to_string());
        assert_eq!(store.pending().len(), 1);
    }

    #[test]
    fn pending_queue_is_replaced() {
        let (dispatcher, store, _) = dispatcher();
        let queue = |considerations: serde_json::Value| {
            json!({"type": "filter_consideration_queue", "body": {"considerations": considerations}})
                .to_string()
        };

        dispatcher.handle_text(&queue(json!([{"time": 1, "for": "a="}, {"time": 2, "for": "b="}])));
        assert_eq!(store.pending().len(), 2);

        dispatcher.handle_text(&queue(json!([{"time": 3, "for": "c="}])));
        let pending = store.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recipient, "c=");

        dispatcher.handle_text(&queue(json!(null)));
        assert!(store.pending().is_empty());
    }

    #[tokio::test]
    async fn history_is_cached_then_announced() {
        let (dispatcher, store, notifier) = dispatcher();
        let mut sub = notifier.subscribe_to(&[NotificationCategory::PublicKeyConsiderations]);

        let history = json!({
            "type": "public_key_considerations",
            "body": {
                "public_key": "k=",
                "filter_views": [{"considerations": [{"time": 1, "for": "k="}]}, {"considerations": [{"time": 2, "for": "x="}]}]
            }
        });
        dispatcher.handle_text(&history.to_string());

        assert_eq!(
            sub.recv().await,
            Some(Notification::PublicKeyConsiderations {
                public_key: "k=".to_string()
            })
        );
        assert_eq!(store.considerations_for("k=").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn push_result_is_broadcast() {
        let (dispatcher, _, notifier) = dispatcher();
        let mut sub = notifier.subscribe();
        dispatcher.handle_text(
            r#"{"type":"push_consideration_result","body":{"consideration_id":"ab","error":"insufficient balance"}}"#,
        );
        let Some(Notification::PushConsiderationResult(result)) = sub.recv().await else {
            panic!("expected push result");
        };
        assert!(!result.is_success());
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let (dispatcher, store, _) = dispatcher();
        assert_eq!(dispatcher.handle_text("{"), None);
        assert_eq!(dispatcher.handle_text(r#"{"type":"peer_addresses","body":{"addresses":[]}}"#), None);
        assert_eq!(dispatcher.handle_text(r#"{"type":"tip_header","body":{"view_id":1}}"#), None);
        assert_eq!(store.tip(), None);
    }
}
