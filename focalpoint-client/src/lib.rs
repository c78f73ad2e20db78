//! focalpoint client - keeps one websocket open to a selected peer node
//! and caches what the peer sends.
//!
//! # Example
//!
//! ```no_run
//! use focalpoint_client::{ClientConfig, FocalClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FocalClient::new(ClientConfig::from_env());
//!     client.select_peer("node.example:8831").await?;
//!
//!     let mut notifications = client.subscribe();
//!     while let Some(notification) = notifications.recv().await {
//!         println!("{:?}, tip {:?}", notification, client.store().tip_height());
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod dispatch;
mod notify;
mod session;
mod state_machine;

pub use config::ClientConfig;
pub use connection::{connect, PeerStream};
pub use dispatch::Dispatcher;
pub use notify::{Notification, NotificationCategory, Notifier, Subscription};
pub use state_machine::ConnectionStateMachine;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use focalpoint_core::persist::FilePersistence;
use focalpoint_core::{
    derive_public_keys, sign_consideration, ConnectionState, ConsiderationDraft, ConsiderationId,
    FocalError, FocalResult, Request, Store,
};

use session::SessionContext;

struct Session {
    peer: String,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Handle to the focalpoint client.
///
/// Requests are fire-and-forget: responses land in the [`Store`] and, for
/// some message types, on the notification bus. Every request method
/// returns `false` without sending anything unless the connection is open.
pub struct FocalClient {
    config: ClientConfig,
    store: Arc<Store>,
    notifier: Notifier,
    state: Arc<Mutex<ConnectionStateMachine>>,
    commands: mpsc::UnboundedSender<Request>,
    command_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Request>>>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl FocalClient {
    /// Create a client whose state persists under `config.data_dir`, or in
    /// memory when none is set. Nothing connects until a peer is selected.
    pub fn new(config: ClientConfig) -> Self {
        let store = match &config.data_dir {
            Some(dir) => Store::open(Arc::new(FilePersistence::new(dir))),
            None => Store::in_memory(),
        };
        Self::with_store(config, Arc::new(store))
    }

    /// Create a client around an existing store.
    pub fn with_store(config: ClientConfig, store: Arc<Store>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        Self {
            config,
            store,
            notifier: Notifier::new(),
            state: Arc::new(Mutex::new(ConnectionStateMachine::new())),
            commands,
            command_rx: Arc::new(tokio::sync::Mutex::new(command_rx)),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Connect to the configured peer, or else the last selected one.
    /// Returns the peer chosen, if any.
    pub async fn start(&self) -> FocalResult<Option<String>> {
        let peer = self.config.peer.clone().or_else(|| self.store.selected_node());
        match peer {
            Some(peer) if !peer.is_empty() => {
                self.select_peer(peer.clone()).await?;
                Ok(Some(peer))
            }
            _ => Ok(None),
        }
    }

    /// Make `peer` (`host:port`) the selected node and keep a connection
    /// to it open. Replaces any previous selection.
    pub async fn select_peer(&self, peer: impl Into<String>) -> FocalResult<()> {
        let peer = peer.into();
        if peer.trim().is_empty() {
            return Err(FocalError::Precondition("empty peer address".to_string()));
        }

        let mut session = self.session.lock().await;
        if let Some(current) = session.take() {
            stop(current).await;
        }

        info!("Selected peer {}", peer);
        self.store.set_selected_node(Some(peer.clone()));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let ctx = SessionContext {
            peer: peer.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            dispatcher: Dispatcher::new(self.store.clone(), self.notifier.clone()),
            commands: self.command_rx.clone(),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(session::run(ctx));
        *session = Some(Session {
            peer,
            shutdown,
            handle,
        });
        Ok(())
    }

    /// Close the connection and forget the selected peer.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(current) = session.take() {
            stop(current).await;
        }
        self.store.set_selected_node(None);
    }

    /// The peer currently selected, if any.
    pub async fn peer(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.peer.clone())
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().state()
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.lock().subscribe()
    }

    pub fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }

    pub fn subscribe_to(&self, categories: &[NotificationCategory]) -> Subscription {
        self.notifier.subscribe_to(categories)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn send(&self, request: Request) -> bool {
        if !self.state().is_open() {
            debug!("Not connected, dropping {}", request.kind());
            return false;
        }
        self.commands.send(request).is_ok()
    }

    // Requests

    pub fn request_peers(&self) -> bool {
        self.send(Request::GetPeerAddresses {})
    }

    pub fn request_view_by_id(&self, view_id: &str) -> bool {
        self.send(Request::GetView {
            view_id: view_id.to_string(),
        })
    }

    pub fn request_view_by_height(&self, height: u64) -> bool {
        self.send(Request::GetViewByHeight { height })
    }

    pub fn request_tip_header(&self) -> bool {
        self.send(Request::GetTipHeader {})
    }

    pub fn request_profile(&self, public_key: &str) -> FocalResult<bool> {
        require_key(public_key)?;
        Ok(self.send(Request::GetProfile {
            public_key: public_key.to_string(),
        }))
    }

    /// Request the graph around `public_key`; an empty key asks for the
    /// global graph.
    pub fn request_graph(&self, public_key: &str) -> bool {
        self.send(Request::GetGraph {
            public_key: public_key.to_string(),
        })
    }

    pub fn request_consideration(&self, consideration_id: &str) -> bool {
        self.send(Request::GetConsideration {
            consideration_id: consideration_id.to_string(),
        })
    }

    /// Request the most recent history of `public_key`, newest first.
    /// Nothing is sent until a tip is known.
    pub fn request_public_key_considerations(&self, public_key: &str) -> FocalResult<bool> {
        require_key(public_key)?;
        let Some(tip_height) = self.store.tip_height() else {
            debug!("No tip yet, not requesting history");
            return Ok(false);
        };
        Ok(self.send(Request::GetPublicKeyConsiderations {
            public_key: public_key.to_string(),
            start_height: tip_height + 1,
            end_height: 0,
            limit: self.config.history_limit,
        }))
    }

    /// Register keys whose pending considerations the peer should queue.
    /// An empty list sends nothing.
    pub fn apply_filter(&self, public_keys: Vec<String>) -> bool {
        if public_keys.is_empty() {
            return false;
        }
        self.send(Request::FilterAdd { public_keys })
    }

    /// Ask for the pending considerations involving `public_key`.
    pub fn request_pending_considerations(&self, public_key: &str) -> FocalResult<bool> {
        require_key(public_key)?;
        Ok(self.apply_filter(vec![public_key.to_string()])
            && self.send(Request::GetFilterConsiderationQueue {}))
    }

    /// Sign a consideration with the key at `key_index` and push it.
    ///
    /// Returns the id of the pushed record, or `None` when not connected.
    /// The passphrase is only used to re-derive the signing key and is not
    /// retained. The outcome arrives later as a
    /// [`Notification::PushConsiderationResult`].
    pub fn push_consideration(
        &self,
        passphrase: &str,
        recipient: &str,
        memo: &str,
        key_index: usize,
    ) -> FocalResult<Option<ConsiderationId>> {
        if !self.state().is_open() {
            debug!("Not connected, not pushing consideration");
            return Ok(None);
        }
        if self.store.public_keys().is_empty() {
            return Err(FocalError::Precondition("no keys imported".to_string()));
        }

        let draft = ConsiderationDraft::new(recipient, memo, self.store.tip_height())
            .with_key_index(key_index)
            .with_views_per_series(self.config.views_per_series)
            .with_addresses_per_account(self.config.addresses_per_account);
        let consideration = sign_consideration(passphrase, &draft)?;
        let id = focalpoint_core::consideration_id(&consideration);

        if self.send(Request::PushConsideration { consideration }) {
            info!("Pushed consideration {}", id);
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }

    // Keys

    /// Derive the public keys for `passphrase` and make them the key list,
    /// selecting the first. Only public keys are kept.
    pub fn import_keys(&self, passphrase: &str) -> Vec<String> {
        let public_keys = derive_public_keys(
            passphrase,
            self.config.import_account_count,
            self.config.addresses_per_account,
        );
        info!("Imported {} public keys", public_keys.len());
        self.store.set_public_keys(public_keys.clone());
        public_keys
    }

    pub fn delete_keys(&self) {
        self.store.clear_public_keys();
    }

    /// Select one of the imported keys; `None` if it is not among them.
    pub fn select_key(&self, public_key: &str) -> Option<usize> {
        self.store.select_key(public_key)
    }
}

fn require_key(public_key: &str) -> FocalResult<()> {
    if public_key.is_empty() {
        return Err(FocalError::Precondition("missing public key".to_string()));
    }
    Ok(())
}

async fn stop(session: Session) {
    info!("Closing connection to {}", session.peer);
    let _ = session.shutdown.send(true);
    if let Err(e) = session.handle.await {
        tracing::warn!("Connection task for {} failed: {}", session.peer, e);
    }
}
