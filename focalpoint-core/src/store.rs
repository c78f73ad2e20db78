//! Process-wide state cache.
//!
//! Holds what the client has learned from its peer plus the user's public
//! keys. Persisted parts are written through to a [`Persistence`] on every
//! change; the tip, the pending queue and the ranking filter live only in
//! memory. Only public keys are ever stored.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FocalError, FocalResult};
use crate::graph::{decode_graph, FlowGraph};
use crate::persist::{
    MemoryPersistence, Persistence, CURRENT_VIEW, GENESIS_VIEW, KEY_STORE, SELECTED_NODE,
    SPACE_TIME_STORE,
};
use crate::types::{Consideration, ConsiderationId, Profile, View, ViewIdHeaderPair};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SpaceTime {
    #[serde(default)]
    considerations_by_id: HashMap<ConsiderationId, Consideration>,
    #[serde(default)]
    considerations_by_pk: HashMap<String, Vec<Consideration>>,
    #[serde(default)]
    profiles_by_pk: HashMap<String, Profile>,
    #[serde(default)]
    graphs_by_pk: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KeyStore {
    #[serde(default)]
    public_keys: Vec<String>,
    #[serde(default)]
    selected_index: Option<usize>,
    #[serde(default)]
    selected_key: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    space_time: SpaceTime,
    keys: KeyStore,
    current_view: Option<View>,
    genesis_view: Option<View>,
    selected_node: Option<String>,
    tip: Option<ViewIdHeaderPair>,
    pending: Vec<Consideration>,
    ranking_filter: f64,
}

/// Shared cache; clone the `Arc` to share it between tasks.
pub struct Store {
    inner: RwLock<Inner>,
    persistence: Arc<dyn Persistence>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("inner", &*self.inner.read()).finish_non_exhaustive()
    }
}

impl Store {
    /// Restore persisted snapshots. Missing or unreadable ones start empty.
    pub fn open(persistence: Arc<dyn Persistence>) -> Self {
        let inner = Inner {
            space_time: restore(persistence.as_ref(), SPACE_TIME_STORE).unwrap_or_default(),
            keys: restore(persistence.as_ref(), KEY_STORE).unwrap_or_default(),
            current_view: restore(persistence.as_ref(), CURRENT_VIEW),
            genesis_view: restore(persistence.as_ref(), GENESIS_VIEW),
            selected_node: restore(persistence.as_ref(), SELECTED_NODE),
            ..Inner::default()
        };
        Self {
            inner: RwLock::new(inner),
            persistence,
        }
    }

    /// A store that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryPersistence::new()))
    }

    fn persist<T: Serialize>(&self, name: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(FocalError::from)
            .and_then(|json| self.persistence.save(name, &json));
        if let Err(e) = result {
            warn!("Failed to persist {}: {}", name, e);
        }
    }

    // Records

    pub fn consideration(&self, id: &str) -> Option<Consideration> {
        self.inner.read().space_time.considerations_by_id.get(id).cloned()
    }

    pub fn set_consideration(&self, id: ConsiderationId, consideration: Consideration) {
        let mut inner = self.inner.write();
        inner.space_time.considerations_by_id.insert(id, consideration);
        self.persist(SPACE_TIME_STORE, &inner.space_time);
    }

    /// History of a key; `None` until it has been fetched, which differs
    /// from a fetched but empty history.
    pub fn considerations_for(&self, public_key: &str) -> Option<Vec<Consideration>> {
        self.inner.read().space_time.considerations_by_pk.get(public_key).cloned()
    }

    /// Replace the whole cached history of a key.
    pub fn set_considerations_for(&self, public_key: String, considerations: Vec<Consideration>) {
        let mut inner = self.inner.write();
        inner.space_time.considerations_by_pk.insert(public_key, considerations);
        self.persist(SPACE_TIME_STORE, &inner.space_time);
    }

    pub fn profile(&self, public_key: &str) -> Option<Profile> {
        self.inner.read().space_time.profiles_by_pk.get(public_key).cloned()
    }

    /// Cache a profile under its own public key.
    pub fn set_profile(&self, profile: Profile) {
        let mut inner = self.inner.write();
        inner
            .space_time
            .profiles_by_pk
            .insert(profile.public_key.clone(), profile);
        self.persist(SPACE_TIME_STORE, &inner.space_time);
    }

    /// Raw DOT text of a key's graph.
    pub fn graph(&self, public_key: &str) -> Option<String> {
        self.inner.read().space_time.graphs_by_pk.get(public_key).cloned()
    }

    pub fn set_graph(&self, public_key: String, graph: String) {
        let mut inner = self.inner.write();
        inner.space_time.graphs_by_pk.insert(public_key, graph);
        self.persist(SPACE_TIME_STORE, &inner.space_time);
    }

    /// Decode the cached graph of `public_key` around `focal_key` using the
    /// current ranking filter.
    pub fn flow_graph(&self, public_key: &str, focal_key: &str) -> FocalResult<Option<FlowGraph>> {
        let (text, threshold) = {
            let inner = self.inner.read();
            (
                inner.space_time.graphs_by_pk.get(public_key).cloned(),
                inner.ranking_filter,
            )
        };
        text.map(|text| decode_graph(&text, focal_key, threshold)).transpose()
    }

    // Views

    pub fn tip(&self) -> Option<ViewIdHeaderPair> {
        self.inner.read().tip.clone()
    }

    pub fn tip_height(&self) -> Option<u64> {
        self.inner.read().tip.as_ref().map(|tip| tip.header.height)
    }

    pub fn set_tip(&self, tip: ViewIdHeaderPair) {
        debug!("Tip now {} at height {}", tip.view_id, tip.header.height);
        self.inner.write().tip = Some(tip);
    }

    pub fn current_view(&self) -> Option<View> {
        self.inner.read().current_view.clone()
    }

    pub fn genesis_view(&self) -> Option<View> {
        self.inner.read().genesis_view.clone()
    }

    /// Make `view` the current view; the view at height 0 is also kept as
    /// genesis.
    pub fn set_current_view(&self, view: View) {
        let mut inner = self.inner.write();
        if view.is_genesis() {
            inner.genesis_view = Some(view.clone());
            self.persist(GENESIS_VIEW, &inner.genesis_view);
        }
        inner.current_view = Some(view);
        self.persist(CURRENT_VIEW, &inner.current_view);
    }

    // Pending queue and filter

    pub fn pending(&self) -> Vec<Consideration> {
        self.inner.read().pending.clone()
    }

    pub fn set_pending(&self, considerations: Vec<Consideration>) {
        self.inner.write().pending = considerations;
    }

    /// Minimum graph ranking, in percent.
    pub fn ranking_filter(&self) -> f64 {
        self.inner.read().ranking_filter
    }

    pub fn set_ranking_filter(&self, percent: f64) {
        let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
        self.inner.write().ranking_filter = percent;
    }

    // Keys

    pub fn public_keys(&self) -> Vec<String> {
        self.inner.read().keys.public_keys.clone()
    }

    /// Replace the key list and select its first key.
    pub fn set_public_keys(&self, public_keys: Vec<String>) {
        let mut inner = self.inner.write();
        inner.keys = KeyStore {
            selected_index: (!public_keys.is_empty()).then_some(0),
            selected_key: public_keys.first().cloned(),
            public_keys,
        };
        self.persist(KEY_STORE, &inner.keys);
    }

    pub fn clear_public_keys(&self) {
        let mut inner = self.inner.write();
        inner.keys = KeyStore::default();
        self.persist(KEY_STORE, &inner.keys);
    }

    pub fn selected_key(&self) -> Option<String> {
        self.inner.read().keys.selected_key.clone()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.inner.read().keys.selected_index
    }

    /// Select a key by value. Returns its index, or `None` when the key is
    /// not in the list; the key stays selected either way.
    pub fn select_key(&self, public_key: &str) -> Option<usize> {
        let mut inner = self.inner.write();
        let index = inner.keys.public_keys.iter().position(|k| k == public_key);
        inner.keys.selected_index = index;
        inner.keys.selected_key = Some(public_key.to_string());
        self.persist(KEY_STORE, &inner.keys);
        index
    }

    // Peer

    pub fn selected_node(&self) -> Option<String> {
        self.inner.read().selected_node.clone()
    }

    pub fn set_selected_node(&self, node: Option<String>) {
        let mut inner = self.inner.write();
        inner.selected_node = node;
        self.persist(SELECTED_NODE, &inner.selected_node);
    }
}

fn restore<T: DeserializeOwned>(persistence: &dyn Persistence, name: &str) -> Option<T> {
    let text = match persistence.load(name) {
        Ok(text) => text?,
        Err(e) => {
            warn!("Failed to load {}: {}", name, e);
            return None;
        }
    };
    match serde_json::from_str::<Option<T>>(&text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Discarding unreadable {} snapshot: {}", name, e);
            None
        }
    }
}
