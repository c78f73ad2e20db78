//! # focalpoint-core
//!
//! Core library for focalpoint ledger clients.
//!
//! This crate provides the ledger records, the canonical codec and id,
//! passphrase-derived identities and signing, the peer message set, the
//! flow graph decoder, and the persisted state cache shared by clients.

pub mod codec;
pub mod error;
pub mod format;
pub mod graph;
pub mod identity;
pub mod message;
pub mod persist;
pub mod signer;
pub mod state;
pub mod store;
pub mod types;

pub use codec::{canonical_json, consideration_id, extract_reference};
pub use error::{FocalError, FocalResult};
pub use graph::{decode_graph, FlowGraph, GraphLink, GraphNode};
pub use identity::{derive, derive_public_keys, passphrase_to_mnemonic, DerivedKeypair};
pub use message::{Inbound, Request, SUBPROTOCOL};
pub use persist::{FilePersistence, MemoryPersistence, Persistence};
pub use signer::{series_for_height, sign_consideration, verify_consideration, ConsiderationDraft};
pub use state::{ConnectionEvent, ConnectionState};
pub use store::Store;
pub use types::{
    Consideration, ConsiderationId, Profile, PushResult, View, ViewHeader, ViewId,
    ViewIdHeaderPair,
};

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: &str = "1";
