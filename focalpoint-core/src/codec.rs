//! Canonical encoding and ids for considerations.
//!
//! A consideration id is `SHA3-256` over the whitespace-free JSON object
//! `{time, nonce, by, for, memo, series}` with keys in exactly that order,
//! rendered as lowercase hex. The order is what the network hashes; it is
//! fixed here by the field order of [`CanonicalConsideration`], never by
//! the order fields arrived in.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use sha3::{Digest, Sha3_256};

use crate::error::{FocalError, FocalResult};
use crate::types::{Consideration, ConsiderationId};

/// The hashed subset of a consideration. `signature` is deliberately absent.
#[derive(Serialize)]
struct CanonicalConsideration<'a> {
    time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    by: Option<&'a str>,
    #[serde(rename = "for")]
    recipient: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    memo: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<u64>,
}

fn is_empty(s: &&str) -> bool {
    s.is_empty()
}

impl<'a> From<&'a Consideration> for CanonicalConsideration<'a> {
    fn from(c: &'a Consideration) -> Self {
        Self {
            time: c.time,
            nonce: c.nonce,
            by: c.by.as_deref(),
            recipient: &c.recipient,
            memo: &c.memo,
            series: c.series,
        }
    }
}

/// Canonical JSON text of the hashed subset.
pub fn canonical_json(consideration: &Consideration) -> String {
    // Integers and strings only: serialization cannot fail.
    serde_json::to_string(&CanonicalConsideration::from(consideration)).unwrap()
}

/// Compute the id of a consideration.
pub fn consideration_id(consideration: &Consideration) -> ConsiderationId {
    let digest = Sha3_256::digest(canonical_json(consideration).as_bytes());
    hex::encode(digest)
}

/// Decode a hex id into the 32 bytes that get signed.
pub fn id_bytes(id: &str) -> FocalResult<[u8; 32]> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(id, &mut out)
        .map_err(|e| FocalError::Crypto(format!("invalid id {id:?}: {e}")))?;
    Ok(out)
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"ref\(([a-fA-F0-9]+)\)").unwrap())
}

/// First `ref(<hex>)` id embedded in a memo.
pub fn extract_reference(memo: &str) -> Option<&str> {
    reference_pattern()
        .captures(memo)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
