//! Ledger records as exchanged with a peer node.
//!
//! Field names and optionality follow the node's JSON. Optional fields are
//! omitted when absent so that a record re-serializes the way it arrived.

use serde::{Deserialize, Serialize};

/// Lowercase hex SHA3-256 id of a consideration.
pub type ConsiderationId = String;

/// Lowercase hex id of a view.
pub type ViewId = String;

/// A signed record from one key to another.
///
/// Field declaration order matches the canonical hashing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consideration {
    /// Unix seconds.
    pub time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u32>,
    /// Sender public key. Genesis and observer records may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    /// Recipient public key.
    #[serde(rename = "for")]
    pub recipient: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<u64>,
    /// Base64 detached Ed25519 signature over the decoded id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Header of a view (a batch of considerations).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewHeader {
    pub previous: ViewId,
    pub hash_list_root: String,
    pub time: i64,
    pub target: String,
    pub point_work: String,
    pub nonce: u64,
    pub height: u64,
    pub consideration_count: u64,
}

/// A view with its considerations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub header: ViewHeader,
    #[serde(default)]
    pub considerations: Vec<Consideration>,
}

impl View {
    /// Whether this is the genesis view.
    pub fn is_genesis(&self) -> bool {
        self.header.height == 0
    }
}

/// Tip pointer: the most recent view id and its header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewIdHeaderPair {
    pub view_id: ViewId,
    pub header: ViewHeader,
}

/// Point-in-time standing of a public key as reported by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub public_key: String,
    /// Fraction in `0..=1`.
    #[serde(default)]
    pub ranking: f64,
    #[serde(default)]
    pub imbalance: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_id: Option<ViewId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a previously pushed consideration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    #[serde(default)]
    pub consideration_id: ConsiderationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResult {
    pub fn is_success(&self) -> bool {
        self.error.as_deref().map_or(true, str::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consideration_uses_for_on_the_wire() {
        let json = r#"{"time":1700000000,"nonce":7,"for":"abc=","memo":"hi","series":2}"#;
        let c: Consideration = serde_json::from_str(json).unwrap();
        assert_eq!(c.recipient, "abc=");
        assert!(c.by.is_none());
        assert_eq!(serde_json::to_string(&c).unwrap(), json);
    }

    #[test]
    fn consideration_without_memo_or_nonce() {
        let c: Consideration = serde_json::from_str(r#"{"time":1,"for":"x="}"#).unwrap();
        assert_eq!(c.memo, "");
        assert!(c.nonce.is_none());
        assert!(c.series.is_none());
    }

    #[test]
    fn profile_optional_fields() {
        let p: Profile =
            serde_json::from_str(r#"{"public_key":"k=","ranking":0.25,"imbalance":-3}"#).unwrap();
        assert_eq!(p.imbalance, -3);
        assert!(p.locale.is_none());
        assert!(p.error.is_none());
    }

    #[test]
    fn push_result_success() {
        let ok: PushResult = serde_json::from_str(r#"{"consideration_id":"ab"}"#).unwrap();
        assert!(ok.is_success());
        let failed: PushResult =
            serde_json::from_str(r#"{"consideration_id":"ab","error":"bad series"}"#).unwrap();
        assert!(!failed.is_success());
    }
}
