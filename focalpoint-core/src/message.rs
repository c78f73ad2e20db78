//! Peer protocol messages.
//!
//! Every frame is a JSON object `{"type": ..., "body": ...}`. Outbound
//! requests are a serde-tagged enum. Inbound frames are decoded once into
//! [`Inbound`], and each body is checked against its own shape.

use serde::{Deserialize, Serialize};

use crate::error::{FocalError, FocalResult};
use crate::types::{Consideration, ConsiderationId, Profile, PushResult, View, ViewId, ViewIdHeaderPair};

/// Websocket sub-protocol token spoken by peer nodes.
pub const SUBPROTOCOL: &str = "focalpoint.1";

/// Requests a client sends to its peer. None of them carry a correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Request {
    GetPeerAddresses {},
    GetView {
        view_id: ViewId,
    },
    GetViewByHeight {
        height: u64,
    },
    GetTipHeader {},
    GetProfile {
        public_key: String,
    },
    /// An empty key asks for the global graph.
    GetGraph {
        public_key: String,
    },
    PushConsideration {
        consideration: Consideration,
    },
    GetConsideration {
        consideration_id: ConsiderationId,
    },
    GetPublicKeyConsiderations {
        public_key: String,
        start_height: u64,
        end_height: u64,
        limit: u32,
    },
    FilterAdd {
        public_keys: Vec<String>,
    },
    GetFilterConsiderationQueue {},
}

impl Request {
    /// Wire name of the request type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetPeerAddresses {} => "get_peer_addresses",
            Self::GetView { .. } => "get_view",
            Self::GetViewByHeight { .. } => "get_view_by_height",
            Self::GetTipHeader {} => "get_tip_header",
            Self::GetProfile { .. } => "get_profile",
            Self::GetGraph { .. } => "get_graph",
            Self::PushConsideration { .. } => "push_consideration",
            Self::GetConsideration { .. } => "get_consideration",
            Self::GetPublicKeyConsiderations { .. } => "get_public_key_considerations",
            Self::FilterAdd { .. } => "filter_add",
            Self::GetFilterConsiderationQueue {} => "get_filter_consideration_queue",
        }
    }

    pub fn to_json(&self) -> FocalResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// New view ids are available.
    InvView { view_ids: Vec<ViewId> },
    TipHeader(ViewIdHeaderPair),
    Profile(Profile),
    Graph { public_key: String, graph: String },
    View(View),
    Consideration {
        consideration_id: ConsiderationId,
        consideration: Consideration,
    },
    PushConsiderationResult(PushResult),
    /// History of a key, already flattened across views.
    PublicKeyConsiderations {
        public_key: String,
        considerations: Vec<Consideration>,
    },
    FilterConsiderationQueue { considerations: Vec<Consideration> },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    body: serde_json::Value,
}

#[derive(Deserialize)]
struct InvViewBody {
    #[serde(default)]
    view_ids: Option<Vec<ViewId>>,
}

#[derive(Deserialize)]
struct GraphBody {
    public_key: String,
    #[serde(default)]
    graph: String,
}

#[derive(Deserialize)]
struct ViewBody {
    view: View,
}

#[derive(Deserialize)]
struct ConsiderationBody {
    consideration_id: ConsiderationId,
    consideration: Consideration,
}

#[derive(Deserialize)]
struct FilterView {
    #[serde(default)]
    considerations: Option<Vec<Consideration>>,
}

#[derive(Deserialize)]
struct PublicKeyConsiderationsBody {
    public_key: String,
    #[serde(default)]
    filter_views: Option<Vec<FilterView>>,
}

#[derive(Deserialize)]
struct QueueBody {
    #[serde(default)]
    considerations: Option<Vec<Consideration>>,
}

impl Inbound {
    /// Decode one text frame.
    ///
    /// Unknown types are a [`FocalError::Protocol`] error; bodies that do not
    /// match their type are a [`FocalError::Serialization`] error.
    pub fn from_json(text: &str) -> FocalResult<Self> {
        let Envelope { kind, body } = serde_json::from_str(text)?;

        let message = match kind.as_str() {
            "inv_view" => {
                let body: InvViewBody = serde_json::from_value(body)?;
                Self::InvView {
                    view_ids: body.view_ids.unwrap_or_default(),
                }
            }
            "tip_header" => Self::TipHeader(serde_json::from_value(body)?),
            "profile" => Self::Profile(serde_json::from_value(body)?),
            "graph" => {
                let body: GraphBody = serde_json::from_value(body)?;
                Self::Graph {
                    public_key: body.public_key,
                    graph: body.graph,
                }
            }
            "view" => {
                let body: ViewBody = serde_json::from_value(body)?;
                Self::View(body.view)
            }
            "consideration" => {
                let body: ConsiderationBody = serde_json::from_value(body)?;
                Self::Consideration {
                    consideration_id: body.consideration_id,
                    consideration: body.consideration,
                }
            }
            "push_consideration_result" => {
                Self::PushConsiderationResult(serde_json::from_value(body)?)
            }
            "public_key_considerations" => {
                let body: PublicKeyConsiderationsBody = serde_json::from_value(body)?;
                let considerations = body
                    .filter_views
                    .unwrap_or_default()
                    .into_iter()
                    .flat_map(|view| view.considerations.unwrap_or_default())
                    .collect();
                Self::PublicKeyConsiderations {
                    public_key: body.public_key,
                    considerations,
                }
            }
            "filter_consideration_queue" => {
                let body: QueueBody = serde_json::from_value(body)?;
                Self::FilterConsiderationQueue {
                    considerations: body.considerations.unwrap_or_default(),
                }
            }
            other => {
                return Err(FocalError::Protocol(format!("unknown message type {other:?}")));
            }
        };

        Ok(message)
    }

    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvView { .. } => "inv_view",
            Self::TipHeader(_) => "tip_header",
            Self::Profile(_) => "profile",
            Self::Graph { .. } => "graph",
            Self::View(_) => "view",
            Self::Consideration { .. } => "consideration",
            Self::PushConsiderationResult(_) => "push_consideration_result",
            Self::PublicKeyConsiderations { .. } => "public_key_considerations",
            Self::FilterConsiderationQueue { .. } => "filter_consideration_queue",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header_json(height: u64) -> serde_json::Value {
        json!({
            "previous": "00ab",
            "hash_list_root": "cd",
            "time": 1700000000,
            "target": "ff",
            "point_work": "01",
            "nonce": 9,
            "height": height,
            "consideration_count": 1
        })
    }

    #[test]
    fn empty_body_requests() {
        assert_eq!(
            Request::GetTipHeader {}.to_json().unwrap(),
            r#"{"type":"get_tip_header","body":{}}"#
        );
        assert_eq!(
            Request::GetFilterConsiderationQueue {}.kind(),
            "get_filter_consideration_queue"
        );
    }

    #[test]
    fn history_request_shape() {
        let request = Request::GetPublicKeyConsiderations {
            public_key: "k=".to_string(),
            start_height: 101,
            end_height: 0,
            limit: 10,
        };
        let value: serde_json::Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "get_public_key_considerations",
                "body": {"public_key": "k=", "start_height": 101, "end_height": 0, "limit": 10}
            })
        );
        let parsed: Request = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn push_request_embeds_record() {
        let request = Request::PushConsideration {
            consideration: Consideration {
                time: 1,
                nonce: Some(2),
                by: Some("b=".to_string()),
                recipient: "f=".to_string(),
                memo: "m".to_string(),
                series: Some(1),
                signature: Some("s".to_string()),
            },
        };
        let json = request.to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"push_consideration","body":{"consideration":{"time":1"#));
        assert!(json.contains(r#""for":"f=""#));
    }

    #[test]
    fn decode_tip_header() {
        let text = json!({"type": "tip_header", "body": {"view_id": "aa", "header": header_json(42)}});
        match Inbound::from_json(&text.to_string()).unwrap() {
            Inbound::TipHeader(tip) => {
                assert_eq!(tip.view_id, "aa");
                assert_eq!(tip.header.height, 42);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_view() {
        let text = json!({
            "type": "view",
            "body": {"view": {"header": header_json(0), "considerations": [{"time": 1, "for": "x="}]}}
        });
        let Inbound::View(view) = Inbound::from_json(&text.to_string()).unwrap() else {
            panic!("expected view");
        };
        assert!(view.is_genesis());
        assert_eq!(view.considerations.len(), 1);
    }

    #[test]
    fn public_key_considerations_are_flattened() {
        let text = json!({
            "type": "public_key_considerations",
            "body": {
                "public_key": "k=",
                "filter_views": [
                    {"view_id": "a", "considerations": [{"time": 1, "for": "k="}, {"time": 2, "for": "k="}]},
                    {"view_id": "b", "considerations": null},
                    {"view_id": "c", "considerations": [{"time": 3, "for": "k="}]}
                ]
            }
        });
        let Inbound::PublicKeyConsiderations { public_key, considerations } =
            Inbound::from_json(&text.to_string()).unwrap()
        else {
            panic!("expected history");
        };
        assert_eq!(public_key, "k=");
        let times: Vec<i64> = considerations.iter().map(|c| c.time).collect();
        assert_eq!(times, [1, 2, 3]);
    }

    #[test]
    fn missing_filter_views_is_empty_history() {
        let text = r#"{"type":"public_key_considerations","body":{"public_key":"k=","filter_views":null}}"#;
        let Inbound::PublicKeyConsiderations { considerations, .. } = Inbound::from_json(text).unwrap()
        else {
            panic!("expected history");
        };
        assert!(considerations.is_empty());
    }

    #[test]
    fn decode_push_result_and_queue() {
        let push = r#"{"type":"push_consideration_result","body":{"consideration_id":"ab","error":"bad"}}"#;
        assert!(matches!(
            Inbound::from_json(push).unwrap(),
            Inbound::PushConsiderationResult(PushResult { error: Some(_), .. })
        ));

        let queue = r#"{"type":"filter_consideration_queue","body":{"considerations":null}}"#;
        assert_eq!(
            Inbound::from_json(queue).unwrap(),
            Inbound::FilterConsiderationQueue { considerations: vec![] }
        );
    }

    #[test]
    fn unknown_and_malformed_frames() {
        assert!(matches!(
            Inbound::from_json(r#"{"type":"peer_addresses","body":{}}"#),
            Err(FocalError::Protocol(_))
        ));
        assert!(matches!(
            Inbound::from_json(r#"{"type":"profile","body":{"ranking":1}}"#),
            Err(FocalError::Serialization(_))
        ));
        assert!(Inbound::from_json("not json").is_err());
    }
}
