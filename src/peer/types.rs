use serde::{Deserialize, Serialize};

/// `type` field of a session description
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description as it travels over signaling: `{ "type", "sdp" }`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

/// Locally produced offer. A fresh one is created for every negotiation round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationOffer {
    pub description: SessionDescription,
}

/// Answer received from the signaling endpoint, candidates in received order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationAnswer {
    pub description: SessionDescription,
    pub candidates: Vec<IceCandidate>,
}

/// ICE candidate in browser JSON form
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}

/// ICE server configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// A remote media track announced by the peer connection
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub track_id: String,
    pub stream_id: String,
}

/// Outcome of applying the answer's candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateReport {
    pub applied: usize,
    pub skipped: usize,
}
