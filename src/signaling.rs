//! Signaling round trip: POST the offer, receive the answer and its candidates.

use crate::error::{Result, StreamError};
use crate::peer::types::{IceCandidate, NegotiationAnswer, NegotiationOffer, SdpKind, SessionDescription};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// `SignalingError` on transport failure or non-2xx status,
    /// `NegotiationError` when the body carries no usable answer.
    async fn request_remote_answer(
        &self,
        offer: &NegotiationOffer,
        exercise_id: &str,
    ) -> Result<NegotiationAnswer>;
}

#[derive(Serialize)]
struct OfferRequest<'a> {
    sdp: &'a SessionDescription,
    exercise: &'a str,
}

#[derive(Deserialize)]
struct AnswerResponse {
    #[serde(default)]
    sdp: Option<SessionDescription>,
    /// absent and `null` both mean no candidates
    #[serde(default)]
    ice_candidates: Option<Vec<serde_json::Value>>,
}

/// Talks to the `/api/rtc_offer` style endpoint over HTTP
pub struct HttpSignalingClient {
    client: Client,
    url: String,
}

impl HttpSignalingClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SignalingClient for HttpSignalingClient {
    async fn request_remote_answer(
        &self,
        offer: &NegotiationOffer,
        exercise_id: &str,
    ) -> Result<NegotiationAnswer> {
        info!("Sending offer for {} to {}", exercise_id, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&OfferRequest {
                sdp: &offer.description,
                exercise: exercise_id,
            })
            .send()
            .await
            .map_err(|e| StreamError::Signaling(format!("offer request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Signaling(format!(
                "Server responded with status: {status}"
            )));
        }

        let body: AnswerResponse = response
            .json()
            .await
            .map_err(|e| StreamError::Negotiation(format!("malformed answer body: {e}")))?;

        decode_answer(body)
    }
}

fn decode_answer(body: AnswerResponse) -> Result<NegotiationAnswer> {
    let description = body
        .sdp
        .ok_or_else(|| StreamError::Negotiation("answer carries no sdp".into()))?;
    if description.kind != SdpKind::Answer {
        return Err(StreamError::Negotiation(format!(
            "expected an answer, got {:?}",
            description.kind
        )));
    }

    let raw_candidates = body.ice_candidates.unwrap_or_default();
    let mut candidates = Vec::with_capacity(raw_candidates.len());
    for raw in raw_candidates {
        match serde_json::from_value::<IceCandidate>(raw) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!("{}", StreamError::Candidate(format!("undecodable entry: {e}"))),
        }
    }
    debug!("Answer decoded with {} candidates", candidates.len());

    Ok(NegotiationAnswer {
        description,
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> AnswerResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn offer_request_matches_wire_format() {
        let description = SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0".into(),
        };
        let value = serde_json::to_value(OfferRequest {
            sdp: &description,
            exercise: "squat",
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"sdp": {"type": "offer", "sdp": "v=0"}, "exercise": "squat"})
        );
    }

    #[test]
    fn undecodable_candidates_are_dropped_in_place() {
        let answer = decode_answer(body(json!({
            "sdp": {"type": "answer", "sdp": "v=0"},
            "ice_candidates": [
                {"candidate": "candidate:1 1 UDP 2130706431 192.168.1.1 8888 typ host", "sdpMLineIndex": 0},
                42,
                {"candidate": "candidate:2 1 UDP 1694498815 203.0.113.5 9999 typ srflx", "sdpMid": "0"}
            ]
        })))
        .unwrap();
        assert_eq!(answer.candidates.len(), 2);
        assert_eq!(answer.candidates[0].sdp_mline_index, Some(0));
        assert_eq!(answer.candidates[1].sdp_mid.as_deref(), Some("0"));
    }

    #[test]
    fn null_candidate_list_keeps_the_answer() {
        let answer = decode_answer(body(json!({
            "sdp": {"type": "answer", "sdp": "v=0"},
            "ice_candidates": null
        })))
        .unwrap();
        assert_eq!(answer.description.sdp, "v=0");
        assert!(answer.candidates.is_empty());
    }

    #[test]
    fn missing_sdp_is_a_negotiation_error() {
        let err = decode_answer(body(json!({"ice_candidates": []}))).unwrap_err();
        assert!(matches!(err, StreamError::Negotiation(_)));
    }

    #[test]
    fn offer_echoed_back_is_rejected() {
        let err = decode_answer(body(json!({"sdp": {"type": "offer", "sdp": "v=0"}}))).unwrap_err();
        assert!(matches!(err, StreamError::Negotiation(_)));
    }
}
