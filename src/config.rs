// Stream configuration
// Logging is compiled in for debug builds only

use crate::capture::CaptureConstraints;
use crate::error::{Result, StreamError};
use crate::peer::types::ServerConfig;
use crate::utils::add_ice_url_scheme;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

#[cfg(debug_assertions)]
pub mod dev {
    // flip to false to silence logging in debug builds
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Which transport a session tries first.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationPolicy {
    /// negotiate a peer stream, degrade to the pulled feed on any failure
    #[default]
    RealtimeFirst,
    /// bind the pulled feed straight away and never negotiate
    FallbackOnly,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StreamConfig {
    /// endpoint receiving `{ sdp, exercise }` offers
    pub signaling_url: String,

    /// base of the `/video_feed/{id}` fallback resource
    pub fallback_base_url: String,

    pub ice_servers: Vec<ServerConfig>,

    pub capture: CaptureConstraints,

    pub policy: NegotiationPolicy,

    /// bound on the signaling round trip
    pub signaling_timeout_ms: u64,

    /// bound on waiting for the remote track once the answer is applied
    pub negotiation_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            signaling_url: "http://127.0.0.1:5000/api/rtc_offer".into(),
            fallback_base_url: "http://127.0.0.1:5000".into(),
            ice_servers: default_ice_servers(),
            capture: CaptureConstraints::default(),
            policy: NegotiationPolicy::RealtimeFirst,
            signaling_timeout_ms: 10_000,
            negotiation_timeout_ms: 15_000,
        }
    }
}

/// Public Google STUN servers used when nothing else is configured
pub fn default_ice_servers() -> Vec<ServerConfig> {
    ["stun.l.google.com:19302", "stun1.l.google.com:19302", "stun2.l.google.com:19302"]
        .iter()
        .enumerate()
        .map(|(i, url)| ServerConfig {
            id: format!("default-stun-{i}"),
            r#type: "stun".into(),
            url: format!("stun:{url}"),
            username: None,
            credential: None,
        })
        .collect()
}

impl StreamConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let mut config: StreamConfig = serde_json::from_str(raw)
            .map_err(|e| StreamError::Config(format!("invalid config json: {e}")))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StreamError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn signaling_timeout(&self) -> Duration {
        Duration::from_millis(self.signaling_timeout_ms)
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_millis(self.negotiation_timeout_ms)
    }

    /// adds the missing `stun:`/`turn:` scheme to ICE urls
    pub fn normalize(&mut self) {
        for server in &mut self.ice_servers {
            server.url = add_ice_url_scheme(server);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.signaling_url.trim().is_empty() {
            return Err(StreamError::Config("signaling_url cannot be empty".into()));
        }
        if self.fallback_base_url.trim().is_empty() {
            return Err(StreamError::Config("fallback_base_url cannot be empty".into()));
        }
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(StreamError::Config(format!(
                    "ICE server {} has an empty url",
                    server.id
                )));
            }
            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(StreamError::Config(format!(
                    "TURN server {} requires username and credential",
                    server.id
                )));
            }
        }
        Ok(())
    }
}
