//! Error kinds for the stream session controller

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// capture device unavailable or denied
    #[error("Capture error: {0}")]
    Capture(String),

    /// transport or status failure talking to the signaling endpoint
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// remote description could not be applied, or the answer is unusable
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// a single connectivity candidate was rejected
    #[error("Candidate error: {0}")]
    Candidate(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Render target error: {0}")]
    Render(String),

    #[error("Peer connection error: {0}")]
    Peer(#[from] webrtc::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// a newer session replaced the one this result belongs to
    #[error("Session generation {0} was superseded")]
    Superseded(u64),
}

impl StreamError {
    /// Whether the controller answers this error with the fallback stream.
    pub fn triggers_fallback(&self) -> bool {
        !matches!(
            self,
            StreamError::Superseded(_) | StreamError::Render(_) | StreamError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
