pub mod connection;
pub mod ice;
pub mod state;
pub mod types;

pub use connection::{PeerFactory, PeerHandle, WebRtcPeer, WebRtcPeerFactory};
pub use state::{peer_events, ConnectionState, PeerEvent, PeerEventReceiver, PeerEventSender};
pub use types::{
    CandidateReport, IceCandidate, NegotiationAnswer, NegotiationOffer, RemoteTrack, SdpKind,
    ServerConfig, SessionDescription,
};
