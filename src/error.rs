use libp2p::PeerId;
use thiserror::Error;

/// A bootstrap endpoint string that could not be turned into a [`PeerAddress`].
///
/// [`PeerAddress`]: crate::common::PeerAddress
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid multiaddr `{entry}`: {source}")]
    Multiaddr {
        entry: String,
        #[source]
        source: libp2p::multiaddr::Error,
    },

    #[error("multiaddr `{0}` missing /p2p/<PeerId> suffix")]
    MissingPeerId(String),
}

/// An inbound payload that is not a well-formed chat message.
#[derive(Debug, Error)]
#[error("could not decode message: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("peer {0} has no known addresses")]
    NoAddresses(PeerId),

    #[error("dial to {peer} failed: {reason}")]
    Dial { peer: PeerId, reason: String },

    #[error("connection to {0} timed out")]
    Timeout(PeerId),

    #[error("network task is gone")]
    NetworkClosed,
}

#[derive(Debug, Error)]
pub enum PublishError {
    /// Nobody else is subscribed to the topic yet.
    #[error("no peers subscribed to the chat topic yet")]
    NoPeers,

    #[error("publish rejected: {0}")]
    Rejected(String),

    #[error("network task is gone")]
    NetworkClosed,
}

/// A config document that cannot be used at all.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("top level must be a JSON object")]
    NotAnObject,
}

/// No local address could be rewritten into a publicly reachable one.
#[derive(Debug, Error)]
#[error("no address containing `{marker}` could be rewritten (candidates: {candidates:?})")]
pub struct NotFoundError {
    pub marker: String,
    pub candidates: Vec<String>,
}

/// The broadcast subscription or the host shut down underneath us.
#[derive(Debug, Error)]
#[error("transport failed: {0}")]
pub struct TransportFatalError(pub String);

impl NotFoundError {
    pub fn new<S: AsRef<str>>(marker: &str, candidates: &[S]) -> Self {
        Self {
            marker: marker.to_string(),
            candidates: candidates.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }
}
