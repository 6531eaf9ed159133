use std::collections::HashSet;
use std::fmt;

use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};

/// A single chat line as it travels over the broadcast topic.
///
/// Equality and hashing cover every field, so two deliveries of the same
/// content are the same message even when they arrive from different peers.
/// The serde names match the JSON keys already spoken on the topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "Clock")]
    pub clock: u64,
    #[serde(rename = "ID")]
    pub sender_id: String,
    /// Empty means the receiver derives a short name from `sender_id`.
    #[serde(rename = "Name", default)]
    pub display_name: String,
    #[serde(rename = "Text")]
    pub text: String,
}

/// Width of the short name derived from a sender id.
pub const SHORT_NAME_LEN: usize = 6;

impl ChatMessage {
    /// Name shown next to the text: the display name when set, otherwise the
    /// trailing characters of the sender id.
    pub fn author(&self) -> String {
        if !self.display_name.is_empty() {
            return self.display_name.clone();
        }

        let chars: Vec<char> = self.sender_id.chars().collect();
        if chars.len() >= SHORT_NAME_LEN {
            chars[chars.len() - SHORT_NAME_LEN..].iter().collect()
        } else {
            format!("{:>width$}", self.sender_id, width = SHORT_NAME_LEN)
        }
    }
}

/// A remote peer and the transport addresses it can be dialled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub peer_id: PeerId,
    pub addresses: HashSet<Multiaddr>,
}

impl PeerAddress {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            addresses: HashSet::new(),
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut addrs: Vec<String> = self.addresses.iter().map(|a| a.to_string()).collect();
        addrs.sort();
        write!(f, "{{{}: [{}]}}", self.peer_id, addrs.join(" "))
    }
}
