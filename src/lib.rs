//! Peer-to-peer group chat over a libp2p broadcast topic.
//!
//! Peers join through a list of bootstrap endpoints, publish JSON encoded
//! [`ChatMessage`]s on a shared topic and keep a local [`MessageLog`] that
//! drops repeats and tracks a logical clock for outbound messages.

pub mod bootstrap;
pub mod chat;
pub mod codec;
pub mod common;
pub mod config;
pub mod error;
pub mod identity;
pub mod message_log;
pub mod network;
pub mod relay;

pub use common::{ChatMessage, PeerAddress};
pub use message_log::{AppendResult, MessageLog};
