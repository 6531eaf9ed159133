pub mod behavior;
pub mod client;
pub mod transport;

pub use client::{NetworkConfig, NetworkHandle, P2PClient, Subscription};
