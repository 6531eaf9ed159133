use libp2p::Multiaddr;
use tokio::sync::oneshot;

use crate::common::types::PeerAddress;
use crate::error::{ConnectError, PublishError};

/// Requests sent from the rest of the process to the network task.
#[derive(Debug)]
pub enum NetworkCommand {
    /// Publish an encoded payload on the chat topic.
    Publish {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), PublishError>>,
    },
    /// Dial a peer and report once the connection is established or has failed.
    Connect {
        peer: PeerAddress,
        reply: oneshot::Sender<Result<(), ConnectError>>,
    },
    /// Ask Kademlia to start a bootstrap query against the peers added so far.
    Bootstrap,
    /// Current listen addresses of the local swarm.
    LocalAddresses {
        reply: oneshot::Sender<Vec<Multiaddr>>,
    },
    /// Advertise an address to other peers via identify.
    AddExternalAddress(Multiaddr),
}
