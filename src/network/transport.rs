use std::error::Error;

use libp2p::core::muxing::StreamMuxerBox;
use libp2p::core::transport::{Boxed, OrTransport};
use libp2p::core::upgrade::Version;
use libp2p::relay::client;
use libp2p::{PeerId, Transport, dns, identity, noise, tcp, yamux};

pub type BoxedTransport = Boxed<(PeerId, StreamMuxerBox)>;

/// TCP (with DNS resolution) or relayed circuits, secured with Noise and
/// multiplexed with Yamux. The relay client behaviour must be installed in
/// the same swarm as the returned transport.
pub fn build_transport(
    local_key: &identity::Keypair,
) -> Result<(BoxedTransport, client::Behaviour), Box<dyn Error + Send + Sync>> {
    let local_peer_id = local_key.public().to_peer_id();
    let (relay_transport, relay_behaviour) = client::new(local_peer_id);
    let tcp_transport =
        dns::tokio::Transport::system(tcp::tokio::Transport::new(tcp::Config::default().nodelay(true)))?;

    let transport = OrTransport::new(relay_transport, tcp_transport)
        .upgrade(Version::V1)
        .authenticate(noise::Config::new(local_key)?)
        .multiplex(yamux::Config::default())
        .boxed();

    Ok((transport, relay_behaviour))
}

/// Plain TCP transport for peers that do not dial through relays.
pub fn build_direct_transport(
    local_key: &identity::Keypair,
) -> Result<BoxedTransport, Box<dyn Error + Send + Sync>> {
    let tcp_transport =
        dns::tokio::Transport::system(tcp::tokio::Transport::new(tcp::Config::default().nodelay(true)))?;

    let transport = tcp_transport
        .upgrade(Version::V1)
        .authenticate(noise::Config::new(local_key)?)
        .multiplex(yamux::Config::default())
        .boxed();

    Ok(transport)
}
