use libp2p::autonat;
use libp2p::identify;
use libp2p::kad::{self, Mode as KadMode, store::MemoryStore};
use libp2p::ping;
use libp2p::relay;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{PeerId, identity};

pub const PROTOCOL_VERSION: &str = "group-chat-autonat/1.0.0";

#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "NodeBehaviorEvent")]
pub struct NodeBehavior {
    pub kad: kad::Behaviour<MemoryStore>,
    pub identify: identify::Behaviour,
    pub relay: relay::Behaviour,
    pub autonat: autonat::Behaviour,
    pub ping: ping::Behaviour,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum NodeBehaviorEvent {
    Kad(kad::Event),
    Identify(identify::Event),
    Relay(relay::Event),
    Autonat(autonat::Event),
    Ping(ping::Event),
}

impl From<kad::Event> for NodeBehaviorEvent {
    fn from(event: kad::Event) -> Self {
        NodeBehaviorEvent::Kad(event)
    }
}

impl From<identify::Event> for NodeBehaviorEvent {
    fn from(event: identify::Event) -> Self {
        NodeBehaviorEvent::Identify(event)
    }
}

impl From<relay::Event> for NodeBehaviorEvent {
    fn from(event: relay::Event) -> Self {
        NodeBehaviorEvent::Relay(event)
    }
}

impl From<autonat::Event> for NodeBehaviorEvent {
    fn from(event: autonat::Event) -> Self {
        NodeBehaviorEvent::Autonat(event)
    }
}

impl From<ping::Event> for NodeBehaviorEvent {
    fn from(event: ping::Event) -> Self {
        NodeBehaviorEvent::Ping(event)
    }
}

/// Kademlia in server mode plus the services NATed chat peers lean on:
/// dial-back probes (AutoNAT) and relayed circuits.
pub fn build_behavior(local_key: &identity::Keypair) -> NodeBehavior {
    let local_peer_id = PeerId::from(local_key.public());

    let store = MemoryStore::new(local_peer_id);
    let mut kad = kad::Behaviour::new(local_peer_id, store);
    kad.set_mode(Some(KadMode::Server));

    let identify_config =
        identify::Config::new(PROTOCOL_VERSION.into(), local_key.public().clone());
    let identify = identify::Behaviour::new(identify_config);

    let relay_behaviour = relay::Behaviour::new(local_peer_id, relay::Config::default());
    let autonat = autonat::Behaviour::new(local_peer_id, autonat::Config::default());
    let ping = ping::Behaviour::new(ping::Config::default());

    NodeBehavior {
        kad,
        identify,
        relay: relay_behaviour,
        autonat,
        ping,
    }
}
