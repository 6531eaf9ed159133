use std::collections::hash_map::DefaultHasher;
use std::error::Error;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use libp2p::autonat;
use libp2p::dcutr;
use libp2p::gossipsub::{self, IdentTopic};
use libp2p::identify;
use libp2p::kad::{self, Mode as KadMode, store::MemoryStore};
use libp2p::ping;
use libp2p::relay;
use libp2p::swarm::NetworkBehaviour;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::{PeerId, identity};

/// Broadcast topic every chat peer joins.
pub const CHAT_TOPIC: &str = "sylo-group-chat-demo";

pub const PROTOCOL_VERSION: &str = "group-chat/1.0.0";

#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "ChatBehaviorEvent")]
pub struct ChatBehavior {
    pub gossipsub: gossipsub::Behaviour,
    pub kad: kad::Behaviour<MemoryStore>,
    pub identify: identify::Behaviour,
    pub relay_client: relay::client::Behaviour,
    /// Only present when this peer offers itself as a relay.
    pub relay_server: Toggle<relay::Behaviour>,
    pub autonat: autonat::Behaviour,
    pub dcutr: dcutr::Behaviour,
    pub ping: ping::Behaviour,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum ChatBehaviorEvent {
    Gossipsub(gossipsub::Event),
    Kad(kad::Event),
    Identify(identify::Event),
    RelayClient(relay::client::Event),
    RelayServer(relay::Event),
    Autonat(autonat::Event),
    Dcutr(dcutr::Event),
    Ping(ping::Event),
}

impl From<gossipsub::Event> for ChatBehaviorEvent {
    fn from(event: gossipsub::Event) -> Self {
        ChatBehaviorEvent::Gossipsub(event)
    }
}

impl From<kad::Event> for ChatBehaviorEvent {
    fn from(event: kad::Event) -> Self {
        ChatBehaviorEvent::Kad(event)
    }
}

impl From<identify::Event> for ChatBehaviorEvent {
    fn from(event: identify::Event) -> Self {
        ChatBehaviorEvent::Identify(event)
    }
}

impl From<relay::client::Event> for ChatBehaviorEvent {
    fn from(event: relay::client::Event) -> Self {
        ChatBehaviorEvent::RelayClient(event)
    }
}

impl From<relay::Event> for ChatBehaviorEvent {
    fn from(event: relay::Event) -> Self {
        ChatBehaviorEvent::RelayServer(event)
    }
}

impl From<autonat::Event> for ChatBehaviorEvent {
    fn from(event: autonat::Event) -> Self {
        ChatBehaviorEvent::Autonat(event)
    }
}

impl From<dcutr::Event> for ChatBehaviorEvent {
    fn from(event: dcutr::Event) -> Self {
        ChatBehaviorEvent::Dcutr(event)
    }
}

impl From<ping::Event> for ChatBehaviorEvent {
    fn from(event: ping::Event) -> Self {
        ChatBehaviorEvent::Ping(event)
    }
}

pub fn build_behavior(
    local_key: &identity::Keypair,
    relay_client: relay::client::Behaviour,
    relay_hop: bool,
) -> Result<(ChatBehavior, IdentTopic), Box<dyn Error + Send + Sync>> {
    let local_peer_id = PeerId::from(local_key.public());

    // Identical payloads get identical ids, so gossipsub drops repeats before
    // they ever reach the message log.
    let message_id_fn = |message: &gossipsub::Message| {
        let mut hasher = DefaultHasher::new();
        message.data.hash(&mut hasher);
        gossipsub::MessageId::from(hasher.finish().to_string())
    };

    let gossipsub_config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(Duration::from_secs(5))
        .validation_mode(gossipsub::ValidationMode::Strict)
        .message_id_fn(message_id_fn)
        .support_floodsub()
        .build()?;

    let mut gossipsub = gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(local_key.clone()),
        gossipsub_config,
    )?;

    let topic = gossipsub::IdentTopic::new(CHAT_TOPIC);
    gossipsub.subscribe(&topic)?;

    let store = MemoryStore::new(local_peer_id);
    let mut kad = kad::Behaviour::new(local_peer_id, store);
    kad.set_mode(Some(KadMode::Server));

    let identify_config =
        identify::Config::new(PROTOCOL_VERSION.into(), local_key.public().clone());
    let identify = identify::Behaviour::new(identify_config);

    let relay_server = relay_hop
        .then(|| relay::Behaviour::new(local_peer_id, relay::Config::default()));
    let autonat = autonat::Behaviour::new(local_peer_id, autonat::Config::default());
    let dcutr = dcutr::Behaviour::new(local_peer_id);
    let ping = ping::Behaviour::new(ping::Config::default());

    Ok((
        ChatBehavior {
            gossipsub,
            kad,
            identify,
            relay_client,
            relay_server: Toggle::from(relay_server),
            autonat,
            dcutr,
            ping,
        },
        topic,
    ))
}
