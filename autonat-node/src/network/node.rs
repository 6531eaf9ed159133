use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::path::Path;

use group_chat::error::NotFoundError;
use group_chat::identity::load_or_generate_key;
use group_chat::network::transport::build_direct_transport;
use group_chat::relay::{LOOPBACK_MARKER, announce_address, rewrite_public};
use libp2p::futures::StreamExt;
use libp2p::identify;
use libp2p::kad;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::{Config as SwarmConfig, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm, autonat};
use tokio::time::{Duration, interval, sleep};

use super::behavior::{NodeBehavior, NodeBehaviorEvent, build_behavior};

const NODE_KEY_PATH: &str = "data/node_key.pk";
const STATS_INTERVAL: Duration = Duration::from_secs(30);
/// A loopback listener has to show up within this long after startup.
const ANNOUNCE_DEADLINE: Duration = Duration::from_secs(10);

/// Service peer: answers AutoNAT dial-back probes, relays circuits for NATed
/// chat peers and serves the Kademlia routing table.
pub struct AutonatNode {
    public_ip: String,
    listen_addr: Multiaddr,
    // In-memory storage of discovered peers and their addresses
    peers: HashMap<PeerId, HashSet<Multiaddr>>,
    local_peer_id: Option<PeerId>,
    announced: Option<Multiaddr>,
    seen_listen_addrs: Vec<Multiaddr>,
}

impl AutonatNode {
    pub fn new(public_ip: String, listen_addr: Multiaddr) -> Self {
        Self {
            public_ip,
            listen_addr,
            peers: HashMap::new(),
            local_peer_id: None,
            announced: None,
            seen_listen_addrs: Vec::new(),
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let local_key = load_or_generate_key(Some(Path::new(NODE_KEY_PATH)))?;
        let local_peer_id = PeerId::from(local_key.public());
        self.local_peer_id = Some(local_peer_id);
        log::info!("Service peer PeerID: {local_peer_id}");

        let transport = build_direct_transport(&local_key)?;
        let behavior = build_behavior(&local_key);

        let mut swarm = Swarm::new(
            transport,
            behavior,
            local_peer_id,
            SwarmConfig::with_tokio_executor(),
        );
        swarm.listen_on(self.listen_addr.clone())?;

        let mut stats_interval = interval(STATS_INTERVAL);
        let announce_deadline = sleep(ANNOUNCE_DEADLINE);
        tokio::pin!(announce_deadline);

        loop {
            tokio::select! {
                event = swarm.select_next_some() => {
                    self.handle_swarm_event(event, &mut swarm);
                }
                _ = &mut announce_deadline, if self.announced.is_none() => {
                    return Err(NotFoundError::new(LOOPBACK_MARKER, &self.seen_listen_addrs
                        .iter()
                        .map(|addr| addr.to_string())
                        .collect::<Vec<_>>())
                    .into());
                }
                _ = stats_interval.tick() => {
                    log::info!("Statistics: {} known peers", self.known_peers_count());
                }
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<NodeBehaviorEvent>, swarm: &mut Swarm<NodeBehavior>) {
        match event {
            SwarmEvent::Behaviour(NodeBehaviorEvent::Identify(event)) => {
                self.handle_identify_event(event, swarm);
            }
            SwarmEvent::Behaviour(NodeBehaviorEvent::Kad(event)) => {
                self.handle_kad_event(event);
            }
            SwarmEvent::Behaviour(NodeBehaviorEvent::Relay(event)) => {
                log::debug!("Relay event: {event:?}");
            }
            SwarmEvent::Behaviour(NodeBehaviorEvent::Autonat(event)) => {
                if let autonat::Event::InboundProbe(probe) = event {
                    log::debug!("Serving AutoNAT probe: {probe:?}");
                }
            }
            SwarmEvent::Behaviour(NodeBehaviorEvent::Ping(_)) => {}
            SwarmEvent::NewListenAddr { address, .. } => {
                log::debug!("Listening on {address}");
                self.seen_listen_addrs.push(address.clone());
                if self.announced.is_none() {
                    self.try_announce(&address, swarm);
                }
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                log::info!("Client connected: {}", peer_id);
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                log::info!("Client disconnected: {}", peer_id);
            }
            _ => {}
        }
    }

    /// Advertises `address` with its loopback host swapped for the public IP.
    fn try_announce(&mut self, address: &Multiaddr, swarm: &mut Swarm<NodeBehavior>) {
        let Ok(public) = rewrite_public(&[address.to_string()], LOOPBACK_MARKER, &self.public_ip)
        else {
            return;
        };

        swarm.add_external_address(public.clone());
        match self.local_peer_id {
            Some(peer_id) => log::info!("Connect to me at: {}", announce_address(&public, peer_id)),
            None => log::info!("Connect to me at: {public}"),
        }
        self.announced = Some(public);
    }

    fn handle_identify_event(&mut self, event: identify::Event, swarm: &mut Swarm<NodeBehavior>) {
        if let identify::Event::Received { peer_id, info, .. } = event {
            log::debug!(
                "Identify info from {peer_id}: protocols={:?}",
                info.protocols
            );

            // Add peer addresses to Kademlia DHT and in-memory map
            for addr in info.listen_addrs {
                swarm
                    .behaviour_mut()
                    .kad
                    .add_address(&peer_id, addr.clone());

                let ip_str = extract_ip(&addr).unwrap_or_else(|| addr.to_string());
                log::info!("Peer discovered: {} @ {}", peer_id, ip_str);

                self.peers.entry(peer_id).or_default().insert(addr);
            }
        }
    }

    fn handle_kad_event(&mut self, event: kad::Event) {
        if let kad::Event::RoutingUpdated { peer, addresses, .. } = event {
            let entry = self.peers.entry(peer).or_default();
            for addr in addresses.iter() {
                entry.insert(addr.clone());
            }
            let known_addrs = entry.len();
            log::debug!(
                "Kademlia routing table updated for {} ({} addrs). Total peers: {}",
                peer,
                known_addrs,
                self.peers.len()
            );
        }
    }

    pub fn known_peers_count(&self) -> usize {
        self.peers.len()
    }
}

fn extract_ip(addr: &Multiaddr) -> Option<String> {
    addr.iter().find_map(|p| match p {
        Protocol::Ip4(ip) => Some(ip.to_string()),
        Protocol::Ip6(ip) => Some(ip.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_ip_finds_first_host() {
        let addr: Multiaddr = "/ip4/198.51.100.4/tcp/4001".parse().unwrap();
        assert_eq!(extract_ip(&addr).as_deref(), Some("198.51.100.4"));

        let addr: Multiaddr = "/dns/example.com/tcp/4001".parse().unwrap();
        assert_eq!(extract_ip(&addr), None);
    }

    #[test]
    fn new_node_knows_no_peers() {
        let node = AutonatNode::new(
            "203.0.113.5".to_string(),
            "/ip4/0.0.0.0/tcp/4001".parse().unwrap(),
        );
        assert_eq!(node.known_peers_count(), 0);
        assert!(node.announced.is_none());
    }
}
