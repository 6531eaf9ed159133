use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic};
use libp2p::kad;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{Config as SwarmConfig, ConnectionId, DialError, SwarmEvent};
use libp2p::{Multiaddr, PeerId, Swarm, autonat, identify, identity, relay};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::bootstrap::Connector;
use crate::common::{NetworkCommand, PeerAddress};
use crate::error::{ConnectError, PublishError, TransportFatalError};

use super::behavior::{ChatBehavior, ChatBehaviorEvent, build_behavior};
use super::transport::build_transport;

const COMMAND_BUFFER: usize = 100;
const MESSAGE_BUFFER: usize = 100;
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub listen_addr: Multiaddr,
    /// Offer relayed circuits to other peers.
    pub relay_hop: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: Multiaddr::empty()
                .with(Protocol::Ip4([0, 0, 0, 0].into()))
                .with(Protocol::Tcp(0)),
            relay_hop: false,
        }
    }
}

/// Cloneable access to the network task.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    command_sender: mpsc::Sender<NetworkCommand>,
    local_peer_id: PeerId,
}

impl NetworkHandle {
    pub fn new(command_sender: mpsc::Sender<NetworkCommand>, local_peer_id: PeerId) -> Self {
        Self {
            command_sender,
            local_peer_id,
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), PublishError> {
        let (reply, response) = oneshot::channel();
        self.command_sender
            .send(NetworkCommand::Publish { payload, reply })
            .await
            .map_err(|_| PublishError::NetworkClosed)?;
        response.await.map_err(|_| PublishError::NetworkClosed)?
    }

    /// Addresses the swarm is currently listening on. Empty once the network
    /// task has stopped.
    pub async fn local_addresses(&self) -> Vec<Multiaddr> {
        let (reply, response) = oneshot::channel();
        if self
            .command_sender
            .send(NetworkCommand::LocalAddresses { reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    pub async fn add_external_address(&self, addr: Multiaddr) {
        if let Err(err) = self
            .command_sender
            .send(NetworkCommand::AddExternalAddress(addr))
            .await
        {
            log::warn!("Network task gone, cannot announce {:?}", err.0);
        }
    }

    pub async fn bootstrap_routing(&self) {
        if self.command_sender.send(NetworkCommand::Bootstrap).await.is_err() {
            log::warn!("Network task gone, cannot start Kademlia bootstrap");
        }
    }
}

impl Connector for NetworkHandle {
    async fn connect(&self, peer: &PeerAddress) -> Result<(), ConnectError> {
        let (reply, response) = oneshot::channel();
        self.command_sender
            .send(NetworkCommand::Connect {
                peer: peer.clone(),
                reply,
            })
            .await
            .map_err(|_| ConnectError::NetworkClosed)?;
        response.await.map_err(|_| ConnectError::NetworkClosed)?
    }
}

/// Payloads delivered on the chat topic, in arrival order.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { receiver }
    }

    /// Waits for the next payload. Fails once the network task is gone.
    pub async fn next(&mut self) -> Result<Vec<u8>, TransportFatalError> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| TransportFatalError("broadcast subscription closed".to_string()))
    }
}

/// Owns the swarm and serves [`NetworkHandle`] requests until shutdown.
pub struct P2PClient {
    swarm: Swarm<ChatBehavior>,
    topic: IdentTopic,
    command_receiver: mpsc::Receiver<NetworkCommand>,
    message_sender: mpsc::Sender<Vec<u8>>,
    pending_dials: HashMap<ConnectionId, oneshot::Sender<Result<(), ConnectError>>>,
    shutdown: CancellationToken,
}

impl P2PClient {
    pub fn new(
        local_key: &identity::Keypair,
        config: NetworkConfig,
        shutdown: CancellationToken,
    ) -> Result<(Self, NetworkHandle, Subscription), Box<dyn Error + Send + Sync>> {
        let local_peer_id = PeerId::from(local_key.public());
        log::info!("Local PeerID: {local_peer_id}");

        let (transport, relay_client) = build_transport(local_key)?;
        let (behavior, topic) = build_behavior(local_key, relay_client, config.relay_hop)?;

        let mut swarm = Swarm::new(
            transport,
            behavior,
            local_peer_id,
            SwarmConfig::with_tokio_executor().with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT),
        );
        swarm.listen_on(config.listen_addr)?;

        let (command_sender, command_receiver) = mpsc::channel(COMMAND_BUFFER);
        let (message_sender, message_receiver) = mpsc::channel(MESSAGE_BUFFER);

        let client = Self {
            swarm,
            topic,
            command_receiver,
            message_sender,
            pending_dials: HashMap::new(),
            shutdown,
        };

        Ok((
            client,
            NetworkHandle::new(command_sender, local_peer_id),
            Subscription::new(message_receiver),
        ))
    }

    pub async fn run(mut self) {
        log::info!("Network event loop started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                }
            }
        }

        log::info!("Network event loop stopped");
    }

    fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::Publish { payload, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(self.topic.clone(), payload)
                    .map(|_| ())
                    .map_err(|err| match err {
                        gossipsub::PublishError::NoPeersSubscribedToTopic => PublishError::NoPeers,
                        err => PublishError::Rejected(err.to_string()),
                    });
                respond(reply, result);
            }
            NetworkCommand::Connect { peer, reply } => self.dial(peer, reply),
            NetworkCommand::Bootstrap => {
                if let Err(err) = self.swarm.behaviour_mut().kad.bootstrap() {
                    log::warn!("Failed to trigger Kademlia bootstrap: {err}");
                }
            }
            NetworkCommand::LocalAddresses { reply } => {
                respond(reply, self.swarm.listeners().cloned().collect());
            }
            NetworkCommand::AddExternalAddress(addr) => {
                log::info!("Announcing external address {addr}");
                self.swarm.add_external_address(addr);
            }
        }
    }

    fn dial(&mut self, peer: PeerAddress, reply: oneshot::Sender<Result<(), ConnectError>>) {
        if peer.addresses.is_empty() {
            respond(reply, Err(ConnectError::NoAddresses(peer.peer_id)));
            return;
        }

        for addr in &peer.addresses {
            self.swarm
                .behaviour_mut()
                .kad
                .add_address(&peer.peer_id, addr.clone());
        }

        let opts = DialOpts::peer_id(peer.peer_id)
            .addresses(peer.addresses.iter().cloned().collect())
            .build();
        let connection_id = opts.connection_id();

        match self.swarm.dial(opts) {
            Ok(()) => {
                self.pending_dials.insert(connection_id, reply);
            }
            // Already connected, which is all a bootstrap dial asks for.
            Err(DialError::DialPeerConditionFalse(_)) => respond(reply, Ok(())),
            Err(err) => respond(
                reply,
                Err(ConnectError::Dial {
                    peer: peer.peer_id,
                    reason: err.to_string(),
                }),
            ),
        }
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<ChatBehaviorEvent>) {
        match event {
            SwarmEvent::Behaviour(ChatBehaviorEvent::Gossipsub(event)) => {
                self.handle_gossipsub_event(event).await;
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Identify(event)) => {
                self.handle_identify_event(event);
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Kad(event)) => {
                handle_kad_event(event);
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::RelayClient(event)) => {
                if let relay::client::Event::ReservationReqAccepted { relay_peer_id, .. } = event {
                    log::info!("Relay reservation accepted by {relay_peer_id}");
                } else {
                    log::debug!("Relay client event: {event:?}");
                }
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::RelayServer(event)) => {
                log::debug!("Relay server event: {event:?}");
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Autonat(event)) => {
                if let autonat::Event::StatusChanged { new, .. } = event {
                    log::info!("Autonat status changed: {new:?}");
                } else {
                    log::debug!("Autonat event: {event:?}");
                }
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Dcutr(event)) => {
                log::debug!("DCUtR event: {event:?}");
            }
            SwarmEvent::Behaviour(ChatBehaviorEvent::Ping(_)) => {}
            SwarmEvent::NewListenAddr { address, .. } => {
                let local_peer_id = *self.swarm.local_peer_id();
                log::info!("Listening on {}", address.with(Protocol::P2p(local_peer_id)));
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                ..
            } => {
                log::debug!("Connected to {peer_id}");
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    respond(reply, Ok(()));
                }
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                peer_id,
                error,
                ..
            } => {
                log::debug!("Outgoing connection to {peer_id:?} failed: {error}");
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let result = match peer_id {
                        Some(peer) => Err(ConnectError::Dial {
                            peer,
                            reason: error.to_string(),
                        }),
                        None => Err(ConnectError::NetworkClosed),
                    };
                    respond(reply, result);
                }
            }
            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                log::debug!("Disconnected from {peer_id} ({cause:?})");
            }
            _ => {}
        }
    }

    async fn handle_gossipsub_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            } => {
                log::trace!(
                    "Payload of {} bytes via {propagation_source}",
                    message.data.len()
                );
                if self.message_sender.send(message.data).await.is_err() {
                    log::warn!("Subscription dropped; discarding inbound payload");
                }
            }
            gossipsub::Event::Subscribed { peer_id, topic } => {
                log::info!("Peer {peer_id} joined {topic}");
            }
            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                log::info!("Peer {peer_id} left {topic}");
            }
            other => log::debug!("Gossipsub event: {other:?}"),
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        if let identify::Event::Received { peer_id, info, .. } = event {
            log::debug!(
                "Identify info from {peer_id}: protocols={:?}",
                info.protocols
            );

            for addr in info.listen_addrs {
                self.swarm.behaviour_mut().kad.add_address(&peer_id, addr);
            }
        }
    }
}

fn handle_kad_event(event: kad::Event) {
    match event {
        kad::Event::OutboundQueryProgressed {
            result: kad::QueryResult::Bootstrap(result),
            ..
        } => match result {
            Ok(kad::BootstrapOk { num_remaining, .. }) => {
                log::debug!("Kademlia bootstrap ok, remaining peers: {num_remaining}");
            }
            Err(err) => {
                log::warn!("Kademlia bootstrap error: {err:?}");
            }
        },
        kad::Event::RoutingUpdated {
            peer, addresses, ..
        } => {
            log::debug!("Kademlia routing table updated for {peer} (addresses: {addresses:?})");
        }
        _ => {}
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        log::debug!("Requester went away before the network replied");
    }
}
