use std::future::Future;
use std::time::Duration;

use libp2p::Multiaddr;
use libp2p::multiaddr::Protocol;

use crate::common::PeerAddress;
use crate::error::{ConnectError, ParseError};

/// Upper bound on a single bootstrap connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Something that can open a connection to a remote peer.
pub trait Connector {
    fn connect(&self, peer: &PeerAddress) -> impl Future<Output = Result<(), ConnectError>> + Send;
}

/// Parses `/…/p2p/<PeerId>` into the peer id and its transport address.
pub fn parse_endpoint(entry: &str) -> Result<PeerAddress, ParseError> {
    let mut addr: Multiaddr = entry
        .trim()
        .parse()
        .map_err(|source| ParseError::Multiaddr {
            entry: entry.to_string(),
            source,
        })?;

    let peer_id = match addr.pop() {
        Some(Protocol::P2p(peer)) => peer,
        _ => return Err(ParseError::MissingPeerId(entry.to_string())),
    };

    let mut peer = PeerAddress::new(peer_id);
    // A bare `/p2p/<id>` carries no transport address; routing has to find one.
    if !addr.is_empty() {
        peer.addresses.insert(addr);
    }
    Ok(peer)
}

/// Parses every entry, skipping the ones that fail with one warning each.
/// Entries naming the same peer are merged into one record.
pub fn resolve_all<S: AsRef<str>>(entries: &[S]) -> Vec<PeerAddress> {
    let (peers, skipped) = resolve_entries(entries);
    for err in &skipped {
        log::warn!("Skipping bootstrap entry: {err}");
    }
    peers
}

/// Like [`resolve_all`], but hands back the rejected entries instead of
/// logging them.
pub fn resolve_entries<S: AsRef<str>>(entries: &[S]) -> (Vec<PeerAddress>, Vec<ParseError>) {
    let mut peers: Vec<PeerAddress> = Vec::new();
    let mut skipped = Vec::new();

    for entry in entries {
        let parsed = match parse_endpoint(entry.as_ref()) {
            Ok(parsed) => parsed,
            Err(err) => {
                skipped.push(err);
                continue;
            }
        };

        match peers.iter_mut().find(|p| p.peer_id == parsed.peer_id) {
            Some(existing) => existing.addresses.extend(parsed.addresses),
            None => peers.push(parsed),
        }
    }

    (peers, skipped)
}

/// Tries each peer once, in order. Returns how many connections succeeded.
pub async fn connect_all<C: Connector>(peers: &[PeerAddress], connector: &C) -> usize {
    connect_all_with_timeout(peers, connector, CONNECT_TIMEOUT).await
}

pub async fn connect_all_with_timeout<C: Connector>(
    peers: &[PeerAddress],
    connector: &C,
    timeout: Duration,
) -> usize {
    if peers.is_empty() {
        log::warn!("No bootstrap peers configured; waiting for others to connect to us");
        return 0;
    }

    let mut connected = 0;
    for peer in peers {
        log::info!("Connecting to bootstrap peer {peer}");
        let result = match tokio::time::timeout(timeout, connector.connect(peer)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout(peer.peer_id)),
        };

        match result {
            Ok(()) => {
                log::info!("Connected to bootstrap peer {}", peer.peer_id);
                connected += 1;
            }
            Err(err) => {
                log::error!("Could not connect to bootstrap node: {err}");
            }
        }
    }

    log::info!("Connected to {connected}/{} bootstrap peers", peers.len());
    connected
}
