use std::borrow::Cow;
use std::net::IpAddr;
use std::time::Duration;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use tokio_util::sync::CancellationToken;

use crate::error::NotFoundError;

/// Host component a freshly bound listener reports for the local machine.
pub const LOOPBACK_MARKER: &str = "127.0.0.1";

/// How long a relay peer waits before announcing itself.
pub const DEFAULT_RELAY_WARMUP: Duration = Duration::from_secs(15 * 60);

/// Returns the first address whose host equals `loopback_marker`, with that
/// host replaced by `public_host`.
///
/// Candidates that do not parse, carry no matching host, or fail to re-parse
/// after the substitution are skipped.
pub fn rewrite_public<S: AsRef<str>>(
    addrs: &[S],
    loopback_marker: &str,
    public_host: &str,
) -> Result<Multiaddr, NotFoundError> {
    for candidate in addrs {
        let candidate = candidate.as_ref();
        let Ok(addr) = candidate.parse::<Multiaddr>() else {
            log::debug!("Ignoring unparsable local address `{candidate}`");
            continue;
        };
        let Some(rewritten) = replace_host(&addr, loopback_marker, public_host) else {
            continue;
        };

        match rewritten.to_string().parse::<Multiaddr>() {
            Ok(valid) if valid == rewritten => return Ok(valid),
            Ok(_) | Err(_) => {
                log::warn!("Rewritten address `{rewritten}` does not round-trip; skipping");
            }
        }
    }

    Err(NotFoundError::new(loopback_marker, addrs))
}

/// Replaces the first IP or DNS component whose textual value equals `marker`.
pub fn replace_host(addr: &Multiaddr, marker: &str, host: &str) -> Option<Multiaddr> {
    let mut replaced = false;
    let mut out = Multiaddr::empty();

    for protocol in addr.iter() {
        if !replaced && host_value(&protocol).is_some_and(|value| value == marker) {
            out.push(host_protocol(host));
            replaced = true;
        } else {
            out.push(protocol);
        }
    }

    replaced.then_some(out)
}

/// Address other peers should dial, with our own peer id appended.
pub fn announce_address(addr: &Multiaddr, peer_id: PeerId) -> Multiaddr {
    match addr.iter().last() {
        Some(Protocol::P2p(id)) if id == peer_id => addr.clone(),
        _ => addr.clone().with(Protocol::P2p(peer_id)),
    }
}

/// Sleeps for `warmup` unless `shutdown` fires first. Returns `false` when
/// cancelled.
pub async fn wait_for_warmup(warmup: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(warmup) => true,
        _ = shutdown.cancelled() => false,
    }
}

fn host_value(protocol: &Protocol<'_>) -> Option<String> {
    match protocol {
        Protocol::Ip4(ip) => Some(ip.to_string()),
        Protocol::Ip6(ip) => Some(ip.to_string()),
        Protocol::Dns(host) | Protocol::Dns4(host) | Protocol::Dns6(host) => {
            Some(host.to_string())
        }
        _ => None,
    }
}

fn host_protocol(host: &str) -> Protocol<'static> {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => Protocol::Ip4(ip),
        Ok(IpAddr::V6(ip)) => Protocol::Ip6(ip),
        Err(_) => Protocol::Dns(Cow::Owned(host.to_string())),
    }
}
