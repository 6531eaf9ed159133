use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use libp2p::Multiaddr;
use tokio::io::BufReader;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use group_chat::bootstrap::{connect_all, resolve_all};
use group_chat::chat::{Outbox, ingest};
use group_chat::config;
use group_chat::error::NotFoundError;
use group_chat::identity::load_or_generate_key;
use group_chat::message_log::MessageLog;
use group_chat::network::{NetworkConfig, NetworkHandle, P2PClient};
use group_chat::relay::{self, LOOPBACK_MARKER};

const LISTENER_WAIT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "group-chat", version, about = "Peer-to-peer group chat")]
struct Cli {
    /// Will connect to this PEER to bootstrap the network (repeatable)
    #[arg(long = "bootstrap", value_name = "PEER")]
    bootstrap: Vec<String>,
    /// This NAME will be attached to your messages
    #[arg(long, value_name = "NAME")]
    nickname: Option<String>,
    /// Allows other peers to relay through this peer
    #[arg(long)]
    relay: bool,
    /// Disable input and just observe the chat
    #[arg(long)]
    read_only: bool,
    /// Public IP address (required for relay peers)
    #[arg(long, value_name = "IP")]
    ip: Option<String>,
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Keep the peer identity in FILE across restarts
    #[arg(long, value_name = "FILE")]
    key_file: Option<PathBuf>,
    #[arg(long, default_value = "/ip4/0.0.0.0/tcp/0", value_name = "ADDR")]
    listen: Multiaddr,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("group_chat=info"))
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{err}");
            1
        }
    };

    // A pending stdin read parks a blocking thread that would hold up the
    // runtime shutdown.
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    if cli.relay && cli.ip.is_none() {
        return Err("a public ip address is required when starting as a relay".into());
    }

    let app_config = config::load_config(&cli.config);
    let nickname = cli
        .nickname
        .or_else(|| app_config.nickname.clone())
        .unwrap_or_default();
    let entries = config::merge_bootstrap(&cli.bootstrap, &app_config.bootstrap_nodes);
    let bootstrap_peers = resolve_all(&entries);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let local_key = load_or_generate_key(cli.key_file.as_deref())?;
    let network_config = NetworkConfig {
        listen_addr: cli.listen,
        relay_hop: cli.relay,
    };
    let (client, handle, mut subscription) =
        P2PClient::new(&local_key, network_config, shutdown.clone())?;
    let network = tokio::spawn(client.run());

    let log = Arc::new(MessageLog::new());
    let mut ingestion = tokio::spawn({
        let log = log.clone();
        let shutdown = shutdown.clone();
        async move { ingest(&mut subscription, &log, &shutdown).await }
    });

    if connect_all(&bootstrap_peers, &handle).await > 0 {
        handle.bootstrap_routing().await;
    }

    if let Some(ip) = cli.ip.as_deref() {
        let result = announce_public(&handle, ip, cli.relay, app_config.relay_warmup(), &shutdown).await;
        match result {
            Ok(()) => {}
            Err(err) if cli.relay => return Err(err.into()),
            Err(err) => log::warn!("Not announcing a public address: {err}"),
        }
    }

    let outbox = Outbox::new(log.clone(), handle.local_peer_id().to_string(), nickname);
    let input = async {
        if cli.read_only {
            shutdown.cancelled().await;
            return Ok(());
        }
        println!("welcome to the chat!");
        let stdin = BufReader::new(tokio::io::stdin());
        outbox.run(&handle, stdin, &shutdown).await
    };

    tokio::select! {
        result = &mut ingestion => {
            // Only a dead subscription ends ingestion before shutdown.
            result??;
        }
        result = input => {
            if let Err(err) = result {
                return Err(format!("input error: {err}").into());
            }
        }
    }

    shutdown.cancel();
    network.await?;
    log::info!("Shut down after {} messages", log.len());
    Ok(())
}

/// Rewrites our loopback listen address to `public_ip` and advertises it.
/// Relay peers then wait out the warm-up before printing the address.
async fn announce_public(
    handle: &NetworkHandle,
    public_ip: &str,
    relay_mode: bool,
    warmup: Duration,
    shutdown: &CancellationToken,
) -> Result<(), NotFoundError> {
    let local: Vec<String> = listen_addresses(handle)
        .await
        .iter()
        .map(|addr| addr.to_string())
        .collect();
    let public = relay::rewrite_public(&local, LOOPBACK_MARKER, public_ip)?;
    handle.add_external_address(public.clone()).await;

    if !relay_mode {
        return Ok(());
    }

    println!(
        "relay peers must wait {} minutes before use",
        warmup.as_secs().div_ceil(60)
    );
    if !relay::wait_for_warmup(warmup, shutdown).await {
        return Ok(());
    }
    println!("ready to go");
    println!("{}", relay::announce_address(&public, handle.local_peer_id()));
    Ok(())
}

async fn listen_addresses(handle: &NetworkHandle) -> Vec<Multiaddr> {
    let deadline = tokio::time::Instant::now() + LISTENER_WAIT;
    loop {
        let addrs = handle.local_addresses().await;
        if !addrs.is_empty() || tokio::time::Instant::now() >= deadline {
            return addrs;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Received shutdown signal, stopping...");
                shutdown.cancel();
            }
            Err(err) => log::error!("Unable to listen for shutdown signal: {err}"),
        }
    });
}
