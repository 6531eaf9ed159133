mod network;

use clap::Parser;
use dotenvy::dotenv;
use libp2p::Multiaddr;
use network::node::AutonatNode;
use tokio::signal;

#[derive(Parser)]
#[command(
    name = "autonat-node",
    version,
    about = "AutoNAT and relay service peer for group-chat"
)]
struct Cli {
    /// The public IP address of this autonat peer
    #[arg(long, value_name = "IP")]
    public_ip: String,
    #[arg(long, default_value = "/ip4/0.0.0.0/tcp/4001", value_name = "ADDR")]
    listen: Multiaddr,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("autonat_node=info,group_chat=info"),
    )
    .init();

    let cli = Cli::parse();
    if cli.public_ip.trim().is_empty() {
        log::error!("could not read autonat ip address");
        std::process::exit(1);
    }

    log::info!("Starting AutoNAT service peer...");
    let mut node = AutonatNode::new(cli.public_ip, cli.listen);

    tokio::select! {
        result = node.run() => {
            if let Err(err) = result {
                log::error!("Service peer error: {err}");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            log::info!("Received shutdown signal, stopping service peer...");
        }
    }

    log::info!("Final statistics: {} known peers", node.known_peers_count());
}
