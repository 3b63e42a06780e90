//! Obol service-node daemon — entry point for running the subsystem.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use obol_activation::{MemoryWallet, StaticConnector};
use obol_chain::MemoryChain;
use obol_node::{NodeConfig, ObolNode};
use obol_types::NetworkId;
use obol_utils::SystemClock;

#[derive(Parser)]
#[command(name = "obold", about = "Obol service-node daemon")]
struct Cli {
    /// Network to connect to: "main", "test", or "dev".
    /// When a config file is provided, defaults to the file's network value.
    #[arg(long, env = "OBOL_NETWORK")]
    network: Option<String>,

    /// Data directory for checkpoint files.
    #[arg(long, default_value = "./obol_data", env = "OBOL_DATA_DIR")]
    data_dir: PathBuf,

    /// Port for P2P connections (defaults to network default).
    #[arg(long, env = "OBOL_P2P_PORT")]
    port: Option<u16>,

    /// Activate this node as a service node.
    #[arg(long, env = "OBOL_SERVICE_NODE")]
    service_node: bool,

    /// Hex-encoded 32-byte operator key seed.
    #[arg(long, env = "OBOL_OPERATOR_SEED")]
    operator_seed: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    /// Overrides the config file; `RUST_LOG` overrides both.
    #[arg(long, env = "OBOL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the node.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node.
    Run,
}

fn parse_network(s: &str) -> NetworkId {
    match s.to_lowercase().as_str() {
        "main" => NetworkId::Main,
        "test" => NetworkId::Test,
        _ => NetworkId::Dev,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cli_network = cli.network.as_deref().map(parse_network);

    // The config file can set the log level, so load it before the
    // subscriber goes up and report the outcome afterwards.
    let file_config: Option<Result<NodeConfig, _>> = cli
        .config
        .as_ref()
        .map(|path| NodeConfig::from_toml_file(&path.display().to_string()));

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| {
            file_config
                .as_ref()
                .and_then(|r| r.as_ref().ok())
                .map(|cfg| cfg.log_level.clone())
        })
        .unwrap_or_else(|| "info".to_string());
    obol_utils::init_tracing(&log_level);

    let file_config = match file_config {
        Some(Ok(cfg)) => {
            if let Some(ref path) = cli.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            Some(cfg)
        }
        Some(Err(e)) => {
            tracing::warn!("Failed to load config file: {e}, using CLI defaults");
            None
        }
        None => None,
    };

    let config = if let Some(file_cfg) = file_config {
        let network = cli_network.unwrap_or(file_cfg.network);
        NodeConfig {
            network,
            data_dir: cli.data_dir,
            port: cli.port.unwrap_or(file_cfg.port),
            service_node: cli.service_node || file_cfg.service_node,
            operator_seed: cli.operator_seed.or_else(|| file_cfg.operator_seed.clone()),
            log_level,
            ..file_cfg
        }
    } else {
        let network = cli_network.unwrap_or(NetworkId::Dev);
        NodeConfig {
            network,
            data_dir: cli.data_dir,
            port: cli.port.unwrap_or(network.default_port()),
            service_node: cli.service_node,
            operator_seed: cli.operator_seed,
            log_level,
            ..Default::default()
        }
    };

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Run => {
                tracing::info!(
                    network = ?config.network,
                    port = config.port,
                    service_node = config.service_node,
                    "starting Obol service node"
                );

                // Standalone runs use in-memory collaborators; embedding
                // hosts supply the real chain view, wallet, and connector.
                let chain = Arc::new(MemoryChain::new());
                let mut wallet = MemoryWallet::new();
                if config.service_node {
                    wallet.unlock();
                }
                let listen: std::net::SocketAddr =
                    ([127, 0, 0, 1], config.port).into();
                let connector = StaticConnector {
                    address: Some(listen.into()),
                    reachable: config.network == NetworkId::Dev,
                };

                let node = ObolNode::new(
                    config,
                    chain,
                    Arc::new(obol_chain::SporkSet::new()),
                    Arc::new(wallet),
                    Arc::new(connector),
                    Arc::new(SystemClock),
                )?;
                node.run().await?;

                tracing::info!("obold exited cleanly");
            }
        },
    }

    Ok(())
}
