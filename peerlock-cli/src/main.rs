use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use peerlock_core::config::Config;
use peerlock_core::core_transport::TcpTransport;
use peerlock_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use peerlock_core::metrics::init_metrics;
use peerlock_core::{ChatNode, NodeEvent, PeerId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

mod downloads;

#[derive(Parser, Debug)]
#[command(name = "peerlock")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Configuration file (TOML); environment overrides apply otherwise
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node until interrupted
    Run {
        /// Display name sent to peers
        #[arg(short, long)]
        name: Option<String>,

        /// Address to listen on
        #[arg(long)]
        listen: Option<String>,

        /// Peer address to dial at startup; may be repeated
        #[arg(long)]
        connect: Vec<String>,

        /// Where decrypted files are written
        #[arg(long, default_value = "downloads")]
        download_dir: String,
    },

    /// Write the default configuration to a file
    InitConfig {
        #[arg(default_value = "peerlock.toml")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(expand(path))?,
        None => Config::from_env()?,
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    let log_config = LogConfig::try_from(&config.logging).unwrap_or_else(|e| {
        eprintln!("{}, using 'info'", e);
        LogConfig::new(LogLevel::Info).json_format(config.logging.json_format)
    });
    init_logging_with_config(log_config)?;
    init_metrics();

    match args.command {
        Command::Run { name, listen, connect, download_dir } => {
            if let Some(name) = name {
                config.node.display_name = name;
            }
            if let Some(listen) = listen {
                config.node.bind_address = listen.parse().context("invalid --listen address")?;
            }
            config.validate()?;
            run_node(config, connect, expand(&download_dir)).await
        }
        Command::InitConfig { path } => {
            let path = expand(&path);
            Config::default().save_to_file(&path)?;
            info!(path = %path.display(), "Wrote default configuration");
            Ok(())
        }
    }
}

async fn run_node(config: Config, connect: Vec<String>, download_dir: PathBuf) -> Result<()> {
    let local_id = PeerId::generate();
    let (transport, inbox) = TcpTransport::new(local_id.clone(), config.transport.clone());
    let addr = transport.listen(&config.node.bind_address.to_string()).await?;

    let node = Arc::new(ChatNode::new(local_id.clone(), &config, Arc::new(transport.clone())));
    let mut events = node.subscribe();
    let dispatcher = Arc::clone(&node);
    tokio::spawn(async move { dispatcher.run(inbox).await });

    info!(
        peer_id = %local_id,
        display_name = %config.node.display_name,
        addr = %addr,
        "peerlock node running"
    );

    for peer_addr in connect {
        match transport.dial(&peer_addr).await {
            Ok(peer) => info!(addr = %peer_addr, peer_id = %peer, "Dialed peer"),
            Err(e) => warn!(addr = %peer_addr, error = %e, "Failed to dial peer"),
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => handle_event(&node, event, &download_dir).await,
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event receiver lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    for (peer, _) in node.connected_peers().await {
        transport.close(&peer).await;
    }
    let metrics = node.metrics();
    info!(
        received = metrics.envelopes_received,
        sent = metrics.envelopes_sent,
        dropped = metrics.envelopes_dropped,
        files = metrics.files_received,
        "peerlock node stopped"
    );
    Ok(())
}

/// Presentation side of the node: publish keys, print traffic, save files
async fn handle_event(node: &ChatNode, event: NodeEvent, download_dir: &Path) {
    match event {
        NodeEvent::PeerConnected { peer_id, display_name } => {
            info!(peer_id = %peer_id, display_name = %display_name, "Peer connected");
            if !node.send_public_key(&peer_id).await {
                warn!(peer_id = %peer_id, "Could not send public key");
            }
        }
        NodeEvent::PeerDisconnected { peer_id, display_name } => {
            info!(peer_id = %peer_id, display_name = %display_name, "Peer disconnected");
        }
        NodeEvent::KeyExchanged { peer_id } => {
            info!(peer_id = %peer_id, "Secure channel ready");
        }
        NodeEvent::ChatReceived { peer_id, text } => {
            let from = node.peer_display_name(&peer_id).await.unwrap_or_else(|| peer_id.to_string());
            info!(from = %from, "{}", text);
        }
        NodeEvent::FileProgress { peer_id, filename, percent, direction } => {
            debug!(peer_id = %peer_id, filename = %filename, ?direction, "{:.0}%", percent);
        }
        NodeEvent::FileReceived { peer_id, filename, data } => {
            match downloads::save(download_dir, &filename, &data).await {
                Ok(path) => info!(peer_id = %peer_id, path = %path.display(), "Saved file"),
                Err(e) => warn!(peer_id = %peer_id, filename = %filename, error = %e, "Failed to save file"),
            }
        }
        NodeEvent::GroupInvited { group_id, group_name, creator_id } => {
            info!(group_id = %group_id, group_name = %group_name, creator = %creator_id, "Joined group");
            if let Err(e) = node.announce_join(&group_id).await {
                warn!(group_id = %group_id, error = %e, "Failed to announce join");
            }
        }
        NodeEvent::GroupMessageReceived { group_id, sender, text } => {
            info!(group_id = %group_id, from = %sender, "{}", text);
        }
        NodeEvent::GroupMemberJoined { group_id, peer_id } => {
            info!(group_id = %group_id, peer_id = %peer_id, "Member joined group");
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
