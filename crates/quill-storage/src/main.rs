//! Storage node daemon entry point.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use quill_storage::{StorageNode, StorageNodeConfig};
use tokio::signal::unix::{SignalKind, signal};

const LOG_PATH: &str = "logs/storage_server.log";

#[derive(Parser)]
#[command(version, about = "quill storage node")]
struct Args {
    /// Coordinator address to register with.
    coordinator_ip: IpAddr,
    coordinator_port: u16,
    /// Directory holding this node's slice of the namespace.
    storage_dir: PathBuf,
    /// Port to serve client bulk I/O on.
    client_port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = quill_core::logging::init_file_logger("storage", Path::new(LOG_PATH)) {
        eprintln!("cannot open log file: {e}");
        return ExitCode::FAILURE;
    }

    let config = StorageNodeConfig {
        coordinator: SocketAddr::new(args.coordinator_ip, args.coordinator_port),
        storage_dir: args.storage_dir,
        client_port: args.client_port,
    };

    let mut node = match StorageNode::bind(&config).await {
        Ok(node) => node,
        Err(e) => {
            log::error!("startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = node.register().await {
        log::error!("registration failed: {e}");
        return ExitCode::FAILURE;
    }
    match node.local_addr() {
        Ok(addr) => log::info!("serving clients on {addr}"),
        Err(e) => log::warn!("listener address unavailable: {e}"),
    }

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            log::error!("cannot install SIGTERM handler: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = node.serve() => {
            if let Err(e) = result {
                log::error!("storage node failed: {e}");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down on SIGINT");
        }
        _ = sigterm.recv() => {
            log::info!("shutting down on SIGTERM");
        }
    }
    ExitCode::SUCCESS
}
